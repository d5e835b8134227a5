//! SensorHouse Metadata Store
//!
//! This crate implements the persistence substrate of SensorHouse: tenants,
//! their sensors, and the append-only readings those sensors produce.
//!
//! ## Purpose
//!
//! The store keeps:
//! - **Tenants**: isolated customer accounts
//! - **Sensors**: devices, each owned by exactly one tenant
//! - **Readings**: timestamped measurements, physically segmented by calendar
//!   month into partitions (plus one default partition)
//!
//! ## Isolation
//!
//! Every tenant-scoped operation takes a [`TenantScope`]. Scopes can only be
//! created by [`IsolationGuard`], so there is no way to call the store for
//! sensors or readings without naming the tenant the call is confined to.
//! Reads filter by the scope; writes stamp the scope's tenant on every row.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────┐
//! │ Reading Store│  (sensorhouse-storage)
//! └──────┬───────┘
//!        │ TenantScope + PartitionHandle
//!        ▼
//! ┌──────────────────┐     ┌──────────────────────────┐
//! │   SensorStore    │ ──▶ │ sensor_readings_2026_09  │
//! │ (SQLite/InMemory)│     │ sensor_readings_2026_10  │
//! └──────────────────┘     │ sensor_readings_default  │
//!                          └──────────────────────────┘
//! ```
//!
//! ## Usage Example
//!
//! ```ignore
//! use sensorhouse_metadata::{IsolationGuard, SqliteSensorStore, SensorStore, CreateSensor};
//!
//! let store = SqliteSensorStore::new("sensorhouse.db").await?;
//! let scope = IsolationGuard::enter(Some(tenant_id))?;
//!
//! let sensor = store.create_sensor(&scope, CreateSensor::named("Boiler")).await?;
//! let sensors = store.list_sensors(&scope).await?;
//! ```
//!
//! ## Backends
//!
//! - **SqliteSensorStore**: one table per partition, created on demand
//!   (`CREATE TABLE IF NOT EXISTS`), tenants and sensors in regular tables
//! - **InMemorySensorStore**: per-partition vectors; records every partition it
//!   scans so pruning and isolation are observable in tests

pub mod error;
pub mod memory;
pub mod partition;
pub mod store;
pub mod tenant;
pub mod types;

pub use error::{MetadataError, Result};
pub use memory::{AccessStats, InMemorySensorStore};
pub use partition::PartitionHandle;
pub use store::SqliteSensorStore;
pub use tenant::{IsolationGuard, TenantId, TenantScope};
pub use types::*;

use async_trait::async_trait;
use uuid::Uuid;

/// Persistence substrate trait - abstracts over storage backends.
///
/// Tenant and partition administration is unscoped. Everything touching
/// sensors or readings takes a [`TenantScope`] and must confine itself to the
/// scope's tenant: reads filter on it, writes stamp it.
///
/// ## Thread Safety
///
/// Implementations must be Send + Sync so they can be shared across tasks via
/// `Arc<dyn SensorStore>`.
///
/// ## Partitions
///
/// Reading operations address one partition at a time. Writing to a partition
/// that was never created fails with `PartitionNotFound`; creating one that
/// already exists is a no-op.
#[async_trait]
pub trait SensorStore: Send + Sync {
    // ============================================================
    // TENANT OPERATIONS (administrative, unscoped)
    // ============================================================

    /// Create a tenant with a freshly generated identifier.
    async fn create_tenant(&self, tenant: CreateTenant) -> Result<Tenant>;

    /// List all tenants, ordered by name.
    ///
    /// This is the one read that is not tenant-scoped: it enumerates the
    /// tenants themselves.
    async fn list_tenants(&self) -> Result<Vec<Tenant>>;

    /// Delete a tenant together with its sensors and readings in every
    /// partition.
    ///
    /// # Errors
    ///
    /// - `TenantNotFound`: No tenant with this identifier
    async fn delete_tenant(&self, tenant_id: &TenantId) -> Result<()>;

    // ============================================================
    // SENSOR OPERATIONS
    // ============================================================

    /// Create a sensor owned by the scope's tenant.
    ///
    /// # Errors
    ///
    /// - `TenantNotFound`: The scope names a tenant that does not exist
    async fn create_sensor(&self, scope: &TenantScope, sensor: CreateSensor) -> Result<Sensor>;

    /// List the scope's sensors, ordered by name.
    async fn list_sensors(&self, scope: &TenantScope) -> Result<Vec<Sensor>>;

    /// Fetch a sensor if, and only if, the scope's tenant owns it.
    async fn get_sensor(&self, scope: &TenantScope, sensor_id: Uuid) -> Result<Option<Sensor>>;

    // ============================================================
    // PARTITION OPERATIONS
    // ============================================================

    /// Create the storage segment for a partition if it does not exist yet.
    ///
    /// Idempotent: racing callers all succeed and observe one segment.
    async fn create_partition(&self, partition: &PartitionHandle) -> Result<()>;

    /// List the partitions that exist, in key order (months first, default last).
    async fn list_partitions(&self) -> Result<Vec<PartitionHandle>>;

    // ============================================================
    // READING OPERATIONS
    // ============================================================

    /// Append readings to a partition, stamping each with the scope's tenant.
    ///
    /// All-or-nothing per call. Returns the number of rows written.
    ///
    /// # Errors
    ///
    /// - `PartitionNotFound`: The partition was never created
    /// - `InvalidRow`: A reading's timestamp falls outside a month partition
    async fn insert_readings(
        &self,
        scope: &TenantScope,
        partition: &PartitionHandle,
        readings: &[Reading],
    ) -> Result<u64>;

    /// The scope's readings in one partition with `created_at` in `range`,
    /// oldest first.
    async fn scan_partition(
        &self,
        scope: &TenantScope,
        partition: &PartitionHandle,
        range: &TimeRange,
    ) -> Result<Vec<Reading>>;

    /// Count/sum/min/max of the scope's readings in one partition within `range`.
    async fn aggregate_partition(
        &self,
        scope: &TenantScope,
        partition: &PartitionHandle,
        range: &TimeRange,
    ) -> Result<PartialAggregate>;

    /// Total number of the scope's readings across every partition.
    async fn count_readings(&self, scope: &TenantScope) -> Result<u64>;
}

/// Check that a reading may be stored in `partition`.
///
/// Month partitions only accept rows inside their range; the default
/// partition accepts anything.
pub(crate) fn check_partition_bounds(partition: &PartitionHandle, reading: &Reading) -> Result<()> {
    if let Some(range) = partition.range() {
        if !range.contains(reading.created_at) {
            return Err(MetadataError::InvalidRow(format!(
                "reading {} at {} does not belong to partition {}",
                reading.id, reading.created_at, partition
            )));
        }
    }
    Ok(())
}

//! Tenant-Scoped Reading Store
//!
//! The only path by which readings are written or read. Every operation runs
//! inside a [`ScopedReadingStore`], which can only be obtained by passing a
//! tenant identifier through the [`IsolationGuard`]. The scoped store then
//! forwards the scope to every substrate call, so reads are filtered by the
//! tenant and writes are stamped with it.
//!
//! ## Write Path
//!
//! ```text
//! insert(sensor, value, ts)
//!   │ value finite?                   no → InvalidReading
//!   │ sensor owned by scope?          no → SensorNotOwned
//!   ▼
//! PartitionManager::route_timestamp(ts) → ensure partition
//!   ▼
//! SensorStore::insert_readings(scope, partition, [row])
//! ```
//!
//! Bulk inserts group rows by partition and report per-row outcomes instead of
//! failing as a whole: a row is either inserted, rejected (caller error) or
//! failed (its partition could not be written).
//!
//! ## Read Path
//!
//! Scans and aggregates ask the partition manager for the existing partitions
//! overlapping the requested range, plus the default partition, and touch
//! nothing else. Scans are lazy: partitions are resolved on the first poll and
//! the next partition is fetched only when the stream is polled past the
//! current one.
//!
//! ## Usage
//!
//! ```ignore
//! let readings = ReadingStore::open(store, &PartitionConfig::default()).await?;
//!
//! let id = readings
//!     .with_tenant(Some("tenant-a"), |scoped| async move {
//!         scoped.insert(sensor_id, 21.5, Utc::now()).await
//!     })
//!     .await?;
//! ```

use crate::config::PartitionConfig;
use crate::error::{Error, Result};
use crate::manager::PartitionManager;
use chrono::{DateTime, Utc};
use futures::stream::{self, BoxStream, StreamExt};
use sensorhouse_metadata::{
    truncate_micros, CreateSensor, CreateTenant, IsolationGuard, NewReading, PartitionHandle,
    PartialAggregate, Reading, Sensor, SensorStore, Tenant, TenantId, TenantScope, TimeRange,
};
use sensorhouse_observability::metrics;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet, VecDeque};
use std::fmt::{Display, Formatter};
use std::future::Future;
use std::str::FromStr;
use std::sync::Arc;
use std::time::{Duration, Instant};
use uuid::Uuid;

/// Aggregate function over a window of readings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AggregateFn {
    Count,
    Avg,
    Sum,
    Min,
    Max,
}

impl AggregateFn {
    /// Evaluate against merged partials. `None` when there is nothing to
    /// aggregate, except for `Count`, which is zero.
    pub fn apply(&self, partial: &PartialAggregate) -> Option<f64> {
        match self {
            AggregateFn::Count => Some(partial.count as f64),
            AggregateFn::Avg => partial.avg(),
            AggregateFn::Sum => (partial.count > 0).then_some(partial.sum),
            AggregateFn::Min => partial.min,
            AggregateFn::Max => partial.max,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            AggregateFn::Count => "count",
            AggregateFn::Avg => "avg",
            AggregateFn::Sum => "sum",
            AggregateFn::Min => "min",
            AggregateFn::Max => "max",
        }
    }
}

impl Display for AggregateFn {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AggregateFn {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "count" => Ok(AggregateFn::Count),
            "avg" | "mean" => Ok(AggregateFn::Avg),
            "sum" => Ok(AggregateFn::Sum),
            "min" => Ok(AggregateFn::Min),
            "max" => Ok(AggregateFn::Max),
            other => Err(format!("unknown aggregate function: {}", other)),
        }
    }
}

/// Per-row result of a bulk insert.
///
/// `submitted == inserted + rejected + failed` always holds.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchOutcome {
    pub submitted: u64,
    pub inserted: u64,
    /// Rows refused before reaching storage (unowned sensor, non-finite value)
    pub rejected: u64,
    /// Rows whose partition could not be created or written
    pub failed: u64,
}

impl BatchOutcome {
    pub fn is_complete(&self) -> bool {
        self.inserted == self.submitted
    }
}

/// Entry point to the reading path. Cheap to clone.
#[derive(Clone)]
pub struct ReadingStore {
    store: Arc<dyn SensorStore>,
    partitions: Arc<PartitionManager>,
}

impl ReadingStore {
    pub fn new(store: Arc<dyn SensorStore>, partitions: Arc<PartitionManager>) -> Self {
        Self { store, partitions }
    }

    /// Build a partition manager from `config`, bootstrap its horizon and
    /// return a store routed through it.
    pub async fn open(store: Arc<dyn SensorStore>, config: &PartitionConfig) -> Result<Self> {
        let partitions = Arc::new(PartitionManager::new(store.clone(), config)?);
        partitions.bootstrap().await?;
        Ok(Self::new(store, partitions))
    }

    pub fn partition_manager(&self) -> &Arc<PartitionManager> {
        &self.partitions
    }

    /// Bind an isolation context for one operation.
    ///
    /// Fails with `MissingTenantContext` without touching storage when the
    /// identifier is absent or blank.
    pub fn scope(&self, tenant: Option<&str>) -> Result<ScopedReadingStore> {
        match IsolationGuard::enter(tenant) {
            Ok(scope) => Ok(self.scoped(scope)),
            Err(e) => {
                metrics::ISOLATION_REJECTIONS_TOTAL.inc();
                tracing::debug!("Rejected operation without tenant context");
                Err(e.into())
            }
        }
    }

    /// Bind an isolation context for an already validated tenant.
    pub fn scope_for(&self, tenant_id: &TenantId) -> ScopedReadingStore {
        self.scoped(IsolationGuard::enter_id(tenant_id))
    }

    fn scoped(&self, scope: TenantScope) -> ScopedReadingStore {
        ScopedReadingStore {
            store: self.store.clone(),
            partitions: self.partitions.clone(),
            scope,
        }
    }

    /// Run `operation` inside the isolation context of `tenant`.
    pub async fn with_tenant<F, Fut, T>(&self, tenant: Option<&str>, operation: F) -> Result<T>
    where
        F: FnOnce(ScopedReadingStore) -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let scoped = self.scope(tenant)?;
        operation(scoped).await
    }

    // ============================================================
    // ADMINISTRATIVE OPERATIONS (unscoped)
    // ============================================================

    pub async fn create_tenant(&self, name: &str, plan_type: Option<String>) -> Result<Tenant> {
        let tenant = self
            .store
            .create_tenant(CreateTenant {
                name: name.to_string(),
                plan_type,
            })
            .await?;
        tracing::info!(tenant = %tenant.id, name = %tenant.name, "Tenant created");
        Ok(tenant)
    }

    pub async fn list_tenants(&self) -> Result<Vec<Tenant>> {
        Ok(self.store.list_tenants().await?)
    }

    pub async fn delete_tenant(&self, tenant_id: &TenantId) -> Result<()> {
        self.store.delete_tenant(tenant_id).await?;
        tracing::info!(tenant = %tenant_id, "Tenant deleted");
        Ok(())
    }

    pub async fn partitions(&self) -> Result<Vec<PartitionHandle>> {
        self.partitions.list_partitions().await
    }
}

/// Reading operations confined to one tenant.
#[derive(Clone)]
pub struct ScopedReadingStore {
    store: Arc<dyn SensorStore>,
    partitions: Arc<PartitionManager>,
    scope: TenantScope,
}

impl ScopedReadingStore {
    pub fn tenant_id(&self) -> &TenantId {
        self.scope.tenant_id()
    }

    pub fn scope(&self) -> &TenantScope {
        &self.scope
    }

    // ============================================================
    // SENSORS
    // ============================================================

    pub async fn create_sensor(&self, sensor: CreateSensor) -> Result<Sensor> {
        let sensor = self.store.create_sensor(&self.scope, sensor).await?;
        tracing::debug!(tenant = %self.tenant_id(), sensor = %sensor.id, "Sensor created");
        Ok(sensor)
    }

    pub async fn list_sensors(&self) -> Result<Vec<Sensor>> {
        Ok(self.store.list_sensors(&self.scope).await?)
    }

    pub async fn get_sensor(&self, sensor_id: Uuid) -> Result<Option<Sensor>> {
        Ok(self.store.get_sensor(&self.scope, sensor_id).await?)
    }

    // ============================================================
    // WRITES
    // ============================================================

    /// Insert one reading and return its identifier.
    pub async fn insert(&self, sensor_id: Uuid, value: f64, created_at: DateTime<Utc>) -> Result<Uuid> {
        self.insert_reading(NewReading::new(sensor_id, value, created_at))
            .await
    }

    /// Insert one reading, carrying its metadata.
    ///
    /// Any tenant id on the row is ignored in favour of the scope's.
    pub async fn insert_reading(&self, reading: NewReading) -> Result<Uuid> {
        let tenant = self.tenant_id().to_string();

        if !reading.value.is_finite() {
            metrics::READINGS_REJECTED_TOTAL
                .with_label_values(&[&tenant, "invalid_value"])
                .inc();
            return Err(Error::InvalidReading(format!(
                "value {} is not finite",
                reading.value
            )));
        }

        if self.get_sensor(reading.sensor_id).await?.is_none() {
            metrics::READINGS_REJECTED_TOTAL
                .with_label_values(&[&tenant, "sensor_not_owned"])
                .inc();
            return Err(Error::SensorNotOwned {
                sensor_id: reading.sensor_id,
            });
        }

        let row = self.stamp(reading);
        let partition = self.partitions.ensure_partition(row.created_at).await?;
        self.store
            .insert_readings(&self.scope, &partition, std::slice::from_ref(&row))
            .await?;

        metrics::READINGS_INSERTED_TOTAL
            .with_label_values(&[&tenant])
            .inc();
        tracing::trace!(tenant = %tenant, partition = %partition, reading = %row.id, "Reading inserted");

        Ok(row.id)
    }

    /// Insert many readings. Not atomic: see [`BatchOutcome`].
    ///
    /// Only a failure to look up the tenant's sensors fails the whole call.
    pub async fn insert_batch(&self, readings: Vec<NewReading>) -> Result<BatchOutcome> {
        self.ingest(readings, "api").await
    }

    pub(crate) async fn ingest(&self, readings: Vec<NewReading>, source: &str) -> Result<BatchOutcome> {
        let tenant = self.tenant_id().to_string();
        let mut outcome = BatchOutcome {
            submitted: readings.len() as u64,
            ..Default::default()
        };
        metrics::INGEST_BATCH_SIZE
            .with_label_values(&[source])
            .observe(readings.len() as f64);

        let owned: HashSet<Uuid> = self
            .list_sensors()
            .await?
            .into_iter()
            .map(|s| s.id)
            .collect();

        // Group by partition so each segment is written once
        let mut groups: BTreeMap<PartitionHandle, Vec<Reading>> = BTreeMap::new();
        for reading in readings {
            if !reading.value.is_finite() {
                outcome.rejected += 1;
                metrics::READINGS_REJECTED_TOTAL
                    .with_label_values(&[&tenant, "invalid_value"])
                    .inc();
                continue;
            }
            if !owned.contains(&reading.sensor_id) {
                outcome.rejected += 1;
                metrics::READINGS_REJECTED_TOTAL
                    .with_label_values(&[&tenant, "sensor_not_owned"])
                    .inc();
                continue;
            }

            let row = self.stamp(reading);
            groups
                .entry(self.partitions.route_timestamp(row.created_at))
                .or_default()
                .push(row);
        }

        for (partition, rows) in groups {
            let written = match self.partitions.ensure(&partition).await {
                Ok(()) => self
                    .store
                    .insert_readings(&self.scope, &partition, &rows)
                    .await
                    .map_err(Error::from),
                Err(e) => Err(e),
            };

            match written {
                Ok(n) => outcome.inserted += n,
                Err(e) => {
                    outcome.failed += rows.len() as u64;
                    tracing::warn!(
                        tenant = %tenant,
                        partition = %partition,
                        rows = rows.len(),
                        error = %e,
                        "Partition write failed"
                    );
                }
            }
        }

        metrics::READINGS_INSERTED_TOTAL
            .with_label_values(&[&tenant])
            .inc_by(outcome.inserted);
        if outcome.failed > 0 {
            metrics::READINGS_FAILED_TOTAL
                .with_label_values(&[&tenant])
                .inc_by(outcome.failed);
        }

        tracing::debug!(
            tenant = %tenant,
            source = source,
            submitted = outcome.submitted,
            inserted = outcome.inserted,
            rejected = outcome.rejected,
            failed = outcome.failed,
            "Batch ingested"
        );

        Ok(outcome)
    }

    /// Turn a submitted reading into a stored row owned by the scope's tenant.
    fn stamp(&self, reading: NewReading) -> Reading {
        if let Some(claimed) = reading.tenant_id.as_deref() {
            if claimed.trim() != self.tenant_id().as_str() {
                tracing::warn!(
                    tenant = %self.tenant_id(),
                    claimed = claimed,
                    sensor = %reading.sensor_id,
                    "Overriding tenant id supplied on reading"
                );
            }
        }

        Reading {
            id: Uuid::new_v4(),
            sensor_id: reading.sensor_id,
            tenant_id: self.tenant_id().clone(),
            value: reading.value,
            created_at: truncate_micros(reading.created_at),
            metadata: reading.metadata,
        }
    }

    // ============================================================
    // READS
    // ============================================================

    /// Stream the tenant's readings with `from <= created_at < to`.
    ///
    /// Rows come out partition by partition, oldest first within each. The
    /// stream is finite and cannot be restarted; after a substrate error it
    /// yields that error and ends.
    pub fn range_scan(
        &self,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<BoxStream<'static, Result<Reading>>> {
        let range = TimeRange::new(from, to)?;

        let state = ScanState {
            store: self.store.clone(),
            partitions: self.partitions.clone(),
            scope: self.scope.clone(),
            range,
            pending: None,
            buffer: VecDeque::new(),
        };

        Ok(stream::unfold(state, |mut state| async move {
            loop {
                if let Some(reading) = state.buffer.pop_front() {
                    return Some((Ok(reading), state));
                }

                if state.pending.is_none() {
                    let resolved = state.partitions.partitions_for_range(&state.range).await;
                    match resolved {
                        Ok(found) => state.pending = Some(found.into()),
                        Err(e) => {
                            state.pending = Some(VecDeque::new());
                            return Some((Err(e), state));
                        }
                    }
                }

                let partition = state.pending.as_mut()?.pop_front()?;
                metrics::PARTITIONS_SCANNED_TOTAL.inc();
                let start = Instant::now();

                match state
                    .store
                    .scan_partition(&state.scope, &partition, &state.range)
                    .await
                {
                    Ok(rows) => {
                        metrics::QUERY_LATENCY
                            .with_label_values(&["scan"])
                            .observe(start.elapsed().as_secs_f64());
                        tracing::trace!(partition = %partition, rows = rows.len(), "Partition scanned");
                        state.buffer = rows.into();
                    }
                    Err(e) => {
                        state.pending = Some(VecDeque::new());
                        return Some((Err(e.into()), state));
                    }
                }
            }
        })
        .boxed())
    }

    /// Aggregate over the trailing window `[now - window, now]`.
    pub async fn aggregate(&self, window: Duration, function: AggregateFn) -> Result<Option<f64>> {
        let range = TimeRange::trailing(Utc::now(), window)?;
        self.aggregate_range(&range, function).await
    }

    /// Aggregate over an explicit range, touching only overlapping partitions
    /// and the default partition.
    pub async fn aggregate_range(&self, range: &TimeRange, function: AggregateFn) -> Result<Option<f64>> {
        let start = Instant::now();
        let mut total = PartialAggregate::default();

        for partition in self.partitions.partitions_for_range(range).await? {
            metrics::PARTITIONS_SCANNED_TOTAL.inc();
            let partial = self
                .store
                .aggregate_partition(&self.scope, &partition, range)
                .await?;
            total.merge(&partial);
        }

        metrics::QUERY_LATENCY
            .with_label_values(&["aggregate"])
            .observe(start.elapsed().as_secs_f64());

        Ok(function.apply(&total))
    }

    /// Total number of the tenant's readings.
    pub async fn count(&self) -> Result<u64> {
        Ok(self.store.count_readings(&self.scope).await?)
    }
}

struct ScanState {
    store: Arc<dyn SensorStore>,
    partitions: Arc<PartitionManager>,
    scope: TenantScope,
    range: TimeRange,
    /// Unresolved until the first poll.
    pending: Option<VecDeque<PartitionHandle>>,
    buffer: VecDeque<Reading>,
}

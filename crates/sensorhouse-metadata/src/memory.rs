//! In-Memory Sensor Store
//!
//! A [`SensorStore`] that keeps everything in process memory. Used by tests,
//! by `sensorctl --store :memory:`, and anywhere the isolation and partition
//! contracts need to be checked without a database.
//!
//! Besides storing data it keeps an access log:
//! - `calls`: number of trait calls that reached the store
//! - `partition_creates`: number of segments actually created (not no-ops)
//! - `scanned`: the partitions the most recent scans and aggregates touched,
//!   oldest first, capped at [`SCAN_LOG_CAPACITY`] entries
//!
//! Individual partitions can be marked unavailable to simulate a substrate
//! outage for that segment.

use crate::error::{MetadataError, Result};
use crate::partition::PartitionHandle;
use crate::tenant::{TenantId, TenantScope};
use crate::types::*;
use crate::{check_partition_bounds, SensorStore};
use async_trait::async_trait;
use std::collections::{BTreeMap, HashMap, HashSet, VecDeque};
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::sync::{Mutex, RwLock};
use uuid::Uuid;

/// Number of partition accesses kept in the scan log.
pub const SCAN_LOG_CAPACITY: usize = 1024;

#[derive(Default)]
struct Inner {
    tenants: BTreeMap<TenantId, Tenant>,
    sensors: HashMap<Uuid, Sensor>,
    partitions: BTreeMap<PartitionHandle, Vec<Reading>>,
    unavailable: HashSet<PartitionHandle>,
}

/// Snapshot of the store's access log.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AccessStats {
    pub calls: u64,
    pub partition_creates: u64,
    pub scanned: Vec<PartitionHandle>,
}

/// In-memory store backed by per-partition vectors.
#[derive(Default)]
pub struct InMemorySensorStore {
    inner: RwLock<Inner>,
    calls: AtomicU64,
    partition_creates: AtomicU64,
    scanned: Mutex<VecDeque<PartitionHandle>>,
}

impl InMemorySensorStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of the access log.
    pub async fn access_stats(&self) -> AccessStats {
        AccessStats {
            calls: self.calls.load(Ordering::Relaxed),
            partition_creates: self.partition_creates.load(Ordering::Relaxed),
            scanned: self.scanned.lock().await.iter().copied().collect(),
        }
    }

    /// Clear the access log (useful for testing)
    pub async fn reset_access_stats(&self) {
        self.calls.store(0, Ordering::Relaxed);
        self.partition_creates.store(0, Ordering::Relaxed);
        self.scanned.lock().await.clear();
    }

    /// Make every read or write against `partition` fail until re-enabled.
    pub async fn set_partition_unavailable(&self, partition: PartitionHandle, unavailable: bool) {
        let mut inner = self.inner.write().await;
        if unavailable {
            inner.unavailable.insert(partition);
        } else {
            inner.unavailable.remove(&partition);
        }
    }

    fn record_call(&self) {
        self.calls.fetch_add(1, Ordering::Relaxed);
    }

    async fn record_scan(&self, partition: &PartitionHandle) {
        let mut scanned = self.scanned.lock().await;
        if scanned.len() == SCAN_LOG_CAPACITY {
            scanned.pop_front();
        }
        scanned.push_back(*partition);
    }
}

fn check_available(inner: &Inner, partition: &PartitionHandle) -> Result<()> {
    if inner.unavailable.contains(partition) {
        return Err(MetadataError::Unavailable(partition.to_string()));
    }
    Ok(())
}

#[async_trait]
impl SensorStore for InMemorySensorStore {
    async fn create_tenant(&self, tenant: CreateTenant) -> Result<Tenant> {
        self.record_call();
        let tenant = Tenant {
            id: TenantId::generate(),
            name: tenant.name,
            plan_type: tenant
                .plan_type
                .unwrap_or_else(|| DEFAULT_PLAN_TYPE.to_string()),
        };
        self.inner
            .write()
            .await
            .tenants
            .insert(tenant.id.clone(), tenant.clone());
        Ok(tenant)
    }

    async fn list_tenants(&self) -> Result<Vec<Tenant>> {
        self.record_call();
        let inner = self.inner.read().await;
        let mut tenants: Vec<Tenant> = inner.tenants.values().cloned().collect();
        tenants.sort_by(|a, b| a.name.cmp(&b.name).then_with(|| a.id.cmp(&b.id)));
        Ok(tenants)
    }

    async fn delete_tenant(&self, tenant_id: &TenantId) -> Result<()> {
        self.record_call();
        let mut inner = self.inner.write().await;
        if inner.tenants.remove(tenant_id).is_none() {
            return Err(MetadataError::TenantNotFound(tenant_id.to_string()));
        }
        inner.sensors.retain(|_, s| &s.tenant_id != tenant_id);
        for rows in inner.partitions.values_mut() {
            rows.retain(|r| &r.tenant_id != tenant_id);
        }
        Ok(())
    }

    async fn create_sensor(&self, scope: &TenantScope, sensor: CreateSensor) -> Result<Sensor> {
        self.record_call();
        let mut inner = self.inner.write().await;
        if !inner.tenants.contains_key(scope.tenant_id()) {
            return Err(MetadataError::TenantNotFound(scope.tenant_id().to_string()));
        }

        let sensor = Sensor {
            id: Uuid::new_v4(),
            tenant_id: scope.tenant_id().clone(),
            name: sensor.name,
            sensor_type: sensor
                .sensor_type
                .unwrap_or_else(|| DEFAULT_SENSOR_TYPE.to_string()),
            status: sensor.status,
        };
        inner.sensors.insert(sensor.id, sensor.clone());
        Ok(sensor)
    }

    async fn list_sensors(&self, scope: &TenantScope) -> Result<Vec<Sensor>> {
        self.record_call();
        let inner = self.inner.read().await;
        let mut sensors: Vec<Sensor> = inner
            .sensors
            .values()
            .filter(|s| scope.admits(&s.tenant_id))
            .cloned()
            .collect();
        sensors.sort_by(|a, b| a.name.cmp(&b.name).then_with(|| a.id.cmp(&b.id)));
        Ok(sensors)
    }

    async fn get_sensor(&self, scope: &TenantScope, sensor_id: Uuid) -> Result<Option<Sensor>> {
        self.record_call();
        let inner = self.inner.read().await;
        Ok(inner
            .sensors
            .get(&sensor_id)
            .filter(|s| scope.admits(&s.tenant_id))
            .cloned())
    }

    async fn create_partition(&self, partition: &PartitionHandle) -> Result<()> {
        self.record_call();
        let mut inner = self.inner.write().await;
        if !inner.partitions.contains_key(partition) {
            inner.partitions.insert(*partition, Vec::new());
            self.partition_creates.fetch_add(1, Ordering::Relaxed);
        }
        Ok(())
    }

    async fn list_partitions(&self) -> Result<Vec<PartitionHandle>> {
        self.record_call();
        Ok(self.inner.read().await.partitions.keys().copied().collect())
    }

    async fn insert_readings(
        &self,
        scope: &TenantScope,
        partition: &PartitionHandle,
        readings: &[Reading],
    ) -> Result<u64> {
        self.record_call();
        for reading in readings {
            check_partition_bounds(partition, reading)?;
        }

        let mut inner = self.inner.write().await;
        check_available(&inner, partition)?;
        let rows = inner
            .partitions
            .get_mut(partition)
            .ok_or_else(|| MetadataError::PartitionNotFound(partition.to_string()))?;

        rows.extend(readings.iter().map(|r| Reading {
            tenant_id: scope.tenant_id().clone(),
            created_at: truncate_micros(r.created_at),
            ..r.clone()
        }));
        Ok(readings.len() as u64)
    }

    async fn scan_partition(
        &self,
        scope: &TenantScope,
        partition: &PartitionHandle,
        range: &TimeRange,
    ) -> Result<Vec<Reading>> {
        self.record_call();
        self.record_scan(partition).await;
        let inner = self.inner.read().await;
        check_available(&inner, partition)?;
        let Some(rows) = inner.partitions.get(partition) else {
            return Ok(Vec::new());
        };

        let mut matched: Vec<Reading> = rows
            .iter()
            .filter(|r| scope.admits(&r.tenant_id) && range.contains(r.created_at))
            .cloned()
            .collect();
        matched.sort_by_key(|r| r.created_at);
        Ok(matched)
    }

    async fn aggregate_partition(
        &self,
        scope: &TenantScope,
        partition: &PartitionHandle,
        range: &TimeRange,
    ) -> Result<PartialAggregate> {
        self.record_call();
        self.record_scan(partition).await;
        let inner = self.inner.read().await;
        check_available(&inner, partition)?;

        let mut partial = PartialAggregate::default();
        if let Some(rows) = inner.partitions.get(partition) {
            rows.iter()
                .filter(|r| scope.admits(&r.tenant_id) && range.contains(r.created_at))
                .for_each(|r| partial.observe(r.value));
        }
        Ok(partial)
    }

    async fn count_readings(&self, scope: &TenantScope) -> Result<u64> {
        self.record_call();
        let inner = self.inner.read().await;
        Ok(inner
            .partitions
            .values()
            .flat_map(|rows| rows.iter())
            .filter(|r| scope.admits(&r.tenant_id))
            .count() as u64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tenant::IsolationGuard;
    use chrono::{Duration, Utc};

    async fn setup() -> (InMemorySensorStore, TenantScope, TenantScope) {
        let store = InMemorySensorStore::new();
        let a = store
            .create_tenant(CreateTenant {
                name: "Tenant A".to_string(),
                plan_type: None,
            })
            .await
            .unwrap();
        let b = store
            .create_tenant(CreateTenant {
                name: "Tenant B".to_string(),
                plan_type: Some("pro".to_string()),
            })
            .await
            .unwrap();
        (
            store,
            IsolationGuard::enter_id(&a.id),
            IsolationGuard::enter_id(&b.id),
        )
    }

    fn reading(scope: &TenantScope, sensor_id: Uuid, value: f64, at: chrono::DateTime<Utc>) -> Reading {
        Reading {
            id: Uuid::new_v4(),
            sensor_id,
            tenant_id: scope.tenant_id().clone(),
            value,
            created_at: at,
            metadata: None,
        }
    }

    #[tokio::test]
    async fn test_sensor_visibility_is_scoped() {
        let (store, a, b) = setup().await;
        let sensor_a = store.create_sensor(&a, CreateSensor::named("A1")).await.unwrap();
        store.create_sensor(&b, CreateSensor::named("B1")).await.unwrap();

        let listed = store.list_sensors(&a).await.unwrap();
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].name, "A1");
        assert_eq!(listed[0].sensor_type, DEFAULT_SENSOR_TYPE);

        assert!(store.get_sensor(&a, sensor_a.id).await.unwrap().is_some());
        assert!(store.get_sensor(&b, sensor_a.id).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_create_sensor_for_unknown_tenant_fails() {
        let store = InMemorySensorStore::new();
        let scope = IsolationGuard::enter(Some("ghost")).unwrap();
        let err = store
            .create_sensor(&scope, CreateSensor::named("S"))
            .await
            .unwrap_err();
        assert!(matches!(err, MetadataError::TenantNotFound(_)));
    }

    #[tokio::test]
    async fn test_insert_stamps_scope_tenant() {
        let (store, a, b) = setup().await;
        let sensor = store.create_sensor(&a, CreateSensor::named("A1")).await.unwrap();
        let now = Utc::now();
        let partition = PartitionHandle::month_of(now);
        store.create_partition(&partition).await.unwrap();

        // Row claims tenant B but is written under A's scope
        let spoofed = reading(&b, sensor.id, 1.0, now);
        store.insert_readings(&a, &partition, &[spoofed]).await.unwrap();

        assert_eq!(store.count_readings(&a).await.unwrap(), 1);
        assert_eq!(store.count_readings(&b).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_insert_into_missing_partition_fails() {
        let (store, a, _) = setup().await;
        let now = Utc::now();
        let err = store
            .insert_readings(&a, &PartitionHandle::month_of(now), &[reading(&a, Uuid::new_v4(), 1.0, now)])
            .await
            .unwrap_err();
        assert!(matches!(err, MetadataError::PartitionNotFound(_)));
    }

    #[tokio::test]
    async fn test_insert_outside_partition_bounds_fails() {
        let (store, a, _) = setup().await;
        let now = Utc::now();
        let partition = PartitionHandle::month_of(now);
        store.create_partition(&partition).await.unwrap();

        let err = store
            .insert_readings(&a, &partition, &[reading(&a, Uuid::new_v4(), 1.0, now + Duration::days(62))])
            .await
            .unwrap_err();
        assert!(matches!(err, MetadataError::InvalidRow(_)));
    }

    #[tokio::test]
    async fn test_create_partition_is_idempotent() {
        let store = InMemorySensorStore::new();
        let partition = PartitionHandle::month(2026, 10).unwrap();
        store.create_partition(&partition).await.unwrap();
        store.create_partition(&partition).await.unwrap();

        assert_eq!(store.list_partitions().await.unwrap(), vec![partition]);
        assert_eq!(store.access_stats().await.partition_creates, 1);
    }

    #[tokio::test]
    async fn test_scan_and_aggregate_filter_by_tenant_and_range() {
        let (store, a, b) = setup().await;
        let sensor_a = store.create_sensor(&a, CreateSensor::named("A1")).await.unwrap();
        let sensor_b = store.create_sensor(&b, CreateSensor::named("B1")).await.unwrap();
        store.create_partition(&PartitionHandle::Default).await.unwrap();

        let t0 = crate::types::truncate_micros(Utc::now());
        let rows_a: Vec<Reading> = (0..5)
            .map(|i| reading(&a, sensor_a.id, i as f64, t0 + Duration::seconds(i)))
            .collect();
        let rows_b = vec![reading(&b, sensor_b.id, 100.0, t0)];
        store.insert_readings(&a, &PartitionHandle::Default, &rows_a).await.unwrap();
        store.insert_readings(&b, &PartitionHandle::Default, &rows_b).await.unwrap();

        let range = TimeRange::new(t0 + Duration::seconds(1), t0 + Duration::seconds(4)).unwrap();
        let scanned = store.scan_partition(&a, &PartitionHandle::Default, &range).await.unwrap();
        assert_eq!(scanned.len(), 3);
        assert!(scanned.iter().all(|r| a.admits(&r.tenant_id)));

        let partial = store
            .aggregate_partition(&a, &PartitionHandle::Default, &range)
            .await
            .unwrap();
        assert_eq!(partial.count, 3);
        assert_eq!(partial.avg(), Some(2.0));
    }

    #[tokio::test]
    async fn test_unavailable_partition_rejects_writes() {
        let (store, a, _) = setup().await;
        store.create_partition(&PartitionHandle::Default).await.unwrap();
        store
            .set_partition_unavailable(PartitionHandle::Default, true)
            .await;

        let result = store
            .insert_readings(&a, &PartitionHandle::Default, &[reading(&a, Uuid::new_v4(), 1.0, Utc::now())])
            .await;
        assert!(matches!(result, Err(MetadataError::Unavailable(_))));

        let range = TimeRange::new(Utc::now() - Duration::minutes(1), Utc::now()).unwrap();
        assert!(matches!(
            store.scan_partition(&a, &PartitionHandle::Default, &range).await,
            Err(MetadataError::Unavailable(_))
        ));
        assert!(matches!(
            store.aggregate_partition(&a, &PartitionHandle::Default, &range).await,
            Err(MetadataError::Unavailable(_))
        ));
    }

    #[tokio::test]
    async fn test_scan_log_is_bounded() {
        let (store, a, _) = setup().await;
        let old = PartitionHandle::month(2026, 1).unwrap();
        store.create_partition(&old).await.unwrap();
        store.create_partition(&PartitionHandle::Default).await.unwrap();
        let range = TimeRange::new(Utc::now() - Duration::minutes(1), Utc::now()).unwrap();

        store.scan_partition(&a, &old, &range).await.unwrap();
        for _ in 0..SCAN_LOG_CAPACITY + 10 {
            store
                .aggregate_partition(&a, &PartitionHandle::Default, &range)
                .await
                .unwrap();
        }

        let scanned = store.access_stats().await.scanned;
        assert_eq!(scanned.len(), SCAN_LOG_CAPACITY);
        assert!(scanned.iter().all(|p| p.is_default()));
    }

    #[tokio::test]
    async fn test_delete_tenant_cascades() {
        let (store, a, b) = setup().await;
        let sensor = store.create_sensor(&a, CreateSensor::named("A1")).await.unwrap();
        store.create_sensor(&b, CreateSensor::named("B1")).await.unwrap();
        store.create_partition(&PartitionHandle::Default).await.unwrap();
        store
            .insert_readings(&a, &PartitionHandle::Default, &[reading(&a, sensor.id, 1.0, Utc::now())])
            .await
            .unwrap();

        store.delete_tenant(a.tenant_id()).await.unwrap();

        assert_eq!(store.count_readings(&a).await.unwrap(), 0);
        assert!(store.list_sensors(&a).await.unwrap().is_empty());
        assert_eq!(store.list_sensors(&b).await.unwrap().len(), 1);
        assert_eq!(store.list_tenants().await.unwrap().len(), 1);
        assert!(matches!(
            store.delete_tenant(a.tenant_id()).await,
            Err(MetadataError::TenantNotFound(_))
        ));
    }
}

//! SensorHouse Service
//!
//! One handle for everything a front end (HTTP controllers, `sensorctl`) needs.
//! Tenant-scoped calls take the raw tenant identifier exactly as it arrived
//! from the edge; the isolation guard validates it before anything else runs.

use crate::config::{SeedPlan, StorageConfig};
use crate::error::Result;
use crate::load::{LoadInjector, LoadReport};
use crate::seed::{SeedReport, Seeder};
use crate::stats::{StatsAggregator, TenantStats};
use crate::store::{AggregateFn, ReadingStore};
use chrono::{DateTime, Utc};
use futures::stream::BoxStream;
use sensorhouse_metadata::{
    CreateSensor, NewReading, PartitionHandle, Reading, Sensor, SensorStore, Tenant, TenantId,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use uuid::Uuid;

/// Tenant as listed to administrators.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TenantSummary {
    pub id: TenantId,
    pub name: String,
}

impl From<Tenant> for TenantSummary {
    fn from(tenant: Tenant) -> Self {
        Self {
            id: tenant.id,
            name: tenant.name,
        }
    }
}

pub struct SensorHouse {
    readings: ReadingStore,
    injector: LoadInjector,
    stats: StatsAggregator,
    seeder: Seeder,
    config: StorageConfig,
}

impl SensorHouse {
    /// Validate `config`, bootstrap partitions and wire up every component.
    pub async fn open(store: Arc<dyn SensorStore>, config: StorageConfig) -> Result<Self> {
        config.validate()?;
        sensorhouse_observability::init();

        let readings = ReadingStore::open(store, &config.partitions).await?;
        let injector = LoadInjector::new(readings.clone(), config.load.clone())?;
        let stats = StatsAggregator::new(readings.clone(), config.stats.clone());
        let seeder = Seeder::new(readings.clone());

        Ok(Self {
            readings,
            injector,
            stats,
            seeder,
            config,
        })
    }

    pub fn readings(&self) -> &ReadingStore {
        &self.readings
    }

    pub fn stats_aggregator(&self) -> &StatsAggregator {
        &self.stats
    }

    pub fn config(&self) -> &StorageConfig {
        &self.config
    }

    // ============================================================
    // TENANTS (administrative)
    // ============================================================

    pub async fn create_tenant(&self, name: &str, plan_type: Option<String>) -> Result<Tenant> {
        self.readings.create_tenant(name, plan_type).await
    }

    pub async fn list_tenants(&self) -> Result<Vec<TenantSummary>> {
        Ok(self
            .readings
            .list_tenants()
            .await?
            .into_iter()
            .map(TenantSummary::from)
            .collect())
    }

    pub async fn delete_tenant(&self, tenant: &str) -> Result<()> {
        let tenant_id = TenantId::parse(tenant)?;
        self.readings.delete_tenant(&tenant_id).await?;
        self.stats.invalidate(&tenant_id).await;
        Ok(())
    }

    // ============================================================
    // SENSORS
    // ============================================================

    pub async fn create_sensor(&self, tenant: Option<&str>, sensor: CreateSensor) -> Result<Sensor> {
        self.readings.scope(tenant)?.create_sensor(sensor).await
    }

    pub async fn list_sensors(&self, tenant: Option<&str>) -> Result<Vec<Sensor>> {
        self.readings.scope(tenant)?.list_sensors().await
    }

    // ============================================================
    // READINGS
    // ============================================================

    pub async fn insert(
        &self,
        tenant: Option<&str>,
        sensor_id: Uuid,
        value: f64,
        created_at: DateTime<Utc>,
    ) -> Result<Uuid> {
        self.readings
            .scope(tenant)?
            .insert(sensor_id, value, created_at)
            .await
    }

    pub async fn insert_batch(
        &self,
        tenant: Option<&str>,
        readings: Vec<NewReading>,
    ) -> Result<crate::store::BatchOutcome> {
        self.readings.scope(tenant)?.insert_batch(readings).await
    }

    pub fn scan(
        &self,
        tenant: Option<&str>,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<BoxStream<'static, Result<Reading>>> {
        self.readings.scope(tenant)?.range_scan(from, to)
    }

    pub async fn aggregate(
        &self,
        tenant: Option<&str>,
        window: Duration,
        function: AggregateFn,
    ) -> Result<Option<f64>> {
        self.readings
            .scope(tenant)?
            .aggregate(window, function)
            .await
    }

    // ============================================================
    // LOAD & STATS
    // ============================================================

    pub async fn start_load(&self, tenant: Option<&str>, amount: usize) -> Result<LoadReport> {
        self.injector.inject(tenant, amount).await
    }

    pub async fn get_stats(&self, tenant: Option<&str>) -> Result<TenantStats> {
        self.stats.stats(tenant).await
    }

    // ============================================================
    // ADMINISTRATION
    // ============================================================

    pub async fn partitions(&self) -> Result<Vec<PartitionHandle>> {
        self.readings.partitions().await
    }

    pub async fn seed(&self, plan: &SeedPlan) -> Result<SeedReport> {
        self.seeder.seed(plan).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::PartitionConfig;
    use crate::error::Error;
    use futures::TryStreamExt;
    use sensorhouse_metadata::InMemorySensorStore;

    async fn service() -> SensorHouse {
        let config = StorageConfig {
            partitions: PartitionConfig {
                months_back: 2,
                months_forward: 2,
                anchor: None,
            },
            ..Default::default()
        };
        SensorHouse::open(Arc::new(InMemorySensorStore::new()), config)
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn test_open_bootstraps_partitions() {
        let house = service().await;
        let partitions = house.partitions().await.unwrap();
        assert_eq!(partitions.len(), 6);
        assert!(partitions.contains(&PartitionHandle::Default));
    }

    #[tokio::test]
    async fn test_end_to_end_flow() {
        let house = service().await;
        let tenant = house.create_tenant("Acme", Some("pro".into())).await.unwrap();
        let id = tenant.id.to_string();

        house
            .create_sensor(Some(&id), CreateSensor::named("Boiler"))
            .await
            .unwrap();
        assert_eq!(house.list_sensors(Some(&id)).await.unwrap().len(), 1);

        let report = house.start_load(Some(&id), 250).await.unwrap();
        assert_eq!(report.rows_queued, 250);

        let stats = house.get_stats(Some(&id)).await.unwrap();
        assert_eq!(stats.total_rows, 250);
        assert_eq!(stats.write_rate, 50.0);

        let now = Utc::now();
        let rows: Vec<Reading> = house
            .scan(Some(&id), now - chrono::Duration::seconds(30), now + chrono::Duration::seconds(1))
            .unwrap()
            .try_collect()
            .await
            .unwrap();
        assert_eq!(rows.len(), 250);

        let count = house
            .aggregate(Some(&id), Duration::from_secs(30), AggregateFn::Count)
            .await
            .unwrap();
        assert_eq!(count, Some(250.0));

        let tenants = house.list_tenants().await.unwrap();
        assert_eq!(
            tenants,
            vec![TenantSummary {
                id: tenant.id.clone(),
                name: "Acme".to_string()
            }]
        );

        house.delete_tenant(&id).await.unwrap();
        assert!(house.list_tenants().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_tenant_scoped_calls_require_tenant() {
        let house = service().await;

        assert!(matches!(
            house.list_sensors(None).await,
            Err(Error::MissingTenantContext)
        ));
        assert!(matches!(
            house.start_load(Some(" "), 10).await,
            Err(Error::MissingTenantContext)
        ));
        assert!(matches!(
            house.get_stats(None).await,
            Err(Error::MissingTenantContext)
        ));
        assert!(matches!(
            house.delete_tenant("").await,
            Err(Error::MissingTenantContext)
        ));
    }

    #[tokio::test]
    async fn test_invalid_config_rejected() {
        let mut config = StorageConfig::default();
        config.stats.cache_capacity = 0;

        let result = SensorHouse::open(Arc::new(InMemorySensorStore::new()), config).await;
        assert!(matches!(result, Err(Error::Config(_))));
    }
}

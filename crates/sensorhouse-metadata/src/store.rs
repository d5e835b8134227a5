//! SQLite Sensor Store Implementation
//!
//! This module implements the SensorStore trait using SQLite as the backend.
//!
//! ## What Does This Do?
//!
//! SqliteSensorStore persists everything SensorHouse knows about:
//! - Tenants and their plan type
//! - Sensors, each owned by one tenant
//! - Readings, one table per calendar month plus a default table
//!
//! ## Usage
//!
//! ### File-Based
//! ```ignore
//! use sensorhouse_metadata::{SqliteSensorStore, SensorStore};
//!
//! // Creates sensorhouse.db (or opens it if it exists)
//! let store = SqliteSensorStore::new("sensorhouse.db").await?;
//! ```
//!
//! ### In-Memory (Testing)
//! ```ignore
//! let store = SqliteSensorStore::new_in_memory().await?;
//! ```
//!
//! ## Implementation Details
//!
//! ### Partition Tables
//! - `sensor_readings_YYYY_MM` for each month, `sensor_readings_default` for the rest
//! - Created with `CREATE TABLE IF NOT EXISTS`, so concurrent creators converge
//! - Each table is registered in `reading_partitions`; a write to an
//!   unregistered partition fails with `PartitionNotFound`
//! - Primary key `(id, created_at)`, secondary index `(tenant_id, created_at DESC)`
//!
//! ### Tenant Predicate
//! Every sensor and reading query binds the scope's tenant as a parameter.
//! Table names are built from integers by [`PartitionHandle::table_name`] and
//! never from caller input.
//!
//! ### Timestamps
//! Reading timestamps are stored as microseconds since the Unix epoch.

use crate::{
    check_partition_bounds,
    error::{MetadataError, Result},
    partition::PartitionHandle,
    tenant::{TenantId, TenantScope},
    types::*,
    SensorStore,
};
use async_trait::async_trait;
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePool, SqlitePoolOptions, SqliteRow};
use sqlx::Row;
use std::path::Path;
use std::str::FromStr;
use std::time::Duration;
use uuid::Uuid;

/// SQLite-based sensor store implementation
pub struct SqliteSensorStore {
    pool: SqlitePool,
}

impl SqliteSensorStore {
    /// Create a new SQLite sensor store
    pub async fn new<P: AsRef<Path>>(path: P) -> Result<Self> {
        let options =
            SqliteConnectOptions::from_str(&format!("sqlite://{}", path.as_ref().display()))?
                .create_if_missing(true)
                .journal_mode(SqliteJournalMode::Wal)
                .busy_timeout(Duration::from_secs(5));

        let pool = SqlitePoolOptions::new()
            .max_connections(10)
            .connect_with(options)
            .await?;

        // Run migrations
        sqlx::migrate!("./migrations").run(&pool).await?;

        Ok(Self { pool })
    }

    /// Create in-memory database (for testing)
    ///
    /// Every SQLite connection opens its own in-memory database, so the pool
    /// is pinned to a single connection.
    pub async fn new_in_memory() -> Result<Self> {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await?;

        sqlx::migrate!("./migrations").run(&pool).await?;

        Ok(Self { pool })
    }

    fn now_ms() -> i64 {
        chrono::Utc::now().timestamp_millis()
    }

    async fn partition_exists(&self, partition: &PartitionHandle) -> Result<bool> {
        let row = sqlx::query("SELECT 1 FROM reading_partitions WHERE name = ?")
            .bind(partition.table_name())
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.is_some())
    }

    async fn partition_tables(&self) -> Result<Vec<String>> {
        let rows = sqlx::query("SELECT name FROM reading_partitions ORDER BY name")
            .fetch_all(&self.pool)
            .await?;
        rows.iter()
            .map(|row| row.try_get::<String, _>("name").map_err(MetadataError::from))
            .collect()
    }
}

fn parse_uuid(raw: &str) -> Result<Uuid> {
    Uuid::parse_str(raw).map_err(|e| MetadataError::InvalidRow(format!("bad uuid {}: {}", raw, e)))
}

fn row_to_tenant(row: &SqliteRow) -> Result<Tenant> {
    Ok(Tenant {
        id: TenantId::parse(row.try_get::<&str, _>("id")?)?,
        name: row.try_get("name")?,
        plan_type: row.try_get("plan_type")?,
    })
}

fn row_to_sensor(row: &SqliteRow) -> Result<Sensor> {
    Ok(Sensor {
        id: parse_uuid(row.try_get::<&str, _>("id")?)?,
        tenant_id: TenantId::parse(row.try_get::<&str, _>("tenant_id")?)?,
        name: row.try_get("name")?,
        sensor_type: row.try_get("type")?,
        status: row.try_get::<&str, _>("status")?.parse()?,
    })
}

fn row_to_reading(row: &SqliteRow) -> Result<Reading> {
    let micros: i64 = row.try_get("created_at")?;
    let created_at = from_micros(micros)
        .ok_or_else(|| MetadataError::InvalidRow(format!("bad timestamp {}", micros)))?;
    let metadata = match row.try_get::<Option<String>, _>("metadata")? {
        Some(json) => Some(serde_json::from_str(&json)?),
        None => None,
    };

    Ok(Reading {
        id: parse_uuid(row.try_get::<&str, _>("id")?)?,
        sensor_id: parse_uuid(row.try_get::<&str, _>("sensor_id")?)?,
        tenant_id: TenantId::parse(row.try_get::<&str, _>("tenant_id")?)?,
        value: row.try_get("value")?,
        created_at,
        metadata,
    })
}

fn row_to_partition(row: &SqliteRow) -> Result<PartitionHandle> {
    let year: Option<i64> = row.try_get("year")?;
    let month: Option<i64> = row.try_get("month")?;
    match (year, month) {
        (Some(year), Some(month)) => {
            let year = i32::try_from(year).ok();
            let month = u32::try_from(month).ok();
            year.zip(month)
                .and_then(|(y, m)| PartitionHandle::month(y, m))
                .ok_or_else(|| {
                    MetadataError::InvalidRow(format!("bad partition month {:?}/{:?}", year, month))
                })
        }
        _ => Ok(PartitionHandle::Default),
    }
}

#[async_trait]
impl SensorStore for SqliteSensorStore {
    async fn create_tenant(&self, tenant: CreateTenant) -> Result<Tenant> {
        let tenant = Tenant {
            id: TenantId::generate(),
            name: tenant.name,
            plan_type: tenant
                .plan_type
                .unwrap_or_else(|| DEFAULT_PLAN_TYPE.to_string()),
        };

        sqlx::query("INSERT INTO tenants (id, name, plan_type, created_at) VALUES (?, ?, ?, ?)")
            .bind(tenant.id.as_str())
            .bind(&tenant.name)
            .bind(&tenant.plan_type)
            .bind(Self::now_ms())
            .execute(&self.pool)
            .await?;

        Ok(tenant)
    }

    async fn list_tenants(&self) -> Result<Vec<Tenant>> {
        let rows = sqlx::query("SELECT id, name, plan_type FROM tenants ORDER BY name, id")
            .fetch_all(&self.pool)
            .await?;
        rows.iter().map(row_to_tenant).collect()
    }

    async fn delete_tenant(&self, tenant_id: &TenantId) -> Result<()> {
        let tables = self.partition_tables().await?;
        let mut tx = self.pool.begin().await?;

        for table in &tables {
            sqlx::query(&format!("DELETE FROM {} WHERE tenant_id = ?", table))
                .bind(tenant_id.as_str())
                .execute(&mut *tx)
                .await?;
        }

        sqlx::query("DELETE FROM sensors WHERE tenant_id = ?")
            .bind(tenant_id.as_str())
            .execute(&mut *tx)
            .await?;

        let result = sqlx::query("DELETE FROM tenants WHERE id = ?")
            .bind(tenant_id.as_str())
            .execute(&mut *tx)
            .await?;

        if result.rows_affected() == 0 {
            return Err(MetadataError::TenantNotFound(tenant_id.to_string()));
        }

        tx.commit().await?;
        Ok(())
    }

    async fn create_sensor(&self, scope: &TenantScope, sensor: CreateSensor) -> Result<Sensor> {
        let exists = sqlx::query("SELECT 1 FROM tenants WHERE id = ?")
            .bind(scope.tenant_id().as_str())
            .fetch_optional(&self.pool)
            .await?;
        if exists.is_none() {
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

        sqlx::query(
            "INSERT INTO sensors (id, tenant_id, name, type, status, created_at) \
             VALUES (?, ?, ?, ?, ?, ?)",
        )
        .bind(sensor.id.to_string())
        .bind(sensor.tenant_id.as_str())
        .bind(&sensor.name)
        .bind(&sensor.sensor_type)
        .bind(sensor.status.as_str())
        .bind(Self::now_ms())
        .execute(&self.pool)
        .await?;

        Ok(sensor)
    }

    async fn list_sensors(&self, scope: &TenantScope) -> Result<Vec<Sensor>> {
        let rows = sqlx::query(
            "SELECT id, tenant_id, name, type, status FROM sensors \
             WHERE tenant_id = ? ORDER BY name, id",
        )
        .bind(scope.tenant_id().as_str())
        .fetch_all(&self.pool)
        .await?;
        rows.iter().map(row_to_sensor).collect()
    }

    async fn get_sensor(&self, scope: &TenantScope, sensor_id: Uuid) -> Result<Option<Sensor>> {
        let row = sqlx::query(
            "SELECT id, tenant_id, name, type, status FROM sensors \
             WHERE id = ? AND tenant_id = ?",
        )
        .bind(sensor_id.to_string())
        .bind(scope.tenant_id().as_str())
        .fetch_optional(&self.pool)
        .await?;
        row.as_ref().map(row_to_sensor).transpose()
    }

    async fn create_partition(&self, partition: &PartitionHandle) -> Result<()> {
        let table = partition.table_name();
        let (year, month) = match *partition {
            PartitionHandle::Month { year, month } => (Some(year), Some(month as i64)),
            PartitionHandle::Default => (None, None),
        };

        // Each statement is idempotent on its own; no transaction, so racing
        // creators wait on the busy timeout instead of failing a lock upgrade.
        sqlx::query(&format!(
            "CREATE TABLE IF NOT EXISTS {} (\
                id TEXT NOT NULL, \
                sensor_id TEXT NOT NULL, \
                tenant_id TEXT NOT NULL, \
                value REAL NOT NULL, \
                created_at INTEGER NOT NULL, \
                metadata TEXT, \
                PRIMARY KEY (id, created_at))",
            table
        ))
        .execute(&self.pool)
        .await?;

        sqlx::query(&format!(
            "CREATE INDEX IF NOT EXISTS idx_{}_tenant_time ON {} (tenant_id, created_at DESC)",
            table, table
        ))
        .execute(&self.pool)
        .await?;

        sqlx::query(
            "INSERT OR IGNORE INTO reading_partitions (name, year, month, created_at) \
             VALUES (?, ?, ?, ?)",
        )
        .bind(&table)
        .bind(year)
        .bind(month)
        .bind(Self::now_ms())
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn list_partitions(&self) -> Result<Vec<PartitionHandle>> {
        let rows = sqlx::query("SELECT name, year, month FROM reading_partitions")
            .fetch_all(&self.pool)
            .await?;
        let mut partitions = rows
            .iter()
            .map(row_to_partition)
            .collect::<Result<Vec<_>>>()?;
        partitions.sort();
        Ok(partitions)
    }

    async fn insert_readings(
        &self,
        scope: &TenantScope,
        partition: &PartitionHandle,
        readings: &[Reading],
    ) -> Result<u64> {
        for reading in readings {
            check_partition_bounds(partition, reading)?;
        }
        if !self.partition_exists(partition).await? {
            return Err(MetadataError::PartitionNotFound(partition.to_string()));
        }

        let sql = format!(
            "INSERT INTO {} (id, sensor_id, tenant_id, value, created_at, metadata) \
             VALUES (?, ?, ?, ?, ?, ?)",
            partition.table_name()
        );

        let mut tx = self.pool.begin().await?;
        for reading in readings {
            let metadata = reading
                .metadata
                .as_ref()
                .map(serde_json::to_string)
                .transpose()?;

            sqlx::query(&sql)
                .bind(reading.id.to_string())
                .bind(reading.sensor_id.to_string())
                .bind(scope.tenant_id().as_str())
                .bind(reading.value)
                .bind(reading.created_at.timestamp_micros())
                .bind(metadata)
                .execute(&mut *tx)
                .await?;
        }
        tx.commit().await?;

        Ok(readings.len() as u64)
    }

    async fn scan_partition(
        &self,
        scope: &TenantScope,
        partition: &PartitionHandle,
        range: &TimeRange,
    ) -> Result<Vec<Reading>> {
        if !self.partition_exists(partition).await? {
            return Ok(Vec::new());
        }

        let rows = sqlx::query(&format!(
            "SELECT id, sensor_id, tenant_id, value, created_at, metadata FROM {} \
             WHERE tenant_id = ? AND created_at >= ? AND created_at < ? \
             ORDER BY created_at, id",
            partition.table_name()
        ))
        .bind(scope.tenant_id().as_str())
        .bind(range.from().timestamp_micros())
        .bind(range.to().timestamp_micros())
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(row_to_reading).collect()
    }

    async fn aggregate_partition(
        &self,
        scope: &TenantScope,
        partition: &PartitionHandle,
        range: &TimeRange,
    ) -> Result<PartialAggregate> {
        if !self.partition_exists(partition).await? {
            return Ok(PartialAggregate::default());
        }

        let row = sqlx::query(&format!(
            "SELECT COUNT(*) AS cnt, COALESCE(SUM(value), 0.0) AS total, \
             MIN(value) AS min_value, MAX(value) AS max_value FROM {} \
             WHERE tenant_id = ? AND created_at >= ? AND created_at < ?",
            partition.table_name()
        ))
        .bind(scope.tenant_id().as_str())
        .bind(range.from().timestamp_micros())
        .bind(range.to().timestamp_micros())
        .fetch_one(&self.pool)
        .await?;

        let count: i64 = row.try_get("cnt")?;
        Ok(PartialAggregate {
            count: count as u64,
            sum: row.try_get("total")?,
            min: row.try_get("min_value")?,
            max: row.try_get("max_value")?,
        })
    }

    async fn count_readings(&self, scope: &TenantScope) -> Result<u64> {
        let mut total = 0u64;
        for table in self.partition_tables().await? {
            let count: i64 = sqlx::query(&format!(
                "SELECT COUNT(*) AS cnt FROM {} WHERE tenant_id = ?",
                table
            ))
            .bind(scope.tenant_id().as_str())
            .fetch_one(&self.pool)
            .await?
            .try_get("cnt")?;
            total += count as u64;
        }
        Ok(total)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tenant::IsolationGuard;
    use chrono::{Duration as ChronoDuration, Utc};

    async fn tenant_scope(store: &SqliteSensorStore, name: &str) -> TenantScope {
        let tenant = store
            .create_tenant(CreateTenant {
                name: name.to_string(),
                plan_type: None,
            })
            .await
            .unwrap();
        IsolationGuard::enter_id(&tenant.id)
    }

    fn reading(sensor_id: Uuid, value: f64, at: chrono::DateTime<Utc>) -> Reading {
        Reading {
            id: Uuid::new_v4(),
            sensor_id,
            tenant_id: TenantId::parse("unstamped").unwrap(),
            value,
            created_at: truncate_micros(at),
            metadata: None,
        }
    }

    #[tokio::test]
    async fn test_create_and_list_tenants() {
        let store = SqliteSensorStore::new_in_memory().await.unwrap();
        tenant_scope(&store, "Beta").await;
        tenant_scope(&store, "Alpha").await;

        let tenants = store.list_tenants().await.unwrap();
        assert_eq!(tenants.len(), 2);
        assert_eq!(tenants[0].name, "Alpha");
        assert_eq!(tenants[0].plan_type, DEFAULT_PLAN_TYPE);
    }

    #[tokio::test]
    async fn test_sensor_lookup_respects_scope() {
        let store = SqliteSensorStore::new_in_memory().await.unwrap();
        let a = tenant_scope(&store, "A").await;
        let b = tenant_scope(&store, "B").await;

        let sensor = store
            .create_sensor(
                &a,
                CreateSensor {
                    name: "Pump".to_string(),
                    sensor_type: Some("fuel_pump".to_string()),
                    status: SensorStatus::Inactive,
                },
            )
            .await
            .unwrap();

        let fetched = store.get_sensor(&a, sensor.id).await.unwrap().unwrap();
        assert_eq!(fetched, sensor);
        assert!(store.get_sensor(&b, sensor.id).await.unwrap().is_none());
        assert!(store.list_sensors(&b).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_partition_tables_round_trip() {
        let store = SqliteSensorStore::new_in_memory().await.unwrap();
        let a = tenant_scope(&store, "A").await;
        let sensor = store.create_sensor(&a, CreateSensor::named("S")).await.unwrap();

        let now = Utc::now();
        let month = PartitionHandle::month_of(now);
        store.create_partition(&month).await.unwrap();
        store.create_partition(&month).await.unwrap();
        store.create_partition(&PartitionHandle::Default).await.unwrap();

        assert_eq!(
            store.list_partitions().await.unwrap(),
            vec![month, PartitionHandle::Default]
        );

        let mut row = reading(sensor.id, 42.5, now);
        row.metadata = Some(serde_json::json!({"source": "test"}));
        store.insert_readings(&a, &month, &[row.clone()]).await.unwrap();

        let range = month.range().unwrap();
        let scanned = store.scan_partition(&a, &month, &range).await.unwrap();
        assert_eq!(scanned.len(), 1);
        assert_eq!(scanned[0].id, row.id);
        assert_eq!(scanned[0].created_at, row.created_at);
        assert_eq!(scanned[0].metadata, row.metadata);
        assert_eq!(&scanned[0].tenant_id, a.tenant_id());
    }

    #[tokio::test]
    async fn test_insert_requires_partition() {
        let store = SqliteSensorStore::new_in_memory().await.unwrap();
        let a = tenant_scope(&store, "A").await;
        let now = Utc::now();

        let err = store
            .insert_readings(&a, &PartitionHandle::month_of(now), &[reading(Uuid::new_v4(), 1.0, now)])
            .await
            .unwrap_err();
        assert!(matches!(err, MetadataError::PartitionNotFound(_)));
    }

    #[tokio::test]
    async fn test_aggregate_and_count_are_tenant_filtered() {
        let store = SqliteSensorStore::new_in_memory().await.unwrap();
        let a = tenant_scope(&store, "A").await;
        let b = tenant_scope(&store, "B").await;
        store.create_partition(&PartitionHandle::Default).await.unwrap();

        let now = Utc::now();
        let rows: Vec<Reading> = [10.0, 20.0, 30.0]
            .iter()
            .map(|v| reading(Uuid::new_v4(), *v, now))
            .collect();
        store.insert_readings(&a, &PartitionHandle::Default, &rows).await.unwrap();
        store
            .insert_readings(&b, &PartitionHandle::Default, &[reading(Uuid::new_v4(), 1000.0, now)])
            .await
            .unwrap();

        let range = TimeRange::new(now - ChronoDuration::minutes(1), now + ChronoDuration::minutes(1)).unwrap();
        let partial = store
            .aggregate_partition(&a, &PartitionHandle::Default, &range)
            .await
            .unwrap();
        assert_eq!(partial.count, 3);
        assert_eq!(partial.avg(), Some(20.0));
        assert_eq!(partial.min, Some(10.0));
        assert_eq!(partial.max, Some(30.0));

        assert_eq!(store.count_readings(&a).await.unwrap(), 3);
        assert_eq!(store.count_readings(&b).await.unwrap(), 1);

        let empty = TimeRange::new(now + ChronoDuration::hours(1), now + ChronoDuration::hours(2)).unwrap();
        let none = store
            .aggregate_partition(&a, &PartitionHandle::Default, &empty)
            .await
            .unwrap();
        assert_eq!(none, PartialAggregate::default());
    }

    #[tokio::test]
    async fn test_delete_tenant_removes_readings() {
        let store = SqliteSensorStore::new_in_memory().await.unwrap();
        let a = tenant_scope(&store, "A").await;
        let sensor = store.create_sensor(&a, CreateSensor::named("S")).await.unwrap();
        store.create_partition(&PartitionHandle::Default).await.unwrap();
        store
            .insert_readings(&a, &PartitionHandle::Default, &[reading(sensor.id, 1.0, Utc::now())])
            .await
            .unwrap();

        store.delete_tenant(a.tenant_id()).await.unwrap();
        assert_eq!(store.count_readings(&a).await.unwrap(), 0);
        assert!(store.list_sensors(&a).await.unwrap().is_empty());
        assert!(matches!(
            store.delete_tenant(a.tenant_id()).await,
            Err(MetadataError::TenantNotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_file_backed_store_persists() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("sensorhouse.db");

        {
            let store = SqliteSensorStore::new(&path).await.unwrap();
            tenant_scope(&store, "Persistent").await;
            store.create_partition(&PartitionHandle::Default).await.unwrap();
            store.pool.close().await;
        }

        let reopened = SqliteSensorStore::new(&path).await.unwrap();
        assert_eq!(reopened.list_tenants().await.unwrap().len(), 1);
        assert_eq!(
            reopened.list_partitions().await.unwrap(),
            vec![PartitionHandle::Default]
        );
    }
}

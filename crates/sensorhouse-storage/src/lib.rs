//! SensorHouse Storage Layer
//!
//! The ingestion and query core of SensorHouse: tenant-scoped reads and writes
//! of sensor readings over monthly partitions.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────┐  ┌──────────────┐  ┌──────────────┐
//! │ LoadInjector │  │StatsAggregator│ │    Seeder    │
//! └──────┬───────┘  └──────┬───────┘  └──────┬───────┘
//!        └────────────┬────┴─────────────────┘
//!                     ▼
//!            ┌──────────────────┐   IsolationGuard
//!            │   ReadingStore   │◀── (TenantScope per call)
//!            └────────┬─────────┘
//!                     │ route / ensure
//!                     ▼
//!            ┌──────────────────┐
//!            │ PartitionManager │
//!            └────────┬─────────┘
//!                     ▼
//!               SensorStore (SQLite / in-memory)
//! ```
//!
//! ## Components
//!
//! - [`PartitionManager`]: timestamp → partition routing and idempotent creation
//! - [`ReadingStore`] / [`ScopedReadingStore`]: insert, bulk insert, lazy range
//!   scans, windowed aggregates and counts, always inside one tenant
//! - [`LoadInjector`]: synthetic write bursts against a tenant's sensors
//! - [`StatsAggregator`]: cached rolling write rate, read latency and row count
//! - [`Seeder`]: bulk fixture data
//! - [`SensorHouse`]: facade over all of the above
//!
//! ## Usage
//!
//! ```ignore
//! use sensorhouse_metadata::{SqliteSensorStore, CreateSensor};
//! use sensorhouse_storage::{SensorHouse, StorageConfig};
//!
//! let store = Arc::new(SqliteSensorStore::new("sensorhouse.db").await?);
//! let house = SensorHouse::open(store, StorageConfig::default()).await?;
//!
//! let tenant = house.create_tenant("Acme", None).await?;
//! let id = tenant.id.to_string();
//! house.create_sensor(Some(&id), CreateSensor::named("Boiler")).await?;
//!
//! house.start_load(Some(&id), 1000).await?;
//! let stats = house.get_stats(Some(&id)).await?;
//! ```

pub mod config;
pub mod error;
pub mod load;
pub mod manager;
pub mod seed;
pub mod service;
pub mod stats;
pub mod store;

pub use config::{LoadConfig, PartitionConfig, SeedPlan, StatsConfig, StorageConfig};
pub use error::{Error, Result};
pub use load::{LoadInjector, LoadReport};
pub use manager::PartitionManager;
pub use seed::{SeedReport, Seeder};
pub use service::{SensorHouse, TenantSummary};
pub use stats::{StatsAggregator, StatsCacheMetrics, TenantStats};
pub use store::{AggregateFn, BatchOutcome, ReadingStore, ScopedReadingStore};

//! Storage Configuration
//!
//! This module defines configuration for partitioning, stats, load injection
//! and seeding.
//!
//! ## PartitionConfig
//!
//! Controls the bootstrap horizon of monthly partitions:
//!
//! - **months_back**: Months before the anchor month to create (default: 12)
//! - **months_forward**: Months after the anchor month to create (default: 12)
//! - **anchor**: Instant whose month is the centre of the horizon (default: now)
//!
//! ## StatsConfig
//!
//! - **cache_ttl_ms**: How long a tenant's stats snapshot is served from cache (default: 2s)
//! - **cache_capacity**: Maximum number of cached tenants (default: 10,000)
//! - **write_rate_window_secs**: Trailing window for the write rate (default: 5s)
//! - **latency_window_secs**: Trailing window of the timed read (default: 10s)
//!
//! ## Usage
//!
//! ```ignore
//! use sensorhouse_storage::StorageConfig;
//!
//! // Defaults
//! let config = StorageConfig::default();
//!
//! // From a JSON file; missing fields take their defaults
//! let config = StorageConfig::from_json_file("sensorhouse.json")?;
//! ```

use crate::error::{Error, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StorageConfig {
    #[serde(default)]
    pub partitions: PartitionConfig,

    #[serde(default)]
    pub stats: StatsConfig,

    #[serde(default)]
    pub load: LoadConfig,

    #[serde(default)]
    pub seed: SeedPlan,
}

impl StorageConfig {
    /// Load configuration from a JSON file.
    pub fn from_json_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path)
            .map_err(|e| Error::Config(format!("{}: {}", path.display(), e)))?;
        let config: StorageConfig = serde_json::from_str(&raw)
            .map_err(|e| Error::Config(format!("{}: {}", path.display(), e)))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if !(self.load.value_min < self.load.value_max) {
            return Err(Error::Config(format!(
                "load value range is empty: [{}, {})",
                self.load.value_min, self.load.value_max
            )));
        }
        if !(self.seed.value_min <= self.seed.value_max) {
            return Err(Error::Config(format!(
                "seed value range is empty: [{}, {}]",
                self.seed.value_min, self.seed.value_max
            )));
        }
        if self.seed.batch_size == 0 {
            return Err(Error::Config("seed batch_size must be positive".to_string()));
        }
        if self.stats.cache_capacity == 0 {
            return Err(Error::Config("stats cache_capacity must be positive".to_string()));
        }
        if self.stats.write_rate_window_secs == 0 || self.stats.latency_window_secs == 0 {
            return Err(Error::Config("stats windows must be positive".to_string()));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PartitionConfig {
    /// Months before the anchor month to create at bootstrap (default: 12)
    #[serde(default = "default_months_back")]
    pub months_back: u32,

    /// Months after the anchor month to create at bootstrap (default: 12)
    #[serde(default = "default_months_forward")]
    pub months_forward: u32,

    /// Fixed anchor instant; `None` anchors on the current time at startup
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub anchor: Option<DateTime<Utc>>,
}

fn default_months_back() -> u32 {
    12
}

fn default_months_forward() -> u32 {
    12
}

impl Default for PartitionConfig {
    fn default() -> Self {
        Self {
            months_back: default_months_back(),
            months_forward: default_months_forward(),
            anchor: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatsConfig {
    /// Per-tenant snapshot TTL in milliseconds (default: 2000)
    #[serde(default = "default_cache_ttl_ms")]
    pub cache_ttl_ms: u64,

    /// Maximum cached tenants (default: 10,000)
    #[serde(default = "default_cache_capacity")]
    pub cache_capacity: usize,

    /// Trailing window for the write rate in seconds (default: 5)
    #[serde(default = "default_write_rate_window_secs")]
    pub write_rate_window_secs: u64,

    /// Trailing window of the timed latency query in seconds (default: 10)
    #[serde(default = "default_latency_window_secs")]
    pub latency_window_secs: u64,
}

fn default_cache_ttl_ms() -> u64 {
    2000
}

fn default_cache_capacity() -> usize {
    10_000
}

fn default_write_rate_window_secs() -> u64 {
    5
}

fn default_latency_window_secs() -> u64 {
    10
}

impl StatsConfig {
    pub fn cache_ttl(&self) -> Duration {
        Duration::from_millis(self.cache_ttl_ms)
    }

    pub fn write_rate_window(&self) -> Duration {
        Duration::from_secs(self.write_rate_window_secs)
    }

    pub fn latency_window(&self) -> Duration {
        Duration::from_secs(self.latency_window_secs)
    }
}

impl Default for StatsConfig {
    fn default() -> Self {
        Self {
            cache_ttl_ms: default_cache_ttl_ms(),
            cache_capacity: default_cache_capacity(),
            write_rate_window_secs: default_write_rate_window_secs(),
            latency_window_secs: default_latency_window_secs(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoadConfig {
    /// Lower bound of synthetic values, inclusive (default: 0)
    #[serde(default = "default_load_value_min")]
    pub value_min: f64,

    /// Upper bound of synthetic values, exclusive (default: 100)
    #[serde(default = "default_load_value_max")]
    pub value_max: f64,
}

fn default_load_value_min() -> f64 {
    0.0
}

fn default_load_value_max() -> f64 {
    100.0
}

impl Default for LoadConfig {
    fn default() -> Self {
        Self {
            value_min: default_load_value_min(),
            value_max: default_load_value_max(),
        }
    }
}

/// Shape of a fixture dataset generated by the seeder.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SeedPlan {
    #[serde(default = "default_seed_tenants")]
    pub tenants: usize,

    #[serde(default = "default_seed_sensors_per_tenant")]
    pub sensors_per_tenant: usize,

    /// Readings per sensor, spaced one minute apart going back from now
    #[serde(default = "default_seed_readings_per_sensor")]
    pub readings_per_sensor: usize,

    #[serde(default = "default_seed_batch_size")]
    pub batch_size: usize,

    #[serde(default = "default_seed_sensor_type")]
    pub sensor_type: String,

    #[serde(default = "default_seed_value_min")]
    pub value_min: f64,

    #[serde(default = "default_seed_value_max")]
    pub value_max: f64,
}

fn default_seed_tenants() -> usize {
    2
}

fn default_seed_sensors_per_tenant() -> usize {
    5
}

fn default_seed_readings_per_sensor() -> usize {
    10_000
}

fn default_seed_batch_size() -> usize {
    500
}

fn default_seed_sensor_type() -> String {
    "fuel_pump".to_string()
}

fn default_seed_value_min() -> f64 {
    20.0
}

fn default_seed_value_max() -> f64 {
    50.0
}

impl Default for SeedPlan {
    fn default() -> Self {
        Self {
            tenants: default_seed_tenants(),
            sensors_per_tenant: default_seed_sensors_per_tenant(),
            readings_per_sensor: default_seed_readings_per_sensor(),
            batch_size: default_seed_batch_size(),
            sensor_type: default_seed_sensor_type(),
            value_min: default_seed_value_min(),
            value_max: default_seed_value_max(),
        }
    }
}

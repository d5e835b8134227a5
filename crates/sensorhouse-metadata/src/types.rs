//! Metadata Type Definitions
//!
//! This module defines the data structures stored by SensorHouse.
//!
//! ## Types Overview
//!
//! ### Tenant
//! An isolated customer account. Created administratively, never mutated.
//!
//! ### Sensor
//! A device owned by exactly one tenant. Its tenant never changes.
//!
//! ### Reading
//! One immutable measurement. Carries a denormalized copy of the owning tenant
//! so isolation checks and partition scans never need a join.
//!
//! ### TimeRange
//! A validated half-open `[from, to)` interval used by scans and aggregates.
//!
//! ## Design Decisions
//!
//! - All types are Serialize/Deserialize for storage and API responses
//! - Timestamps are `DateTime<Utc>` truncated to microseconds, the precision
//!   every backend stores
//! - Sensor and reading ids are UUIDv4

use crate::error::{MetadataError, Result};
use crate::tenant::TenantId;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use uuid::Uuid;

pub const DEFAULT_PLAN_TYPE: &str = "basic";
pub const DEFAULT_SENSOR_TYPE: &str = "temperature";

/// Request to create a tenant.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateTenant {
    /// Display name
    pub name: String,

    /// Plan tier (defaults to "basic")
    #[serde(default)]
    pub plan_type: Option<String>,
}

/// An isolated customer account.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Tenant {
    pub id: TenantId,
    pub name: String,
    pub plan_type: String,
}

/// Lifecycle status of a sensor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SensorStatus {
    #[default]
    Active,
    Inactive,
}

impl SensorStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            SensorStatus::Active => "active",
            SensorStatus::Inactive => "inactive",
        }
    }
}

impl FromStr for SensorStatus {
    type Err = MetadataError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "active" => Ok(SensorStatus::Active),
            "inactive" => Ok(SensorStatus::Inactive),
            other => Err(MetadataError::InvalidRow(format!(
                "unknown sensor status: {}",
                other
            ))),
        }
    }
}

/// Request to create a sensor. The owning tenant always comes from the scope.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateSensor {
    pub name: String,

    /// Sensor type (defaults to "temperature")
    #[serde(default, rename = "type")]
    pub sensor_type: Option<String>,

    #[serde(default)]
    pub status: SensorStatus,
}

impl CreateSensor {
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            sensor_type: None,
            status: SensorStatus::Active,
        }
    }
}

/// A device owned by one tenant.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Sensor {
    pub id: Uuid,
    pub tenant_id: TenantId,
    pub name: String,
    #[serde(rename = "type")]
    pub sensor_type: String,
    pub status: SensorStatus,
}

/// A reading as submitted by a caller.
///
/// `tenant_id` exists because ingestion payloads may carry one; it is never
/// trusted. Every write path replaces it with the scope's tenant.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewReading {
    pub sensor_id: Uuid,
    pub value: f64,
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub metadata: Option<serde_json::Value>,
    #[serde(default)]
    pub tenant_id: Option<String>,
}

impl NewReading {
    pub fn new(sensor_id: Uuid, value: f64, created_at: DateTime<Utc>) -> Self {
        Self {
            sensor_id,
            value,
            created_at,
            metadata: None,
            tenant_id: None,
        }
    }
}

/// One immutable, tenant-stamped measurement.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Reading {
    pub id: Uuid,
    pub sensor_id: Uuid,
    pub tenant_id: TenantId,
    pub value: f64,
    pub created_at: DateTime<Utc>,
    pub metadata: Option<serde_json::Value>,
}

/// Validated half-open interval `[from, to)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct TimeRange {
    from: DateTime<Utc>,
    to: DateTime<Utc>,
}

impl TimeRange {
    /// Fails with `InvalidTimeRange` unless `from < to`.
    pub fn new(from: DateTime<Utc>, to: DateTime<Utc>) -> Result<Self> {
        if from >= to {
            return Err(MetadataError::InvalidTimeRange { from, to });
        }
        Ok(Self { from, to })
    }

    /// The trailing window `[now - window, now]`.
    ///
    /// The upper bound is made inclusive by extending it one microsecond, the
    /// storage precision, so rows stamped exactly `now` are counted. Windows
    /// reaching past the earliest representable instant start there.
    pub fn trailing(now: DateTime<Utc>, window: std::time::Duration) -> Result<Self> {
        let from = chrono::Duration::from_std(window)
            .ok()
            .and_then(|window| now.checked_sub_signed(window))
            .unwrap_or(DateTime::<Utc>::MIN_UTC);
        let to = now
            .checked_add_signed(chrono::Duration::microseconds(1))
            .unwrap_or(DateTime::<Utc>::MAX_UTC);
        Self::new(from, to)
    }

    pub fn from(&self) -> DateTime<Utc> {
        self.from
    }

    pub fn to(&self) -> DateTime<Utc> {
        self.to
    }

    pub fn contains(&self, ts: DateTime<Utc>) -> bool {
        self.from <= ts && ts < self.to
    }

    pub fn overlaps(&self, other: &TimeRange) -> bool {
        self.from < other.to && other.from < self.to
    }

    /// Whether `other` lies entirely inside this range.
    pub fn covers(&self, other: &TimeRange) -> bool {
        self.from <= other.from && other.to <= self.to
    }
}

/// Count/sum/min/max of the readings matched in one partition.
///
/// Partials from different partitions merge associatively, so an aggregate
/// over a window only ever touches the partitions overlapping it.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct PartialAggregate {
    pub count: u64,
    pub sum: f64,
    pub min: Option<f64>,
    pub max: Option<f64>,
}

impl PartialAggregate {
    pub fn observe(&mut self, value: f64) {
        self.count += 1;
        self.sum += value;
        self.min = Some(self.min.map_or(value, |m| m.min(value)));
        self.max = Some(self.max.map_or(value, |m| m.max(value)));
    }

    pub fn merge(&mut self, other: &PartialAggregate) {
        self.count += other.count;
        self.sum += other.sum;
        self.min = match (self.min, other.min) {
            (Some(a), Some(b)) => Some(a.min(b)),
            (a, b) => a.or(b),
        };
        self.max = match (self.max, other.max) {
            (Some(a), Some(b)) => Some(a.max(b)),
            (a, b) => a.or(b),
        };
    }

    pub fn avg(&self) -> Option<f64> {
        if self.count == 0 {
            None
        } else {
            Some(self.sum / self.count as f64)
        }
    }
}

/// Truncate a timestamp to microsecond precision.
pub fn truncate_micros(ts: DateTime<Utc>) -> DateTime<Utc> {
    from_micros(ts.timestamp_micros()).unwrap_or(ts)
}

/// Build a timestamp from microseconds since the Unix epoch.
pub fn from_micros(micros: i64) -> Option<DateTime<Utc>> {
    let secs = micros.div_euclid(1_000_000);
    let nanos = (micros.rem_euclid(1_000_000) * 1_000) as u32;
    DateTime::from_timestamp(secs, nanos)
}

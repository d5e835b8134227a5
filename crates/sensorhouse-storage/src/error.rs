//! Storage Error Types
//!
//! This module defines all error types that can occur in the reading path.
//!
//! ## Error Categories
//!
//! ### Caller Errors
//! - `MissingTenantContext`: No tenant identifier was supplied
//! - `SensorNotOwned`: The sensor does not exist or belongs to another tenant
//! - `InvalidTimeRange`: A scan was requested with `from >= to`
//! - `InvalidReading`: The value is NaN or infinite
//! - `NoSensorsForTenant`: Load injection against a tenant with no sensors
//! - `Config`: A configuration file could not be read or is inconsistent
//!
//! ### Substrate Errors
//! - `Metadata`: The persistence substrate failed; surfaced as-is, never retried
//!
//! ## Usage
//!
//! All storage operations return `Result<T>` which is aliased to
//! `Result<T, Error>`. This allows clean error propagation with `?`.

use chrono::{DateTime, Utc};
use sensorhouse_metadata::MetadataError;
use thiserror::Error;
use uuid::Uuid;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Error)]
pub enum Error {
    #[error("Missing tenant context")]
    MissingTenantContext,

    #[error("Sensor not owned by tenant: {sensor_id}")]
    SensorNotOwned { sensor_id: Uuid },

    #[error("Invalid time range: {from} >= {to}")]
    InvalidTimeRange { from: DateTime<Utc>, to: DateTime<Utc> },

    #[error("Invalid reading: {0}")]
    InvalidReading(String),

    #[error("No sensors for tenant: {0}")]
    NoSensorsForTenant(String),

    #[error("Invalid configuration: {0}")]
    Config(String),

    #[error("Metadata error: {0}")]
    Metadata(MetadataError),
}

impl Error {
    /// Whether the error was caused by the request rather than the substrate.
    pub fn is_caller_error(&self) -> bool {
        !matches!(self, Error::Metadata(_))
    }
}

impl From<MetadataError> for Error {
    fn from(err: MetadataError) -> Self {
        match err {
            MetadataError::MissingTenantContext => Error::MissingTenantContext,
            MetadataError::InvalidTimeRange { from, to } => Error::InvalidTimeRange { from, to },
            other => Error::Metadata(other),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_metadata_errors_lift_to_caller_errors() {
        let err: Error = MetadataError::MissingTenantContext.into();
        assert!(matches!(err, Error::MissingTenantContext));
        assert!(err.is_caller_error());

        let now = Utc::now();
        let err: Error = MetadataError::InvalidTimeRange { from: now, to: now }.into();
        assert!(matches!(err, Error::InvalidTimeRange { .. }));
    }

    #[test]
    fn test_substrate_errors_are_not_caller_errors() {
        let err: Error = MetadataError::PartitionNotFound("sensor_readings_default".into()).into();
        assert!(!err.is_caller_error());

        let err: Error = MetadataError::Unavailable("sensor_readings_2026_10".into()).into();
        assert!(!err.is_caller_error());
    }
}

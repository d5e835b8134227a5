//! Metadata Error Types
//!
//! This module defines all error types that can occur inside the persistence
//! substrate.
//!
//! ## Error Categories
//!
//! ### Isolation Errors
//! - `MissingTenantContext`: An operation that needs a tenant was started without one
//!
//! ### Lookup Errors
//! - `TenantNotFound`: Sensor creation referenced an unknown tenant
//! - `PartitionNotFound`: Rows were written to a partition that was never created
//!
//! ### Data Errors
//! - `InvalidTimeRange`: A range with `from >= to`
//! - `InvalidRow`: A stored row could not be decoded, or a row does not belong
//!   to the partition it was written to
//! - `SerializationError`: Reading metadata JSON failed to (de)serialize
//!
//! ### Database Errors
//! - `Unavailable`: A partition segment cannot currently be read or written
//! - `DatabaseError`: SQLite operation failed (connection, query, etc.)
//! - `MigrationError`: Schema migration failed on startup
//!
//! ## Usage
//!
//! All store operations return `Result<T>` which is aliased to
//! `Result<T, MetadataError>`, so errors propagate with `?`.

use chrono::{DateTime, Utc};
use thiserror::Error;

pub type Result<T> = std::result::Result<T, MetadataError>;

#[derive(Debug, Error)]
pub enum MetadataError {
    #[error("Tenant context is required for this operation")]
    MissingTenantContext,

    #[error("Tenant not found: {0}")]
    TenantNotFound(String),

    #[error("Partition not found: {0}")]
    PartitionNotFound(String),

    #[error("Invalid time range: {from} >= {to}")]
    InvalidTimeRange {
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    },

    #[error("Invalid row: {0}")]
    InvalidRow(String),

    #[error("Partition unavailable: {0}")]
    Unavailable(String),

    #[error("Database error: {0}")]
    DatabaseError(#[from] sqlx::Error),

    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),

    #[error("Migration error: {0}")]
    MigrationError(String),
}

impl From<sqlx::migrate::MigrateError> for MetadataError {
    fn from(e: sqlx::migrate::MigrateError) -> Self {
        MetadataError::MigrationError(e.to_string())
    }
}

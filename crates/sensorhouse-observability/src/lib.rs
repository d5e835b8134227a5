//! SensorHouse Observability
//!
//! Provides the Prometheus metrics SensorHouse records while ingesting and
//! querying readings.
//!
//! # Usage
//!
//! ```no_run
//! use sensorhouse_observability::{exporter, metrics};
//!
//! // Register metrics with the global registry
//! metrics::init();
//!
//! // Dump the current values in text exposition format
//! let text = exporter::render().unwrap();
//! println!("{}", text);
//! ```
//!
//! Logging is done with `tracing` directly in each crate; binaries install
//! the subscriber.

pub mod exporter;
pub mod metrics;

// Re-export commonly used items
pub use metrics::{init as init_metrics, REGISTRY};

/// Initialize all observability components
pub fn init() {
    metrics::init();
}

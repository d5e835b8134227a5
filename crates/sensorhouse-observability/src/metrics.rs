use lazy_static::lazy_static;
use prometheus::{HistogramOpts, HistogramVec, IntCounter, IntCounterVec, IntGauge, Opts, Registry};
use std::sync::Once;

static INIT: Once = Once::new();

lazy_static! {
    /// Global Prometheus metrics registry
    pub static ref REGISTRY: Registry = Registry::new();

    // ============================================================================
    // Ingestion Metrics
    // ============================================================================

    /// Readings written to storage
    pub static ref READINGS_INSERTED_TOTAL: IntCounterVec = IntCounterVec::new(
        Opts::new("sensorhouse_readings_inserted_total", "Total readings inserted"),
        &["tenant"]
    ).expect("metric can be created");

    /// Readings refused before reaching storage
    pub static ref READINGS_REJECTED_TOTAL: IntCounterVec = IntCounterVec::new(
        Opts::new("sensorhouse_readings_rejected_total", "Total readings rejected"),
        &["tenant", "reason"] // sensor_not_owned, invalid_value
    ).expect("metric can be created");

    /// Readings lost to a partition-level storage failure
    pub static ref READINGS_FAILED_TOTAL: IntCounterVec = IntCounterVec::new(
        Opts::new("sensorhouse_readings_failed_total", "Total readings that failed to persist"),
        &["tenant"]
    ).expect("metric can be created");

    /// Readings per bulk ingestion call
    pub static ref INGEST_BATCH_SIZE: HistogramVec = HistogramVec::new(
        HistogramOpts::new("sensorhouse_ingest_batch_size", "Ingestion batch size in readings")
            .buckets(vec![1.0, 10.0, 50.0, 100.0, 500.0, 1000.0, 5000.0, 10000.0]),
        &["source"] // api, load, seed
    ).expect("metric can be created");

    /// Load injections triggered
    pub static ref LOAD_INJECTIONS_TOTAL: IntCounterVec = IntCounterVec::new(
        Opts::new("sensorhouse_load_injections_total", "Total load injections"),
        &["tenant"]
    ).expect("metric can be created");

    // ============================================================================
    // Query Metrics
    // ============================================================================

    /// Windowed read latency
    pub static ref QUERY_LATENCY: HistogramVec = HistogramVec::new(
        HistogramOpts::new("sensorhouse_query_latency_seconds", "Windowed read latency in seconds")
            .buckets(vec![0.0005, 0.001, 0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0]),
        &["operation"] // scan, aggregate
    ).expect("metric can be created");

    /// Partitions touched by windowed reads
    pub static ref PARTITIONS_SCANNED_TOTAL: IntCounter = IntCounter::new(
        "sensorhouse_partitions_scanned_total",
        "Total partitions touched by windowed reads"
    ).expect("metric can be created");

    /// Stats cache hits
    pub static ref STATS_CACHE_HITS_TOTAL: IntCounter = IntCounter::new(
        "sensorhouse_stats_cache_hits_total",
        "Total tenant stats cache hits"
    ).expect("metric can be created");

    /// Stats cache misses
    pub static ref STATS_CACHE_MISSES_TOTAL: IntCounter = IntCounter::new(
        "sensorhouse_stats_cache_misses_total",
        "Total tenant stats cache misses"
    ).expect("metric can be created");

    // ============================================================================
    // Partition & Isolation Metrics
    // ============================================================================

    /// Partitions materialized by this process
    pub static ref PARTITIONS_CREATED_TOTAL: IntCounter = IntCounter::new(
        "sensorhouse_partitions_created_total",
        "Total partitions materialized"
    ).expect("metric can be created");

    /// Partitions currently known to exist
    pub static ref PARTITIONS_ACTIVE: IntGauge = IntGauge::new(
        "sensorhouse_partitions_active",
        "Number of materialized partitions"
    ).expect("metric can be created");

    /// Operations refused for lack of tenant context
    pub static ref ISOLATION_REJECTIONS_TOTAL: IntCounter = IntCounter::new(
        "sensorhouse_isolation_rejections_total",
        "Total operations rejected for missing tenant context"
    ).expect("metric can be created");
}

/// Register every metric with [`REGISTRY`]. Safe to call more than once.
pub fn init() {
    INIT.call_once(|| {
        // Ingestion metrics
        REGISTRY
            .register(Box::new(READINGS_INSERTED_TOTAL.clone()))
            .expect("readings_inserted_total can be registered");
        REGISTRY
            .register(Box::new(READINGS_REJECTED_TOTAL.clone()))
            .expect("readings_rejected_total can be registered");
        REGISTRY
            .register(Box::new(READINGS_FAILED_TOTAL.clone()))
            .expect("readings_failed_total can be registered");
        REGISTRY
            .register(Box::new(INGEST_BATCH_SIZE.clone()))
            .expect("ingest_batch_size can be registered");
        REGISTRY
            .register(Box::new(LOAD_INJECTIONS_TOTAL.clone()))
            .expect("load_injections_total can be registered");

        // Query metrics
        REGISTRY
            .register(Box::new(QUERY_LATENCY.clone()))
            .expect("query_latency can be registered");
        REGISTRY
            .register(Box::new(PARTITIONS_SCANNED_TOTAL.clone()))
            .expect("partitions_scanned_total can be registered");
        REGISTRY
            .register(Box::new(STATS_CACHE_HITS_TOTAL.clone()))
            .expect("stats_cache_hits_total can be registered");
        REGISTRY
            .register(Box::new(STATS_CACHE_MISSES_TOTAL.clone()))
            .expect("stats_cache_misses_total can be registered");

        // Partition & isolation metrics
        REGISTRY
            .register(Box::new(PARTITIONS_CREATED_TOTAL.clone()))
            .expect("partitions_created_total can be registered");
        REGISTRY
            .register(Box::new(PARTITIONS_ACTIVE.clone()))
            .expect("partitions_active can be registered");
        REGISTRY
            .register(Box::new(ISOLATION_REJECTIONS_TOTAL.clone()))
            .expect("isolation_rejections_total can be registered");
    });
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_metrics_registration() {
        init();
        // If no panic, registration succeeded
    }

    #[test]
    fn test_ingestion_metrics() {
        READINGS_INSERTED_TOTAL.with_label_values(&["metrics-test-tenant"]).inc_by(500);
        READINGS_REJECTED_TOTAL
            .with_label_values(&["metrics-test-tenant", "sensor_not_owned"])
            .inc();

        assert_eq!(
            READINGS_INSERTED_TOTAL
                .with_label_values(&["metrics-test-tenant"])
                .get(),
            500
        );
        assert_eq!(
            READINGS_REJECTED_TOTAL
                .with_label_values(&["metrics-test-tenant", "sensor_not_owned"])
                .get(),
            1
        );
    }

    #[test]
    fn test_batch_size_histogram() {
        INGEST_BATCH_SIZE.with_label_values(&["metrics-test"]).observe(250.0);
        assert_eq!(
            INGEST_BATCH_SIZE
                .with_label_values(&["metrics-test"])
                .get_sample_count(),
            1
        );
    }
}

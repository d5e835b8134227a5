//! Synthetic Load Injection
//!
//! Generates bursts of readings against one tenant's sensors to exercise the
//! write path and, indirectly, the read latency reported by the stats
//! aggregator.
//!
//! Each injection picks a sensor uniformly at random for every row, draws a
//! value uniformly from `[value_min, value_max)` truncated to two decimals,
//! stamps everything with the current time and submits the whole burst as one
//! bulk insert.

use crate::config::LoadConfig;
use crate::error::{Error, Result};
use crate::store::{ReadingStore, ScopedReadingStore};
use chrono::{DateTime, Utc};
use rand::Rng;
use sensorhouse_metadata::{NewReading, Sensor};
use sensorhouse_observability::metrics;
use serde::{Deserialize, Serialize};

/// Outcome of one injection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LoadReport {
    pub rows_queued: u64,
    pub inserted: u64,
    pub failed: u64,
}

pub struct LoadInjector {
    readings: ReadingStore,
    config: LoadConfig,
}

impl LoadInjector {
    pub fn new(readings: ReadingStore, config: LoadConfig) -> Result<Self> {
        let bounded = config.value_min.is_finite() && config.value_max.is_finite();
        if !bounded || config.value_min >= config.value_max {
            return Err(Error::Config(format!(
                "load value range is empty: [{}, {})",
                config.value_min, config.value_max
            )));
        }
        Ok(Self { readings, config })
    }

    /// Insert `amount` synthetic readings for `tenant`.
    ///
    /// # Errors
    ///
    /// - `MissingTenantContext`: No tenant identifier
    /// - `NoSensorsForTenant`: The tenant owns no sensors; nothing is written
    pub async fn inject(&self, tenant: Option<&str>, amount: usize) -> Result<LoadReport> {
        let scoped = self.readings.scope(tenant)?;
        let sensors = self.sensors_for(&scoped).await?;
        let rows = self.generate(&sensors, amount, Utc::now(), &mut rand::thread_rng());
        self.submit(&scoped, rows).await
    }

    /// Same as [`inject`](Self::inject) with a caller-supplied random source.
    pub async fn inject_with_rng<R: Rng + Send>(
        &self,
        tenant: Option<&str>,
        amount: usize,
        rng: &mut R,
    ) -> Result<LoadReport> {
        let scoped = self.readings.scope(tenant)?;
        let sensors = self.sensors_for(&scoped).await?;
        let rows = self.generate(&sensors, amount, Utc::now(), rng);
        self.submit(&scoped, rows).await
    }

    async fn sensors_for(&self, scoped: &ScopedReadingStore) -> Result<Vec<Sensor>> {
        let sensors = scoped.list_sensors().await?;
        if sensors.is_empty() {
            return Err(Error::NoSensorsForTenant(scoped.tenant_id().to_string()));
        }
        Ok(sensors)
    }

    fn generate<R: Rng + ?Sized>(
        &self,
        sensors: &[Sensor],
        amount: usize,
        now: DateTime<Utc>,
        rng: &mut R,
    ) -> Vec<NewReading> {
        (0..amount)
            .map(|_| {
                let sensor = &sensors[rng.gen_range(0..sensors.len())];
                let value = rng.gen_range(self.config.value_min..self.config.value_max);
                NewReading::new(sensor.id, truncate_cents(value), now)
            })
            .collect()
    }

    async fn submit(&self, scoped: &ScopedReadingStore, rows: Vec<NewReading>) -> Result<LoadReport> {
        let queued = rows.len() as u64;
        let outcome = scoped.ingest(rows, "load").await?;

        metrics::LOAD_INJECTIONS_TOTAL
            .with_label_values(&[scoped.tenant_id().as_str()])
            .inc();
        tracing::info!(
            tenant = %scoped.tenant_id(),
            rows = queued,
            inserted = outcome.inserted,
            failed = outcome.failed,
            "Load injected"
        );

        Ok(LoadReport {
            rows_queued: queued,
            inserted: outcome.inserted,
            failed: outcome.failed + outcome.rejected,
        })
    }
}

/// Two decimal places, rounding toward zero so the upper bound stays exclusive.
fn truncate_cents(value: f64) -> f64 {
    (value * 100.0).trunc() / 100.0
}

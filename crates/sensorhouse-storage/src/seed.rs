//! Fixture Seeding
//!
//! Fills an empty deployment with a realistic dataset: a handful of tenants,
//! each with a few sensors, each sensor with a long history of readings one
//! minute apart going back from now. Rows are written in fixed-size chunks
//! through the regular bulk-insert path, so the seeded data is partitioned
//! and tenant-stamped exactly like live traffic.

use crate::config::SeedPlan;
use crate::error::{Error, Result};
use crate::store::ReadingStore;
use chrono::{Duration, Utc};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use sensorhouse_metadata::{CreateSensor, NewReading, SensorStatus, Tenant};
use serde::Serialize;

#[derive(Debug, Clone, Serialize)]
pub struct SeedReport {
    pub tenants: Vec<Tenant>,
    pub sensors: usize,
    pub readings_inserted: u64,
    pub readings_failed: u64,
}

pub struct Seeder {
    readings: ReadingStore,
}

impl Seeder {
    pub fn new(readings: ReadingStore) -> Self {
        Self { readings }
    }

    pub async fn seed(&self, plan: &SeedPlan) -> Result<SeedReport> {
        self.seed_with_rng(plan, &mut StdRng::from_entropy()).await
    }

    pub async fn seed_with_rng<R: Rng + Send>(&self, plan: &SeedPlan, rng: &mut R) -> Result<SeedReport> {
        if plan.batch_size == 0 {
            return Err(Error::Config("seed batch_size must be positive".to_string()));
        }
        let bounded = plan.value_min.is_finite() && plan.value_max.is_finite();
        if !bounded || plan.value_min > plan.value_max {
            return Err(Error::Config(format!(
                "seed value range is empty: [{}, {}]",
                plan.value_min, plan.value_max
            )));
        }

        let mut report = SeedReport {
            tenants: Vec::with_capacity(plan.tenants),
            sensors: 0,
            readings_inserted: 0,
            readings_failed: 0,
        };
        let now = Utc::now();

        for t in 0..plan.tenants {
            let tenant = self
                .readings
                .create_tenant(&format!("Seed Tenant {}", t + 1), None)
                .await?;
            let scoped = self.readings.scope_for(&tenant.id);

            for s in 0..plan.sensors_per_tenant {
                let sensor = scoped
                    .create_sensor(CreateSensor {
                        name: format!("{}-{}", plan.sensor_type, s + 1),
                        sensor_type: Some(plan.sensor_type.clone()),
                        status: SensorStatus::Active,
                    })
                    .await?;
                report.sensors += 1;

                let mut minute = 0usize;
                while minute < plan.readings_per_sensor {
                    let end = (minute + plan.batch_size).min(plan.readings_per_sensor);
                    let chunk: Vec<NewReading> = (minute..end)
                        .map(|i| {
                            let value = rng.gen_range(plan.value_min..=plan.value_max);
                            NewReading::new(
                                sensor.id,
                                (value * 100.0).round() / 100.0,
                                now - Duration::minutes(i as i64),
                            )
                        })
                        .collect();

                    let outcome = scoped.ingest(chunk, "seed").await?;
                    report.readings_inserted += outcome.inserted;
                    report.readings_failed += outcome.failed + outcome.rejected;
                    minute = end;
                }
            }

            tracing::info!(
                tenant = %tenant.id,
                name = %tenant.name,
                sensors = plan.sensors_per_tenant,
                "Tenant seeded"
            );
            report.tenants.push(tenant);
        }

        tracing::info!(
            tenants = report.tenants.len(),
            sensors = report.sensors,
            readings = report.readings_inserted,
            "Seeding complete"
        );

        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::manager::PartitionManager;
    use sensorhouse_metadata::InMemorySensorStore;
    use std::sync::Arc;

    fn small_plan() -> SeedPlan {
        SeedPlan {
            tenants: 2,
            sensors_per_tenant: 3,
            readings_per_sensor: 120,
            batch_size: 50,
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn test_seed_creates_plan_shape() {
        let store = Arc::new(InMemorySensorStore::new());
        let partitions = Arc::new(PartitionManager::with_anchor(store.clone(), Utc::now(), 1, 1).unwrap());
        let readings = ReadingStore::new(store, partitions);
        let seeder = Seeder::new(readings.clone());

        let mut rng = StdRng::seed_from_u64(7);
        let report = seeder.seed_with_rng(&small_plan(), &mut rng).await.unwrap();

        assert_eq!(report.tenants.len(), 2);
        assert_eq!(report.sensors, 6);
        assert_eq!(report.readings_inserted, 720);
        assert_eq!(report.readings_failed, 0);

        for tenant in &report.tenants {
            let scoped = readings.scope_for(&tenant.id);
            assert_eq!(scoped.count().await.unwrap(), 360);

            let sensors = scoped.list_sensors().await.unwrap();
            assert_eq!(sensors.len(), 3);
            assert!(sensors.iter().all(|s| s.sensor_type == "fuel_pump"));
        }
    }

    #[tokio::test]
    async fn test_seed_values_within_plan_range() {
        let store = Arc::new(InMemorySensorStore::new());
        let partitions = Arc::new(PartitionManager::with_anchor(store.clone(), Utc::now(), 1, 1).unwrap());
        let readings = ReadingStore::new(store, partitions);
        let plan = SeedPlan {
            tenants: 1,
            sensors_per_tenant: 1,
            readings_per_sensor: 200,
            ..Default::default()
        };

        let report = Seeder::new(readings.clone())
            .seed_with_rng(&plan, &mut StdRng::seed_from_u64(1))
            .await
            .unwrap();
        let scoped = readings.scope_for(&report.tenants[0].id);
        let range = sensorhouse_metadata::TimeRange::new(
            Utc::now() - Duration::days(1),
            Utc::now() + Duration::minutes(1),
        )
        .unwrap();

        let min = scoped
            .aggregate_range(&range, crate::store::AggregateFn::Min)
            .await
            .unwrap()
            .unwrap();
        let max = scoped
            .aggregate_range(&range, crate::store::AggregateFn::Max)
            .await
            .unwrap()
            .unwrap();
        assert!(min >= 20.0);
        assert!(max <= 50.0);
    }

    #[tokio::test]
    async fn test_zero_batch_size_rejected() {
        let store = Arc::new(InMemorySensorStore::new());
        let partitions = Arc::new(PartitionManager::with_anchor(store.clone(), Utc::now(), 1, 1).unwrap());
        let plan = SeedPlan {
            batch_size: 0,
            ..small_plan()
        };

        let err = Seeder::new(ReadingStore::new(store, partitions))
            .seed(&plan)
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Config(_)));
    }
}

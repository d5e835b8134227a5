//! Partition Manager
//!
//! Maps timestamps to the physical partition that must hold them and makes
//! sure partitions exist before anything is written to them.
//!
//! ## Horizon
//!
//! At construction the manager fixes a horizon of whole months around an
//! anchor month (by default 12 back and 12 forward, inclusive). Timestamps
//! inside the horizon route to their calendar month; everything else routes
//! to the default partition. Because the horizon never moves for the life of
//! a manager, routing is a pure function of the timestamp.
//!
//! ```text
//!   2025-10 ... 2026-09  2026-10  2026-11 ... 2027-10
//!  ├────────────────────┼────────┼────────────────────┤
//!   months_back           anchor   months_forward
//!  ◀─ default                                 default ─▶
//! ```
//!
//! ## Reads
//!
//! Reads do not trust the horizon. Other managers, earlier runs or other
//! processes may have written with a different anchor, so a month outside
//! this horizon can exist and hold rows, and the default partition can hold
//! rows for months this manager considers explicit. Range reads therefore
//! resolve against the partitions that exist in the substrate: every month
//! overlapping the range, then the default partition whenever it exists.
//!
//! ## Creation
//!
//! `ensure_partition` is idempotent. Concurrent first use of the same month is
//! collapsed onto one in-flight create through a per-partition `OnceCell`; the
//! substrate create is itself `IF NOT EXISTS`, so separate processes converge
//! too.

use crate::config::PartitionConfig;
use crate::error::{Error, Result};
use chrono::{DateTime, Datelike, Utc};
use sensorhouse_metadata::partition::{add_months, month_start};
use sensorhouse_metadata::{PartitionHandle, SensorStore, TimeRange};
use sensorhouse_observability::metrics;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{Mutex, OnceCell};

pub struct PartitionManager {
    store: Arc<dyn SensorStore>,
    first: PartitionHandle,
    last: PartitionHandle,
    horizon: TimeRange,
    ensured: Mutex<HashMap<PartitionHandle, Arc<OnceCell<()>>>>,
}

impl PartitionManager {
    /// Create a manager whose horizon is fixed around `config.anchor` (or now).
    pub fn new(store: Arc<dyn SensorStore>, config: &PartitionConfig) -> Result<Self> {
        let anchor = config.anchor.unwrap_or_else(Utc::now);
        Self::with_anchor(store, anchor, config.months_back, config.months_forward)
    }

    pub fn with_anchor(
        store: Arc<dyn SensorStore>,
        anchor: DateTime<Utc>,
        months_back: u32,
        months_forward: u32,
    ) -> Result<Self> {
        let (year, month) = (anchor.year(), anchor.month());
        let out_of_range = || Error::Config(format!("partition horizon around {} is out of range", anchor));

        let back = i32::try_from(months_back).map_err(|_| out_of_range())?;
        let forward = i32::try_from(months_forward).map_err(|_| out_of_range())?;

        let (first_year, first_month) = add_months(year, month, -back).ok_or_else(out_of_range)?;
        let (last_year, last_month) = add_months(year, month, forward).ok_or_else(out_of_range)?;
        let (end_year, end_month) = add_months(last_year, last_month, 1).ok_or_else(out_of_range)?;

        let first = PartitionHandle::month(first_year, first_month).ok_or_else(out_of_range)?;
        let last = PartitionHandle::month(last_year, last_month).ok_or_else(out_of_range)?;
        let horizon = TimeRange::new(
            month_start(first_year, first_month).ok_or_else(out_of_range)?,
            month_start(end_year, end_month).ok_or_else(out_of_range)?,
        )?;

        Ok(Self {
            store,
            first,
            last,
            horizon,
            ensured: Mutex::new(HashMap::new()),
        })
    }

    /// Time span covered by explicit month partitions.
    pub fn horizon(&self) -> TimeRange {
        self.horizon
    }

    /// Partition that must hold a reading created at `ts`.
    ///
    /// Never fails. Boundaries are half-open, so the first instant of a month
    /// routes to that month.
    pub fn route_timestamp(&self, ts: DateTime<Utc>) -> PartitionHandle {
        if self.horizon.contains(ts) {
            PartitionHandle::month_of(ts)
        } else {
            PartitionHandle::Default
        }
    }

    /// Every explicit month in the horizon, oldest first.
    pub fn horizon_partitions(&self) -> Vec<PartitionHandle> {
        let mut partitions = Vec::new();
        let mut current = Some(self.first);
        while let Some(partition) = current {
            partitions.push(partition);
            if partition == self.last {
                break;
            }
            current = partition.next();
        }
        partitions
    }

    /// Partitions that may hold readings within `range`: the existing months
    /// that overlap it, oldest first, then the default partition if it exists.
    pub async fn partitions_for_range(&self, range: &TimeRange) -> Result<Vec<PartitionHandle>> {
        let mut existing = self.store.list_partitions().await?;
        existing.sort();

        let has_default = existing.iter().any(|p| p.is_default());
        let mut partitions: Vec<PartitionHandle> = existing
            .into_iter()
            .filter(|p| p.range().map_or(false, |bounds| bounds.overlaps(range)))
            .collect();
        if has_default {
            partitions.push(PartitionHandle::Default);
        }

        Ok(partitions)
    }

    /// Make sure the partition for `ts` exists and return it.
    pub async fn ensure_partition(&self, ts: DateTime<Utc>) -> Result<PartitionHandle> {
        let partition = self.route_timestamp(ts);
        self.ensure(&partition).await?;
        Ok(partition)
    }

    /// Make sure a specific partition exists.
    pub async fn ensure(&self, partition: &PartitionHandle) -> Result<()> {
        let cell = {
            let mut ensured = self.ensured.lock().await;
            ensured
                .entry(*partition)
                .or_insert_with(|| Arc::new(OnceCell::new()))
                .clone()
        };

        cell.get_or_try_init(|| async {
            self.store.create_partition(partition).await?;
            metrics::PARTITIONS_CREATED_TOTAL.inc();
            tracing::debug!(partition = %partition, "Partition ensured");
            Ok::<(), Error>(())
        })
        .await?;

        Ok(())
    }

    /// Materialize the default partition and every month of the horizon.
    ///
    /// Returns the number of partitions ensured.
    pub async fn bootstrap(&self) -> Result<usize> {
        self.ensure(&PartitionHandle::Default).await?;

        let months = self.horizon_partitions();
        for partition in &months {
            self.ensure(partition).await?;
        }

        let count = months.len() + 1;
        metrics::PARTITIONS_ACTIVE.set(self.store.list_partitions().await?.len() as i64);

        tracing::info!(
            first = %self.first,
            last = %self.last,
            partitions = count,
            "Partition horizon bootstrapped"
        );

        Ok(count)
    }

    /// Partitions that exist in the substrate.
    pub async fn list_partitions(&self) -> Result<Vec<PartitionHandle>> {
        Ok(self.store.list_partitions().await?)
    }
}

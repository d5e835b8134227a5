//! Partition Keys
//!
//! Readings are physically segmented by calendar month. A [`PartitionHandle`]
//! names one segment: either a month `[first instant of month, first instant
//! of next month)` or the catch-all default segment.
//!
//! ## Boundaries
//!
//! Ranges are half-open, so the first instant of a month belongs to that month
//! and never to the previous one:
//!
//! ```text
//! 2026-01-31T23:59:59.999999Z  → sensor_readings_2026_01
//! 2026-02-01T00:00:00Z         → sensor_readings_2026_02
//! ```
//!
//! Handles are derived from wall-clock time only, never from a sequence, so two
//! independent callers always agree on the segment a timestamp belongs to.

use crate::types::TimeRange;
use chrono::{DateTime, Datelike, NaiveDate, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use std::fmt::{Display, Formatter};

/// Table name prefix shared by every reading segment.
pub const READINGS_TABLE_PREFIX: &str = "sensor_readings";

/// Handle to one physical reading segment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum PartitionHandle {
    /// One calendar month (`month` is 1-based).
    Month { year: i32, month: u32 },
    /// Catch-all segment for timestamps outside the explicit horizon.
    Default,
}

impl PartitionHandle {
    /// The month partition a timestamp falls into.
    pub fn month_of(ts: DateTime<Utc>) -> Self {
        PartitionHandle::Month {
            year: ts.year(),
            month: ts.month(),
        }
    }

    /// Month partition for an explicit year/month, if the month is valid.
    pub fn month(year: i32, month: u32) -> Option<Self> {
        month_start(year, month).map(|_| PartitionHandle::Month { year, month })
    }

    pub fn is_default(&self) -> bool {
        matches!(self, PartitionHandle::Default)
    }

    /// Half-open time range covered by a month partition.
    ///
    /// `None` for the default partition (its extent is "everything not
    /// covered elsewhere") and at the edge of the representable calendar.
    pub fn range(&self) -> Option<TimeRange> {
        match *self {
            PartitionHandle::Month { year, month } => {
                let start = month_start(year, month)?;
                let (next_year, next_month) = next_month(year, month);
                let end = month_start(next_year, next_month)?;
                TimeRange::new(start, end).ok()
            }
            PartitionHandle::Default => None,
        }
    }

    /// The following month, or `None` for the default partition.
    pub fn next(&self) -> Option<Self> {
        match *self {
            PartitionHandle::Month { year, month } => {
                let (year, month) = next_month(year, month);
                PartitionHandle::month(year, month)
            }
            PartitionHandle::Default => None,
        }
    }

    /// Physical table name, e.g. `sensor_readings_2026_03`.
    ///
    /// Built from integers only, so it is always safe to splice into DDL.
    pub fn table_name(&self) -> String {
        match *self {
            PartitionHandle::Month { year, month } => {
                format!("{}_{:04}_{:02}", READINGS_TABLE_PREFIX, year, month)
            }
            PartitionHandle::Default => format!("{}_default", READINGS_TABLE_PREFIX),
        }
    }
}

impl Display for PartitionHandle {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.table_name())
    }
}

/// First instant of a calendar month in UTC.
pub fn month_start(year: i32, month: u32) -> Option<DateTime<Utc>> {
    let naive = NaiveDate::from_ymd_opt(year, month, 1)?.and_hms_opt(0, 0, 0)?;
    Some(Utc.from_utc_datetime(&naive))
}

fn next_month(year: i32, month: u32) -> (i32, u32) {
    if month >= 12 {
        (year.saturating_add(1), 1)
    } else {
        (year, month + 1)
    }
}

/// Shift a month partition by a signed number of months.
pub fn add_months(year: i32, month: u32, delta: i32) -> Option<(i32, u32)> {
    let index = i64::from(year) * 12 + i64::from(month) - 1 + i64::from(delta);
    let year = i32::try_from(index.div_euclid(12)).ok()?;
    let month = u32::try_from(index.rem_euclid(12)).ok()? + 1;
    Some((year, month))
}

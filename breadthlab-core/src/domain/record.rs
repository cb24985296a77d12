//! DailyBreadthRecord: the unit of truth for one trading day.

use super::movement::InstrumentError;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

/// Aggregate breadth for one effective trading date.
///
/// `breadth` and `ratio` are derived from the counts by [`from_counts`];
/// `processed` and `errors` are run diagnostics and are not persisted.
///
/// [`from_counts`]: DailyBreadthRecord::from_counts
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DailyBreadthRecord {
    pub date: NaiveDate,
    pub up: u32,
    pub down: u32,
    pub flat: u32,
    pub breadth: i64,
    pub ratio: Option<f64>,
    pub processed: u32,
    pub errors: Vec<InstrumentError>,
}

impl DailyBreadthRecord {
    pub fn from_counts(
        date: NaiveDate,
        up: u32,
        down: u32,
        flat: u32,
        errors: Vec<InstrumentError>,
    ) -> Self {
        Self {
            date,
            up,
            down,
            flat,
            breadth: breadth(up, down),
            ratio: up_ratio(up, down),
            processed: up + down + flat,
            errors,
        }
    }
}

/// `up - down`.
pub fn breadth(up: u32, down: u32) -> i64 {
    i64::from(up) - i64::from(down)
}

/// Fraction of directional movers that rose; `None` when nothing moved.
pub fn up_ratio(up: u32, down: u32) -> Option<f64> {
    let movers = up + down;
    (movers > 0).then(|| f64::from(up) / f64::from(movers))
}

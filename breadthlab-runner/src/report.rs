//! Calendar-month rollups of the persisted series.

use breadthlab_core::{BreadthSeries, SeriesRow};
use chrono::Datelike;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MonthSummary {
    /// `YYYY-MM`.
    pub month: String,
    /// Trading days recorded in the month.
    pub days: usize,
    /// Mean over days with a recorded breadth.
    pub mean_breadth: Option<f64>,
    /// Mean over days with a defined ratio.
    pub mean_ratio: Option<f64>,
    pub up: u64,
    pub down: u64,
    pub flat: u64,
}

#[derive(Default)]
struct Acc {
    days: usize,
    breadth_sum: f64,
    breadth_n: usize,
    ratio_sum: f64,
    ratio_n: usize,
    up: u64,
    down: u64,
    flat: u64,
}

impl Acc {
    fn add(&mut self, row: &SeriesRow) {
        self.days += 1;
        if let Some(b) = row.breadth {
            self.breadth_sum += b as f64;
            self.breadth_n += 1;
        }
        if let Some(r) = row.ratio {
            self.ratio_sum += r;
            self.ratio_n += 1;
        }
        self.up += u64::from(row.up.unwrap_or(0));
        self.down += u64::from(row.down.unwrap_or(0));
        self.flat += u64::from(row.flat.unwrap_or(0));
    }
}

/// One summary per calendar month present in `series`, oldest first.
pub fn monthly_summary(series: &BreadthSeries) -> Vec<MonthSummary> {
    let mut months: BTreeMap<(i32, u32), Acc> = BTreeMap::new();
    for row in series.rows() {
        months
            .entry((row.date.year(), row.date.month()))
            .or_default()
            .add(row);
    }

    months
        .into_iter()
        .map(|((year, month), acc)| MonthSummary {
            month: format!("{year:04}-{month:02}"),
            days: acc.days,
            mean_breadth: (acc.breadth_n > 0).then(|| acc.breadth_sum / acc.breadth_n as f64),
            mean_ratio: (acc.ratio_n > 0).then(|| acc.ratio_sum / acc.ratio_n as f64),
            up: acc.up,
            down: acc.down,
            flat: acc.flat,
        })
        .collect()
}

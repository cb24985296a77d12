//! Anomaly detector: flags a single-day breadth collapse against the
//! trailing window of the persisted series.
//!
//! A day is anomalous when
//!
//! ```text
//! current.breadth < mean(window) - sigma * sample_std(window)
//! ```
//!
//! with `sigma = 2` by default. Fewer than two window values, or a constant
//! window, never flags.
//!
//! Window policy:
//! - [`WindowPolicy::Exclusive`] (default): the `window` most recent persisted
//!   rows dated strictly before the current record.
//! - [`WindowPolicy::Inclusive`]: the current record plus the `window - 1`
//!   most recent earlier rows. Including the day under test pulls the mean
//!   toward it; with `n` values a single point can sit at most
//!   `(n - 1) / sqrt(n)` sample deviations below the mean, so an inclusive
//!   window needs at least 6 values before a 2-sigma flag is reachable.
//!
//! Rows dated after the current record are ignored in both modes, and rows
//! whose breadth is missing are skipped. The detector only reads the series.

use crate::domain::DailyBreadthRecord;
use crate::series::BreadthSeries;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

pub const DEFAULT_WINDOW: usize = 5;
pub const DEFAULT_SIGMA: f64 = 2.0;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WindowPolicy {
    #[default]
    Exclusive,
    Inclusive,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DetectorConfig {
    pub window: usize,
    pub sigma: f64,
    pub policy: WindowPolicy,
}

impl Default for DetectorConfig {
    fn default() -> Self {
        Self {
            window: DEFAULT_WINDOW,
            sigma: DEFAULT_SIGMA,
            policy: WindowPolicy::Exclusive,
        }
    }
}

/// Detector output handed to the presentation layer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnomalyReport {
    pub current_breadth: i64,
    /// Mean breadth over the window; `None` when the window is empty.
    pub mean_breadth: Option<f64>,
    /// Sample standard deviation; `None` with fewer than two values.
    pub std_breadth: Option<f64>,
    pub window_len: usize,
    /// `mean - sigma * std`, when defined and the deviation is non-zero.
    pub threshold: Option<f64>,
    pub is_anomalous: bool,
}

impl AnomalyReport {
    /// Banner text for an anomalous day.
    pub fn warning_message(&self) -> Option<String> {
        if !self.is_anomalous {
            return None;
        }
        let mean = self.mean_breadth?;
        Some(format!(
            "breadth collapsed: today's breadth {}, well below the trailing {}-day mean {:.1}",
            self.current_breadth, self.window_len, mean
        ))
    }
}

pub fn mean(values: &[f64]) -> Option<f64> {
    if values.is_empty() {
        return None;
    }
    Some(values.iter().sum::<f64>() / values.len() as f64)
}

/// Sample (n - 1) standard deviation.
pub fn sample_std(values: &[f64]) -> Option<f64> {
    if values.len() < 2 {
        return None;
    }
    let m = mean(values)?;
    let variance = values.iter().map(|v| (v - m).powi(2)).sum::<f64>() / (values.len() - 1) as f64;
    Some(variance.sqrt())
}

/// Breadth values forming the baseline window for `current`.
pub fn window_values(
    current: &DailyBreadthRecord,
    series: &BreadthSeries,
    config: &DetectorConfig,
) -> Vec<f64> {
    window_for(current.date, current.breadth, series, config)
}

fn window_for(
    date: NaiveDate,
    breadth: i64,
    series: &BreadthSeries,
    config: &DetectorConfig,
) -> Vec<f64> {
    let prior: Vec<f64> = series
        .before(date)
        .iter()
        .filter_map(|r| r.breadth)
        .map(|b| b as f64)
        .collect();

    let take = match config.policy {
        WindowPolicy::Exclusive => config.window,
        WindowPolicy::Inclusive => config.window.saturating_sub(1),
    };
    let mut window = prior[prior.len().saturating_sub(take)..].to_vec();
    if config.policy == WindowPolicy::Inclusive && config.window > 0 {
        window.push(breadth as f64);
    }
    window
}

pub fn analyze(
    current: &DailyBreadthRecord,
    series: &BreadthSeries,
    config: &DetectorConfig,
) -> AnomalyReport {
    analyze_breadth(current.date, current.breadth, series, config)
}

/// Same as [`analyze`] for a day known only by its date and breadth, such as
/// a persisted row whose counts were not kept.
pub fn analyze_breadth(
    date: NaiveDate,
    breadth: i64,
    series: &BreadthSeries,
    config: &DetectorConfig,
) -> AnomalyReport {
    let window = window_for(date, breadth, series, config);
    let mean_breadth = mean(&window);
    let std_breadth = sample_std(&window);

    let threshold = match (mean_breadth, std_breadth) {
        (Some(m), Some(s)) if s > 0.0 => Some(m - config.sigma * s),
        _ => None,
    };
    let is_anomalous = threshold.is_some_and(|t| (breadth as f64) < t);

    if is_anomalous {
        tracing::warn!(
            %date,
            breadth,
            mean = ?mean_breadth,
            threshold = ?threshold,
            "breadth collapse detected"
        );
    }

    AnomalyReport {
        current_breadth: breadth,
        mean_breadth,
        std_breadth,
        window_len: window.len(),
        threshold,
        is_anomalous,
    }
}

/// Whether `current` is a two-sigma breadth collapse against the `window`
/// prior rows of `series`.
pub fn detect(current: &DailyBreadthRecord, series: &BreadthSeries, window: usize) -> bool {
    let config = DetectorConfig {
        window,
        ..DetectorConfig::default()
    };
    analyze(current, series, &config).is_anomalous
}

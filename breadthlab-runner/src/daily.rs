//! One daily run: compute breadth, persist it, read the history back, and
//! check the day against its trailing window.
//!
//! Order of effects:
//! 1. Reuse a fresh cached record, or compute one with the breadth engine.
//! 2. Load the series, upsert the record, save atomically.
//! 3. Reload the saved file and run the detector on what was persisted.
//!
//! A total data fault stops before step 2, so nothing is written. A
//! persistence fault still hands the computed record back to the caller.

use crate::cache::{cache_key, RunCache};
use crate::config::{ConfigError, RunConfig};
use breadthlab_core::data::PriceHistoryProvider;
use breadthlab_core::{
    analyze, AnomalyReport, BreadthEngine, BreadthError, BreadthSeries, DailyBreadthRecord,
    SeriesError, UpsertOutcome,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum RunError {
    #[error("config error: {0}")]
    Config(#[from] ConfigError),

    #[error("data error: {0}")]
    Breadth(#[from] BreadthError),

    #[error("persistence error for {}: {source}", .record.date)]
    Persistence {
        /// The computed record that could not be stored.
        record: Box<DailyBreadthRecord>,
        source: SeriesError,
    },
}

impl RunError {
    /// The computed record, when the failure happened after computation.
    pub fn record(&self) -> Option<&DailyBreadthRecord> {
        match self {
            RunError::Persistence { record, .. } => Some(record.as_ref()),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DailyRunOutcome {
    pub record: DailyBreadthRecord,
    pub upsert: UpsertOutcome,
    pub report: AnomalyReport,
    /// The record came from the rerun cache instead of the provider.
    pub from_cache: bool,
    /// Rows in the persisted series after the save.
    pub series_len: usize,
}

pub fn run_daily(
    config: &RunConfig,
    provider: &dyn PriceHistoryProvider,
    cache: Option<&RunCache>,
    now: DateTime<Utc>,
) -> Result<DailyRunOutcome, RunError> {
    let identifiers = config.identifiers()?;
    let key = cache_key(provider.name(), &identifiers, &config.engine);

    let cached = cache.and_then(|c| match c.get(&key, now) {
        Ok(hit) => hit,
        Err(e) => {
            tracing::warn!(error = %format!("{e:#}"), "ignoring unreadable rerun cache entry");
            None
        }
    });

    let from_cache = cached.is_some();
    let record = match cached {
        Some(record) => {
            tracing::info!(date = %record.date, "reusing breadth from a recent run");
            record
        }
        None => {
            if !provider.is_available() {
                tracing::warn!(
                    provider = provider.name(),
                    "price source is refusing requests, expect provider faults"
                );
            }
            tracing::info!(
                instruments = identifiers.len(),
                provider = provider.name(),
                lookback = config.engine.lookback.as_days(),
                "computing breadth"
            );
            let record = BreadthEngine::new(provider, config.engine).compute(&identifiers)?;
            if let Some(c) = cache {
                if let Err(e) = c.put(&key, &record, now) {
                    tracing::warn!(error = %format!("{e:#}"), "could not write rerun cache");
                }
            }
            record
        }
    };

    let path = &config.store.path;
    let persist = |record: &DailyBreadthRecord| -> Result<(UpsertOutcome, BreadthSeries), SeriesError> {
        let mut series = BreadthSeries::load(path)?;
        let upsert = series.upsert(record);
        series.save(path)?;
        let saved = BreadthSeries::load(path)?;
        Ok((upsert, saved))
    };

    let (upsert, saved) = match persist(&record) {
        Ok(v) => v,
        Err(source) => {
            return Err(RunError::Persistence {
                record: Box::new(record),
                source,
            })
        }
    };

    tracing::info!(
        path = %path.display(),
        date = %record.date,
        ?upsert,
        rows = saved.len(),
        "breadth persisted"
    );

    let report = analyze(&record, &saved, &config.detector);

    Ok(DailyRunOutcome {
        record,
        upsert,
        report,
        from_cache,
        series_len: saved.len(),
    })
}

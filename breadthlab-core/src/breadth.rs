//! Breadth engine: classifies every instrument's latest session and
//! aggregates the day's up/down/flat counts.
//!
//! Each instrument is evaluated independently and yields either an
//! [`InstrumentMove`] or an [`InstrumentFault`]. Faults are collected into the
//! record's `errors` list; only a run in which no instrument could be
//! classified is an error for the caller.
//!
//! The record's date is the latest session date observed across classified
//! instruments, never the wall clock, so a lagging feed files the day under
//! the session it actually describes.

use crate::data::provider::{ClosePoint, DataError, Lookback, PriceHistoryProvider};
use crate::domain::{DailyBreadthRecord, Direction, InstrumentError, InstrumentMove};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub lookback: Lookback,
    /// Absolute close change at or below which a move counts as flat.
    pub flat_epsilon: f64,
    /// Classify instruments on the rayon pool.
    pub parallel: bool,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            lookback: Lookback::default(),
            flat_epsilon: 0.0,
            parallel: false,
        }
    }
}

/// Why one instrument could not be classified.
#[derive(Debug, Error)]
pub enum InstrumentFault {
    #[error("no data returned")]
    NoData,

    #[error("insufficient trading days (valid closes: {rows})")]
    InsufficientHistory { rows: usize },

    #[error("provider error: {0}")]
    Provider(#[from] DataError),
}

#[derive(Debug, Error)]
pub enum BreadthError {
    #[error(
        "no usable data from any of {} instrument(s): {}",
        .causes.len(),
        join_causes(.causes)
    )]
    NoUsableData { causes: Vec<InstrumentError> },
}

fn join_causes(causes: &[InstrumentError]) -> String {
    if causes.is_empty() {
        return "no instruments given".to_string();
    }
    causes
        .iter()
        .map(|c| c.to_string())
        .collect::<Vec<_>>()
        .join("; ")
}

/// Classify one instrument from its close history.
///
/// Missing and non-finite closes are discarded first; the two most recent
/// remaining sessions are compared. Input order does not matter.
pub fn classify_history(
    identifier: &str,
    points: &[ClosePoint],
    flat_epsilon: f64,
) -> Result<InstrumentMove, InstrumentFault> {
    if points.is_empty() {
        return Err(InstrumentFault::NoData);
    }

    let mut valid: Vec<(chrono::NaiveDate, f64)> = points
        .iter()
        .filter_map(|p| p.valid_close().map(|c| (p.date, c)))
        .collect();
    valid.sort_by_key(|(date, _)| *date);
    // A repeated session keeps its last reported close.
    valid.reverse();
    valid.dedup_by_key(|(date, _)| *date);
    valid.reverse();

    match valid.as_slice() {
        [.., (_, previous), (latest_date, latest)] => Ok(InstrumentMove {
            identifier: identifier.to_string(),
            direction: Direction::classify(*previous, *latest, flat_epsilon),
            latest_date: *latest_date,
            previous_close: *previous,
            latest_close: *latest,
        }),
        _ => Err(InstrumentFault::InsufficientHistory { rows: valid.len() }),
    }
}

/// Fetch and classify one instrument.
pub fn classify_instrument(
    provider: &dyn PriceHistoryProvider,
    identifier: &str,
    config: &EngineConfig,
) -> Result<InstrumentMove, InstrumentFault> {
    let history = provider.fetch_closes(identifier, config.lookback)?;
    classify_history(identifier, &history.points, config.flat_epsilon)
}

/// Fold per-instrument outcomes into a daily record.
///
/// `outcomes` keeps input order so `errors` lists faults in the order the
/// instruments were given.
pub fn aggregate<I>(outcomes: I) -> Result<DailyBreadthRecord, BreadthError>
where
    I: IntoIterator<Item = (String, Result<InstrumentMove, InstrumentFault>)>,
{
    let (mut up, mut down, mut flat) = (0u32, 0u32, 0u32);
    let mut latest_date = None;
    let mut errors = Vec::new();

    for (identifier, outcome) in outcomes {
        match outcome {
            Ok(m) => {
                match m.direction {
                    Direction::Up => up += 1,
                    Direction::Down => down += 1,
                    Direction::Flat => flat += 1,
                }
                latest_date = latest_date.max(Some(m.latest_date));
            }
            Err(fault) => errors.push(InstrumentError {
                identifier,
                cause: fault.to_string(),
            }),
        }
    }

    match latest_date {
        Some(date) => Ok(DailyBreadthRecord::from_counts(date, up, down, flat, errors)),
        None => Err(BreadthError::NoUsableData { causes: errors }),
    }
}

/// Computes daily breadth over a list of instruments from a history provider.
pub struct BreadthEngine<'a> {
    provider: &'a dyn PriceHistoryProvider,
    config: EngineConfig,
}

impl<'a> BreadthEngine<'a> {
    pub fn new(provider: &'a dyn PriceHistoryProvider, config: EngineConfig) -> Self {
        Self { provider, config }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Classify every identifier and aggregate the result.
    ///
    /// Fails only when no identifier yields a usable classification.
    pub fn compute<S>(&self, identifiers: &[S]) -> Result<DailyBreadthRecord, BreadthError>
    where
        S: AsRef<str> + Sync,
    {
        let evaluate = |id: &S| {
            let id = id.as_ref();
            let outcome = classify_instrument(self.provider, id, &self.config);
            if let Err(fault) = &outcome {
                tracing::warn!(instrument = id, provider = self.provider.name(), %fault, "instrument skipped");
            }
            (id.to_string(), outcome)
        };

        let outcomes: Vec<_> = if self.config.parallel {
            identifiers.par_iter().map(evaluate).collect()
        } else {
            identifiers.iter().map(evaluate).collect()
        };

        let record = aggregate(outcomes)?;
        tracing::info!(
            date = %record.date,
            up = record.up,
            down = record.down,
            flat = record.flat,
            breadth = record.breadth,
            processed = record.processed,
            failed = record.errors.len(),
            "breadth computed"
        );
        Ok(record)
    }
}

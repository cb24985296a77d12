//! Price-history provider trait and structured error types.
//!
//! The PriceHistoryProvider trait abstracts over data sources (Yahoo Finance,
//! CSV import, synthetic walks) so the breadth engine can be driven by any of
//! them and mocked in tests.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Shortest lookback that still guarantees two sessions across a long weekend.
pub const MIN_LOOKBACK_DAYS: u32 = 7;

/// Default lookback window in calendar days.
pub const DEFAULT_LOOKBACK_DAYS: u32 = 10;

/// One daily close as returned by a provider.
///
/// `close` is `None` when the source reported the session but no price
/// (Yahoo returns explicit nulls on halts and some holidays).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ClosePoint {
    pub date: NaiveDate,
    pub close: Option<f64>,
}

impl ClosePoint {
    pub fn new(date: NaiveDate, close: f64) -> Self {
        Self {
            date,
            close: Some(close),
        }
    }

    pub fn missing(date: NaiveDate) -> Self {
        Self { date, close: None }
    }

    /// The close, if it is present and a finite number.
    pub fn valid_close(&self) -> Option<f64> {
        self.close.filter(|c| c.is_finite())
    }
}

/// Calendar-day lookback window for a history request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "u32", into = "u32")]
pub struct Lookback(u32);

impl Lookback {
    /// Build a lookback of `days` calendar days. Rejects windows shorter than
    /// [`MIN_LOOKBACK_DAYS`].
    pub fn days(days: u32) -> Result<Self, DataError> {
        if days < MIN_LOOKBACK_DAYS {
            return Err(DataError::LookbackTooShort {
                days,
                min: MIN_LOOKBACK_DAYS,
            });
        }
        Ok(Self(days))
    }

    pub fn as_days(&self) -> u32 {
        self.0
    }
}

impl Default for Lookback {
    fn default() -> Self {
        Self(DEFAULT_LOOKBACK_DAYS)
    }
}

impl TryFrom<u32> for Lookback {
    type Error = DataError;

    fn try_from(days: u32) -> Result<Self, Self::Error> {
        Self::days(days)
    }
}

impl From<Lookback> for u32 {
    fn from(lookback: Lookback) -> Self {
        lookback.0
    }
}

/// Structured error types for data operations.
#[derive(Debug, Error)]
pub enum DataError {
    #[error("network unreachable: {0}")]
    NetworkUnreachable(String),

    #[error("rate limited by provider (retry after {retry_after_secs}s)")]
    RateLimited { retry_after_secs: u64 },

    #[error("response format changed: {0}")]
    ResponseFormatChanged(String),

    #[error("symbol not found: {symbol}")]
    SymbolNotFound { symbol: String },

    #[error("hard stop: data provider has blocked requests (circuit breaker tripped)")]
    CircuitBreakerTripped,

    #[error("lookback of {days} days is too short (minimum {min})")]
    LookbackTooShort { days: u32, min: u32 },

    #[error("csv import error: {0}")]
    CsvImport(String),

    #[error("data error: {0}")]
    Other(String),
}

/// Daily close history for one instrument.
#[derive(Debug, Clone)]
pub struct PriceHistory {
    pub identifier: String,
    pub points: Vec<ClosePoint>,
    pub source: DataSource,
}

/// Where the data came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DataSource {
    YahooFinance,
    CsvImport,
    Synthetic,
}

/// Source of daily closing-price history.
///
/// Implementations may return points in ascending or descending date order;
/// the engine sorts before classifying. An empty `points` vector is the
/// "no data" signal.
pub trait PriceHistoryProvider: Send + Sync {
    /// Human-readable name of this provider.
    fn name(&self) -> &str;

    /// Fetch daily closes for an instrument over the trailing lookback window.
    fn fetch_closes(&self, identifier: &str, lookback: Lookback) -> Result<PriceHistory, DataError>;

    /// Whether the provider is currently accepting requests.
    fn is_available(&self) -> bool {
        true
    }
}

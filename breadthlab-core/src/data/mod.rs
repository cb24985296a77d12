//! Price-history providers and universe configuration.

pub mod circuit_breaker;
pub mod csv_import;
pub mod provider;
pub mod synthetic;
pub mod universe;
pub mod yahoo;

pub use circuit_breaker::CircuitBreaker;
pub use csv_import::CsvDirProvider;
pub use provider::{
    ClosePoint, DataError, DataSource, Lookback, PriceHistory, PriceHistoryProvider,
    DEFAULT_LOOKBACK_DAYS, MIN_LOOKBACK_DAYS,
};
pub use synthetic::SyntheticProvider;
pub use universe::{Universe, UniverseError};
pub use yahoo::YahooProvider;

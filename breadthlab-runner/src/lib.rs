//! BreadthLab Runner: one daily breadth run end to end.
//!
//! This crate builds on `breadthlab-core` to provide:
//! - TOML run configuration with defaults for every section
//! - Rerun memoization keyed by price source, instrument list and engine settings
//! - The daily pipeline: engine, store, read-back, detector
//! - Monthly rollups of the persisted series

pub mod cache;
pub mod config;
pub mod daily;
pub mod report;

pub use cache::{cache_key, CacheKey, CachedRun, RunCache};
pub use config::{CacheConfig, ConfigError, RunConfig, StoreConfig, UniverseConfig};
pub use daily::{run_daily, DailyRunOutcome, RunError};
pub use report::{monthly_summary, MonthSummary};

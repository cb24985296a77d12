//! BreadthLab Core: daily market breadth, its persisted history, and
//! breadth-collapse detection.
//!
//! - Price-history providers (Yahoo Finance, CSV import, synthetic)
//! - Breadth engine: per-instrument classification with fault isolation
//! - Date-keyed CSV series with idempotent upsert and atomic saves
//! - Trailing-window anomaly detector

pub mod anomaly;
pub mod breadth;
pub mod data;
pub mod domain;
pub mod series;

pub use anomaly::{analyze, analyze_breadth, detect, AnomalyReport, DetectorConfig, WindowPolicy};
pub use breadth::{BreadthEngine, BreadthError, EngineConfig, InstrumentFault};
pub use domain::{DailyBreadthRecord, Direction, InstrumentError, InstrumentMove};
pub use series::{BreadthSeries, SeriesError, SeriesRow, UpsertOutcome};

//! Core domain types: per-instrument moves and the daily breadth record.

pub mod movement;
pub mod record;

pub use movement::{Direction, InstrumentError, InstrumentMove};
pub use record::DailyBreadthRecord;

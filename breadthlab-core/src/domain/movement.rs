//! InstrumentMove: one instrument's latest session classified against the prior one.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    Up,
    Down,
    Flat,
}

impl Direction {
    /// Classify `latest` against `previous`.
    ///
    /// A move whose absolute size is at most `flat_epsilon` is flat, so the
    /// default epsilon of zero gives strict up/down/equal classification.
    pub fn classify(previous: f64, latest: f64, flat_epsilon: f64) -> Self {
        let diff = latest - previous;
        if diff > flat_epsilon {
            Direction::Up
        } else if diff < -flat_epsilon {
            Direction::Down
        } else {
            Direction::Flat
        }
    }
}

/// Successful classification of one instrument.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InstrumentMove {
    pub identifier: String,
    pub direction: Direction,
    /// Session date of `latest_close`.
    pub latest_date: NaiveDate,
    pub previous_close: f64,
    pub latest_close: f64,
}

/// An instrument that could not be classified, with a human-readable cause.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InstrumentError {
    pub identifier: String,
    pub cause: String,
}

impl std::fmt::Display for InstrumentError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.identifier, self.cause)
    }
}

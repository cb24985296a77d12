//! Deterministic synthetic closes for demos and offline development.
//!
//! Each identifier gets its own random walk seeded from the BLAKE3 hash of its
//! name, ending at a caller-supplied anchor date. Weekends are skipped.

use super::provider::{
    ClosePoint, DataError, DataSource, Lookback, PriceHistory, PriceHistoryProvider,
};
use chrono::{Datelike, NaiveDate, Weekday};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

pub struct SyntheticProvider {
    anchor: NaiveDate,
}

impl SyntheticProvider {
    pub fn new(anchor: NaiveDate) -> Self {
        Self { anchor }
    }

    fn walk(&self, identifier: &str, lookback: Lookback) -> Vec<ClosePoint> {
        let seed: [u8; 32] = *blake3::hash(identifier.as_bytes()).as_bytes();
        let mut rng = StdRng::from_seed(seed);

        let start = self.anchor - chrono::Duration::days(i64::from(lookback.as_days()) - 1);
        let mut price = rng.gen_range(20.0..800.0_f64);
        let mut points = Vec::new();
        let mut current = start;

        while current <= self.anchor {
            if !matches!(current.weekday(), Weekday::Sat | Weekday::Sun) {
                let daily_return: f64 = rng.gen_range(-0.03..0.03);
                price *= 1.0 + daily_return;
                points.push(ClosePoint::new(current, (price * 100.0).round() / 100.0));
            }
            current += chrono::Duration::days(1);
        }

        points
    }
}

impl PriceHistoryProvider for SyntheticProvider {
    fn name(&self) -> &str {
        "synthetic"
    }

    fn fetch_closes(&self, identifier: &str, lookback: Lookback) -> Result<PriceHistory, DataError> {
        Ok(PriceHistory {
            identifier: identifier.to_string(),
            points: self.walk(identifier, lookback),
            source: DataSource::Synthetic,
        })
    }
}

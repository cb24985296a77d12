//! Property tests for monthly rollups and cache keys.

use breadthlab_core::data::Lookback;
use breadthlab_core::{BreadthSeries, DailyBreadthRecord, EngineConfig};
use breadthlab_runner::{cache_key, monthly_summary};
use chrono::{Days, NaiveDate};
use proptest::prelude::*;

fn arb_record() -> impl Strategy<Value = DailyBreadthRecord> {
    (0u64..400, 0u32..50, 0u32..50, 0u32..50).prop_map(|(offset, up, down, flat)| {
        let date = NaiveDate::from_ymd_opt(2023, 1, 1).unwrap() + Days::new(offset);
        DailyBreadthRecord::from_counts(date, up, down, flat, Vec::new())
    })
}

proptest! {
    #[test]
    fn months_partition_the_series(records in prop::collection::vec(arb_record(), 0..60)) {
        let mut series = BreadthSeries::new();
        for r in &records {
            series.upsert(r);
        }
        let months = monthly_summary(&series);

        let days: usize = months.iter().map(|m| m.days).sum();
        prop_assert_eq!(days, series.len());

        let up: u64 = months.iter().map(|m| m.up).sum();
        let expected_up: u64 = series.rows().iter().filter_map(|r| r.up).map(u64::from).sum();
        prop_assert_eq!(up, expected_up);

        prop_assert!(months.windows(2).all(|w| w[0].month < w[1].month));
        for m in &months {
            if let Some(ratio) = m.mean_ratio {
                prop_assert!((0.0..=1.0).contains(&ratio));
            }
        }
    }

    #[test]
    fn cache_key_is_stable(ids in prop::collection::vec("[A-Z0-9.]{1,8}", 1..10), days in 7u32..60) {
        let engine = EngineConfig {
            lookback: Lookback::days(days).unwrap(),
            ..EngineConfig::default()
        };
        prop_assert_eq!(
            cache_key("csv_import", &ids, &engine),
            cache_key("csv_import", &ids.clone(), &engine)
        );
    }
}

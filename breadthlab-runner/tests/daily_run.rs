//! End-to-end daily runs against an in-memory provider and a temp store.

use breadthlab_core::data::{ClosePoint, DataError, DataSource, Lookback, PriceHistory, PriceHistoryProvider};
use breadthlab_core::{BreadthSeries, UpsertOutcome};
use breadthlab_runner::{run_daily, RunCache, RunConfig, RunError, UniverseConfig};
use chrono::{DateTime, NaiveDate, TimeZone, Utc};
use std::collections::HashMap;
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};

fn d(day: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(2024, 3, day).unwrap()
}

fn now(min: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 3, 15, 14, min, 0).unwrap()
}

/// Serves two-session histories: `(previous, latest)` closes ending on `date`.
struct StubProvider {
    name: &'static str,
    date: NaiveDate,
    moves: HashMap<String, Option<(f64, f64)>>,
    calls: AtomicUsize,
}

impl StubProvider {
    fn new(date: NaiveDate, moves: &[(&str, Option<(f64, f64)>)]) -> Self {
        Self {
            name: "stub",
            date,
            moves: moves.iter().map(|(id, m)| (id.to_string(), *m)).collect(),
            calls: AtomicUsize::new(0),
        }
    }

    fn named(mut self, name: &'static str) -> Self {
        self.name = name;
        self
    }

    fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl PriceHistoryProvider for StubProvider {
    fn name(&self) -> &str {
        self.name
    }

    fn fetch_closes(&self, identifier: &str, _lookback: Lookback) -> Result<PriceHistory, DataError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        match self.moves.get(identifier) {
            Some(Some((prev, latest))) => Ok(PriceHistory {
                identifier: identifier.to_string(),
                points: vec![
                    ClosePoint::new(self.date.pred_opt().unwrap(), *prev),
                    ClosePoint::new(self.date, *latest),
                ],
                source: DataSource::Synthetic,
            }),
            _ => Err(DataError::NetworkUnreachable("timed out".into())),
        }
    }
}

fn config(store: &Path, ids: &[&str]) -> RunConfig {
    let mut config = RunConfig {
        universe: UniverseConfig {
            identifiers: ids.iter().map(|s| s.to_string()).collect(),
            file: None,
        },
        ..RunConfig::default()
    };
    config.store.path = store.to_path_buf();
    config
}

#[test]
fn first_run_writes_one_row_and_reports() {
    let dir = tempfile::tempdir().unwrap();
    let store = dir.path().join("data").join("market_breadth.csv");
    let provider = StubProvider::new(
        d(15),
        &[("A", Some((10.0, 11.0))), ("B", Some((10.0, 9.0))), ("C", None)],
    );

    let outcome = run_daily(&config(&store, &["A", "B", "C"]), &provider, None, now(0)).unwrap();

    assert_eq!(outcome.record.date, d(15));
    assert_eq!((outcome.record.up, outcome.record.down, outcome.record.flat), (1, 1, 0));
    assert_eq!(outcome.record.processed, 2);
    assert_eq!(outcome.record.errors.len(), 1);
    assert_eq!(outcome.record.errors[0].identifier, "C");
    assert_eq!(outcome.upsert, UpsertOutcome::Inserted);
    assert_eq!(outcome.series_len, 1);
    assert!(!outcome.from_cache);
    assert!(!outcome.report.is_anomalous);

    let text = std::fs::read_to_string(&store).unwrap();
    assert_eq!(text, "date,up,down,flat,breadth,ratio\n2024-03-15,1,1,0,0,0.5\n");
}

#[test]
fn rerun_same_day_updates_in_place() {
    let dir = tempfile::tempdir().unwrap();
    let store = dir.path().join("market_breadth.csv");
    let cfg = config(&store, &["A", "B"]);

    let first = StubProvider::new(d(15), &[("A", Some((10.0, 11.0))), ("B", Some((10.0, 9.0)))]);
    run_daily(&cfg, &first, None, now(0)).unwrap();

    let second = StubProvider::new(d(15), &[("A", Some((10.0, 11.0))), ("B", Some((10.0, 12.0)))]);
    let outcome = run_daily(&cfg, &second, None, now(5)).unwrap();

    assert_eq!(outcome.upsert, UpsertOutcome::Updated);
    let series = BreadthSeries::load(&store).unwrap();
    assert_eq!(series.len(), 1);
    assert_eq!(series.get(d(15)).unwrap().up, Some(2));
}

#[test]
fn total_data_fault_writes_nothing() {
    let dir = tempfile::tempdir().unwrap();
    let store = dir.path().join("market_breadth.csv");
    let provider = StubProvider::new(d(15), &[("A", None), ("B", None)]);

    let err = run_daily(&config(&store, &["A", "B"]), &provider, None, now(0)).unwrap_err();

    assert!(matches!(err, RunError::Breadth(_)));
    assert!(err.record().is_none());
    assert!(!store.exists());
}

#[test]
fn total_data_fault_leaves_existing_history_untouched() {
    let dir = tempfile::tempdir().unwrap();
    let store = dir.path().join("market_breadth.csv");
    let cfg = config(&store, &["A"]);

    let good = StubProvider::new(d(14), &[("A", Some((10.0, 11.0)))]);
    run_daily(&cfg, &good, None, now(0)).unwrap();
    let before = std::fs::read_to_string(&store).unwrap();

    let bad = StubProvider::new(d(15), &[("A", None)]);
    assert!(run_daily(&cfg, &bad, None, now(1)).is_err());
    assert_eq!(std::fs::read_to_string(&store).unwrap(), before);
}

#[test]
fn persistence_fault_returns_the_computed_record() {
    let dir = tempfile::tempdir().unwrap();
    let store = dir.path().join("market_breadth.csv");
    std::fs::create_dir(&store).unwrap();
    let provider = StubProvider::new(d(15), &[("A", Some((10.0, 11.0)))]);

    let err = run_daily(&config(&store, &["A"]), &provider, None, now(0)).unwrap_err();

    assert!(matches!(err, RunError::Persistence { .. }));
    let record = err.record().unwrap();
    assert_eq!(record.date, d(15));
    assert_eq!(record.up, 1);
}

#[test]
fn rerun_within_ttl_reuses_cached_record() {
    let dir = tempfile::tempdir().unwrap();
    let store = dir.path().join("market_breadth.csv");
    let cache = RunCache::new(dir.path().join("cache"), 600).unwrap();
    let cfg = config(&store, &["A", "B"]);
    let provider = StubProvider::new(d(15), &[("A", Some((10.0, 11.0))), ("B", Some((10.0, 9.0)))]);

    let first = run_daily(&cfg, &provider, Some(&cache), now(0)).unwrap();
    assert!(!first.from_cache);
    assert_eq!(provider.calls(), 2);

    let second = run_daily(&cfg, &provider, Some(&cache), now(5)).unwrap();
    assert!(second.from_cache);
    assert_eq!(provider.calls(), 2);
    assert_eq!(second.record, first.record);
    assert_eq!(second.upsert, UpsertOutcome::Updated);

    let third = run_daily(&cfg, &provider, Some(&cache), now(11)).unwrap();
    assert!(!third.from_cache);
    assert_eq!(provider.calls(), 4);
}

#[test]
fn changed_universe_misses_the_cache() {
    let dir = tempfile::tempdir().unwrap();
    let store = dir.path().join("market_breadth.csv");
    let cache = RunCache::new(dir.path().join("cache"), 600).unwrap();
    let provider = StubProvider::new(d(15), &[("A", Some((10.0, 11.0))), ("B", Some((10.0, 9.0)))]);

    run_daily(&config(&store, &["A", "B"]), &provider, Some(&cache), now(0)).unwrap();
    let outcome = run_daily(&config(&store, &["A"]), &provider, Some(&cache), now(1)).unwrap();

    assert!(!outcome.from_cache);
    assert_eq!(provider.calls(), 3);
}

#[test]
fn different_price_source_misses_the_cache() {
    let dir = tempfile::tempdir().unwrap();
    let store = dir.path().join("market_breadth.csv");
    let cache = RunCache::new(dir.path().join("cache"), 600).unwrap();
    let cfg = config(&store, &["A", "B"]);

    let demo = StubProvider::new(d(15), &[("A", Some((10.0, 11.0))), ("B", Some((10.0, 11.0)))])
        .named("synthetic");
    let first = run_daily(&cfg, &demo, Some(&cache), now(0)).unwrap();
    assert_eq!(first.record.up, 2);

    let real = StubProvider::new(d(15), &[("A", Some((10.0, 9.0))), ("B", Some((10.0, 9.0)))]);
    let second = run_daily(&cfg, &real, Some(&cache), now(1)).unwrap();

    assert!(!second.from_cache);
    assert_eq!(real.calls(), 2);
    assert_eq!(second.record.down, 2);
    let row = BreadthSeries::load(&store).unwrap().get(d(15)).cloned().unwrap();
    assert_eq!((row.up, row.down), (Some(0), Some(2)));
}

#[test]
fn different_flat_threshold_misses_the_cache() {
    let dir = tempfile::tempdir().unwrap();
    let store = dir.path().join("market_breadth.csv");
    let cache = RunCache::new(dir.path().join("cache"), 600).unwrap();
    let provider = StubProvider::new(d(15), &[("A", Some((10.0, 9.0))), ("B", Some((10.0, 9.0)))]);

    let strict = config(&store, &["A", "B"]);
    let first = run_daily(&strict, &provider, Some(&cache), now(0)).unwrap();
    assert_eq!((first.record.down, first.record.flat), (2, 0));

    let mut loose = config(&store, &["A", "B"]);
    loose.engine.flat_epsilon = 5.0;
    let second = run_daily(&loose, &provider, Some(&cache), now(1)).unwrap();

    assert!(!second.from_cache);
    assert_eq!(provider.calls(), 4);
    assert_eq!((second.record.down, second.record.flat), (0, 2));
    let row = BreadthSeries::load(&store).unwrap().get(d(15)).cloned().unwrap();
    assert_eq!(row.flat, Some(2));
}

#[test]
fn collapse_after_calm_history_is_flagged() {
    let dir = tempfile::tempdir().unwrap();
    let store = dir.path().join("market_breadth.csv");
    std::fs::write(
        &store,
        "date,up,down,flat,breadth,ratio\n\
         2024-03-08,10,0,0,10,1\n\
         2024-03-11,12,0,0,12,1\n\
         2024-03-12,11,0,0,11,1\n\
         2024-03-13,9,0,0,9,1\n\
         2024-03-14,10,0,0,10,1\n",
    )
    .unwrap();

    // Three fall, none rise: breadth -3 against a mean of 10.4.
    let provider = StubProvider::new(
        d(15),
        &[("A", Some((10.0, 9.0))), ("B", Some((10.0, 9.0))), ("C", Some((10.0, 9.0)))],
    );
    let outcome = run_daily(&config(&store, &["A", "B", "C"]), &provider, None, now(0)).unwrap();

    assert_eq!(outcome.record.breadth, -3);
    assert_eq!(outcome.series_len, 6);
    assert!(outcome.report.is_anomalous);
    assert_eq!(outcome.report.window_len, 5);
    assert!(outcome.report.warning_message().unwrap().contains("-3"));
}

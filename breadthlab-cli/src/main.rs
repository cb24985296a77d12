//! BreadthLab CLI: daily market breadth and breadth-collapse warnings.
//!
//! Commands:
//! - `run`: compute today's breadth, persist it, and check for a collapse
//! - `history`: print the persisted series or its monthly rollup
//! - `detect`: rerun the detector on the latest persisted day
//! - `universe`: print or write the built-in universe as TOML

use anyhow::{bail, Context, Result};
use breadthlab_core::data::{
    CircuitBreaker, CsvDirProvider, PriceHistoryProvider, SyntheticProvider, Universe,
    YahooProvider,
};
use breadthlab_core::{
    analyze_breadth, AnomalyReport, BreadthSeries, DailyBreadthRecord, DetectorConfig,
    WindowPolicy,
};
use breadthlab_runner::{
    monthly_summary, run_daily, DailyRunOutcome, RunCache, RunConfig, RunError, StoreConfig,
};
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(
    name = "breadthlab",
    about = "BreadthLab CLI: daily market breadth with collapse detection"
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Compute today's breadth, persist it, and check it against recent history.
    Run {
        /// Path to a TOML run config. Defaults apply when omitted.
        #[arg(long)]
        config: Option<PathBuf>,

        /// Series file, overriding the config.
        #[arg(long)]
        store: Option<PathBuf>,

        /// Use deterministic synthetic prices (offline demo).
        #[arg(long, default_value_t = false, conflicts_with = "csv_dir")]
        synthetic: bool,

        /// Read closes from `{DIR}/{IDENTIFIER}.csv` instead of the network.
        #[arg(long)]
        csv_dir: Option<PathBuf>,

        /// Always hit the price source, ignoring a recent run.
        #[arg(long, default_value_t = false)]
        no_cache: bool,

        /// Print the outcome as JSON.
        #[arg(long, default_value_t = false)]
        json: bool,
    },
    /// Print the persisted breadth series.
    History {
        /// Series file. Defaults to data/market_breadth.csv.
        #[arg(long)]
        store: Option<PathBuf>,

        /// Roll the series up by calendar month.
        #[arg(long, default_value_t = false)]
        monthly: bool,

        /// Print as JSON.
        #[arg(long, default_value_t = false)]
        json: bool,
    },
    /// Run the collapse detector on the latest persisted day.
    Detect {
        /// Series file. Defaults to data/market_breadth.csv.
        #[arg(long)]
        store: Option<PathBuf>,

        /// Trailing window length in trading days.
        #[arg(long, default_value_t = 5)]
        window: usize,

        /// Include the day under test in its own baseline.
        #[arg(long, default_value_t = false)]
        inclusive: bool,
    },
    /// Print the built-in universe as TOML, or write it to a file.
    Universe {
        #[arg(long)]
        write: Option<PathBuf>,
    },
}

fn main() -> Result<()> {
    init_logging();
    let cli = Cli::parse();

    match cli.command {
        Commands::Run {
            config,
            store,
            synthetic,
            csv_dir,
            no_cache,
            json,
        } => run_cmd(config, store, synthetic, csv_dir, no_cache, json),
        Commands::History {
            store,
            monthly,
            json,
        } => history_cmd(&store_path(store), monthly, json),
        Commands::Detect {
            store,
            window,
            inclusive,
        } => detect_cmd(&store_path(store), window, inclusive),
        Commands::Universe { write } => universe_cmd(write.as_deref()),
    }
}

/// Logs go to stderr so `--json` output on stdout stays machine-readable.
fn init_logging() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

fn store_path(store: Option<PathBuf>) -> PathBuf {
    store.unwrap_or_else(|| StoreConfig::default().path)
}

fn run_cmd(
    config_path: Option<PathBuf>,
    store: Option<PathBuf>,
    synthetic: bool,
    csv_dir: Option<PathBuf>,
    no_cache: bool,
    json: bool,
) -> Result<()> {
    let mut config = match &config_path {
        Some(path) => RunConfig::from_file(path)?,
        None => RunConfig::default(),
    };
    if let Some(store) = store {
        config.store.path = store;
    }
    if no_cache {
        config.cache.enabled = false;
    }

    let provider: Box<dyn PriceHistoryProvider> = if synthetic {
        tracing::warn!("using synthetic prices; results do not describe a real market");
        Box::new(SyntheticProvider::new(chrono::Local::now().date_naive()))
    } else if let Some(dir) = csv_dir {
        let csv = CsvDirProvider::new(dir);
        tracing::info!(dir = %csv.dir().display(), "reading closes from CSV files");
        Box::new(csv)
    } else {
        let circuit_breaker = Arc::new(CircuitBreaker::default_provider());
        Box::new(YahooProvider::new(circuit_breaker)?)
    };

    let cache = if config.cache.enabled {
        Some(RunCache::new(&config.cache.dir, config.cache.ttl_secs)?)
    } else {
        None
    };

    match run_daily(&config, provider.as_ref(), cache.as_ref(), chrono::Utc::now()) {
        Ok(outcome) => {
            if json {
                println!("{}", serde_json::to_string_pretty(&outcome)?);
            } else {
                print_outcome(&outcome, &config.store.path);
            }
            Ok(())
        }
        Err(err) => {
            // The computed day is still worth showing when only the save failed.
            if let RunError::Persistence { record, .. } = &err {
                print_record(record);
            }
            Err(err.into())
        }
    }
}

fn print_record(record: &DailyBreadthRecord) {
    println!("Date:      {}", record.date);
    println!("Up:        {}", record.up);
    println!("Down:      {}", record.down);
    println!("Flat:      {}", record.flat);
    println!("Breadth:   {:+}", record.breadth);
    match record.ratio {
        Some(ratio) => println!("Up ratio:  {:.1}%", ratio * 100.0),
        None => println!("Up ratio:  n/a (no movers)"),
    }
    println!("Processed: {}", record.processed);

    if !record.errors.is_empty() {
        println!();
        println!("Skipped {} instrument(s):", record.errors.len());
        for e in &record.errors {
            println!("  {e}");
        }
    }
}

fn print_report(report: &AnomalyReport) {
    println!();
    match report.warning_message() {
        Some(msg) => println!("WARNING: {msg}"),
        None => match report.mean_breadth {
            Some(mean) if report.window_len >= 2 => println!(
                "No collapse: breadth {:+} vs trailing {}-day mean {:.1}",
                report.current_breadth, report.window_len, mean
            ),
            _ => println!(
                "Not enough history for collapse detection ({} day(s) in window)",
                report.window_len
            ),
        },
    }
}

fn print_outcome(outcome: &DailyRunOutcome, store: &Path) {
    print_record(&outcome.record);
    println!();
    println!(
        "{} {} in {} ({} row(s){})",
        match outcome.upsert {
            breadthlab_core::UpsertOutcome::Inserted => "Appended",
            breadthlab_core::UpsertOutcome::Updated => "Updated",
        },
        outcome.record.date,
        store.display(),
        outcome.series_len,
        if outcome.from_cache { ", reused recent run" } else { "" }
    );
    print_report(&outcome.report);
}

fn history_cmd(store: &Path, monthly: bool, json: bool) -> Result<()> {
    let series = BreadthSeries::load(store)?;
    if series.is_empty() {
        println!("No breadth history at {}", store.display());
        return Ok(());
    }

    if monthly {
        let months = monthly_summary(&series);
        if json {
            println!("{}", serde_json::to_string_pretty(&months)?);
            return Ok(());
        }
        println!(
            "{:<8} {:>5} {:>10} {:>8} {:>7} {:>7} {:>7}",
            "Month", "Days", "Breadth", "Up %", "Up", "Down", "Flat"
        );
        for m in &months {
            println!(
                "{:<8} {:>5} {:>10} {:>8} {:>7} {:>7} {:>7}",
                m.month,
                m.days,
                fmt_opt(m.mean_breadth, |v| format!("{v:+.1}")),
                fmt_opt(m.mean_ratio, |v| format!("{:.1}", v * 100.0)),
                m.up,
                m.down,
                m.flat
            );
        }
        return Ok(());
    }

    if json {
        println!("{}", serde_json::to_string_pretty(series.rows())?);
        return Ok(());
    }
    println!(
        "{:<10} {:>6} {:>6} {:>6} {:>8} {:>7}",
        "Date", "Up", "Down", "Flat", "Breadth", "Up %"
    );
    for r in series.rows() {
        println!(
            "{:<10} {:>6} {:>6} {:>6} {:>8} {:>7}",
            r.date,
            fmt_opt(r.up, |v| v.to_string()),
            fmt_opt(r.down, |v| v.to_string()),
            fmt_opt(r.flat, |v| v.to_string()),
            fmt_opt(r.breadth, |v| format!("{v:+}")),
            fmt_opt(r.ratio, |v| format!("{:.1}", v * 100.0)),
        );
    }
    Ok(())
}

fn fmt_opt<T>(v: Option<T>, f: impl Fn(T) -> String) -> String {
    v.map(f).unwrap_or_else(|| "-".to_string())
}

fn detect_cmd(store: &Path, window: usize, inclusive: bool) -> Result<()> {
    if window == 0 {
        bail!("--window must be at least 1");
    }
    let series = BreadthSeries::load(store)?;
    let Some(latest) = series.latest() else {
        bail!("no breadth history at {}", store.display());
    };
    let Some(breadth) = latest.breadth else {
        bail!("latest row ({}) has no breadth value", latest.date);
    };

    let config = DetectorConfig {
        window,
        policy: if inclusive {
            WindowPolicy::Inclusive
        } else {
            WindowPolicy::Exclusive
        },
        ..DetectorConfig::default()
    };
    let report = analyze_breadth(latest.date, breadth, &series, &config);

    println!("Date:    {}", latest.date);
    println!("Breadth: {breadth:+}");
    if let Some(t) = report.threshold {
        println!("Threshold: {t:.2}");
    }
    print_report(&report);
    Ok(())
}

fn universe_cmd(write: Option<&Path>) -> Result<()> {
    let text = Universe::default_twse().to_toml()?;
    match write {
        Some(path) => {
            if path.exists() {
                bail!("{} already exists", path.display());
            }
            std::fs::write(path, &text)
                .with_context(|| format!("Failed to write universe to {}", path.display()))?;
            println!("Wrote {}", path.display());
        }
        None => print!("{text}"),
    }
    Ok(())
}

//! Persisted breadth series: one CSV row per trading date.
//!
//! File layout (the compatibility surface for downstream readers):
//!
//! ```text
//! date,up,down,flat,breadth,ratio
//! 2024-01-02,5,2,1,3,0.7142857142857143
//! 2024-01-03,0,0,8,0,
//! ```
//!
//! - Dates are canonicalized to `YYYY-MM-DD` on load, whatever shape a
//!   previous writer or a hand edit left them in.
//! - Rows are kept sorted by date with at most one row per date; a later
//!   upsert for the same date overwrites that row's numbers.
//! - Numeric cells are coerced leniently: an unparseable value becomes
//!   missing instead of failing the load.
//! - An empty `ratio` cell means "no directional moves", never zero.
//! - Saves are atomic: write `{file}.tmp`, then rename into place.

use crate::domain::DailyBreadthRecord;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::ffi::OsString;
use std::fs;
use std::io::{Read, Write};
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Column order of the persisted file.
pub const COLUMNS: [&str; 6] = ["date", "up", "down", "flat", "breadth", "ratio"];

#[derive(Debug, Error)]
pub enum SeriesError {
    #[error("series I/O error on {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("malformed series CSV {origin}: {source}")]
    Csv { origin: String, source: csv::Error },

    #[error("series {origin} has no 'date' column")]
    MissingDateColumn { origin: String },
}

/// One persisted day. Numeric fields are optional because values read back
/// from disk may have been coerced to missing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SeriesRow {
    pub date: NaiveDate,
    pub up: Option<u32>,
    pub down: Option<u32>,
    pub flat: Option<u32>,
    pub breadth: Option<i64>,
    pub ratio: Option<f64>,
}

impl From<&DailyBreadthRecord> for SeriesRow {
    fn from(r: &DailyBreadthRecord) -> Self {
        Self {
            date: r.date,
            up: Some(r.up),
            down: Some(r.down),
            flat: Some(r.flat),
            breadth: Some(r.breadth),
            ratio: r.ratio,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum UpsertOutcome {
    Inserted,
    Updated,
}

/// Ordered, date-unique breadth history.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct BreadthSeries {
    rows: Vec<SeriesRow>,
}

impl BreadthSeries {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a series from arbitrary rows: sorted by date, and a repeated
    /// date keeps its last occurrence.
    pub fn from_rows(rows: Vec<SeriesRow>) -> Self {
        let mut rows = rows;
        rows.reverse();
        // Stable sort keeps the (reversed) last occurrence first within a date.
        rows.sort_by_key(|r| r.date);
        rows.dedup_by_key(|r| r.date);
        Self { rows }
    }

    pub fn rows(&self) -> &[SeriesRow] {
        &self.rows
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn get(&self, date: NaiveDate) -> Option<&SeriesRow> {
        self.position(date).ok().map(|i| &self.rows[i])
    }

    pub fn latest(&self) -> Option<&SeriesRow> {
        self.rows.last()
    }

    /// The last `n` rows (fewer when the series is shorter).
    pub fn tail(&self, n: usize) -> &[SeriesRow] {
        let start = self.rows.len().saturating_sub(n);
        &self.rows[start..]
    }

    /// Rows dated strictly before `date`.
    pub fn before(&self, date: NaiveDate) -> &[SeriesRow] {
        let end = self.rows.partition_point(|r| r.date < date);
        &self.rows[..end]
    }

    /// Breadth values in date order, skipping rows where it is missing.
    pub fn breadth_values(&self) -> Vec<i64> {
        self.rows.iter().filter_map(|r| r.breadth).collect()
    }

    fn position(&self, date: NaiveDate) -> Result<usize, usize> {
        self.rows.binary_search_by_key(&date, |r| r.date)
    }

    /// Insert the record's day, or overwrite the numbers of the existing row
    /// for that date.
    pub fn upsert(&mut self, record: &DailyBreadthRecord) -> UpsertOutcome {
        let row = SeriesRow::from(record);
        match self.position(row.date) {
            Ok(i) => {
                self.rows[i] = row;
                UpsertOutcome::Updated
            }
            Err(i) => {
                self.rows.insert(i, row);
                UpsertOutcome::Inserted
            }
        }
    }

    /// Load the series from `path`. A missing file is an empty series.
    pub fn load(path: &Path) -> Result<Self, SeriesError> {
        let file = match fs::File::open(path) {
            Ok(f) => f,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::info!(path = %path.display(), "no series file yet, starting empty");
                return Ok(Self::new());
            }
            Err(source) => {
                return Err(SeriesError::Io {
                    path: path.to_path_buf(),
                    source,
                })
            }
        };
        Self::from_reader(file, &path.display().to_string())
    }

    /// Parse a series from CSV text. `origin` names the source in errors and logs.
    pub fn from_reader<R: Read>(reader: R, origin: &str) -> Result<Self, SeriesError> {
        let csv_err = |source: csv::Error| SeriesError::Csv {
            origin: origin.to_string(),
            source,
        };

        let mut reader = csv::ReaderBuilder::new()
            .has_headers(true)
            .flexible(true)
            .trim(csv::Trim::All)
            .from_reader(reader);

        let headers = reader.headers().map_err(csv_err)?.clone();
        let index_of = |name: &str| headers.iter().position(|h| h.eq_ignore_ascii_case(name));

        let date_idx = index_of("date").ok_or_else(|| SeriesError::MissingDateColumn {
            origin: origin.to_string(),
        })?;
        let idx: Vec<Option<usize>> = COLUMNS[1..].iter().map(|c| index_of(*c)).collect();
        for (col, i) in COLUMNS[1..].iter().zip(&idx) {
            if i.is_none() {
                tracing::warn!(origin, column = *col, "series column missing, values treated as missing");
            }
        }

        let mut rows = Vec::new();
        for (n, record) in reader.records().enumerate() {
            let record = record.map_err(csv_err)?;
            let line = n + 2;
            let cell = |i: Option<usize>| i.and_then(|i| record.get(i)).unwrap_or("");

            let raw_date = record.get(date_idx).unwrap_or("");
            let Some(date) = parse_calendar_date(raw_date) else {
                tracing::warn!(origin, line, value = raw_date, "dropping series row with unparseable date");
                continue;
            };

            rows.push(SeriesRow {
                date,
                up: coerce(origin, line, "up", cell(idx[0]), parse_count),
                down: coerce(origin, line, "down", cell(idx[1]), parse_count),
                flat: coerce(origin, line, "flat", cell(idx[2]), parse_count),
                breadth: coerce(origin, line, "breadth", cell(idx[3]), parse_signed),
                ratio: coerce(origin, line, "ratio", cell(idx[4]), parse_ratio),
            });
        }

        let loaded = rows.len();
        let series = Self::from_rows(rows);
        if series.len() < loaded {
            tracing::warn!(
                origin,
                duplicates = loaded - series.len(),
                "collapsed duplicate dates in series, kept last occurrence"
            );
        }
        Ok(series)
    }

    /// Serialize the series as CSV with the canonical column order.
    pub fn to_writer<W: Write>(&self, writer: W) -> Result<(), csv::Error> {
        let mut wtr = csv::Writer::from_writer(writer);
        wtr.write_record(COLUMNS)?;
        for r in &self.rows {
            wtr.write_record([
                r.date.format("%Y-%m-%d").to_string(),
                opt(r.up),
                opt(r.down),
                opt(r.flat),
                opt(r.breadth),
                opt(r.ratio),
            ])?;
        }
        wtr.flush()?;
        Ok(())
    }

    /// Persist the series to `path` atomically, creating the parent directory.
    pub fn save(&self, path: &Path) -> Result<(), SeriesError> {
        let io_err = |source: std::io::Error| SeriesError::Io {
            path: path.to_path_buf(),
            source,
        };

        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).map_err(io_err)?;
        }

        let tmp_path = tmp_path_for(path);
        let write_tmp = || -> Result<(), SeriesError> {
            let file = fs::File::create(&tmp_path).map_err(io_err)?;
            let mut buf = std::io::BufWriter::new(file);
            self.to_writer(&mut buf).map_err(|source| SeriesError::Csv {
                origin: tmp_path.display().to_string(),
                source,
            })?;
            let file = buf.into_inner().map_err(|e| io_err(e.into_error()))?;
            file.sync_all().map_err(io_err)
        };

        if let Err(e) = write_tmp().and_then(|()| fs::rename(&tmp_path, path).map_err(io_err)) {
            let _ = fs::remove_file(&tmp_path);
            return Err(e);
        }

        tracing::debug!(path = %path.display(), rows = self.rows.len(), "series saved");
        Ok(())
    }
}

fn tmp_path_for(path: &Path) -> PathBuf {
    let mut name: OsString = path.as_os_str().to_owned();
    name.push(".tmp");
    PathBuf::from(name)
}

fn opt<T: ToString>(v: Option<T>) -> String {
    v.map(|v| v.to_string()).unwrap_or_default()
}

fn coerce<T>(
    origin: &str,
    line: usize,
    column: &str,
    raw: &str,
    parse: fn(&str) -> Option<T>,
) -> Option<T> {
    if raw.is_empty() {
        return None;
    }
    let parsed = parse(raw);
    if parsed.is_none() {
        tracing::warn!(origin, line, column, value = raw, "unparseable series value treated as missing");
    }
    parsed
}

/// Parse a calendar date from the shapes earlier writers have produced:
/// `YYYY-MM-DD`, `YYYY/MM/DD`, or a timestamp whose first ten characters
/// are the date (`YYYY-MM-DD HH:MM:SS`, `YYYY-MM-DDTHH:MM:SS...`).
pub fn parse_calendar_date(raw: &str) -> Option<NaiveDate> {
    let raw = raw.trim();
    for fmt in ["%Y-%m-%d", "%Y/%m/%d"] {
        if let Ok(d) = NaiveDate::parse_from_str(raw, fmt) {
            return Some(d);
        }
    }
    let (day, rest) = (raw.get(..10)?, raw.get(10..)?);
    if rest.starts_with(' ') || rest.starts_with('T') {
        return NaiveDate::parse_from_str(day, "%Y-%m-%d").ok();
    }
    None
}

/// Non-negative whole number; accepts float spellings such as `3.0`.
fn parse_count(raw: &str) -> Option<u32> {
    if let Ok(v) = raw.parse::<u32>() {
        return Some(v);
    }
    let f = raw.parse::<f64>().ok()?;
    (f.is_finite() && f >= 0.0 && f.fract() == 0.0 && f <= f64::from(u32::MAX)).then_some(f as u32)
}

fn parse_signed(raw: &str) -> Option<i64> {
    if let Ok(v) = raw.parse::<i64>() {
        return Some(v);
    }
    let f = raw.parse::<f64>().ok()?;
    (f.is_finite() && f.fract() == 0.0 && f.abs() < 9.0e15).then_some(f as i64)
}

fn parse_ratio(raw: &str) -> Option<f64> {
    raw.parse::<f64>().ok().filter(|f| f.is_finite())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn d(m: u32, day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, m, day).unwrap()
    }

    fn record(date: NaiveDate, up: u32, down: u32, flat: u32) -> DailyBreadthRecord {
        DailyBreadthRecord::from_counts(date, up, down, flat, Vec::new())
    }

    #[test]
    fn parses_date_shapes() {
        assert_eq!(parse_calendar_date("2024-01-02"), Some(d(1, 2)));
        assert_eq!(parse_calendar_date("2024/01/02"), Some(d(1, 2)));
        assert_eq!(parse_calendar_date("2024-01-02 00:00:00"), Some(d(1, 2)));
        assert_eq!(parse_calendar_date("2024-01-02T00:00:00+08:00"), Some(d(1, 2)));
        assert_eq!(parse_calendar_date(" 2024-01-02 "), Some(d(1, 2)));
        assert_eq!(parse_calendar_date("yesterday"), None);
        assert_eq!(parse_calendar_date("2024-01-0"), None);
    }

    #[test]
    fn count_coercion() {
        assert_eq!(parse_count("3"), Some(3));
        assert_eq!(parse_count("3.0"), Some(3));
        assert_eq!(parse_count("3.5"), None);
        assert_eq!(parse_count("-1"), None);
        assert_eq!(parse_count("abc"), None);
        assert_eq!(parse_signed("-4"), Some(-4));
        assert_eq!(parse_signed("-4.0"), Some(-4));
        assert_eq!(parse_ratio("nan"), None);
        assert_eq!(parse_ratio("0.25"), Some(0.25));
    }

    #[test]
    fn upsert_inserts_in_date_order() {
        let mut s = BreadthSeries::new();
        assert_eq!(s.upsert(&record(d(1, 4), 1, 0, 0)), UpsertOutcome::Inserted);
        assert_eq!(s.upsert(&record(d(1, 2), 1, 0, 0)), UpsertOutcome::Inserted);
        assert_eq!(s.upsert(&record(d(1, 3), 1, 0, 0)), UpsertOutcome::Inserted);
        let dates: Vec<_> = s.rows().iter().map(|r| r.date).collect();
        assert_eq!(dates, vec![d(1, 2), d(1, 3), d(1, 4)]);
    }

    #[test]
    fn upsert_same_date_overwrites() {
        let mut s = BreadthSeries::new();
        s.upsert(&record(d(1, 2), 1, 5, 0));
        assert_eq!(s.upsert(&record(d(1, 2), 6, 1, 1)), UpsertOutcome::Updated);
        assert_eq!(s.len(), 1);
        let row = s.get(d(1, 2)).unwrap();
        assert_eq!(row.up, Some(6));
        assert_eq!(row.breadth, Some(5));
    }

    #[test]
    fn upsert_clears_ratio_when_day_has_no_movers() {
        let mut s = BreadthSeries::new();
        s.upsert(&record(d(1, 2), 3, 1, 0));
        s.upsert(&record(d(1, 2), 0, 0, 4));
        assert_eq!(s.get(d(1, 2)).unwrap().ratio, None);
    }

    #[test]
    fn writes_canonical_columns_and_empty_ratio() {
        let mut s = BreadthSeries::new();
        s.upsert(&record(d(1, 2), 1, 1, 0));
        s.upsert(&record(d(1, 3), 0, 0, 2));
        let mut out = Vec::new();
        s.to_writer(&mut out).unwrap();
        let text = String::from_utf8(out).unwrap();
        assert_eq!(
            text,
            "date,up,down,flat,breadth,ratio\n2024-01-02,1,1,0,0,0.5\n2024-01-03,0,0,2,0,\n"
        );
    }

    #[test]
    fn lenient_load_of_hand_edited_file() {
        let text = "date,up,down,flat,breadth,ratio\n\
                    2024-01-02 00:00:00,5,2,1,3,0.714\n\
                    2024-01-03,x,2.0,1,oops,\n\
                    not-a-date,1,1,1,0,0.5\n\
                    2024-01-02,4,2,2,2,0.667\n";
        let s = BreadthSeries::from_reader(text.as_bytes(), "test").unwrap();

        assert_eq!(s.len(), 2);
        let first = s.get(d(1, 2)).unwrap();
        assert_eq!(first.up, Some(4), "duplicate date keeps the last row");
        let second = s.get(d(1, 3)).unwrap();
        assert_eq!(second.up, None);
        assert_eq!(second.down, Some(2));
        assert_eq!(second.breadth, None);
        assert_eq!(second.ratio, None);
        assert_eq!(s.breadth_values(), vec![2]);
    }

    #[test]
    fn missing_date_column_is_an_error() {
        let err = BreadthSeries::from_reader("day,up\n2024-01-02,1\n".as_bytes(), "test")
            .unwrap_err();
        assert!(matches!(err, SeriesError::MissingDateColumn { .. }));
    }

    #[test]
    fn missing_numeric_column_loads_as_missing() {
        let s = BreadthSeries::from_reader("date,breadth\n2024-01-02,3\n".as_bytes(), "test")
            .unwrap();
        let row = s.get(d(1, 2)).unwrap();
        assert_eq!(row.breadth, Some(3));
        assert_eq!(row.up, None);
    }

    #[test]
    fn tail_and_before() {
        let mut s = BreadthSeries::new();
        for day in 2..=6 {
            s.upsert(&record(d(1, day), day, 0, 0));
        }
        assert_eq!(s.tail(2).len(), 2);
        assert_eq!(s.tail(2)[0].date, d(1, 5));
        assert_eq!(s.tail(10).len(), 5);
        assert_eq!(s.before(d(1, 4)).len(), 2);
        assert_eq!(s.before(d(1, 1)).len(), 0);
    }
}

//! Offline CSV import provider.
//!
//! Reads `{dir}/{IDENTIFIER}.csv` files with at least `date` and `close`
//! columns (header names are matched case-insensitively, so Yahoo-style
//! `Date,Open,High,Low,Close,...` exports work unchanged). The window is
//! measured back from the latest date in the file rather than from today,
//! which keeps offline runs reproducible.

use super::provider::{
    ClosePoint, DataError, DataSource, Lookback, PriceHistory, PriceHistoryProvider,
};
use crate::series::parse_calendar_date;
use std::path::{Path, PathBuf};

pub struct CsvDirProvider {
    dir: PathBuf,
}

impl CsvDirProvider {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn file_for(&self, identifier: &str) -> PathBuf {
        self.dir.join(format!("{identifier}.csv"))
    }

    fn read_points(path: &Path) -> Result<Vec<ClosePoint>, DataError> {
        let mut reader = csv::ReaderBuilder::new()
            .has_headers(true)
            .flexible(true)
            .from_path(path)
            .map_err(|e| DataError::CsvImport(format!("{}: {e}", path.display())))?;

        let headers = reader
            .headers()
            .map_err(|e| DataError::CsvImport(format!("{}: {e}", path.display())))?
            .clone();
        let find = |name: &str| {
            headers
                .iter()
                .position(|h| h.trim().eq_ignore_ascii_case(name))
        };
        let date_idx = find("date")
            .ok_or_else(|| DataError::CsvImport(format!("{}: missing 'date' column", path.display())))?;
        let close_idx = find("close")
            .ok_or_else(|| DataError::CsvImport(format!("{}: missing 'close' column", path.display())))?;

        let mut points = Vec::new();
        for (line, record) in reader.records().enumerate() {
            let record =
                record.map_err(|e| DataError::CsvImport(format!("{}: {e}", path.display())))?;
            let raw_date = record.get(date_idx).unwrap_or("");
            let Some(date) = parse_calendar_date(raw_date) else {
                tracing::warn!(
                    file = %path.display(),
                    row = line + 1,
                    value = raw_date,
                    "skipping row with unparseable date"
                );
                continue;
            };
            let close = record
                .get(close_idx)
                .and_then(|v| v.trim().parse::<f64>().ok());
            points.push(ClosePoint { date, close });
        }

        points.sort_by_key(|p| p.date);
        Ok(points)
    }
}

impl PriceHistoryProvider for CsvDirProvider {
    fn name(&self) -> &str {
        "csv_import"
    }

    fn fetch_closes(&self, identifier: &str, lookback: Lookback) -> Result<PriceHistory, DataError> {
        let path = self.file_for(identifier);
        if !path.exists() {
            return Err(DataError::SymbolNotFound {
                symbol: identifier.to_string(),
            });
        }

        let mut points = Self::read_points(&path)?;
        if let Some(last) = points.last().map(|p| p.date) {
            let start = last - chrono::Duration::days(i64::from(lookback.as_days()));
            points.retain(|p| p.date > start);
        }

        Ok(PriceHistory {
            identifier: identifier.to_string(),
            points,
            source: DataSource::CsvImport,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn d(y: i32, m: u32, day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, day).unwrap()
    }

    #[test]
    fn reads_yahoo_style_export_and_trims_window() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(
            dir.path().join("2330.TW.csv"),
            "Date,Open,High,Low,Close,Volume\n\
             2023-12-01,1,1,1,570.0,10\n\
             2024-01-02,1,1,1,593.0,10\n\
             2024-01-03,1,1,1,,10\n\
             2024-01-04,1,1,1,580.0,10\n",
        )
        .unwrap();

        let provider = CsvDirProvider::new(dir.path());
        let history = provider
            .fetch_closes("2330.TW", Lookback::default())
            .unwrap();

        assert_eq!(history.source, DataSource::CsvImport);
        assert_eq!(history.points.len(), 3);
        assert_eq!(history.points[0].date, d(2024, 1, 2));
        assert_eq!(history.points[1].close, None);
        assert_eq!(history.points[2].close, Some(580.0));
    }

    #[test]
    fn missing_file_is_symbol_not_found() {
        let dir = tempfile::tempdir().unwrap();
        let provider = CsvDirProvider::new(dir.path());
        let err = provider
            .fetch_closes("NOPE", Lookback::default())
            .unwrap_err();
        assert!(matches!(err, DataError::SymbolNotFound { .. }));
    }

    #[test]
    fn missing_close_column_is_import_error() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("X.csv"), "date,open\n2024-01-02,1\n").unwrap();
        let provider = CsvDirProvider::new(dir.path());
        let err = provider.fetch_closes("X", Lookback::default()).unwrap_err();
        assert!(matches!(err, DataError::CsvImport(_)));
    }
}

//! Historical CSV bar source.
//!
//! One file per (pair, interval) under a data root, named from a pattern with
//! `{base}`, `{quote}` and `{minutes}` placeholders (default
//! `{base}{quote}_{minutes}.csv`, e.g. `BTCUSD_60.csv`). Rows are headerless
//! `epoch_seconds,open,high,low,close,volume`.

use chrono::{DateTime, Utc};
use std::path::{Path, PathBuf};
use tracing::debug;

use super::provider::{BarFetcher, DataError};
use crate::domain::{Bar, Interval, Pair};

pub const DEFAULT_NAME_PATTERN: &str = "{base}{quote}_{minutes}.csv";

pub struct HistoricalCsvFetcher {
    data_root: PathBuf,
    name_pattern: String,
}

impl HistoricalCsvFetcher {
    pub fn new(data_root: impl Into<PathBuf>) -> Self {
        Self {
            data_root: data_root.into(),
            name_pattern: DEFAULT_NAME_PATTERN.to_string(),
        }
    }

    pub fn with_name_pattern(mut self, pattern: impl Into<String>) -> Self {
        self.name_pattern = pattern.into();
        self
    }

    pub fn data_root(&self) -> &Path {
        &self.data_root
    }

    /// Path of the file holding `symbol` at `interval`.
    pub fn file_path(&self, symbol: &str, interval: Interval) -> Result<PathBuf, DataError> {
        let pair: Pair = symbol.parse().map_err(|_| DataError::SymbolNotFound {
            symbol: symbol.to_string(),
        })?;
        let name = self
            .name_pattern
            .replace("{base}", &pair.base)
            .replace("{quote}", &pair.quote)
            .replace("{minutes}", &interval.as_minutes().to_string());
        Ok(self.data_root.join(name))
    }
}

impl BarFetcher for HistoricalCsvFetcher {
    fn name(&self) -> &str {
        "historical_csv"
    }

    fn fetch_bars_since(
        &self,
        symbol: &str,
        interval: Interval,
        since: DateTime<Utc>,
    ) -> Result<Vec<Bar>, DataError> {
        let path = self.file_path(symbol, interval)?;
        let mut bars = read_bars(&path)?;
        bars.retain(|b| b.start_time >= since);
        bars.sort_by_key(|b| b.start_time);
        bars.dedup_by_key(|b| b.start_time);

        debug!(path = %path.display(), %since, bars = bars.len(), "read historical bars");
        Ok(bars)
    }
}

/// Parse every row of a historical file.
pub fn read_bars(path: &Path) -> Result<Vec<Bar>, DataError> {
    let display = path.display().to_string();
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .trim(csv::Trim::All)
        .from_path(path)
        .map_err(|e| csv_error(&display, e))?;

    let mut bars = Vec::new();
    for (i, record) in reader.records().enumerate() {
        let record = record.map_err(|e| csv_error(&display, e))?;
        let line = i as u64 + 1;

        // Tolerate a single header row.
        if line == 1 && record.get(0).is_some_and(|f| f.parse::<i64>().is_err()) {
            continue;
        }

        bars.push(parse_record(&record).map_err(|reason| DataError::Parse {
            path: display.clone(),
            line,
            reason,
        })?);
    }
    Ok(bars)
}

fn parse_record(record: &csv::StringRecord) -> Result<Bar, String> {
    if record.len() < 6 {
        return Err(format!("expected 6 fields, found {}", record.len()));
    }

    let epoch: i64 = record[0]
        .parse()
        .map_err(|_| format!("invalid epoch '{}'", &record[0]))?;
    let start_time =
        DateTime::from_timestamp(epoch, 0).ok_or_else(|| format!("epoch {epoch} out of range"))?;

    let field = |idx: usize, name: &str| -> Result<f64, String> {
        record[idx]
            .parse::<f64>()
            .map_err(|_| format!("invalid {name} '{}'", &record[idx]))
    };

    Ok(Bar {
        start_time,
        open: field(1, "open")?,
        high: field(2, "high")?,
        low: field(3, "low")?,
        close: field(4, "close")?,
        volume: field(5, "volume")?,
    })
}

fn csv_error(path: &str, err: csv::Error) -> DataError {
    let line = err.position().map(|p| p.line()).unwrap_or(0);
    match err.into_kind() {
        csv::ErrorKind::Io(source) => DataError::Io {
            path: path.to_string(),
            source,
        },
        other => DataError::Parse {
            path: path.to_string(),
            line,
            reason: format!("{other:?}"),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use std::fs;

    fn write(dir: &Path, name: &str, body: &str) {
        fs::write(dir.join(name), body).unwrap();
    }

    #[test]
    fn file_name_follows_pattern() {
        let fetcher = HistoricalCsvFetcher::new("/data");
        let path = fetcher.file_path("ETH/USD", Interval::minutes(15)).unwrap();
        assert_eq!(path, PathBuf::from("/data/ETHUSD_15.csv"));

        let custom = HistoricalCsvFetcher::new("/data").with_name_pattern("{base}-{quote}-{minutes}m.csv");
        let path = custom.file_path("ETH/USD", Interval::HOUR).unwrap();
        assert_eq!(path, PathBuf::from("/data/ETH-USD-60m.csv"));
    }

    #[test]
    fn filters_and_sorts_rows() {
        let dir = tempfile::tempdir().unwrap();
        write(
            dir.path(),
            "BTCUSD_60.csv",
            "7200,3,3,3,3,1\n0,1,1,1,1,1\n3600,2,2,2,2,1\n",
        );

        let fetcher = HistoricalCsvFetcher::new(dir.path());
        let since = Utc.timestamp_opt(3600, 0).unwrap();
        let bars = fetcher.fetch_bars_since("BTC/USD", Interval::HOUR, since).unwrap();

        let closes: Vec<f64> = bars.iter().map(|b| b.close).collect();
        assert_eq!(closes, vec![2.0, 3.0]);
    }

    #[test]
    fn header_row_is_skipped() {
        let dir = tempfile::tempdir().unwrap();
        write(dir.path(), "BTCUSD_1.csv", "time,open,high,low,close,volume\n60,1,2,0.5,1.5,10\n");

        let bars = read_bars(&dir.path().join("BTCUSD_1.csv")).unwrap();
        assert_eq!(bars.len(), 1);
        assert_eq!(bars[0].high, 2.0);
    }

    #[test]
    fn malformed_row_reports_line() {
        let dir = tempfile::tempdir().unwrap();
        write(dir.path(), "BTCUSD_1.csv", "60,1,1,1,1,1\n120,1,x,1,1,1\n");

        let err = read_bars(&dir.path().join("BTCUSD_1.csv")).unwrap_err();
        match err {
            DataError::Parse { line, reason, .. } => {
                assert_eq!(line, 2);
                assert!(reason.contains("high"));
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn missing_file_is_io_error() {
        let dir = tempfile::tempdir().unwrap();
        let fetcher = HistoricalCsvFetcher::new(dir.path());
        let err = fetcher
            .fetch_bars_since("BTC/USD", Interval::HOUR, Utc::now())
            .unwrap_err();
        assert!(matches!(err, DataError::Io { .. }));
    }
}

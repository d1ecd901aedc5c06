//! CSV file market data adapter.
//!
//! One file per symbol, `<dir>/<SYMBOL>.csv`, with a header row naming
//! `timestamp` (or `date`), `open`, `high`, `low`, `close` and optionally
//! `volume`. Rows may be in any order; they are sorted before the series is
//! built.

use std::fs;
use std::io::ErrorKind;
use std::path::PathBuf;

use chrono::{NaiveDate, NaiveDateTime};
use csv::StringRecord;
use tracing::debug;

use crate::domain::error::AetherError;
use crate::domain::ohlcv::{Bar, PriceSeries};
use crate::ports::data_port::DataPort;

const TIMESTAMP_FORMATS: [&str; 3] = ["%Y-%m-%d %H:%M:%S", "%Y-%m-%dT%H:%M:%S", "%Y-%m-%d %H:%M"];

pub struct CsvAdapter {
    base_path: PathBuf,
}

struct Columns {
    timestamp: usize,
    open: usize,
    high: usize,
    low: usize,
    close: usize,
    volume: Option<usize>,
}

impl Columns {
    fn from_headers(headers: &StringRecord, file: &str) -> Result<Self, AetherError> {
        let find = |names: &[&str]| {
            headers
                .iter()
                .position(|h| names.iter().any(|n| h.trim().eq_ignore_ascii_case(n)))
        };
        let require = |names: &[&str]| {
            find(names).ok_or_else(|| AetherError::Data {
                reason: format!("{} has no {} column", file, names[0]),
            })
        };

        Ok(Columns {
            timestamp: require(&["timestamp", "date", "datetime"])?,
            open: require(&["open"])?,
            high: require(&["high"])?,
            low: require(&["low"])?,
            close: require(&["close"])?,
            volume: find(&["volume"]),
        })
    }
}

impl CsvAdapter {
    pub fn new(base_path: PathBuf) -> Self {
        Self { base_path }
    }

    fn csv_path(&self, symbol: &str) -> PathBuf {
        self.base_path.join(format!("{}.csv", symbol))
    }
}

pub fn parse_timestamp(value: &str) -> Option<NaiveDateTime> {
    let value = value.trim();
    TIMESTAMP_FORMATS
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(value, fmt).ok())
        .or_else(|| {
            NaiveDate::parse_from_str(value, "%Y-%m-%d")
                .ok()
                .and_then(|d| d.and_hms_opt(0, 0, 0))
        })
}

fn parse_field(record: &StringRecord, index: usize, name: &str, line: u64) -> Result<f64, AetherError> {
    let raw = record.get(index).ok_or_else(|| AetherError::Data {
        reason: format!("line {}: missing {} value", line, name),
    })?;
    raw.trim().parse().map_err(|e| AetherError::Data {
        reason: format!("line {}: invalid {} value '{}': {}", line, name, raw, e),
    })
}

impl DataPort for CsvAdapter {
    fn fetch_series(
        &self,
        symbol: &str,
        start: Option<NaiveDateTime>,
        end: Option<NaiveDateTime>,
    ) -> Result<PriceSeries, AetherError> {
        let path = self.csv_path(symbol);
        let content = fs::read_to_string(&path).map_err(|e| match e.kind() {
            ErrorKind::NotFound => AetherError::NoData {
                symbol: symbol.to_string(),
            },
            _ => AetherError::Data {
                reason: format!("failed to read {}: {}", path.display(), e),
            },
        })?;

        let file = path.display().to_string();
        let mut rdr = csv::Reader::from_reader(content.as_bytes());
        let headers = rdr
            .headers()
            .map_err(|e| AetherError::Data {
                reason: format!("{}: CSV header error: {}", file, e),
            })?
            .clone();
        let cols = Columns::from_headers(&headers, &file)?;

        let mut bars = Vec::new();
        for result in rdr.records() {
            let record = result.map_err(|e| AetherError::Data {
                reason: format!("{}: CSV parse error: {}", file, e),
            })?;
            let line = record.position().map_or(0, |p| p.line());

            let raw_ts = record.get(cols.timestamp).unwrap_or_default();
            let timestamp = parse_timestamp(raw_ts).ok_or_else(|| AetherError::Data {
                reason: format!("line {}: invalid timestamp '{}'", line, raw_ts),
            })?;

            if start.is_some_and(|s| timestamp < s) || end.is_some_and(|e| timestamp > e) {
                continue;
            }

            bars.push(Bar {
                timestamp,
                open: parse_field(&record, cols.open, "open", line)?,
                high: parse_field(&record, cols.high, "high", line)?,
                low: parse_field(&record, cols.low, "low", line)?,
                close: parse_field(&record, cols.close, "close", line)?,
                volume: match cols.volume {
                    Some(i) => parse_field(&record, i, "volume", line)?,
                    None => 0.0,
                },
            });
        }

        if bars.is_empty() {
            return Err(AetherError::NoData {
                symbol: symbol.to_string(),
            });
        }

        bars.sort_by_key(|b| b.timestamp);
        debug!(symbol, bars = bars.len(), path = %path.display(), "loaded csv series");
        PriceSeries::new(symbol, bars)
    }

    fn list_symbols(&self) -> Result<Vec<String>, AetherError> {
        let entries = fs::read_dir(&self.base_path).map_err(|e| AetherError::Data {
            reason: format!(
                "failed to read directory {}: {}",
                self.base_path.display(),
                e
            ),
        })?;

        let mut symbols = Vec::new();
        for entry in entries {
            let entry = entry.map_err(|e| AetherError::Data {
                reason: format!("directory entry error: {}", e),
            })?;

            let path = entry.path();
            if path.extension().is_some_and(|ext| ext.eq_ignore_ascii_case("csv")) {
                if let Some(stem) = path.file_stem() {
                    symbols.push(stem.to_string_lossy().into_owned());
                }
            }
        }

        symbols.sort();
        Ok(symbols)
    }
}

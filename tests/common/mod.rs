#![allow(dead_code)]

use aetherquant::domain::error::AetherError;
use aetherquant::domain::ohlcv::{Bar, PriceSeries};
use aetherquant::ports::data_port::DataPort;
use chrono::{Duration, NaiveDate, NaiveDateTime};
use std::collections::HashMap;

pub struct MockDataPort {
    pub data: HashMap<String, Vec<Bar>>,
    pub errors: HashMap<String, String>,
}

impl MockDataPort {
    pub fn new() -> Self {
        Self {
            data: HashMap::new(),
            errors: HashMap::new(),
        }
    }

    pub fn with_bars(mut self, symbol: &str, bars: Vec<Bar>) -> Self {
        self.data.insert(symbol.to_string(), bars);
        self
    }

    pub fn with_error(mut self, symbol: &str, reason: &str) -> Self {
        self.errors.insert(symbol.to_string(), reason.to_string());
        self
    }
}

impl DataPort for MockDataPort {
    fn fetch_series(
        &self,
        symbol: &str,
        start: Option<NaiveDateTime>,
        end: Option<NaiveDateTime>,
    ) -> Result<PriceSeries, AetherError> {
        if let Some(reason) = self.errors.get(symbol) {
            return Err(AetherError::Data {
                reason: reason.clone(),
            });
        }
        let bars: Vec<Bar> = self
            .data
            .get(symbol)
            .map(|bars| {
                bars.iter()
                    .filter(|b| start.is_none_or(|s| b.timestamp >= s))
                    .filter(|b| end.is_none_or(|e| b.timestamp <= e))
                    .cloned()
                    .collect()
            })
            .unwrap_or_default();
        if bars.is_empty() {
            return Err(AetherError::NoData {
                symbol: symbol.to_string(),
            });
        }
        PriceSeries::new(symbol, bars)
    }

    fn list_symbols(&self) -> Result<Vec<String>, AetherError> {
        let mut symbols: Vec<String> = self.data.keys().cloned().collect();
        symbols.sort();
        Ok(symbols)
    }
}

pub fn day(y: i32, m: u32, d: u32) -> NaiveDateTime {
    NaiveDate::from_ymd_opt(y, m, d)
        .unwrap()
        .and_hms_opt(0, 0, 0)
        .unwrap()
}

/// Daily bars starting 2024-01-01, one per close.
pub fn make_bars(closes: &[f64]) -> Vec<Bar> {
    let start = day(2024, 1, 1);
    closes
        .iter()
        .enumerate()
        .map(|(i, &close)| Bar {
            timestamp: start + Duration::days(i as i64),
            open: close,
            high: close + 1.0,
            low: (close - 1.0).max(0.0),
            close,
            volume: 1_000.0,
        })
        .collect()
}

pub fn make_series(symbol: &str, closes: &[f64]) -> PriceSeries {
    PriceSeries::new(symbol, make_bars(closes)).unwrap()
}

/// Deterministic wave around a drift: `start * (1 + drift)^i`, modulated by a sine.
pub fn generate_closes(count: usize, start: f64, drift: f64, amplitude: f64, period: f64) -> Vec<f64> {
    (0..count)
        .map(|i| {
            let t = i as f64;
            let trend = start * (1.0 + drift).powf(t);
            trend * (1.0 + amplitude * (2.0 * std::f64::consts::PI * t / period).sin())
        })
        .collect()
}

pub fn generate_series(symbol: &str, count: usize, start: f64) -> PriceSeries {
    make_series(symbol, &generate_closes(count, start, 0.0005, 0.05, 40.0))
}

pub fn csv_content(closes: &[f64]) -> String {
    let mut out = String::from("date,open,high,low,close,volume\n");
    for bar in make_bars(closes) {
        out.push_str(&format!(
            "{},{},{},{},{},{}\n",
            bar.timestamp.format("%Y-%m-%d"),
            bar.open,
            bar.high,
            bar.low,
            bar.close,
            bar.volume
        ));
    }
    out
}

//! OHLCV bars and the immutable per-symbol price series.

use chrono::NaiveDateTime;
use serde::Serialize;

use super::error::AetherError;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Bar {
    pub timestamp: NaiveDateTime,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: f64,
}

/// Bars for one symbol, strictly increasing by timestamp.
///
/// The only way to build one is [`PriceSeries::new`], which rejects duplicate
/// or out-of-order timestamps and negative or non-finite values. Once built the
/// series is never mutated.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PriceSeries {
    symbol: String,
    bars: Vec<Bar>,
}

impl PriceSeries {
    pub fn new(symbol: impl Into<String>, bars: Vec<Bar>) -> Result<Self, AetherError> {
        let symbol = symbol.into();

        for (i, bar) in bars.iter().enumerate() {
            let fields = [bar.open, bar.high, bar.low, bar.close, bar.volume];
            if fields.iter().any(|v| !v.is_finite() || *v < 0.0) {
                return Err(AetherError::InvalidSeries {
                    symbol,
                    reason: format!("bar {} at {} has a negative or non-finite value", i, bar.timestamp),
                });
            }
            if i > 0 && bar.timestamp <= bars[i - 1].timestamp {
                return Err(AetherError::InvalidSeries {
                    symbol,
                    reason: format!(
                        "timestamps must be strictly increasing ({} follows {})",
                        bar.timestamp,
                        bars[i - 1].timestamp
                    ),
                });
            }
        }

        Ok(Self { symbol, bars })
    }

    pub fn symbol(&self) -> &str {
        &self.symbol
    }

    pub fn bars(&self) -> &[Bar] {
        &self.bars
    }

    pub fn len(&self) -> usize {
        self.bars.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bars.is_empty()
    }

    pub fn closes(&self) -> Vec<f64> {
        self.bars.iter().map(|b| b.close).collect()
    }

    pub fn timestamps(&self) -> Vec<NaiveDateTime> {
        self.bars.iter().map(|b| b.timestamp).collect()
    }

    pub fn first_timestamp(&self) -> Option<NaiveDateTime> {
        self.bars.first().map(|b| b.timestamp)
    }

    pub fn last_timestamp(&self) -> Option<NaiveDateTime> {
        self.bars.last().map(|b| b.timestamp)
    }
}

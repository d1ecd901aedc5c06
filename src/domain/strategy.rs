//! Signal generators.
//!
//! Strategies form a closed set resolved once per run. Each variant is a pure
//! function of the price series: no state is carried between calls.

use serde::Serialize;

use super::error::AetherError;
use super::indicator::roc::calculate_roc;
use super::indicator::sma::calculate_sma;
use super::ohlcv::PriceSeries;
use super::signal::Signal;

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Strategy {
    /// Long while the fast SMA is above the slow SMA, short while below.
    MovingAverageCross { fast: usize, slow: usize },
    /// Long when the return over `lookback` bars exceeds `threshold`,
    /// short when it is below `-threshold`.
    Momentum { lookback: usize, threshold: f64 },
    BuyAndHold,
}

impl Default for Strategy {
    fn default() -> Self {
        Strategy::MovingAverageCross { fast: 20, slow: 50 }
    }
}

impl Strategy {
    pub fn moving_average_cross(fast: usize, slow: usize) -> Result<Self, AetherError> {
        let strategy = Strategy::MovingAverageCross { fast, slow };
        strategy.validate()?;
        Ok(strategy)
    }

    pub fn momentum(lookback: usize, threshold: f64) -> Result<Self, AetherError> {
        let strategy = Strategy::Momentum {
            lookback,
            threshold,
        };
        strategy.validate()?;
        Ok(strategy)
    }

    pub fn validate(&self) -> Result<(), AetherError> {
        match self {
            Strategy::MovingAverageCross { fast, slow } => {
                if *fast == 0 {
                    return Err(AetherError::configuration("fast", "must be at least 1"));
                }
                if fast >= slow {
                    return Err(AetherError::configuration(
                        "fast",
                        format!("fast window ({}) must be shorter than slow window ({})", fast, slow),
                    ));
                }
                Ok(())
            }
            Strategy::Momentum {
                lookback,
                threshold,
            } => {
                if *lookback == 0 {
                    return Err(AetherError::configuration("lookback", "must be at least 1"));
                }
                if !threshold.is_finite() || *threshold < 0.0 {
                    return Err(AetherError::configuration(
                        "threshold",
                        "must be a non-negative number",
                    ));
                }
                Ok(())
            }
            Strategy::BuyAndHold => Ok(()),
        }
    }

    pub fn name(&self) -> String {
        match self {
            Strategy::MovingAverageCross { fast, slow } => format!("MA Cross({},{})", fast, slow),
            Strategy::Momentum {
                lookback,
                threshold,
            } => format!("Momentum({},{})", lookback, threshold),
            Strategy::BuyAndHold => "Buy & Hold".to_string(),
        }
    }

    /// Shortest series for which `generate` produces at least one non-warmup signal.
    pub fn min_bars(&self) -> usize {
        match self {
            Strategy::MovingAverageCross { slow, .. } => *slow,
            Strategy::Momentum { lookback, .. } => lookback + 1,
            Strategy::BuyAndHold => 1,
        }
    }

    /// One signal per bar; bars inside the warmup window are `Flat`.
    pub fn generate(&self, series: &PriceSeries) -> Result<Vec<Signal>, AetherError> {
        self.validate()?;
        if series.len() < self.min_bars() {
            return Err(AetherError::insufficient(
                format!("{} on {}", self.name(), series.symbol()),
                series.len(),
                self.min_bars(),
            ));
        }

        let bars = series.bars();
        let signals = match self {
            Strategy::MovingAverageCross { fast, slow } => {
                let fast_sma = calculate_sma(bars, *fast);
                let slow_sma = calculate_sma(bars, *slow);
                (0..bars.len())
                    .map(|i| match (fast_sma.value_at(i), slow_sma.value_at(i)) {
                        (Some(f), Some(s)) if f > s => Signal::Long,
                        (Some(f), Some(s)) if f < s => Signal::Short,
                        _ => Signal::Flat,
                    })
                    .collect()
            }
            Strategy::Momentum {
                lookback,
                threshold,
            } => {
                let roc = calculate_roc(bars, *lookback);
                (0..bars.len())
                    .map(|i| match roc.value_at(i) {
                        Some(r) if r > *threshold => Signal::Long,
                        Some(r) if r < -threshold => Signal::Short,
                        _ => Signal::Flat,
                    })
                    .collect()
            }
            Strategy::BuyAndHold => vec![Signal::Long; bars.len()],
        };

        Ok(signals)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::ohlcv::Bar;
    use chrono::NaiveDate;

    fn make_series(prices: &[f64]) -> PriceSeries {
        let start = NaiveDate::from_ymd_opt(2024, 1, 1)
            .unwrap()
            .and_hms_opt(0, 0, 0)
            .unwrap();
        let bars = prices
            .iter()
            .enumerate()
            .map(|(i, &close)| Bar {
                timestamp: start + chrono::Duration::days(i as i64),
                open: close,
                high: close,
                low: close,
                close,
                volume: 1000.0,
            })
            .collect();
        PriceSeries::new("TEST", bars).unwrap()
    }

    #[test]
    fn default_is_twenty_fifty_cross() {
        assert_eq!(
            Strategy::default(),
            Strategy::MovingAverageCross { fast: 20, slow: 50 }
        );
    }

    #[test]
    fn rejects_fast_not_below_slow() {
        assert!(Strategy::moving_average_cross(5, 5).is_err());
        assert!(Strategy::moving_average_cross(10, 5).is_err());
        assert!(Strategy::moving_average_cross(0, 5).is_err());
    }

    #[test]
    fn rejects_bad_momentum_params() {
        assert!(Strategy::momentum(0, 0.01).is_err());
        assert!(Strategy::momentum(5, -0.01).is_err());
    }

    #[test]
    fn ma_cross_warmup_is_flat() {
        let series = make_series(&[1.0, 2.0, 3.0, 4.0, 5.0]);
        let signals = Strategy::moving_average_cross(2, 3)
            .unwrap()
            .generate(&series)
            .unwrap();

        assert_eq!(signals.len(), 5);
        assert_eq!(signals[0], Signal::Flat);
        assert_eq!(signals[1], Signal::Flat);
        assert_eq!(signals[2], Signal::Long);
    }

    #[test]
    fn ma_cross_rising_then_falling() {
        let series = make_series(&[1.0, 2.0, 3.0, 4.0, 3.0, 2.0, 1.0]);
        let signals = Strategy::moving_average_cross(2, 3)
            .unwrap()
            .generate(&series)
            .unwrap();

        assert_eq!(signals[3], Signal::Long);
        assert_eq!(signals[6], Signal::Short);
    }

    #[test]
    fn ma_cross_equal_averages_are_flat() {
        let series = make_series(&[100.0; 60]);
        let signals = Strategy::default().generate(&series).unwrap();
        assert!(signals.iter().all(|s| *s == Signal::Flat));
    }

    #[test]
    fn ma_cross_insufficient_data() {
        let series = make_series(&[1.0, 2.0]);
        let err = Strategy::moving_average_cross(2, 3)
            .unwrap()
            .generate(&series)
            .unwrap_err();
        assert!(matches!(
            err,
            AetherError::InsufficientData { have: 2, need: 3, .. }
        ));
    }

    #[test]
    fn momentum_thresholds() {
        let series = make_series(&[100.0, 102.0, 102.5, 100.0]);
        let signals = Strategy::momentum(1, 0.01)
            .unwrap()
            .generate(&series)
            .unwrap();

        assert_eq!(
            signals,
            vec![Signal::Flat, Signal::Long, Signal::Flat, Signal::Short]
        );
    }

    #[test]
    fn buy_and_hold_is_always_long() {
        let series = make_series(&[1.0, 2.0, 3.0]);
        let signals = Strategy::BuyAndHold.generate(&series).unwrap();
        assert_eq!(signals, vec![Signal::Long; 3]);
    }

    #[test]
    fn generate_is_deterministic() {
        let series = make_series(&[5.0, 4.0, 6.0, 7.0, 3.0, 8.0, 9.0, 2.0]);
        let strategy = Strategy::moving_average_cross(2, 4).unwrap();
        assert_eq!(
            strategy.generate(&series).unwrap(),
            strategy.generate(&series).unwrap()
        );
    }
}

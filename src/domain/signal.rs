//! Per-bar target position produced by a strategy.

use serde::Serialize;

use super::error::AetherError;

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Signal {
    Long,
    Flat,
    Short,
    /// Continuous target weight in [-1, 1] of full notional.
    Weight(f64),
}

impl Signal {
    pub fn from_weight(weight: f64) -> Result<Self, AetherError> {
        if !weight.is_finite() || !(-1.0..=1.0).contains(&weight) {
            return Err(AetherError::configuration(
                "signal weight",
                format!("{} is outside [-1, 1]", weight),
            ));
        }
        Ok(Signal::Weight(weight))
    }

    /// Fraction of full notional this signal asks for; negative is short.
    pub fn target_weight(&self) -> f64 {
        match self {
            Signal::Long => 1.0,
            Signal::Flat => 0.0,
            Signal::Short => -1.0,
            Signal::Weight(w) => *w,
        }
    }

    pub fn is_valid(&self) -> bool {
        match self {
            Signal::Weight(w) => w.is_finite() && (-1.0..=1.0).contains(w),
            _ => true,
        }
    }
}

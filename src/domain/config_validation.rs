//! Configuration validation.
//!
//! Checks every field of the INI sections before any data is loaded. Missing
//! optional keys fall back to the same defaults the typed configs use; keys
//! that are present must parse and be in range.

use chrono::NaiveDate;

use crate::domain::error::AetherError;
use crate::domain::optimizer::OptimizationMethod;
use crate::ports::config_port::ConfigPort;

pub const STRATEGY_KINDS: [&str; 3] = ["ma_cross", "momentum", "buy_and_hold"];

pub fn validate_backtest_config(config: &dyn ConfigPort) -> Result<(), AetherError> {
    validate_initial_cash(config)?;
    validate_bps(config, "commission_bps")?;
    validate_bps(config, "slippage_bps")?;
    validate_bool(config, "backtest", "allow_shorting")?;
    validate_bool(config, "backtest", "fractional_shares")?;
    validate_bool(config, "backtest", "include_benchmark")?;
    validate_risk_free_rate(config)?;
    validate_periods_per_year(config)?;
    validate_dates(config)?;
    Ok(())
}

pub fn validate_strategy_config(config: &dyn ConfigPort) -> Result<(), AetherError> {
    let kind = strategy_kind(config);
    match kind.as_str() {
        "ma_cross" => {
            let fast = read_int(config, "strategy", "fast")?.unwrap_or(20);
            let slow = read_int(config, "strategy", "slow")?.unwrap_or(50);
            if fast < 1 {
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
        "momentum" => {
            let lookback = read_int(config, "strategy", "lookback")?.unwrap_or(20);
            if lookback < 1 {
                return Err(AetherError::configuration("lookback", "must be at least 1"));
            }
            let threshold = read_double(config, "strategy", "threshold")?.unwrap_or(0.0);
            if threshold < 0.0 {
                return Err(AetherError::configuration("threshold", "must be non-negative"));
            }
            Ok(())
        }
        "buy_and_hold" => Ok(()),
        other => Err(AetherError::configuration(
            "kind",
            format!("unknown strategy '{}', expected one of {}", other, STRATEGY_KINDS.join(", ")),
        )),
    }
}

pub fn validate_optimizer_config(config: &dyn ConfigPort) -> Result<(), AetherError> {
    if let Some(method) = config.get_string("optimizer", "method") {
        method.parse::<OptimizationMethod>()?;
    }
    if let Some(v) = read_double(config, "optimizer", "risk_aversion")? {
        if v <= 0.0 {
            return Err(AetherError::configuration("risk_aversion", "must be positive"));
        }
    }
    if let Some(v) = read_double(config, "optimizer", "tolerance")? {
        if v <= 0.0 {
            return Err(AetherError::configuration("tolerance", "must be positive"));
        }
    }
    if let Some(v) = read_int(config, "optimizer", "max_iterations")? {
        if v < 1 {
            return Err(AetherError::configuration("max_iterations", "must be at least 1"));
        }
    }
    if let Some(v) = read_double(config, "optimizer", "max_weight")? {
        if v <= 0.0 || v > 1.0 {
            return Err(AetherError::configuration("max_weight", "must be in (0, 1]"));
        }
    }
    validate_bool(config, "optimizer", "allow_short")?;
    Ok(())
}

/// Strategy kind, lower-cased, defaulting to the moving average cross.
pub fn strategy_kind(config: &dyn ConfigPort) -> String {
    config
        .get_string("strategy", "kind")
        .map(|k| k.trim().to_lowercase().replace('-', "_"))
        .filter(|k| !k.is_empty())
        .unwrap_or_else(|| "ma_cross".to_string())
}

/// `[section] key` parsed as a date, `None` when absent.
pub fn read_date(
    config: &dyn ConfigPort,
    section: &str,
    key: &str,
) -> Result<Option<NaiveDate>, AetherError> {
    match config.get_string(section, key) {
        None => Ok(None),
        Some(s) => NaiveDate::parse_from_str(s.trim(), "%Y-%m-%d")
            .map(Some)
            .map_err(|_| {
                AetherError::configuration(key, format!("invalid date '{}', expected YYYY-MM-DD", s))
            }),
    }
}

fn read_double(config: &dyn ConfigPort, section: &str, key: &str) -> Result<Option<f64>, AetherError> {
    match config.get_string(section, key) {
        None => Ok(None),
        Some(s) => match s.trim().parse::<f64>() {
            Ok(v) if v.is_finite() => Ok(Some(v)),
            _ => Err(AetherError::configuration(key, format!("'{}' is not a number", s))),
        },
    }
}

fn read_int(config: &dyn ConfigPort, section: &str, key: &str) -> Result<Option<i64>, AetherError> {
    match config.get_string(section, key) {
        None => Ok(None),
        Some(s) => s
            .trim()
            .parse::<i64>()
            .map(Some)
            .map_err(|_| AetherError::configuration(key, format!("'{}' is not an integer", s))),
    }
}

fn validate_bool(config: &dyn ConfigPort, section: &str, key: &str) -> Result<(), AetherError> {
    match config.get_string(section, key) {
        None => Ok(()),
        Some(s) => match s.trim().to_lowercase().as_str() {
            "true" | "yes" | "1" | "false" | "no" | "0" => Ok(()),
            _ => Err(AetherError::configuration(key, format!("'{}' is not a boolean", s))),
        },
    }
}

fn validate_initial_cash(config: &dyn ConfigPort) -> Result<(), AetherError> {
    if let Some(v) = read_double(config, "backtest", "initial_cash")? {
        if v <= 0.0 {
            return Err(AetherError::configuration("initial_cash", "must be positive"));
        }
    }
    Ok(())
}

fn validate_bps(config: &dyn ConfigPort, key: &str) -> Result<(), AetherError> {
    if let Some(v) = read_double(config, "backtest", key)? {
        if !(0.0..10_000.0).contains(&v) {
            return Err(AetherError::configuration(
                key,
                "must be between 0 and 10000 basis points",
            ));
        }
    }
    Ok(())
}

fn validate_risk_free_rate(config: &dyn ConfigPort) -> Result<(), AetherError> {
    if let Some(v) = read_double(config, "backtest", "risk_free_rate")? {
        if v <= -1.0 || v >= 1.0 {
            return Err(AetherError::configuration(
                "risk_free_rate",
                "must be an annual rate between -1 and 1",
            ));
        }
    }
    Ok(())
}

fn validate_periods_per_year(config: &dyn ConfigPort) -> Result<(), AetherError> {
    if let Some(v) = read_double(config, "backtest", "periods_per_year")? {
        if v <= 0.0 {
            return Err(AetherError::configuration("periods_per_year", "must be positive"));
        }
    }
    Ok(())
}

fn validate_dates(config: &dyn ConfigPort) -> Result<(), AetherError> {
    let start = read_date(config, "backtest", "start_date")?;
    let end = read_date(config, "backtest", "end_date")?;
    if let (Some(start), Some(end)) = (start, end) {
        if start > end {
            return Err(AetherError::configuration(
                "start_date",
                "start_date must not be after end_date",
            ));
        }
    }
    Ok(())
}

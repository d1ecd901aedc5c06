//! Risk and performance statistics over an equity curve.
//!
//! Everything here is a pure function of its inputs. Annualisation uses a
//! periods-per-year figure inferred from the timestamp spacing unless the
//! caller supplies one.

use std::collections::BTreeMap;

use chrono::NaiveDateTime;
use serde::Serialize;

use super::error::AetherError;
use super::portfolio::EquityPoint;

pub const TRADING_DAYS_PER_YEAR: f64 = 252.0;

/// Seconds in a regular 6.5 hour US equity session.
const SESSION_SECONDS: f64 = 23_400.0;

/// Standard deviations below this are treated as zero.
const VOLATILITY_EPSILON: f64 = 1e-12;

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum SamplingFrequency {
    Intraday { seconds: f64 },
    Daily,
    Weekly,
    Monthly,
    Quarterly,
    Yearly,
}

impl SamplingFrequency {
    /// Classify the median spacing between consecutive timestamps.
    ///
    /// Fewer than two timestamps are assumed daily.
    pub fn infer(timestamps: &[NaiveDateTime]) -> Self {
        let mut spacings: Vec<f64> = timestamps
            .windows(2)
            .map(|w| (w[1] - w[0]).num_seconds() as f64)
            .collect();
        if spacings.is_empty() {
            return SamplingFrequency::Daily;
        }
        spacings.sort_by(|a, b| a.total_cmp(b));

        let mid = spacings.len() / 2;
        let median = if spacings.len() % 2 == 0 {
            (spacings[mid - 1] + spacings[mid]) / 2.0
        } else {
            spacings[mid]
        };

        let days = median / 86_400.0;
        if days < 20.0 / 24.0 {
            SamplingFrequency::Intraday { seconds: median }
        } else if days < 4.0 {
            SamplingFrequency::Daily
        } else if days < 20.0 {
            SamplingFrequency::Weekly
        } else if days < 60.0 {
            SamplingFrequency::Monthly
        } else if days < 200.0 {
            SamplingFrequency::Quarterly
        } else {
            SamplingFrequency::Yearly
        }
    }

    pub fn periods_per_year(&self) -> f64 {
        match self {
            SamplingFrequency::Intraday { seconds } if *seconds > 0.0 => {
                (TRADING_DAYS_PER_YEAR * SESSION_SECONDS / seconds).max(TRADING_DAYS_PER_YEAR)
            }
            SamplingFrequency::Intraday { .. } => TRADING_DAYS_PER_YEAR,
            SamplingFrequency::Daily => TRADING_DAYS_PER_YEAR,
            SamplingFrequency::Weekly => 52.0,
            SamplingFrequency::Monthly => 12.0,
            SamplingFrequency::Quarterly => 4.0,
            SamplingFrequency::Yearly => 1.0,
        }
    }
}

/// How long the deepest drawdown lasted, in bars.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum DrawdownDuration {
    None,
    /// Bars from the peak to the first bar back at or above it.
    Recovered { bars: usize },
    /// Bars from the peak to the end of the curve.
    Ongoing { bars: usize },
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Drawdown {
    /// Fractional decline from peak; in [-1, 0].
    pub max_drawdown: f64,
    pub peak_index: usize,
    pub trough_index: usize,
    pub duration: DrawdownDuration,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RiskMetrics {
    pub total_return: f64,
    pub annualized_return: f64,
    pub annualized_volatility: f64,
    pub sharpe_ratio: f64,
    pub sortino_ratio: f64,
    pub drawdown: Drawdown,
    pub periods_per_year: f64,
    pub num_periods: usize,
}

impl RiskMetrics {
    pub fn compute(
        equity_curve: &[EquityPoint],
        risk_free_rate: f64,
        periods_per_year: Option<f64>,
    ) -> Result<Self, AetherError> {
        if equity_curve.is_empty() {
            return Err(AetherError::insufficient("risk metrics", 0, 1));
        }

        let ppy = resolve_periods_per_year(equity_curve, periods_per_year)?;
        let equity: Vec<f64> = equity_curve.iter().map(|p| p.equity).collect();
        let returns = period_returns(&equity);

        Ok(RiskMetrics {
            total_return: total_return(&equity),
            annualized_return: annualized_return(&returns, ppy),
            annualized_volatility: annualized_volatility(&returns, ppy),
            sharpe_ratio: sharpe_ratio(&returns, risk_free_rate, ppy),
            sortino_ratio: sortino_ratio(&returns, risk_free_rate, ppy),
            drawdown: max_drawdown(&equity)?,
            periods_per_year: ppy,
            num_periods: returns.len(),
        })
    }
}

fn resolve_periods_per_year(
    equity_curve: &[EquityPoint],
    periods_per_year: Option<f64>,
) -> Result<f64, AetherError> {
    match periods_per_year {
        Some(ppy) if ppy.is_finite() && ppy > 0.0 => Ok(ppy),
        Some(_) => Err(AetherError::configuration(
            "periods_per_year",
            "must be a positive number",
        )),
        None => {
            let timestamps: Vec<NaiveDateTime> =
                equity_curve.iter().map(|p| p.timestamp).collect();
            Ok(SamplingFrequency::infer(&timestamps).periods_per_year())
        }
    }
}

/// final / initial - 1; zero when the initial value is not positive.
pub fn total_return(equity: &[f64]) -> f64 {
    match (equity.first(), equity.last()) {
        (Some(&first), Some(&last)) if first > 0.0 => last / first - 1.0,
        _ => 0.0,
    }
}

/// Simple percentage change between consecutive values.
pub fn period_returns(values: &[f64]) -> Vec<f64> {
    values
        .windows(2)
        .map(|w| if w[0] > 0.0 { w[1] / w[0] - 1.0 } else { 0.0 })
        .collect()
}

fn mean(values: &[f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    values.iter().sum::<f64>() / values.len() as f64
}

/// Sample standard deviation (n - 1); zero with fewer than two values.
fn sample_std(values: &[f64]) -> f64 {
    if values.len() < 2 {
        return 0.0;
    }
    let m = mean(values);
    let var = values.iter().map(|v| (v - m).powi(2)).sum::<f64>() / (values.len() - 1) as f64;
    var.sqrt()
}

/// (1 + mean period return)^periods_per_year - 1
pub fn annualized_return(returns: &[f64], periods_per_year: f64) -> f64 {
    if returns.is_empty() {
        return 0.0;
    }
    let m = mean(returns);
    if m <= -1.0 {
        return -1.0;
    }
    (1.0 + m).powf(periods_per_year) - 1.0
}

pub fn annualized_volatility(returns: &[f64], periods_per_year: f64) -> f64 {
    let std = sample_std(returns);
    if std < VOLATILITY_EPSILON {
        return 0.0;
    }
    std * periods_per_year.sqrt()
}

/// Zero whenever volatility is zero.
pub fn sharpe_ratio(returns: &[f64], risk_free_rate: f64, periods_per_year: f64) -> f64 {
    let vol = annualized_volatility(returns, periods_per_year);
    if vol == 0.0 {
        return 0.0;
    }
    (annualized_return(returns, periods_per_year) - risk_free_rate) / vol
}

/// Like Sharpe but divides by downside deviation below the per-period
/// risk-free rate.
pub fn sortino_ratio(returns: &[f64], risk_free_rate: f64, periods_per_year: f64) -> f64 {
    if returns.is_empty() {
        return 0.0;
    }
    let period_rf = risk_free_rate / periods_per_year;
    let downside_sq: f64 = returns
        .iter()
        .map(|r| (r - period_rf).min(0.0).powi(2))
        .sum();
    let downside = (downside_sq / returns.len() as f64).sqrt();
    if downside < VOLATILITY_EPSILON {
        return 0.0;
    }
    (annualized_return(returns, periods_per_year) - risk_free_rate)
        / (downside * periods_per_year.sqrt())
}

/// Deepest peak-to-trough decline and how long it lasted.
pub fn max_drawdown(equity: &[f64]) -> Result<Drawdown, AetherError> {
    let Some(&first) = equity.first() else {
        return Err(AetherError::insufficient("drawdown", 0, 1));
    };

    let mut peak = first;
    let mut peak_index = 0;
    let mut worst = Drawdown {
        max_drawdown: 0.0,
        peak_index: 0,
        trough_index: 0,
        duration: DrawdownDuration::None,
    };

    for (i, &value) in equity.iter().enumerate() {
        if value >= peak {
            peak = value;
            peak_index = i;
            continue;
        }
        let dd = if peak > 0.0 {
            (value / peak - 1.0).clamp(-1.0, 0.0)
        } else {
            -1.0
        };
        if dd < worst.max_drawdown {
            worst.max_drawdown = dd;
            worst.peak_index = peak_index;
            worst.trough_index = i;
        }
    }

    if worst.max_drawdown < 0.0 {
        let peak_value = equity[worst.peak_index];
        let recovery = equity[worst.trough_index..]
            .iter()
            .position(|&v| v >= peak_value)
            .map(|offset| worst.trough_index + offset);
        worst.duration = match recovery {
            Some(idx) => DrawdownDuration::Recovered {
                bars: idx - worst.peak_index,
            },
            None => DrawdownDuration::Ongoing {
                bars: equity.len() - 1 - worst.peak_index,
            },
        };
    }

    Ok(worst)
}

/// Strategy performance relative to a benchmark equity curve.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BenchmarkComparison {
    /// Annualised regression intercept.
    pub alpha: f64,
    pub beta: f64,
    pub correlation: f64,
    pub excess_annual_return: f64,
    pub overlapping_periods: usize,
}

/// Regress strategy returns on benchmark returns over shared timestamps.
pub fn compare_to_benchmark(
    strategy: &[EquityPoint],
    benchmark: &[EquityPoint],
    periods_per_year: f64,
) -> Result<BenchmarkComparison, AetherError> {
    let bench_by_ts: BTreeMap<NaiveDateTime, f64> =
        benchmark.iter().map(|p| (p.timestamp, p.equity)).collect();

    let (strat_eq, bench_eq): (Vec<f64>, Vec<f64>) = strategy
        .iter()
        .filter_map(|p| bench_by_ts.get(&p.timestamp).map(|&b| (p.equity, b)))
        .unzip();

    if strat_eq.len() < 2 {
        return Err(AetherError::Alignment {
            reason: format!(
                "benchmark shares {} timestamps with the strategy, need at least 2",
                strat_eq.len()
            ),
        });
    }

    let rs = period_returns(&strat_eq);
    let rb = period_returns(&bench_eq);
    let mean_s = mean(&rs);
    let mean_b = mean(&rb);

    let n = rs.len() as f64;
    let cov = rs
        .iter()
        .zip(&rb)
        .map(|(s, b)| (s - mean_s) * (b - mean_b))
        .sum::<f64>()
        / n;
    let var_b = rb.iter().map(|b| (b - mean_b).powi(2)).sum::<f64>() / n;
    let var_s = rs.iter().map(|s| (s - mean_s).powi(2)).sum::<f64>() / n;

    let beta = if var_b.sqrt() < VOLATILITY_EPSILON {
        0.0
    } else {
        cov / var_b
    };
    let correlation = if var_b.sqrt() < VOLATILITY_EPSILON || var_s.sqrt() < VOLATILITY_EPSILON {
        0.0
    } else {
        (cov / (var_s.sqrt() * var_b.sqrt())).clamp(-1.0, 1.0)
    };

    Ok(BenchmarkComparison {
        alpha: (mean_s - beta * mean_b) * periods_per_year,
        beta,
        correlation,
        excess_annual_return: annualized_return(&rs, periods_per_year)
            - annualized_return(&rb, periods_per_year),
        overlapping_periods: rs.len(),
    })
}

//! Backtest pipeline: signals, simulated execution, risk statistics.
//!
//! [`run_backtest`] chains the strategy, the execution simulator and the risk
//! metrics for one symbol, and replays a buy-and-hold benchmark over the same
//! bars with the same costs.

use chrono::NaiveDateTime;
use serde::Serialize;
use tracing::info;

use super::error::AetherError;
use super::execution::{ExecutionConfig, ExecutionSimulator};
use super::metrics::{compare_to_benchmark, BenchmarkComparison, RiskMetrics};
use super::ohlcv::PriceSeries;
use super::order::Order;
use super::portfolio::EquityPoint;
use super::strategy::Strategy;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BacktestConfig {
    pub execution: ExecutionConfig,
    /// Annual rate used by Sharpe and Sortino.
    pub risk_free_rate: f64,
    /// Overrides the frequency inferred from bar spacing.
    pub periods_per_year: Option<f64>,
    pub include_benchmark: bool,
}

impl Default for BacktestConfig {
    fn default() -> Self {
        BacktestConfig {
            execution: ExecutionConfig::default(),
            risk_free_rate: 0.0,
            periods_per_year: None,
            include_benchmark: true,
        }
    }
}

impl BacktestConfig {
    pub fn validate(&self) -> Result<(), AetherError> {
        self.execution.validate()?;
        if !self.risk_free_rate.is_finite() {
            return Err(AetherError::configuration(
                "risk_free_rate",
                "must be a finite number",
            ));
        }
        if let Some(ppy) = self.periods_per_year {
            if !ppy.is_finite() || ppy <= 0.0 {
                return Err(AetherError::configuration(
                    "periods_per_year",
                    "must be greater than zero",
                ));
            }
        }
        Ok(())
    }
}

/// Buy-and-hold replay over the same bars.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BenchmarkResult {
    pub strategy: String,
    pub final_equity: f64,
    pub metrics: RiskMetrics,
    pub comparison: BenchmarkComparison,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RunResult {
    pub symbol: String,
    pub strategy: String,
    pub initial_cash: f64,
    pub final_equity: f64,
    pub total_commission: f64,
    pub realized_pnl: f64,
    pub unrealized_pnl: f64,
    /// Set when a losing short exhausted the account and was force-covered.
    pub liquidated_at: Option<NaiveDateTime>,
    pub written_off: f64,
    pub ledger: Vec<Order>,
    pub equity_curve: Vec<EquityPoint>,
    pub metrics: RiskMetrics,
    pub benchmark: Option<BenchmarkResult>,
}

impl RunResult {
    pub fn trade_count(&self) -> usize {
        self.ledger.len()
    }
}

pub fn run_backtest(
    series: &PriceSeries,
    strategy: &Strategy,
    config: &BacktestConfig,
) -> Result<RunResult, AetherError> {
    config.validate()?;
    let simulator = ExecutionSimulator::new(config.execution.clone())?;

    let signals = strategy.generate(series)?;
    let simulation = simulator.run(series, &signals)?;
    let metrics = RiskMetrics::compute(
        &simulation.equity_curve,
        config.risk_free_rate,
        config.periods_per_year,
    )?;

    let benchmark = if config.include_benchmark && *strategy != Strategy::BuyAndHold {
        let hold = Strategy::BuyAndHold;
        let bench_sim = simulator.run(series, &hold.generate(series)?)?;
        let bench_metrics = RiskMetrics::compute(
            &bench_sim.equity_curve,
            config.risk_free_rate,
            config.periods_per_year,
        )?;
        let comparison = compare_to_benchmark(
            &simulation.equity_curve,
            &bench_sim.equity_curve,
            metrics.periods_per_year,
        )?;
        Some(BenchmarkResult {
            strategy: hold.name(),
            final_equity: bench_sim
                .final_equity()
                .unwrap_or(config.execution.initial_cash),
            metrics: bench_metrics,
            comparison,
        })
    } else {
        None
    };

    let final_equity = simulation
        .final_equity()
        .unwrap_or(config.execution.initial_cash);
    let total_commission = simulation.total_commission();

    info!(
        symbol = series.symbol(),
        strategy = %strategy.name(),
        bars = series.len(),
        trades = simulation.ledger.len(),
        final_equity,
        "backtest complete"
    );

    Ok(RunResult {
        symbol: simulation.symbol,
        strategy: strategy.name(),
        initial_cash: config.execution.initial_cash,
        final_equity,
        total_commission,
        realized_pnl: simulation.realized_pnl,
        unrealized_pnl: simulation.unrealized_pnl,
        liquidated_at: simulation.liquidated_at,
        written_off: simulation.written_off,
        ledger: simulation.ledger,
        equity_curve: simulation.equity_curve,
        metrics,
        benchmark,
    })
}

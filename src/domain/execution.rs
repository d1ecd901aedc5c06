//! Trade execution and fill simulation.
//!
//! Replays a signal sequence against a price series with cash, commission and
//! slippage accounting. Every bar produces exactly one equity point; bars where
//! the position already matches the target, or where nothing is affordable,
//! produce no order.
//!
//! A short whose loss consumes the whole account is covered at that bar's
//! close, any deficit is written off so equity stays at zero, and the run
//! trades no further.

use chrono::NaiveDateTime;
use serde::Serialize;
use tracing::{debug, warn};

use super::error::AetherError;
use super::ohlcv::{Bar, PriceSeries};
use super::order::{Order, Side};
use super::portfolio::{EquityPoint, Portfolio};
use super::position::Position;
use super::signal::Signal;

pub const BPS_DENOMINATOR: f64 = 10_000.0;

/// Deltas smaller than this are treated as already on target.
const QUANTITY_EPSILON: f64 = 1e-9;

/// Cost and sizing parameters for a simulation run.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ExecutionConfig {
    pub initial_cash: f64,
    pub commission_bps: f64,
    pub slippage_bps: f64,
    /// When false, short targets are treated as flat.
    pub allow_shorting: bool,
    /// When false, quantities are whole units truncated toward zero.
    pub fractional_shares: bool,
}

impl Default for ExecutionConfig {
    fn default() -> Self {
        ExecutionConfig {
            initial_cash: 100_000.0,
            commission_bps: 1.0,
            slippage_bps: 0.5,
            allow_shorting: true,
            fractional_shares: false,
        }
    }
}

impl ExecutionConfig {
    pub fn validate(&self) -> Result<(), AetherError> {
        if !self.initial_cash.is_finite() || self.initial_cash <= 0.0 {
            return Err(AetherError::configuration(
                "initial_cash",
                "initial_cash must be positive",
            ));
        }
        validate_bps("commission_bps", self.commission_bps)?;
        validate_bps("slippage_bps", self.slippage_bps)?;
        Ok(())
    }
}

fn validate_bps(parameter: &str, value: f64) -> Result<(), AetherError> {
    if !value.is_finite() || value < 0.0 {
        return Err(AetherError::configuration(
            parameter,
            format!("{} must be non-negative", parameter),
        ));
    }
    if value >= BPS_DENOMINATOR {
        return Err(AetherError::configuration(
            parameter,
            format!("{} must be below {}", parameter, BPS_DENOMINATOR),
        ));
    }
    Ok(())
}

/// Move `price` against the trader: buys fill higher, sells fill lower.
pub fn apply_slippage(price: f64, side: Side, slippage_bps: f64) -> f64 {
    match side {
        Side::Buy => price * (1.0 + slippage_bps / BPS_DENOMINATOR),
        Side::Sell => price * (1.0 - slippage_bps / BPS_DENOMINATOR),
    }
}

/// commission = |quantity| * fill_price * bps / 10_000
pub fn calculate_commission(quantity: f64, fill_price: f64, commission_bps: f64) -> f64 {
    quantity.abs() * fill_price * commission_bps / BPS_DENOMINATOR
}

/// Largest buy quantity whose notional plus commission fits in `cash`.
pub fn max_affordable_quantity(
    cash: f64,
    fill_price: f64,
    commission_bps: f64,
    fractional: bool,
) -> f64 {
    if cash <= 0.0 || fill_price <= 0.0 {
        return 0.0;
    }

    let per_unit = fill_price * (1.0 + commission_bps / BPS_DENOMINATOR);
    let mut quantity = cash / per_unit;
    if !fractional {
        quantity = quantity.floor();
    }

    let cost = quantity * fill_price + calculate_commission(quantity, fill_price, commission_bps);
    if cost > cash {
        // Rounding pushed the cost a hair over the available cash.
        quantity = if fractional {
            quantity * (1.0 - 1e-12)
        } else {
            quantity - 1.0
        };
    }

    quantity.max(0.0)
}

/// Units to hold for `signal` given current equity and price.
///
/// Negative weights become flat when shorting is off. Whole-unit sizing
/// truncates toward zero.
pub(crate) fn target_quantity(
    signal: &Signal,
    equity: f64,
    close: f64,
    allow_shorting: bool,
    fractional_shares: bool,
) -> f64 {
    let mut weight = signal.target_weight();
    if !allow_shorting && weight < 0.0 {
        weight = 0.0;
    }
    if equity <= 0.0 || close <= 0.0 {
        return 0.0;
    }

    let raw = weight * equity / close;
    if fractional_shares { raw } else { raw.trunc() }
}

/// Ledger and equity curve of one simulated run.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Simulation {
    pub symbol: String,
    pub ledger: Vec<Order>,
    pub equity_curve: Vec<EquityPoint>,
    pub final_position: Position,
    pub final_cash: f64,
    pub realized_pnl: f64,
    /// Open position marked at the last close.
    pub unrealized_pnl: f64,
    /// Bar at which a short was force-covered because equity reached zero.
    pub liquidated_at: Option<NaiveDateTime>,
    /// Deficit beyond the account's capital absorbed at liquidation.
    pub written_off: f64,
}

impl Simulation {
    pub fn total_commission(&self) -> f64 {
        self.ledger.iter().map(|o| o.commission).sum()
    }

    pub fn final_equity(&self) -> Option<f64> {
        self.equity_curve.last().map(|p| p.equity)
    }
}

#[derive(Debug, Clone)]
pub struct ExecutionSimulator {
    config: ExecutionConfig,
}

impl ExecutionSimulator {
    pub fn new(config: ExecutionConfig) -> Result<Self, AetherError> {
        config.validate()?;
        Ok(Self { config })
    }

    pub fn config(&self) -> &ExecutionConfig {
        &self.config
    }

    /// Replay `signals` against `series`.
    ///
    /// A target quantity is sized from equity at the close of the bar where
    /// the signal changes and is then pursued on later bars until reached, so
    /// a buy capped by available cash resumes once cash allows.
    pub fn run(&self, series: &PriceSeries, signals: &[Signal]) -> Result<Simulation, AetherError> {
        if signals.len() != series.len() {
            return Err(AetherError::Alignment {
                reason: format!(
                    "{} signals for {} bars of {}",
                    signals.len(),
                    series.len(),
                    series.symbol()
                ),
            });
        }
        if let Some(i) = signals.iter().position(|s| !s.is_valid()) {
            return Err(AetherError::configuration(
                "signal weight",
                format!("signal at bar {} is outside [-1, 1]", i),
            ));
        }

        let mut portfolio = Portfolio::new(series.symbol(), self.config.initial_cash);
        let mut target = 0.0;
        let mut sized_for: Option<Signal> = None;
        let mut liquidated_at = None;
        let mut written_off = 0.0;

        for (bar, signal) in series.bars().iter().zip(signals) {
            if liquidated_at.is_none() && bar.close > 0.0 {
                if portfolio.total_equity(bar.close) > 0.0 {
                    if sized_for != Some(*signal) {
                        let equity = portfolio.total_equity(bar.close);
                        target = target_quantity(
                            signal,
                            equity,
                            bar.close,
                            self.config.allow_shorting,
                            self.config.fractional_shares,
                        );
                        sized_for = Some(*signal);
                    }

                    let delta = target - portfolio.position.quantity;
                    if delta.abs() > QUANTITY_EPSILON {
                        self.execute(&mut portfolio, bar, delta);
                    }
                }

                if portfolio.total_equity(bar.close) <= 0.0 {
                    written_off = self.liquidate(&mut portfolio, bar);
                    liquidated_at = Some(bar.timestamp);
                }
            }

            portfolio.record_equity(bar.timestamp, bar.close);
        }

        let unrealized_pnl = series
            .bars()
            .last()
            .map_or(0.0, |bar| portfolio.position.unrealized_pnl(bar.close));

        Ok(Simulation {
            symbol: series.symbol().to_string(),
            ledger: portfolio.ledger,
            equity_curve: portfolio.equity_curve,
            final_position: portfolio.position,
            final_cash: portfolio.cash,
            realized_pnl: portfolio.realized_pnl,
            unrealized_pnl,
            liquidated_at,
            written_off,
        })
    }

    /// Close the whole position at the bar's close regardless of cash, then
    /// floor cash at zero. Returns the amount written off.
    fn liquidate(&self, portfolio: &mut Portfolio, bar: &Bar) -> f64 {
        let delta = -portfolio.position.quantity;
        if delta != 0.0 {
            let side = Side::for_delta(delta);
            let fill_price = apply_slippage(bar.close, side, self.config.slippage_bps);
            let quantity = delta.abs();
            portfolio.settle(Order {
                symbol: portfolio.position.symbol.clone(),
                side,
                quantity,
                requested_price: bar.close,
                fill_price,
                commission: calculate_commission(quantity, fill_price, self.config.commission_bps),
                timestamp: bar.timestamp,
            });
        }

        let deficit = (-portfolio.cash).max(0.0);
        portfolio.cash = portfolio.cash.max(0.0);
        warn!(
            timestamp = %bar.timestamp,
            close = bar.close,
            written_off = deficit,
            "equity exhausted, position liquidated"
        );
        deficit
    }

    fn execute(&self, portfolio: &mut Portfolio, bar: &Bar, delta: f64) {
        let side = Side::for_delta(delta);
        let fill_price = apply_slippage(bar.close, side, self.config.slippage_bps);
        let mut quantity = delta.abs();

        if side == Side::Buy {
            let affordable = max_affordable_quantity(
                portfolio.cash,
                fill_price,
                self.config.commission_bps,
                self.config.fractional_shares,
            );
            if quantity > affordable {
                warn!(
                    timestamp = %bar.timestamp,
                    wanted = quantity,
                    affordable,
                    "buy capped by available cash"
                );
                quantity = affordable;
            }
        }

        if quantity <= QUANTITY_EPSILON {
            return;
        }

        let order = Order {
            symbol: portfolio.position.symbol.clone(),
            side,
            quantity,
            requested_price: bar.close,
            fill_price,
            commission: calculate_commission(quantity, fill_price, self.config.commission_bps),
            timestamp: bar.timestamp,
        };
        debug!(
            timestamp = %order.timestamp,
            side = %order.side,
            quantity = order.quantity,
            fill_price = order.fill_price,
            commission = order.commission,
            "order filled"
        );
        portfolio.settle(order);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
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
        PriceSeries::new("SPY", bars).unwrap()
    }

    fn config(initial_cash: f64, commission_bps: f64, slippage_bps: f64) -> ExecutionConfig {
        ExecutionConfig {
            initial_cash,
            commission_bps,
            slippage_bps,
            allow_shorting: true,
            fractional_shares: false,
        }
    }

    #[test]
    fn slippage_is_adverse() {
        assert!((apply_slippage(100.0, Side::Buy, 50.0) - 100.5).abs() < 1e-12);
        assert!((apply_slippage(100.0, Side::Sell, 50.0) - 99.5).abs() < 1e-12);
        assert_eq!(apply_slippage(100.0, Side::Buy, 0.0), 100.0);
    }

    #[test]
    fn commission_in_bps() {
        assert!((calculate_commission(10.0, 100.0, 100.0) - 10.0).abs() < 1e-12);
        assert!((calculate_commission(-10.0, 100.0, 1.0) - 0.1).abs() < 1e-12);
    }

    #[test]
    fn affordable_quantity_whole_units() {
        assert_eq!(max_affordable_quantity(1_010.0, 100.0, 100.0, false), 10.0);
        assert_eq!(max_affordable_quantity(1_009.0, 100.0, 100.0, false), 9.0);
        assert_eq!(max_affordable_quantity(50.0, 100.0, 0.0, false), 0.0);
        assert_eq!(max_affordable_quantity(0.0, 100.0, 0.0, true), 0.0);
    }

    #[test]
    fn affordable_quantity_fractional_never_overspends() {
        let cash = 1_000.0;
        let q = max_affordable_quantity(cash, 33.3, 7.0, true);
        let cost = q * 33.3 + calculate_commission(q, 33.3, 7.0);
        assert!(cost <= cash);
        assert!(q > 29.0);
    }

    #[test]
    fn config_validation() {
        assert!(config(100.0, 0.0, 0.0).validate().is_ok());
        assert!(config(0.0, 0.0, 0.0).validate().is_err());
        assert!(config(100.0, -1.0, 0.0).validate().is_err());
        assert!(config(100.0, 0.0, -0.5).validate().is_err());
        assert!(config(100.0, 0.0, 10_000.0).validate().is_err());
        assert!(ExecutionSimulator::new(config(-5.0, 0.0, 0.0)).is_err());
    }

    #[test]
    fn length_mismatch_is_alignment_error() {
        let sim = ExecutionSimulator::new(config(1_000.0, 0.0, 0.0)).unwrap();
        let series = make_series(&[100.0, 101.0]);
        let err = sim.run(&series, &[Signal::Flat]).unwrap_err();
        assert!(matches!(err, AetherError::Alignment { .. }));
    }

    #[test]
    fn out_of_range_weight_is_rejected() {
        let sim = ExecutionSimulator::new(config(1_000.0, 0.0, 0.0)).unwrap();
        let series = make_series(&[100.0]);
        let err = sim.run(&series, &[Signal::Weight(1.5)]).unwrap_err();
        assert!(matches!(err, AetherError::Configuration { .. }));
    }

    #[test]
    fn flat_signals_leave_cash_untouched() {
        let sim = ExecutionSimulator::new(config(5_000.0, 10.0, 10.0)).unwrap();
        let series = make_series(&[100.0, 90.0, 120.0, 80.0]);
        let result = sim.run(&series, &[Signal::Flat; 4]).unwrap();

        assert!(result.ledger.is_empty());
        assert_eq!(result.equity_curve.len(), 4);
        assert!(result.equity_curve.iter().all(|p| p.equity == 5_000.0));
    }

    #[test]
    fn round_trip_commission() {
        let sim = ExecutionSimulator::new(config(1_010.0, 100.0, 0.0)).unwrap();
        let series = make_series(&[100.0, 100.0, 100.0]);
        let result = sim
            .run(&series, &[Signal::Flat, Signal::Long, Signal::Flat])
            .unwrap();

        assert_eq!(result.ledger.len(), 2);
        assert_eq!(result.ledger[0].side, Side::Buy);
        assert_eq!(result.ledger[0].quantity, 10.0);
        assert_eq!(result.ledger[1].side, Side::Sell);
        assert_eq!(result.ledger[1].quantity, 10.0);
        assert!((result.total_commission() - 20.0).abs() < 1e-9);
        assert!((result.final_cash - 990.0).abs() < 1e-9);
    }

    #[test]
    fn buy_is_capped_by_cash() {
        let sim = ExecutionSimulator::new(config(1_000.0, 0.0, 100.0)).unwrap();
        let series = make_series(&[100.0, 100.0]);
        let result = sim.run(&series, &[Signal::Long, Signal::Long]).unwrap();

        // Target is 10 units but each fills at 101, so only 9 fit.
        assert_eq!(result.ledger.len(), 1);
        assert_eq!(result.ledger[0].quantity, 9.0);
        assert!(result.final_cash >= 0.0);
        assert!(result.equity_curve.iter().all(|p| p.cash >= 0.0));
    }

    #[test]
    fn unaffordable_bar_produces_no_order() {
        let sim = ExecutionSimulator::new(config(50.0, 0.0, 0.0)).unwrap();
        let series = make_series(&[100.0, 100.0, 40.0]);
        let result = sim
            .run(&series, &[Signal::Long, Signal::Long, Signal::Long])
            .unwrap();

        assert_eq!(result.equity_curve.len(), 3);
        assert!(result.ledger.is_empty());
    }

    #[test]
    fn short_signal_sells_short() {
        let sim = ExecutionSimulator::new(config(1_000.0, 0.0, 0.0)).unwrap();
        let series = make_series(&[100.0, 90.0]);
        let result = sim.run(&series, &[Signal::Short, Signal::Short]).unwrap();

        assert_eq!(result.ledger.len(), 1);
        assert_eq!(result.ledger[0].side, Side::Sell);
        assert_eq!(result.final_position.quantity, -10.0);
        assert!((result.equity_curve[1].equity - 1_100.0).abs() < 1e-9);
    }

    #[test]
    fn shorting_disabled_maps_short_to_flat() {
        let mut cfg = config(1_000.0, 0.0, 0.0);
        cfg.allow_shorting = false;
        let sim = ExecutionSimulator::new(cfg).unwrap();
        let series = make_series(&[100.0, 90.0]);
        let result = sim.run(&series, &[Signal::Short, Signal::Short]).unwrap();

        assert!(result.ledger.is_empty());
    }

    #[test]
    fn weight_scales_position() {
        let sim = ExecutionSimulator::new(config(1_000.0, 0.0, 0.0)).unwrap();
        let series = make_series(&[100.0]);
        let result = sim.run(&series, &[Signal::Weight(0.5)]).unwrap();

        assert_eq!(result.final_position.quantity, 5.0);
    }

    #[test]
    fn fractional_shares_use_full_notional() {
        let mut cfg = config(1_000.0, 0.0, 0.0);
        cfg.fractional_shares = true;
        let sim = ExecutionSimulator::new(cfg).unwrap();
        let series = make_series(&[300.0, 310.0]);
        let result = sim.run(&series, &[Signal::Long, Signal::Long]).unwrap();

        assert_eq!(result.ledger.len(), 1);
        assert!((result.final_position.quantity - 1_000.0 / 300.0).abs() < 1e-6);
    }

    #[test]
    fn long_to_short_flip_sells_through_zero() {
        let sim = ExecutionSimulator::new(config(1_000.0, 0.0, 0.0)).unwrap();
        let series = make_series(&[100.0, 100.0]);
        let result = sim.run(&series, &[Signal::Long, Signal::Short]).unwrap();

        assert_eq!(result.ledger.len(), 2);
        assert_eq!(result.ledger[1].side, Side::Sell);
        assert_eq!(result.ledger[1].quantity, 20.0);
        assert_eq!(result.final_position.quantity, -10.0);
    }

    #[test]
    fn ledger_is_ordered_by_timestamp() {
        let sim = ExecutionSimulator::new(config(10_000.0, 5.0, 5.0)).unwrap();
        let series = make_series(&[100.0, 105.0, 95.0, 110.0, 90.0]);
        let signals = [
            Signal::Long,
            Signal::Short,
            Signal::Flat,
            Signal::Long,
            Signal::Flat,
        ];
        let result = sim.run(&series, &signals).unwrap();

        assert!(result
            .ledger
            .windows(2)
            .all(|w| w[0].timestamp < w[1].timestamp));
        assert!(result.ledger.iter().all(|o| o.commission >= 0.0));
        assert!(result.ledger.iter().all(|o| o.slippage_cost() >= 0.0));
    }

    #[test]
    fn short_squeeze_liquidates_and_floors_equity() {
        let sim = ExecutionSimulator::new(config(1_000.0, 0.0, 0.0)).unwrap();
        let series = make_series(&[100.0, 150.0, 250.0, 300.0]);
        let result = sim.run(&series, &[Signal::Short; 4]).unwrap();

        let equity: Vec<f64> = result.equity_curve.iter().map(|p| p.equity).collect();
        assert!((equity[0] - 1_000.0).abs() < 1e-9);
        assert!((equity[1] - 500.0).abs() < 1e-9);
        assert_eq!(equity[2], 0.0);
        assert_eq!(equity[3], 0.0);

        assert_eq!(result.liquidated_at, Some(series.bars()[2].timestamp));
        assert!((result.written_off - 500.0).abs() < 1e-9);
        assert!(result.final_position.is_flat());
        assert_eq!(result.final_cash, 0.0);

        let cover = result.ledger.last().unwrap();
        assert_eq!(cover.side, Side::Buy);
        assert_eq!(cover.quantity, 10.0);
        assert_eq!(cover.fill_price, 250.0);
    }

    #[test]
    fn no_trading_after_liquidation() {
        let sim = ExecutionSimulator::new(config(1_000.0, 10.0, 10.0)).unwrap();
        let series = make_series(&[100.0, 400.0, 50.0, 60.0]);
        let signals = [Signal::Short, Signal::Short, Signal::Long, Signal::Flat];
        let result = sim.run(&series, &signals).unwrap();

        assert_eq!(result.ledger.len(), 2);
        assert!(result.equity_curve.iter().all(|p| p.equity >= 0.0));
        assert!(result.equity_curve[1..].iter().all(|p| p.equity == 0.0));
        assert!(result.written_off > 0.0);
    }

    #[test]
    fn solvent_run_is_never_liquidated() {
        let sim = ExecutionSimulator::new(config(1_000.0, 0.0, 0.0)).unwrap();
        let series = make_series(&[100.0, 120.0, 150.0]);
        let result = sim.run(&series, &[Signal::Short; 3]).unwrap();

        assert_eq!(result.liquidated_at, None);
        assert_eq!(result.written_off, 0.0);
        assert!((result.equity_curve[2].equity - 500.0).abs() < 1e-9);
    }

    #[test]
    fn realized_and_unrealized_pnl() {
        let sim = ExecutionSimulator::new(config(1_000.0, 0.0, 0.0)).unwrap();
        let series = make_series(&[100.0, 110.0, 110.0, 120.0]);
        let signals = [Signal::Long, Signal::Long, Signal::Weight(0.5), Signal::Weight(0.5)];
        let result = sim.run(&series, &signals).unwrap();

        // Buy 10 at 100; resize to 5 at 110 realizes 5 * 10.
        assert!((result.realized_pnl - 50.0).abs() < 1e-9);
        assert_eq!(result.final_position.quantity, 5.0);
        assert!((result.unrealized_pnl - 100.0).abs() < 1e-9);
    }

    #[test]
    fn target_quantity_sizing() {
        assert_eq!(target_quantity(&Signal::Long, 1_050.0, 100.0, true, false), 10.0);
        assert_eq!(target_quantity(&Signal::Short, 1_050.0, 100.0, true, false), -10.0);
        assert_eq!(target_quantity(&Signal::Short, 1_050.0, 100.0, false, false), 0.0);
        assert!((target_quantity(&Signal::Long, 1_050.0, 100.0, true, true) - 10.5).abs() < 1e-12);
        assert_eq!(target_quantity(&Signal::Long, 0.0, 100.0, true, true), 0.0);
    }
}

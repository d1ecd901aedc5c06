//! Bar-by-bar trading loop over a broker.
//!
//! Unlike the execution simulator, the engine never fills orders itself: it
//! sizes a target from the broker's account snapshot and submits the
//! difference through [`BrokerPort`].

use serde::Serialize;
use tracing::{debug, info};

use super::error::AetherError;
use super::execution::target_quantity;
use super::ohlcv::PriceSeries;
use super::order::{Order, OrderRequest, Side};
use super::portfolio::EquityPoint;
use super::signal::Signal;
use crate::ports::broker_port::BrokerPort;

const QUANTITY_EPSILON: f64 = 1e-9;

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct AccountSnapshot {
    pub cash: f64,
    pub position_quantity: f64,
    pub market_value: f64,
    pub equity: f64,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct TradingConfig {
    /// When false, short signals close the position instead.
    pub allow_shorting: bool,
    pub fractional_shares: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TradingRun {
    pub symbol: String,
    pub orders: Vec<Order>,
    pub equity_curve: Vec<EquityPoint>,
}

impl TradingRun {
    pub fn orders_placed(&self) -> usize {
        self.orders.len()
    }

    pub fn start_equity(&self) -> Option<f64> {
        self.equity_curve.first().map(|p| p.equity)
    }

    pub fn final_equity(&self) -> Option<f64> {
        self.equity_curve.last().map(|p| p.equity)
    }
}

pub struct TradingEngine<B: BrokerPort> {
    broker: B,
    config: TradingConfig,
}

impl<B: BrokerPort> TradingEngine<B> {
    pub fn new(broker: B, config: TradingConfig) -> Self {
        TradingEngine { broker, config }
    }

    pub fn broker(&self) -> &B {
        &self.broker
    }

    pub fn into_broker(self) -> B {
        self.broker
    }

    /// Walk `series` and `signals` together, trading toward each signal's target.
    ///
    /// A broker rejection aborts the run.
    pub fn run(&mut self, series: &PriceSeries, signals: &[Signal]) -> Result<TradingRun, AetherError> {
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

        let mut orders = Vec::new();
        let mut equity_curve = Vec::with_capacity(series.len());
        let mut target = 0.0;
        let mut sized_for: Option<Signal> = None;

        for (bar, signal) in series.bars().iter().zip(signals) {
            if bar.close > 0.0 {
                let snapshot = self.broker.account_snapshot(bar.close);
                if sized_for != Some(*signal) {
                    target = target_quantity(
                        signal,
                        snapshot.equity,
                        bar.close,
                        self.config.allow_shorting,
                        self.config.fractional_shares,
                    );
                    sized_for = Some(*signal);
                }

                let delta = target - snapshot.position_quantity;
                if delta.abs() > QUANTITY_EPSILON {
                    let side = Side::for_delta(delta);
                    let mut quantity = delta.abs();
                    if side == Side::Buy {
                        quantity = quantity.min(self.broker.max_buy_quantity(bar.close));
                    }

                    if quantity > QUANTITY_EPSILON {
                        let request = OrderRequest {
                            symbol: series.symbol().to_string(),
                            side,
                            quantity,
                            timestamp: bar.timestamp,
                        };
                        let fill = self.broker.submit_order(&request, bar.close)?;
                        debug!(
                            timestamp = %bar.timestamp,
                            side = %side,
                            quantity,
                            fill_price = fill.fill_price,
                            "order submitted"
                        );
                        orders.push(fill.into_order(bar.close));
                    }
                }
            }

            let snapshot = self.broker.account_snapshot(bar.close);
            equity_curve.push(EquityPoint {
                timestamp: bar.timestamp,
                cash: snapshot.cash,
                position_value: snapshot.market_value,
                equity: snapshot.equity,
            });
        }

        info!(
            symbol = series.symbol(),
            orders = orders.len(),
            final_equity = ?equity_curve.last().map(|p| p.equity),
            "trading run complete"
        );

        Ok(TradingRun {
            symbol: series.symbol().to_string(),
            orders,
            equity_curve,
        })
    }
}

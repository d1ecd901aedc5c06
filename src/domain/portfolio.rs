//! Single-symbol portfolio state: cash, position, ledger and equity curve.

use chrono::NaiveDateTime;
use serde::Serialize;

use super::order::Order;
use super::position::Position;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EquityPoint {
    pub timestamp: NaiveDateTime,
    pub cash: f64,
    pub position_value: f64,
    pub equity: f64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Portfolio {
    pub cash: f64,
    pub initial_cash: f64,
    pub position: Position,
    /// Profit or loss locked in by reducing or closing the position, before commission.
    pub realized_pnl: f64,
    pub ledger: Vec<Order>,
    pub equity_curve: Vec<EquityPoint>,
}

impl Portfolio {
    pub fn new(symbol: &str, initial_cash: f64) -> Self {
        Portfolio {
            cash: initial_cash,
            initial_cash,
            position: Position::new(symbol),
            realized_pnl: 0.0,
            ledger: Vec::new(),
            equity_curve: Vec::new(),
        }
    }

    pub fn total_equity(&self, price: f64) -> f64 {
        self.cash + self.position.market_value(price)
    }

    /// Settle an executed order against cash and the position, then append it.
    pub fn settle(&mut self, order: Order) {
        self.cash -= order.signed_quantity() * order.fill_price;
        self.cash -= order.commission;
        self.realized_pnl += self
            .position
            .apply_fill(order.signed_quantity(), order.fill_price);
        self.ledger.push(order);
    }

    pub fn record_equity(&mut self, timestamp: NaiveDateTime, price: f64) {
        let position_value = self.position.market_value(price);
        self.equity_curve.push(EquityPoint {
            timestamp,
            cash: self.cash,
            position_value,
            equity: self.cash + position_value,
        });
    }

    pub fn total_commission(&self) -> f64 {
        self.ledger.iter().map(|o| o.commission).sum()
    }
}

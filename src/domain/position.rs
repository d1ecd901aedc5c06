//! Position tracking with weighted-average cost basis.

use serde::Serialize;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Position {
    pub symbol: String,
    pub quantity: f64,
    pub avg_cost: f64,
}

impl Position {
    pub fn new(symbol: impl Into<String>) -> Self {
        Position {
            symbol: symbol.into(),
            quantity: 0.0,
            avg_cost: 0.0,
        }
    }

    pub fn is_long(&self) -> bool {
        self.quantity > 0.0
    }

    pub fn is_short(&self) -> bool {
        self.quantity < 0.0
    }

    pub fn is_flat(&self) -> bool {
        self.quantity == 0.0
    }

    /// Signed mark-to-market value: negative for shorts.
    pub fn market_value(&self, price: f64) -> f64 {
        self.quantity * price
    }

    pub fn unrealized_pnl(&self, price: f64) -> f64 {
        self.quantity * (price - self.avg_cost)
    }

    /// Apply a signed fill of `delta` units at `price`.
    ///
    /// Adding to the position in its current direction blends the cost basis;
    /// reducing it keeps the basis; crossing through zero restarts the basis
    /// at the fill price. Returns the realized PnL of the reduced part.
    pub fn apply_fill(&mut self, delta: f64, price: f64) -> f64 {
        if delta == 0.0 {
            return 0.0;
        }

        let current = self.quantity;
        let new_qty = current + delta;

        if current == 0.0 || current.signum() == delta.signum() {
            let weighted_cost = current.abs() * self.avg_cost + delta.abs() * price;
            self.quantity = new_qty;
            self.avg_cost = weighted_cost / new_qty.abs();
            return 0.0;
        }

        let closed = delta.abs().min(current.abs());
        let realized = closed * (price - self.avg_cost) * current.signum();

        if new_qty == 0.0 {
            self.quantity = 0.0;
            self.avg_cost = 0.0;
        } else if new_qty.signum() == current.signum() {
            self.quantity = new_qty;
        } else {
            self.quantity = new_qty;
            self.avg_cost = price;
        }

        realized
    }
}

//! Orders and fills.

use chrono::NaiveDateTime;
use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Side {
    Buy,
    Sell,
}

impl Side {
    /// Side needed to move a position by a signed quantity delta.
    pub fn for_delta(delta: f64) -> Self {
        if delta > 0.0 { Side::Buy } else { Side::Sell }
    }

    /// +1 for buys, -1 for sells.
    pub fn sign(&self) -> f64 {
        match self {
            Side::Buy => 1.0,
            Side::Sell => -1.0,
        }
    }
}

impl std::fmt::Display for Side {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Side::Buy => write!(f, "buy"),
            Side::Sell => write!(f, "sell"),
        }
    }
}

/// An executed order as recorded in the ledger.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Order {
    pub symbol: String,
    pub side: Side,
    pub quantity: f64,
    pub requested_price: f64,
    pub fill_price: f64,
    pub commission: f64,
    pub timestamp: NaiveDateTime,
}

impl Order {
    pub fn notional(&self) -> f64 {
        self.quantity * self.fill_price
    }

    /// Signed change in position quantity this order caused.
    pub fn signed_quantity(&self) -> f64 {
        self.side.sign() * self.quantity
    }

    /// Cost of slippage relative to the requested price; never negative.
    pub fn slippage_cost(&self) -> f64 {
        self.side.sign() * (self.fill_price - self.requested_price) * self.quantity
    }
}

/// Instruction sent to a broker before it is filled.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OrderRequest {
    pub symbol: String,
    pub side: Side,
    pub quantity: f64,
    pub timestamp: NaiveDateTime,
}

/// Broker confirmation of an executed request.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Fill {
    pub request: OrderRequest,
    pub fill_price: f64,
    pub commission: f64,
}

impl Fill {
    pub fn into_order(self, requested_price: f64) -> Order {
        Order {
            symbol: self.request.symbol,
            side: self.request.side,
            quantity: self.request.quantity,
            requested_price,
            fill_price: self.fill_price,
            commission: self.commission,
            timestamp: self.request.timestamp,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn ts() -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2026, 1, 2)
            .unwrap()
            .and_hms_opt(16, 0, 0)
            .unwrap()
    }

    fn sample_order(side: Side, fill_price: f64) -> Order {
        Order {
            symbol: "SPY".into(),
            side,
            quantity: 10.0,
            requested_price: 100.0,
            fill_price,
            commission: 1.0,
            timestamp: ts(),
        }
    }

    #[test]
    fn side_for_delta() {
        assert_eq!(Side::for_delta(3.0), Side::Buy);
        assert_eq!(Side::for_delta(-3.0), Side::Sell);
        assert_eq!(Side::Buy.to_string(), "buy");
    }

    #[test]
    fn signed_quantity_follows_side() {
        assert_eq!(sample_order(Side::Buy, 100.0).signed_quantity(), 10.0);
        assert_eq!(sample_order(Side::Sell, 100.0).signed_quantity(), -10.0);
    }

    #[test]
    fn slippage_cost_is_positive_for_adverse_fills() {
        assert!((sample_order(Side::Buy, 100.5).slippage_cost() - 5.0).abs() < 1e-9);
        assert!((sample_order(Side::Sell, 99.5).slippage_cost() - 5.0).abs() < 1e-9);
    }

    #[test]
    fn fill_into_order_keeps_request_fields() {
        let fill = Fill {
            request: OrderRequest {
                symbol: "SPY".into(),
                side: Side::Sell,
                quantity: 2.0,
                timestamp: ts(),
            },
            fill_price: 99.0,
            commission: 0.5,
        };
        let order = fill.into_order(100.0);
        assert_eq!(order.side, Side::Sell);
        assert_eq!(order.quantity, 2.0);
        assert_eq!(order.requested_price, 100.0);
        assert_eq!(order.fill_price, 99.0);
        assert!((order.notional() - 198.0).abs() < 1e-12);
    }
}

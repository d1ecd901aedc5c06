//! Brokerage port trait.

use crate::domain::error::AetherError;
use crate::domain::order::{Fill, OrderRequest};
use crate::domain::trading::AccountSnapshot;

/// Anything that can execute orders for a single symbol account.
pub trait BrokerPort {
    /// Execute `request` against the current `market_price`.
    fn submit_order(&mut self, request: &OrderRequest, market_price: f64)
        -> Result<Fill, AetherError>;

    /// Account values marked at `market_price`.
    fn account_snapshot(&self, market_price: f64) -> AccountSnapshot;

    /// Largest buy quantity the account can fund at `market_price`, costs included.
    fn max_buy_quantity(&self, market_price: f64) -> f64;
}

//! In-process paper broker.
//!
//! Fills every order immediately at the market price moved by the configured
//! slippage, charges commission in basis points, and keeps cash and the
//! position in a [`Portfolio`].

use tracing::debug;

use crate::domain::error::AetherError;
use crate::domain::execution::{
    apply_slippage, calculate_commission, max_affordable_quantity, ExecutionConfig,
};
use crate::domain::order::{Fill, Order, OrderRequest, Side};
use crate::domain::portfolio::Portfolio;
use crate::domain::trading::AccountSnapshot;
use crate::ports::broker_port::BrokerPort;

/// Cost slack when checking a buy against available cash.
const CASH_TOLERANCE: f64 = 1e-9;

pub struct PaperBroker {
    config: ExecutionConfig,
    portfolio: Portfolio,
}

impl PaperBroker {
    pub fn new(symbol: &str, config: ExecutionConfig) -> Result<Self, AetherError> {
        config.validate()?;
        Ok(PaperBroker {
            portfolio: Portfolio::new(symbol, config.initial_cash),
            config,
        })
    }

    pub fn cash(&self) -> f64 {
        self.portfolio.cash
    }

    pub fn ledger(&self) -> &[Order] {
        &self.portfolio.ledger
    }
}

impl BrokerPort for PaperBroker {
    fn submit_order(
        &mut self,
        request: &OrderRequest,
        market_price: f64,
    ) -> Result<Fill, AetherError> {
        if request.symbol != self.portfolio.position.symbol {
            return Err(AetherError::Broker {
                reason: format!(
                    "paper account trades {}, not {}",
                    self.portfolio.position.symbol, request.symbol
                ),
            });
        }
        if !request.quantity.is_finite() || request.quantity <= 0.0 {
            return Err(AetherError::Broker {
                reason: format!("order quantity must be positive, got {}", request.quantity),
            });
        }
        if !market_price.is_finite() || market_price <= 0.0 {
            return Err(AetherError::Broker {
                reason: format!("market price must be positive, got {}", market_price),
            });
        }

        let fill_price = apply_slippage(market_price, request.side, self.config.slippage_bps);
        let commission = calculate_commission(request.quantity, fill_price, self.config.commission_bps);

        match request.side {
            Side::Buy => {
                let cost = request.quantity * fill_price + commission;
                if cost > self.portfolio.cash + CASH_TOLERANCE {
                    return Err(AetherError::Broker {
                        reason: format!(
                            "insufficient cash: order costs {:.2}, cash is {:.2}",
                            cost, self.portfolio.cash
                        ),
                    });
                }
            }
            Side::Sell => {
                let held = self.portfolio.position.quantity;
                if !self.config.allow_shorting && request.quantity > held + CASH_TOLERANCE {
                    return Err(AetherError::Broker {
                        reason: format!(
                            "insufficient position: selling {}, holding {}",
                            request.quantity, held
                        ),
                    });
                }
            }
        }

        let fill = Fill {
            request: request.clone(),
            fill_price,
            commission,
        };
        self.portfolio.settle(fill.clone().into_order(market_price));
        debug!(
            side = %request.side,
            quantity = request.quantity,
            fill_price,
            commission,
            cash = self.portfolio.cash,
            "paper fill"
        );
        Ok(fill)
    }

    fn account_snapshot(&self, market_price: f64) -> AccountSnapshot {
        let market_value = self.portfolio.position.market_value(market_price);
        AccountSnapshot {
            cash: self.portfolio.cash,
            position_quantity: self.portfolio.position.quantity,
            market_value,
            equity: self.portfolio.cash + market_value,
        }
    }

    fn max_buy_quantity(&self, market_price: f64) -> f64 {
        max_affordable_quantity(
            self.portfolio.cash,
            apply_slippage(market_price, Side::Buy, self.config.slippage_bps),
            self.config.commission_bps,
            self.config.fractional_shares,
        )
    }
}

//! Core domain types and logic.

pub mod ohlcv;
pub mod position;
pub mod portfolio;
pub mod order;
pub mod signal;
pub mod execution;
pub mod indicator;
pub mod strategy;
pub mod backtest;
pub mod metrics;
pub mod returns;
pub mod optimizer;
pub mod trading;
pub mod config_validation;
pub mod error;

//! Report output port trait.

use std::path::Path;

use crate::domain::backtest::RunResult;
use crate::domain::error::AetherError;
use crate::domain::optimizer::OptimizationResult;
use crate::domain::trading::TradingRun;

/// Port for persisting run results.
pub trait ReportPort {
    fn write_run(&self, result: &RunResult, output_path: &Path) -> Result<(), AetherError>;

    fn write_optimization(
        &self,
        result: &OptimizationResult,
        output_path: &Path,
    ) -> Result<(), AetherError>;

    fn write_trading(&self, run: &TradingRun, output_path: &Path) -> Result<(), AetherError>;
}

//! JSON report adapter.
//!
//! Writes pretty-printed JSON, creating parent directories as needed.

use std::fs;
use std::path::Path;

use serde::Serialize;
use tracing::info;

use crate::domain::backtest::RunResult;
use crate::domain::error::AetherError;
use crate::domain::optimizer::OptimizationResult;
use crate::domain::trading::TradingRun;
use crate::ports::report_port::ReportPort;

pub struct JsonReportAdapter;

impl JsonReportAdapter {
    pub fn new() -> Self {
        Self
    }

    fn write_json<T: Serialize>(&self, value: &T, path: &Path) -> Result<(), AetherError> {
        let json = serde_json::to_string_pretty(value)?;
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(path, json)?;
        info!(path = %path.display(), "report written");
        Ok(())
    }
}

impl Default for JsonReportAdapter {
    fn default() -> Self {
        Self::new()
    }
}

impl ReportPort for JsonReportAdapter {
    fn write_run(&self, result: &RunResult, output_path: &Path) -> Result<(), AetherError> {
        self.write_json(result, output_path)
    }

    fn write_optimization(
        &self,
        result: &OptimizationResult,
        output_path: &Path,
    ) -> Result<(), AetherError> {
        self.write_json(result, output_path)
    }

    fn write_trading(&self, run: &TradingRun, output_path: &Path) -> Result<(), AetherError> {
        self.write_json(run, output_path)
    }
}

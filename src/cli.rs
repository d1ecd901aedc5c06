//! CLI definition and dispatch.

use chrono::NaiveDateTime;
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use std::process::ExitCode;

use crate::adapters::csv_adapter::CsvAdapter;
use crate::adapters::file_config_adapter::FileConfigAdapter;
use crate::adapters::json_report_adapter::JsonReportAdapter;
use crate::adapters::paper_broker::PaperBroker;
use crate::domain::backtest::{self as backtest_engine, BacktestConfig, RunResult};
use crate::domain::config_validation::{
    read_date, strategy_kind, validate_backtest_config, validate_optimizer_config,
    validate_strategy_config,
};
use crate::domain::error::AetherError;
use crate::domain::execution::ExecutionConfig;
use crate::domain::optimizer::{self, OptimizationResult, OptimizerConfig};
use crate::domain::returns::ReturnMatrix;
use crate::domain::strategy::Strategy;
use crate::domain::trading::{TradingConfig, TradingEngine, TradingRun};
use crate::ports::config_port::ConfigPort;
use crate::ports::data_port::DataPort;
use crate::ports::report_port::ReportPort;

const DEFAULT_DATA_DIR: &str = "data";

#[derive(Parser, Debug)]
#[command(name = "aetherquant", about = "Strategy backtester and portfolio optimizer")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Backtest a strategy on one symbol
    Backtest {
        #[arg(short, long)]
        config: PathBuf,
        #[arg(long)]
        symbol: Option<String>,
        #[arg(long)]
        data_dir: Option<PathBuf>,
        /// Write the JSON report here instead of stdout
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
    /// Replay a strategy through the paper broker
    Papertrade {
        #[arg(short, long)]
        config: PathBuf,
        #[arg(long)]
        symbol: Option<String>,
        #[arg(long)]
        data_dir: Option<PathBuf>,
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
    /// Compute portfolio weights for several symbols
    Optimize {
        #[arg(short, long)]
        config: PathBuf,
        /// Comma-separated symbols, overriding [optimizer] symbols
        #[arg(long)]
        symbols: Option<String>,
        /// risk_parity or mean_variance
        #[arg(long)]
        method: Option<String>,
        #[arg(long)]
        data_dir: Option<PathBuf>,
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
    /// Validate a configuration file
    Validate {
        #[arg(short, long)]
        config: PathBuf,
    },
    /// List symbols available in the data directory
    ListSymbols {
        #[arg(long)]
        data_dir: Option<PathBuf>,
        #[arg(short, long)]
        config: Option<PathBuf>,
    },
}

pub fn run(cli: Cli) -> ExitCode {
    match cli.command {
        Command::Backtest {
            config,
            symbol,
            data_dir,
            output,
        } => run_backtest(&config, symbol.as_deref(), data_dir.as_deref(), output.as_deref()),
        Command::Papertrade {
            config,
            symbol,
            data_dir,
            output,
        } => run_papertrade(&config, symbol.as_deref(), data_dir.as_deref(), output.as_deref()),
        Command::Optimize {
            config,
            symbols,
            method,
            data_dir,
            output,
        } => run_optimize(
            &config,
            symbols.as_deref(),
            method.as_deref(),
            data_dir.as_deref(),
            output.as_deref(),
        ),
        Command::Validate { config } => run_validate(&config),
        Command::ListSymbols { data_dir, config } => {
            run_list_symbols(data_dir.as_deref(), config.as_deref())
        }
    }
}

pub fn load_config(path: &Path) -> Result<FileConfigAdapter, ExitCode> {
    FileConfigAdapter::from_file(path).map_err(|e| fail(&e))
}

fn fail(err: &AetherError) -> ExitCode {
    eprintln!("error: {err}");
    err.into()
}

pub fn build_execution_config(adapter: &dyn ConfigPort) -> ExecutionConfig {
    let defaults = ExecutionConfig::default();
    ExecutionConfig {
        initial_cash: adapter.get_double("backtest", "initial_cash", defaults.initial_cash),
        commission_bps: adapter.get_double("backtest", "commission_bps", defaults.commission_bps),
        slippage_bps: adapter.get_double("backtest", "slippage_bps", defaults.slippage_bps),
        allow_shorting: adapter.get_bool("backtest", "allow_shorting", defaults.allow_shorting),
        fractional_shares: adapter.get_bool(
            "backtest",
            "fractional_shares",
            defaults.fractional_shares,
        ),
    }
}

pub fn build_backtest_config(adapter: &dyn ConfigPort) -> Result<BacktestConfig, AetherError> {
    let defaults = BacktestConfig::default();
    let periods_per_year = match adapter.get_string("backtest", "periods_per_year") {
        Some(raw) => Some(raw.trim().parse::<f64>().map_err(|_| {
            AetherError::configuration("periods_per_year", format!("'{}' is not a number", raw))
        })?),
        None => None,
    };

    let config = BacktestConfig {
        execution: build_execution_config(adapter),
        risk_free_rate: adapter.get_double("backtest", "risk_free_rate", defaults.risk_free_rate),
        periods_per_year,
        include_benchmark: adapter.get_bool(
            "backtest",
            "include_benchmark",
            defaults.include_benchmark,
        ),
    };
    config.validate()?;
    Ok(config)
}

pub fn build_strategy(adapter: &dyn ConfigPort) -> Result<Strategy, AetherError> {
    let window = |key: &str, default: i64| -> Result<usize, AetherError> {
        let value = adapter.get_int("strategy", key, default);
        usize::try_from(value)
            .map_err(|_| AetherError::configuration(key, format!("{} is not a valid window", value)))
    };

    match strategy_kind(adapter).as_str() {
        "ma_cross" => Strategy::moving_average_cross(window("fast", 20)?, window("slow", 50)?),
        "momentum" => Strategy::momentum(
            window("lookback", 20)?,
            adapter.get_double("strategy", "threshold", 0.0),
        ),
        "buy_and_hold" => Ok(Strategy::BuyAndHold),
        other => Err(AetherError::configuration(
            "kind",
            format!("unknown strategy '{}'", other),
        )),
    }
}

pub fn build_optimizer_config(
    adapter: &dyn ConfigPort,
    method_override: Option<&str>,
) -> Result<OptimizerConfig, AetherError> {
    let defaults = OptimizerConfig::default();
    let method = match method_override
        .map(str::to_string)
        .or_else(|| adapter.get_string("optimizer", "method"))
    {
        Some(m) => m.parse()?,
        None => defaults.method,
    };
    let max_iterations =
        adapter.get_int("optimizer", "max_iterations", defaults.max_iterations as i64);

    let config = OptimizerConfig {
        method,
        risk_aversion: adapter.get_double("optimizer", "risk_aversion", defaults.risk_aversion),
        tolerance: adapter.get_double("optimizer", "tolerance", defaults.tolerance),
        max_iterations: usize::try_from(max_iterations).map_err(|_| {
            AetherError::configuration("max_iterations", "must be at least 1")
        })?,
        allow_short: adapter.get_bool("optimizer", "allow_short", defaults.allow_short),
        max_weight: adapter.get_double("optimizer", "max_weight", defaults.max_weight),
    };
    config.validate()?;
    Ok(config)
}

/// Paper trading is long-only unless `[backtest] allow_shorting` says otherwise.
pub fn build_trading_config(adapter: &dyn ConfigPort) -> TradingConfig {
    TradingConfig {
        allow_shorting: adapter.get_bool("backtest", "allow_shorting", false),
        fractional_shares: adapter.get_bool("backtest", "fractional_shares", false),
    }
}

pub fn resolve_symbol(symbol_override: Option<&str>, config: &dyn ConfigPort) -> Option<String> {
    symbol_override
        .map(str::to_string)
        .or_else(|| config.get_string("backtest", "symbol"))
        .map(|s| s.trim().to_uppercase())
        .filter(|s| !s.is_empty())
}

pub fn resolve_symbols(symbols_override: Option<&str>, config: &dyn ConfigPort) -> Vec<String> {
    let raw: Vec<String> = match symbols_override {
        Some(s) => s.split(',').map(str::to_string).collect(),
        None => config.get_list("optimizer", "symbols"),
    };
    raw.into_iter()
        .map(|s| s.trim().to_uppercase())
        .filter(|s| !s.is_empty())
        .collect()
}

pub fn resolve_data_dir(dir_override: Option<&Path>, config: Option<&dyn ConfigPort>) -> PathBuf {
    dir_override
        .map(Path::to_path_buf)
        .or_else(|| config.and_then(|c| c.get_string("data", "dir")).map(PathBuf::from))
        .unwrap_or_else(|| PathBuf::from(DEFAULT_DATA_DIR))
}

/// `[backtest] start_date` from midnight through `end_date` to the last second of the day.
pub fn resolve_date_range(
    config: &dyn ConfigPort,
) -> Result<(Option<NaiveDateTime>, Option<NaiveDateTime>), AetherError> {
    let start = read_date(config, "backtest", "start_date")?.and_then(|d| d.and_hms_opt(0, 0, 0));
    let end = read_date(config, "backtest", "end_date")?.and_then(|d| d.and_hms_opt(23, 59, 59));
    Ok((start, end))
}

fn print_json<T: serde::Serialize>(value: &T) -> Result<(), AetherError> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn run_backtest(
    config_path: &Path,
    symbol_override: Option<&str>,
    data_dir: Option<&Path>,
    output_path: Option<&Path>,
) -> ExitCode {
    eprintln!("Loading config from {}", config_path.display());
    let adapter = match load_config(config_path) {
        Ok(a) => a,
        Err(code) => return code,
    };

    if let Err(e) = validate_backtest_config(&adapter).and_then(|_| validate_strategy_config(&adapter)) {
        return fail(&e);
    }

    let strategy = match build_strategy(&adapter) {
        Ok(s) => s,
        Err(e) => return fail(&e),
    };
    let bt_config = match build_backtest_config(&adapter) {
        Ok(c) => c,
        Err(e) => return fail(&e),
    };
    let range = match resolve_date_range(&adapter) {
        Ok(r) => r,
        Err(e) => return fail(&e),
    };
    let Some(symbol) = resolve_symbol(symbol_override, &adapter) else {
        return fail(&AetherError::ConfigMissing {
            section: "backtest".into(),
            key: "symbol".into(),
        });
    };

    let data_port = CsvAdapter::new(resolve_data_dir(data_dir, Some(&adapter)));
    run_backtest_pipeline(&data_port, &symbol, &strategy, &bt_config, range, output_path)
}

pub fn run_backtest_pipeline(
    data_port: &dyn DataPort,
    symbol: &str,
    strategy: &Strategy,
    bt_config: &BacktestConfig,
    range: (Option<NaiveDateTime>, Option<NaiveDateTime>),
    output_path: Option<&Path>,
) -> ExitCode {
    let series = match data_port.fetch_series(symbol, range.0, range.1) {
        Ok(s) => s,
        Err(e) => return fail(&e),
    };

    eprintln!(
        "Running backtest: {} on {}, {} bars",
        strategy.name(),
        symbol,
        series.len()
    );

    let result = match backtest_engine::run_backtest(&series, strategy, bt_config) {
        Ok(r) => r,
        Err(e) => return fail(&e),
    };

    print_backtest_summary(&result);

    let written = match output_path {
        Some(path) => JsonReportAdapter::new()
            .write_run(&result, path)
            .map(|_| eprintln!("\nReport written to: {}", path.display())),
        None => print_json(&result),
    };
    match written {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => fail(&e),
    }
}

fn print_backtest_summary(result: &RunResult) {
    let m = &result.metrics;
    eprintln!("\n=== {} on {} ===", result.strategy, result.symbol);
    eprintln!("Final Equity:     {:.2}", result.final_equity);
    eprintln!("Total Return:     {:.2}%", m.total_return * 100.0);
    eprintln!("Annualized:       {:.2}%", m.annualized_return * 100.0);
    eprintln!("Volatility:       {:.2}%", m.annualized_volatility * 100.0);
    eprintln!("Sharpe Ratio:     {:.2}", m.sharpe_ratio);
    eprintln!("Sortino Ratio:    {:.2}", m.sortino_ratio);
    eprintln!("Max Drawdown:     {:.1}%", m.drawdown.max_drawdown * 100.0);
    eprintln!("Trades:           {}", result.trade_count());
    eprintln!("Commission:       {:.2}", result.total_commission);
    eprintln!("Realized PnL:     {:.2}", result.realized_pnl);
    eprintln!("Unrealized PnL:   {:.2}", result.unrealized_pnl);
    if let Some(at) = result.liquidated_at {
        eprintln!("Liquidated:       {} ({:.2} written off)", at, result.written_off);
    }

    if let Some(bench) = &result.benchmark {
        eprintln!("\n=== vs {} ===", bench.strategy);
        eprintln!("Benchmark Return: {:.2}%", bench.metrics.total_return * 100.0);
        eprintln!("Alpha:            {:.2}%", bench.comparison.alpha * 100.0);
        eprintln!("Beta:             {:.2}", bench.comparison.beta);
        eprintln!(
            "Excess Annual:    {:.2}%",
            bench.comparison.excess_annual_return * 100.0
        );
    }
}

fn run_papertrade(
    config_path: &Path,
    symbol_override: Option<&str>,
    data_dir: Option<&Path>,
    output_path: Option<&Path>,
) -> ExitCode {
    eprintln!("Loading config from {}", config_path.display());
    let adapter = match load_config(config_path) {
        Ok(a) => a,
        Err(code) => return code,
    };

    if let Err(e) = validate_backtest_config(&adapter).and_then(|_| validate_strategy_config(&adapter)) {
        return fail(&e);
    }

    let strategy = match build_strategy(&adapter) {
        Ok(s) => s,
        Err(e) => return fail(&e),
    };
    let range = match resolve_date_range(&adapter) {
        Ok(r) => r,
        Err(e) => return fail(&e),
    };
    let Some(symbol) = resolve_symbol(symbol_override, &adapter) else {
        return fail(&AetherError::ConfigMissing {
            section: "backtest".into(),
            key: "symbol".into(),
        });
    };

    let trading = build_trading_config(&adapter);
    let execution = ExecutionConfig {
        allow_shorting: trading.allow_shorting,
        ..build_execution_config(&adapter)
    };

    let data_port = CsvAdapter::new(resolve_data_dir(data_dir, Some(&adapter)));
    run_papertrade_pipeline(
        &data_port,
        &symbol,
        &strategy,
        execution,
        trading,
        range,
        output_path,
    )
}

pub fn run_papertrade_pipeline(
    data_port: &dyn DataPort,
    symbol: &str,
    strategy: &Strategy,
    execution: ExecutionConfig,
    trading: TradingConfig,
    range: (Option<NaiveDateTime>, Option<NaiveDateTime>),
    output_path: Option<&Path>,
) -> ExitCode {
    let result = paper_trade(data_port, symbol, strategy, execution, trading, range);
    let run = match result {
        Ok(r) => r,
        Err(e) => return fail(&e),
    };

    eprintln!("\n=== Paper trading {} ===", run.symbol);
    eprintln!("Orders Placed:    {}", run.orders_placed());
    if let (Some(start), Some(end)) = (run.start_equity(), run.final_equity()) {
        eprintln!("Start Equity:     {:.2}", start);
        eprintln!("Final Equity:     {:.2}", end);
    }

    let written = match output_path {
        Some(path) => JsonReportAdapter::new()
            .write_trading(&run, path)
            .map(|_| eprintln!("\nReport written to: {}", path.display())),
        None => print_json(&run),
    };
    match written {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => fail(&e),
    }
}

fn paper_trade(
    data_port: &dyn DataPort,
    symbol: &str,
    strategy: &Strategy,
    execution: ExecutionConfig,
    trading: TradingConfig,
    range: (Option<NaiveDateTime>, Option<NaiveDateTime>),
) -> Result<TradingRun, AetherError> {
    let series = data_port.fetch_series(symbol, range.0, range.1)?;
    let signals = strategy.generate(&series)?;
    eprintln!(
        "Paper trading: {} on {}, {} bars",
        strategy.name(),
        symbol,
        series.len()
    );
    let broker = PaperBroker::new(symbol, execution)?;
    TradingEngine::new(broker, trading).run(&series, &signals)
}

fn run_optimize(
    config_path: &Path,
    symbols_override: Option<&str>,
    method_override: Option<&str>,
    data_dir: Option<&Path>,
    output_path: Option<&Path>,
) -> ExitCode {
    eprintln!("Loading config from {}", config_path.display());
    let adapter = match load_config(config_path) {
        Ok(a) => a,
        Err(code) => return code,
    };

    if let Err(e) = validate_optimizer_config(&adapter).and_then(|_| validate_backtest_config(&adapter)) {
        return fail(&e);
    }

    let opt_config = match build_optimizer_config(&adapter, method_override) {
        Ok(c) => c,
        Err(e) => return fail(&e),
    };
    let range = match resolve_date_range(&adapter) {
        Ok(r) => r,
        Err(e) => return fail(&e),
    };
    let symbols = resolve_symbols(symbols_override, &adapter);
    if symbols.is_empty() {
        return fail(&AetherError::ConfigMissing {
            section: "optimizer".into(),
            key: "symbols".into(),
        });
    }

    let data_port = CsvAdapter::new(resolve_data_dir(data_dir, Some(&adapter)));
    run_optimize_pipeline(&data_port, &symbols, &opt_config, range, output_path)
}

pub fn run_optimize_pipeline(
    data_port: &dyn DataPort,
    symbols: &[String],
    opt_config: &OptimizerConfig,
    range: (Option<NaiveDateTime>, Option<NaiveDateTime>),
    output_path: Option<&Path>,
) -> ExitCode {
    let result = optimize_symbols(data_port, symbols, opt_config, range);
    let result = match result {
        Ok(r) => r,
        Err(e) => return fail(&e),
    };

    print_optimization_summary(&result);

    let written = match output_path {
        Some(path) => JsonReportAdapter::new()
            .write_optimization(&result, path)
            .map(|_| eprintln!("\nReport written to: {}", path.display())),
        None => print_json(&result),
    };
    match written {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => fail(&e),
    }
}

fn optimize_symbols(
    data_port: &dyn DataPort,
    symbols: &[String],
    opt_config: &OptimizerConfig,
    range: (Option<NaiveDateTime>, Option<NaiveDateTime>),
) -> Result<OptimizationResult, AetherError> {
    let series = symbols
        .iter()
        .map(|s| data_port.fetch_series(s, range.0, range.1))
        .collect::<Result<Vec<_>, _>>()?;
    let returns = ReturnMatrix::from_series(&series)?;
    eprintln!(
        "Optimizing {} assets over {} periods ({})",
        returns.n_assets(),
        returns.n_periods(),
        opt_config.method
    );
    optimizer::optimize(&returns, opt_config)
}

fn print_optimization_summary(result: &OptimizationResult) {
    eprintln!("\n=== {} weights ===", result.method);
    for w in &result.weights {
        eprintln!("  {:<8} {:>8.2}%", w.asset, w.weight * 100.0);
    }
    eprintln!("Objective:        {:.6}", result.objective);
    eprintln!(
        "Iterations:       {}{}",
        result.iterations,
        if result.converged { "" } else { " (not converged)" }
    );
    if result.clamped {
        eprintln!("Weights were projected onto the configured bounds");
    }
}

fn run_validate(config_path: &Path) -> ExitCode {
    eprintln!("Validating config: {}", config_path.display());
    let adapter = match load_config(config_path) {
        Ok(a) => a,
        Err(code) => return code,
    };

    let checks = [
        ("backtest", validate_backtest_config(&adapter)),
        ("strategy", validate_strategy_config(&adapter)),
        ("optimizer", validate_optimizer_config(&adapter)),
    ];
    for (section, outcome) in checks {
        match outcome {
            Ok(()) => eprintln!("  [{}] ok", section),
            Err(e) => {
                eprintln!("  [{}] invalid", section);
                return fail(&e);
            }
        }
    }

    match build_strategy(&adapter) {
        Ok(strategy) => eprintln!("\nStrategy: {}", strategy.name()),
        Err(e) => return fail(&e),
    }
    if let Err(e) = build_backtest_config(&adapter).and_then(|_| build_optimizer_config(&adapter, None)) {
        return fail(&e);
    }

    eprintln!("\nConfiguration is valid.");
    ExitCode::SUCCESS
}

fn run_list_symbols(data_dir: Option<&Path>, config_path: Option<&Path>) -> ExitCode {
    let config = match config_path.map(load_config).transpose() {
        Ok(c) => c,
        Err(code) => return code,
    };
    let dir = resolve_data_dir(data_dir, config.as_ref().map(|c| c as &dyn ConfigPort));
    list_symbols(&CsvAdapter::new(dir))
}

pub fn list_symbols(data_port: &dyn DataPort) -> ExitCode {
    let symbols = match data_port.list_symbols() {
        Ok(s) => s,
        Err(e) => return fail(&e),
    };

    if symbols.is_empty() {
        eprintln!("No symbols found");
        return ExitCode::SUCCESS;
    }

    for symbol in &symbols {
        match data_port.get_data_range(symbol) {
            Ok(Some((first, last, count))) => {
                println!("{}: {} bars, {} to {}", symbol, count, first, last)
            }
            Ok(None) => println!("{}: no data", symbol),
            Err(e) => eprintln!("error reading {}: {}", symbol, e),
        }
    }
    eprintln!("{} symbols found", symbols.len());
    ExitCode::SUCCESS
}

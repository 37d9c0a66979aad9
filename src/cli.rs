//! CLI definition and dispatch.
//!
//! The CLI only wires adapters to the domain; every decision is made in
//! [`crate::domain`].

use chrono::{NaiveDate, NaiveDateTime};
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use tracing::error;

use crate::adapters::csv_adapter::CsvAdapter;
use crate::adapters::csv_report_adapter::CsvReportAdapter;
use crate::adapters::file_config_adapter::FileConfigAdapter;
use crate::domain::engine::{BacktestResult, StrategyEngine};
use crate::domain::error::EngineError;
use crate::domain::indicator_row::{IndicatorRow, TIMESTAMP_FORMAT};
use crate::domain::metrics::Stats;
use crate::domain::regime::MarketRegime;
use crate::domain::replay::{replay, returns_match};
use crate::domain::strategy::StrategyConfig;
use crate::ports::data_port::DataPort;
use crate::ports::report_port::ReportPort;

#[derive(Parser, Debug)]
#[command(name = "regimetrader", about = "Regime-aware ensemble strategy backtester")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Run a backtest over a CSV of indicator rows
    Backtest {
        #[arg(short, long)]
        config: PathBuf,
        #[arg(short, long)]
        data: PathBuf,
        /// Trade log CSV; stats are written alongside
        #[arg(short, long)]
        output: Option<PathBuf>,
        /// First bar to include ("YYYY-MM-DD" or "YYYY-MM-DD HH:MM:SS")
        #[arg(long, value_parser = parse_bound)]
        start: Option<NaiveDateTime>,
        /// Last bar to include
        #[arg(long, value_parser = parse_bound)]
        end: Option<NaiveDateTime>,
    },
    /// Validate a strategy configuration
    Validate {
        #[arg(short, long)]
        config: PathBuf,
    },
    /// Replay a trade log through a fresh ledger
    Replay {
        #[arg(short, long)]
        config: PathBuf,
        #[arg(short, long)]
        trades: PathBuf,
        /// Fail unless the replayed total return (percent) matches this value
        #[arg(long, allow_negative_numbers = true)]
        expect_return: Option<f64>,
    },
}

pub fn run(cli: Cli) -> ExitCode {
    let result = match cli.command {
        Command::Backtest {
            config,
            data,
            output,
            start,
            end,
        } => run_backtest(&config, &data, output.as_deref(), start, end),
        Command::Validate { config } => run_validate(&config),
        Command::Replay {
            config,
            trades,
            expect_return,
        } => run_replay(&config, &trades, expect_return),
    };
    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("error: {e}");
            (&e).into()
        }
    }
}

pub fn load_strategy(path: &Path) -> Result<StrategyConfig, EngineError> {
    eprintln!("Loading config from {}", path.display());
    let adapter = FileConfigAdapter::from_file(path)?;
    StrategyConfig::from_config(&adapter)
}

fn run_backtest(
    config_path: &Path,
    data_path: &Path,
    output: Option<&Path>,
    start: Option<NaiveDateTime>,
    end: Option<NaiveDateTime>,
) -> Result<(), EngineError> {
    let strategy = load_strategy(config_path)?;
    eprintln!("Loading strategy: {}", strategy.name);

    let rows = CsvAdapter::new(data_path.to_path_buf()).fetch_rows(start, end)?;
    if rows.is_empty() {
        return Err(EngineError::Data {
            reason: format!("no rows in {}", data_path.display()),
        });
    }
    eprintln!(
        "Running backtest: {} bars, {} to {}",
        rows.len(),
        rows[0].timestamp,
        rows[rows.len() - 1].timestamp
    );

    let report = CsvReportAdapter::new();
    let mut engine = StrategyEngine::new(&strategy);
    drive(&mut engine, &rows, output, &report)?;
    let result = engine.into_result(rows.len());

    print_summary(&result);

    if let Some(path) = output {
        report.write(&result, path)?;
        eprintln!("\nTrade log written to: {}", path.display());
        eprintln!(
            "Stats written to:     {}",
            CsvReportAdapter::stats_path(path).display()
        );
    }
    Ok(())
}

/// Run every row. A run that stops early still writes the trades filled
/// before the failure to `output`.
fn drive(
    engine: &mut StrategyEngine,
    rows: &[IndicatorRow],
    output: Option<&Path>,
    report: &dyn ReportPort,
) -> Result<(), EngineError> {
    let Err(e) = engine.run(rows) else {
        return Ok(());
    };
    if let Some(path) = output {
        if let Err(write_err) = report.write_trades(engine.ledger().trades(), path) {
            error!(error = %write_err, "failed to write partial trade log");
        }
    }
    Err(e)
}

fn run_validate(config_path: &Path) -> Result<(), EngineError> {
    let strategy = load_strategy(config_path)?;

    eprintln!("\nStrategy: {}", strategy.name);
    if !strategy.description.is_empty() {
        eprintln!("  {}", strategy.description);
    }
    eprintln!("\nVoters ({}):", strategy.voters.len());
    for voter in &strategy.voters {
        eprintln!("  {:<16} {:?}", voter.id(), voter);
    }
    let consensus = &strategy.consensus;
    eprintln!("\nConsensus:");
    eprintln!("  min_votes:        {}", consensus.min_votes);
    eprintln!("  pyramiding:       {}", consensus.allow_pyramiding);
    if let Some(boost) = &consensus.time_boost {
        eprintln!(
            "  time boost:       +{} every {} minutes",
            boost.bonus, boost.period_minutes
        );
    }
    eprintln!("\nExits:");
    eprintln!("  stop_loss:        {:.2}%", strategy.exit.stop_loss * 100.0);
    for regime in MarketRegime::ALL {
        let tiers = strategy.exit.tiers_for(regime);
        eprintln!(
            "  {:<14} tp {:?} trailing {:.2}%",
            regime.to_string(),
            tiers.thresholds,
            strategy.exit.trailing_for(regime) * 100.0
        );
    }

    eprintln!("\nConfig validated successfully");
    Ok(())
}

fn run_replay(
    config_path: &Path,
    trades_path: &Path,
    expect_return: Option<f64>,
) -> Result<(), EngineError> {
    let strategy = load_strategy(config_path)?;
    let intents = CsvReportAdapter::read_intents(trades_path)?;
    eprintln!("Replaying {} intents from {}", intents.len(), trades_path.display());

    let outcome = replay(strategy.ledger.clone(), &intents)?;
    let stats = outcome.ledger.stats();
    eprintln!("\n=== Replay Results ===");
    print_stats(&stats);
    if outcome.skipped > 0 {
        eprintln!("Skipped intents:  {}", outcome.skipped);
    }

    if let Some(expected) = expect_return {
        let replayed = outcome.total_return_pct();
        if !returns_match(expected, replayed) {
            return Err(EngineError::Data {
                reason: format!(
                    "replayed return {replayed:.4}% differs from expected {expected:.4}%"
                ),
            });
        }
        eprintln!("Replayed return matches {expected:.4}%");
    }
    Ok(())
}

fn print_summary(result: &BacktestResult) {
    eprintln!("\n=== Results: {} ===", result.strategy_name);
    print_stats(&result.stats);
    eprintln!("Decisions:        {}", result.decisions);
    eprintln!("\nRegimes:");
    for regime in MarketRegime::ALL {
        let bars = result.regime_counts[regime.index()];
        if bars > 0 {
            eprintln!("  {:<14} {bars}", regime.to_string());
        }
    }
}

fn print_stats(s: &Stats) {
    eprintln!("Final Equity:     {:.2}", s.final_equity);
    eprintln!("Total Return:     {:.2}%", s.total_return_pct);
    eprintln!("Sharpe Ratio:     {:.2}", s.sharpe_ratio);
    eprintln!("Max Drawdown:     -{:.2}%", s.max_drawdown_pct);
    eprintln!("Closed Trades:    {}", s.trade_count);
    eprintln!("Win Rate:         {:.1}%", s.win_rate * 100.0);
    eprintln!("Profit Factor:    {:.2}", s.profit_factor);
}

fn parse_bound(raw: &str) -> Result<NaiveDateTime, String> {
    NaiveDateTime::parse_from_str(raw, TIMESTAMP_FORMAT)
        .or_else(|_| {
            NaiveDate::parse_from_str(raw, "%Y-%m-%d")
                .map(|d| d.and_time(chrono::NaiveTime::MIN))
        })
        .map_err(|e| format!("invalid timestamp '{raw}': {e}"))
}

//! CSV trade log and stats writer.
//!
//! The trade log is the input of `replay`, so [`CsvReportAdapter::read_intents`]
//! reads back exactly what [`ReportPort::write_trades`] writes.

use chrono::NaiveDateTime;
use rust_decimal::Decimal;
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use tracing::info;

use crate::domain::engine::BacktestResult;
use crate::domain::error::EngineError;
use crate::domain::indicator_row::TIMESTAMP_FORMAT;
use crate::domain::ledger::{TradeRecord, TradeSide};
use crate::domain::replay::TradeIntent;
use crate::ports::report_port::ReportPort;

const TRADE_HEADER: [&str; 14] = [
    "side",
    "timestamp",
    "price",
    "execution_price",
    "quantity",
    "fraction",
    "fee",
    "cash_before",
    "cash_after",
    "holdings_after",
    "equity_after",
    "realized_pnl",
    "pnl_pct",
    "reason",
];

#[derive(Debug, Default)]
pub struct CsvReportAdapter;

impl CsvReportAdapter {
    pub fn new() -> Self {
        Self
    }

    /// Stats land next to the trade log: `trades.csv` -> `trades.stats.csv`.
    pub fn stats_path(output_path: &Path) -> PathBuf {
        output_path.with_extension("stats.csv")
    }

    pub fn read_intents(path: &Path) -> Result<Vec<TradeIntent>, EngineError> {
        let mut rdr = csv::Reader::from_path(path).map_err(|e| EngineError::Data {
            reason: format!("failed to read {}: {}", path.display(), e),
        })?;

        let mut intents = Vec::new();
        for (line, result) in rdr.deserialize::<IntentRow>().enumerate() {
            let bad = |reason: String| EngineError::Data {
                reason: format!("{} line {}: {}", path.display(), line + 2, reason),
            };
            let row = result.map_err(|e| bad(e.to_string()))?;
            let side = match row.side.trim() {
                "BUY" => TradeSide::Buy,
                "SELL" => TradeSide::Sell,
                other => return Err(bad(format!("unknown side '{other}'"))),
            };
            let timestamp = NaiveDateTime::parse_from_str(row.timestamp.trim(), TIMESTAMP_FORMAT)
                .map_err(|e| bad(format!("timestamp: {e}")))?;
            let price =
                Decimal::from_str(row.price.trim()).map_err(|e| bad(format!("price: {e}")))?;
            let fraction = Decimal::from_str(row.fraction.trim())
                .map_err(|e| bad(format!("fraction: {e}")))?;
            intents.push(TradeIntent {
                timestamp,
                side,
                price,
                fraction,
                reason: row.reason,
            });
        }
        Ok(intents)
    }

    fn write_stats(&self, result: &BacktestResult, path: &Path) -> Result<(), EngineError> {
        let s = &result.stats;
        let mut wtr = csv::Writer::from_path(path).map_err(csv_error)?;
        wtr.write_record(["metric", "value"]).map_err(csv_error)?;
        let rows: [(&str, String); 14] = [
            ("strategy", result.strategy_name.clone()),
            ("bars", result.bars.to_string()),
            ("initial_capital", format!("{:.2}", s.initial_capital)),
            ("final_equity", format!("{:.2}", s.final_equity)),
            ("total_return_pct", format!("{:.4}", s.total_return_pct)),
            ("trade_count", s.trade_count.to_string()),
            ("trades_won", s.trades_won.to_string()),
            ("trades_lost", s.trades_lost.to_string()),
            ("win_rate", format!("{:.4}", s.win_rate)),
            ("avg_win_pct", format!("{:.4}", s.avg_win_pct)),
            ("avg_loss_pct", format!("{:.4}", s.avg_loss_pct)),
            ("sharpe_ratio", format!("{:.4}", s.sharpe_ratio)),
            ("max_drawdown_pct", format!("{:.4}", s.max_drawdown_pct)),
            ("profit_factor", format!("{:.4}", s.profit_factor)),
        ];
        for (metric, value) in rows {
            wtr.write_record([metric, value.as_str()]).map_err(csv_error)?;
        }
        wtr.flush()?;
        Ok(())
    }
}

impl ReportPort for CsvReportAdapter {
    fn write_trades(&self, trades: &[TradeRecord], output_path: &Path) -> Result<(), EngineError> {
        let mut wtr = csv::Writer::from_path(output_path).map_err(csv_error)?;
        wtr.write_record(TRADE_HEADER).map_err(csv_error)?;
        for t in trades {
            let opt = |v: Option<Decimal>| v.map(|d| d.to_string()).unwrap_or_default();
            wtr.write_record([
                t.side.to_string(),
                t.timestamp.format(TIMESTAMP_FORMAT).to_string(),
                t.price.to_string(),
                t.execution_price.to_string(),
                t.quantity.to_string(),
                t.fraction.to_string(),
                t.fee.to_string(),
                t.cash_before.to_string(),
                t.cash_after.to_string(),
                t.holdings_after.to_string(),
                t.equity_after.to_string(),
                opt(t.realized_pnl),
                opt(t.pnl_pct),
                t.reason.clone(),
            ])
            .map_err(csv_error)?;
        }
        wtr.flush()?;
        info!(path = %output_path.display(), trades = trades.len(), "trade log written");
        Ok(())
    }

    fn write(&self, result: &BacktestResult, output_path: &Path) -> Result<(), EngineError> {
        self.write_trades(result.ledger.trades(), output_path)?;
        self.write_stats(result, &Self::stats_path(output_path))
    }
}

/// Trade log columns needed to rebuild an intent; the rest are ignored.
#[derive(Debug, Deserialize)]
struct IntentRow {
    side: String,
    timestamp: String,
    price: String,
    fraction: String,
    reason: String,
}

fn csv_error(e: csv::Error) -> EngineError {
    if e.is_io_error() {
        match e.into_kind() {
            csv::ErrorKind::Io(io) => EngineError::Io(io),
            other => EngineError::Data {
                reason: format!("{other:?}"),
            },
        }
    } else {
        EngineError::Data {
            reason: e.to_string(),
        }
    }
}

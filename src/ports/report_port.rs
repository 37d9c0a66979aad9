//! Report generation port trait.

use std::path::Path;

use crate::domain::engine::BacktestResult;
use crate::domain::error::EngineError;
use crate::domain::ledger::TradeRecord;

/// Port for writing backtest results.
pub trait ReportPort {
    /// Write a trade log on its own, e.g. when a run stopped early.
    fn write_trades(&self, trades: &[TradeRecord], output_path: &Path) -> Result<(), EngineError>;

    /// Default implementation: the trade log only.
    fn write(&self, result: &BacktestResult, output_path: &Path) -> Result<(), EngineError> {
        self.write_trades(result.ledger.trades(), output_path)
    }
}

//! Summary statistics derived from the trade log.
//!
//! Nothing here looks at market data: equity is taken from each fill's
//! `equity_after`, per-trade returns from each sell's `pnl_pct`.

use rust_decimal::Decimal;
use rust_decimal::prelude::ToPrimitive;

use super::ledger::{TradeRecord, TradeSide};

#[derive(Debug, Clone, PartialEq)]
pub struct Stats {
    pub initial_capital: f64,
    pub final_equity: f64,
    pub total_return_pct: f64,
    /// Number of sell fills.
    pub trade_count: usize,
    pub trades_won: usize,
    pub trades_lost: usize,
    pub win_rate: f64,
    pub avg_win_pct: f64,
    pub avg_loss_pct: f64,
    /// Mean over standard deviation of per-sell returns.
    pub sharpe_ratio: f64,
    pub max_drawdown_pct: f64,
    /// Gross profit over gross loss; infinite with profits and no losses,
    /// zero with neither.
    pub profit_factor: f64,
}

impl Stats {
    pub fn from_trades(initial_capital: Decimal, trades: &[TradeRecord]) -> Self {
        let initial = to_f64(initial_capital);
        let final_equity = trades.last().map(|t| to_f64(t.equity_after)).unwrap_or(initial);
        let total_return_pct = if initial > 0.0 {
            (final_equity - initial) / initial * 100.0
        } else {
            0.0
        };

        let mut equity_curve = Vec::with_capacity(trades.len() + 1);
        equity_curve.push(initial);
        equity_curve.extend(trades.iter().map(|t| to_f64(t.equity_after)));
        let max_drawdown_pct = compute_drawdown(&equity_curve) * 100.0;

        let sells: Vec<&TradeRecord> = trades.iter().filter(|t| t.side == TradeSide::Sell).collect();
        let returns: Vec<f64> = sells
            .iter()
            .filter_map(|t| t.pnl_pct.map(to_f64))
            .collect();

        let mut trades_won = 0usize;
        let mut trades_lost = 0usize;
        let mut win_pct_sum = 0.0_f64;
        let mut loss_pct_sum = 0.0_f64;
        let mut gross_profit = 0.0_f64;
        let mut gross_loss = 0.0_f64;

        for trade in &sells {
            let pnl = trade.realized_pnl.map(to_f64).unwrap_or(0.0);
            let pct = trade.pnl_pct.map(to_f64).unwrap_or(0.0);
            if pnl > 0.0 {
                trades_won += 1;
                win_pct_sum += pct;
                gross_profit += pnl;
            } else if pnl < 0.0 {
                trades_lost += 1;
                loss_pct_sum += pct;
                gross_loss += pnl.abs();
            }
        }

        let trade_count = sells.len();
        let win_rate = if trade_count > 0 {
            trades_won as f64 / trade_count as f64
        } else {
            0.0
        };

        let avg_win_pct = if trades_won > 0 {
            win_pct_sum / trades_won as f64
        } else {
            0.0
        };

        let avg_loss_pct = if trades_lost > 0 {
            loss_pct_sum / trades_lost as f64
        } else {
            0.0
        };

        let profit_factor = if gross_loss > 0.0 {
            gross_profit / gross_loss
        } else if gross_profit > 0.0 {
            f64::INFINITY
        } else {
            0.0
        };

        Stats {
            initial_capital: initial,
            final_equity,
            total_return_pct,
            trade_count,
            trades_won,
            trades_lost,
            win_rate,
            avg_win_pct,
            avg_loss_pct,
            sharpe_ratio: compute_sharpe(&returns),
            max_drawdown_pct,
            profit_factor,
        }
    }
}

fn to_f64(value: Decimal) -> f64 {
    value.to_f64().unwrap_or(0.0)
}

/// Largest peak-to-trough decline as a fraction of the peak.
fn compute_drawdown(equity_curve: &[f64]) -> f64 {
    let Some(&first) = equity_curve.first() else {
        return 0.0;
    };

    let mut peak = first;
    let mut max_dd = 0.0_f64;
    for &equity in equity_curve {
        if equity > peak {
            peak = equity;
        } else if peak > 0.0 {
            max_dd = max_dd.max((peak - equity) / peak);
        }
    }
    max_dd
}

fn compute_sharpe(returns: &[f64]) -> f64 {
    if returns.len() < 2 {
        return 0.0;
    }
    let n = returns.len() as f64;
    let mean = returns.iter().sum::<f64>() / n;
    let variance = returns.iter().map(|r| (r - mean).powi(2)).sum::<f64>() / n;
    let stddev = variance.sqrt();
    if stddev > 0.0 { mean / stddev } else { 0.0 }
}

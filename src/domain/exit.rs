//! Dynamic exit management for one open position.
//!
//! Checks run in strict priority order and the first match wins:
//! 1. stop-loss
//! 2. regime flip into a bear regime (`MARKET_SWITCH`)
//! 3. three-tier take-profit ladder
//! 4. trailing stop
//! 5. momentum reversal (momentum-tagged entries only)
//!
//! Tier thresholds are keyed by the regime recorded at entry unless
//! [`TakeProfitKeying::LiveRegime`] is configured.

use std::fmt;

use tracing::{debug, info};

use super::error::EngineError;
use super::indicator_row::IndicatorRow;
use super::position::{EntryTag, Position, TIER_COUNT};
use super::regime::MarketRegime;

const FRACTION_EPSILON: f64 = 1e-9;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExitReason {
    StopLoss,
    MarketSwitch,
    /// Highest tier fired in this evaluation, 1-based.
    TakeProfit { tier: usize },
    TrailingStop,
    MomentumReversal,
}

impl fmt::Display for ExitReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ExitReason::StopLoss => f.write_str("STOP_LOSS"),
            ExitReason::MarketSwitch => f.write_str("MARKET_SWITCH"),
            ExitReason::TakeProfit { tier } => write!(f, "TAKE_PROFIT_{tier}"),
            ExitReason::TrailingStop => f.write_str("TRAILING_STOP"),
            ExitReason::MomentumReversal => f.write_str("MOMENTUM_REVERSAL"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ExitSignal {
    pub reason: ExitReason,
    /// Share of the currently held quantity to sell.
    pub fraction: f64,
    pub full_close: bool,
}

impl ExitSignal {
    fn full(reason: ExitReason) -> Self {
        ExitSignal {
            reason,
            fraction: 1.0,
            full_close: true,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TakeProfitKeying {
    EntryRegime,
    LiveRegime,
}

/// Profit thresholds and the share of the original position each tier sells.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TierTable {
    pub thresholds: [f64; TIER_COUNT],
    pub fractions: [f64; TIER_COUNT],
}

impl TierTable {
    pub const DEFAULT_FRACTIONS: [f64; TIER_COUNT] = [0.3, 0.3, 0.4];

    pub fn new(thresholds: [f64; TIER_COUNT]) -> Self {
        TierTable {
            thresholds,
            fractions: Self::DEFAULT_FRACTIONS,
        }
    }

    pub fn validate(&self, regime: MarketRegime) -> Result<(), EngineError> {
        let key = regime.key();
        if self.thresholds[0] <= 0.0 || self.thresholds.windows(2).any(|w| w[1] <= w[0]) {
            return Err(EngineError::invalid(
                "take_profit",
                key,
                "thresholds must be positive and strictly increasing",
            ));
        }
        if self.fractions.iter().any(|f| *f <= 0.0) {
            return Err(EngineError::invalid("take_profit", key, "fractions must be positive"));
        }
        let total: f64 = self.fractions.iter().sum();
        if (total - 1.0).abs() > FRACTION_EPSILON {
            return Err(EngineError::invalid(
                "take_profit",
                key,
                format!("fractions sum to {total}, expected 1"),
            ));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ExitConfig {
    /// Unrealized return at or below which the whole position is closed. Negative.
    pub stop_loss: f64,
    /// Indexed by [`MarketRegime::index`].
    pub take_profit: [TierTable; 7],
    /// Unrealized return that arms the trailing stop.
    pub trailing_activation: f64,
    /// Drawdown from peak that fires the armed trailing stop, per regime.
    pub trailing_stop: [f64; 7],
    pub momentum_exit: bool,
    pub keying: TakeProfitKeying,
}

impl Default for ExitConfig {
    fn default() -> Self {
        let bull_strong = TierTable::new([0.03, 0.06, 0.10]);
        let bull_moderate = TierTable::new([0.02, 0.04, 0.07]);
        let sideways = TierTable::new([0.01, 0.02, 0.035]);
        let bear = TierTable::new([0.008, 0.015, 0.025]);
        ExitConfig {
            stop_loss: -0.015,
            take_profit: [
                bull_strong,
                bull_moderate,
                sideways,
                sideways,
                sideways,
                bear,
                bear,
            ],
            trailing_activation: 0.01,
            trailing_stop: [0.03, 0.025, 0.015, 0.015, 0.015, 0.01, 0.01],
            momentum_exit: true,
            keying: TakeProfitKeying::EntryRegime,
        }
    }
}

impl ExitConfig {
    pub fn validate(&self) -> Result<(), EngineError> {
        if !(self.stop_loss < 0.0 && self.stop_loss > -1.0) {
            return Err(EngineError::invalid("exit", "stop_loss", "must be between -1 and 0"));
        }
        if self.trailing_activation < 0.0 {
            return Err(EngineError::invalid(
                "exit",
                "trailing_activation",
                "must be non-negative",
            ));
        }
        for regime in MarketRegime::ALL {
            self.take_profit[regime.index()].validate(regime)?;
            let pct = self.trailing_stop[regime.index()];
            if !(pct > 0.0 && pct < 1.0) {
                return Err(EngineError::invalid(
                    "trailing",
                    regime.key(),
                    "must be between 0 and 1",
                ));
            }
        }
        Ok(())
    }

    pub fn tiers_for(&self, regime: MarketRegime) -> &TierTable {
        &self.take_profit[regime.index()]
    }

    pub fn trailing_for(&self, regime: MarketRegime) -> f64 {
        self.trailing_stop[regime.index()]
    }
}

#[derive(Debug, Clone, Default)]
pub struct DynamicExitManager {
    config: ExitConfig,
    position: Option<Position>,
}

impl DynamicExitManager {
    pub fn new(config: ExitConfig) -> Self {
        DynamicExitManager {
            config,
            position: None,
        }
    }

    pub fn config(&self) -> &ExitConfig {
        &self.config
    }

    pub fn position(&self) -> Option<&Position> {
        self.position.as_ref()
    }

    /// Record an entry. Adding to an open position only moves the entry price
    /// to the new cost basis; regime, tag, peak and tier progress are kept.
    pub fn set_entry(&mut self, entry_price: f64, regime: MarketRegime, tag: EntryTag) {
        if !(entry_price.is_finite() && entry_price > 0.0) {
            debug!(entry_price, "ignoring entry with unusable price");
            return;
        }
        match self.position.as_mut() {
            Some(pos) => pos.entry_price = entry_price,
            None => self.position = Some(Position::open(entry_price, regime, tag)),
        }
    }

    pub fn clear(&mut self) {
        self.position = None;
    }

    /// Evaluate the open position at `price`.
    ///
    /// `current`/`previous` are the indicator rows of this bar and the one
    /// before, used by the momentum-reversal check.
    pub fn check_exit(
        &mut self,
        price: f64,
        regime: MarketRegime,
        current: Option<&IndicatorRow>,
        previous: Option<&IndicatorRow>,
    ) -> Option<ExitSignal> {
        if !(price.is_finite() && price > 0.0) {
            debug!(price, "deferring exit check on unusable price");
            return None;
        }
        let config = &self.config;
        let pos = self.position.as_mut()?;
        if !(pos.entry_price > 0.0) {
            return None;
        }

        pos.highest_price = pos.highest_price.max(price);
        let pnl = pos.unrealized_return(price);
        let table_regime = match config.keying {
            TakeProfitKeying::EntryRegime => pos.entry_regime,
            TakeProfitKeying::LiveRegime => regime,
        };

        let signal = if pnl <= config.stop_loss {
            Some(ExitSignal::full(ExitReason::StopLoss))
        } else if regime.is_bearish() {
            Some(ExitSignal::full(ExitReason::MarketSwitch))
        } else if let Some(signal) = fire_tiers(pos, config.tiers_for(table_regime), pnl) {
            Some(signal)
        } else {
            if pnl > config.trailing_activation {
                pos.trailing_armed = true;
            }
            if pos.trailing_armed
                && pos.drawdown_from_peak(price) >= config.trailing_for(table_regime)
            {
                Some(ExitSignal::full(ExitReason::TrailingStop))
            } else if config.momentum_exit
                && pos.entry_tag == EntryTag::Momentum
                && pnl > 0.0
                && momentum_crossed_down(current, previous)
            {
                Some(ExitSignal::full(ExitReason::MomentumReversal))
            } else {
                None
            }
        };

        if let Some(signal) = &signal {
            info!(
                reason = %signal.reason,
                fraction = signal.fraction,
                pnl,
                price,
                "exit triggered"
            );
            if signal.full_close {
                self.position = None;
            }
        }
        signal
    }
}

/// Fire every reachable tier in order. Tier k only fires once tier k-1 has.
fn fire_tiers(pos: &mut Position, table: &TierTable, pnl: f64) -> Option<ExitSignal> {
    let remaining_before = pos.remaining;
    let mut sold = 0.0;
    let mut highest = None;

    for tier in 0..TIER_COUNT {
        if pos.tiers_fired[tier] {
            continue;
        }
        if pnl < table.thresholds[tier] {
            break;
        }
        pos.tiers_fired[tier] = true;
        sold += table.fractions[tier];
        highest = Some(tier + 1);
    }

    let tier = highest?;
    pos.remaining = (remaining_before - sold).max(0.0);
    let full_close = pos.tiers_fired.iter().all(|&f| f) || pos.remaining <= FRACTION_EPSILON;
    let fraction = if full_close || remaining_before <= FRACTION_EPSILON {
        1.0
    } else {
        (sold / remaining_before).min(1.0)
    };
    Some(ExitSignal {
        reason: ExitReason::TakeProfit { tier },
        fraction,
        full_close,
    })
}

fn momentum_crossed_down(current: Option<&IndicatorRow>, previous: Option<&IndicatorRow>) -> bool {
    match (current, previous) {
        (Some(curr), Some(prev)) => {
            [prev.macd, prev.macd_signal, curr.macd, curr.macd_signal]
                .iter()
                .all(|v| v.is_finite())
                && prev.macd >= prev.macd_signal
                && curr.macd < curr.macd_signal
        }
        _ => false,
    }
}

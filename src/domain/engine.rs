//! Per-bar strategy driver.
//!
//! One [`StrategyEngine`] owns a classifier, a voter panel, an aggregator,
//! an exit manager and a ledger for a single strategy instance. Nothing is
//! shared between instances; the higher-timeframe regime arrives on each
//! row.

use chrono::NaiveDateTime;
use rust_decimal::Decimal;
use rust_decimal::prelude::{FromPrimitive, ToPrimitive};
use tracing::{debug, info, warn};

use super::consensus::{ConsensusAggregator, Decision};
use super::error::EngineError;
use super::exit::{DynamicExitManager, ExitSignal};
use super::indicator_row::IndicatorRow;
use super::ledger::CompoundPositionLedger;
use super::metrics::Stats;
use super::position::{EntryTag, PositionState};
use super::regime::{MarketRegime, RegimeClassifier};
use super::strategy::StrategyConfig;
use super::vote::{Vote, Voter};

const CONSENSUS_BUY: &str = "CONSENSUS_BUY";
const CONSENSUS_SELL: &str = "CONSENSUS_SELL";

/// What happened on one bar.
#[derive(Debug, Clone, PartialEq)]
pub struct BarOutcome {
    pub timestamp: NaiveDateTime,
    pub regime: MarketRegime,
    pub decision: Decision,
    /// Set when the exit manager acted; consensus is skipped on that bar.
    pub exit: Option<ExitSignal>,
    pub filled: bool,
}

#[derive(Debug, Clone)]
pub struct StrategyEngine {
    name: String,
    classifier: RegimeClassifier,
    voters: Vec<Voter>,
    aggregator: ConsensusAggregator,
    exits: DynamicExitManager,
    ledger: CompoundPositionLedger,
    last_timestamp: Option<NaiveDateTime>,
    regime_counts: [usize; 7],
    decisions: usize,
}

impl StrategyEngine {
    pub fn new(config: &StrategyConfig) -> Self {
        StrategyEngine {
            name: config.name.clone(),
            classifier: RegimeClassifier::new(config.regime.clone()),
            voters: config.voters.clone(),
            aggregator: ConsensusAggregator::new(config.consensus.clone()),
            exits: DynamicExitManager::new(config.exit.clone()),
            ledger: CompoundPositionLedger::new(config.ledger.clone()),
            last_timestamp: None,
            regime_counts: [0; 7],
            decisions: 0,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn ledger(&self) -> &CompoundPositionLedger {
        &self.ledger
    }

    pub fn exits(&self) -> &DynamicExitManager {
        &self.exits
    }

    /// Bars classified into each regime, indexed by [`MarketRegime::index`].
    pub fn regime_counts(&self) -> &[usize; 7] {
        &self.regime_counts
    }

    /// Process `history[index]`, reading nothing after it.
    ///
    /// Bars must arrive in strictly increasing timestamp order.
    pub fn on_bar(
        &mut self,
        history: &[IndicatorRow],
        index: usize,
    ) -> Result<BarOutcome, EngineError> {
        let current = history.get(index).ok_or_else(|| EngineError::Data {
            reason: format!("bar {index} is past the end of {} rows", history.len()),
        })?;
        if let Some(last) = self.last_timestamp {
            if current.timestamp <= last {
                return Err(EngineError::Data {
                    reason: format!(
                        "bar at {} does not follow {last}",
                        current.timestamp
                    ),
                });
            }
        }
        self.last_timestamp = Some(current.timestamp);
        let previous = index.checked_sub(1).and_then(|i| history.get(i));

        let regime = self
            .classifier
            .classify(current, previous, self.window(history, index));
        self.regime_counts[regime.index()] += 1;

        let mut outcome = BarOutcome {
            timestamp: current.timestamp,
            regime,
            decision: Decision::hold("no signal"),
            exit: None,
            filled: false,
        };

        let Some(price) = Decimal::from_f64(current.close).filter(|p| *p > Decimal::ZERO) else {
            warn!(timestamp = %current.timestamp, close = current.close, "skipping bar with unusable close");
            outcome.decision = Decision::hold("unusable price");
            return Ok(outcome);
        };

        if self.ledger.position_state() == PositionState::Long {
            if let Some(signal) = self
                .exits
                .check_exit(current.close, regime, Some(current), previous)
            {
                let fraction = if signal.full_close {
                    Decimal::ONE
                } else {
                    to_fraction(signal.fraction)
                };
                let reason = signal.reason.to_string();
                outcome.filled = self
                    .ledger
                    .sell(current.timestamp, price, fraction, &reason)?;
                self.sync_exits();
                outcome.decision = Decision::Sell {
                    fraction: signal.fraction,
                    reason,
                    tags: Vec::new(),
                };
                outcome.exit = Some(signal);
                self.count_fill(outcome.filled);
                return Ok(outcome);
            }
        }

        let position = self.ledger.position_state();
        let votes: Vec<Vote> = self
            .voters
            .iter()
            .map(|v| v.cast(history, index, position))
            .collect();
        let decision = self.aggregator.decide(&votes, position, current.timestamp);
        if !decision.is_hold() {
            debug!(
                timestamp = %current.timestamp,
                %regime,
                reason = decision.reason(),
                "consensus"
            );
        }

        match &decision {
            Decision::Buy { fraction, tags, .. } => {
                outcome.filled = self.ledger.buy_with_reason(
                    current.timestamp,
                    price,
                    to_fraction(*fraction),
                    CONSENSUS_BUY,
                )?;
                self.count_fill(outcome.filled);
                if outcome.filled {
                    let entry = self
                        .ledger
                        .state()
                        .weighted_entry_price
                        .to_f64()
                        .unwrap_or(current.close);
                    let tag = EntryTag::from_votes(&votes);
                    self.exits.set_entry(entry, regime, tag);
                    debug!(%tag, tags = ?tags, "entry recorded");
                }
            }
            Decision::Sell { fraction, .. } => {
                outcome.filled = self.ledger.sell(
                    current.timestamp,
                    price,
                    to_fraction(*fraction),
                    CONSENSUS_SELL,
                )?;
                self.count_fill(outcome.filled);
                self.sync_exits();
            }
            Decision::Hold { .. } => {}
        }
        outcome.decision = decision;
        Ok(outcome)
    }

    /// Drive every row in order.
    pub fn run(&mut self, rows: &[IndicatorRow]) -> Result<(), EngineError> {
        for index in 0..rows.len() {
            self.on_bar(rows, index)?;
        }
        Ok(())
    }

    pub fn into_result(self, bars: usize) -> BacktestResult {
        let stats = self.ledger.stats();
        BacktestResult {
            strategy_name: self.name,
            ledger: self.ledger,
            stats,
            bars,
            decisions: self.decisions,
            regime_counts: self.regime_counts,
        }
    }

    fn window<'a>(&self, history: &'a [IndicatorRow], index: usize) -> &'a [IndicatorRow] {
        let t = self.classifier.thresholds();
        let span = t.min_lookback().max(t.volatility_window + 1);
        let start = (index + 1).saturating_sub(span);
        &history[start..=index]
    }

    fn count_fill(&mut self, filled: bool) {
        if filled {
            self.decisions += 1;
        }
    }

    #[cfg(test)]
    pub(crate) fn ledger_mut(&mut self) -> &mut CompoundPositionLedger {
        &mut self.ledger
    }

    /// The ledger decides when a position is gone; the exit manager follows.
    fn sync_exits(&mut self) {
        if self.ledger.position_state() == PositionState::Flat && self.exits.position().is_some() {
            self.exits.clear();
        }
    }
}

fn to_fraction(value: f64) -> Decimal {
    Decimal::from_f64(value)
        .unwrap_or(Decimal::ZERO)
        .clamp(Decimal::ZERO, Decimal::ONE)
}

#[derive(Debug, Clone)]
pub struct BacktestResult {
    pub strategy_name: String,
    pub ledger: CompoundPositionLedger,
    pub stats: Stats,
    pub bars: usize,
    /// Buy and sell decisions the ledger filled, exits included.
    pub decisions: usize,
    pub regime_counts: [usize; 7],
}

/// Run one strategy over `rows` from a fresh ledger.
pub fn run_backtest(
    rows: &[IndicatorRow],
    config: &StrategyConfig,
) -> Result<BacktestResult, EngineError> {
    config.validate()?;
    let mut engine = StrategyEngine::new(config);
    info!(strategy = %config.name, bars = rows.len(), "backtest started");
    engine.run(rows)?;
    let result = engine.into_result(rows.len());
    info!(
        strategy = %result.strategy_name,
        trades = result.stats.trade_count,
        total_return_pct = result.stats.total_return_pct,
        "backtest finished"
    );
    Ok(result)
}

//! Open-position state shared by the exit manager and the engine.
//!
//! Quantity and committed capital live in the ledger's
//! [`LedgerState`](super::ledger::LedgerState); this type carries the
//! exit-side half: entry price, entry regime, entry tag, running peak and
//! take-profit progress.

use std::fmt;

use super::regime::MarketRegime;
use super::vote::{Vote, VoteDecision, VoterLayer};

/// Whether the strategy instance currently holds anything.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PositionState {
    Flat,
    Long,
}

/// What kind of agreement opened the position.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntryTag {
    /// Trend-layer voters carried the buy.
    Momentum,
    /// Oscillator-layer voters carried the buy.
    Reversion,
}

impl EntryTag {
    /// Tag by whichever fast layer cast more buy votes; ties go to `Reversion`.
    pub fn from_votes(votes: &[Vote]) -> Self {
        let count = |layer: VoterLayer| {
            votes
                .iter()
                .filter(|v| v.layer == layer && v.decision == VoteDecision::Buy)
                .count()
        };
        if count(VoterLayer::Trend) > count(VoterLayer::Oscillator) {
            EntryTag::Momentum
        } else {
            EntryTag::Reversion
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            EntryTag::Momentum => "momentum",
            EntryTag::Reversion => "reversion",
        }
    }
}

impl fmt::Display for EntryTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

pub const TIER_COUNT: usize = 3;

#[derive(Debug, Clone, PartialEq)]
pub struct Position {
    pub entry_price: f64,
    pub entry_regime: MarketRegime,
    pub entry_tag: EntryTag,
    pub highest_price: f64,
    pub tiers_fired: [bool; TIER_COUNT],
    /// Share of the original position still held, 1.0 until a tier fires.
    pub remaining: f64,
    pub trailing_armed: bool,
}

impl Position {
    pub fn open(entry_price: f64, entry_regime: MarketRegime, entry_tag: EntryTag) -> Self {
        Position {
            entry_price,
            entry_regime,
            entry_tag,
            highest_price: entry_price,
            tiers_fired: [false; TIER_COUNT],
            remaining: 1.0,
            trailing_armed: false,
        }
    }

    pub fn unrealized_return(&self, price: f64) -> f64 {
        price / self.entry_price - 1.0
    }

    pub fn drawdown_from_peak(&self, price: f64) -> f64 {
        if self.highest_price > 0.0 {
            (self.highest_price - price) / self.highest_price
        } else {
            0.0
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn vote(id: &'static str, layer: VoterLayer, decision: VoteDecision) -> Vote {
        Vote {
            voter_id: id,
            layer,
            decision,
        }
    }

    #[test]
    fn open_position_starts_clean() {
        let pos = Position::open(100.0, MarketRegime::BullStrong, EntryTag::Momentum);
        assert_eq!(pos.highest_price, 100.0);
        assert_eq!(pos.tiers_fired, [false; TIER_COUNT]);
        assert_eq!(pos.remaining, 1.0);
        assert!(!pos.trailing_armed);
    }

    #[test]
    fn unrealized_return_and_drawdown() {
        let mut pos = Position::open(100.0, MarketRegime::SidewaysUp, EntryTag::Reversion);
        assert!((pos.unrealized_return(110.0) - 0.1).abs() < 1e-12);
        assert!((pos.unrealized_return(95.0) + 0.05).abs() < 1e-12);
        pos.highest_price = 120.0;
        assert!((pos.drawdown_from_peak(108.0) - 0.1).abs() < 1e-12);
    }

    #[test]
    fn entry_tag_follows_dominant_layer() {
        let votes = vec![
            vote("ma_cross", VoterLayer::Trend, VoteDecision::Buy),
            vote("macd_cross", VoterLayer::Trend, VoteDecision::Buy),
            vote("rsi_extreme", VoterLayer::Oscillator, VoteDecision::Buy),
            vote("bollinger", VoterLayer::Oscillator, VoteDecision::Hold),
        ];
        assert_eq!(EntryTag::from_votes(&votes), EntryTag::Momentum);

        let votes = vec![
            vote("ma_cross", VoterLayer::Trend, VoteDecision::Buy),
            vote("rsi_extreme", VoterLayer::Oscillator, VoteDecision::Buy),
            vote("htf_filter", VoterLayer::HigherTimeframe, VoteDecision::Buy),
        ];
        assert_eq!(EntryTag::from_votes(&votes), EntryTag::Reversion);
    }
}

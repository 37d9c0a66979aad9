//! Vote aggregation and position sizing.
//!
//! Flat: Buy when at least `min_votes` voters say Buy. Long: Sell when at
//! least `min_votes` say Sell. Anything else is Hold. Buy size comes from a
//! monotonic vote-count lookup table rather than a per-trade Kelly estimate.

use chrono::{NaiveDateTime, Timelike};

use super::error::EngineError;
use super::position::PositionState;
use super::vote::{Vote, VoteDecision};

/// What the driver should do this bar.
#[derive(Debug, Clone, PartialEq)]
pub enum Decision {
    Buy {
        fraction: f64,
        reason: String,
        tags: Vec<String>,
    },
    Sell {
        fraction: f64,
        reason: String,
        tags: Vec<String>,
    },
    Hold {
        reason: String,
    },
}

impl Decision {
    pub fn hold(reason: impl Into<String>) -> Self {
        Decision::Hold {
            reason: reason.into(),
        }
    }

    pub fn is_hold(&self) -> bool {
        matches!(self, Decision::Hold { .. })
    }

    pub fn reason(&self) -> &str {
        match self {
            Decision::Buy { reason, .. } | Decision::Sell { reason, .. } | Decision::Hold { reason } => {
                reason
            }
        }
    }
}

/// Vote-count to capital-fraction lookup.
///
/// Steps are `(min_votes, fraction)` with strictly increasing vote counts and
/// non-decreasing fractions. A count maps to the fraction of the highest step
/// it reaches; below the first step the fraction is zero.
#[derive(Debug, Clone, PartialEq)]
pub struct SizingTable {
    steps: Vec<(usize, f64)>,
}

impl SizingTable {
    pub fn new(steps: Vec<(usize, f64)>) -> Result<Self, EngineError> {
        if steps.is_empty() {
            return Err(EngineError::invalid("consensus", "sizing", "must have at least one step"));
        }
        for (count, fraction) in &steps {
            if *count == 0 || !(*fraction > 0.0 && *fraction <= 1.0) {
                return Err(EngineError::invalid(
                    "consensus",
                    "sizing",
                    format!("step {count}:{fraction} needs count >= 1 and 0 < fraction <= 1"),
                ));
            }
        }
        for pair in steps.windows(2) {
            if pair[1].0 <= pair[0].0 || pair[1].1 < pair[0].1 {
                return Err(EngineError::invalid(
                    "consensus",
                    "sizing",
                    "vote counts must increase and fractions must not decrease",
                ));
            }
        }
        Ok(SizingTable { steps })
    }

    /// Parse `"3:0.3, 4:0.5, 5:0.8, 6:1.0"`.
    pub fn parse(text: &str) -> Result<Self, EngineError> {
        let mut steps = Vec::new();
        for part in text.split(',').map(str::trim).filter(|p| !p.is_empty()) {
            let parsed = part.split_once(':').and_then(|(count, fraction)| {
                Some((count.trim().parse::<usize>().ok()?, fraction.trim().parse::<f64>().ok()?))
            });
            match parsed {
                Some(step) => steps.push(step),
                None => {
                    return Err(EngineError::invalid(
                        "consensus",
                        "sizing",
                        format!("malformed step '{part}', expected votes:fraction"),
                    ));
                }
            }
        }
        SizingTable::new(steps)
    }

    pub fn fraction_for(&self, votes: usize) -> f64 {
        self.steps
            .iter()
            .take_while(|(count, _)| *count <= votes)
            .last()
            .map(|(_, fraction)| fraction.min(1.0))
            .unwrap_or(0.0)
    }

    pub fn first_step(&self) -> usize {
        self.steps[0].0
    }
}

impl Default for SizingTable {
    fn default() -> Self {
        SizingTable {
            steps: vec![(3, 0.3), (4, 0.5), (5, 0.8), (6, 1.0)],
        }
    }
}

/// Extra buy votes granted on the first bar of a coarser candle.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TimeBoost {
    /// Length of the coarser candle in minutes; must divide a day.
    pub period_minutes: u32,
    pub bonus: usize,
}

impl TimeBoost {
    pub fn applies(&self, timestamp: NaiveDateTime) -> bool {
        let minute_of_day = timestamp.hour() * 60 + timestamp.minute();
        self.period_minutes > 0 && minute_of_day % self.period_minutes == 0
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ConsensusConfig {
    pub min_votes: usize,
    pub sizing: SizingTable,
    pub time_boost: Option<TimeBoost>,
    /// Allow a Buy consensus to add to an open position.
    pub allow_pyramiding: bool,
}

impl Default for ConsensusConfig {
    fn default() -> Self {
        ConsensusConfig {
            min_votes: 3,
            sizing: SizingTable::default(),
            time_boost: None,
            allow_pyramiding: false,
        }
    }
}

impl ConsensusConfig {
    pub fn validate(&self, voter_count: usize) -> Result<(), EngineError> {
        if self.min_votes == 0 {
            return Err(EngineError::invalid("consensus", "min_votes", "must be at least 1"));
        }
        if self.min_votes > voter_count {
            return Err(EngineError::invalid(
                "consensus",
                "min_votes",
                format!("{} exceeds the {voter_count} enabled voters", self.min_votes),
            ));
        }
        if self.sizing.first_step() > self.min_votes {
            return Err(EngineError::invalid(
                "consensus",
                "sizing",
                "first sizing step must not exceed min_votes",
            ));
        }
        if let Some(boost) = &self.time_boost {
            if boost.period_minutes == 0 || 1440 % boost.period_minutes != 0 {
                return Err(EngineError::invalid(
                    "consensus",
                    "boost_period_minutes",
                    "must divide 1440",
                ));
            }
            if boost.bonus >= self.min_votes {
                return Err(EngineError::invalid(
                    "consensus",
                    "boost_bonus",
                    "must be smaller than min_votes",
                ));
            }
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct VoteTally {
    pub buy: usize,
    pub sell: usize,
    pub hold: usize,
}

impl VoteTally {
    pub fn count(votes: &[Vote]) -> Self {
        votes.iter().fold(VoteTally::default(), |mut tally, vote| {
            match vote.decision {
                VoteDecision::Buy => tally.buy += 1,
                VoteDecision::Sell => tally.sell += 1,
                VoteDecision::Hold => tally.hold += 1,
            }
            tally
        })
    }
}

#[derive(Debug, Clone, Default)]
pub struct ConsensusAggregator {
    config: ConsensusConfig,
}

impl ConsensusAggregator {
    pub fn new(config: ConsensusConfig) -> Self {
        ConsensusAggregator { config }
    }

    pub fn config(&self) -> &ConsensusConfig {
        &self.config
    }

    pub fn decide(
        &self,
        votes: &[Vote],
        position: PositionState,
        timestamp: NaiveDateTime,
    ) -> Decision {
        let tally = VoteTally::count(votes);
        let min_votes = self.config.min_votes;

        match position {
            PositionState::Flat => {
                let boost = match self.config.time_boost {
                    Some(b) if tally.buy > 0 && b.applies(timestamp) => b.bonus,
                    _ => 0,
                };
                // bonus < min_votes, so acting here needs at least
                // min_votes - bonus independent buy voters.
                let effective = tally.buy + boost;
                if effective < min_votes {
                    return Decision::hold(format!("buy votes {}/{min_votes}", tally.buy));
                }
                self.buy(votes, effective, tally, boost)
            }
            PositionState::Long => {
                if tally.sell >= min_votes {
                    return Decision::Sell {
                        fraction: 1.0,
                        reason: format!("consensus sell {}/{}", tally.sell, votes.len()),
                        tags: agreeing(votes, VoteDecision::Sell),
                    };
                }
                if self.config.allow_pyramiding && tally.buy >= min_votes {
                    return self.buy(votes, tally.buy, tally, 0);
                }
                Decision::hold(format!("sell votes {}/{min_votes}", tally.sell))
            }
        }
    }

    fn buy(&self, votes: &[Vote], effective: usize, tally: VoteTally, boost: usize) -> Decision {
        let fraction = self.config.sizing.fraction_for(effective);
        if fraction <= 0.0 {
            return Decision::hold(format!("no size for {effective} votes"));
        }
        let mut tags = agreeing(votes, VoteDecision::Buy);
        if boost > 0 {
            tags.push("time_boost".to_string());
        }
        Decision::Buy {
            fraction,
            reason: format!("consensus buy {}/{}", tally.buy, votes.len()),
            tags,
        }
    }
}

fn agreeing(votes: &[Vote], decision: VoteDecision) -> Vec<String> {
    votes
        .iter()
        .filter(|v| v.decision == decision)
        .map(|v| v.voter_id.to_string())
        .collect()
}

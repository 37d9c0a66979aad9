//! Independent voters.
//!
//! Each [`Voter`] reads the indicator history up to and including `index`
//! and returns Buy, Sell or Hold. Voters hold only their parameters; a voter
//! that cannot compute (index out of range, not enough bars, indicator not
//! finite) votes Hold.
//!
//! Voters are grouped in layers:
//! - `Oscillator`: RSI extremes, volume spikes, Bollinger mean reversion
//! - `Trend`: moving-average cross, MACD cross, ADX trend strength, price momentum
//! - `HigherTimeframe`: the slower timeframe's regime as a directional filter

use std::fmt;

use super::error::EngineError;
use super::indicator_row::IndicatorRow;
use super::position::PositionState;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum VoteDecision {
    Buy,
    Sell,
    Hold,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum VoterLayer {
    Oscillator,
    Trend,
    HigherTimeframe,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Vote {
    pub voter_id: &'static str,
    pub layer: VoterLayer,
    pub decision: VoteDecision,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Voter {
    /// Buy below `oversold`, sell above `overbought`.
    RsiExtreme { oversold: f64, overbought: f64 },
    /// Volume at least `multiplier` times its average; candle colour picks the side.
    VolumeSpike { multiplier: f64 },
    /// Close outside the Bollinger bands; while long, a close back above the
    /// middle band counts as a sell.
    BollingerReversion,
    /// Short MA crossing the long MA.
    MaCross,
    /// MACD line crossing its signal line.
    MacdCross,
    /// ADX above `min_adx`, direction from the DI lines.
    AdxTrend { min_adx: f64 },
    /// Close-to-close change over `lookback` bars beyond `threshold`.
    PriceMomentum { lookback: usize, threshold: f64 },
    /// Slower timeframe regime: bullish buys, bearish sells.
    HigherTimeframe,
}

impl Voter {
    pub const NAMES: [&'static str; 8] = [
        "rsi_extreme",
        "volume_spike",
        "bollinger",
        "ma_cross",
        "macd_cross",
        "adx_trend",
        "price_momentum",
        "htf_filter",
    ];

    /// The default panel: every voter with default parameters.
    pub fn default_panel() -> Vec<Voter> {
        Voter::NAMES
            .iter()
            .filter_map(|name| Voter::with_defaults(name))
            .collect()
    }

    pub fn with_defaults(name: &str) -> Option<Voter> {
        let voter = match name {
            "rsi_extreme" => Voter::RsiExtreme {
                oversold: 30.0,
                overbought: 70.0,
            },
            "volume_spike" => Voter::VolumeSpike { multiplier: 2.0 },
            "bollinger" => Voter::BollingerReversion,
            "ma_cross" => Voter::MaCross,
            "macd_cross" => Voter::MacdCross,
            "adx_trend" => Voter::AdxTrend { min_adx: 25.0 },
            "price_momentum" => Voter::PriceMomentum {
                lookback: 5,
                threshold: 0.01,
            },
            "htf_filter" => Voter::HigherTimeframe,
            _ => return None,
        };
        Some(voter)
    }

    pub fn id(&self) -> &'static str {
        match self {
            Voter::RsiExtreme { .. } => "rsi_extreme",
            Voter::VolumeSpike { .. } => "volume_spike",
            Voter::BollingerReversion => "bollinger",
            Voter::MaCross => "ma_cross",
            Voter::MacdCross => "macd_cross",
            Voter::AdxTrend { .. } => "adx_trend",
            Voter::PriceMomentum { .. } => "price_momentum",
            Voter::HigherTimeframe => "htf_filter",
        }
    }

    pub fn layer(&self) -> VoterLayer {
        match self {
            Voter::RsiExtreme { .. } | Voter::VolumeSpike { .. } | Voter::BollingerReversion => {
                VoterLayer::Oscillator
            }
            Voter::MaCross
            | Voter::MacdCross
            | Voter::AdxTrend { .. }
            | Voter::PriceMomentum { .. } => VoterLayer::Trend,
            Voter::HigherTimeframe => VoterLayer::HigherTimeframe,
        }
    }

    pub fn validate(&self) -> Result<(), EngineError> {
        let section = format!("voter.{}", self.id());
        match self {
            Voter::RsiExtreme {
                oversold,
                overbought,
            } => {
                if !(0.0 < *oversold && oversold < overbought && *overbought < 100.0) {
                    return Err(EngineError::invalid(
                        &section,
                        "oversold",
                        "must satisfy 0 < oversold < overbought < 100",
                    ));
                }
            }
            Voter::VolumeSpike { multiplier } => {
                if *multiplier <= 1.0 {
                    return Err(EngineError::invalid(
                        &section,
                        "multiplier",
                        "must be greater than 1",
                    ));
                }
            }
            Voter::AdxTrend { min_adx } => {
                if !(0.0..100.0).contains(min_adx) {
                    return Err(EngineError::invalid(
                        &section,
                        "min_adx",
                        "must be between 0 and 100",
                    ));
                }
            }
            Voter::PriceMomentum {
                lookback,
                threshold,
            } => {
                if *lookback == 0 {
                    return Err(EngineError::invalid(&section, "lookback", "must be at least 1"));
                }
                if *threshold <= 0.0 {
                    return Err(EngineError::invalid(&section, "threshold", "must be positive"));
                }
            }
            Voter::BollingerReversion
            | Voter::MaCross
            | Voter::MacdCross
            | Voter::HigherTimeframe => {}
        }
        Ok(())
    }

    /// Vote at `index`, reading nothing past it.
    pub fn vote(
        &self,
        history: &[IndicatorRow],
        index: usize,
        position: PositionState,
    ) -> VoteDecision {
        let Some(current) = history.get(index) else {
            return VoteDecision::Hold;
        };
        let previous = index.checked_sub(1).and_then(|i| history.get(i));

        match self {
            Voter::RsiExtreme {
                oversold,
                overbought,
            } => {
                if !current.rsi.is_finite() {
                    VoteDecision::Hold
                } else if current.rsi < *oversold {
                    VoteDecision::Buy
                } else if current.rsi > *overbought {
                    VoteDecision::Sell
                } else {
                    VoteDecision::Hold
                }
            }
            Voter::VolumeSpike { multiplier } => {
                if !(current.volume_ma.is_finite() && current.volume_ma > 0.0) {
                    return VoteDecision::Hold;
                }
                if current.volume < current.volume_ma * multiplier {
                    VoteDecision::Hold
                } else if current.close > current.open {
                    VoteDecision::Buy
                } else if current.close < current.open {
                    VoteDecision::Sell
                } else {
                    VoteDecision::Hold
                }
            }
            Voter::BollingerReversion => {
                if !(current.bb_lower.is_finite()
                    && current.bb_middle.is_finite()
                    && current.bb_upper.is_finite())
                {
                    return VoteDecision::Hold;
                }
                if current.close < current.bb_lower {
                    VoteDecision::Buy
                } else if current.close > current.bb_upper
                    || (position == PositionState::Long && current.close >= current.bb_middle)
                {
                    VoteDecision::Sell
                } else {
                    VoteDecision::Hold
                }
            }
            Voter::MaCross => match previous {
                Some(prev) => cross(
                    (prev.sma_short, prev.sma_long),
                    (current.sma_short, current.sma_long),
                ),
                None => VoteDecision::Hold,
            },
            Voter::MacdCross => match previous {
                Some(prev) => cross(
                    (prev.macd, prev.macd_signal),
                    (current.macd, current.macd_signal),
                ),
                None => VoteDecision::Hold,
            },
            Voter::AdxTrend { min_adx } => {
                if !(current.adx.is_finite()
                    && current.plus_di.is_finite()
                    && current.minus_di.is_finite())
                {
                    return VoteDecision::Hold;
                }
                if current.adx < *min_adx {
                    VoteDecision::Hold
                } else if current.plus_di > current.minus_di {
                    VoteDecision::Buy
                } else if current.minus_di > current.plus_di {
                    VoteDecision::Sell
                } else {
                    VoteDecision::Hold
                }
            }
            Voter::PriceMomentum {
                lookback,
                threshold,
            } => {
                let Some(base) = index.checked_sub(*lookback).and_then(|i| history.get(i)) else {
                    return VoteDecision::Hold;
                };
                match current.return_from(base) {
                    Some(change) if change > *threshold => VoteDecision::Buy,
                    Some(change) if change < -threshold => VoteDecision::Sell,
                    _ => VoteDecision::Hold,
                }
            }
            Voter::HigherTimeframe => match current.htf_regime {
                Some(regime) if regime.is_bullish() => VoteDecision::Buy,
                Some(regime) if regime.is_bearish() => VoteDecision::Sell,
                _ => VoteDecision::Hold,
            },
        }
    }

    /// Vote and wrap the decision with this voter's identity.
    pub fn cast(&self, history: &[IndicatorRow], index: usize, position: PositionState) -> Vote {
        Vote {
            voter_id: self.id(),
            layer: self.layer(),
            decision: self.vote(history, index, position),
        }
    }
}

impl fmt::Display for Voter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.id())
    }
}

/// Buy on an upward cross of `fast` through `slow`, sell on a downward one.
fn cross(prev: (f64, f64), curr: (f64, f64)) -> VoteDecision {
    let (prev_fast, prev_slow) = prev;
    let (curr_fast, curr_slow) = curr;
    if ![prev_fast, prev_slow, curr_fast, curr_slow]
        .iter()
        .all(|v| v.is_finite())
    {
        return VoteDecision::Hold;
    }
    if prev_fast <= prev_slow && curr_fast > curr_slow {
        VoteDecision::Buy
    } else if prev_fast >= prev_slow && curr_fast < curr_slow {
        VoteDecision::Sell
    } else {
        VoteDecision::Hold
    }
}

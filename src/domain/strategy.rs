//! Strategy configuration.
//!
//! A strategy variant is a configuration of one shared engine: regime
//! thresholds, the enabled voter panel, consensus sizing, exit tables and
//! ledger costs. [`StrategyConfig::from_config`] reads it from a
//! [`ConfigPort`] and validates every part before returning.

use std::str::FromStr;

use rust_decimal::Decimal;

use crate::domain::consensus::{ConsensusConfig, SizingTable, TimeBoost};
use crate::domain::error::EngineError;
use crate::domain::exit::{ExitConfig, TakeProfitKeying, TierTable};
use crate::domain::ledger::LedgerConfig;
use crate::domain::position::TIER_COUNT;
use crate::domain::regime::{MarketRegime, RegimeThresholds};
use crate::domain::vote::Voter;
use crate::ports::config_port::ConfigPort;

#[derive(Debug, Clone, PartialEq)]
pub struct StrategyConfig {
    pub name: String,
    pub description: String,
    pub regime: RegimeThresholds,
    pub voters: Vec<Voter>,
    pub consensus: ConsensusConfig,
    pub exit: ExitConfig,
    pub ledger: LedgerConfig,
}

impl Default for StrategyConfig {
    fn default() -> Self {
        StrategyConfig {
            name: "Unnamed".into(),
            description: String::new(),
            regime: RegimeThresholds::default(),
            voters: Voter::default_panel(),
            consensus: ConsensusConfig::default(),
            exit: ExitConfig::default(),
            ledger: LedgerConfig::default(),
        }
    }
}

impl StrategyConfig {
    pub fn validate(&self) -> Result<(), EngineError> {
        self.regime.validate()?;
        if self.voters.is_empty() {
            return Err(EngineError::invalid("voters", "enabled", "at least one voter is required"));
        }
        for voter in &self.voters {
            voter.validate()?;
        }
        self.consensus.validate(self.voters.len())?;
        self.exit.validate()?;
        self.ledger.validate()?;
        Ok(())
    }

    pub fn from_config(config: &dyn ConfigPort) -> Result<Self, EngineError> {
        let strategy = StrategyConfig {
            name: config.require_string("strategy", "name")?,
            description: config
                .get_string("strategy", "description")
                .unwrap_or_default(),
            regime: read_regime(config)?,
            voters: read_voters(config)?,
            consensus: read_consensus(config)?,
            exit: read_exit(config)?,
            ledger: read_ledger(config)?,
        };
        strategy.validate()?;
        Ok(strategy)
    }
}

fn read_regime(config: &dyn ConfigPort) -> Result<RegimeThresholds, EngineError> {
    let d = RegimeThresholds::default();
    Ok(RegimeThresholds {
        slope_lookback: get_usize(config, "regime", "slope_lookback", d.slope_lookback)?,
        volatility_window: get_usize(config, "regime", "volatility_window", d.volatility_window)?,
        strong_slope: config.get_double("regime", "strong_slope", d.strong_slope)?,
        moderate_slope: config.get_double("regime", "moderate_slope", d.moderate_slope)?,
        strong_momentum: config.get_double("regime", "strong_momentum", d.strong_momentum)?,
        moderate_momentum: config.get_double("regime", "moderate_momentum", d.moderate_momentum)?,
        strong_trend_strength: config.get_double(
            "regime",
            "strong_trend_strength",
            d.strong_trend_strength,
        )?,
        flat_band: config.get_double("regime", "flat_band", d.flat_band)?,
    })
}

fn read_voters(config: &dyn ConfigPort) -> Result<Vec<Voter>, EngineError> {
    let names = config
        .get_list("voters", "enabled")
        .unwrap_or_else(|| Voter::NAMES.iter().map(|n| n.to_string()).collect());

    let mut voters = Vec::with_capacity(names.len());
    for name in &names {
        let voter = match Voter::with_defaults(name) {
            Some(v) => v,
            None => {
                return Err(EngineError::invalid(
                    "voters",
                    "enabled",
                    format!("unknown voter '{name}'"),
                ));
            }
        };
        if voters.iter().any(|v: &Voter| v.id() == voter.id()) {
            return Err(EngineError::invalid(
                "voters",
                "enabled",
                format!("voter '{name}' listed twice"),
            ));
        }
        voters.push(with_params(config, voter)?);
    }
    Ok(voters)
}

fn with_params(config: &dyn ConfigPort, voter: Voter) -> Result<Voter, EngineError> {
    let voter = match voter {
        Voter::RsiExtreme {
            oversold,
            overbought,
        } => Voter::RsiExtreme {
            oversold: config.get_double("voters", "rsi_oversold", oversold)?,
            overbought: config.get_double("voters", "rsi_overbought", overbought)?,
        },
        Voter::VolumeSpike { multiplier } => Voter::VolumeSpike {
            multiplier: config.get_double("voters", "volume_multiplier", multiplier)?,
        },
        Voter::AdxTrend { min_adx } => Voter::AdxTrend {
            min_adx: config.get_double("voters", "adx_min", min_adx)?,
        },
        Voter::PriceMomentum {
            lookback,
            threshold,
        } => Voter::PriceMomentum {
            lookback: get_usize(config, "voters", "momentum_lookback", lookback)?,
            threshold: config.get_double("voters", "momentum_threshold", threshold)?,
        },
        other => other,
    };
    Ok(voter)
}

fn read_consensus(config: &dyn ConfigPort) -> Result<ConsensusConfig, EngineError> {
    let d = ConsensusConfig::default();
    let sizing = match config.get_string("consensus", "sizing") {
        Some(text) => SizingTable::parse(&text)?,
        None => d.sizing,
    };
    let time_boost = match config.get_string("consensus", "boost_period_minutes") {
        Some(_) => Some(TimeBoost {
            period_minutes: get_minutes(config, "consensus", "boost_period_minutes")?,
            bonus: get_usize(config, "consensus", "boost_bonus", 1)?,
        }),
        None => None,
    };
    Ok(ConsensusConfig {
        min_votes: get_usize(config, "consensus", "min_votes", d.min_votes)?,
        sizing,
        time_boost,
        allow_pyramiding: config.get_bool("consensus", "allow_pyramiding", d.allow_pyramiding)?,
    })
}

fn read_exit(config: &dyn ConfigPort) -> Result<ExitConfig, EngineError> {
    let d = ExitConfig::default();

    let keying = match config.get_string("exit", "take_profit_keying").as_deref() {
        None | Some("entry") => TakeProfitKeying::EntryRegime,
        Some("live") => TakeProfitKeying::LiveRegime,
        Some(other) => {
            return Err(EngineError::invalid(
                "exit",
                "take_profit_keying",
                format!("expected 'entry' or 'live', got '{other}'"),
            ));
        }
    };

    let shared_fractions = match config.get_list("take_profit", "fractions") {
        Some(items) => Some(parse_triple(&items, "take_profit", "fractions")?),
        None => None,
    };

    let mut take_profit = d.take_profit;
    let mut trailing_stop = d.trailing_stop;
    for regime in MarketRegime::ALL {
        let slot = regime.index();
        if let Some(items) = config.get_list("take_profit", regime.key()) {
            take_profit[slot].thresholds = parse_triple(&items, "take_profit", regime.key())?;
        }
        let fractions_key = format!("{}_fractions", regime.key());
        take_profit[slot].fractions = match config.get_list("take_profit", &fractions_key) {
            Some(items) => parse_triple(&items, "take_profit", &fractions_key)?,
            None => shared_fractions.unwrap_or(TierTable::DEFAULT_FRACTIONS),
        };
        trailing_stop[slot] = config.get_double("trailing", regime.key(), trailing_stop[slot])?;
    }

    Ok(ExitConfig {
        stop_loss: config.get_double("exit", "stop_loss", d.stop_loss)?,
        take_profit,
        trailing_activation: config.get_double(
            "exit",
            "trailing_activation",
            d.trailing_activation,
        )?,
        trailing_stop,
        momentum_exit: config.get_bool("exit", "momentum_exit", d.momentum_exit)?,
        keying,
    })
}

fn read_ledger(config: &dyn ConfigPort) -> Result<LedgerConfig, EngineError> {
    let d = LedgerConfig::default();
    Ok(LedgerConfig {
        initial_capital: get_decimal(config, "backtest", "initial_capital", d.initial_capital)?,
        fee_rate: get_decimal(config, "backtest", "fee_rate", d.fee_rate)?,
        slippage_rate: get_decimal(config, "backtest", "slippage_rate", d.slippage_rate)?,
    })
}

/// Money values are parsed from text so they never pass through `f64`.
fn get_decimal(
    config: &dyn ConfigPort,
    section: &str,
    key: &str,
    default: Decimal,
) -> Result<Decimal, EngineError> {
    match config.get_string(section, key) {
        None => Ok(default),
        Some(raw) => Decimal::from_str(raw.trim())
            .or_else(|_| Decimal::from_scientific(raw.trim()))
            .map_err(|_| EngineError::invalid(section, key, format!("'{raw}' is not a number"))),
    }
}

fn get_usize(
    config: &dyn ConfigPort,
    section: &str,
    key: &str,
    default: usize,
) -> Result<usize, EngineError> {
    let value = config.get_int(section, key, default as i64)?;
    usize::try_from(value)
        .map_err(|_| EngineError::invalid(section, key, format!("{value} must be non-negative")))
}

fn get_minutes(config: &dyn ConfigPort, section: &str, key: &str) -> Result<u32, EngineError> {
    let value = get_usize(config, section, key, 0)?;
    u32::try_from(value)
        .map_err(|_| EngineError::invalid(section, key, format!("{value} minutes is out of range")))
}

fn parse_triple(
    items: &[String],
    section: &str,
    key: &str,
) -> Result<[f64; TIER_COUNT], EngineError> {
    if items.len() != TIER_COUNT {
        return Err(EngineError::invalid(
            section,
            key,
            format!("expected {TIER_COUNT} values, got {}", items.len()),
        ));
    }
    let mut out = [0.0; TIER_COUNT];
    for (slot, item) in out.iter_mut().zip(items) {
        *slot = item
            .parse::<f64>()
            .map_err(|_| EngineError::invalid(section, key, format!("'{item}' is not a number")))?;
    }
    Ok(out)
}

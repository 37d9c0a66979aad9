//! Market regime classification.
//!
//! [`RegimeClassifier::classify`] maps the current and previous indicator
//! rows plus a trailing window into one of seven regimes. Rules run most
//! specific first: STRONG before MODERATE, direction before the sideways
//! split. Too little history or unusable indicator values classify as
//! `SIDEWAYS_FLAT`.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use tracing::debug;

use super::error::EngineError;
use super::indicator_row::IndicatorRow;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum MarketRegime {
    BullStrong,
    BullModerate,
    SidewaysUp,
    SidewaysFlat,
    SidewaysDown,
    BearModerate,
    BearStrong,
}

impl MarketRegime {
    pub const ALL: [MarketRegime; 7] = [
        MarketRegime::BullStrong,
        MarketRegime::BullModerate,
        MarketRegime::SidewaysUp,
        MarketRegime::SidewaysFlat,
        MarketRegime::SidewaysDown,
        MarketRegime::BearModerate,
        MarketRegime::BearStrong,
    ];

    /// Position in [`MarketRegime::ALL`], used to index per-regime tables.
    pub fn index(self) -> usize {
        match self {
            MarketRegime::BullStrong => 0,
            MarketRegime::BullModerate => 1,
            MarketRegime::SidewaysUp => 2,
            MarketRegime::SidewaysFlat => 3,
            MarketRegime::SidewaysDown => 4,
            MarketRegime::BearModerate => 5,
            MarketRegime::BearStrong => 6,
        }
    }

    pub fn is_bullish(self) -> bool {
        matches!(self, MarketRegime::BullStrong | MarketRegime::BullModerate)
    }

    pub fn is_bearish(self) -> bool {
        matches!(self, MarketRegime::BearStrong | MarketRegime::BearModerate)
    }

    /// Config key for this regime, e.g. `bull_strong`.
    pub fn key(self) -> &'static str {
        match self {
            MarketRegime::BullStrong => "bull_strong",
            MarketRegime::BullModerate => "bull_moderate",
            MarketRegime::SidewaysUp => "sideways_up",
            MarketRegime::SidewaysFlat => "sideways_flat",
            MarketRegime::SidewaysDown => "sideways_down",
            MarketRegime::BearModerate => "bear_moderate",
            MarketRegime::BearStrong => "bear_strong",
        }
    }
}

impl fmt::Display for MarketRegime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.key().to_uppercase())
    }
}

impl FromStr for MarketRegime {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let lowered = s.trim().to_lowercase();
        MarketRegime::ALL
            .into_iter()
            .find(|r| r.key() == lowered)
            .ok_or_else(|| format!("unknown market regime '{s}'"))
    }
}

/// Thresholds consumed by the classifier.
#[derive(Debug, Clone, PartialEq)]
pub struct RegimeThresholds {
    /// Bars between the moving-average samples used for the slope.
    pub slope_lookback: usize,
    /// Number of trailing returns used for the volatility reading.
    pub volatility_window: usize,
    pub strong_slope: f64,
    pub moderate_slope: f64,
    /// Momentum (0-100) a bull regime needs; bear regimes mirror it as `100 - x`.
    pub strong_momentum: f64,
    pub moderate_momentum: f64,
    /// Trend strength (0-100) required by the STRONG regimes only.
    pub strong_trend_strength: f64,
    /// Slope magnitude below which a sideways market is FLAT.
    pub flat_band: f64,
}

impl Default for RegimeThresholds {
    fn default() -> Self {
        RegimeThresholds {
            slope_lookback: 10,
            volatility_window: 20,
            strong_slope: 0.02,
            moderate_slope: 0.005,
            strong_momentum: 60.0,
            moderate_momentum: 55.0,
            strong_trend_strength: 25.0,
            flat_band: 0.002,
        }
    }
}

impl RegimeThresholds {
    pub fn validate(&self) -> Result<(), EngineError> {
        if self.slope_lookback == 0 {
            return Err(EngineError::invalid("regime", "slope_lookback", "must be at least 1"));
        }
        if self.volatility_window < 2 {
            return Err(EngineError::invalid(
                "regime",
                "volatility_window",
                "must be at least 2",
            ));
        }
        if !(self.moderate_slope > 0.0 && self.strong_slope >= self.moderate_slope) {
            return Err(EngineError::invalid(
                "regime",
                "strong_slope",
                "slopes must satisfy 0 < moderate_slope <= strong_slope",
            ));
        }
        if !(50.0..=100.0).contains(&self.moderate_momentum)
            || !(self.moderate_momentum..=100.0).contains(&self.strong_momentum)
        {
            return Err(EngineError::invalid(
                "regime",
                "strong_momentum",
                "momentum thresholds must satisfy 50 <= moderate <= strong <= 100",
            ));
        }
        if !(0.0..=100.0).contains(&self.strong_trend_strength) {
            return Err(EngineError::invalid(
                "regime",
                "strong_trend_strength",
                "must be between 0 and 100",
            ));
        }
        if self.flat_band < 0.0 || self.flat_band >= self.moderate_slope {
            return Err(EngineError::invalid(
                "regime",
                "flat_band",
                "must be non-negative and below moderate_slope",
            ));
        }
        Ok(())
    }

    /// Minimum number of window rows needed before anything but FLAT is reported.
    pub fn min_lookback(&self) -> usize {
        self.slope_lookback + 1
    }
}

/// Raw readings behind a classification.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RegimeSignals {
    pub slope: f64,
    pub momentum: f64,
    pub trend_strength: f64,
    pub volatility: f64,
}

#[derive(Debug, Clone, Default)]
pub struct RegimeClassifier {
    thresholds: RegimeThresholds,
}

impl RegimeClassifier {
    pub fn new(thresholds: RegimeThresholds) -> Self {
        RegimeClassifier { thresholds }
    }

    pub fn thresholds(&self) -> &RegimeThresholds {
        &self.thresholds
    }

    /// Classify the market at `current`.
    ///
    /// `window` is the trailing run of rows ending at `current` (inclusive).
    pub fn classify(
        &self,
        current: &IndicatorRow,
        previous: Option<&IndicatorRow>,
        window: &[IndicatorRow],
    ) -> MarketRegime {
        match self.measure(current, previous, window) {
            Some(signals) => self.regime_for(&signals),
            None => MarketRegime::SidewaysFlat,
        }
    }

    /// Compute slope, momentum, trend strength and volatility, or `None` when
    /// the window is too short or the needed indicators are not finite.
    pub fn measure(
        &self,
        current: &IndicatorRow,
        previous: Option<&IndicatorRow>,
        window: &[IndicatorRow],
    ) -> Option<RegimeSignals> {
        let t = &self.thresholds;
        if window.len() < t.min_lookback() {
            debug!(
                bars = window.len(),
                needed = t.min_lookback(),
                "insufficient history for regime"
            );
            return None;
        }

        let ma_now = current.sma_long;
        let ma_then = window[window.len() - 1 - t.slope_lookback].sma_long;
        if !ma_now.is_finite() || !ma_then.is_finite() || ma_then <= 0.0 {
            return None;
        }
        let slope = (ma_now - ma_then) / ma_then;

        if !current.rsi.is_finite() || !current.adx.is_finite() {
            return None;
        }
        // Averaging with the previous bar damps single-bar momentum spikes.
        let momentum = match previous.map(|p| p.rsi).filter(|v| v.is_finite()) {
            Some(prev_rsi) => (current.rsi + prev_rsi) / 2.0,
            None => current.rsi,
        }
        .clamp(0.0, 100.0);
        let trend_strength = current.adx.clamp(0.0, 100.0);

        let volatility = return_volatility(window, t.volatility_window);

        Some(RegimeSignals {
            slope,
            momentum,
            trend_strength,
            volatility,
        })
    }

    /// Apply the ordered rules to precomputed readings.
    pub fn regime_for(&self, s: &RegimeSignals) -> MarketRegime {
        let t = &self.thresholds;

        if s.slope >= t.strong_slope
            && s.momentum >= t.strong_momentum
            && s.trend_strength >= t.strong_trend_strength
        {
            return MarketRegime::BullStrong;
        }
        if s.slope <= -t.strong_slope
            && s.momentum <= 100.0 - t.strong_momentum
            && s.trend_strength >= t.strong_trend_strength
        {
            return MarketRegime::BearStrong;
        }
        if s.slope >= t.moderate_slope && s.momentum >= t.moderate_momentum {
            return MarketRegime::BullModerate;
        }
        if s.slope <= -t.moderate_slope && s.momentum <= 100.0 - t.moderate_momentum {
            return MarketRegime::BearModerate;
        }

        if s.slope > t.flat_band {
            MarketRegime::SidewaysUp
        } else if s.slope < -t.flat_band {
            MarketRegime::SidewaysDown
        } else {
            MarketRegime::SidewaysFlat
        }
    }
}

/// Population standard deviation of the last `max_returns` close-to-close returns.
fn return_volatility(window: &[IndicatorRow], max_returns: usize) -> f64 {
    let returns: Vec<f64> = window
        .windows(2)
        .filter_map(|w| w[1].return_from(&w[0]))
        .collect();
    let start = returns.len().saturating_sub(max_returns);
    let recent = &returns[start..];
    if recent.len() < 2 {
        return 0.0;
    }
    let n = recent.len() as f64;
    let mean = recent.iter().sum::<f64>() / n;
    let variance = recent.iter().map(|r| (r - mean).powi(2)).sum::<f64>() / n;
    variance.sqrt()
}

//! Indicator row: one bar of OHLCV data with its precomputed indicators.
//!
//! Rows are produced upstream and never mutated by the engine. Indicator
//! fields that are still warming up are `NaN`.

use chrono::NaiveDateTime;
use serde::{Deserialize, Deserializer};

use super::regime::MarketRegime;

/// Timestamp layout used by CSV inputs and trade logs.
pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct IndicatorRow {
    #[serde(deserialize_with = "de_timestamp")]
    pub timestamp: NaiveDateTime,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: f64,
    #[serde(default = "nan", deserialize_with = "de_f64_or_nan")]
    pub sma_short: f64,
    #[serde(default = "nan", deserialize_with = "de_f64_or_nan")]
    pub sma_long: f64,
    #[serde(default = "nan", deserialize_with = "de_f64_or_nan")]
    pub rsi: f64,
    #[serde(default = "nan", deserialize_with = "de_f64_or_nan")]
    pub macd: f64,
    #[serde(default = "nan", deserialize_with = "de_f64_or_nan")]
    pub macd_signal: f64,
    #[serde(default = "nan", deserialize_with = "de_f64_or_nan")]
    pub bb_upper: f64,
    #[serde(default = "nan", deserialize_with = "de_f64_or_nan")]
    pub bb_middle: f64,
    #[serde(default = "nan", deserialize_with = "de_f64_or_nan")]
    pub bb_lower: f64,
    #[serde(default = "nan", deserialize_with = "de_f64_or_nan")]
    pub adx: f64,
    #[serde(default = "nan", deserialize_with = "de_f64_or_nan")]
    pub plus_di: f64,
    #[serde(default = "nan", deserialize_with = "de_f64_or_nan")]
    pub minus_di: f64,
    #[serde(default = "nan", deserialize_with = "de_f64_or_nan")]
    pub volume_ma: f64,
    /// Regime of a slower timeframe aligned to this bar, when the caller has one.
    #[serde(default, deserialize_with = "de_regime")]
    pub htf_regime: Option<MarketRegime>,
}

impl IndicatorRow {
    /// A bare OHLCV row with every indicator unset.
    pub fn new(
        timestamp: NaiveDateTime,
        open: f64,
        high: f64,
        low: f64,
        close: f64,
        volume: f64,
    ) -> Self {
        IndicatorRow {
            timestamp,
            open,
            high,
            low,
            close,
            volume,
            sma_short: f64::NAN,
            sma_long: f64::NAN,
            rsi: f64::NAN,
            macd: f64::NAN,
            macd_signal: f64::NAN,
            bb_upper: f64::NAN,
            bb_middle: f64::NAN,
            bb_lower: f64::NAN,
            adx: f64::NAN,
            plus_di: f64::NAN,
            minus_di: f64::NAN,
            volume_ma: f64::NAN,
            htf_regime: None,
        }
    }

    /// Simple return from `previous` close to this close, `None` when undefined.
    pub fn return_from(&self, previous: &IndicatorRow) -> Option<f64> {
        if previous.close > 0.0 && self.close.is_finite() {
            Some(self.close / previous.close - 1.0)
        } else {
            None
        }
    }
}

fn nan() -> f64 {
    f64::NAN
}

fn de_f64_or_nan<'de, D: Deserializer<'de>>(deserializer: D) -> Result<f64, D::Error> {
    let raw = String::deserialize(deserializer)?;
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Ok(f64::NAN);
    }
    trimmed.parse::<f64>().map_err(serde::de::Error::custom)
}

fn de_timestamp<'de, D: Deserializer<'de>>(deserializer: D) -> Result<NaiveDateTime, D::Error> {
    let raw = String::deserialize(deserializer)?;
    NaiveDateTime::parse_from_str(raw.trim(), TIMESTAMP_FORMAT).map_err(serde::de::Error::custom)
}

fn de_regime<'de, D: Deserializer<'de>>(
    deserializer: D,
) -> Result<Option<MarketRegime>, D::Error> {
    let raw = String::deserialize(deserializer)?;
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Ok(None);
    }
    trimmed
        .parse::<MarketRegime>()
        .map(Some)
        .map_err(serde::de::Error::custom)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn ts() -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2024, 1, 15)
            .unwrap()
            .and_hms_opt(9, 0, 0)
            .unwrap()
    }

    #[test]
    fn new_row_has_no_indicators() {
        let row = IndicatorRow::new(ts(), 100.0, 110.0, 90.0, 105.0, 50_000.0);
        assert!(row.rsi.is_nan());
        assert!(row.adx.is_nan());
        assert!(row.htf_regime.is_none());
    }

    #[test]
    fn return_from_previous() {
        let prev = IndicatorRow::new(ts(), 100.0, 100.0, 100.0, 100.0, 1.0);
        let curr = IndicatorRow::new(ts(), 100.0, 110.0, 100.0, 110.0, 1.0);
        let r = curr.return_from(&prev).unwrap();
        assert!((r - 0.1).abs() < 1e-12);
    }

    #[test]
    fn return_from_zero_close_is_none() {
        let prev = IndicatorRow::new(ts(), 0.0, 0.0, 0.0, 0.0, 1.0);
        let curr = IndicatorRow::new(ts(), 1.0, 1.0, 1.0, 1.0, 1.0);
        assert!(curr.return_from(&prev).is_none());
    }

    #[test]
    fn deserialize_with_blank_indicators() {
        let data = "timestamp,open,high,low,close,volume,rsi,adx,htf_regime\n\
                    2024-01-15 09:00:00,1,2,0.5,1.5,100,,31.5,BULL_MODERATE\n";
        let mut rdr = csv::Reader::from_reader(data.as_bytes());
        let row: IndicatorRow = rdr.deserialize().next().unwrap().unwrap();
        assert_eq!(row.timestamp, ts());
        assert!(row.rsi.is_nan());
        assert!((row.adx - 31.5).abs() < f64::EPSILON);
        assert!(row.macd.is_nan());
        assert_eq!(row.htf_regime, Some(MarketRegime::BullModerate));
    }
}

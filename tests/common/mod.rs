#![allow(dead_code)]

use chrono::{Duration, NaiveDate, NaiveDateTime};
use regimetrader::domain::consensus::{ConsensusConfig, SizingTable};
use regimetrader::domain::error::EngineError;
use regimetrader::domain::indicator_row::{IndicatorRow, TIMESTAMP_FORMAT};
use regimetrader::domain::ledger::LedgerConfig;
use regimetrader::domain::regime::MarketRegime;
use regimetrader::domain::strategy::StrategyConfig;
use regimetrader::domain::vote::Voter;
use regimetrader::ports::data_port::DataPort;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use std::io::Write;

pub struct MockDataPort {
    pub rows: Vec<IndicatorRow>,
    pub error: Option<String>,
}

impl MockDataPort {
    pub fn new(rows: Vec<IndicatorRow>) -> Self {
        Self { rows, error: None }
    }

    pub fn with_error(mut self, reason: &str) -> Self {
        self.error = Some(reason.to_string());
        self
    }
}

impl DataPort for MockDataPort {
    fn fetch_rows(
        &self,
        start: Option<NaiveDateTime>,
        end: Option<NaiveDateTime>,
    ) -> Result<Vec<IndicatorRow>, EngineError> {
        if let Some(reason) = &self.error {
            return Err(EngineError::Data {
                reason: reason.clone(),
            });
        }
        Ok(self
            .rows
            .iter()
            .filter(|r| start.is_none_or(|s| r.timestamp >= s) && end.is_none_or(|e| r.timestamp <= e))
            .cloned()
            .collect())
    }
}

/// 15-minute bars from 2024-01-01 00:00.
pub fn ts(i: i64) -> NaiveDateTime {
    NaiveDate::from_ymd_opt(2024, 1, 1)
        .unwrap()
        .and_hms_opt(0, 0, 0)
        .unwrap()
        + Duration::minutes(15 * i)
}

/// Flat long MA, neutral RSI, weak ADX: classifies SIDEWAYS_FLAT and draws no votes.
pub fn quiet_row(i: i64, close: f64) -> IndicatorRow {
    let mut row = IndicatorRow::new(ts(i), close, close, close, close, 1000.0);
    row.sma_long = 100.0;
    row.rsi = 50.0;
    row.adx = 10.0;
    row.plus_di = 20.0;
    row.minus_di = 20.0;
    row
}

/// Oversold with a bullish higher timeframe: two buy votes.
pub fn oversold_row(i: i64, close: f64) -> IndicatorRow {
    let mut row = quiet_row(i, close);
    row.rsi = 25.0;
    row.htf_regime = Some(MarketRegime::BullModerate);
    row
}

/// Overbought with a bearish higher timeframe: two sell votes.
pub fn overbought_row(i: i64, close: f64) -> IndicatorRow {
    let mut row = quiet_row(i, close);
    row.rsi = 80.0;
    row.htf_regime = Some(MarketRegime::BearModerate);
    row
}

pub fn quiet_series(count: i64, close: f64) -> Vec<IndicatorRow> {
    (0..count).map(|i| quiet_row(i, close)).collect()
}

/// Three voters, two needed, half size on two votes. No costs.
pub fn test_strategy() -> StrategyConfig {
    StrategyConfig {
        name: "Integration".into(),
        voters: vec![
            Voter::RsiExtreme {
                oversold: 30.0,
                overbought: 70.0,
            },
            Voter::AdxTrend { min_adx: 25.0 },
            Voter::HigherTimeframe,
        ],
        consensus: ConsensusConfig {
            min_votes: 2,
            sizing: SizingTable::new(vec![(2, 0.5), (3, 1.0)]).unwrap(),
            time_boost: None,
            allow_pyramiding: false,
        },
        ledger: LedgerConfig {
            initial_capital: dec!(100000),
            fee_rate: Decimal::ZERO,
            slippage_rate: Decimal::ZERO,
        },
        ..StrategyConfig::default()
    }
}

/// INI equivalent of [`test_strategy`].
pub const TEST_INI: &str = r#"
[strategy]
name = Integration

[backtest]
initial_capital = 100000
fee_rate = 0
slippage_rate = 0

[voters]
enabled = rsi_extreme, adx_trend, htf_filter

[consensus]
min_votes = 2
sizing = 2:0.5, 3:1.0
"#;

pub fn write_temp(content: &str, suffix: &str) -> tempfile::NamedTempFile {
    let mut file = tempfile::Builder::new().suffix(suffix).tempfile().unwrap();
    file.write_all(content.as_bytes()).unwrap();
    file.flush().unwrap();
    file
}

pub fn rows_to_csv(rows: &[IndicatorRow]) -> String {
    let num = |v: f64| if v.is_finite() { v.to_string() } else { String::new() };
    let mut out = String::from(
        "timestamp,open,high,low,close,volume,sma_short,sma_long,rsi,macd,macd_signal,\
         bb_upper,bb_middle,bb_lower,adx,plus_di,minus_di,volume_ma,htf_regime\n",
    );
    for r in rows {
        let fields = [
            r.timestamp.format(TIMESTAMP_FORMAT).to_string(),
            num(r.open),
            num(r.high),
            num(r.low),
            num(r.close),
            num(r.volume),
            num(r.sma_short),
            num(r.sma_long),
            num(r.rsi),
            num(r.macd),
            num(r.macd_signal),
            num(r.bb_upper),
            num(r.bb_middle),
            num(r.bb_lower),
            num(r.adx),
            num(r.plus_di),
            num(r.minus_di),
            num(r.volume_ma),
            r.htf_regime.map(|g| g.to_string()).unwrap_or_default(),
        ];
        out.push_str(&fields.join(","));
        out.push('\n');
    }
    out
}

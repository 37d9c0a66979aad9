//! Replay of recorded buy/sell intents against a fresh ledger.
//!
//! Used to verify that a run's ledger can be reproduced from its trade log:
//! the replayed total return must match the original within
//! [`RETURN_TOLERANCE_PCT`] percentage points.

use chrono::NaiveDateTime;
use rust_decimal::Decimal;
use tracing::debug;

use super::error::EngineError;
use super::ledger::{CompoundPositionLedger, EquityPoint, LedgerConfig, TradeRecord, TradeSide};

pub const RETURN_TOLERANCE_PCT: f64 = 0.01;

#[derive(Debug, Clone, PartialEq)]
pub struct TradeIntent {
    pub timestamp: NaiveDateTime,
    pub side: TradeSide,
    pub price: Decimal,
    pub fraction: Decimal,
    pub reason: String,
}

impl From<&TradeRecord> for TradeIntent {
    fn from(record: &TradeRecord) -> Self {
        TradeIntent {
            timestamp: record.timestamp,
            side: record.side,
            price: record.price,
            fraction: record.fraction,
            reason: record.reason.clone(),
        }
    }
}

pub fn intents_from_log(trades: &[TradeRecord]) -> Vec<TradeIntent> {
    trades.iter().map(TradeIntent::from).collect()
}

#[derive(Debug, Clone)]
pub struct ReplayOutcome {
    pub ledger: CompoundPositionLedger,
    /// Intents the ledger rejected as invalid fills.
    pub skipped: usize,
}

impl ReplayOutcome {
    pub fn equity_curve(&self) -> Vec<EquityPoint> {
        self.ledger.equity_curve()
    }

    pub fn total_return_pct(&self) -> f64 {
        self.ledger.stats().total_return_pct
    }
}

/// Apply `intents` in order to a new ledger built from `config`.
pub fn replay(config: LedgerConfig, intents: &[TradeIntent]) -> Result<ReplayOutcome, EngineError> {
    config.validate()?;
    if let Some(pair) = intents.windows(2).find(|w| w[1].timestamp < w[0].timestamp) {
        return Err(EngineError::Data {
            reason: format!(
                "intents out of order: {} after {}",
                pair[1].timestamp, pair[0].timestamp
            ),
        });
    }

    let mut ledger = CompoundPositionLedger::new(config);
    let mut skipped = 0usize;
    for intent in intents {
        let filled = match intent.side {
            TradeSide::Buy => ledger.buy_with_reason(
                intent.timestamp,
                intent.price,
                intent.fraction,
                &intent.reason,
            )?,
            TradeSide::Sell => {
                ledger.sell(intent.timestamp, intent.price, intent.fraction, &intent.reason)?
            }
        };
        if !filled {
            debug!(timestamp = %intent.timestamp, side = %intent.side, "replay intent skipped");
            skipped += 1;
        }
    }

    Ok(ReplayOutcome { ledger, skipped })
}

pub fn returns_match(original_pct: f64, replayed_pct: f64) -> bool {
    (original_pct - replayed_pct).abs() <= RETURN_TOLERANCE_PCT
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, NaiveDate};
    use rust_decimal_macros::dec;

    fn ts(i: i64) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2023, 6, 1)
            .unwrap()
            .and_hms_opt(0, 0, 0)
            .unwrap()
            + Duration::minutes(30 * i)
    }

    fn intent(i: i64, side: TradeSide, price: Decimal, fraction: Decimal) -> TradeIntent {
        TradeIntent {
            timestamp: ts(i),
            side,
            price,
            fraction,
            reason: side.to_string(),
        }
    }

    #[test]
    fn replaying_a_log_reproduces_the_ledger() {
        let mut original = CompoundPositionLedger::new(LedgerConfig::default());
        original.buy(ts(0), dec!(30000), dec!(0.4)).unwrap();
        original.buy(ts(1), dec!(30500), dec!(0.8)).unwrap();
        original.sell(ts(2), dec!(31200), dec!(0.3), "TAKE_PROFIT_1").unwrap();
        original.sell(ts(3), dec!(30900), Decimal::ONE, "TRAILING_STOP").unwrap();
        original.buy(ts(4), dec!(29000), dec!(0.5)).unwrap();
        original.sell(ts(5), dec!(28400), Decimal::ONE, "STOP_LOSS").unwrap();

        let outcome = replay(LedgerConfig::default(), &intents_from_log(original.trades())).unwrap();
        assert_eq!(outcome.skipped, 0);
        assert_eq!(outcome.ledger.state(), original.state());
        assert_eq!(outcome.ledger.trades(), original.trades());
        assert!(returns_match(
            original.stats().total_return_pct,
            outcome.total_return_pct()
        ));
        assert_eq!(outcome.equity_curve().len(), 6);
    }

    #[test]
    fn invalid_intents_are_counted_not_fatal() {
        let intents = vec![
            intent(0, TradeSide::Sell, dec!(100), Decimal::ONE),
            intent(1, TradeSide::Buy, dec!(100), dec!(0.5)),
            intent(2, TradeSide::Buy, Decimal::ZERO, dec!(0.5)),
        ];
        let outcome = replay(LedgerConfig::default(), &intents).unwrap();
        assert_eq!(outcome.skipped, 2);
        assert_eq!(outcome.ledger.trades().len(), 1);
    }

    #[test]
    fn out_of_order_intents_rejected() {
        let intents = vec![
            intent(5, TradeSide::Buy, dec!(100), dec!(0.5)),
            intent(1, TradeSide::Sell, dec!(100), Decimal::ONE),
        ];
        assert!(matches!(
            replay(LedgerConfig::default(), &intents),
            Err(EngineError::Data { .. })
        ));
    }

    #[test]
    fn tolerance_is_one_hundredth_of_a_point() {
        assert!(returns_match(12.345, 12.35));
        assert!(!returns_match(12.34, 12.36));
    }
}

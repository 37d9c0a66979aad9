//! Compound position ledger.
//!
//! Tracks cash, holdings and the quantity-weighted cost basis of one
//! strategy instance in `Decimal`. Every fill pays slippage against the
//! trader and a fee on the traded notional. Buys accumulate into one open
//! position whose committed fraction is capped at 1.0 of the capital base
//! captured when the position opened.
//!
//! Rejected fills return `Ok(false)` and leave the state untouched. A broken
//! invariant after a fill returns [`EngineError::StateCorruption`]; the trade
//! log up to that point stays readable through [`CompoundPositionLedger::trades`].

use std::fmt;

use chrono::NaiveDateTime;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use tracing::{debug, error, info};

use super::error::EngineError;
use super::metrics::Stats;
use super::position::PositionState;

/// Decimal places kept on cash amounts.
pub const MONEY_SCALE: u32 = 8;

/// Holdings at or below this quantity count as flat.
pub const DUST_QUANTITY: Decimal = dec!(0.000000000001);

#[derive(Debug, Clone, PartialEq)]
pub struct LedgerConfig {
    pub initial_capital: Decimal,
    /// Fee charged on traded notional, e.g. `0.0005` for 0.05%.
    pub fee_rate: Decimal,
    /// Price slippage applied against the trader, e.g. `0.0002`.
    pub slippage_rate: Decimal,
}

impl Default for LedgerConfig {
    fn default() -> Self {
        LedgerConfig {
            initial_capital: dec!(10000000),
            fee_rate: dec!(0.0005),
            slippage_rate: dec!(0.0002),
        }
    }
}

impl LedgerConfig {
    pub fn validate(&self) -> Result<(), EngineError> {
        if self.initial_capital <= Decimal::ZERO {
            return Err(EngineError::invalid(
                "backtest",
                "initial_capital",
                "initial_capital must be positive",
            ));
        }
        let rate_cap = dec!(0.1);
        if self.fee_rate < Decimal::ZERO || self.fee_rate >= rate_cap {
            return Err(EngineError::invalid(
                "backtest",
                "fee_rate",
                "fee_rate must be in [0, 0.1)",
            ));
        }
        if self.slippage_rate < Decimal::ZERO || self.slippage_rate >= rate_cap {
            return Err(EngineError::invalid(
                "backtest",
                "slippage_rate",
                "slippage_rate must be in [0, 0.1)",
            ));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct LedgerState {
    pub cash: Decimal,
    pub holdings: Decimal,
    pub weighted_entry_price: Decimal,
    pub total_invested: Decimal,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TradeSide {
    Buy,
    Sell,
}

impl fmt::Display for TradeSide {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TradeSide::Buy => f.write_str("BUY"),
            TradeSide::Sell => f.write_str("SELL"),
        }
    }
}

/// One fill. `fraction` is the applied fraction: of the capital base for
/// buys (after normalization), of holdings for sells.
#[derive(Debug, Clone, PartialEq)]
pub struct TradeRecord {
    pub side: TradeSide,
    pub timestamp: NaiveDateTime,
    pub price: Decimal,
    pub execution_price: Decimal,
    pub quantity: Decimal,
    pub fraction: Decimal,
    pub fee: Decimal,
    pub cash_before: Decimal,
    pub cash_after: Decimal,
    pub holdings_after: Decimal,
    /// Cash plus holdings marked at `price`.
    pub equity_after: Decimal,
    pub realized_pnl: Option<Decimal>,
    pub pnl_pct: Option<Decimal>,
    pub reason: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct EquityPoint {
    pub timestamp: NaiveDateTime,
    pub equity: Decimal,
}

struct BuyQuote {
    execution_price: Decimal,
    fee: Decimal,
    quantity: Decimal,
    weighted_entry_price: Decimal,
    equity_after: Decimal,
}

struct SellQuote {
    execution_price: Decimal,
    quantity: Decimal,
    fee: Decimal,
    proceeds: Decimal,
    realized_pnl: Decimal,
    pnl_pct: Option<Decimal>,
    released: Decimal,
    equity_after: Decimal,
}

#[derive(Debug, Clone)]
pub struct CompoundPositionLedger {
    config: LedgerConfig,
    state: LedgerState,
    /// Sum of applied buy fractions in the open position.
    committed_fraction: Decimal,
    /// Cash at the first buy of the open position.
    position_base: Decimal,
    trades: Vec<TradeRecord>,
}

impl CompoundPositionLedger {
    pub fn new(config: LedgerConfig) -> Self {
        let state = LedgerState {
            cash: config.initial_capital,
            ..LedgerState::default()
        };
        CompoundPositionLedger {
            config,
            state,
            committed_fraction: Decimal::ZERO,
            position_base: Decimal::ZERO,
            trades: Vec::new(),
        }
    }

    pub fn config(&self) -> &LedgerConfig {
        &self.config
    }

    pub fn state(&self) -> &LedgerState {
        &self.state
    }

    pub fn trades(&self) -> &[TradeRecord] {
        &self.trades
    }

    pub fn committed_fraction(&self) -> Decimal {
        self.committed_fraction
    }

    pub fn position_state(&self) -> PositionState {
        if self.state.holdings > Decimal::ZERO {
            PositionState::Long
        } else {
            PositionState::Flat
        }
    }

    pub fn buy(
        &mut self,
        timestamp: NaiveDateTime,
        price: Decimal,
        fraction: Decimal,
    ) -> Result<bool, EngineError> {
        self.buy_with_reason(timestamp, price, fraction, "BUY")
    }

    /// Buy `fraction` of the position's capital base at `price`.
    ///
    /// The fraction is trimmed so the open position never commits more than
    /// the whole base.
    pub fn buy_with_reason(
        &mut self,
        timestamp: NaiveDateTime,
        price: Decimal,
        fraction: Decimal,
        reason: &str,
    ) -> Result<bool, EngineError> {
        if price <= Decimal::ZERO || fraction <= Decimal::ZERO {
            debug!(%price, %fraction, "buy rejected: non-positive price or fraction");
            return Ok(false);
        }

        let (base, committed) = if self.state.holdings.is_zero() {
            (self.state.cash, Decimal::ZERO)
        } else {
            (self.position_base, self.committed_fraction)
        };
        let applied = fraction.min(Decimal::ONE - committed);
        if applied <= Decimal::ZERO {
            debug!(%committed, "buy rejected: position fully committed");
            return Ok(false);
        }

        let allocation = (base * applied).round_dp(MONEY_SCALE).min(self.state.cash);
        if allocation <= Decimal::ZERO {
            debug!(%allocation, "buy rejected: nothing to allocate");
            return Ok(false);
        }

        let Some(quote) = self.quote_buy(price, allocation) else {
            debug!(%price, %allocation, "buy rejected: quantity not representable");
            return Ok(false);
        };
        if quote.quantity <= Decimal::ZERO {
            debug!(%allocation, execution_price = %quote.execution_price, "buy rejected: zero quantity");
            return Ok(false);
        }
        let BuyQuote {
            execution_price,
            fee,
            quantity,
            weighted_entry_price,
            equity_after,
        } = quote;

        let cash_before = self.state.cash;
        self.state.weighted_entry_price = weighted_entry_price;
        self.state.holdings += quantity;
        self.state.cash -= allocation;
        self.state.total_invested += allocation;
        self.committed_fraction = committed + applied;
        self.position_base = base;

        self.trades.push(TradeRecord {
            side: TradeSide::Buy,
            timestamp,
            price,
            execution_price,
            quantity,
            fraction: applied,
            fee,
            cash_before,
            cash_after: self.state.cash,
            holdings_after: self.state.holdings,
            equity_after,
            realized_pnl: None,
            pnl_pct: None,
            reason: reason.to_string(),
        });
        info!(
            %timestamp,
            %execution_price,
            %quantity,
            fraction = %applied,
            cash = %self.state.cash,
            "buy filled"
        );

        self.check_invariants()?;
        Ok(true)
    }

    /// Sell `fraction` of current holdings at `price`.
    pub fn sell(
        &mut self,
        timestamp: NaiveDateTime,
        price: Decimal,
        fraction: Decimal,
        reason: &str,
    ) -> Result<bool, EngineError> {
        if self.state.holdings <= Decimal::ZERO {
            debug!(reason, "sell rejected: no holdings");
            return Ok(false);
        }
        if price <= Decimal::ZERO || fraction <= Decimal::ZERO {
            debug!(%price, %fraction, "sell rejected: non-positive price or fraction");
            return Ok(false);
        }

        let fraction = fraction.min(Decimal::ONE);
        let Some(quote) = self.quote_sell(price, fraction) else {
            debug!(%price, %fraction, "sell rejected: proceeds not representable");
            return Ok(false);
        };
        let SellQuote {
            execution_price,
            quantity,
            fee,
            proceeds,
            realized_pnl,
            pnl_pct,
            released,
            equity_after,
        } = quote;

        let cash_before = self.state.cash;
        self.state.cash += proceeds;
        self.state.holdings -= quantity;
        self.state.total_invested -= released;

        if self.state.holdings <= DUST_QUANTITY {
            self.state.holdings = Decimal::ZERO;
            self.state.weighted_entry_price = Decimal::ZERO;
            self.state.total_invested = Decimal::ZERO;
            self.committed_fraction = Decimal::ZERO;
            self.position_base = Decimal::ZERO;
        }

        self.trades.push(TradeRecord {
            side: TradeSide::Sell,
            timestamp,
            price,
            execution_price,
            quantity,
            fraction,
            fee,
            cash_before,
            cash_after: self.state.cash,
            holdings_after: self.state.holdings,
            equity_after,
            realized_pnl: Some(realized_pnl),
            pnl_pct,
            reason: reason.to_string(),
        });
        info!(
            %timestamp,
            %execution_price,
            %quantity,
            pnl = %realized_pnl,
            reason,
            "sell filled"
        );

        self.check_invariants()?;
        Ok(true)
    }

    /// Cash plus holdings marked at `current_price`, saturating at
    /// `Decimal::MAX` when the mark cannot be represented.
    pub fn total_equity(&self, current_price: Decimal) -> Decimal {
        self.state
            .holdings
            .checked_mul(current_price)
            .and_then(|value| value.checked_add(self.state.cash))
            .unwrap_or(Decimal::MAX)
    }

    /// Price a buy of `allocation` without touching state. `None` when any
    /// amount overflows `Decimal`.
    fn quote_buy(&self, price: Decimal, allocation: Decimal) -> Option<BuyQuote> {
        let execution_price = price.checked_mul(Decimal::ONE + self.config.slippage_rate)?;
        let fee = allocation.checked_mul(self.config.fee_rate)?.round_dp(MONEY_SCALE);
        let quantity = allocation.checked_sub(fee)?.checked_div(execution_price)?;
        let old_qty = self.state.holdings;
        let new_qty = old_qty.checked_add(quantity)?;
        let weighted_entry_price = if old_qty.is_zero() {
            execution_price
        } else {
            old_qty
                .checked_mul(self.state.weighted_entry_price)?
                .checked_add(quantity.checked_mul(execution_price)?)?
                .checked_div(new_qty)?
        };
        let cash_after = self.state.cash.checked_sub(allocation)?;
        let equity_after = new_qty.checked_mul(price)?.checked_add(cash_after)?;
        Some(BuyQuote {
            execution_price,
            fee,
            quantity,
            weighted_entry_price,
            equity_after,
        })
    }

    fn quote_sell(&self, price: Decimal, fraction: Decimal) -> Option<SellQuote> {
        let holdings_before = self.state.holdings;
        let quantity = if fraction == Decimal::ONE {
            holdings_before
        } else {
            holdings_before.checked_mul(fraction)?
        };

        let execution_price = price.checked_mul(Decimal::ONE - self.config.slippage_rate)?;
        let gross = quantity.checked_mul(execution_price)?;
        let fee = gross.checked_mul(self.config.fee_rate)?.round_dp(MONEY_SCALE);
        let proceeds = gross.checked_sub(fee)?.round_dp(MONEY_SCALE);

        let cost_basis = quantity.checked_mul(self.state.weighted_entry_price)?;
        let gain = proceeds.checked_sub(cost_basis)?;
        let pnl_pct = if cost_basis > Decimal::ZERO {
            Some(gain.checked_div(cost_basis)?.checked_mul(Decimal::ONE_HUNDRED)?)
        } else {
            None
        };
        let released = self
            .state
            .total_invested
            .checked_mul(quantity)?
            .checked_div(holdings_before)?;

        let cash_after = self.state.cash.checked_add(proceeds)?;
        let remaining = holdings_before - quantity;
        let marked = if remaining <= DUST_QUANTITY {
            Decimal::ZERO
        } else {
            remaining.checked_mul(price)?
        };
        Some(SellQuote {
            execution_price,
            quantity,
            fee,
            proceeds,
            realized_pnl: gain.round_dp(MONEY_SCALE),
            pnl_pct,
            released,
            equity_after: marked.checked_add(cash_after)?,
        })
    }

    /// Equity after each fill, in trade order.
    pub fn equity_curve(&self) -> Vec<EquityPoint> {
        self.trades
            .iter()
            .map(|t| EquityPoint {
                timestamp: t.timestamp,
                equity: t.equity_after,
            })
            .collect()
    }

    pub fn stats(&self) -> Stats {
        Stats::from_trades(self.config.initial_capital, &self.trades)
    }

    /// Overwrite the accounting state, bypassing every fill check.
    #[cfg(test)]
    pub(crate) fn force_state(&mut self, state: LedgerState) {
        self.state = state;
    }

    fn check_invariants(&self) -> Result<(), EngineError> {
        let s = &self.state;
        let violation = if s.cash < Decimal::ZERO {
            Some(format!("negative cash {}", s.cash))
        } else if s.holdings < Decimal::ZERO {
            Some(format!("negative holdings {}", s.holdings))
        } else if s.weighted_entry_price < Decimal::ZERO || s.total_invested < Decimal::ZERO {
            Some(format!(
                "negative cost basis {} / invested {}",
                s.weighted_entry_price, s.total_invested
            ))
        } else if self.committed_fraction < Decimal::ZERO || self.committed_fraction > Decimal::ONE
        {
            Some(format!("committed fraction {} outside [0, 1]", self.committed_fraction))
        } else {
            None
        };

        match violation {
            Some(reason) => {
                error!(trades = self.trades.len(), %reason, "ledger invariant violated");
                Err(EngineError::StateCorruption { reason })
            }
            None => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, NaiveDate};
    use rust_decimal::prelude::ToPrimitive;

    fn ts(i: i64) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2024, 1, 1)
            .unwrap()
            .and_hms_opt(0, 0, 0)
            .unwrap()
            + Duration::hours(i)
    }

    fn frictionless(capital: Decimal) -> CompoundPositionLedger {
        CompoundPositionLedger::new(LedgerConfig {
            initial_capital: capital,
            fee_rate: Decimal::ZERO,
            slippage_rate: Decimal::ZERO,
        })
    }

    #[test]
    fn new_ledger_is_flat() {
        let ledger = CompoundPositionLedger::new(LedgerConfig::default());
        assert_eq!(ledger.state().cash, dec!(10000000));
        assert!(ledger.state().holdings.is_zero());
        assert_eq!(ledger.position_state(), PositionState::Flat);
        assert!(ledger.trades().is_empty());
    }

    #[test]
    fn round_trip_without_costs_returns_capital_exactly() {
        let mut ledger = frictionless(dec!(10000));
        assert!(ledger.buy(ts(0), dec!(3), Decimal::ONE).unwrap());
        assert!(ledger.state().cash.is_zero());
        assert!(ledger.sell(ts(1), dec!(3), Decimal::ONE, "EXIT").unwrap());
        assert_eq!(ledger.state().cash, dec!(10000));
        assert!(ledger.state().holdings.is_zero());
        assert_eq!(ledger.trades()[1].realized_pnl, Some(Decimal::ZERO));
    }

    #[test]
    fn slippage_and_fee_work_against_the_trader() {
        let mut ledger = CompoundPositionLedger::new(LedgerConfig {
            initial_capital: dec!(10000),
            fee_rate: dec!(0.001),
            slippage_rate: dec!(0.001),
        });
        ledger.buy(ts(0), dec!(100), Decimal::ONE).unwrap();
        let buy = &ledger.trades()[0];
        assert_eq!(buy.execution_price, dec!(100.1));
        assert_eq!(buy.fee, dec!(10));
        assert_eq!(buy.quantity, dec!(9990) / dec!(100.1));

        ledger.sell(ts(1), dec!(100), Decimal::ONE, "EXIT").unwrap();
        let sell = &ledger.trades()[1];
        assert_eq!(sell.execution_price, dec!(99.9));
        assert!(sell.realized_pnl.unwrap() < Decimal::ZERO);
        assert!(ledger.state().cash < dec!(10000));
    }

    #[test]
    fn weighted_average_of_two_buys() {
        let mut ledger = frictionless(dec!(10000));
        ledger.buy(ts(0), dec!(100), dec!(0.5)).unwrap();
        ledger.buy(ts(1), dec!(120), dec!(0.5)).unwrap();
        let (q1, p1) = (ledger.trades()[0].quantity, ledger.trades()[0].execution_price);
        let (q2, p2) = (ledger.trades()[1].quantity, ledger.trades()[1].execution_price);
        let expected = (q1 * p1 + q2 * p2) / (q1 + q2);
        let actual = ledger.state().weighted_entry_price;
        assert!((actual - expected).abs().to_f64().unwrap() < 1e-9);
        assert_eq!(q1, dec!(50));
        assert!(ledger.state().cash.is_zero());
        assert_eq!(ledger.committed_fraction(), Decimal::ONE);
    }

    #[test]
    fn fractions_over_one_are_normalized() {
        let mut ledger = frictionless(dec!(10000));
        assert!(ledger.buy(ts(0), dec!(100), dec!(0.6)).unwrap());
        assert!(ledger.buy(ts(1), dec!(100), dec!(0.6)).unwrap());
        assert_eq!(ledger.trades()[1].fraction, dec!(0.4));
        assert!(!ledger.buy(ts(2), dec!(100), dec!(0.6)).unwrap());
        assert_eq!(ledger.trades().len(), 2);
        assert_eq!(ledger.state().total_invested, dec!(10000));
        assert!(ledger.state().cash.is_zero());
    }

    #[test]
    fn buy_with_no_cash_fails_without_change() {
        let mut ledger = frictionless(dec!(10000));
        ledger.buy(ts(0), dec!(100), Decimal::ONE).unwrap();
        let before = *ledger.state();
        assert!(!ledger.buy(ts(1), dec!(100), dec!(0.1)).unwrap());
        assert_eq!(*ledger.state(), before);
    }

    #[test]
    fn non_positive_inputs_are_rejected() {
        let mut ledger = frictionless(dec!(10000));
        assert!(!ledger.buy(ts(0), Decimal::ZERO, dec!(0.5)).unwrap());
        assert!(!ledger.buy(ts(0), dec!(100), Decimal::ZERO).unwrap());
        assert!(!ledger.buy(ts(0), dec!(-1), dec!(0.5)).unwrap());
        assert!(ledger.trades().is_empty());
    }

    #[test]
    fn sell_without_holdings_fails() {
        let mut ledger = frictionless(dec!(10000));
        assert!(!ledger.sell(ts(0), dec!(100), Decimal::ONE, "EXIT").unwrap());
        assert!(ledger.trades().is_empty());
    }

    #[test]
    fn partial_sell_keeps_cost_basis() {
        let mut ledger = frictionless(dec!(10000));
        ledger.buy(ts(0), dec!(100), dec!(0.5)).unwrap();
        ledger.buy(ts(1), dec!(120), dec!(0.5)).unwrap();
        let avg = ledger.state().weighted_entry_price;
        ledger.sell(ts(2), dec!(130), dec!(0.3), "TAKE_PROFIT_1").unwrap();
        assert_eq!(ledger.state().weighted_entry_price, avg);
        let sell = &ledger.trades()[2];
        let expected_pnl = sell.quantity * dec!(130) - sell.quantity * avg;
        let pnl_error = (sell.realized_pnl.unwrap() - expected_pnl).abs();
        assert!(pnl_error < dec!(0.0000001));
        assert_eq!(ledger.position_state(), PositionState::Long);
        let invested_error = (ledger.state().total_invested - dec!(7000)).abs();
        assert!(invested_error < dec!(0.0000001));
    }

    #[test]
    fn full_close_resets_cost_basis_exactly() {
        let mut ledger = CompoundPositionLedger::new(LedgerConfig::default());
        ledger.buy(ts(0), dec!(6364272.6), dec!(0.2)).unwrap();
        ledger.sell(ts(1), dec!(7000000), dec!(0.5), "TAKE_PROFIT_1").unwrap();
        ledger.sell(ts(2), dec!(7100000), Decimal::ONE, "TRAILING_STOP").unwrap();
        let state = ledger.state();
        assert_eq!(state.holdings, Decimal::ZERO);
        assert_eq!(state.weighted_entry_price, Decimal::ZERO);
        assert_eq!(state.total_invested, Decimal::ZERO);
        assert_eq!(ledger.committed_fraction(), Decimal::ZERO);
        assert_eq!(ledger.position_state(), PositionState::Flat);
    }

    #[test]
    fn reference_round_trip_scenario() {
        let mut ledger = CompoundPositionLedger::new(LedgerConfig {
            initial_capital: dec!(10000000),
            fee_rate: dec!(0.0005),
            slippage_rate: dec!(0.0002),
        });
        assert!(ledger.buy(ts(0), dec!(6364272.6), dec!(0.2)).unwrap());
        assert_eq!(ledger.trades()[0].cash_before - ledger.trades()[0].cash_after, dec!(2000000));
        assert!(ledger.sell(ts(1), dec!(7265546.8), Decimal::ONE, "EXIT").unwrap());

        // Net of slippage both ways and the exit fee, against the
        // fee-inclusive cost basis.
        let pnl_pct = ledger.trades()[1].pnl_pct.unwrap();
        let error = (pnl_pct - dec!(14.058751063339)).abs();
        assert!(error < dec!(0.000000001), "pnl_pct = {pnl_pct}");
        assert_eq!(ledger.state().holdings, Decimal::ZERO);
        assert_eq!(ledger.state().total_invested, Decimal::ZERO);
    }

    #[test]
    fn new_position_captures_new_capital_base() {
        let mut ledger = frictionless(dec!(10000));
        ledger.buy(ts(0), dec!(100), Decimal::ONE).unwrap();
        ledger.sell(ts(1), dec!(110), Decimal::ONE, "EXIT").unwrap();
        assert_eq!(ledger.state().cash, dec!(11000));
        ledger.buy(ts(2), dec!(100), dec!(0.5)).unwrap();
        assert_eq!(ledger.trades()[2].cash_before - ledger.trades()[2].cash_after, dec!(5500));
    }

    #[test]
    fn total_equity_marks_holdings() {
        let mut ledger = frictionless(dec!(10000));
        ledger.buy(ts(0), dec!(100), dec!(0.5)).unwrap();
        assert_eq!(ledger.total_equity(dec!(120)), dec!(5000) + dec!(50) * dec!(120));
    }

    #[test]
    fn identical_sequences_replay_identically() {
        let run = || {
            let mut ledger = CompoundPositionLedger::new(LedgerConfig::default());
            for i in 0..50 {
                let price = Decimal::from(60_000 + (i * 37) % 900);
                ledger.buy(ts(i), price, dec!(0.35)).unwrap();
                if i % 3 == 2 {
                    ledger.sell(ts(i), price + dec!(150), dec!(0.6), "EXIT").unwrap();
                }
            }
            (*ledger.state(), ledger.trades().to_vec())
        };
        assert_eq!(run(), run());
    }

    #[test]
    fn config_validation() {
        assert!(LedgerConfig::default().validate().is_ok());
        let negative_fee = LedgerConfig {
            fee_rate: dec!(-0.001),
            ..Default::default()
        };
        assert!(negative_fee.validate().is_err());
        let no_capital = LedgerConfig {
            initial_capital: Decimal::ZERO,
            ..Default::default()
        };
        assert!(no_capital.validate().is_err());
    }

    #[test]
    fn unrepresentable_quantity_is_rejected() {
        let mut ledger = CompoundPositionLedger::new(LedgerConfig::default());
        let tiny = Decimal::new(1, 24);
        assert!(!ledger.buy(ts(0), tiny, Decimal::ONE).unwrap());
        assert!(ledger.trades().is_empty());
        assert_eq!(ledger.state().cash, dec!(10000000));
        assert_eq!(ledger.position_state(), PositionState::Flat);
    }

    #[test]
    fn unrepresentable_proceeds_are_rejected() {
        let mut ledger = frictionless(dec!(10000));
        ledger.buy(ts(0), dec!(100), Decimal::ONE).unwrap();
        let before = *ledger.state();
        assert!(!ledger.sell(ts(1), Decimal::MAX, Decimal::ONE, "EXIT").unwrap());
        assert_eq!(*ledger.state(), before);
        assert_eq!(ledger.trades().len(), 1);
    }

    #[test]
    fn broken_invariant_halts_and_keeps_the_log() {
        let mut ledger = frictionless(dec!(10000));
        ledger.buy(ts(0), dec!(100), dec!(0.5)).unwrap();
        ledger.force_state(LedgerState {
            cash: dec!(-1000000),
            ..*ledger.state()
        });

        let err = ledger.sell(ts(1), dec!(100), Decimal::ONE, "EXIT").unwrap_err();
        assert!(matches!(
            err,
            EngineError::StateCorruption { ref reason } if reason.contains("negative cash")
        ));
        let trades = ledger.trades();
        assert_eq!(trades.len(), 2);
        assert_eq!(trades[0].side, TradeSide::Buy);
        assert_eq!(trades[0].quantity, dec!(50));
        assert_eq!(trades[1].side, TradeSide::Sell);
    }
}

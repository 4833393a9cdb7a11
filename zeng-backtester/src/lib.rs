//! Single-pass replay of a [`Rule`] over historical candles.

use std::collections::BTreeMap;

use rust_decimal::Decimal;
use thiserror::Error;
use tracing::debug;
use zeng_core::{Candle, Price, Side};
use zeng_indicators::series;

pub mod reporting;
pub mod rule;
pub mod synthetic;

pub use reporting::{BacktestResult, Trade};
pub use rule::{Action, Comparison, Condition, ConditionKind, ConditionValue, Rule, SeriesKey};
pub use synthetic::synthetic_candles;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum BacktestError {
    #[error("initial capital must be positive, got {0}")]
    InvalidCapital(Decimal),
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct BacktestConfig {
    pub initial_capital: Decimal,
    /// Substituted for missing or zero indicator periods.
    pub default_period: usize,
}

impl Default for BacktestConfig {
    fn default() -> Self {
        Self {
            initial_capital: Decimal::new(100_000, 0),
            default_period: rule::DEFAULT_PERIOD,
        }
    }
}

impl BacktestConfig {
    pub fn with_capital(initial_capital: Decimal) -> Self {
        Self {
            initial_capital,
            ..Self::default()
        }
    }
}

/// Precomputed series keyed by indicator and period.
type SeriesTable = BTreeMap<SeriesKey, Vec<Option<Price>>>;

pub struct Backtester<'a> {
    config: BacktestConfig,
    rule: &'a Rule,
    candles: &'a [Candle],
}

impl<'a> Backtester<'a> {
    pub fn new(config: BacktestConfig, rule: &'a Rule, candles: &'a [Candle]) -> Self {
        Self {
            config,
            rule,
            candles,
        }
    }

    pub fn run(&self) -> Result<BacktestResult, BacktestError> {
        let initial = self.config.initial_capital;
        if initial <= Decimal::ZERO {
            return Err(BacktestError::InvalidCapital(initial));
        }
        let table = self.precompute();
        let action = self.rule.actions.first().and_then(Action::order);

        let mut cash = initial;
        let mut position = Decimal::ZERO;
        let mut trades = Vec::new();
        let mut equity_curve = Vec::with_capacity(self.candles.len());
        equity_curve.push(initial);
        let mut peak = initial;
        let mut max_drawdown = Decimal::ZERO;

        for (index, candle) in self.candles.iter().enumerate().skip(1) {
            let price = candle.close;
            if self.fires(&table, index, price) {
                match action {
                    Some((Side::Buy, quantity)) if position <= Decimal::ZERO => {
                        let cost = quantity * price;
                        if cash >= cost {
                            position += quantity;
                            cash -= cost;
                            trades.push(trade(Side::Buy, candle, quantity));
                        }
                    }
                    Some((Side::Sell, quantity)) if position >= Decimal::ZERO => {
                        position -= quantity;
                        cash += quantity * price;
                        trades.push(trade(Side::Sell, candle, quantity));
                    }
                    _ => {}
                }
            }
            let equity = cash + position * price;
            equity_curve.push(equity);
            peak = peak.max(equity);
            max_drawdown = max_drawdown.max((peak - equity) / peak);
        }

        let final_equity = equity_curve.last().copied().unwrap_or(initial);
        let total_profit = final_equity - initial;
        let win_rate = if trades.is_empty() {
            Decimal::ZERO
        } else {
            let wins = trades.iter().filter(|t: &&Trade| t.pnl > Decimal::ZERO).count();
            Decimal::from(wins) / Decimal::from(trades.len())
        };
        let sharpe_ratio = if max_drawdown.is_zero() {
            total_profit
        } else {
            total_profit / max_drawdown
        };
        debug!(
            candles = self.candles.len(),
            trades = trades.len(),
            profit = %total_profit,
            "backtest finished"
        );
        Ok(BacktestResult {
            total_profit,
            win_rate,
            max_drawdown: max_drawdown * Decimal::ONE_HUNDRED,
            sharpe_ratio,
            trades,
            equity_curve,
        })
    }

    /// Computes every series referenced by the rule exactly once.
    fn precompute(&self) -> SeriesTable {
        let period = self.config.default_period;
        let mut table = SeriesTable::new();
        let right_hand = self.rule.conditions.iter().filter_map(|c| match c.value {
            ConditionValue::Series(series) => Some(SeriesKey::new(series.kind, series.period, period)),
            _ => None,
        });
        let keys = self
            .rule
            .conditions
            .iter()
            .filter_map(|c| c.series(period))
            .chain(right_hand);
        for key in keys {
            if table.contains_key(&key) {
                continue;
            }
            let values = match key.kind {
                ConditionKind::Price => self.candles.iter().map(|c| Some(c.close)).collect(),
                ConditionKind::Sma => series::sma(self.candles, key.period),
                ConditionKind::Ema => series::ema(self.candles, key.period),
                ConditionKind::Rsi => series::rsi(self.candles, key.period),
                ConditionKind::Unknown => continue,
            };
            table.insert(key, values);
        }
        table
    }

    fn fires(&self, table: &SeriesTable, index: usize, price: Price) -> bool {
        let period = self.config.default_period;
        self.rule.conditions.iter().all(|condition| {
            let left = match condition.kind {
                ConditionKind::Price => Some(price),
                _ => condition.series(period).and_then(|key| lookup(table, key, index)),
            };
            let right = match &condition.value {
                ConditionValue::Series(series) => {
                    lookup(table, SeriesKey::new(series.kind, series.period, period), index)
                }
                constant => constant.constant(),
            };
            match (left, right) {
                (Some(left), Some(right)) => condition.operator.holds(left, right),
                _ => false,
            }
        })
    }
}

fn lookup(table: &SeriesTable, key: SeriesKey, index: usize) -> Option<Price> {
    table.get(&key)?.get(index).copied().flatten()
}

fn trade(side: Side, candle: &Candle, quantity: Decimal) -> Trade {
    Trade {
        side,
        price: candle.close,
        time: candle.timestamp,
        quantity,
        pnl: Decimal::ZERO,
    }
}

/// Replays `rule` over `candles` starting from `initial_capital`.
pub fn run_backtest(
    rule: &Rule,
    candles: &[Candle],
    initial_capital: Decimal,
) -> Result<BacktestResult, BacktestError> {
    Backtester::new(BacktestConfig::with_capital(initial_capital), rule, candles).run()
}

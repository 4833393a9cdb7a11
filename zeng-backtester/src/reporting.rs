use std::fmt;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use zeng_core::{Price, Quantity, Side};

/// A simulated fill. `pnl` is never attributed and stays zero.
#[derive(Clone, Debug, Deserialize, PartialEq, Serialize)]
pub struct Trade {
    #[serde(rename = "type")]
    pub side: Side,
    pub price: Price,
    pub time: DateTime<Utc>,
    pub quantity: Quantity,
    pub pnl: Decimal,
}

#[derive(Clone, Debug, Deserialize, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BacktestResult {
    pub total_profit: Decimal,
    /// Fraction of trades with positive `pnl`.
    pub win_rate: Decimal,
    /// Peak-to-trough drawdown in percent.
    pub max_drawdown: Decimal,
    /// Profit over drawdown fraction; a placeholder, not a true Sharpe ratio.
    pub sharpe_ratio: Decimal,
    pub trades: Vec<Trade>,
    pub equity_curve: Vec<Decimal>,
}

impl BacktestResult {
    pub fn ending_equity(&self) -> Option<Decimal> {
        self.equity_curve.last().copied()
    }
}

impl fmt::Display for BacktestResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let buys = self.trades.iter().filter(|t| t.side == Side::Buy).count();
        writeln!(f, "Backtest Performance Report")?;
        writeln!(f, "------------------------------------")?;
        writeln!(f, "{:<25} {:.2}", "Total Profit", self.total_profit)?;
        writeln!(f, "{:<25} {:.2}%", "Max Drawdown", self.max_drawdown)?;
        writeln!(f, "{:<25} {:.2}", "Sharpe (proxy)", self.sharpe_ratio)?;
        writeln!(f, "------------------------------------")?;
        writeln!(f, "{:<25} {}", "Total Trades", self.trades.len())?;
        writeln!(f, "{:<25} {} / {}", "Buys / Sells", buys, self.trades.len() - buys)?;
        writeln!(
            f,
            "{:<25} {:.2}%",
            "Win Rate",
            self.win_rate * Decimal::ONE_HUNDRED
        )?;
        writeln!(f, "{:<25} {}", "Bars", self.equity_curve.len())?;
        if let Some(equity) = self.ending_equity() {
            writeln!(f, "{:<25} {:.2}", "Ending Equity", equity)?;
        }
        writeln!(f, "------------------------------------")
    }
}

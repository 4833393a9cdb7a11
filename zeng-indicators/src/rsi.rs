use rust_decimal::Decimal;

use crate::core::{Indicator, IndicatorError, Input};

/// Relative strength index with Wilder smoothing.
///
/// The first `period` price changes seed the average gain and loss; values are emitted
/// from the change after that onwards.
#[derive(Debug, Clone)]
pub struct Rsi {
    period: usize,
    previous: Option<Decimal>,
    changes: usize,
    avg_gain: Decimal,
    avg_loss: Decimal,
}

impl Rsi {
    pub fn new(period: usize) -> Result<Self, IndicatorError> {
        if period == 0 {
            return Err(IndicatorError::invalid_period("RSI", period));
        }
        Ok(Self {
            period,
            previous: None,
            changes: 0,
            avg_gain: Decimal::ZERO,
            avg_loss: Decimal::ZERO,
        })
    }
}

impl Indicator for Rsi {
    type Input = Decimal;
    type Output = Decimal;

    fn next(&mut self, input: Self::Input) -> Option<Self::Output> {
        let price = input.value();
        let previous = self.previous.replace(price)?;
        let diff = price - previous;
        let gain = diff.max(Decimal::ZERO);
        let loss = (-diff).max(Decimal::ZERO);
        let period = Decimal::from(self.period);
        self.changes += 1;

        if self.changes <= self.period {
            // Accumulate sums, converted to means once the seed window is full.
            self.avg_gain += gain;
            self.avg_loss += loss;
            if self.changes == self.period {
                self.avg_gain /= period;
                self.avg_loss /= period;
            }
            return None;
        }

        let lookback = Decimal::from(self.period - 1);
        self.avg_gain = (self.avg_gain * lookback + gain) / period;
        self.avg_loss = (self.avg_loss * lookback + loss) / period;

        if self.avg_loss.is_zero() {
            return Some(Decimal::ONE_HUNDRED);
        }
        let rs = self.avg_gain / self.avg_loss;
        Some(Decimal::ONE_HUNDRED - Decimal::ONE_HUNDRED / (Decimal::ONE + rs))
    }

    fn reset(&mut self) {
        self.previous = None;
        self.changes = 0;
        self.avg_gain = Decimal::ZERO;
        self.avg_loss = Decimal::ZERO;
    }
}

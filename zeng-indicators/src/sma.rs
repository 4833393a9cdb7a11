use std::collections::VecDeque;

use rust_decimal::Decimal;

use crate::core::{Indicator, IndicatorError, Input};

/// Simple moving average maintained with an O(1) running sum.
#[derive(Debug, Clone)]
pub struct Sma {
    period: usize,
    window: VecDeque<Decimal>,
    sum: Decimal,
}

impl Sma {
    pub fn new(period: usize) -> Result<Self, IndicatorError> {
        if period == 0 {
            return Err(IndicatorError::invalid_period("SMA", period));
        }
        Ok(Self {
            period,
            window: VecDeque::with_capacity(period),
            sum: Decimal::ZERO,
        })
    }

    pub fn period(&self) -> usize {
        self.period
    }
}

impl Indicator for Sma {
    type Input = Decimal;
    type Output = Decimal;

    fn next(&mut self, input: Self::Input) -> Option<Self::Output> {
        let value = input.value();
        self.sum += value;
        self.window.push_back(value);
        if self.window.len() > self.period {
            if let Some(leaving) = self.window.pop_front() {
                self.sum -= leaving;
            }
        }
        (self.window.len() == self.period).then(|| self.sum / Decimal::from(self.period))
    }

    fn reset(&mut self) {
        self.window.clear();
        self.sum = Decimal::ZERO;
    }
}

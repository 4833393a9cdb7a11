use rust_decimal::Decimal;

use crate::core::{ema_multiplier, Indicator, IndicatorError, Input};

/// Exponential moving average seeded with the simple mean of the first `period` values.
#[derive(Debug, Clone)]
pub struct Ema {
    period: usize,
    multiplier: Decimal,
    seed_sum: Decimal,
    seen: usize,
    current: Option<Decimal>,
}

impl Ema {
    pub fn new(period: usize) -> Result<Self, IndicatorError> {
        if period == 0 {
            return Err(IndicatorError::invalid_period("EMA", period));
        }
        Ok(Self {
            period,
            multiplier: ema_multiplier(period),
            seed_sum: Decimal::ZERO,
            seen: 0,
            current: None,
        })
    }
}

impl Indicator for Ema {
    type Input = Decimal;
    type Output = Decimal;

    fn next(&mut self, input: Self::Input) -> Option<Self::Output> {
        let price = input.value();
        match self.current {
            Some(prev) => {
                let next = (price - prev) * self.multiplier + prev;
                self.current = Some(next);
            }
            None => {
                self.seen += 1;
                self.seed_sum += price;
                if self.seen == self.period {
                    self.current = Some(self.seed_sum / Decimal::from(self.period));
                }
            }
        }
        self.current
    }

    fn reset(&mut self) {
        self.seed_sum = Decimal::ZERO;
        self.seen = 0;
        self.current = None;
    }
}

//! Core traits shared by all indicators.

use rust_decimal::Decimal;
use thiserror::Error;
use zeng_core::Candle;

/// Provides a uniform way to extract a `Decimal` value from different input types.
pub trait Input {
    /// Returns the canonical decimal representation for the input.
    fn value(&self) -> Decimal;
}

impl Input for Decimal {
    fn value(&self) -> Decimal {
        *self
    }
}

impl Input for Candle {
    fn value(&self) -> Decimal {
        self.close
    }
}

impl<T> Input for &T
where
    T: Input + ?Sized,
{
    fn value(&self) -> Decimal {
        T::value(self)
    }
}

/// Common configuration errors emitted by indicators.
#[derive(Debug, Error, PartialEq)]
pub enum IndicatorError {
    /// Returned when a period of zero is provided.
    #[error("{name} requires period > 0 (got {period})")]
    InvalidPeriod {
        /// Human-readable indicator name.
        name: &'static str,
        /// User-provided period value.
        period: usize,
    },
    /// Returned when a rolling window cannot hold a full period.
    #[error("{name} window capacity {capacity} is smaller than period {period}")]
    WindowTooSmall {
        name: &'static str,
        capacity: usize,
        period: usize,
    },
}

impl IndicatorError {
    /// Helper constructor for invalid period errors.
    pub fn invalid_period(name: &'static str, period: usize) -> Self {
        Self::InvalidPeriod { name, period }
    }
}

/// Core abstraction implemented by every indicator in the library.
pub trait Indicator {
    /// Input type accepted by the indicator.
    type Input: Input;
    /// Value produced after each update.
    type Output;

    /// Consumes a new data point and returns the most recent value, if available.
    fn next(&mut self, input: Self::Input) -> Option<Self::Output>;

    /// Resets the indicator to its initial state.
    fn reset(&mut self);
}

/// Smoothing factor `2 / (period + 1)` shared by the exponential averages.
pub(crate) fn ema_multiplier(period: usize) -> Decimal {
    Decimal::TWO / Decimal::from(period + 1)
}

#[cfg(test)]
mod tests {
    use chrono::Utc;
    use rust_decimal_macros::dec;
    use zeng_core::Candle;

    use super::{ema_multiplier, Input};

    #[test]
    fn candle_input_uses_close_price() {
        let candle = Candle {
            timestamp: Utc::now(),
            open: dec!(10),
            high: dec!(15),
            low: dec!(9.5),
            close: dec!(12.5),
            volume: dec!(100),
        };
        assert_eq!(candle.value(), dec!(12.5));
        assert_eq!((&candle).value(), dec!(12.5));
    }

    #[test]
    fn multiplier_matches_textbook_value() {
        assert_eq!(ema_multiplier(3), dec!(0.5));
        assert_eq!(ema_multiplier(9), dec!(0.2));
    }
}

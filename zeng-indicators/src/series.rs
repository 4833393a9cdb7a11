//! Batch indicator functions returning one slot per input element.
//!
//! Slots stay `None` until the indicator is warm. An empty series, a zero period or a
//! period longer than the series all yield an all-`None` output of the same length.

use zeng_core::Price;

use crate::core::{Indicator, Input};
use crate::{Ema, Rsi, Sma};

fn run<I, T>(series: &[T], indicator: Option<I>) -> Vec<Option<Price>>
where
    I: Indicator<Input = Price, Output = Price>,
    T: Input,
{
    match indicator {
        Some(mut indicator) => series
            .iter()
            .map(|item| indicator.next(item.value()))
            .collect(),
        None => vec![None; series.len()],
    }
}

/// Simple moving average of `series`.
pub fn sma<T: Input>(series: &[T], period: usize) -> Vec<Option<Price>> {
    run(series, Sma::new(period).ok())
}

/// Exponential moving average of `series`, seeded with the first `period` values' mean.
pub fn ema<T: Input>(series: &[T], period: usize) -> Vec<Option<Price>> {
    run(series, Ema::new(period).ok())
}

/// Wilder relative strength index of `series`; slots up to and including `period` are `None`.
pub fn rsi<T: Input>(series: &[T], period: usize) -> Vec<Option<Price>> {
    run(series, Rsi::new(period).ok())
}

#[cfg(test)]
mod tests {
    use rust_decimal::Decimal;
    use rust_decimal_macros::dec;

    use super::*;

    fn ramp(len: usize) -> Vec<Decimal> {
        (1..=len).map(Decimal::from).collect()
    }

    #[test]
    fn outputs_match_input_length() {
        let series = ramp(30);
        for period in [1, 5, 14, 29, 30, 31] {
            assert_eq!(sma(&series, period).len(), 30);
            assert_eq!(ema(&series, period).len(), 30);
            assert_eq!(rsi(&series, period).len(), 30);
        }
    }

    #[test]
    fn warmup_slots_are_none() {
        let series = ramp(20);
        let period = 5;
        let sma_out = sma(&series, period);
        let ema_out = ema(&series, period);
        let rsi_out = rsi(&series, period);
        for i in 0..period - 1 {
            assert!(sma_out[i].is_none());
            assert!(ema_out[i].is_none());
        }
        for slot in rsi_out.iter().take(period + 1) {
            assert!(slot.is_none());
        }
        assert_eq!(sma_out[period - 1], Some(dec!(3)));
        assert_eq!(ema_out[period - 1], Some(dec!(3)));
        assert!(rsi_out[period + 1].is_some());
    }

    #[test]
    fn empty_and_oversized_periods_are_all_none() {
        let empty: Vec<Decimal> = Vec::new();
        assert!(sma(&empty, 3).is_empty());
        let series = ramp(4);
        assert!(sma(&series, 10).iter().all(Option::is_none));
        assert!(ema(&series, 10).iter().all(Option::is_none));
        assert!(rsi(&series, 10).iter().all(Option::is_none));
        assert!(sma(&series, 0).iter().all(Option::is_none));
    }

    #[test]
    fn constant_series() {
        let series = vec![dec!(250.25); 40];
        assert!(sma(&series, 10).iter().flatten().all(|v| *v == dec!(250.25)));
        assert!(ema(&series, 10).iter().flatten().all(|v| *v == dec!(250.25)));
        let rsi_out = rsi(&series, 14);
        assert!(rsi_out.iter().flatten().all(|v| *v == Decimal::ONE_HUNDRED));
        assert_eq!(rsi_out.iter().flatten().count(), 40 - 15);
    }

    #[test]
    fn sma_matches_direct_mean() {
        let series = vec![dec!(3), dec!(9), dec!(6), dec!(12), dec!(0)];
        assert_eq!(
            sma(&series, 2),
            vec![None, Some(dec!(6)), Some(dec!(7.5)), Some(dec!(9)), Some(dec!(6))]
        );
    }
}

//! Per-symbol bounded price history used by the live ticker engine.

use std::collections::{HashMap, VecDeque};

use rust_decimal::Decimal;
use zeng_core::{Price, Symbol};

use crate::core::{ema_multiplier, Indicator, IndicatorError, Input};

/// EMA recomputed from scratch over a bounded FIFO window on every update.
///
/// The fold starts at the oldest retained price, so the value only depends on the
/// window contents and is safe to rebuild after a restart.
#[derive(Debug, Clone)]
pub struct WindowedEma {
    period: usize,
    capacity: usize,
    multiplier: Decimal,
    prices: VecDeque<Decimal>,
}

impl WindowedEma {
    pub fn new(period: usize, capacity: usize) -> Result<Self, IndicatorError> {
        if period == 0 {
            return Err(IndicatorError::invalid_period("windowed EMA", period));
        }
        if capacity < period {
            return Err(IndicatorError::WindowTooSmall {
                name: "windowed EMA",
                capacity,
                period,
            });
        }
        Ok(Self {
            period,
            capacity,
            multiplier: ema_multiplier(period),
            prices: VecDeque::with_capacity(capacity),
        })
    }

    pub fn len(&self) -> usize {
        self.prices.len()
    }

    pub fn is_empty(&self) -> bool {
        self.prices.is_empty()
    }
}

impl Indicator for WindowedEma {
    type Input = Decimal;
    type Output = Decimal;

    fn next(&mut self, input: Self::Input) -> Option<Self::Output> {
        self.prices.push_back(input.value());
        if self.prices.len() > self.capacity {
            self.prices.pop_front();
        }
        if self.prices.len() < self.period {
            return None;
        }
        let mut iter = self.prices.iter();
        let seed = *iter.next()?;
        let retain = Decimal::ONE - self.multiplier;
        Some(iter.fold(seed, |ema, price| *price * self.multiplier + ema * retain))
    }

    fn reset(&mut self) {
        self.prices.clear();
    }
}

/// Symbol-keyed collection of [`WindowedEma`] instances, created on first sight.
#[derive(Debug)]
pub struct EmaHistory {
    period: usize,
    capacity: usize,
    series: HashMap<Symbol, WindowedEma>,
}

impl EmaHistory {
    /// Validates the parameters once so per-symbol insertion cannot fail later.
    pub fn new(period: usize, capacity: usize) -> Result<Self, IndicatorError> {
        WindowedEma::new(period, capacity)?;
        Ok(Self {
            period,
            capacity,
            series: HashMap::new(),
        })
    }

    pub fn period(&self) -> usize {
        self.period
    }

    /// Appends a fused price for `symbol` and returns the EMA once the window is warm.
    pub fn update(&mut self, symbol: &str, price: Price) -> Option<Price> {
        if !self.series.contains_key(symbol) {
            let fresh = WindowedEma::new(self.period, self.capacity).ok()?;
            self.series.insert(symbol.to_string(), fresh);
        }
        self.series.get_mut(symbol)?.next(price)
    }

    /// Number of retained prices for `symbol`.
    pub fn depth(&self, symbol: &str) -> usize {
        self.series.get(symbol).map_or(0, WindowedEma::len)
    }

    pub fn symbols(&self) -> usize {
        self.series.len()
    }
}

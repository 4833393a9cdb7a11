//! Technical indicators shared by the live ticker engine and the backtester.

pub mod core;
pub mod ema;
pub mod rsi;
pub mod series;
pub mod sma;
pub mod streaming;

pub use crate::core::{Indicator, IndicatorError, Input};
pub use ema::Ema;
pub use rsi::Rsi;
pub use sma::Sma;
pub use streaming::{EmaHistory, WindowedEma};

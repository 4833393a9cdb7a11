//! Deterministic demo candles.

use chrono::{DateTime, Duration, Utc};
use rust_decimal::prelude::FromPrimitive;
use rust_decimal::Decimal;
use zeng_core::Candle;

pub const SYNTHETIC_BASE: f64 = 25_000.0;
pub const SYNTHETIC_AMPLITUDE: f64 = 500.0;

/// One-minute candles whose close follows `25000 + sin(i / 10) * 500`.
///
/// Each bar opens at the previous close; prices are rounded to two decimals.
pub fn synthetic_candles(len: usize, start: DateTime<Utc>) -> Vec<Candle> {
    let mut candles = Vec::with_capacity(len);
    let mut previous: Option<Decimal> = None;
    for i in 0..len {
        let wave = SYNTHETIC_BASE + (i as f64 / 10.0).sin() * SYNTHETIC_AMPLITUDE;
        let close = Decimal::from_f64(wave)
            .unwrap_or(Decimal::from(25_000))
            .round_dp(2);
        let open = previous.unwrap_or(close);
        candles.push(Candle {
            timestamp: start + Duration::minutes(i as i64),
            open,
            high: open.max(close),
            low: open.min(close),
            close,
            volume: Decimal::ONE,
        });
        previous = Some(close);
    }
    candles
}

#[cfg(test)]
mod tests {
    use chrono::TimeZone;
    use rust_decimal_macros::dec;

    use super::*;

    #[test]
    fn follows_the_sine_wave() {
        let start = Utc.with_ymd_and_hms(2024, 1, 1, 9, 15, 0).unwrap();
        let candles = synthetic_candles(200, start);
        assert_eq!(candles.len(), 200);
        assert_eq!(candles[0].close, dec!(25000));
        assert_eq!(candles[1].open, candles[0].close);
        assert!(candles.iter().all(|c| c.close >= dec!(24500) && c.close <= dec!(25500)));
        assert!(candles.iter().all(|c| c.low <= c.high));
        assert_eq!(candles[199].timestamp, start + Duration::minutes(199));
        assert_eq!(synthetic_candles(200, start), candles);
    }
}

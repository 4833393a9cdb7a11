//! Cross-broker price consensus and futures basis.

use std::collections::{BTreeMap, HashMap};

use rust_decimal::Decimal;
use zeng_core::{BrokerId, Price, Symbol};

/// Instruments whose symbol contains this marker are treated as futures.
pub const FUTURES_MARKER: &str = "FUT";

/// Latest price per broker for every symbol seen so far.
///
/// Entries are only ever overwritten with fresher prices, never removed.
#[derive(Debug, Default)]
pub struct FusionRegistry {
    quotes: HashMap<Symbol, BTreeMap<BrokerId, Price>>,
}

impl FusionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Records `price` for `(symbol, broker)` and returns the fused price for `symbol`.
    pub fn fuse(&mut self, symbol: &str, broker: &str, price: Price) -> Price {
        let brokers = self.quotes.entry(symbol.to_string()).or_default();
        brokers.insert(broker.to_string(), price);
        let mut prices: Vec<Price> = brokers.values().copied().collect();
        median(&mut prices).unwrap_or(price)
    }

    pub fn fused_price(&self, symbol: &str) -> Option<Price> {
        let mut prices: Vec<Price> = self.quotes.get(symbol)?.values().copied().collect();
        median(&mut prices)
    }

    pub fn broker_price(&self, symbol: &str, broker: &str) -> Option<Price> {
        self.quotes.get(symbol)?.get(broker).copied()
    }

    /// Futures premium over the underlying quoted by the same broker.
    pub fn basis(&self, symbol: &str, broker: &str, fused: Price) -> Option<Price> {
        let spot = futures_underlying(symbol)?;
        self.broker_price(spot, broker).map(|spot_price| fused - spot_price)
    }

    pub fn symbols(&self) -> usize {
        self.quotes.len()
    }
}

/// Median of `prices`; even counts average the two middle values.
pub fn median(prices: &mut [Price]) -> Option<Price> {
    if prices.is_empty() {
        return None;
    }
    prices.sort_unstable();
    let mid = prices.len() / 2;
    if prices.len() % 2 == 1 {
        Some(prices[mid])
    } else {
        Some((prices[mid - 1] + prices[mid]) / Decimal::TWO)
    }
}

/// Spot symbol for a futures contract: the text before the first space.
///
/// Returns `None` for non-futures symbols and for futures symbols without a
/// separate spot component.
pub fn futures_underlying(symbol: &str) -> Option<&str> {
    if !symbol.contains(FUTURES_MARKER) {
        return None;
    }
    let spot = symbol.split(' ').next()?;
    (!spot.is_empty() && spot != symbol).then_some(spot)
}

#[cfg(test)]
mod tests {
    use rust_decimal_macros::dec;

    use super::*;

    #[test]
    fn two_brokers_average_exactly() {
        let mut registry = FusionRegistry::new();
        assert_eq!(registry.fuse("NIFTY", "KITE", dec!(100.00)), dec!(100.00));
        assert_eq!(registry.fuse("NIFTY", "UPSTOX", dec!(100.10)), dec!(100.05));
        assert_eq!(registry.fused_price("NIFTY"), Some(dec!(100.05)));
    }

    #[test]
    fn single_broker_passes_through() {
        let mut registry = FusionRegistry::new();
        assert_eq!(registry.fuse("RELIANCE", "KITE", dec!(2501.35)), dec!(2501.35));
        assert_eq!(registry.fuse("RELIANCE", "KITE", dec!(2502.10)), dec!(2502.10));
        assert_eq!(registry.symbols(), 1);
    }

    #[test]
    fn odd_broker_count_takes_middle() {
        let mut registry = FusionRegistry::new();
        registry.fuse("X", "A", dec!(105));
        registry.fuse("X", "B", dec!(99));
        assert_eq!(registry.fuse("X", "C", dec!(101)), dec!(101));
    }

    #[test]
    fn basis_uses_same_broker_spot() {
        let mut registry = FusionRegistry::new();
        registry.fuse("NIFTY", "KITE", dec!(22000));
        registry.fuse("NIFTY", "UPSTOX", dec!(22010));
        let fused = registry.fuse("NIFTY FUT", "KITE", dec!(22045));
        assert_eq!(registry.basis("NIFTY FUT", "KITE", fused), Some(dec!(45)));
        assert_eq!(registry.basis("NIFTY FUT", "ANGEL", fused), None);
        assert_eq!(registry.basis("NIFTY", "KITE", dec!(22000)), None);
    }

    #[test]
    fn underlying_requires_separate_spot() {
        assert_eq!(futures_underlying("BANKNIFTY 24MAY FUT"), Some("BANKNIFTY"));
        assert_eq!(futures_underlying("NIFTYFUT"), None);
        assert_eq!(futures_underlying("RELIANCE"), None);
    }
}

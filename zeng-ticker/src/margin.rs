//! Per-broker margin aggregation.

use std::collections::BTreeMap;

use rust_decimal::Decimal;
use zeng_core::BrokerId;

use crate::protocol::{BrokerMargin, MarginReport, UnifiedMargin};

#[derive(Debug, Default)]
pub struct MarginBook {
    brokers: BTreeMap<BrokerId, BrokerMargin>,
}

impl MarginBook {
    /// Stores the latest report for its broker and returns the aggregate view.
    pub fn record(&mut self, report: MarginReport) -> UnifiedMargin {
        self.brokers.insert(report.broker, report.margin);
        self.unified()
    }

    pub fn unified(&self) -> UnifiedMargin {
        let total_margin = self
            .brokers
            .values()
            .map(|margin| margin.available)
            .sum::<Decimal>();
        UnifiedMargin {
            total_margin,
            brokers: self.brokers.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use rust_decimal_macros::dec;

    use super::*;

    fn report(broker: &str, available: Decimal) -> MarginReport {
        MarginReport {
            broker: broker.into(),
            margin: BrokerMargin {
                available,
                used: Decimal::ZERO,
            },
        }
    }

    #[test]
    fn totals_latest_available_per_broker() {
        let mut book = MarginBook::default();
        book.record(report("KITE", dec!(150000)));
        book.record(report("UPSTOX", dec!(50000.50)));
        let unified = book.record(report("KITE", dec!(120000)));
        assert_eq!(unified.total_margin, dec!(170000.50));
        assert_eq!(unified.brokers.len(), 2);
    }
}

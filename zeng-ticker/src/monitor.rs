//! Loss-limit halt and feed staleness detection.

use std::time::Duration;

use tokio::time::Instant;
use zeng_core::Price;

use crate::connection::ConnectionManager;
use crate::protocol::{FailoverSuggestion, HaltNotice, HaltReason, RiskLimits, RiskLimitsUpdate};

/// One-way loss breaker. Once tripped it stays tripped for the life of the engine.
#[derive(Debug)]
pub struct RiskMonitor {
    limits: RiskLimits,
    halted: bool,
}

impl RiskMonitor {
    pub fn new(limits: RiskLimits) -> Self {
        Self {
            limits,
            halted: false,
        }
    }

    pub fn limits(&self) -> RiskLimits {
        self.limits
    }

    pub fn is_halted(&self) -> bool {
        self.halted
    }

    pub fn update_limits(&mut self, update: &RiskLimitsUpdate) {
        if let Some(max_loss) = update.max_loss {
            self.limits.max_loss = max_loss;
        }
        if let Some(max_trades) = update.max_trades {
            self.limits.max_trades = max_trades;
        }
    }

    /// Trips the breaker when `mtm` is at or below the loss limit.
    ///
    /// Returns a notice only on the transition into the halted state.
    pub fn check(&mut self, mtm: Price) -> Option<HaltNotice> {
        if self.halted || mtm > self.limits.max_loss {
            return None;
        }
        self.halted = true;
        Some(HaltNotice {
            reason: HaltReason::MaxLossLimitReached,
            value: self.limits.max_loss,
        })
    }
}

/// Flags push streams that have gone quiet for longer than the threshold.
#[derive(Clone, Copy, Debug)]
pub struct StalenessWatchdog {
    threshold: Duration,
}

impl StalenessWatchdog {
    pub fn new(threshold: Duration) -> Self {
        Self { threshold }
    }

    pub fn threshold(&self) -> Duration {
        self.threshold
    }

    pub fn scan(&self, connections: &ConnectionManager, now: Instant) -> Vec<FailoverSuggestion> {
        connections
            .lagging_streams(now, self.threshold)
            .into_iter()
            .map(|(laggy_key, broker)| FailoverSuggestion { laggy_key, broker })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use rust_decimal_macros::dec;

    use super::*;

    #[test]
    fn halts_once_at_or_below_limit() {
        let mut monitor = RiskMonitor::new(RiskLimits::default());
        assert!(monitor.check(dec!(-9999.99)).is_none());
        let notice = monitor.check(dec!(-10000)).expect("limit reached");
        assert_eq!(notice.value, dec!(-10000));
        assert_eq!(notice.reason, HaltReason::MaxLossLimitReached);
        assert!(monitor.is_halted());
        assert!(monitor.check(dec!(-20000)).is_none());
        assert!(monitor.check(dec!(5000)).is_none());
        assert!(monitor.is_halted());
    }

    #[test]
    fn partial_limit_updates_keep_other_fields() {
        let mut monitor = RiskMonitor::new(RiskLimits::default());
        monitor.update_limits(&RiskLimitsUpdate {
            max_loss: Some(dec!(-500)),
            max_trades: None,
        });
        assert_eq!(
            monitor.limits(),
            RiskLimits {
                max_loss: dec!(-500),
                max_trades: 50,
            }
        );
        assert!(monitor.check(dec!(-501)).is_some());
    }
}

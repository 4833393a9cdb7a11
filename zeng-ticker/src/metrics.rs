//! Prometheus instrumentation for the ticker engine.

use prometheus::{Gauge, GaugeVec, IntCounter, IntGauge, Opts, Registry};
use rust_decimal::prelude::ToPrimitive;
use zeng_core::{ConnectionKey, Price};

#[derive(Clone)]
pub struct TickerMetrics {
    registry: Registry,
    ticks_total: IntCounter,
    payloads_dropped: IntCounter,
    reconnects_total: IntCounter,
    failover_suggestions: IntCounter,
    halts_total: IntCounter,
    active_connections: IntGauge,
    fused_symbols: IntGauge,
    fused_price: GaugeVec,
    connection_status: GaugeVec,
    last_tick_timestamp: Gauge,
}

impl TickerMetrics {
    pub fn new() -> prometheus::Result<Self> {
        let registry = Registry::new();
        let ticks_total = IntCounter::new("zeng_ticks_total", "Ticks enriched and published")?;
        let payloads_dropped = IntCounter::new(
            "zeng_payloads_dropped_total",
            "Feed payloads discarded because they could not be decoded",
        )?;
        let reconnects_total =
            IntCounter::new("zeng_reconnects_total", "Reconnect timers armed")?;
        let failover_suggestions = IntCounter::new(
            "zeng_failover_suggestions_total",
            "Failover suggestions emitted for lagging push streams",
        )?;
        let halts_total = IntCounter::new("zeng_halts_total", "Loss-limit halts triggered")?;
        let active_connections =
            IntGauge::new("zeng_active_connections", "Connection instances currently registered")?;
        let fused_symbols =
            IntGauge::new("zeng_fused_symbols", "Symbols with at least one fused price")?;
        let fused_price = GaugeVec::new(
            Opts::new("zeng_fused_price", "Latest cross-broker fused price per symbol"),
            &["symbol"],
        )?;
        let connection_status = GaugeVec::new(
            Opts::new(
                "zeng_connection_status",
                "Status of feed connections (1=connected, 0=disconnected)",
            ),
            &["key"],
        )?;
        let last_tick_timestamp = Gauge::new(
            "zeng_last_tick_timestamp_seconds",
            "Unix timestamp of the last published tick batch",
        )?;

        registry.register(Box::new(ticks_total.clone()))?;
        registry.register(Box::new(payloads_dropped.clone()))?;
        registry.register(Box::new(reconnects_total.clone()))?;
        registry.register(Box::new(failover_suggestions.clone()))?;
        registry.register(Box::new(halts_total.clone()))?;
        registry.register(Box::new(active_connections.clone()))?;
        registry.register(Box::new(fused_symbols.clone()))?;
        registry.register(Box::new(fused_price.clone()))?;
        registry.register(Box::new(connection_status.clone()))?;
        registry.register(Box::new(last_tick_timestamp.clone()))?;

        Ok(Self {
            registry,
            ticks_total,
            payloads_dropped,
            reconnects_total,
            failover_suggestions,
            halts_total,
            active_connections,
            fused_symbols,
            fused_price,
            connection_status,
            last_tick_timestamp,
        })
    }

    pub fn registry(&self) -> Registry {
        self.registry.clone()
    }

    pub fn inc_ticks(&self, count: usize) {
        self.ticks_total.inc_by(count as u64);
    }

    pub fn inc_dropped(&self) {
        self.payloads_dropped.inc();
    }

    pub fn inc_reconnect(&self) {
        self.reconnects_total.inc();
    }

    pub fn inc_failover(&self) {
        self.failover_suggestions.inc();
    }

    pub fn inc_halt(&self) {
        self.halts_total.inc();
    }

    pub fn set_active_connections(&self, count: usize) {
        self.active_connections.set(count as i64);
    }

    pub fn set_fused_symbols(&self, count: usize) {
        self.fused_symbols.set(count as i64);
    }

    pub fn update_fused_price(&self, symbol: &str, price: Price) {
        if let Some(value) = price.to_f64() {
            self.fused_price.with_label_values(&[symbol]).set(value);
        }
    }

    pub fn update_connection_status(&self, key: &ConnectionKey, connected: bool) {
        let value = if connected { 1.0 } else { 0.0 };
        self.connection_status
            .with_label_values(&[key.as_str()])
            .set(value);
    }

    pub fn update_last_tick(&self, timestamp_secs: f64) {
        self.last_tick_timestamp.set(timestamp_secs);
    }

    pub fn ticks(&self) -> u64 {
        self.ticks_total.get()
    }

    pub fn dropped(&self) -> u64 {
        self.payloads_dropped.get()
    }

    pub fn reconnects(&self) -> u64 {
        self.reconnects_total.get()
    }

    pub fn failovers(&self) -> u64 {
        self.failover_suggestions.get()
    }

    pub fn halts(&self) -> u64 {
        self.halts_total.get()
    }
}

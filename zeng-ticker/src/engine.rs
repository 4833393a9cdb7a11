//! The single-owner event loop that ties transports, fusion and risk together.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use serde::Deserialize;
use tokio::sync::mpsc;
use tokio::time::{self, Instant, MissedTickBehavior};
use tracing::{debug, error, info, trace, warn};
use zeng_broker::{Connector, Frame, TransportEvent, TransportMessage};
use zeng_core::{ConnectionKey, FeedKind, Price, Tick, TickIndicators, TickPayload};
use zeng_indicators::EmaHistory;

use crate::connection::{ConnectionManager, ReconnectDue};
use crate::fusion::FusionRegistry;
use crate::margin::MarginBook;
use crate::metrics::TickerMetrics;
use crate::monitor::{RiskMonitor, StalenessWatchdog};
use crate::protocol::{Command, Event, HostMessage, MetricsSnapshot, RiskLimits, TickBatch};
use crate::TickerError;

/// Period of the streaming EMA attached to every tick as `ema20`.
pub const EMA_PERIOD: usize = 20;

/// Runtime knobs for [`TickerEngine`].
#[derive(Clone, Debug)]
pub struct EngineConfig {
    pub reconnect_interval: Duration,
    pub lag_threshold: Duration,
    pub history_capacity: usize,
    pub metrics_interval: Duration,
    pub risk: RiskLimits,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            reconnect_interval: Duration::from_millis(5000),
            lag_threshold: Duration::from_millis(3000),
            history_capacity: 500,
            metrics_interval: Duration::from_secs(5),
            risk: RiskLimits::default(),
        }
    }
}

#[derive(Deserialize)]
struct StatusFrame {
    connected: bool,
}

pub struct TickerEngine {
    config: EngineConfig,
    connections: ConnectionManager,
    fusion: FusionRegistry,
    history: EmaHistory,
    risk: RiskMonitor,
    staleness: StalenessWatchdog,
    margins: MarginBook,
    metrics: TickerMetrics,
    events: mpsc::UnboundedSender<Event>,
    transport_rx: mpsc::UnboundedReceiver<TransportMessage>,
    reconnect_rx: mpsc::UnboundedReceiver<ReconnectDue>,
}

impl TickerEngine {
    /// Builds an engine and the receiver on which it publishes events.
    pub fn new(
        config: EngineConfig,
        connector: Arc<dyn Connector>,
    ) -> Result<(Self, mpsc::UnboundedReceiver<Event>), TickerError> {
        let history = EmaHistory::new(EMA_PERIOD, config.history_capacity)?;
        let metrics = TickerMetrics::new()?;
        let (transport_tx, transport_rx) = mpsc::unbounded_channel();
        let (reconnect_tx, reconnect_rx) = mpsc::unbounded_channel();
        let (events, events_rx) = mpsc::unbounded_channel();
        let connections = ConnectionManager::new(
            connector,
            transport_tx,
            reconnect_tx,
            config.reconnect_interval,
        );
        let engine = Self {
            risk: RiskMonitor::new(config.risk),
            staleness: StalenessWatchdog::new(config.lag_threshold),
            config,
            connections,
            fusion: FusionRegistry::new(),
            history,
            margins: MarginBook::default(),
            metrics,
            events,
            transport_rx,
            reconnect_rx,
        };
        Ok((engine, events_rx))
    }

    pub fn metrics(&self) -> &TickerMetrics {
        &self.metrics
    }

    pub fn connections(&self) -> &ConnectionManager {
        &self.connections
    }

    pub fn is_halted(&self) -> bool {
        self.risk.is_halted()
    }

    /// Processes host commands and internal events until the command channel closes.
    pub async fn run(mut self, mut commands: mpsc::UnboundedReceiver<HostMessage>) {
        let period = self.config.metrics_interval;
        let mut metrics_timer = time::interval_at(Instant::now() + period, period);
        metrics_timer.set_missed_tick_behavior(MissedTickBehavior::Delay);
        info!(
            reconnect_ms = self.config.reconnect_interval.as_millis() as u64,
            lag_threshold_ms = self.config.lag_threshold.as_millis() as u64,
            "ticker engine started"
        );
        loop {
            tokio::select! {
                message = commands.recv() => match message {
                    Some(message) => self.handle_host(message),
                    None => break,
                },
                Some(message) = self.transport_rx.recv() => self.handle_transport(message),
                Some(due) = self.reconnect_rx.recv() => self.handle_reconnect(due),
                _ = metrics_timer.tick() => self.publish_metrics(),
            }
        }
        let closed = self.connections.disconnect_all();
        info!(connections = closed.len(), "ticker engine stopped");
    }

    /// Applies one host message. Any attached mark-to-market is evaluated first.
    pub fn handle_host(&mut self, message: HostMessage) {
        if let Some(mtm) = message.current_mtm {
            self.evaluate_mtm(mtm);
        }
        let command = match message.command {
            Ok(command) => command,
            Err(reason) => {
                warn!(%reason, "ignoring unrecognised host command");
                return;
            }
        };
        match command {
            Command::Connect(request) => {
                let spec = request.into_spec();
                if self.risk.is_halted() {
                    warn!(key = %spec.key(), "connect refused while trading is halted");
                    self.emit(Event::error(&spec.key(), "trading halted"));
                    return;
                }
                let key = spec.key();
                if self.connections.connect(spec) {
                    self.announce_closed(&key);
                }
                self.metrics.set_active_connections(self.connections.len());
            }
            Command::Disconnect(request) => {
                let key = request.key();
                if self.connections.disconnect(&key) {
                    info!(key = %key, "feed disconnected by host");
                    self.announce_closed(&key);
                }
                self.metrics.set_active_connections(self.connections.len());
            }
            Command::UpdateRiskLimits(update) => {
                if update.is_empty() {
                    debug!("risk limit update carried no limits");
                    return;
                }
                self.risk.update_limits(&update);
                let limits = self.risk.limits();
                info!(max_loss = %limits.max_loss, max_trades = limits.max_trades, "risk limits updated");
            }
            Command::UpdateMargin(report) => {
                let unified = self.margins.record(report);
                self.emit(Event::UnifiedMargin(unified));
            }
            Command::MarkToMarket(_) => {}
        }
    }

    /// Routes one transport event. Events from replaced incarnations are ignored.
    pub fn handle_transport(&mut self, message: TransportMessage) {
        if !self.connections.is_current(&message) {
            trace!(key = %message.key, generation = message.generation, "ignoring stale transport event");
            return;
        }
        let key = message.key;
        match message.event {
            TransportEvent::Opened => {
                self.connections.mark_connected(&key);
                self.broadcast(&key, Event::status(&key, true));
            }
            TransportEvent::Frame(Frame::Tick(text)) => self.handle_tick_payload(&key, &text),
            TransportEvent::Frame(Frame::Binary(bytes)) => match String::from_utf8(bytes) {
                Ok(text) => self.handle_tick_payload(&key, &text),
                Err(_) => self.drop_payload(&key, "binary frame is not utf-8"),
            },
            TransportEvent::Frame(Frame::Status(text)) => {
                match serde_json::from_str::<StatusFrame>(&text) {
                    Ok(status) => self.broadcast(&key, Event::status(&key, status.connected)),
                    Err(err) => self.drop_payload(&key, &err.to_string()),
                }
            }
            TransportEvent::Failed(detail) => {
                let kind = self.kind_of(&key);
                warn!(key = %key, error = %detail, "feed transport failed");
                self.broadcast(&key, Event::error(&key, failure_message(kind)));
                self.arm_reconnect(&key);
            }
            TransportEvent::Closed => {
                info!(key = %key, "feed closed by remote");
                self.broadcast(&key, Event::status(&key, false));
                self.arm_reconnect(&key);
            }
        }
    }

    /// Reopens a feed when its still-armed timer fires.
    pub fn handle_reconnect(&mut self, due: ReconnectDue) {
        if self.risk.is_halted() {
            return;
        }
        let Some(spec) = self.connections.take_due(&due) else {
            debug!(key = %due.key, "ignoring cancelled reconnect timer");
            return;
        };
        info!(key = %due.key, "reconnecting feed");
        if self.connections.connect(spec) {
            self.announce_closed(&due.key);
        }
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            ticks_processed: self.metrics.ticks(),
            payloads_dropped: self.metrics.dropped(),
            reconnects_scheduled: self.metrics.reconnects(),
            failover_suggestions: self.metrics.failovers(),
            active_connections: self.connections.len(),
            pending_reconnects: self.connections.pending_reconnects(),
            fused_symbols: self.fusion.symbols(),
            halted: self.risk.is_halted(),
            risk_limits: self.risk.limits(),
        }
    }

    pub fn publish_metrics(&mut self) {
        self.metrics.set_active_connections(self.connections.len());
        self.metrics.set_fused_symbols(self.fusion.symbols());
        self.emit(Event::Metrics(self.snapshot()));
    }

    fn handle_tick_payload(&mut self, key: &ConnectionKey, text: &str) {
        let payload = match serde_json::from_str::<TickPayload>(text) {
            Ok(payload) => payload,
            Err(err) => {
                self.drop_payload(key, &err.to_string());
                return;
            }
        };
        let Some(broker) = self
            .connections
            .get(key)
            .map(|instance| instance.spec().broker.clone())
        else {
            return;
        };
        let mut ticks = payload.into_ticks();
        for tick in &mut ticks {
            self.enrich(key, &broker, tick);
        }
        self.metrics.inc_ticks(ticks.len());
        self.metrics
            .update_last_tick(Utc::now().timestamp_millis() as f64 / 1000.0);
        self.broadcast(
            key,
            Event::Tick(TickBatch {
                data: ticks,
                key: key.clone(),
            }),
        );
    }

    fn enrich(&mut self, key: &ConnectionKey, broker: &str, tick: &mut Tick) {
        let Some(price) = tick.last_price.filter(|price| !price.is_zero()) else {
            return;
        };
        let symbol = tick.resolve_symbol(key);
        let fused = self.fusion.fuse(&symbol, broker, price);
        tick.fused_price = Some(fused);
        tick.indicators = Some(TickIndicators {
            ema20: self.history.update(&symbol, fused),
        });
        tick.basis = self.fusion.basis(&symbol, broker, fused);
        self.metrics.update_fused_price(&symbol, fused);
    }

    /// Publishes a feed event, refreshes the feed's activity clock and runs the lag scan.
    fn broadcast(&mut self, key: &ConnectionKey, event: Event) {
        let now = Instant::now();
        self.connections.touch(key, now);
        if let Event::Status(status) = &event {
            self.metrics.update_connection_status(key, status.connected);
        }
        self.emit(event);
        self.check_failover(now);
    }

    fn check_failover(&mut self, now: Instant) {
        for suggestion in self.staleness.scan(&self.connections, now) {
            warn!(key = %suggestion.laggy_key, broker = %suggestion.broker, "push stream lagging");
            self.metrics.inc_failover();
            self.emit(Event::FailoverSuggestion(suggestion));
        }
    }

    fn evaluate_mtm(&mut self, mtm: Price) {
        let Some(notice) = self.risk.check(mtm) else {
            return;
        };
        error!(mtm = %mtm, limit = %notice.value, "max loss reached; halting all feeds");
        self.metrics.inc_halt();
        for key in self.connections.disconnect_all() {
            self.announce_closed(&key);
        }
        self.metrics.set_active_connections(0);
        self.emit(Event::CyberPauseTriggered(notice));
    }

    fn arm_reconnect(&mut self, key: &ConnectionKey) {
        if self.risk.is_halted() {
            return;
        }
        if self.connections.schedule_reconnect(key) {
            self.metrics.inc_reconnect();
        }
    }

    fn announce_closed(&mut self, key: &ConnectionKey) {
        self.metrics.update_connection_status(key, false);
        self.emit(Event::status(key, false));
    }

    fn drop_payload(&self, key: &ConnectionKey, reason: &str) {
        debug!(key = %key, reason, "dropping undecodable feed payload");
        self.metrics.inc_dropped();
    }

    fn kind_of(&self, key: &ConnectionKey) -> FeedKind {
        self.connections
            .get(key)
            .map_or(FeedKind::Socket, |instance| instance.spec().kind)
    }

    fn emit(&self, event: Event) {
        if self.events.send(event).is_err() {
            trace!("event receiver dropped");
        }
    }
}

fn failure_message(kind: FeedKind) -> &'static str {
    match kind {
        FeedKind::Stream => "SSE Connection Failed",
        FeedKind::Socket => "WS Connection Failed",
    }
}

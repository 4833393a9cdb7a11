//! Real-time multi-broker ticker: connection lifecycle, price fusion, streaming
//! indicators, failover hints and the max-loss halt.
//!
//! The engine runs as one task that owns all mutable state. Hosts talk to it with
//! [`HostMessage`]s and receive [`Event`]s through a [`TickerHandle`].

use std::sync::Arc;

use thiserror::Error;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use zeng_broker::Connector;
use zeng_indicators::IndicatorError;

pub mod connection;
pub mod engine;
pub mod fusion;
pub mod margin;
pub mod metrics;
pub mod monitor;
pub mod protocol;

pub use engine::{EngineConfig, TickerEngine, EMA_PERIOD};
pub use metrics::TickerMetrics;
pub use protocol::{Command, Event, HostMessage, RiskLimits};

#[derive(Debug, Error)]
pub enum TickerError {
    #[error("invalid indicator settings: {0}")]
    Indicator(#[from] IndicatorError),
    #[error("failed to register metrics: {0}")]
    Metrics(#[from] prometheus::Error),
    #[error("ticker engine is no longer running")]
    ChannelClosed,
}

/// Host-side handle to a running engine task.
pub struct TickerHandle {
    commands: Option<mpsc::UnboundedSender<HostMessage>>,
    events: mpsc::UnboundedReceiver<Event>,
    metrics: TickerMetrics,
    task: JoinHandle<()>,
}

impl TickerHandle {
    pub fn send(&self, message: impl Into<HostMessage>) -> Result<(), TickerError> {
        let commands = self.commands.as_ref().ok_or(TickerError::ChannelClosed)?;
        commands
            .send(message.into())
            .map_err(|_| TickerError::ChannelClosed)
    }

    /// Stops accepting commands. The engine tears down its feeds once the queued
    /// commands are processed, after which [`TickerHandle::next_event`] drains the
    /// remaining events and returns `None`.
    pub fn close(&mut self) {
        self.commands = None;
    }

    pub async fn next_event(&mut self) -> Option<Event> {
        self.events.recv().await
    }

    pub fn try_next_event(&mut self) -> Option<Event> {
        self.events.try_recv().ok()
    }

    pub fn metrics(&self) -> &TickerMetrics {
        &self.metrics
    }

    /// Closes the command channel and waits for the engine to tear down every feed.
    pub async fn shutdown(mut self) {
        self.close();
        let _ = self.task.await;
    }
}

/// Spawns a [`TickerEngine`] on the current runtime.
pub fn spawn_ticker(
    config: EngineConfig,
    connector: Arc<dyn Connector>,
) -> Result<TickerHandle, TickerError> {
    let (engine, events) = TickerEngine::new(config, connector)?;
    let metrics = engine.metrics().clone();
    let (commands, command_rx) = mpsc::unbounded_channel();
    let task = tokio::spawn(engine.run(command_rx));
    Ok(TickerHandle {
        commands: Some(commands),
        events,
        metrics,
        task,
    })
}

//! Broker-agnostic transport plumbing used by the ticker engine.
//!
//! A [`Connector`] turns a [`FeedSpec`] into a running transport task. The task reports
//! everything it observes through a [`TransportSink`]; the engine owns the returned
//! [`TransportHandle`] and closes the transport by dropping or closing it.

use std::future::Future;

use thiserror::Error;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use zeng_core::{ConnectionKey, FeedSpec};

pub mod network;
pub mod sse;
pub mod ws;

pub use network::NetworkConnector;

/// Convenience alias for broker results.
pub type BrokerResult<T> = Result<T, BrokerError>;

/// Common error type returned by transport implementations.
#[derive(Debug, Error)]
pub enum BrokerError {
    /// Represents transport-level failures (network, timeouts, etc.).
    #[error("transport error: {0}")]
    Transport(String),
    /// Returned when a feed descriptor cannot be served.
    #[error("invalid request: {0}")]
    InvalidRequest(String),
    /// Wraps serialization or parsing errors.
    #[error("serialization error: {0}")]
    Serialization(String),
    /// A catch-all branch for other issues.
    #[error("unexpected error: {0}")]
    Other(String),
}

impl BrokerError {
    /// Helper used by transports when mapping any error type into a broker error.
    pub fn from_display(err: impl std::fmt::Display, kind: BrokerErrorKind) -> Self {
        match kind {
            BrokerErrorKind::Transport => Self::Transport(err.to_string()),
            BrokerErrorKind::InvalidRequest => Self::InvalidRequest(err.to_string()),
            BrokerErrorKind::Serialization => Self::Serialization(err.to_string()),
            BrokerErrorKind::Other => Self::Other(err.to_string()),
        }
    }
}

/// Enumerates the broad families of broker errors.
#[derive(Debug, Clone, Copy)]
pub enum BrokerErrorKind {
    Transport,
    InvalidRequest,
    Serialization,
    Other,
}

/// A message-framed payload delivered by a transport.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Frame {
    /// Text payload carrying one tick or a batch of ticks.
    Tick(String),
    /// Server-reported connection status (push streams only).
    Status(String),
    /// Opaque binary payload from a socket.
    Binary(Vec<u8>),
}

/// Lifecycle and data events reported by a transport task.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum TransportEvent {
    Opened,
    Frame(Frame),
    /// The transport failed; the detail is for logs only.
    Failed(String),
    /// The remote side closed the transport cleanly.
    Closed,
}

/// Envelope routed back to the engine, tagged with the incarnation that produced it.
#[derive(Clone, Debug)]
pub struct TransportMessage {
    pub key: ConnectionKey,
    pub generation: u64,
    pub event: TransportEvent,
}

/// Write side handed to a transport task.
#[derive(Clone, Debug)]
pub struct TransportSink {
    key: ConnectionKey,
    generation: u64,
    tx: mpsc::UnboundedSender<TransportMessage>,
}

impl TransportSink {
    pub fn new(
        key: ConnectionKey,
        generation: u64,
        tx: mpsc::UnboundedSender<TransportMessage>,
    ) -> Self {
        Self {
            key,
            generation,
            tx,
        }
    }

    pub fn key(&self) -> &ConnectionKey {
        &self.key
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Forwards an event to the engine; returns `false` once the engine has gone away.
    pub fn send(&self, event: TransportEvent) -> bool {
        self.tx
            .send(TransportMessage {
                key: self.key.clone(),
                generation: self.generation,
                event,
            })
            .is_ok()
    }
}

/// Owned handle to a running transport; closing it stops all network activity.
#[derive(Debug, Default)]
pub struct TransportHandle {
    task: Option<JoinHandle<()>>,
}

impl TransportHandle {
    /// Runs `transport` on the tokio runtime.
    pub fn spawn<F>(transport: F) -> Self
    where
        F: Future<Output = ()> + Send + 'static,
    {
        Self {
            task: Some(tokio::spawn(transport)),
        }
    }

    /// A handle with no backing task, for connectors driven externally.
    pub fn detached() -> Self {
        Self { task: None }
    }

    pub fn close(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }

    pub fn is_closed(&self) -> bool {
        self.task.as_ref().map_or(true, JoinHandle::is_finished)
    }
}

impl Drop for TransportHandle {
    fn drop(&mut self) {
        self.close();
    }
}

/// Opens transports for feed descriptors.
pub trait Connector: Send + Sync {
    /// Starts a transport for `spec`. Must not block; connection happens inside the task.
    fn open(&self, spec: &FeedSpec, sink: TransportSink) -> TransportHandle;
}

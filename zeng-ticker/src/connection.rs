//! Registry of live feed connections and their reconnect timers.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, info};
use zeng_broker::{Connector, TransportHandle, TransportMessage, TransportSink};
use zeng_core::{BrokerId, ConnectionKey, FeedKind, FeedSpec};

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum ConnectionState {
    Connecting,
    Connected,
    /// Transport failed or closed; a reconnect is pending.
    Error,
}

/// Fired by a reconnect timer back into the engine loop.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct ReconnectDue {
    pub key: ConnectionKey,
    pub generation: u64,
}

/// Pending reconnect; dropping it cancels the timer.
#[derive(Debug)]
struct ReconnectTimer {
    generation: u64,
    task: JoinHandle<()>,
}

impl Drop for ReconnectTimer {
    fn drop(&mut self) {
        self.task.abort();
    }
}

#[derive(Debug)]
pub struct ConnectionInstance {
    spec: FeedSpec,
    state: ConnectionState,
    generation: u64,
    last_activity: Instant,
    transport: Option<TransportHandle>,
    reconnect: Option<ReconnectTimer>,
}

impl ConnectionInstance {
    pub fn spec(&self) -> &FeedSpec {
        &self.spec
    }

    pub fn state(&self) -> ConnectionState {
        self.state
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn last_activity(&self) -> Instant {
        self.last_activity
    }

    pub fn reconnect_pending(&self) -> bool {
        self.reconnect.is_some()
    }

    fn shutdown(&mut self) {
        if let Some(mut transport) = self.transport.take() {
            transport.close();
        }
        self.reconnect = None;
    }
}

impl Drop for ConnectionInstance {
    fn drop(&mut self) {
        self.shutdown();
    }
}

/// Owns every connection instance; at most one per key.
pub struct ConnectionManager {
    connector: Arc<dyn Connector>,
    instances: BTreeMap<ConnectionKey, ConnectionInstance>,
    transport_tx: mpsc::UnboundedSender<TransportMessage>,
    reconnect_tx: mpsc::UnboundedSender<ReconnectDue>,
    reconnect_interval: Duration,
    next_generation: u64,
}

impl ConnectionManager {
    pub fn new(
        connector: Arc<dyn Connector>,
        transport_tx: mpsc::UnboundedSender<TransportMessage>,
        reconnect_tx: mpsc::UnboundedSender<ReconnectDue>,
        reconnect_interval: Duration,
    ) -> Self {
        Self {
            connector,
            instances: BTreeMap::new(),
            transport_tx,
            reconnect_tx,
            reconnect_interval,
            next_generation: 0,
        }
    }

    /// Opens a transport for `spec`, replacing any instance under the same key.
    ///
    /// Returns `true` when an existing instance was torn down first.
    pub fn connect(&mut self, spec: FeedSpec) -> bool {
        let key = spec.key();
        let replaced = self.disconnect(&key);
        self.next_generation += 1;
        let generation = self.next_generation;
        let sink = TransportSink::new(key.clone(), generation, self.transport_tx.clone());
        let transport = self.connector.open(&spec, sink);
        info!(key = %key, kind = %spec.kind, broker = %spec.broker, generation, "opening feed");
        self.instances.insert(
            key,
            ConnectionInstance {
                spec,
                state: ConnectionState::Connecting,
                generation,
                last_activity: Instant::now(),
                transport: Some(transport),
                reconnect: None,
            },
        );
        replaced
    }

    /// Removes the instance under `key`, closing its transport and cancelling its timer.
    pub fn disconnect(&mut self, key: &ConnectionKey) -> bool {
        match self.instances.remove(key) {
            Some(mut instance) => {
                instance.shutdown();
                debug!(key = %key, "connection torn down");
                true
            }
            None => false,
        }
    }

    /// Tears down every instance and returns their keys.
    pub fn disconnect_all(&mut self) -> Vec<ConnectionKey> {
        let keys: Vec<ConnectionKey> = self.instances.keys().cloned().collect();
        for key in &keys {
            self.disconnect(key);
        }
        keys
    }

    /// True when `message` was produced by the current incarnation of its key.
    pub fn is_current(&self, message: &TransportMessage) -> bool {
        self.instances
            .get(&message.key)
            .is_some_and(|instance| instance.generation == message.generation)
    }

    pub fn mark_connected(&mut self, key: &ConnectionKey) {
        if let Some(instance) = self.instances.get_mut(key) {
            instance.state = ConnectionState::Connected;
        }
    }

    pub fn touch(&mut self, key: &ConnectionKey, now: Instant) {
        if let Some(instance) = self.instances.get_mut(key) {
            instance.last_activity = now;
        }
    }

    /// Marks the instance failed and arms a single reconnect timer for it.
    ///
    /// Any previously pending timer for the key is cancelled first.
    pub fn schedule_reconnect(&mut self, key: &ConnectionKey) -> bool {
        let Some(instance) = self.instances.get_mut(key) else {
            return false;
        };
        instance.state = ConnectionState::Error;
        if let Some(mut transport) = instance.transport.take() {
            transport.close();
        }
        let due = ReconnectDue {
            key: key.clone(),
            generation: instance.generation,
        };
        let tx = self.reconnect_tx.clone();
        let delay = self.reconnect_interval;
        let task = tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            let _ = tx.send(due);
        });
        instance.reconnect = Some(ReconnectTimer {
            generation: instance.generation,
            task,
        });
        debug!(key = %key, delay_ms = delay.as_millis() as u64, "reconnect scheduled");
        true
    }

    /// Resolves a fired timer into the spec to reconnect, if the timer is still armed.
    pub fn take_due(&mut self, due: &ReconnectDue) -> Option<FeedSpec> {
        let instance = self.instances.get_mut(&due.key)?;
        let armed = instance
            .reconnect
            .as_ref()
            .is_some_and(|timer| timer.generation == due.generation);
        if !armed {
            return None;
        }
        instance.reconnect = None;
        Some(instance.spec.clone())
    }

    /// Push-stream instances whose last activity is older than `threshold`.
    pub fn lagging_streams(&self, now: Instant, threshold: Duration) -> Vec<(ConnectionKey, BrokerId)> {
        self.instances
            .iter()
            .filter(|(_, instance)| instance.spec.kind == FeedKind::Stream)
            .filter(|(_, instance)| now.saturating_duration_since(instance.last_activity) > threshold)
            .map(|(key, instance)| (key.clone(), instance.spec.broker.clone()))
            .collect()
    }

    pub fn get(&self, key: &ConnectionKey) -> Option<&ConnectionInstance> {
        self.instances.get(key)
    }

    pub fn len(&self) -> usize {
        self.instances.len()
    }

    pub fn is_empty(&self) -> bool {
        self.instances.is_empty()
    }

    pub fn pending_reconnects(&self) -> usize {
        self.instances
            .values()
            .filter(|instance| instance.reconnect.is_some())
            .count()
    }

    pub fn open_transports(&self) -> usize {
        self.instances
            .values()
            .filter(|instance| instance.transport.is_some())
            .count()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use zeng_broker::TransportEvent;

    use super::*;

    #[derive(Default)]
    struct RecordingConnector {
        sinks: Mutex<Vec<TransportSink>>,
    }

    impl Connector for RecordingConnector {
        fn open(&self, _spec: &FeedSpec, sink: TransportSink) -> TransportHandle {
            self.sinks.lock().unwrap().push(sink);
            TransportHandle::detached()
        }
    }

    fn manager(
        connector: Arc<RecordingConnector>,
    ) -> (
        ConnectionManager,
        mpsc::UnboundedReceiver<TransportMessage>,
        mpsc::UnboundedReceiver<ReconnectDue>,
    ) {
        let (transport_tx, transport_rx) = mpsc::unbounded_channel();
        let (reconnect_tx, reconnect_rx) = mpsc::unbounded_channel();
        let manager = ConnectionManager::new(
            connector,
            transport_tx,
            reconnect_tx,
            Duration::from_millis(5000),
        );
        (manager, transport_rx, reconnect_rx)
    }

    fn stream_spec() -> FeedSpec {
        FeedSpec::new("/api/ws/stream", FeedKind::Stream, "KITE")
    }

    #[tokio::test(start_paused = true)]
    async fn reconnecting_same_key_keeps_one_instance() {
        let connector = Arc::new(RecordingConnector::default());
        let (mut manager, _transport_rx, _reconnect_rx) = manager(connector.clone());
        assert!(!manager.connect(stream_spec()));
        assert!(manager.connect(stream_spec()));
        assert_eq!(manager.len(), 1);
        assert_eq!(manager.open_transports(), 1);

        let sinks = connector.sinks.lock().unwrap();
        let stale = TransportMessage {
            key: sinks[0].key().clone(),
            generation: sinks[0].generation(),
            event: TransportEvent::Opened,
        };
        assert!(!manager.is_current(&stale));
        let fresh = TransportMessage {
            generation: sinks[1].generation(),
            ..stale
        };
        assert!(manager.is_current(&fresh));
    }

    #[tokio::test(start_paused = true)]
    async fn only_one_timer_per_key() {
        let connector = Arc::new(RecordingConnector::default());
        let (mut manager, _transport_rx, mut reconnect_rx) = manager(connector);
        manager.connect(stream_spec());
        let key = stream_spec().key();
        assert!(manager.schedule_reconnect(&key));
        assert!(manager.schedule_reconnect(&key));
        assert_eq!(manager.pending_reconnects(), 1);
        assert_eq!(manager.open_transports(), 0);

        tokio::time::sleep(Duration::from_millis(5001)).await;
        let due = reconnect_rx.recv().await.unwrap();
        assert!(reconnect_rx.try_recv().is_err());
        assert_eq!(manager.take_due(&due), Some(stream_spec()));
        assert_eq!(manager.take_due(&due), None);
        assert_eq!(manager.pending_reconnects(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn disconnect_cancels_pending_timer() {
        let connector = Arc::new(RecordingConnector::default());
        let (mut manager, _transport_rx, mut reconnect_rx) = manager(connector);
        manager.connect(stream_spec());
        manager.schedule_reconnect(&stream_spec().key());
        assert!(manager.disconnect(&stream_spec().key()));
        assert!(!manager.disconnect(&stream_spec().key()));

        tokio::time::sleep(Duration::from_secs(10)).await;
        assert!(reconnect_rx.try_recv().is_err());
        assert!(manager.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn only_push_streams_can_lag() {
        let connector = Arc::new(RecordingConnector::default());
        let (mut manager, _transport_rx, _reconnect_rx) = manager(connector);
        manager.connect(stream_spec());
        manager.connect(FeedSpec::new("wss://feed", FeedKind::Socket, "UPSTOX"));
        let threshold = Duration::from_millis(3000);

        assert!(manager.lagging_streams(Instant::now(), threshold).is_empty());
        tokio::time::advance(Duration::from_millis(3001)).await;
        let lagging = manager.lagging_streams(Instant::now(), threshold);
        assert_eq!(lagging, vec![(stream_spec().key(), "KITE".to_string())]);

        manager.touch(&stream_spec().key(), Instant::now());
        assert!(manager.lagging_streams(Instant::now(), threshold).is_empty());
    }
}

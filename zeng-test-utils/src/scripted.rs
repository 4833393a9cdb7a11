//! In-process connector whose transports are driven by the test itself.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use zeng_broker::{Connector, TransportEvent, TransportHandle, TransportSink};
use zeng_core::{ConnectionKey, FeedSpec};

#[derive(Clone, Debug)]
pub struct OpenedFeed {
    pub spec: FeedSpec,
    pub sink: TransportSink,
}

/// Records every `open` and keeps each transport alive until the engine closes it.
#[derive(Clone, Default)]
pub struct ScriptedConnector {
    opened: Arc<Mutex<Vec<OpenedFeed>>>,
    live: Arc<AtomicUsize>,
}

struct LiveGuard(Arc<AtomicUsize>);

impl LiveGuard {
    fn new(counter: Arc<AtomicUsize>) -> Self {
        counter.fetch_add(1, Ordering::SeqCst);
        Self(counter)
    }
}

impl Drop for LiveGuard {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

impl ScriptedConnector {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of `open` calls so far, including reconnects.
    pub fn open_count(&self) -> usize {
        self.opened.lock().map(|opened| opened.len()).unwrap_or(0)
    }

    pub fn open_count_for(&self, key: &str) -> usize {
        self.opened
            .lock()
            .map(|opened| {
                opened
                    .iter()
                    .filter(|feed| feed.sink.key().as_str() == key)
                    .count()
            })
            .unwrap_or(0)
    }

    /// Transports opened and not yet closed by the engine.
    pub fn live_transports(&self) -> usize {
        self.live.load(Ordering::SeqCst)
    }

    pub fn opened(&self) -> Vec<OpenedFeed> {
        self.opened
            .lock()
            .map(|opened| opened.clone())
            .unwrap_or_default()
    }

    /// Sink of the most recent transport opened for `key`.
    pub fn latest_sink(&self, key: &str) -> Option<TransportSink> {
        let opened = self.opened.lock().ok()?;
        opened
            .iter()
            .rev()
            .find(|feed| feed.sink.key() == &ConnectionKey::from(key))
            .map(|feed| feed.sink.clone())
    }

    /// Delivers `event` through the latest transport for `key`.
    pub fn emit(&self, key: &str, event: TransportEvent) -> bool {
        self.latest_sink(key).is_some_and(|sink| sink.send(event))
    }
}

impl Connector for ScriptedConnector {
    fn open(&self, spec: &FeedSpec, sink: TransportSink) -> TransportHandle {
        if let Ok(mut opened) = self.opened.lock() {
            opened.push(OpenedFeed {
                spec: spec.clone(),
                sink,
            });
        }
        let guard = LiveGuard::new(self.live.clone());
        TransportHandle::spawn(async move {
            let _guard = guard;
            futures::future::pending::<()>().await;
        })
    }
}

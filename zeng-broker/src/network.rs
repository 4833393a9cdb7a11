use std::time::Duration;

use reqwest::Client;
use tracing::debug;
use zeng_core::{FeedKind, FeedSpec};

use crate::{sse, ws, BrokerError, BrokerErrorKind, BrokerResult};
use crate::{Connector, TransportEvent, TransportHandle, TransportSink};

/// Connector that reaches real broker endpoints over the network.
#[derive(Clone, Debug)]
pub struct NetworkConnector {
    client: Client,
    origin: Option<String>,
}

impl NetworkConnector {
    pub fn new() -> BrokerResult<Self> {
        let client = Client::builder()
            .connect_timeout(Duration::from_secs(10))
            .build()
            .map_err(|err| BrokerError::from_display(err, BrokerErrorKind::Transport))?;
        Ok(Self {
            client,
            origin: None,
        })
    }

    /// Resolve path-only push-stream URLs (e.g. `/api/ws/stream`) against `origin`.
    #[must_use]
    pub fn with_origin(mut self, origin: impl Into<String>) -> Self {
        self.origin = Some(origin.into().trim_end_matches('/').to_string());
        self
    }

    fn resolve(&self, url: &str) -> BrokerResult<String> {
        if !url.starts_with('/') {
            return Ok(url.to_string());
        }
        self.origin
            .as_ref()
            .map(|origin| format!("{origin}{url}"))
            .ok_or_else(|| {
                BrokerError::InvalidRequest(format!("relative feed url '{url}' needs an origin"))
            })
    }
}

impl Connector for NetworkConnector {
    fn open(&self, spec: &FeedSpec, sink: TransportSink) -> TransportHandle {
        let url = match self.resolve(&spec.url) {
            Ok(url) => url,
            Err(err) => {
                sink.send(TransportEvent::Failed(err.to_string()));
                return TransportHandle::detached();
            }
        };
        debug!(%url, kind = %spec.kind, broker = %spec.broker, "opening transport");
        match spec.kind {
            FeedKind::Stream => TransportHandle::spawn(sse::run_stream(
                self.client.clone(),
                url,
                sink,
            )),
            FeedKind::Socket => TransportHandle::spawn(ws::run_socket(url, sink)),
        }
    }
}

#[cfg(test)]
mod tests {
    use tokio::sync::mpsc;
    use zeng_core::ConnectionKey;

    use super::*;

    #[test]
    fn resolves_relative_urls_against_origin() {
        let connector = NetworkConnector::new()
            .unwrap()
            .with_origin("http://localhost:3000/");
        assert_eq!(
            connector.resolve("/api/ws/stream").unwrap(),
            "http://localhost:3000/api/ws/stream"
        );
        assert_eq!(connector.resolve("ws://feed").unwrap(), "ws://feed");
    }

    #[tokio::test]
    async fn relative_url_without_origin_fails_immediately() {
        let connector = NetworkConnector::new().unwrap();
        let (tx, mut rx) = mpsc::unbounded_channel();
        let spec = FeedSpec::new("/api/ws/stream", FeedKind::Stream, "KITE");
        let sink = TransportSink::new(ConnectionKey::from("/api/ws/stream"), 1, tx);
        let handle = connector.open(&spec, sink);
        assert!(handle.is_closed());
        let message = rx.recv().await.unwrap();
        assert!(matches!(message.event, TransportEvent::Failed(_)));
    }
}

//! Server-sent event push streams.

use futures::StreamExt;
use reqwest::header::ACCEPT;
use reqwest::Client;
use tracing::{debug, info, trace, warn};

use crate::{Frame, TransportEvent, TransportSink};

/// One dispatched server-sent event.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SseEvent {
    pub name: String,
    pub data: String,
}

/// Incremental decoder for the `text/event-stream` format.
///
/// Bytes may be split anywhere, including inside a UTF-8 sequence; only complete lines
/// are interpreted.
#[derive(Debug, Default)]
pub struct SseDecoder {
    pending: Vec<u8>,
    name: Option<String>,
    data: Vec<String>,
}

impl SseDecoder {
    pub fn feed(&mut self, chunk: &[u8]) -> Vec<SseEvent> {
        self.pending.extend_from_slice(chunk);
        let mut events = Vec::new();
        while let Some(pos) = self.pending.iter().position(|byte| *byte == b'\n') {
            let raw: Vec<u8> = self.pending.drain(..=pos).collect();
            let line = String::from_utf8_lossy(&raw);
            let line = line.trim_end_matches(['\n', '\r']);
            if let Some(event) = self.process_line(line) {
                events.push(event);
            }
        }
        events
    }

    fn process_line(&mut self, line: &str) -> Option<SseEvent> {
        if line.is_empty() {
            let name = self.name.take().unwrap_or_else(|| "message".to_string());
            if self.data.is_empty() {
                return None;
            }
            let data = std::mem::take(&mut self.data).join("\n");
            return Some(SseEvent { name, data });
        }
        if line.starts_with(':') {
            return None;
        }
        let (field, value) = match line.split_once(':') {
            Some((field, value)) => (field, value.strip_prefix(' ').unwrap_or(value)),
            None => (line, ""),
        };
        match field {
            "event" => self.name = Some(value.to_string()),
            "data" => self.data.push(value.to_string()),
            _ => {}
        }
        None
    }
}

/// Drives a push-stream feed until it fails or the owning handle is dropped.
///
/// A stream that ends is reported as a failure, matching how browsers surface it.
pub async fn run_stream(client: Client, url: String, sink: TransportSink) {
    let response = match client
        .get(url.as_str())
        .header(ACCEPT, "text/event-stream")
        .send()
        .await
    {
        Ok(response) if response.status().is_success() => response,
        Ok(response) => {
            let status = response.status();
            warn!(%url, %status, "push stream rejected");
            sink.send(TransportEvent::Failed(format!("unexpected status {status}")));
            return;
        }
        Err(err) => {
            warn!(%url, error = %err, "push stream connect failed");
            sink.send(TransportEvent::Failed(err.to_string()));
            return;
        }
    };
    info!(%url, key = %sink.key(), "push stream connected");
    if !sink.send(TransportEvent::Opened) {
        return;
    }

    let mut decoder = SseDecoder::default();
    let mut body = response.bytes_stream();
    while let Some(chunk) = body.next().await {
        let bytes = match chunk {
            Ok(bytes) => bytes,
            Err(err) => {
                warn!(%url, error = %err, "push stream read failed");
                sink.send(TransportEvent::Failed(err.to_string()));
                return;
            }
        };
        for event in decoder.feed(&bytes) {
            let frame = match event.name.as_str() {
                "tick" => Frame::Tick(event.data),
                "status" => Frame::Status(event.data),
                other => {
                    trace!(%url, event = other, "ignoring push stream event");
                    continue;
                }
            };
            if !sink.send(TransportEvent::Frame(frame)) {
                return;
            }
        }
    }
    debug!(%url, "push stream ended");
    sink.send(TransportEvent::Failed("stream ended".into()));
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decodes_named_events_across_chunks() {
        let mut decoder = SseDecoder::default();
        assert!(decoder.feed(b"event: tick\ndata: {\"last_").is_empty());
        let events = decoder.feed(b"price\":1}\n\n: keepalive\n\nevent:status\r\ndata:{}\r\n\r\n");
        assert_eq!(
            events,
            vec![
                SseEvent {
                    name: "tick".into(),
                    data: "{\"last_price\":1}".into()
                },
                SseEvent {
                    name: "status".into(),
                    data: "{}".into()
                },
            ]
        );
    }

    #[test]
    fn joins_multiline_data_and_defaults_name() {
        let mut decoder = SseDecoder::default();
        let events = decoder.feed(b"data: a\ndata: b\nid: 3\n\n");
        assert_eq!(
            events,
            vec![SseEvent {
                name: "message".into(),
                data: "a\nb".into()
            }]
        );
    }

    #[test]
    fn tolerates_split_utf8() {
        let mut decoder = SseDecoder::default();
        let payload = "event: tick\ndata: ₹\n\n".as_bytes();
        let (head, tail) = payload.split_at(20);
        assert!(decoder.feed(head).is_empty());
        assert_eq!(decoder.feed(tail)[0].data, "₹");
    }
}

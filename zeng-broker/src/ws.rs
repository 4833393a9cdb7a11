use futures::{SinkExt, StreamExt};
use tokio_tungstenite::{connect_async, tungstenite::protocol::Message};
use tracing::{debug, info, warn};

use crate::{Frame, TransportEvent, TransportSink};

/// Drives a websocket feed until it fails, closes, or the owning handle is dropped.
pub async fn run_socket(url: String, sink: TransportSink) {
    let mut socket = match connect_async(url.as_str()).await {
        Ok((socket, _)) => socket,
        Err(err) => {
            warn!(%url, error = %err, "socket connect failed");
            sink.send(TransportEvent::Failed(err.to_string()));
            return;
        }
    };
    info!(%url, key = %sink.key(), "socket connected");
    if !sink.send(TransportEvent::Opened) {
        return;
    }

    while let Some(message) = socket.next().await {
        let forwarded = match message {
            Ok(Message::Text(text)) => sink.send(TransportEvent::Frame(Frame::Tick(text))),
            Ok(Message::Binary(bytes)) => sink.send(TransportEvent::Frame(Frame::Binary(bytes))),
            Ok(Message::Ping(payload)) => {
                if let Err(err) = socket.send(Message::Pong(payload)).await {
                    sink.send(TransportEvent::Failed(err.to_string()));
                    return;
                }
                true
            }
            Ok(Message::Pong(_)) => {
                debug!(%url, "received pong");
                true
            }
            Ok(Message::Close(frame)) => {
                debug!(%url, ?frame, "socket closed by remote");
                sink.send(TransportEvent::Closed);
                return;
            }
            Ok(Message::Frame(_)) => true,
            Err(err) => {
                warn!(%url, error = %err, "socket read failed");
                sink.send(TransportEvent::Failed(err.to_string()));
                return;
            }
        };
        if !forwarded {
            let _ = socket.send(Message::Close(None)).await;
            return;
        }
    }
    sink.send(TransportEvent::Closed);
}

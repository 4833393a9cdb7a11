use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use anyhow::Result;
use futures::{SinkExt, StreamExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{broadcast, oneshot};
use tokio::task::JoinHandle;
use tokio_tungstenite::accept_async;
use tokio_tungstenite::tungstenite::Message;
use tracing::warn;

/// Socket feed that fans every pushed frame out to all connected clients.
pub struct MockWebSocketServer {
    addr: SocketAddr,
    frames: broadcast::Sender<Message>,
    clients: Arc<AtomicUsize>,
    shutdown_tx: Option<oneshot::Sender<()>>,
    handle: JoinHandle<()>,
}

impl MockWebSocketServer {
    pub async fn spawn() -> Result<Self> {
        let listener = TcpListener::bind(("127.0.0.1", 0)).await?;
        let addr = listener.local_addr()?;
        let (frames, _) = broadcast::channel(256);
        let clients = Arc::new(AtomicUsize::new(0));
        let (shutdown_tx, mut shutdown_rx) = oneshot::channel();
        let fanout = frames.clone();
        let counter = clients.clone();
        let handle = tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = &mut shutdown_rx => {
                        break;
                    }
                    accept_result = listener.accept() => {
                        match accept_result {
                            Ok((stream, _peer)) => {
                                let frames = fanout.subscribe();
                                let counter = counter.clone();
                                tokio::spawn(async move {
                                    if let Err(err) = handle_socket(stream, frames, counter).await {
                                        warn!(error = %err, "websocket connection ended with error");
                                    }
                                });
                            }
                            Err(err) => {
                                tracing::error!(error = %err, "failed to accept websocket connection");
                                break;
                            }
                        }
                    }
                }
            }
        });
        Ok(Self {
            addr,
            frames,
            clients,
            shutdown_tx: Some(shutdown_tx),
            handle,
        })
    }

    #[must_use]
    pub fn url(&self) -> String {
        format!("ws://{}", self.addr)
    }

    /// Clients currently holding an open socket.
    pub fn clients(&self) -> usize {
        self.clients.load(Ordering::SeqCst)
    }

    pub fn push_text(&self, text: impl Into<String>) {
        let _ = self.frames.send(Message::Text(text.into()));
    }

    pub fn push_binary(&self, bytes: Vec<u8>) {
        let _ = self.frames.send(Message::Binary(bytes));
    }

    /// Closes every open client socket.
    pub fn close_clients(&self) {
        let _ = self.frames.send(Message::Close(None));
    }

    pub async fn shutdown(&mut self) {
        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.send(());
        }
        self.handle.abort();
    }
}

impl Drop for MockWebSocketServer {
    fn drop(&mut self) {
        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.send(());
        }
        self.handle.abort();
    }
}

struct ClientGuard(Arc<AtomicUsize>);

impl Drop for ClientGuard {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

async fn handle_socket(
    stream: TcpStream,
    mut frames: broadcast::Receiver<Message>,
    clients: Arc<AtomicUsize>,
) -> Result<()> {
    let ws_stream = accept_async(stream).await?;
    clients.fetch_add(1, Ordering::SeqCst);
    let _guard = ClientGuard(clients);
    let (mut sink, mut source) = ws_stream.split();
    loop {
        tokio::select! {
            frame = frames.recv() => match frame {
                Ok(Message::Close(frame)) => {
                    let _ = sink.send(Message::Close(frame)).await;
                    break;
                }
                Ok(message) => sink.send(message).await?,
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    warn!(skipped, "mock websocket client lagged");
                }
                Err(broadcast::error::RecvError::Closed) => break,
            },
            incoming = source.next() => match incoming {
                Some(Ok(Message::Ping(payload))) => sink.send(Message::Pong(payload)).await?,
                Some(Ok(Message::Close(_))) | None => break,
                Some(Ok(_)) => {}
                Some(Err(err)) => return Err(err.into()),
            },
        }
    }
    Ok(())
}

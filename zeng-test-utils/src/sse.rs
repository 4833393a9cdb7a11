//! Minimal `text/event-stream` server for push-stream transport tests.

use std::convert::Infallible;
use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::Result;
use hyper::body::{Bytes, Sender};
use hyper::service::{make_service_fn, service_fn};
use hyper::{Body, Request, Response, StatusCode};
use tokio::sync::{oneshot, Mutex};
use tokio::task::JoinHandle;

pub const STREAM_PATH: &str = "/stream";

pub struct MockSseServer {
    addr: SocketAddr,
    subscribers: Arc<Mutex<Vec<Sender>>>,
    shutdown_tx: Option<oneshot::Sender<()>>,
    handle: JoinHandle<()>,
}

impl MockSseServer {
    pub async fn spawn() -> Result<Self> {
        let subscribers: Arc<Mutex<Vec<Sender>>> = Arc::new(Mutex::new(Vec::new()));
        let registry = subscribers.clone();
        let make_svc = make_service_fn(move |_| {
            let registry = registry.clone();
            async move {
                Ok::<_, Infallible>(service_fn(move |req: Request<Body>| {
                    let registry = registry.clone();
                    async move { Ok::<_, Infallible>(respond(req, registry).await) }
                }))
            }
        });
        let server = hyper::Server::try_bind(&SocketAddr::from(([127, 0, 0, 1], 0)))?
            .serve(make_svc);
        let addr = server.local_addr();
        let (shutdown_tx, shutdown_rx) = oneshot::channel::<()>();
        let handle = tokio::spawn(async move {
            let graceful = server.with_graceful_shutdown(async {
                let _ = shutdown_rx.await;
            });
            if let Err(err) = graceful.await {
                tracing::error!(error = %err, "mock sse server terminated");
            }
        });
        Ok(Self {
            addr,
            subscribers,
            shutdown_tx: Some(shutdown_tx),
            handle,
        })
    }

    #[must_use]
    pub fn url(&self) -> String {
        format!("http://{}{}", self.addr, STREAM_PATH)
    }

    #[must_use]
    pub fn missing_url(&self) -> String {
        format!("http://{}/missing", self.addr)
    }

    pub async fn subscribers(&self) -> usize {
        self.subscribers.lock().await.len()
    }

    /// Writes one named event to every open stream, pruning closed ones.
    pub async fn push(&self, event: &str, data: &str) {
        let chunk = Bytes::from(format!("event: {event}\ndata: {data}\n\n"));
        let mut subscribers = self.subscribers.lock().await;
        let mut alive = Vec::with_capacity(subscribers.len());
        for mut sender in subscribers.drain(..) {
            if sender.send_data(chunk.clone()).await.is_ok() {
                alive.push(sender);
            }
        }
        *subscribers = alive;
    }

    /// Ends every open stream.
    pub async fn close_streams(&self) {
        self.subscribers.lock().await.clear();
    }

    pub async fn shutdown(&mut self) {
        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.send(());
        }
        self.handle.abort();
    }
}

impl Drop for MockSseServer {
    fn drop(&mut self) {
        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.send(());
        }
        self.handle.abort();
    }
}

async fn respond(req: Request<Body>, registry: Arc<Mutex<Vec<Sender>>>) -> Response<Body> {
    if req.uri().path() != STREAM_PATH {
        let mut response = Response::new(Body::from("not found"));
        *response.status_mut() = StatusCode::NOT_FOUND;
        return response;
    }
    let (sender, body) = Body::channel();
    registry.lock().await.push(sender);
    let mut response = Response::new(body);
    response.headers_mut().insert(
        hyper::header::CONTENT_TYPE,
        hyper::header::HeaderValue::from_static("text/event-stream"),
    );
    response
}

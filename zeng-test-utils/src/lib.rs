//! Utilities for standing up mock feeds that exercise zeng end-to-end flows.

pub mod scripted;
pub mod sse;
pub mod websocket;

pub use scripted::ScriptedConnector;
pub use sse::MockSseServer;
pub use websocket::MockWebSocketServer;

/// Serialises a single quote the way broker feeds deliver it.
pub fn quote_json(symbol: &str, last_price: &str) -> String {
    format!(r#"{{"tradingsymbol":"{symbol}","last_price":{last_price}}}"#)
}

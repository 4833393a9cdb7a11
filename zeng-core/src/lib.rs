//! Fundamental data types shared across the entire workspace.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use thiserror::Error;

pub mod deserializer;

/// Alias for price precision.
pub type Price = Decimal;
/// Alias for quantity precision.
pub type Quantity = Decimal;
/// Alias used for human-readable instrument names (e.g., `NIFTY 50`).
pub type Symbol = String;
/// Broker tag attached to every feed (e.g., `KITE`, `UPSTOX`).
pub type BrokerId = String;

/// Identifies one live feed inside the ticker engine.
///
/// Keys default to the feed URL, so the scheme already distinguishes a push-stream
/// endpoint from a socket endpoint.
#[derive(Clone, Debug, Deserialize, Eq, Hash, Ord, PartialEq, PartialOrd, Serialize)]
#[serde(transparent)]
pub struct ConnectionKey(String);

impl ConnectionKey {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for ConnectionKey {
    fn default() -> Self {
        Self("default".into())
    }
}

impl fmt::Display for ConnectionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ConnectionKey {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

impl From<String> for ConnectionKey {
    fn from(value: String) -> Self {
        Self(value)
    }
}

/// Transport family used to reach a broker feed.
#[derive(Clone, Copy, Debug, Deserialize, Eq, Hash, PartialEq, Serialize)]
pub enum FeedKind {
    /// Server-sent event push stream over HTTP.
    #[serde(rename = "sse", alias = "stream")]
    Stream,
    /// Full-duplex websocket.
    #[serde(rename = "ws", alias = "socket")]
    Socket,
}

impl FeedKind {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Stream => "sse",
            Self::Socket => "ws",
        }
    }

    /// Broker tag assumed when a connect request omits one.
    #[must_use]
    pub fn default_broker(self) -> &'static str {
        match self {
            Self::Stream => "KITE",
            Self::Socket => "UPSTOX",
        }
    }
}

impl fmt::Display for FeedKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for FeedKind {
    type Err = ParseFeedError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.to_lowercase().as_str() {
            "sse" | "stream" => Ok(Self::Stream),
            "ws" | "socket" => Ok(Self::Socket),
            other => Err(ParseFeedError::UnknownKind(other.to_string())),
        }
    }
}

/// Errors raised while parsing feed descriptors from text.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ParseFeedError {
    #[error("unsupported feed kind '{0}' (expected sse or ws)")]
    UnknownKind(String),
    #[error("feed descriptor '{0}' must look like <kind>:<broker>:<url>")]
    Malformed(String),
}

/// Everything needed to open (and later reopen) one feed.
#[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize)]
pub struct FeedSpec {
    pub url: String,
    #[serde(rename = "type")]
    pub kind: FeedKind,
    pub broker: BrokerId,
}

impl FeedSpec {
    pub fn new(url: impl Into<String>, kind: FeedKind, broker: impl Into<BrokerId>) -> Self {
        Self {
            url: url.into(),
            kind,
            broker: broker.into(),
        }
    }

    /// Connection key owned by this feed.
    #[must_use]
    pub fn key(&self) -> ConnectionKey {
        if self.url.is_empty() {
            ConnectionKey::default()
        } else {
            ConnectionKey::new(self.url.clone())
        }
    }
}

impl FromStr for FeedSpec {
    type Err = ParseFeedError;

    /// Parses `ws:UPSTOX:wss://host/path`; the URL keeps any further colons.
    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let mut parts = value.splitn(3, ':');
        let (Some(kind), Some(broker), Some(url)) = (parts.next(), parts.next(), parts.next())
        else {
            return Err(ParseFeedError::Malformed(value.to_string()));
        };
        if url.is_empty() {
            return Err(ParseFeedError::Malformed(value.to_string()));
        }
        let kind = kind.parse::<FeedKind>()?;
        let broker = if broker.is_empty() {
            kind.default_broker().to_string()
        } else {
            broker.to_uppercase()
        };
        Ok(Self::new(url, kind, broker))
    }
}

/// The side of an order or simulated trade.
#[derive(Clone, Copy, Debug, Deserialize, Eq, PartialEq, Serialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Side {
    Buy,
    Sell,
}

/// Session open-high-low-close aggregates attached to a tick.
#[derive(Clone, Debug, Default, Deserialize, PartialEq, Serialize)]
pub struct Ohlc {
    pub open: Price,
    pub high: Price,
    pub low: Price,
    pub close: Price,
}

/// Aggregated OHLCV bar data replayed by the backtester.
#[derive(Clone, Debug, Deserialize, PartialEq, Serialize)]
pub struct Candle {
    #[serde(with = "candle_timestamp")]
    pub timestamp: DateTime<Utc>,
    pub open: Price,
    pub high: Price,
    pub low: Price,
    pub close: Price,
    #[serde(default)]
    pub volume: Quantity,
}

mod candle_timestamp {
    use chrono::{DateTime, Utc};
    use serde::de::Error;
    use serde::{Deserialize, Deserializer, Serialize, Serializer};
    use serde_json::Value;

    pub fn serialize<S>(value: &DateTime<Utc>, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        value.serialize(serializer)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<DateTime<Utc>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let raw = Value::deserialize(deserializer)?;
        crate::deserializer::flexible_timestamp::parse(&raw)
            .ok_or_else(|| D::Error::custom(format!("unrecognised candle timestamp {raw}")))
    }
}

/// Indicator values computed by the ticker engine for a fused tick.
#[derive(Clone, Debug, Default, Deserialize, PartialEq, Serialize)]
pub struct TickIndicators {
    pub ema20: Option<Price>,
}

/// A single price/quantity update as delivered by a broker feed.
///
/// Broker-specific fields the engine does not understand are preserved in `extra`
/// and forwarded untouched.
#[derive(Clone, Debug, Default, Deserialize, PartialEq, Serialize)]
pub struct Tick {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub symbol: Option<Symbol>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tradingsymbol: Option<Symbol>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub instrument_token: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_price: Option<Price>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub volume: Option<Quantity>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ohlc: Option<Ohlc>,
    #[serde(
        default,
        deserialize_with = "deserializer::flexible_timestamp::deserialize",
        skip_serializing_if = "Option::is_none"
    )]
    pub timestamp: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fused_price: Option<Price>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub indicators: Option<TickIndicators>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub basis: Option<Price>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Tick {
    /// Convenience constructor used by tests and synthetic feeds.
    pub fn quote(symbol: impl Into<Symbol>, last_price: Price) -> Self {
        Self {
            symbol: Some(symbol.into()),
            last_price: Some(last_price),
            ..Self::default()
        }
    }

    /// Resolves the instrument name, falling back to the owning connection key.
    #[must_use]
    pub fn resolve_symbol(&self, fallback: &ConnectionKey) -> Symbol {
        self.symbol
            .clone()
            .or_else(|| self.tradingsymbol.clone())
            .or_else(|| self.instrument_token.map(|token| token.to_string()))
            .unwrap_or_else(|| fallback.to_string())
    }
}

/// Feeds deliver either a single tick object or a batch.
#[derive(Clone, Debug, Deserialize)]
#[serde(untagged)]
pub enum TickPayload {
    Batch(Vec<Tick>),
    Single(Box<Tick>),
}

impl TickPayload {
    #[must_use]
    pub fn into_ticks(self) -> Vec<Tick> {
        match self {
            Self::Batch(ticks) => ticks,
            Self::Single(tick) => vec![*tick],
        }
    }
}

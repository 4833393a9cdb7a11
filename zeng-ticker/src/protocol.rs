//! Messages exchanged between the host and the ticker engine.
//!
//! Both directions use `{ "type": "...", "payload": { ... } }` envelopes with
//! camelCase payload fields.

use std::collections::BTreeMap;

use rust_decimal::Decimal;
use serde::de::Error as _;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};
use zeng_core::{BrokerId, ConnectionKey, FeedKind, FeedSpec, Price, Tick};

/// Loss and trade-count limits enforced by the halt monitor.
#[derive(Clone, Copy, Debug, Deserialize, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RiskLimits {
    /// Mark-to-market at or below this value halts the engine (a negative number).
    pub max_loss: Price,
    /// Accepted and reported, not enforced.
    pub max_trades: u32,
}

impl Default for RiskLimits {
    fn default() -> Self {
        Self {
            max_loss: Decimal::new(-10_000, 0),
            max_trades: 50,
        }
    }
}

#[derive(Clone, Debug, Deserialize, PartialEq)]
pub struct ConnectRequest {
    pub url: String,
    #[serde(rename = "type")]
    pub kind: FeedKind,
    #[serde(default)]
    pub broker: Option<BrokerId>,
}

impl ConnectRequest {
    #[must_use]
    pub fn into_spec(self) -> FeedSpec {
        let broker = self
            .broker
            .filter(|broker| !broker.is_empty())
            .unwrap_or_else(|| self.kind.default_broker().to_string());
        FeedSpec::new(self.url, self.kind, broker)
    }
}

#[derive(Clone, Debug, Default, Deserialize, PartialEq)]
pub struct DisconnectRequest {
    #[serde(default)]
    pub key: Option<ConnectionKey>,
    #[serde(default)]
    pub url: Option<String>,
}

impl DisconnectRequest {
    #[must_use]
    pub fn key(&self) -> ConnectionKey {
        self.key
            .clone()
            .or_else(|| self.url.clone().map(ConnectionKey::from))
            .unwrap_or_default()
    }
}

/// Partial limit update; absent fields keep their current value.
///
/// Accepts the limits inline or nested under `riskLimits`.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct RiskLimitsUpdate {
    pub max_loss: Option<Price>,
    pub max_trades: Option<u32>,
}

impl RiskLimitsUpdate {
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.max_loss.is_none() && self.max_trades.is_none()
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum RiskLimitsPayload {
    Nested {
        #[serde(rename = "riskLimits")]
        risk_limits: RiskLimitFields,
    },
    Inline(RiskLimitFields),
}

#[derive(Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
struct RiskLimitFields {
    max_loss: Option<Price>,
    max_trades: Option<u32>,
}

impl<'de> Deserialize<'de> for RiskLimitsUpdate {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let fields = match RiskLimitsPayload::deserialize(deserializer)? {
            RiskLimitsPayload::Nested { risk_limits } => risk_limits,
            RiskLimitsPayload::Inline(fields) => fields,
        };
        Ok(Self {
            max_loss: fields.max_loss,
            max_trades: fields.max_trades,
        })
    }
}

/// Margin reported by one broker account.
#[derive(Clone, Debug, Deserialize, PartialEq, Serialize)]
pub struct BrokerMargin {
    pub available: Price,
    #[serde(default)]
    pub used: Price,
}

#[derive(Clone, Debug, Deserialize, PartialEq)]
pub struct MarginReport {
    pub broker: BrokerId,
    #[serde(flatten)]
    pub margin: BrokerMargin,
}

#[derive(Clone, Debug, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct MarkToMarket {
    pub current_mtm: Price,
}

/// Commands accepted from the host.
#[derive(Clone, Debug, Deserialize, PartialEq)]
#[serde(tag = "type", content = "payload", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Command {
    Connect(ConnectRequest),
    Disconnect(DisconnectRequest),
    UpdateRiskLimits(RiskLimitsUpdate),
    UpdateMargin(MarginReport),
    MarkToMarket(MarkToMarket),
}

/// A host command plus the mark-to-market value any payload may carry.
///
/// The loss check must see `currentMtm` even when the command itself cannot be
/// understood, so an unrecognised command is kept as its decode error instead of
/// failing the whole message.
#[derive(Clone, Debug, PartialEq)]
pub struct HostMessage {
    pub command: Result<Command, String>,
    pub current_mtm: Option<Price>,
}

impl HostMessage {
    pub fn new(command: Command) -> Self {
        let current_mtm = match &command {
            Command::MarkToMarket(report) => Some(report.current_mtm),
            _ => None,
        };
        Self {
            command: Ok(command),
            current_mtm,
        }
    }

    #[must_use]
    pub fn with_mtm(mut self, mtm: Price) -> Self {
        self.current_mtm = Some(mtm);
        self
    }
}

impl From<Command> for HostMessage {
    fn from(command: Command) -> Self {
        Self::new(command)
    }
}

impl<'de> Deserialize<'de> for HostMessage {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let mut raw = Value::deserialize(deserializer)?;
        let current_mtm = raw
            .get("payload")
            .and_then(|payload| payload.get("currentMtm"))
            .filter(|value| !value.is_null())
            .map(|value| <Price as Deserialize>::deserialize(value).map_err(D::Error::custom))
            .transpose()?;
        if let Some(envelope) = raw.as_object_mut() {
            let payload = envelope.entry("payload").or_insert(Value::Null);
            if payload.is_null() {
                *payload = Value::Object(Map::new());
            }
        }
        let command = Command::deserialize(raw).map_err(|err| err.to_string());
        Ok(Self {
            command,
            current_mtm,
        })
    }
}

#[derive(Clone, Debug, Deserialize, PartialEq, Serialize)]
pub struct TickBatch {
    pub data: Vec<Tick>,
    pub key: ConnectionKey,
}

#[derive(Clone, Debug, Deserialize, PartialEq, Serialize)]
pub struct ConnectionStatus {
    pub connected: bool,
    pub key: ConnectionKey,
}

#[derive(Clone, Debug, Deserialize, PartialEq, Serialize)]
pub struct ConnectionError {
    pub message: String,
    pub key: ConnectionKey,
}

#[derive(Clone, Debug, Deserialize, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UnifiedMargin {
    pub total_margin: Price,
    pub brokers: BTreeMap<BrokerId, BrokerMargin>,
}

#[derive(Clone, Debug, Deserialize, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FailoverSuggestion {
    pub laggy_key: ConnectionKey,
    pub broker: BrokerId,
}

#[derive(Clone, Copy, Debug, Deserialize, Eq, PartialEq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum HaltReason {
    MaxLossLimitReached,
}

#[derive(Clone, Debug, Deserialize, PartialEq, Serialize)]
pub struct HaltNotice {
    pub reason: HaltReason,
    /// The loss limit that was breached.
    pub value: Price,
}

#[derive(Clone, Debug, Default, Deserialize, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MetricsSnapshot {
    pub ticks_processed: u64,
    pub payloads_dropped: u64,
    pub reconnects_scheduled: u64,
    pub failover_suggestions: u64,
    pub active_connections: usize,
    pub pending_reconnects: usize,
    pub fused_symbols: usize,
    pub halted: bool,
    pub risk_limits: RiskLimits,
}

/// Events published to the host.
#[derive(Clone, Debug, Deserialize, PartialEq, Serialize)]
#[serde(tag = "type", content = "payload", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Event {
    Tick(TickBatch),
    Status(ConnectionStatus),
    Error(ConnectionError),
    UnifiedMargin(UnifiedMargin),
    FailoverSuggestion(FailoverSuggestion),
    CyberPauseTriggered(HaltNotice),
    Metrics(MetricsSnapshot),
}

impl Event {
    pub fn status(key: &ConnectionKey, connected: bool) -> Self {
        Self::Status(ConnectionStatus {
            connected,
            key: key.clone(),
        })
    }

    pub fn error(key: &ConnectionKey, message: impl Into<String>) -> Self {
        Self::Error(ConnectionError {
            message: message.into(),
            key: key.clone(),
        })
    }
}

#[cfg(test)]
mod tests {
    use rust_decimal_macros::dec;
    use serde_json::json;

    use super::*;

    #[test]
    fn connect_defaults_broker_by_kind() {
        let message: HostMessage = serde_json::from_value(json!({
            "type": "CONNECT",
            "payload": { "url": "/api/ws/stream", "type": "sse" }
        }))
        .unwrap();
        let Ok(Command::Connect(request)) = message.command else {
            panic!("expected connect");
        };
        let spec = request.into_spec();
        assert_eq!(spec.broker, "KITE");
        assert_eq!(spec.key().as_str(), "/api/ws/stream");
        assert_eq!(message.current_mtm, None);
    }

    #[test]
    fn any_payload_can_carry_mtm() {
        let message: HostMessage = serde_json::from_value(json!({
            "type": "UPDATE_RISK_LIMITS",
            "payload": { "maxLoss": -5000, "currentMtm": -1200.5 }
        }))
        .unwrap();
        assert_eq!(message.current_mtm, Some(dec!(-1200.5)));
        assert_eq!(
            message.command,
            Ok(Command::UpdateRiskLimits(RiskLimitsUpdate {
                max_loss: Some(dec!(-5000)),
                max_trades: None,
            }))
        );
    }

    #[test]
    fn mark_to_market_command_sets_mtm() {
        let message: HostMessage = serde_json::from_value(json!({
            "type": "MARK_TO_MARKET",
            "payload": { "currentMtm": -10001 }
        }))
        .unwrap();
        assert_eq!(message.current_mtm, Some(dec!(-10001)));
        let built = HostMessage::new(Command::MarkToMarket(MarkToMarket {
            current_mtm: dec!(-1),
        }));
        assert_eq!(built.current_mtm, Some(dec!(-1)));
    }

    #[test]
    fn disconnect_accepts_key_or_url() {
        let by_url: HostMessage = serde_json::from_value(json!({
            "type": "DISCONNECT", "payload": { "url": "ws://a" }
        }))
        .unwrap();
        let Ok(Command::Disconnect(request)) = by_url.command else {
            panic!("expected disconnect");
        };
        assert_eq!(request.key().as_str(), "ws://a");
        assert_eq!(DisconnectRequest::default().key().as_str(), "default");

        let bare: HostMessage = serde_json::from_value(json!({ "type": "DISCONNECT" })).unwrap();
        assert_eq!(
            bare.command,
            Ok(Command::Disconnect(DisconnectRequest::default()))
        );
    }

    #[test]
    fn unknown_command_keeps_mtm() {
        let message: HostMessage = serde_json::from_value(json!({
            "type": "HEARTBEAT", "payload": { "currentMtm": -20000 }
        }))
        .unwrap();
        assert!(message.command.is_err());
        assert_eq!(message.current_mtm, Some(dec!(-20000)));

        let bad_feed: HostMessage = serde_json::from_value(json!({
            "type": "CONNECT",
            "payload": { "url": "grpc://feed", "type": "grpc", "currentMtm": -20000 }
        }))
        .unwrap();
        assert!(bad_feed.command.is_err());
        assert_eq!(bad_feed.current_mtm, Some(dec!(-20000)));
    }

    #[test]
    fn malformed_mtm_is_rejected() {
        let result = serde_json::from_value::<HostMessage>(json!({
            "type": "MARK_TO_MARKET", "payload": { "currentMtm": [1] }
        }));
        assert!(result.is_err());
    }

    #[test]
    fn risk_limits_accept_nested_form() {
        let nested: HostMessage = serde_json::from_value(json!({
            "type": "UPDATE_RISK_LIMITS",
            "payload": { "riskLimits": { "maxLoss": -2500, "maxTrades": 10 } }
        }))
        .unwrap();
        assert_eq!(
            nested.command,
            Ok(Command::UpdateRiskLimits(RiskLimitsUpdate {
                max_loss: Some(dec!(-2500)),
                max_trades: Some(10),
            }))
        );

        let empty: HostMessage = serde_json::from_value(json!({
            "type": "UPDATE_RISK_LIMITS", "payload": { "limit": 5 }
        }))
        .unwrap();
        let Ok(Command::UpdateRiskLimits(update)) = empty.command else {
            panic!("expected risk limits");
        };
        assert!(update.is_empty());
    }

    #[test]
    fn events_use_camel_case_payloads() {
        let event = Event::FailoverSuggestion(FailoverSuggestion {
            laggy_key: ConnectionKey::from("/api/ws/stream"),
            broker: "KITE".into(),
        });
        assert_eq!(
            serde_json::to_value(&event).unwrap(),
            json!({
                "type": "FAILOVER_SUGGESTION",
                "payload": { "laggyKey": "/api/ws/stream", "broker": "KITE" }
            })
        );
        let halt = Event::CyberPauseTriggered(HaltNotice {
            reason: HaltReason::MaxLossLimitReached,
            value: dec!(-10000),
        });
        assert_eq!(
            serde_json::to_value(&halt).unwrap()["payload"]["reason"],
            json!("MAX_LOSS_LIMIT_REACHED")
        );
    }
}

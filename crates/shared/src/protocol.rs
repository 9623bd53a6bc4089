//! Wire frames exchanged with the analytics server.
//!
//! Every WebSocket text frame is one JSON [`WsEnvelope`]:
//!
//! ```json
//! { "id": "…", "event": "subscribe_ticker", "data": { "channel": "prices", "ticker": "NVDA" }, "ts": "…" }
//! ```
//!
//! `id` and `ts` are always set on outbound frames and optional on inbound ones.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::json;

use crate::channel::{Channel, SubscriptionKey};
use crate::error::ProtocolError;
use crate::market::ChannelMessage;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WsEnvelope {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    pub event: String,
    #[serde(default)]
    pub data: serde_json::Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ts: Option<DateTime<Utc>>,
}

impl WsEnvelope {
    /// Build an outbound frame for an arbitrary event.
    pub fn outbound(event: impl Into<String>, data: serde_json::Value) -> Self {
        Self {
            id: Some(uuid::Uuid::new_v4().to_string()),
            event: event.into(),
            data,
            ts: Some(Utc::now()),
        }
    }

    pub fn to_json(&self) -> Result<String, ProtocolError> {
        Ok(serde_json::to_string(self)?)
    }

    pub fn from_json(text: &str) -> Result<Self, ProtocolError> {
        Ok(serde_json::from_str(text)?)
    }

    /// The channel this frame carries data for, if it is a data event.
    pub fn data_channel(&self) -> Option<Channel> {
        Channel::from_data_event(&self.event)
    }

    /// Decode a data event into a typed message.
    pub fn decode_message(&self) -> Result<ChannelMessage, ProtocolError> {
        let channel = self
            .data_channel()
            .ok_or_else(|| ProtocolError::UnknownEvent(self.event.clone()))?;
        ChannelMessage::from_payload(channel, self.data.clone())
    }
}

/// Subscription control messages the client sends.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClientCommand {
    Subscribe { channel: Channel },
    SubscribeTicker { channel: Channel, ticker: String },
    Unsubscribe { channel: Channel },
    UnsubscribeTicker { channel: Channel, ticker: String },
}

impl ClientCommand {
    /// Subscribe command for a key; entity-scoped keys use the ticker form.
    pub fn subscribe(key: &SubscriptionKey) -> Self {
        match &key.entity {
            Some(ticker) => ClientCommand::SubscribeTicker {
                channel: key.channel,
                ticker: ticker.clone(),
            },
            None => ClientCommand::Subscribe {
                channel: key.channel,
            },
        }
    }

    pub fn unsubscribe(key: &SubscriptionKey) -> Self {
        match &key.entity {
            Some(ticker) => ClientCommand::UnsubscribeTicker {
                channel: key.channel,
                ticker: ticker.clone(),
            },
            None => ClientCommand::Unsubscribe {
                channel: key.channel,
            },
        }
    }

    pub fn event_name(&self) -> &'static str {
        match self {
            ClientCommand::Subscribe { .. } => "subscribe",
            ClientCommand::SubscribeTicker { .. } => "subscribe_ticker",
            ClientCommand::Unsubscribe { .. } => "unsubscribe",
            ClientCommand::UnsubscribeTicker { .. } => "unsubscribe_ticker",
        }
    }

    pub fn payload(&self) -> serde_json::Value {
        match self {
            ClientCommand::Subscribe { channel } | ClientCommand::Unsubscribe { channel } => {
                json!({ "channel": channel.as_str() })
            }
            ClientCommand::SubscribeTicker { channel, ticker }
            | ClientCommand::UnsubscribeTicker { channel, ticker } => {
                json!({ "channel": channel.as_str(), "ticker": ticker })
            }
        }
    }

    pub fn into_envelope(self) -> WsEnvelope {
        WsEnvelope::outbound(self.event_name(), self.payload())
    }

    /// Recognize a subscription control frame (used by tests and servers).
    pub fn from_envelope(envelope: &WsEnvelope) -> Option<Self> {
        let channel = envelope.data.get("channel")?.as_str()?.parse().ok()?;
        let ticker = envelope
            .data
            .get("ticker")
            .and_then(|t| t.as_str())
            .map(str::to_string);
        match (envelope.event.as_str(), ticker) {
            ("subscribe", None) => Some(ClientCommand::Subscribe { channel }),
            ("unsubscribe", None) => Some(ClientCommand::Unsubscribe { channel }),
            ("subscribe_ticker", Some(ticker)) => Some(ClientCommand::SubscribeTicker { channel, ticker }),
            ("unsubscribe_ticker", Some(ticker)) => {
                Some(ClientCommand::UnsubscribeTicker { channel, ticker })
            }
            _ => None,
        }
    }

    /// The subscription key this command refers to.
    pub fn key(&self) -> SubscriptionKey {
        match self {
            ClientCommand::Subscribe { channel } | ClientCommand::Unsubscribe { channel } => {
                SubscriptionKey::channel(*channel)
            }
            ClientCommand::SubscribeTicker { channel, ticker }
            | ClientCommand::UnsubscribeTicker { channel, ticker } => {
                SubscriptionKey::entity(*channel, ticker.clone())
            }
        }
    }
}

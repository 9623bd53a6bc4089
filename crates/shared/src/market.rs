//! Message shapes carried by each channel.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::channel::Channel;
use crate::error::ProtocolError;

/// Latest trade data for one ticker.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PriceUpdate {
    pub ticker: String,
    pub price: f64,
    pub change: f64,
    pub change_percent: f64,
    #[serde(default)]
    pub volume: u64,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewsUpdate {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ticker: Option<String>,
    pub headline: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub summary: Option<String>,
    pub source: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    /// Sentiment score in `[-1, 1]` when the server computed one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sentiment: Option<f64>,
    pub published_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SocialUpdate {
    pub ticker: String,
    pub platform: String,
    pub mentions: u64,
    pub sentiment: f64,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PredictionUpdate {
    pub ticker: String,
    pub predicted_price: f64,
    pub confidence: f64,
    /// Forecast horizon as reported by the server (e.g. `1d`, `1w`).
    pub horizon: String,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AlertSeverity {
    Info,
    Warning,
    Critical,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AlertUpdate {
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ticker: Option<String>,
    pub message: String,
    pub severity: AlertSeverity,
    pub triggered_at: DateTime<Utc>,
}

/// One decoded inbound message, tagged by the channel it arrived on.
#[derive(Debug, Clone, PartialEq)]
pub enum ChannelMessage {
    Price(PriceUpdate),
    News(NewsUpdate),
    Social(SocialUpdate),
    Prediction(PredictionUpdate),
    Alert(AlertUpdate),
}

impl ChannelMessage {
    /// Decode a data event payload according to the channel's message shape.
    pub fn from_payload(channel: Channel, payload: serde_json::Value) -> Result<Self, ProtocolError> {
        let wrap = |source| ProtocolError::Payload {
            channel: channel.as_str(),
            source,
        };
        Ok(match channel {
            Channel::Prices => ChannelMessage::Price(serde_json::from_value(payload).map_err(wrap)?),
            Channel::News => ChannelMessage::News(serde_json::from_value(payload).map_err(wrap)?),
            Channel::Social => ChannelMessage::Social(serde_json::from_value(payload).map_err(wrap)?),
            Channel::Predictions => {
                ChannelMessage::Prediction(serde_json::from_value(payload).map_err(wrap)?)
            }
            Channel::Alerts => ChannelMessage::Alert(serde_json::from_value(payload).map_err(wrap)?),
        })
    }

    pub fn channel(&self) -> Channel {
        match self {
            ChannelMessage::Price(_) => Channel::Prices,
            ChannelMessage::News(_) => Channel::News,
            ChannelMessage::Social(_) => Channel::Social,
            ChannelMessage::Prediction(_) => Channel::Predictions,
            ChannelMessage::Alert(_) => Channel::Alerts,
        }
    }

    /// The entity (ticker) this message is about, if any.
    pub fn entity_id(&self) -> Option<&str> {
        match self {
            ChannelMessage::Price(m) => Some(&m.ticker),
            ChannelMessage::News(m) => m.ticker.as_deref(),
            ChannelMessage::Social(m) => Some(&m.ticker),
            ChannelMessage::Prediction(m) => Some(&m.ticker),
            ChannelMessage::Alert(m) => m.ticker.as_deref(),
        }
    }

    pub fn as_price(&self) -> Option<&PriceUpdate> {
        match self {
            ChannelMessage::Price(m) => Some(m),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn price_payload_decodes_with_entity() {
        let msg = ChannelMessage::from_payload(
            Channel::Prices,
            json!({
                "ticker": "NVDA",
                "price": 912.5,
                "change": 12.25,
                "change_percent": 1.36,
                "volume": 48_200_000u64,
                "timestamp": "2026-10-16T14:30:00Z"
            }),
        )
        .unwrap();

        assert_eq!(msg.channel(), Channel::Prices);
        assert_eq!(msg.entity_id(), Some("NVDA"));
        assert_eq!(msg.as_price().map(|p| p.price), Some(912.5));
    }

    #[test]
    fn news_without_ticker_has_no_entity() {
        let msg = ChannelMessage::from_payload(
            Channel::News,
            json!({
                "headline": "Fed holds rates",
                "source": "wire",
                "published_at": "2026-10-16T12:00:00Z"
            }),
        )
        .unwrap();
        assert_eq!(msg.entity_id(), None);
    }

    #[test]
    fn payload_of_wrong_shape_is_rejected() {
        let err = ChannelMessage::from_payload(Channel::Social, json!({ "ticker": "AAPL" }))
            .unwrap_err();
        assert!(matches!(err, ProtocolError::Payload { channel: "social", .. }));
    }
}

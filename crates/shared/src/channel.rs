//! Channel registry and subscription keys.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::ProtocolError;

/// Separator between the channel and the entity in a subscription key.
pub const KEY_SEPARATOR: char = ':';

/// A logical event stream offered by the analytics server.
///
/// The set is closed: channels are never created or destroyed at runtime.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Channel {
    Prices,
    News,
    Social,
    Predictions,
    Alerts,
}

impl Channel {
    /// Every channel, in registry order.
    pub const ALL: [Channel; 5] = [
        Channel::Prices,
        Channel::News,
        Channel::Social,
        Channel::Predictions,
        Channel::Alerts,
    ];

    /// Name used in subscribe/unsubscribe payloads and subscription keys.
    pub fn as_str(&self) -> &'static str {
        match self {
            Channel::Prices => "prices",
            Channel::News => "news",
            Channel::Social => "social",
            Channel::Predictions => "predictions",
            Channel::Alerts => "alerts",
        }
    }

    /// Name of the inbound transport event carrying this channel's data.
    pub fn data_event(&self) -> &'static str {
        match self {
            Channel::Prices => "price_update",
            Channel::News => "news_update",
            Channel::Social => "social_update",
            Channel::Predictions => "prediction_update",
            Channel::Alerts => "alert_update",
        }
    }

    /// Reverse of [`Channel::data_event`].
    pub fn from_data_event(event: &str) -> Option<Channel> {
        Channel::ALL.into_iter().find(|c| c.data_event() == event)
    }
}

impl fmt::Display for Channel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Channel {
    type Err = ProtocolError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Channel::ALL
            .into_iter()
            .find(|c| c.as_str() == s)
            .ok_or_else(|| ProtocolError::UnknownChannel(s.to_string()))
    }
}

/// A channel, optionally scoped to one entity (e.g. a ticker symbol).
///
/// Renders as `channel` or `channel:ENTITY`. Channel names never contain the
/// separator, so splitting on the first `:` recovers the exact pair.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SubscriptionKey {
    pub channel: Channel,
    pub entity: Option<String>,
}

impl SubscriptionKey {
    pub fn new(channel: Channel, entity: Option<String>) -> Self {
        Self { channel, entity }
    }

    /// Key covering the whole channel.
    pub fn channel(channel: Channel) -> Self {
        Self::new(channel, None)
    }

    /// Key scoped to one entity of a channel.
    pub fn entity(channel: Channel, entity: impl Into<String>) -> Self {
        Self::new(channel, Some(entity.into()))
    }

    pub fn is_entity_scoped(&self) -> bool {
        self.entity.is_some()
    }
}

impl fmt::Display for SubscriptionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.entity {
            Some(entity) => write!(f, "{}{}{}", self.channel, KEY_SEPARATOR, entity),
            None => f.write_str(self.channel.as_str()),
        }
    }
}

impl FromStr for SubscriptionKey {
    type Err = ProtocolError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (channel, entity) = match s.split_once(KEY_SEPARATOR) {
            Some((channel, entity)) => (channel, Some(entity.to_string())),
            None => (s, None),
        };
        let channel = channel
            .parse::<Channel>()
            .map_err(|_| ProtocolError::InvalidKey(s.to_string()))?;
        Ok(Self { channel, entity })
    }
}

impl From<Channel> for SubscriptionKey {
    fn from(channel: Channel) -> Self {
        Self::channel(channel)
    }
}

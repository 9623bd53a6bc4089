//! Market Dash client - real-time market data for Dioxus dashboards
//!
//! One [`RealtimeClient`] multiplexes every dashboard panel over a single
//! WebSocket: panels bind channels (optionally scoped to a ticker), the
//! client keeps the set of active subscriptions and restores it after every
//! reconnect.

pub mod config;
pub mod logging;
pub mod ws;

pub use config::{ReconnectConfig, RealtimeConfig};
pub use marketdash_shared::{Channel, ChannelMessage, SubscriptionKey};
pub use ws::{ConnectionStatus, RealtimeClient};

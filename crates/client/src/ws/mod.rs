//! Real-time multiplexing over a single WebSocket.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────┐ ┌──────────────┐ ┌──────────────┐
//! │ PriceTicker  │ │  NewsFeed    │ │  AlertBar    │   components
//! │ (NVDA)       │ │              │ │              │
//! └──────┬───────┘ └──────┬───────┘ └──────┬───────┘
//!        │ ChannelBinding │                │
//!        └────────────────┼────────────────┘
//!                         ▼
//!              ┌─────────────────────┐
//!              │   RealtimeClient    │  status, active keys,
//!              │                     │  listener table
//!              └──────────┬──────────┘
//!                         │ Transport + EventSink
//!                         ▼
//!              ┌─────────────────────┐
//!              │  WebSocket (one)    │  reconnect loop
//!              └─────────────────────┘
//! ```
//!
//! # Usage
//!
//! ```rust,ignore
//! // In your app root
//! let client = use_hook(|| RealtimeClient::with_default_transport(RealtimeConfig::from_env()));
//! rsx! {
//!     RealtimeProvider { client,
//!         // Your app here
//!     }
//! }
//!
//! // In a component
//! fn Quote(ticker: String) -> Element {
//!     let quote = use_realtime_channel(Channel::Prices, Some(ticker), true);
//!     let price = quote.data().and_then(|m| m.as_price().map(|p| p.price));
//!     rsx! { "{price:?}" }
//! }
//! ```

mod binding;
mod client;
mod connection;
mod hooks;
mod listeners;
mod status;
mod subscriptions;

pub use binding::{
    BindingOptions, BindingState, ChannelBinding, MultiBindingState, MultiChannelBinding,
};
pub use client::{RealtimeClient, WeakRealtimeClient};
pub use listeners::{ListenerId, ListenerTable};
pub use status::{ConnectionStatus, ObserverId, StatusBroadcaster};
pub use subscriptions::SubscriptionManager;

// Re-export transport types
pub use connection::{
    default_factory, EventSink, MemoryTransport, MemoryTransportFactory, MemoryTransportHandle,
    Transport, TransportError, TransportEvent, TransportFactory,
};
#[cfg(not(target_arch = "wasm32"))]
pub use connection::NativeTransport;
#[cfg(target_arch = "wasm32")]
pub use connection::WebTransport;

// Re-export hooks
pub use hooks::{
    use_realtime_channel, use_realtime_channels, use_realtime_client, RealtimeChannel,
    RealtimeChannels, RealtimeProvider,
};

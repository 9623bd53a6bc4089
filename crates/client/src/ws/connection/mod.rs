//! Transport abstraction under the real-time client.
//!
//! A transport owns one WebSocket (and its reconnect loop) and reports what
//! happens to it through an [`EventSink`]. This module holds the shared
//! types and conditionally includes the platform-specific implementation.

use std::fmt;
use std::rc::Rc;

use marketdash_shared::{Channel, WsEnvelope};
use thiserror::Error;

use crate::config::ReconnectConfig;

mod memory;
pub use memory::{MemoryTransport, MemoryTransportFactory, MemoryTransportHandle};

/// Lifecycle and data events reported by a transport
#[derive(Debug, Clone, PartialEq)]
pub enum TransportEvent {
    /// The socket is open and ready to send.
    Connect,
    Disconnect { reason: String },
    ConnectError { error: String },
    /// Follows `Connect` when the connection was re-established by the
    /// reconnect loop.
    Reconnect { attempt: u32 },
    ReconnectAttempt { attempt: u32 },
    /// The reconnect budget is exhausted; the transport is idle.
    ReconnectFailed,
    /// A data event (`price_update`, ...) with its raw payload.
    Data {
        channel: Channel,
        payload: serde_json::Value,
    },
}

#[derive(Debug, Error)]
pub enum TransportError {
    #[error("transport is not open")]
    NotOpen,
    #[error("transport closed: {0}")]
    Closed(String),
}

/// Callback through which a transport reports events to its owner.
#[derive(Clone)]
pub struct EventSink {
    inner: Rc<dyn Fn(TransportEvent)>,
}

impl EventSink {
    pub fn new(f: impl Fn(TransportEvent) + 'static) -> Self {
        Self { inner: Rc::new(f) }
    }

    pub fn emit(&self, event: TransportEvent) {
        (self.inner)(event)
    }

    /// Emit the frame as a data event if its event name belongs to a channel.
    pub(crate) fn deliver_frame(&self, text: &str) {
        match WsEnvelope::from_json(text) {
            Ok(envelope) => match envelope.data_channel() {
                Some(channel) => self.emit(TransportEvent::Data {
                    channel,
                    payload: envelope.data,
                }),
                None => crate::log_debug!("Ignoring non-data event {:?}", envelope.event),
            },
            Err(e) => crate::log_warn!("Dropping unparseable frame: {}", e),
        }
    }
}

impl fmt::Debug for EventSink {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("EventSink")
    }
}

/// One underlying connection.
///
/// Implementations must not call the sink synchronously from inside any of
/// these methods; events are delivered from the transport's own tasks.
pub trait Transport {
    /// Start connecting. Lifecycle and data events go to `sink`.
    fn open(&mut self, url: &str, reconnect: &ReconnectConfig, sink: EventSink);

    /// Restart connecting with a fresh attempt budget.
    fn reconnect(&mut self);

    fn send(&mut self, frame: WsEnvelope) -> Result<(), TransportError>;

    /// Tear down the connection. No events are delivered afterwards.
    fn close(&mut self);
}

/// Creates transports on demand; the client calls it lazily.
pub trait TransportFactory {
    fn create(&self) -> Box<dyn Transport>;
}

impl<F> TransportFactory for F
where
    F: Fn() -> Box<dyn Transport>,
{
    fn create(&self) -> Box<dyn Transport> {
        self()
    }
}

// Include platform-specific implementation
#[cfg(target_arch = "wasm32")]
mod connection_wasm;
#[cfg(target_arch = "wasm32")]
pub use connection_wasm::WebTransport;

#[cfg(not(target_arch = "wasm32"))]
mod connection_native;
#[cfg(not(target_arch = "wasm32"))]
pub use connection_native::NativeTransport;

/// Factory for the platform's WebSocket transport.
pub fn default_factory() -> impl TransportFactory {
    #[cfg(target_arch = "wasm32")]
    {
        || Box::new(WebTransport::new()) as Box<dyn Transport>
    }
    #[cfg(not(target_arch = "wasm32"))]
    {
        || Box::new(NativeTransport::new()) as Box<dyn Transport>
    }
}

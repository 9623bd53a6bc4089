//! The process-wide real-time client.
//!
//! [`RealtimeClient`] owns the single transport, the connection status, the
//! active subscription set and the listener table. It is a cheap `Clone`
//! handle; construct one at startup and hand it to whatever binds channels.

use std::cell::{Cell, RefCell};
use std::fmt;
use std::rc::{Rc, Weak};

use marketdash_shared::{ChannelMessage, ClientCommand, SubscriptionKey, WsEnvelope};

use super::connection::{default_factory, EventSink, Transport, TransportEvent, TransportFactory};
use super::listeners::{ListenerId, ListenerTable};
use super::status::{ConnectionStatus, ObserverId, StatusBroadcaster};
use super::subscriptions::SubscriptionManager;
use crate::config::RealtimeConfig;

struct Inner {
    config: RealtimeConfig,
    factory: Box<dyn TransportFactory>,
    transport: RefCell<Option<Box<dyn Transport>>>,
    /// Bumped for every transport opened; events from older ones are ignored.
    generation: Cell<u64>,
    status: StatusBroadcaster,
    listeners: ListenerTable,
    subscriptions: RefCell<SubscriptionManager>,
    last_error: RefCell<Option<String>>,
}

#[derive(Clone)]
pub struct RealtimeClient {
    inner: Rc<Inner>,
}

/// Non-owning handle, for callbacks registered on the client itself.
#[derive(Clone)]
pub struct WeakRealtimeClient {
    inner: Weak<Inner>,
}

impl WeakRealtimeClient {
    pub fn upgrade(&self) -> Option<RealtimeClient> {
        self.inner.upgrade().map(|inner| RealtimeClient { inner })
    }
}

impl PartialEq for RealtimeClient {
    fn eq(&self, other: &Self) -> bool {
        Rc::ptr_eq(&self.inner, &other.inner)
    }
}

impl fmt::Debug for RealtimeClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RealtimeClient")
            .field("url", &self.inner.config.url)
            .field("status", &self.status())
            .field("active", &self.inner.subscriptions.borrow().len())
            .finish()
    }
}

impl RealtimeClient {
    /// Create a client. No transport exists until the first `connect()`.
    pub fn new(config: RealtimeConfig, factory: impl TransportFactory + 'static) -> Self {
        Self {
            inner: Rc::new(Inner {
                config,
                factory: Box::new(factory),
                transport: RefCell::new(None),
                generation: Cell::new(0),
                status: StatusBroadcaster::new(),
                listeners: ListenerTable::new(),
                subscriptions: RefCell::new(SubscriptionManager::new()),
                last_error: RefCell::new(None),
            }),
        }
    }

    /// Client using the platform WebSocket transport.
    pub fn with_default_transport(config: RealtimeConfig) -> Self {
        Self::new(config, default_factory())
    }

    /// Handle that does not keep the client alive.
    pub fn downgrade(&self) -> WeakRealtimeClient {
        WeakRealtimeClient {
            inner: Rc::downgrade(&self.inner),
        }
    }

    pub fn config(&self) -> &RealtimeConfig {
        &self.inner.config
    }

    // =========================================
    // Connection lifecycle
    // =========================================

    /// Open the transport if there is none, or ask an idle one to reconnect.
    /// A no-op while connected or connecting.
    pub fn connect(&self) {
        let has_transport = self.inner.transport.borrow().is_some();

        if !has_transport {
            let generation = self.inner.generation.get() + 1;
            self.inner.generation.set(generation);
            *self.inner.transport.borrow_mut() = Some(self.inner.factory.create());

            crate::log_info!("Opening realtime connection to {}", self.inner.config.url);
            self.inner.status.update(ConnectionStatus::Connecting);

            let sink = self.sink(generation);
            if let Some(transport) = self.inner.transport.borrow_mut().as_mut() {
                transport.open(&self.inner.config.url, &self.inner.config.reconnect, sink);
            }
            return;
        }

        match self.status() {
            ConnectionStatus::Connected | ConnectionStatus::Connecting => {
                crate::log_debug!("connect(): already {}", self.status());
            }
            ConnectionStatus::Disconnected | ConnectionStatus::Error => {
                crate::log_info!("Requesting reconnect to {}", self.inner.config.url);
                self.inner.status.update(ConnectionStatus::Connecting);
                if let Some(transport) = self.inner.transport.borrow_mut().as_mut() {
                    transport.reconnect();
                }
            }
        }
    }

    /// Tear down the transport and forget every active subscription.
    ///
    /// Listeners stay registered; a later `connect()` starts from scratch.
    pub fn disconnect(&self) {
        let transport = self.inner.transport.borrow_mut().take();
        self.inner.generation.set(self.inner.generation.get() + 1);

        if let Some(mut transport) = transport {
            crate::log_info!("Closing realtime connection");
            transport.close();
        }
        self.inner.subscriptions.borrow_mut().clear();
        self.inner.last_error.borrow_mut().take();
        self.inner.status.update(ConnectionStatus::Disconnected);
    }

    /// Current connection status.
    pub fn status(&self) -> ConnectionStatus {
        self.inner.status.current()
    }

    pub fn is_connected(&self) -> bool {
        self.status().is_connected()
    }

    /// Reason for the most recent connection failure, while it is relevant.
    pub fn last_error(&self) -> Option<String> {
        self.inner.last_error.borrow().clone()
    }

    /// Whether a transport exists (created by the first `connect()`).
    pub fn has_transport(&self) -> bool {
        self.inner.transport.borrow().is_some()
    }

    /// Send an application event. Dropped with a warning unless connected.
    pub fn emit(&self, event: &str, data: serde_json::Value) {
        if !self.is_connected() {
            crate::log_warn!("Dropping {:?}: realtime connection is {}", event, self.status());
            return;
        }
        self.send_frame(WsEnvelope::outbound(event, data));
    }

    fn send_frame(&self, frame: WsEnvelope) {
        let event = frame.event.clone();
        let mut transport = self.inner.transport.borrow_mut();
        let Some(transport) = transport.as_mut() else {
            crate::log_warn!("Dropping {:?}: no transport", event);
            return;
        };
        if let Err(e) = transport.send(frame) {
            crate::log_error!("Failed to send {:?}: {}", event, e);
        }
    }

    fn send_command(&self, command: ClientCommand) {
        crate::log_debug!("{} {}", command.event_name(), command.key());
        self.send_frame(command.into_envelope());
    }

    // =========================================
    // Subscriptions
    // =========================================

    /// Mark a key active, sending a subscribe now if connected.
    /// Idempotent per key.
    pub fn subscribe(&self, key: SubscriptionKey) {
        let connected = self.is_connected();
        let command = self.inner.subscriptions.borrow_mut().subscribe(key, connected);
        if let Some(command) = command {
            self.send_command(command);
        }
    }

    /// Drop a key from the active set, sending an unsubscribe now if connected.
    pub fn unsubscribe(&self, key: &SubscriptionKey) {
        let connected = self.is_connected();
        let command = self.inner.subscriptions.borrow_mut().unsubscribe(key, connected);
        if let Some(command) = command {
            self.send_command(command);
        }
    }

    /// Whether the key is in the active set.
    pub fn is_subscribed(&self, key: &SubscriptionKey) -> bool {
        self.inner.subscriptions.borrow().contains(key)
    }

    /// Active keys in a stable order.
    pub fn active_keys(&self) -> Vec<SubscriptionKey> {
        self.inner.subscriptions.borrow().active_keys()
    }

    fn resubscribe_all(&self) {
        let commands = self.inner.subscriptions.borrow().resubscribe_all();
        if !commands.is_empty() {
            crate::log_info!("Resubscribing {} realtime keys", commands.len());
        }
        for command in commands {
            self.send_command(command);
        }
    }

    // =========================================
    // Listeners
    // =========================================

    /// Register a message listener for a key's channel.
    pub fn add_listener(
        &self,
        key: SubscriptionKey,
        callback: impl Fn(&ChannelMessage) + 'static,
    ) -> ListenerId {
        self.inner.listeners.add(key, callback)
    }

    /// Unregister a message listener, returning the key it was added for.
    pub fn remove_listener(&self, id: ListenerId) -> Option<SubscriptionKey> {
        self.inner.listeners.remove(id)
    }

    /// Whether any listener remains for exactly this key.
    pub fn has_listeners_for(&self, key: &SubscriptionKey) -> bool {
        self.inner.listeners.has_listeners_for(key)
    }

    /// Register a status observer; it is called with the current status first.
    pub fn add_status_listener(&self, callback: impl Fn(ConnectionStatus) + 'static) -> ObserverId {
        self.inner.status.add(callback)
    }

    /// Unregister a status observer.
    pub fn remove_status_listener(&self, id: ObserverId) -> bool {
        self.inner.status.remove(id)
    }

    // =========================================
    // Transport events
    // =========================================

    fn sink(&self, generation: u64) -> EventSink {
        let weak = self.downgrade();
        EventSink::new(move |event| {
            let Some(client) = weak.upgrade() else {
                return;
            };
            if client.inner.generation.get() != generation {
                crate::log_debug!("Ignoring {:?} from a closed transport", event);
                return;
            }
            client.handle_event(event);
        })
    }

    /// Apply one transport event.
    pub fn handle_event(&self, event: TransportEvent) {
        match event {
            TransportEvent::Connect => {
                crate::log_info!("Realtime connection established");
                self.inner.last_error.borrow_mut().take();
                self.resubscribe_all();
                self.inner.status.update(ConnectionStatus::Connected);
            }
            TransportEvent::Reconnect { attempt } => {
                crate::log_info!("Reconnected after {} attempt(s)", attempt);
                if !self.is_connected() {
                    self.inner.status.update(ConnectionStatus::Connected);
                }
            }
            TransportEvent::ReconnectAttempt { attempt } => {
                crate::log_debug!("Reconnect attempt {}", attempt);
            }
            TransportEvent::Disconnect { reason } => {
                crate::log_warn!("Realtime connection lost: {}", reason);
                self.inner.status.update(ConnectionStatus::Disconnected);
            }
            TransportEvent::ConnectError { error } => {
                crate::log_error!("Realtime connection error: {}", error);
                *self.inner.last_error.borrow_mut() = Some(error);
                self.inner.status.update(ConnectionStatus::Error);
            }
            TransportEvent::ReconnectFailed => {
                crate::log_error!("Realtime reconnection failed; call connect() to retry");
                *self.inner.last_error.borrow_mut() = Some("reconnection attempts exhausted".to_string());
                self.inner.status.update(ConnectionStatus::Error);
            }
            TransportEvent::Data { channel, payload } => {
                match ChannelMessage::from_payload(channel, payload) {
                    Ok(message) => {
                        self.inner.listeners.dispatch(&message);
                    }
                    Err(e) => crate::log_warn!("Dropping {} message: {}", channel, e),
                }
            }
        }
    }
}

//! Consumer-side bindings to one channel (or a set of channels).
//!
//! A binding is a scoped acquisition: while it lives, its key is part of the
//! active subscription set and its state tracks the latest message and the
//! connection status. Dropping it (or calling `release`) removes its
//! listeners and unsubscribes the key once no other listener needs it.

use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;

use marketdash_shared::{Channel, ChannelMessage, SubscriptionKey};

use super::client::{RealtimeClient, WeakRealtimeClient};
use super::listeners::ListenerId;
use super::status::{ConnectionStatus, ObserverId};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BindingOptions {
    /// Subscribe and connect as soon as the binding is created.
    pub auto_connect: bool,
}

impl Default for BindingOptions {
    fn default() -> Self {
        Self { auto_connect: true }
    }
}

/// What a single-channel binding exposes to its consumer.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct BindingState {
    /// Latest message for the key; each message replaces the previous one.
    pub data: Option<ChannelMessage>,
    pub status: ConnectionStatus,
    pub error: Option<String>,
}

impl BindingState {
    pub fn new(status: ConnectionStatus) -> Self {
        Self {
            data: None,
            status,
            error: None,
        }
    }

    pub fn is_connected(&self) -> bool {
        self.status.is_connected()
    }

    pub fn is_connecting(&self) -> bool {
        self.status.is_connecting()
    }

    pub fn is_disconnected(&self) -> bool {
        self.status.is_disconnected()
    }

    pub fn has_error(&self) -> bool {
        self.status.has_error()
    }
}

type ChangeCallback<S> = Rc<dyn Fn(&S)>;

/// Error text to expose for a status: the client's last error while in `error`.
fn error_for(status: ConnectionStatus, client: &WeakRealtimeClient) -> Option<String> {
    if !status.has_error() {
        return None;
    }
    let reason = client.upgrade().and_then(|c| c.last_error());
    Some(reason.unwrap_or_else(|| "connection error".to_string()))
}

/// Put back any of `keys` missing from the active set.
///
/// A `disconnect()` through one binding clears every key; each binding that
/// still listens restores its own once the client is connected again.
fn restore_subscriptions(client: &WeakRealtimeClient, keys: &[SubscriptionKey]) {
    let Some(client) = client.upgrade() else {
        return;
    };
    for key in keys {
        if !client.is_subscribed(key) {
            crate::log_debug!("Restoring subscription {}", key);
            client.subscribe(key.clone());
        }
    }
}

fn notify<S: Clone>(state: &RefCell<S>, on_change: &Option<ChangeCallback<S>>, update: impl FnOnce(&mut S)) {
    let snapshot = {
        let mut state = state.borrow_mut();
        update(&mut state);
        state.clone()
    };
    if let Some(callback) = on_change {
        callback(&snapshot);
    }
}

/// Binding of one consumer to one subscription key.
pub struct ChannelBinding {
    client: RealtimeClient,
    key: SubscriptionKey,
    options: BindingOptions,
    state: Rc<RefCell<BindingState>>,
    on_change: Option<ChangeCallback<BindingState>>,
    registration: Option<(ListenerId, ObserverId)>,
}

impl ChannelBinding {
    /// Bind to `channel`, scoped to `entity` when given.
    ///
    /// Listening starts immediately; with `auto_connect` the key is also
    /// subscribed and the client connected.
    pub fn bind(
        client: &RealtimeClient,
        channel: Channel,
        entity: Option<String>,
        options: BindingOptions,
    ) -> Self {
        Self::attach(client, SubscriptionKey::new(channel, entity), options, None)
    }

    /// Like [`bind`](Self::bind), calling `on_change` with a snapshot after
    /// every state change.
    pub fn bind_with_notify(
        client: &RealtimeClient,
        key: SubscriptionKey,
        options: BindingOptions,
        on_change: impl Fn(&BindingState) + 'static,
    ) -> Self {
        Self::attach(client, key, options, Some(Rc::new(on_change)))
    }

    fn attach(
        client: &RealtimeClient,
        key: SubscriptionKey,
        options: BindingOptions,
        on_change: Option<ChangeCallback<BindingState>>,
    ) -> Self {
        let state = Rc::new(RefCell::new(BindingState::new(client.status())));

        let listener = {
            let state = state.clone();
            let on_change = on_change.clone();
            let entity = key.entity.clone();
            client.add_listener(key.clone(), move |message| {
                if let Some(entity) = &entity {
                    if message.entity_id() != Some(entity.as_str()) {
                        return;
                    }
                }
                notify(&state, &on_change, |s| s.data = Some(message.clone()));
            })
        };

        let observer = {
            let state = state.clone();
            let on_change = on_change.clone();
            let weak = client.downgrade();
            let key = key.clone();
            client.add_status_listener(move |status| {
                let error = error_for(status, &weak);
                notify(&state, &on_change, |s| {
                    s.status = status;
                    s.error = error;
                });
                if status.is_connected() {
                    restore_subscriptions(&weak, std::slice::from_ref(&key));
                }
            })
        };

        let binding = Self {
            client: client.clone(),
            key,
            options,
            state,
            on_change,
            registration: Some((listener, observer)),
        };
        if options.auto_connect {
            binding.connect();
        }
        binding
    }

    /// The key this binding holds.
    pub fn key(&self) -> &SubscriptionKey {
        &self.key
    }

    pub fn options(&self) -> BindingOptions {
        self.options
    }

    /// False once released.
    pub fn is_bound(&self) -> bool {
        self.registration.is_some()
    }

    /// Snapshot of data, status and error.
    pub fn state(&self) -> BindingState {
        self.state.borrow().clone()
    }

    /// Latest message for the key, if one arrived since binding or `clear_data`.
    pub fn data(&self) -> Option<ChannelMessage> {
        self.state.borrow().data.clone()
    }

    /// Connection status as last broadcast by the client.
    pub fn status(&self) -> ConnectionStatus {
        self.state.borrow().status
    }

    /// Reason for the failure while the status is `error`.
    pub fn error(&self) -> Option<String> {
        self.state.borrow().error.clone()
    }

    pub fn is_connected(&self) -> bool {
        self.status().is_connected()
    }

    pub fn is_connecting(&self) -> bool {
        self.status().is_connecting()
    }

    pub fn is_disconnected(&self) -> bool {
        self.status().is_disconnected()
    }

    pub fn has_error(&self) -> bool {
        self.status().has_error()
    }

    /// Subscribe this binding's key and connect the client.
    pub fn connect(&self) {
        if !self.is_bound() {
            crate::log_warn!("connect() on released binding for {}", self.key);
            return;
        }
        self.client.subscribe(self.key.clone());
        self.client.connect();
    }

    /// Disconnect the shared client (affects every binding).
    pub fn disconnect(&self) {
        self.client.disconnect();
    }

    /// Forget the cached message; the subscription is untouched.
    pub fn clear_data(&self) {
        notify(&self.state, &self.on_change, |s| s.data = None);
    }

    /// Switch to another key, releasing the current one first.
    pub fn rebind(&mut self, channel: Channel, entity: Option<String>) {
        let key = SubscriptionKey::new(channel, entity);
        if key == self.key && self.is_bound() {
            return;
        }
        self.release();
        *self = Self::attach(&self.client, key, self.options, self.on_change.clone());
    }

    /// Remove the listeners and unsubscribe the key if nothing else listens.
    /// Idempotent; also runs on drop.
    pub fn release(&mut self) {
        let Some((listener, observer)) = self.registration.take() else {
            return;
        };
        self.client.remove_listener(listener);
        self.client.remove_status_listener(observer);
        if !self.client.has_listeners_for(&self.key) {
            self.client.unsubscribe(&self.key);
        }
    }
}

impl Drop for ChannelBinding {
    fn drop(&mut self) {
        self.release();
    }
}

/// Shared state of a multi-channel binding.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct MultiBindingState {
    /// Latest message per channel
    pub data: HashMap<Channel, ChannelMessage>,
    pub status: ConnectionStatus,
    pub error: Option<String>,
}

impl MultiBindingState {
    pub fn is_connected(&self) -> bool {
        self.status.is_connected()
    }

    pub fn is_connecting(&self) -> bool {
        self.status.is_connecting()
    }

    pub fn is_disconnected(&self) -> bool {
        self.status.is_disconnected()
    }

    pub fn has_error(&self) -> bool {
        self.status.has_error()
    }
}

/// Binding of one consumer to several whole channels with one shared status.
pub struct MultiChannelBinding {
    client: RealtimeClient,
    keys: Vec<SubscriptionKey>,
    state: Rc<RefCell<MultiBindingState>>,
    on_change: Option<ChangeCallback<MultiBindingState>>,
    listeners: Vec<ListenerId>,
    observer: Option<ObserverId>,
}

impl MultiChannelBinding {
    /// Bind to every channel in `channels` (duplicates are ignored).
    pub fn bind(client: &RealtimeClient, channels: &[Channel], options: BindingOptions) -> Self {
        Self::attach(client, channels, options, None)
    }

    pub fn bind_with_notify(
        client: &RealtimeClient,
        channels: &[Channel],
        options: BindingOptions,
        on_change: impl Fn(&MultiBindingState) + 'static,
    ) -> Self {
        Self::attach(client, channels, options, Some(Rc::new(on_change)))
    }

    fn attach(
        client: &RealtimeClient,
        channels: &[Channel],
        options: BindingOptions,
        on_change: Option<ChangeCallback<MultiBindingState>>,
    ) -> Self {
        let mut keys: Vec<SubscriptionKey> = Vec::new();
        for channel in channels {
            let key = SubscriptionKey::channel(*channel);
            if !keys.contains(&key) {
                keys.push(key);
            }
        }

        let state = Rc::new(RefCell::new(MultiBindingState {
            status: client.status(),
            ..Default::default()
        }));

        let listeners = keys
            .iter()
            .map(|key| {
                let state = state.clone();
                let on_change = on_change.clone();
                let channel = key.channel;
                client.add_listener(key.clone(), move |message| {
                    notify(&state, &on_change, |s| {
                        s.data.insert(channel, message.clone());
                    });
                })
            })
            .collect();

        let observer = {
            let state = state.clone();
            let on_change = on_change.clone();
            let weak = client.downgrade();
            let keys = keys.clone();
            client.add_status_listener(move |status| {
                let error = error_for(status, &weak);
                notify(&state, &on_change, |s| {
                    s.status = status;
                    s.error = error;
                });
                if status.is_connected() {
                    restore_subscriptions(&weak, &keys);
                }
            })
        };

        let binding = Self {
            client: client.clone(),
            keys,
            state,
            on_change,
            listeners,
            observer: Some(observer),
        };
        if options.auto_connect {
            binding.connect();
        }
        binding
    }

    /// Bound channels, in first-seen order.
    pub fn channels(&self) -> Vec<Channel> {
        self.keys.iter().map(|key| key.channel).collect()
    }

    pub fn state(&self) -> MultiBindingState {
        self.state.borrow().clone()
    }

    /// Latest message on `channel`.
    pub fn data(&self, channel: Channel) -> Option<ChannelMessage> {
        self.state.borrow().data.get(&channel).cloned()
    }

    pub fn status(&self) -> ConnectionStatus {
        self.state.borrow().status
    }

    pub fn is_connected(&self) -> bool {
        self.status().is_connected()
    }

    /// Subscribe every bound channel and connect the client.
    pub fn connect(&self) {
        if self.observer.is_none() {
            return;
        }
        for key in &self.keys {
            self.client.subscribe(key.clone());
        }
        self.client.connect();
    }

    pub fn disconnect(&self) {
        self.client.disconnect();
    }

    pub fn clear_data(&self) {
        notify(&self.state, &self.on_change, |s| s.data.clear());
    }

    /// Remove the listeners and unsubscribe channels nothing else listens to.
    pub fn release(&mut self) {
        let Some(observer) = self.observer.take() else {
            return;
        };
        for listener in self.listeners.drain(..) {
            self.client.remove_listener(listener);
        }
        self.client.remove_status_listener(observer);
        for key in &self.keys {
            if !self.client.has_listeners_for(key) {
                self.client.unsubscribe(key);
            }
        }
    }
}

impl Drop for MultiChannelBinding {
    fn drop(&mut self) {
        self.release();
    }
}

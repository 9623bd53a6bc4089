//! Authoritative set of active subscription keys.
//!
//! The manager only decides; it never touches the transport. Each operation
//! returns the command the caller must send, if any.

use std::collections::BTreeSet;

use marketdash_shared::{ClientCommand, SubscriptionKey};

#[derive(Debug, Default)]
pub struct SubscriptionManager {
    active: BTreeSet<SubscriptionKey>,
}

impl SubscriptionManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Mark a key active.
    ///
    /// A key that is already active produces nothing. A newly active key
    /// produces a subscribe command only while connected; otherwise it is
    /// sent by the next [`resubscribe_all`](Self::resubscribe_all).
    pub fn subscribe(&mut self, key: SubscriptionKey, connected: bool) -> Option<ClientCommand> {
        let command = ClientCommand::subscribe(&key);
        if !self.active.insert(key) {
            return None;
        }
        connected.then_some(command)
    }

    /// Drop a key from the active set; an unsubscribe command is due only if
    /// the key was active and the transport is connected.
    pub fn unsubscribe(&mut self, key: &SubscriptionKey, connected: bool) -> Option<ClientCommand> {
        if !self.active.remove(key) {
            return None;
        }
        connected.then(|| ClientCommand::unsubscribe(key))
    }

    /// Subscribe commands for the whole active set, sent after every
    /// successful (re)connect.
    pub fn resubscribe_all(&self) -> Vec<ClientCommand> {
        self.active.iter().map(ClientCommand::subscribe).collect()
    }

    pub fn clear(&mut self) {
        self.active.clear();
    }

    pub fn contains(&self, key: &SubscriptionKey) -> bool {
        self.active.contains(key)
    }

    pub fn active_keys(&self) -> Vec<SubscriptionKey> {
        self.active.iter().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.active.len()
    }

    pub fn is_empty(&self) -> bool {
        self.active.is_empty()
    }
}

//! Per-channel listener table and fan-out dispatch.

use std::cell::{Cell, RefCell};
use std::collections::HashMap;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::rc::Rc;

use marketdash_shared::{Channel, ChannelMessage, SubscriptionKey};

/// Handle returned when registering a message listener.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListenerId(u64);

pub type MessageCallback = Rc<dyn Fn(&ChannelMessage)>;

struct ListenerEntry {
    id: ListenerId,
    /// Key the listener was registered for; dispatch ignores it.
    key: SubscriptionKey,
    /// Cleared on removal, so a dispatch already in flight skips the entry.
    live: Rc<Cell<bool>>,
    callback: MessageCallback,
}

/// Run a consumer callback, containing any panic it raises.
///
/// Returns false if the callback panicked.
pub(crate) fn invoke_guarded(what: &str, f: impl FnOnce()) -> bool {
    match catch_unwind(AssertUnwindSafe(f)) {
        Ok(()) => true,
        Err(panic) => {
            let reason = panic
                .downcast_ref::<&str>()
                .map(|s| s.to_string())
                .or_else(|| panic.downcast_ref::<String>().cloned())
                .unwrap_or_else(|| "unknown panic".to_string());
            crate::log_error!("{} panicked: {}", what, reason);
            false
        }
    }
}

/// Listener sets keyed by channel.
///
/// Inbound messages carry their own entity id, so dispatch is channel wide;
/// entity filtering belongs to the consumer.
#[derive(Default)]
pub struct ListenerTable {
    next_id: Cell<u64>,
    by_channel: RefCell<HashMap<Channel, Vec<ListenerEntry>>>,
}

impl ListenerTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&self, key: SubscriptionKey, callback: impl Fn(&ChannelMessage) + 'static) -> ListenerId {
        let id = ListenerId(self.next_id.get());
        self.next_id.set(id.0 + 1);

        self.by_channel
            .borrow_mut()
            .entry(key.channel)
            .or_default()
            .push(ListenerEntry {
                id,
                key,
                live: Rc::new(Cell::new(true)),
                callback: Rc::new(callback),
            });
        id
    }

    /// Remove a listener, returning the key it was registered for.
    pub fn remove(&self, id: ListenerId) -> Option<SubscriptionKey> {
        let mut by_channel = self.by_channel.borrow_mut();
        let mut removed = None;
        let mut emptied = None;

        for (channel, entries) in by_channel.iter_mut() {
            if let Some(pos) = entries.iter().position(|entry| entry.id == id) {
                let entry = entries.remove(pos);
                entry.live.set(false);
                removed = Some(entry.key);
                if entries.is_empty() {
                    emptied = Some(*channel);
                }
                break;
            }
        }
        if let Some(channel) = emptied {
            by_channel.remove(&channel);
        }
        removed
    }

    /// Whether any listener is still registered for exactly this key.
    pub fn has_listeners_for(&self, key: &SubscriptionKey) -> bool {
        self.by_channel
            .borrow()
            .get(&key.channel)
            .is_some_and(|entries| entries.iter().any(|entry| &entry.key == key))
    }

    pub fn listener_count(&self, channel: Channel) -> usize {
        self.by_channel.borrow().get(&channel).map_or(0, Vec::len)
    }

    /// Deliver a message to every listener on its channel.
    ///
    /// Iterates a snapshot taken before the first call, so listeners may add
    /// or remove listeners (themselves included) while being invoked. Listeners
    /// added meanwhile wait for the next message; listeners removed meanwhile
    /// are not called again. A panicking listener is logged and skipped.
    /// Returns how many listeners completed without panicking.
    pub fn dispatch(&self, message: &ChannelMessage) -> usize {
        let snapshot: Vec<(Rc<Cell<bool>>, MessageCallback)> =
            match self.by_channel.borrow().get(&message.channel()) {
                Some(entries) => entries
                    .iter()
                    .map(|entry| (entry.live.clone(), entry.callback.clone()))
                    .collect(),
                None => return 0,
            };

        snapshot
            .into_iter()
            .filter(|(live, _)| live.get())
            .filter(|(_, callback)| invoke_guarded("message listener", || callback(message)))
            .count()
    }
}

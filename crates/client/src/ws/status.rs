//! Process-wide connection status and its observers.

use std::cell::{Cell, RefCell};
use std::fmt;
use std::rc::Rc;

use super::listeners::invoke_guarded;

/// Connection state of the real-time transport
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ConnectionStatus {
    Connecting,
    Connected,
    Disconnected,
    Error,
}

impl ConnectionStatus {
    pub fn is_connected(&self) -> bool {
        matches!(self, ConnectionStatus::Connected)
    }

    pub fn is_connecting(&self) -> bool {
        matches!(self, ConnectionStatus::Connecting)
    }

    pub fn is_disconnected(&self) -> bool {
        matches!(self, ConnectionStatus::Disconnected)
    }

    pub fn has_error(&self) -> bool {
        matches!(self, ConnectionStatus::Error)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ConnectionStatus::Connecting => "connecting",
            ConnectionStatus::Connected => "connected",
            ConnectionStatus::Disconnected => "disconnected",
            ConnectionStatus::Error => "error",
        }
    }
}

impl Default for ConnectionStatus {
    fn default() -> Self {
        ConnectionStatus::Disconnected
    }
}

impl fmt::Display for ConnectionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Handle returned when registering a status observer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ObserverId(u64);

pub type StatusCallback = Rc<dyn Fn(ConnectionStatus)>;

/// Fans status transitions out to observers, replaying the current value
/// to each observer as it registers.
#[derive(Default)]
pub struct StatusBroadcaster {
    current: Cell<ConnectionStatus>,
    next_id: Cell<u64>,
    observers: RefCell<Vec<(ObserverId, StatusCallback)>>,
}

impl StatusBroadcaster {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn current(&self) -> ConnectionStatus {
        self.current.get()
    }

    /// Register an observer. It is called once with the current status
    /// before it is added to the broadcast set.
    pub fn add(&self, callback: impl Fn(ConnectionStatus) + 'static) -> ObserverId {
        let id = ObserverId(self.next_id.get());
        self.next_id.set(id.0 + 1);

        let callback: StatusCallback = Rc::new(callback);
        let current = self.current.get();
        invoke_guarded("status observer", || callback(current));

        self.observers.borrow_mut().push((id, callback));
        id
    }

    /// Returns false if the observer was not registered.
    pub fn remove(&self, id: ObserverId) -> bool {
        let mut observers = self.observers.borrow_mut();
        let before = observers.len();
        observers.retain(|(observer, _)| *observer != id);
        observers.len() != before
    }

    /// Set the status and notify every observer, in registration order.
    pub fn update(&self, status: ConnectionStatus) {
        self.current.set(status);

        let snapshot: Vec<StatusCallback> = self
            .observers
            .borrow()
            .iter()
            .map(|(_, callback)| callback.clone())
            .collect();
        for callback in snapshot {
            invoke_guarded("status observer", || callback(status));
        }
    }

    pub fn observer_count(&self) -> usize {
        self.observers.borrow().len()
    }
}

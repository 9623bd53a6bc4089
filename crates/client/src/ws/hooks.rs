//! Dioxus hooks binding a component's lifetime to realtime channels.
//!
//! The hooks are thin: each one owns a [`ChannelBinding`] (or
//! [`MultiChannelBinding`]) for as long as the component is mounted, mirrors
//! its state into a signal, rebinds when its inputs change, and releases the
//! binding on unmount.

use std::cell::RefCell;
use std::rc::Rc;

use dioxus::prelude::*;
use marketdash_shared::{Channel, ChannelMessage, SubscriptionKey};

use super::binding::{
    BindingOptions, BindingState, ChannelBinding, MultiBindingState, MultiChannelBinding,
};
use super::client::RealtimeClient;
use super::status::ConnectionStatus;

/// Makes `client` available to every `use_realtime_*` hook below it.
#[component]
pub fn RealtimeProvider(client: RealtimeClient, children: Element) -> Element {
    use_context_provider(|| client.clone());
    children
}

/// The client installed by the nearest [`RealtimeProvider`].
pub fn use_realtime_client() -> RealtimeClient {
    use_context::<RealtimeClient>()
}

/// Live view of one channel, optionally scoped to one entity.
#[derive(Clone, Copy)]
pub struct RealtimeChannel {
    pub state: Signal<BindingState>,
    binding: Signal<Rc<RefCell<Option<ChannelBinding>>>>,
}

impl RealtimeChannel {
    /// Latest message for the bound key.
    pub fn data(&self) -> Option<ChannelMessage> {
        self.state.read().data.clone()
    }

    pub fn status(&self) -> ConnectionStatus {
        self.state.read().status
    }

    /// Reason for the failure while the status is `error`.
    pub fn error(&self) -> Option<String> {
        self.state.read().error.clone()
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

    fn with_binding(&self, f: impl FnOnce(&ChannelBinding)) {
        let slot = (*self.binding.peek()).clone();
        if let Some(binding) = slot.borrow().as_ref() {
            f(binding);
        };
    }

    /// Subscribe the bound key and connect the client.
    pub fn connect(&self) {
        self.with_binding(ChannelBinding::connect);
    }

    /// Disconnect the shared client.
    pub fn disconnect(&self) {
        self.with_binding(ChannelBinding::disconnect);
    }

    pub fn clear_data(&self) {
        self.with_binding(ChannelBinding::clear_data);
    }
}

/// Subscribe the calling component to `channel` (and `entity`, if given).
///
/// With `auto_connect` the client connects on mount. Changing `channel` or
/// `entity` releases the old key before binding the new one.
pub fn use_realtime_channel(
    channel: Channel,
    entity: Option<String>,
    auto_connect: bool,
) -> RealtimeChannel {
    let client = use_realtime_client();
    let state = use_signal(|| BindingState::new(client.status()));
    let slot = use_hook(|| Rc::new(RefCell::new(None::<ChannelBinding>)));
    let binding = use_signal(|| slot.clone());

    {
        let slot = slot.clone();
        use_effect(use_reactive(
            (&channel, &entity, &auto_connect),
            move |(channel, entity, auto_connect)| {
                // Release the previous key before acquiring the new one.
                let previous = slot.borrow_mut().take();
                drop(previous);

                let key = SubscriptionKey::new(channel, entity);
                let fresh = ChannelBinding::bind_with_notify(
                    &client,
                    key,
                    BindingOptions { auto_connect },
                    move |snapshot| {
                        let mut state = state;
                        // The component may already be gone.
                        if let Ok(mut current) = state.try_write() {
                            *current = snapshot.clone();
                        };
                    },
                );
                let mut state = state;
                state.set(fresh.state());
                *slot.borrow_mut() = Some(fresh);
            },
        ));
    }

    use_drop(move || {
        slot.borrow_mut().take();
    });

    RealtimeChannel { state, binding }
}

/// Live view of several whole channels with one shared status.
#[derive(Clone, Copy)]
pub struct RealtimeChannels {
    pub state: Signal<MultiBindingState>,
    binding: Signal<Rc<RefCell<Option<MultiChannelBinding>>>>,
}

impl RealtimeChannels {
    /// Latest message on `channel`.
    pub fn data(&self, channel: Channel) -> Option<ChannelMessage> {
        self.state.read().data.get(&channel).cloned()
    }

    pub fn status(&self) -> ConnectionStatus {
        self.state.read().status
    }

    pub fn is_connected(&self) -> bool {
        self.status().is_connected()
    }

    pub fn has_error(&self) -> bool {
        self.status().has_error()
    }

    fn with_binding(&self, f: impl FnOnce(&MultiChannelBinding)) {
        let slot = (*self.binding.peek()).clone();
        if let Some(binding) = slot.borrow().as_ref() {
            f(binding);
        };
    }

    pub fn connect(&self) {
        self.with_binding(MultiChannelBinding::connect);
    }

    pub fn disconnect(&self) {
        self.with_binding(MultiChannelBinding::disconnect);
    }

    pub fn clear_data(&self) {
        self.with_binding(MultiChannelBinding::clear_data);
    }
}

/// Subscribe the calling component to every channel in `channels`.
pub fn use_realtime_channels(channels: Vec<Channel>, auto_connect: bool) -> RealtimeChannels {
    let client = use_realtime_client();
    let state = use_signal(|| MultiBindingState {
        status: client.status(),
        ..Default::default()
    });
    let slot = use_hook(|| Rc::new(RefCell::new(None::<MultiChannelBinding>)));
    let binding = use_signal(|| slot.clone());

    {
        let slot = slot.clone();
        use_effect(use_reactive(
            (&channels, &auto_connect),
            move |(channels, auto_connect)| {
                let previous = slot.borrow_mut().take();
                drop(previous);

                let fresh = MultiChannelBinding::bind_with_notify(
                    &client,
                    &channels,
                    BindingOptions { auto_connect },
                    move |snapshot| {
                        let mut state = state;
                        if let Ok(mut current) = state.try_write() {
                            *current = snapshot.clone();
                        };
                    },
                );
                let mut state = state;
                state.set(fresh.state());
                *slot.borrow_mut() = Some(fresh);
            },
        ));
    }

    use_drop(move || {
        slot.borrow_mut().take();
    });

    RealtimeChannels { state, binding }
}

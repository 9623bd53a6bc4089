//! Client behavior driven through the in-memory transport.

use std::cell::RefCell;
use std::collections::BTreeSet;
use std::rc::Rc;

use marketdash_client::ws::{
    ConnectionStatus, ListenerId, MemoryTransportFactory, MemoryTransportHandle, TransportEvent,
};
use marketdash_client::{Channel, ChannelMessage, RealtimeClient, RealtimeConfig, SubscriptionKey};
use marketdash_shared::ClientCommand;
use serde_json::json;

fn client() -> (RealtimeClient, MemoryTransportHandle) {
    let (factory, handle) = MemoryTransportFactory::new();
    let client = RealtimeClient::new(RealtimeConfig::new("ws://test/ws"), factory);
    (client, handle)
}

fn connected_client() -> (RealtimeClient, MemoryTransportHandle) {
    let (client, handle) = client();
    client.connect();
    assert!(handle.connect());
    (client, handle)
}

fn price(ticker: &str, price: f64) -> serde_json::Value {
    json!({
        "ticker": ticker,
        "price": price,
        "change": 1.25,
        "change_percent": 0.4,
        "volume": 1000,
        "timestamp": "2026-01-05T14:30:00Z",
    })
}

fn nvda() -> SubscriptionKey {
    SubscriptionKey::entity(Channel::Prices, "NVDA")
}

#[test]
fn transport_is_created_lazily() {
    let (client, handle) = client();
    client.subscribe(SubscriptionKey::channel(Channel::News));

    assert!(!client.has_transport());
    assert_eq!(handle.created(), 0);
    assert_eq!(client.status(), ConnectionStatus::Disconnected);

    client.connect();
    assert!(client.has_transport());
    assert_eq!(handle.created(), 1);
    assert_eq!(handle.opened(), 1);
    assert_eq!(handle.url().as_deref(), Some("ws://test/ws"));
    assert_eq!(client.status(), ConnectionStatus::Connecting);
}

#[test]
fn connect_is_a_no_op_while_connecting_or_connected() {
    let (client, handle) = client();
    client.connect();
    client.connect();
    assert_eq!(handle.created(), 1);
    assert_eq!(handle.reconnects(), 0);

    handle.connect();
    client.connect();
    assert_eq!(handle.created(), 1);
    assert_eq!(handle.reconnects(), 0);
    assert!(client.is_connected());
}

#[test]
fn subscriptions_made_offline_are_sent_on_connect() {
    let (client, handle) = client();
    client.subscribe(nvda());
    client.subscribe(SubscriptionKey::channel(Channel::News));
    client.connect();
    assert!(handle.sent().is_empty());

    handle.connect();

    let sent: BTreeSet<String> = handle
        .sent_commands()
        .iter()
        .map(|c| format!("{} {}", c.event_name(), c.key()))
        .collect();
    let expected: BTreeSet<String> = ["subscribe_ticker prices:NVDA", "subscribe news"]
        .iter()
        .map(|s| s.to_string())
        .collect();
    assert_eq!(sent, expected);
}

#[test]
fn resubscribe_happens_before_connected_is_observed() {
    let (client, handle) = client();
    client.subscribe(nvda());
    client.connect();

    let sent_when_connected = Rc::new(RefCell::new(None));
    {
        let handle = handle.clone();
        let sent_when_connected = sent_when_connected.clone();
        client.add_status_listener(move |status| {
            if status == ConnectionStatus::Connected {
                *sent_when_connected.borrow_mut() = Some(handle.sent().len());
            }
        });
    }
    handle.connect();

    assert_eq!(*sent_when_connected.borrow(), Some(1));
}

#[test]
fn subscribe_is_idempotent_per_key() {
    let (client, handle) = connected_client();
    client.subscribe(nvda());
    client.subscribe(nvda());
    client.subscribe(SubscriptionKey::entity(Channel::Prices, "AAPL"));

    assert_eq!(
        handle.sent_commands(),
        vec![
            ClientCommand::SubscribeTicker {
                channel: Channel::Prices,
                ticker: "NVDA".to_string()
            },
            ClientCommand::SubscribeTicker {
                channel: Channel::Prices,
                ticker: "AAPL".to_string()
            },
        ]
    );
}

#[test]
fn unsubscribe_sends_only_for_active_keys() {
    let (client, handle) = connected_client();
    client.unsubscribe(&nvda());
    assert!(handle.sent().is_empty());

    client.subscribe(nvda());
    client.unsubscribe(&nvda());
    client.unsubscribe(&nvda());

    assert_eq!(
        handle.sent_commands(),
        vec![
            ClientCommand::subscribe(&nvda()),
            ClientCommand::unsubscribe(&nvda()),
        ]
    );
    assert!(!client.is_subscribed(&nvda()));
}

#[test]
fn reconnect_restores_every_active_key_exactly_once() {
    let (client, handle) = connected_client();
    let keys = [
        nvda(),
        SubscriptionKey::entity(Channel::Social, "TSLA"),
        SubscriptionKey::channel(Channel::Alerts),
    ];
    for key in &keys {
        client.subscribe(key.clone());
    }
    handle.clear_sent();

    assert!(handle.bounce());

    let mut resent: Vec<String> = handle.sent_commands().iter().map(|c| c.key().to_string()).collect();
    resent.sort();
    let mut expected: Vec<String> = keys.iter().map(|k| k.to_string()).collect();
    expected.sort();
    assert_eq!(resent, expected);
    assert!(client.is_connected());
}

#[test]
fn status_goes_through_disconnected_on_a_bounce() {
    let (client, handle) = connected_client();
    let seen = Rc::new(RefCell::new(Vec::new()));
    {
        let seen = seen.clone();
        client.add_status_listener(move |status| seen.borrow_mut().push(status));
    }

    handle.bounce();

    assert_eq!(
        *seen.borrow(),
        vec![
            ConnectionStatus::Connected,
            ConnectionStatus::Disconnected,
            ConnectionStatus::Connected,
        ]
    );
}

#[test]
fn late_status_listener_gets_the_current_status_first() {
    let (client, _handle) = connected_client();
    let seen = Rc::new(RefCell::new(Vec::new()));
    {
        let seen = seen.clone();
        client.add_status_listener(move |status| seen.borrow_mut().push(status));
    }
    assert_eq!(*seen.borrow(), vec![ConnectionStatus::Connected]);
}

#[test]
fn messages_fan_out_to_every_listener_on_the_channel() {
    let (client, handle) = connected_client();
    let first = Rc::new(RefCell::new(Vec::new()));
    let second = Rc::new(RefCell::new(Vec::new()));
    {
        let first = first.clone();
        client.add_listener(nvda(), move |m| first.borrow_mut().push(m.clone()));
    }
    {
        let second = second.clone();
        client.add_listener(SubscriptionKey::channel(Channel::Prices), move |m| {
            second.borrow_mut().push(m.clone())
        });
    }

    handle.data(Channel::Prices, price("NVDA", 912.5));
    handle.data(Channel::News, json!({ "headline": "x", "source": "y", "published_at": "2026-01-05T14:30:00Z" }));

    assert_eq!(first.borrow().len(), 1);
    assert_eq!(second.borrow().len(), 1);
    match &first.borrow()[0] {
        ChannelMessage::Price(p) => assert_eq!(p.price, 912.5),
        other => panic!("unexpected message {:?}", other),
    };
}

#[test]
fn a_panicking_listener_does_not_starve_the_others() {
    let (client, handle) = connected_client();
    client.add_listener(nvda(), |_| panic!("listener bug"));
    let count = Rc::new(RefCell::new(0));
    {
        let count = count.clone();
        client.add_listener(nvda(), move |_| *count.borrow_mut() += 1);
    }

    handle.data(Channel::Prices, price("NVDA", 1.0));
    handle.data(Channel::Prices, price("NVDA", 2.0));

    assert_eq!(*count.borrow(), 2);
}

#[test]
fn removed_listeners_stop_receiving() {
    let (client, handle) = connected_client();
    let count = Rc::new(RefCell::new(0));
    let id = {
        let count = count.clone();
        client.add_listener(nvda(), move |_| *count.borrow_mut() += 1)
    };
    handle.data(Channel::Prices, price("NVDA", 1.0));
    assert_eq!(client.remove_listener(id), Some(nvda()));
    assert!(!client.has_listeners_for(&nvda()));
    handle.data(Channel::Prices, price("NVDA", 2.0));

    assert_eq!(*count.borrow(), 1);
}

#[test]
fn removing_one_listener_leaves_the_others() {
    let (client, handle) = connected_client();
    let a = Rc::new(RefCell::new(0));
    let b = Rc::new(RefCell::new(0));
    let news = Rc::new(RefCell::new(0));
    let id_a = {
        let a = a.clone();
        client.add_listener(nvda(), move |_| *a.borrow_mut() += 1)
    };
    let id_b = {
        let b = b.clone();
        client.add_listener(nvda(), move |_| *b.borrow_mut() += 1)
    };
    {
        let news = news.clone();
        client.add_listener(SubscriptionKey::channel(Channel::News), move |_| *news.borrow_mut() += 1);
    }
    let headline = json!({ "headline": "x", "source": "y", "published_at": "2026-01-05T14:30:00Z" });

    client.remove_listener(id_a);
    handle.data(Channel::Prices, price("NVDA", 1.0));
    assert_eq!((*a.borrow(), *b.borrow()), (0, 1));

    client.remove_listener(id_b);
    handle.data(Channel::Prices, price("NVDA", 2.0));
    handle.data(Channel::News, headline);
    assert_eq!((*a.borrow(), *b.borrow(), *news.borrow()), (0, 1, 1));
}

#[test]
fn a_listener_removing_itself_mid_dispatch_does_not_skip_others() {
    let (client, handle) = connected_client();
    let slot: Rc<RefCell<Option<ListenerId>>> = Rc::new(RefCell::new(None));
    let first = Rc::new(RefCell::new(0));
    let second = Rc::new(RefCell::new(0));
    let id = {
        let inner = client.clone();
        let slot = slot.clone();
        let first = first.clone();
        client.add_listener(nvda(), move |_| {
            *first.borrow_mut() += 1;
            if let Some(id) = slot.borrow_mut().take() {
                inner.remove_listener(id);
            }
        })
    };
    *slot.borrow_mut() = Some(id);
    {
        let second = second.clone();
        client.add_listener(nvda(), move |_| *second.borrow_mut() += 1);
    }

    handle.data(Channel::Prices, price("NVDA", 1.0));
    handle.data(Channel::Prices, price("NVDA", 2.0));

    assert_eq!(*first.borrow(), 1);
    assert_eq!(*second.borrow(), 2);
}

#[test]
fn raw_frames_are_decoded_and_bad_ones_dropped() {
    let (client, handle) = connected_client();
    let received = Rc::new(RefCell::new(Vec::new()));
    {
        let received = received.clone();
        client.add_listener(SubscriptionKey::channel(Channel::Alerts), move |m| {
            received.borrow_mut().push(m.clone())
        });
    }

    handle.frame("not json");
    handle.frame(r#"{"event":"alert_update","data":{"id":"a1"}}"#);
    handle.frame(r#"{"event":"pong","data":{}}"#);
    handle.frame(
        r#"{"event":"alert_update","data":{"id":"a1","ticker":"NVDA","message":"Volume spike","severity":"warning","triggered_at":"2026-01-05T14:30:00Z"}}"#,
    );

    let received = received.borrow();
    assert_eq!(received.len(), 1);
    assert_eq!(received[0].entity_id(), Some("NVDA"));
}

#[test]
fn emit_is_dropped_unless_connected() {
    let (client, handle) = client();
    client.connect();
    client.emit("ping", json!({}));
    assert!(handle.sent().is_empty());

    handle.connect();
    client.emit("ping", json!({ "n": 1 }));
    let sent = handle.sent();
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].event, "ping");
    assert_eq!(sent[0].data, json!({ "n": 1 }));
    assert!(sent[0].id.is_some());
}

#[test]
fn emit_after_the_connection_drops_sends_nothing() {
    let (client, handle) = connected_client();
    handle.disconnect("server restart");
    assert_eq!(client.status(), ConnectionStatus::Disconnected);
    assert!(handle.is_open());

    client.emit("ping", json!({}));

    assert!(handle.sent().is_empty());
}

#[test]
fn send_failures_are_contained() {
    let (client, handle) = connected_client();
    handle.fail_sends(true);
    client.subscribe(nvda());
    assert!(client.is_subscribed(&nvda()));
    assert!(handle.sent().is_empty());
}

#[test]
fn connect_error_surfaces_the_reason() {
    let (client, handle) = client();
    client.connect();
    handle.emit(TransportEvent::ConnectError {
        error: "connection refused".to_string(),
    });

    assert_eq!(client.status(), ConnectionStatus::Error);
    assert_eq!(client.last_error().as_deref(), Some("connection refused"));

    handle.connect();
    assert_eq!(client.last_error(), None);
}

#[test]
fn exhausted_reconnects_leave_error_until_connect_is_called() {
    let (client, handle) = connected_client();
    handle.disconnect("server restart");
    for attempt in 1..=5 {
        handle.emit(TransportEvent::ReconnectAttempt { attempt });
        handle.emit(TransportEvent::ConnectError {
            error: "refused".to_string(),
        });
    }
    handle.emit(TransportEvent::ReconnectFailed);

    assert_eq!(client.status(), ConnectionStatus::Error);
    assert!(client.last_error().is_some());

    client.connect();
    assert_eq!(handle.reconnects(), 1);
    assert_eq!(handle.created(), 1);
    assert_eq!(client.status(), ConnectionStatus::Connecting);
}

#[test]
fn disconnect_closes_the_transport_and_forgets_subscriptions() {
    let (client, handle) = connected_client();
    client.subscribe(nvda());
    let listener = client.add_listener(nvda(), |_| {});

    client.disconnect();

    assert_eq!(handle.closed(), 1);
    assert!(!client.has_transport());
    assert!(client.active_keys().is_empty());
    assert_eq!(client.status(), ConnectionStatus::Disconnected);
    // Listeners survive a disconnect.
    assert!(client.has_listeners_for(&nvda()));
    assert_eq!(client.remove_listener(listener), Some(nvda()));

    handle.clear_sent();
    client.connect();
    handle.connect();
    assert!(handle.sent().is_empty());
    assert_eq!(handle.created(), 2);
}

#[test]
fn events_from_a_replaced_transport_are_ignored() {
    let (client, handle) = connected_client();
    let stale = handle.sink().expect("open transport");

    client.disconnect();
    client.connect();
    assert_eq!(client.status(), ConnectionStatus::Connecting);

    stale.emit(TransportEvent::Connect);
    assert_eq!(client.status(), ConnectionStatus::Connecting);

    handle.connect();
    assert!(client.is_connected());
}

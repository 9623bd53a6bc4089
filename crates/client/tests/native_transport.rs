//! The tokio-tungstenite transport against a local WebSocket server.

#![cfg(not(target_arch = "wasm32"))]

use std::cell::RefCell;
use std::rc::Rc;
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use marketdash_client::ws::{default_factory, ConnectionStatus};
use marketdash_client::{Channel, ChannelMessage, ReconnectConfig, RealtimeClient, RealtimeConfig, SubscriptionKey};
use marketdash_shared::WsEnvelope;
use serde_json::json;
use tokio::net::TcpListener;
use tokio::task::LocalSet;
use tokio_tungstenite::tungstenite::Message;

async fn wait_for(what: &str, mut done: impl FnMut() -> bool) {
    for _ in 0..500 {
        if done() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("timed out waiting for {}", what);
}

#[tokio::test]
async fn subscribes_and_receives_over_a_real_socket() {
    let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
    let addr = listener.local_addr().expect("addr");

    let server = tokio::spawn(async move {
        let (stream, _) = listener.accept().await.expect("accept");
        let mut ws = tokio_tungstenite::accept_async(stream).await.expect("handshake");
        let first = loop {
            match ws.next().await {
                Some(Ok(Message::Text(text))) => break text.as_str().to_string(),
                Some(Ok(_)) => continue,
                other => panic!("unexpected {:?}", other),
            }
        };
        let update = WsEnvelope::outbound(
            "price_update",
            json!({
                "ticker": "NVDA",
                "price": 912.5,
                "change": 3.1,
                "change_percent": 0.34,
                "volume": 42,
                "timestamp": "2026-01-05T14:30:00Z",
            }),
        );
        let frame = update.to_json().expect("encode");
        ws.send(Message::Text(frame.into())).await.expect("send");
        // Hold the socket open until the client goes away.
        while let Some(Ok(_)) = ws.next().await {}
        first
    });

    let local = LocalSet::new();
    local
        .run_until(async move {
            let config = RealtimeConfig::new(format!("ws://{}/ws", addr));
            let client = RealtimeClient::new(config, default_factory());
            let received = Rc::new(RefCell::new(Vec::new()));
            {
                let received = received.clone();
                client.add_listener(SubscriptionKey::entity(Channel::Prices, "NVDA"), move |m| {
                    received.borrow_mut().push(m.clone())
                });
            }
            client.subscribe(SubscriptionKey::entity(Channel::Prices, "NVDA"));
            client.connect();
            assert_eq!(client.status(), ConnectionStatus::Connecting);

            wait_for("price update", || !received.borrow().is_empty()).await;
            assert!(client.is_connected());
            match &received.borrow()[0] {
                ChannelMessage::Price(p) => assert_eq!(p.price, 912.5),
                other => panic!("unexpected message {:?}", other),
            }

            client.disconnect();
        })
        .await;
    // Dropping the set drops the aborted connection task and its socket.
    drop(local);

    let first = server.await.expect("server task");
    let envelope = WsEnvelope::from_json(&first).expect("subscribe frame");
    assert_eq!(envelope.event, "subscribe_ticker");
    assert_eq!(envelope.data, json!({ "channel": "prices", "ticker": "NVDA" }));
}

#[tokio::test]
async fn gives_up_after_the_attempt_budget() {
    // Bind then drop to get a port nobody listens on.
    let addr = {
        let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
        listener.local_addr().expect("addr")
    };

    let local = LocalSet::new();
    local
        .run_until(async move {
            let config = RealtimeConfig::new(format!("ws://{}/ws", addr)).with_reconnect(ReconnectConfig {
                max_attempts: 2,
                delay_ms: 10,
            });
            let client = RealtimeClient::new(config, default_factory());
            let statuses = Rc::new(RefCell::new(Vec::new()));
            {
                let statuses = statuses.clone();
                client.add_status_listener(move |s| statuses.borrow_mut().push(s));
            }

            client.connect();
            wait_for("reconnect budget", || {
                client.last_error().as_deref() == Some("reconnection attempts exhausted")
            })
            .await;

            assert_eq!(client.status(), ConnectionStatus::Error);
            let errors = statuses
                .borrow()
                .iter()
                .filter(|s| **s == ConnectionStatus::Error)
                .count();
            // Initial attempt, two retries, then the give-up.
            assert_eq!(errors, 4);
            client.disconnect();
        })
        .await;
}

//! Market Dash - Main entry point
//!
//! A small live dashboard over the real-time client.
//! Supports both web (WASM) and desktop platforms.

#![allow(non_snake_case)]

use dioxus::prelude::*;
use marketdash_client::{
    logging,
    ws::{use_realtime_channel, use_realtime_channels, RealtimeProvider},
    Channel, ChannelMessage, RealtimeClient, RealtimeConfig,
};

const WATCHLIST: [&str; 3] = ["NVDA", "AAPL", "TSLA"];

fn main() {
    logging::init();
    dioxus::launch(App);
}

#[component]
fn App() -> Element {
    let client = use_hook(|| RealtimeClient::with_default_transport(RealtimeConfig::from_env()));

    rsx! {
        RealtimeProvider { client: client.clone(),
            h1 { "Market Dash" }
            for ticker in WATCHLIST {
                LiveQuote { key: "{ticker}", ticker: ticker.to_string() }
            }
            Headlines {}
        }
    }
}

#[component]
fn LiveQuote(ticker: String) -> Element {
    let quote = use_realtime_channel(Channel::Prices, Some(ticker.clone()), true);

    let status = quote.status().to_string();
    let line = match quote.data() {
        Some(ChannelMessage::Price(p)) => format!(
            "{:.2} ({:+.2}%) at {}",
            p.price,
            p.change_percent,
            p.timestamp.format("%H:%M:%S")
        ),
        _ => "waiting for data".to_string(),
    };
    let error = quote.error();

    rsx! {
        div { class: "quote",
            strong { "{ticker}" }
            span { " {line} " }
            small { "[{status}]" }
            if let Some(error) = error {
                p { class: "error", "{error}" }
                button { onclick: move |_| quote.connect(), "Retry" }
            }
        }
    }
}

#[component]
fn Headlines() -> Element {
    let feed = use_realtime_channels(vec![Channel::News, Channel::Alerts], true);

    let headline = match feed.data(Channel::News) {
        Some(ChannelMessage::News(n)) => format!("{} ({})", n.headline, n.source),
        _ => "no headlines yet".to_string(),
    };
    let alert = match feed.data(Channel::Alerts) {
        Some(ChannelMessage::Alert(a)) => Some(a.message),
        _ => None,
    };

    rsx! {
        div { class: "headlines",
            p { "{headline}" }
            if let Some(alert) = alert {
                p { class: "alert", "{alert}" }
            }
            button { onclick: move |_| feed.clear_data(), "Clear" }
        }
    }
}

//! WASM/Web-specific transport using web_sys::WebSocket.

use std::cell::{Cell, RefCell};
use std::rc::Rc;

use futures_channel::mpsc::{unbounded, UnboundedReceiver, UnboundedSender};
use futures_util::future::{select, Either};
use futures_util::StreamExt;
use marketdash_shared::WsEnvelope;
use wasm_bindgen::prelude::*;
use wasm_bindgen_futures::spawn_local;
use web_sys::js_sys;

use super::{EventSink, Transport, TransportError, TransportEvent};
use crate::config::ReconnectConfig;

/// readyState value of an open socket
const OPEN: u16 = 1;

#[derive(Clone)]
struct LoopParams {
    url: String,
    reconnect: ReconnectConfig,
    sink: EventSink,
}

/// Shared between the transport and its loop; set once the loop must stop.
#[derive(Default)]
struct LoopControl {
    cancelled: Cell<bool>,
    socket: RefCell<Option<web_sys::WebSocket>>,
}

impl LoopControl {
    fn cancel(&self) {
        self.cancelled.set(true);
        if let Some(ws) = self.socket.borrow_mut().take() {
            ws.set_onmessage(None);
            ws.set_onclose(None);
            let _ = ws.close();
        }
    }
}

/// WebSocket transport for the browser
#[derive(Default)]
pub struct WebTransport {
    params: Option<LoopParams>,
    outbound: Option<UnboundedSender<WsEnvelope>>,
    control: Option<Rc<LoopControl>>,
}

impl WebTransport {
    pub fn new() -> Self {
        Self::default()
    }

    fn spawn(&mut self) {
        let Some(params) = self.params.clone() else {
            return;
        };
        let (sender, receiver) = unbounded();
        let control = Rc::new(LoopControl::default());
        self.outbound = Some(sender);
        self.control = Some(control.clone());
        spawn_local(connection_loop(params, receiver, control));
    }

    fn stop(&mut self) {
        self.outbound = None;
        if let Some(control) = self.control.take() {
            control.cancel();
        }
    }
}

impl Transport for WebTransport {
    fn open(&mut self, url: &str, reconnect: &ReconnectConfig, sink: EventSink) {
        self.stop();
        self.params = Some(LoopParams {
            url: url.to_string(),
            reconnect: reconnect.clone(),
            sink,
        });
        self.spawn();
    }

    fn reconnect(&mut self) {
        self.stop();
        self.spawn();
    }

    fn send(&mut self, frame: WsEnvelope) -> Result<(), TransportError> {
        let sender = self.outbound.as_ref().ok_or(TransportError::NotOpen)?;
        sender
            .unbounded_send(frame)
            .map_err(|e| TransportError::Closed(e.to_string()))
    }

    fn close(&mut self) {
        self.stop();
        self.params = None;
    }
}

impl Drop for WebTransport {
    fn drop(&mut self) {
        self.stop();
    }
}

async fn connection_loop(
    params: LoopParams,
    mut outbound: UnboundedReceiver<WsEnvelope>,
    control: Rc<LoopControl>,
) {
    let LoopParams { url, reconnect, sink } = params;
    let mut attempts = 0u32;
    let mut reconnecting = false;

    loop {
        if reconnecting {
            if !reconnect.allows(attempts) {
                crate::log_error!("Giving up on {} after {} reconnect attempts", url, attempts);
                sink.emit(TransportEvent::ReconnectFailed);
                return;
            }
            gloo_timers::future::TimeoutFuture::new(reconnect.delay_ms as u32).await;
            if control.cancelled.get() {
                return;
            }
            attempts += 1;
            crate::log_debug!("Reconnecting to {} (attempt {})", url, attempts);
            sink.emit(TransportEvent::ReconnectAttempt { attempt: attempts });
        }

        match open_socket(&url, &sink).await {
            Ok(ws) => {
                if control.cancelled.get() {
                    let _ = ws.close();
                    return;
                }
                *control.socket.borrow_mut() = Some(ws.clone());
                while let Ok(Some(_)) = outbound.try_next() {}

                crate::log_info!("WebSocket connected to {}", url);
                sink.emit(TransportEvent::Connect);
                if reconnecting {
                    sink.emit(TransportEvent::Reconnect { attempt: attempts });
                }
                attempts = 0;

                let (close_tx, mut close_rx) = unbounded::<String>();
                let onclose_callback = Closure::wrap(Box::new(move |e: web_sys::CloseEvent| {
                    let reason = if e.reason().is_empty() {
                        format!("Code {}", e.code())
                    } else {
                        e.reason()
                    };
                    let _ = close_tx.unbounded_send(reason);
                }) as Box<dyn FnMut(web_sys::CloseEvent)>);
                ws.set_onclose(Some(onclose_callback.as_ref().unchecked_ref()));
                onclose_callback.forget();

                let reason = loop {
                    match select(outbound.next(), close_rx.next()).await {
                        Either::Left((Some(envelope), _)) => {
                            if ws.ready_state() != OPEN {
                                crate::log_info!("WebSocket no longer open, dropping frame");
                                continue;
                            }
                            match envelope.to_json() {
                                Ok(json) => {
                                    if let Err(e) = ws.send_with_str(&json) {
                                        crate::log_error!("Send failed: {:?}", e);
                                    }
                                }
                                Err(e) => crate::log_error!("Serialize failed: {}", e),
                            }
                        }
                        // The owning transport went away.
                        Either::Left((None, _)) => return,
                        Either::Right((reason, _)) => {
                            break reason.unwrap_or_else(|| "connection closed".to_string())
                        }
                    }
                };

                control.socket.borrow_mut().take();
                if control.cancelled.get() {
                    return;
                }
                crate::log_info!("WebSocket to {} closed: {}", url, reason);
                sink.emit(TransportEvent::Disconnect { reason });
            }
            Err(e) => {
                if control.cancelled.get() {
                    return;
                }
                crate::log_error!("WebSocket error for {}: {}", url, e);
                sink.emit(TransportEvent::ConnectError { error: e });
            }
        }

        reconnecting = true;
    }
}

/// Open a socket and wait for it to become ready.
/// Inbound text frames are routed to `sink` from here on.
async fn open_socket(url: &str, sink: &EventSink) -> Result<web_sys::WebSocket, String> {
    use web_sys::{CloseEvent, MessageEvent, WebSocket};

    let ws = WebSocket::new(url).map_err(|e| format!("Failed to create WebSocket: {:?}", e))?;

    let is_open = Rc::new(Cell::new(false));
    let error_reason = Rc::new(RefCell::new(None::<String>));

    let is_open_clone = is_open.clone();
    let onopen_callback = Closure::wrap(Box::new(move |_: web_sys::Event| {
        is_open_clone.set(true);
    }) as Box<dyn FnMut(web_sys::Event)>);
    ws.set_onopen(Some(onopen_callback.as_ref().unchecked_ref()));
    onopen_callback.forget();

    let error_reason_close = error_reason.clone();
    let onclose_callback = Closure::wrap(Box::new(move |e: CloseEvent| {
        let reason = if e.reason().is_empty() {
            format!("Code {}", e.code())
        } else {
            e.reason()
        };
        *error_reason_close.borrow_mut() = Some(reason);
    }) as Box<dyn FnMut(CloseEvent)>);
    ws.set_onclose(Some(onclose_callback.as_ref().unchecked_ref()));
    onclose_callback.forget();

    let error_reason_err = error_reason.clone();
    let onerror_callback = Closure::wrap(Box::new(move |_: web_sys::ErrorEvent| {
        *error_reason_err.borrow_mut() = Some("WebSocket error".to_string());
    }) as Box<dyn FnMut(web_sys::ErrorEvent)>);
    ws.set_onerror(Some(onerror_callback.as_ref().unchecked_ref()));
    onerror_callback.forget();

    let sink = sink.clone();
    let onmessage_callback = Closure::wrap(Box::new(move |e: MessageEvent| {
        if let Ok(text) = e.data().dyn_into::<js_sys::JsString>() {
            let text: String = text.into();
            sink.deliver_frame(&text);
        }
    }) as Box<dyn FnMut(MessageEvent)>);
    ws.set_onmessage(Some(onmessage_callback.as_ref().unchecked_ref()));
    onmessage_callback.forget();

    // 5 second handshake budget, polled every 10ms
    for _ in 0..500 {
        if is_open.get() {
            return Ok(ws);
        }
        if let Some(reason) = error_reason.borrow().clone() {
            return Err(reason);
        }
        gloo_timers::future::TimeoutFuture::new(10).await;
    }

    let _ = ws.close();
    Err("Connection timeout".to_string())
}

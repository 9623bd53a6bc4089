//! Native/Desktop WebSocket transport using tokio-tungstenite.
//!
//! The connection loop runs as a `tokio::task::spawn_local` task, so the
//! transport must be opened from inside a `LocalSet` (or a local runtime).

use futures_channel::mpsc::{unbounded, UnboundedReceiver, UnboundedSender};
use futures_util::{SinkExt, StreamExt};
use marketdash_shared::WsEnvelope;
use tokio::net::TcpStream;
use tokio::task::JoinHandle;
use tokio_tungstenite::{connect_async, tungstenite::Message, MaybeTlsStream, WebSocketStream};

use super::{EventSink, Transport, TransportError, TransportEvent};
use crate::config::ReconnectConfig;

#[derive(Clone)]
struct LoopParams {
    url: String,
    reconnect: ReconnectConfig,
    sink: EventSink,
}

/// WebSocket transport for native targets
#[derive(Default)]
pub struct NativeTransport {
    params: Option<LoopParams>,
    /// Frames queued for the writer half of the current socket
    outbound: Option<UnboundedSender<WsEnvelope>>,
    task: Option<JoinHandle<()>>,
}

impl NativeTransport {
    pub fn new() -> Self {
        Self::default()
    }

    fn spawn(&mut self) {
        let Some(params) = self.params.clone() else {
            return;
        };
        let (sender, receiver) = unbounded();
        self.outbound = Some(sender);
        self.task = Some(tokio::task::spawn_local(connection_loop(params, receiver)));
    }

    fn stop(&mut self) {
        self.outbound = None;
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }
}

impl Transport for NativeTransport {
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

impl Drop for NativeTransport {
    fn drop(&mut self) {
        self.stop();
    }
}

/// Connect, run the session, and reconnect with a fixed delay until the
/// attempt budget is spent.
async fn connection_loop(params: LoopParams, mut outbound: UnboundedReceiver<WsEnvelope>) {
    let LoopParams { url, reconnect, sink } = params;
    let mut attempts = 0u32;
    let mut reconnecting = false;

    loop {
        if reconnecting {
            if !reconnect.allows(attempts) {
                crate::log_error!(
                    "Giving up on {} after {} reconnect attempts",
                    url,
                    attempts
                );
                sink.emit(TransportEvent::ReconnectFailed);
                return;
            }
            tokio::time::sleep(reconnect.delay()).await;
            attempts += 1;
            crate::log_debug!("Reconnecting to {} (attempt {})", url, attempts);
            sink.emit(TransportEvent::ReconnectAttempt { attempt: attempts });
        }

        match connect_async(url.as_str()).await {
            Ok((stream, _response)) => {
                // Anything queued while offline predates this session.
                while let Ok(Some(_)) = outbound.try_next() {}

                crate::log_info!("WebSocket connected to {}", url);
                sink.emit(TransportEvent::Connect);
                if reconnecting {
                    sink.emit(TransportEvent::Reconnect { attempt: attempts });
                }
                attempts = 0;

                match run_session(stream, &mut outbound, &sink).await {
                    Some(reason) => {
                        crate::log_info!("WebSocket to {} closed: {}", url, reason);
                        sink.emit(TransportEvent::Disconnect { reason });
                    }
                    // The owning transport went away.
                    None => return,
                }
            }
            Err(e) => {
                crate::log_error!("WebSocket error for {}: {}", url, e);
                sink.emit(TransportEvent::ConnectError {
                    error: e.to_string(),
                });
            }
        }

        reconnecting = true;
    }
}

/// Pump frames both ways until the socket closes.
///
/// Returns the close reason, or `None` when the outbound queue was dropped.
async fn run_session(
    stream: WebSocketStream<MaybeTlsStream<TcpStream>>,
    outbound: &mut UnboundedReceiver<WsEnvelope>,
    sink: &EventSink,
) -> Option<String> {
    let (mut write, mut read) = stream.split();

    loop {
        tokio::select! {
            frame = outbound.next() => match frame {
                Some(envelope) => match envelope.to_json() {
                    Ok(json) => {
                        crate::log_debug!("Sending {}", json);
                        if let Err(e) = write.send(Message::Text(json.into())).await {
                            return Some(format!("send failed: {}", e));
                        }
                    }
                    Err(e) => crate::log_error!("Serialize failed: {}", e),
                },
                None => {
                    let _ = write.close().await;
                    return None;
                }
            },
            message = read.next() => match message {
                Some(Ok(Message::Text(text))) => sink.deliver_frame(text.as_str()),
                Some(Ok(Message::Close(frame))) => {
                    let reason = frame
                        .map(|f| f.reason.as_str().to_string())
                        .filter(|reason| !reason.is_empty())
                        .unwrap_or_else(|| "server closed the connection".to_string());
                    return Some(reason);
                }
                Some(Ok(_)) => {
                    // Pings are answered by tungstenite; binary frames are not part of the protocol.
                }
                Some(Err(e)) => return Some(e.to_string()),
                None => return Some("connection closed".to_string()),
            },
        }
    }
}

//! In-process transport that records outbound frames and lets the caller
//! play the server side by injecting events.

use std::cell::RefCell;
use std::rc::Rc;

use marketdash_shared::{Channel, ClientCommand, WsEnvelope};

use super::{EventSink, Transport, TransportError, TransportEvent};
use crate::config::ReconnectConfig;

#[derive(Debug, Default)]
struct MemoryState {
    sink: Option<EventSink>,
    url: Option<String>,
    sent: Vec<WsEnvelope>,
    created: usize,
    opened: usize,
    reconnects: usize,
    closed: usize,
    fail_sends: bool,
}

pub struct MemoryTransport {
    state: Rc<RefCell<MemoryState>>,
}

impl Transport for MemoryTransport {
    fn open(&mut self, url: &str, _reconnect: &ReconnectConfig, sink: EventSink) {
        let mut state = self.state.borrow_mut();
        state.opened += 1;
        state.url = Some(url.to_string());
        state.sink = Some(sink);
    }

    fn reconnect(&mut self) {
        self.state.borrow_mut().reconnects += 1;
    }

    fn send(&mut self, frame: WsEnvelope) -> Result<(), TransportError> {
        let mut state = self.state.borrow_mut();
        if state.sink.is_none() {
            return Err(TransportError::NotOpen);
        }
        if state.fail_sends {
            return Err(TransportError::Closed("send rejected".to_string()));
        }
        state.sent.push(frame);
        Ok(())
    }

    fn close(&mut self) {
        let mut state = self.state.borrow_mut();
        state.closed += 1;
        state.sink = None;
    }
}

/// Creates [`MemoryTransport`]s that all report to one handle.
#[derive(Clone, Default)]
pub struct MemoryTransportFactory {
    handle: MemoryTransportHandle,
}

impl MemoryTransportFactory {
    pub fn new() -> (Self, MemoryTransportHandle) {
        let factory = Self::default();
        let handle = factory.handle.clone();
        (factory, handle)
    }
}

impl super::TransportFactory for MemoryTransportFactory {
    fn create(&self) -> Box<dyn Transport> {
        self.handle.state.borrow_mut().created += 1;
        Box::new(MemoryTransport {
            state: self.handle.state.clone(),
        })
    }
}

/// Server-side view of the in-memory transport.
#[derive(Clone, Default)]
pub struct MemoryTransportHandle {
    state: Rc<RefCell<MemoryState>>,
}

impl MemoryTransportHandle {
    /// Deliver an event to the client, as the transport's task would.
    ///
    /// Returns false if no transport is currently open.
    pub fn emit(&self, event: TransportEvent) -> bool {
        // Release the borrow first: the client may send from inside the sink.
        let sink = self.state.borrow().sink.clone();
        match sink {
            Some(sink) => {
                sink.emit(event);
                true
            }
            None => false,
        }
    }

    pub fn connect(&self) -> bool {
        self.emit(TransportEvent::Connect)
    }

    pub fn disconnect(&self, reason: &str) -> bool {
        self.emit(TransportEvent::Disconnect {
            reason: reason.to_string(),
        })
    }

    /// Simulate a dropped connection that the reconnect loop restores.
    pub fn bounce(&self) -> bool {
        self.disconnect("transport close")
            && self.emit(TransportEvent::ReconnectAttempt { attempt: 1 })
            && self.connect()
            && self.emit(TransportEvent::Reconnect { attempt: 1 })
    }

    pub fn data(&self, channel: Channel, payload: serde_json::Value) -> bool {
        self.emit(TransportEvent::Data { channel, payload })
    }

    /// Feed a raw text frame through the same decoding a socket uses.
    pub fn frame(&self, text: &str) -> bool {
        let sink = self.state.borrow().sink.clone();
        match sink {
            Some(sink) => {
                sink.deliver_frame(text);
                true
            }
            None => false,
        }
    }

    /// The sink of the currently open transport, if any.
    pub fn sink(&self) -> Option<EventSink> {
        self.state.borrow().sink.clone()
    }

    pub fn sent(&self) -> Vec<WsEnvelope> {
        self.state.borrow().sent.clone()
    }

    /// Outbound subscription commands, in send order.
    pub fn sent_commands(&self) -> Vec<ClientCommand> {
        self.state
            .borrow()
            .sent
            .iter()
            .filter_map(ClientCommand::from_envelope)
            .collect()
    }

    pub fn clear_sent(&self) {
        self.state.borrow_mut().sent.clear();
    }

    pub fn fail_sends(&self, fail: bool) {
        self.state.borrow_mut().fail_sends = fail;
    }

    pub fn url(&self) -> Option<String> {
        self.state.borrow().url.clone()
    }

    pub fn is_open(&self) -> bool {
        self.state.borrow().sink.is_some()
    }

    pub fn created(&self) -> usize {
        self.state.borrow().created
    }

    pub fn opened(&self) -> usize {
        self.state.borrow().opened
    }

    pub fn reconnects(&self) -> usize {
        self.state.borrow().reconnects
    }

    pub fn closed(&self) -> usize {
        self.state.borrow().closed
    }
}

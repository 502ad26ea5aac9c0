//! In-process fake transport for MCP unit tests
//!
//! [`FakeTransport::new`] returns a `(FakeTransport, FakeTransportHandle)`
//! pair. Wire the transport into the client under test; drive the server
//! side from the handle:
//!
//! - read what the client sent: `handle.next_outbound().await`
//! - push server traffic: `handle.respond(..)`, `handle.inject(..)`,
//!   `handle.report_error(..)`, `handle.close()`
//!
//! ```text
//! client send() -----> outbound_tx -----> outbound_rx (handle reads)
//! handle inject() ---> events tx   -----> events()    (client read loop)
//! ```

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{mpsc, Mutex};

use crate::error::{McpError, Result};
use crate::mcp::message::{JsonRpcError, JsonRpcMessage, JsonRpcRequest, RequestId};
use crate::mcp::transport::{EventChannel, EventStream, Transport, TransportEvent};

/// In-process fake transport for use in tests.
#[derive(Debug)]
pub struct FakeTransport {
    outbound_tx: mpsc::UnboundedSender<JsonRpcMessage>,
    events: Arc<EventChannel>,
    started: AtomicBool,
    closed: Arc<AtomicBool>,
}

/// The test-side handle for a [`FakeTransport`].
#[derive(Debug)]
pub struct FakeTransportHandle {
    /// Receives messages the client sent via [`Transport::send`].
    pub outbound_rx: mpsc::UnboundedReceiver<JsonRpcMessage>,
    inbound_tx: mpsc::UnboundedSender<TransportEvent>,
    closed: Arc<AtomicBool>,
    /// Buffer for messages skipped by `next_request_for`.
    stash: Mutex<Vec<JsonRpcMessage>>,
}

impl FakeTransport {
    /// Create a new `(FakeTransport, FakeTransportHandle)` pair.
    pub fn new() -> (Self, FakeTransportHandle) {
        let (outbound_tx, outbound_rx) = mpsc::unbounded_channel();
        let events = Arc::new(EventChannel::new());
        let closed = Arc::new(AtomicBool::new(false));
        let handle = FakeTransportHandle {
            outbound_rx,
            inbound_tx: events.sender(),
            closed: Arc::clone(&closed),
            stash: Mutex::new(Vec::new()),
        };
        let transport = Self {
            outbound_tx,
            events,
            started: AtomicBool::new(false),
            closed,
        };
        (transport, handle)
    }
}

#[async_trait::async_trait]
impl Transport for FakeTransport {
    async fn start(&self) -> Result<()> {
        if self.started.swap(true, Ordering::SeqCst) {
            return Err(McpError::transport("FakeTransport already started"));
        }
        Ok(())
    }

    async fn send(&self, message: JsonRpcMessage) -> Result<()> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(McpError::transport("FakeTransport is closed"));
        }
        self.outbound_tx
            .send(message)
            .map_err(|_| McpError::transport("FakeTransport outbound channel closed"))
    }

    async fn close(&self) -> Result<()> {
        self.closed.store(true, Ordering::SeqCst);
        self.events.close();
        Ok(())
    }

    fn events(&self) -> EventStream {
        self.events.stream()
    }
}

impl FakeTransportHandle {
    /// Next message the client sent, failing the test after two seconds.
    pub async fn next_outbound(&mut self) -> JsonRpcMessage {
        {
            let mut stash = self.stash.lock().await;
            if !stash.is_empty() {
                return stash.remove(0);
            }
        }
        tokio::time::timeout(Duration::from_secs(2), self.outbound_rx.recv())
            .await
            .expect("timed out waiting for outbound message")
            .expect("outbound channel closed")
    }

    /// Next outbound request for `method`; other messages are kept for
    /// later `next_outbound` calls.
    pub async fn next_request_for(&mut self, method: &str) -> JsonRpcRequest {
        loop {
            let message = tokio::time::timeout(Duration::from_secs(2), self.outbound_rx.recv())
                .await
                .unwrap_or_else(|_| panic!("timed out waiting for `{method}` request"))
                .expect("outbound channel closed");
            match message {
                JsonRpcMessage::Request(request) if request.method == method => return request,
                other => self.stash.lock().await.push(other),
            }
        }
    }

    /// Assert nothing was sent within `wait`.
    pub async fn assert_no_outbound(&mut self, wait: Duration) {
        let next = tokio::time::timeout(wait, self.outbound_rx.recv()).await;
        assert!(next.is_err(), "unexpected outbound message: {next:?}");
    }

    /// Deliver any message to the client.
    pub fn inject(&self, message: JsonRpcMessage) {
        let _ = self.inbound_tx.send(TransportEvent::Message(message));
    }

    /// Deliver a success response for `id`.
    pub fn respond(&self, id: RequestId, result: serde_json::Value) {
        self.inject(JsonRpcMessage::response(id, result));
    }

    /// Deliver an error response for `id`.
    pub fn respond_error(&self, id: RequestId, error: JsonRpcError) {
        self.inject(JsonRpcMessage::error(id, error));
    }

    /// Report a transport error, optionally tied to a request.
    pub fn report_error(&self, error: McpError, request_id: Option<RequestId>) {
        let _ = self
            .inbound_tx
            .send(TransportEvent::Error { error, request_id });
    }

    /// Simulate the server side going away.
    pub fn close(&self) {
        self.closed.store(true, Ordering::SeqCst);
        let _ = self.inbound_tx.send(TransportEvent::Closed);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::StreamExt;

    #[tokio::test]
    async fn test_send_delivers_to_handle() {
        let (transport, mut handle) = FakeTransport::new();
        transport.start().await.unwrap();
        transport
            .send(JsonRpcMessage::notification("notifications/initialized", None))
            .await
            .unwrap();
        let sent = handle.next_outbound().await;
        assert_eq!(sent.method(), Some("notifications/initialized"));
    }

    #[tokio::test]
    async fn test_injected_messages_arrive_in_order() {
        let (transport, handle) = FakeTransport::new();
        for i in 1u64..=3 {
            handle.respond(RequestId::from(i), serde_json::json!({ "n": i }));
        }
        let mut events = transport.events();
        for i in 1i64..=3 {
            match events.next().await {
                Some(TransportEvent::Message(m)) => assert_eq!(m.id(), Some(&RequestId::Number(i))),
                other => panic!("unexpected event: {other:?}"),
            }
        }
    }

    #[tokio::test]
    async fn test_next_request_for_stashes_other_messages() {
        let (transport, mut handle) = FakeTransport::new();
        transport
            .send(JsonRpcMessage::notification("notifications/initialized", None))
            .await
            .unwrap();
        transport
            .send(JsonRpcMessage::request(1u64, "tools/list", None))
            .await
            .unwrap();
        let request = handle.next_request_for("tools/list").await;
        assert_eq!(request.id, RequestId::Number(1));
        let stashed = handle.next_outbound().await;
        assert_eq!(stashed.method(), Some("notifications/initialized"));
    }

    #[tokio::test]
    async fn test_send_after_close_fails() {
        let (transport, _handle) = FakeTransport::new();
        transport.close().await.unwrap();
        let result = transport
            .send(JsonRpcMessage::notification("notifications/initialized", None))
            .await;
        assert!(result.is_err());
    }

    #[test]
    fn test_fake_transport_is_object_safe() {
        let (transport, _handle) = FakeTransport::new();
        let _boxed: Box<dyn Transport> = Box::new(transport);
    }
}

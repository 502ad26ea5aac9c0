//! MCP transport abstraction and implementations
//!
//! This module defines the [`Transport`] trait that every MCP transport
//! implementation satisfies. Concrete implementations live in submodules:
//!
//! - [`http::HttpTransport`] -- Streamable HTTP: POST per outbound message
//!   plus a resumable GET event stream for server push.
//! - [`sse::SseTransport`] -- legacy HTTP+SSE: one GET event stream that
//!   announces a POST endpoint.
//! - [`stdio::StdioTransport`] -- spawns a child process and exchanges
//!   newline-delimited JSON over its stdin/stdout pipes.
//! - [`fake::FakeTransport`] -- in-process fake used in tests (cfg(test)
//!   only).
//!
//! # Design
//!
//! `send` hands one [`JsonRpcMessage`] to the transport and never returns
//! the correlated reply. Everything inbound (messages, reported errors, and
//! the final close) arrives on the single event stream returned by
//! [`Transport::events`], in receipt order.
//!
//! # Canonical Import Path
//!
//! ```no_run
//! use mcpwire::mcp::transport::Transport;
//! ```

use std::collections::HashMap;
use std::path::PathBuf;
use std::pin::Pin;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use futures::Stream;
use tokio::sync::{mpsc, Mutex};
use url::Url;

use crate::error::{McpError, Result};
use crate::mcp::auth::AuthProvider;
use crate::mcp::message::{JsonRpcMessage, RequestId};

pub mod event_stream;
pub mod http;
pub mod sse;
pub mod stdio;

#[cfg(test)]
pub mod fake;

pub use http::{HttpTransport, HttpTransportOptions, ReconnectOptions};
pub use sse::SseTransport;
pub use stdio::StdioTransport;

/// One inbound event delivered by a transport.
#[derive(Debug)]
pub enum TransportEvent {
    /// A validated JSON-RPC message from the server.
    Message(JsonRpcMessage),
    /// A transport-level failure.
    ///
    /// `request_id` is set when the failure belongs to a specific in-flight
    /// request (for example an HTTP 500 on the POST that carried it); the
    /// client settles that request with `error`.
    Error {
        /// The failure.
        error: McpError,
        /// Request the failure pertains to, if any.
        request_id: Option<RequestId>,
    },
    /// The transport has shut down. No events follow.
    Closed,
}

/// Pinned stream of inbound transport events.
pub type EventStream = Pin<Box<dyn Stream<Item = TransportEvent> + Send + 'static>>;

/// Abstraction over MCP transport implementations.
///
/// A custom transport is accepted anywhere a built-in one is, as long as it
/// implements this trait and honours the event ordering described in the
/// module docs.
#[async_trait::async_trait]
pub trait Transport: Send + Sync + std::fmt::Debug {
    /// Establish initial connectivity.
    ///
    /// # Errors
    ///
    /// Fails if the transport was already started or the connection cannot
    /// be established.
    async fn start(&self) -> Result<()>;

    /// Deliver one JSON-RPC message to the server.
    ///
    /// Replies arrive through [`Transport::events`], even when the
    /// underlying exchange carried them back directly.
    ///
    /// # Errors
    ///
    /// Fails with [`McpError::Transport`] if the transport has not been
    /// started or has been closed.
    async fn send(&self, message: JsonRpcMessage) -> Result<()>;

    /// Best-effort graceful teardown. Calling it more than once is a no-op.
    async fn close(&self) -> Result<()>;

    /// Record the protocol version negotiated at handshake.
    ///
    /// Transports that carry the version out-of-band (HTTP headers) use it
    /// on every subsequent exchange.
    async fn set_protocol_version(&self, _version: &str) {}

    /// Stream of inbound events.
    ///
    /// The stream has a single logical consumer; the protocol client takes
    /// it once when it starts its read loop.
    fn events(&self) -> EventStream;
}

// ---------------------------------------------------------------------------
// Event channel shared by the built-in transports
// ---------------------------------------------------------------------------

/// Unbounded event queue with a once-only close marker.
#[derive(Debug)]
pub(crate) struct EventChannel {
    tx: mpsc::UnboundedSender<TransportEvent>,
    rx: Arc<Mutex<mpsc::UnboundedReceiver<TransportEvent>>>,
    closed: AtomicBool,
}

impl EventChannel {
    pub(crate) fn new() -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        Self {
            tx,
            rx: Arc::new(Mutex::new(rx)),
            closed: AtomicBool::new(false),
        }
    }

    pub(crate) fn sender(&self) -> mpsc::UnboundedSender<TransportEvent> {
        self.tx.clone()
    }

    pub(crate) fn emit(&self, event: TransportEvent) {
        let _ = self.tx.send(event);
    }

    pub(crate) fn report(&self, error: McpError, request_id: Option<RequestId>) {
        self.emit(TransportEvent::Error { error, request_id });
    }

    /// Emit [`TransportEvent::Closed`] unless it was already emitted.
    pub(crate) fn close(&self) {
        if !self.closed.swap(true, Ordering::SeqCst) {
            self.emit(TransportEvent::Closed);
        }
    }

    /// Parse a raw payload (single message or batch) and emit each message.
    ///
    /// A payload that fails validation is reported as an error event tied to
    /// `request_id` and does not stop the caller.
    pub(crate) fn deliver(&self, raw: &str, request_id: Option<&RequestId>) {
        match JsonRpcMessage::parse_batch(raw) {
            Ok(messages) => {
                for message in messages {
                    self.emit(TransportEvent::Message(message));
                }
            }
            Err(e) => {
                tracing::warn!("discarding malformed inbound payload: {e}");
                self.report(e, request_id.cloned());
            }
        }
    }

    pub(crate) fn stream(&self) -> EventStream {
        let rx = Arc::clone(&self.rx);
        Box::pin(futures::stream::unfold(rx, |rx| async move {
            let mut guard = rx.lock().await;
            let item = guard.recv().await?;
            drop(guard);
            Some((item, rx))
        }))
    }
}

// ---------------------------------------------------------------------------
// Factory
// ---------------------------------------------------------------------------

/// Declarative description of a built-in transport.
#[derive(Debug, Clone)]
pub enum TransportConfig {
    /// Streamable HTTP.
    Http {
        /// MCP endpoint URL.
        url: Url,
        /// Extra headers sent on every request.
        headers: HashMap<String, String>,
        /// Supplies bearer tokens and runs the authorization flow on 401.
        auth_provider: Option<Arc<dyn AuthProvider>>,
        /// Inbound stream reconnection policy.
        reconnect: ReconnectOptions,
    },
    /// Legacy HTTP+SSE.
    Sse {
        /// Event stream URL.
        url: Url,
        /// Extra headers sent on every request.
        headers: HashMap<String, String>,
    },
    /// Child process over stdio.
    Stdio {
        /// Executable, resolved through `PATH`.
        command: String,
        /// Arguments.
        args: Vec<String>,
        /// Variables merged over the default inherited set.
        env: HashMap<String, String>,
        /// Working directory.
        cwd: Option<PathBuf>,
    },
}

/// Build the transport described by `config`.
///
/// No I/O happens until [`Transport::start`] is called.
///
/// # Errors
///
/// Returns [`McpError::Transport`] if the HTTP client cannot be constructed.
///
/// # Examples
///
/// ```
/// use std::collections::HashMap;
/// use mcpwire::mcp::transport::{create_transport, TransportConfig};
///
/// let transport = create_transport(TransportConfig::Stdio {
///     command: "my-mcp-server".into(),
///     args: vec![],
///     env: HashMap::new(),
///     cwd: None,
/// })
/// .unwrap();
/// # let _ = transport;
/// ```
pub fn create_transport(config: TransportConfig) -> Result<Arc<dyn Transport>> {
    match config {
        TransportConfig::Http {
            url,
            headers,
            auth_provider,
            reconnect,
        } => {
            let options = HttpTransportOptions {
                headers,
                auth_provider,
                reconnect,
                session_id: None,
            };
            Ok(Arc::new(HttpTransport::new(url, options)?))
        }
        TransportConfig::Sse { url, headers } => Ok(Arc::new(SseTransport::new(url, headers)?)),
        TransportConfig::Stdio {
            command,
            args,
            env,
            cwd,
        } => Ok(Arc::new(StdioTransport::new(command, args, env, cwd))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use tokio_stream::StreamExt as _;

    #[tokio::test]
    async fn test_event_channel_close_emitted_once() {
        let channel = EventChannel::new();
        channel.close();
        channel.close();
        let mut stream = channel.stream();
        assert!(matches!(stream.next().await, Some(TransportEvent::Closed)));
        let next = tokio::time::timeout(Duration::from_millis(50), stream.next()).await;
        assert!(next.is_err(), "expected no second Closed event");
    }

    #[tokio::test]
    async fn test_event_channel_deliver_batch_in_order() {
        let channel = EventChannel::new();
        channel.deliver(
            r#"[{"jsonrpc":"2.0","id":1,"result":{}},{"jsonrpc":"2.0","method":"notifications/x"}]"#,
            None,
        );
        let mut stream = channel.stream();
        match stream.next().await {
            Some(TransportEvent::Message(m)) => assert_eq!(m.id(), Some(&RequestId::Number(1))),
            other => panic!("unexpected event: {other:?}"),
        }
        match stream.next().await {
            Some(TransportEvent::Message(m)) => assert_eq!(m.method(), Some("notifications/x")),
            other => panic!("unexpected event: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_event_channel_malformed_payload_reported_with_request_id() {
        let channel = EventChannel::new();
        channel.deliver("{not json", Some(&RequestId::Number(9)));
        let mut stream = channel.stream();
        match stream.next().await {
            Some(TransportEvent::Error { request_id, .. }) => {
                assert_eq!(request_id, Some(RequestId::Number(9)))
            }
            other => panic!("unexpected event: {other:?}"),
        }
    }

    #[test]
    fn test_create_transport_builds_each_kind() {
        let url = Url::parse("http://localhost:9/mcp").unwrap();
        let http = create_transport(TransportConfig::Http {
            url: url.clone(),
            headers: HashMap::new(),
            auth_provider: None,
            reconnect: ReconnectOptions::default(),
        });
        assert!(http.is_ok());
        let sse = create_transport(TransportConfig::Sse {
            url,
            headers: HashMap::new(),
        });
        assert!(sse.is_ok());
        let stdio = create_transport(TransportConfig::Stdio {
            command: "cat".into(),
            args: vec![],
            env: HashMap::new(),
            cwd: None,
        });
        assert!(stdio.is_ok());
    }
}

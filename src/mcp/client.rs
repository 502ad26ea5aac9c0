//! Transport-agnostic async JSON-RPC 2.0 client
//!
//! This module provides [`JsonRpcClient`], the correlation engine under the
//! protocol client. It owns the outbound id sequence and the pending-request
//! table, and [`start_read_loop`] drains a transport's event stream to settle
//! those requests.
//!
//! # Design
//!
//! - Ids come from a per-client counter starting at 1. A pending entry is
//!   registered *before* the request is handed to the transport, so a reply
//!   can never arrive ahead of its entry.
//! - Every entry is removed exactly once: by its reply, by a transport error
//!   tied to its id, by caller cancellation or timeout, or by close.
//! - Server-initiated requests are answered on their own task so a slow
//!   handler never stalls the read loop. Every one of them gets exactly one
//!   reply, an error reply when no handler is registered.
//! - A reply whose id has no pending entry is a protocol violation; it is
//!   reported to the error handler and otherwise dropped.

use std::collections::HashMap;
use std::pin::Pin;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use futures::StreamExt;
use tokio::sync::{oneshot, Mutex};
use tokio_util::sync::CancellationToken;

use crate::error::{McpError, Result, METHOD_NOT_FOUND};
use crate::mcp::message::{JsonRpcError, JsonRpcMessage, JsonRpcNotification, JsonRpcRequest, RequestId};
use crate::mcp::transport::{EventStream, Transport, TransportEvent};

/// Convenience alias for a boxed, `Send`-safe async future.
pub type BoxFuture<'a, T> = Pin<Box<dyn std::future::Future<Output = T> + Send + 'a>>;

/// Called with the raw `params` of a matching server notification.
type NotificationHandler = Arc<dyn Fn(Option<serde_json::Value>) + Send + Sync + 'static>;

/// Answers a server-initiated request; the `Err` arm becomes a JSON-RPC
/// error reply.
type ServerRequestHandler = Arc<
    dyn Fn(
            RequestId,
            Option<serde_json::Value>,
        ) -> BoxFuture<'static, std::result::Result<serde_json::Value, JsonRpcError>>
        + Send
        + Sync
        + 'static,
>;

/// Receives every transport error and protocol violation.
type ErrorHandler = Arc<dyn Fn(&McpError) + Send + Sync + 'static>;

/// The pending-response map type: maps request ID to the oneshot sender.
type PendingMap = HashMap<u64, oneshot::Sender<Result<serde_json::Value>>>;

/// Per-call options.
///
/// # Examples
///
/// ```
/// use std::time::Duration;
/// use tokio_util::sync::CancellationToken;
/// use mcpwire::mcp::client::RequestOptions;
///
/// let token = CancellationToken::new();
/// let options = RequestOptions::default()
///     .with_cancel(token.clone())
///     .with_timeout(Duration::from_secs(10));
/// assert!(options.timeout.is_some());
/// ```
#[derive(Debug, Clone, Default)]
pub struct RequestOptions {
    /// Cancelling this token aborts the in-flight exchange.
    pub cancel: Option<CancellationToken>,
    /// Fail with [`McpError::Timeout`] if no reply arrives in time.
    pub timeout: Option<Duration>,
}

impl RequestOptions {
    pub fn with_cancel(mut self, token: CancellationToken) -> Self {
        self.cancel = Some(token);
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    fn is_cancelled(&self) -> bool {
        self.cancel.as_ref().is_some_and(|t| t.is_cancelled())
    }
}

/// Transport-agnostic async JSON-RPC 2.0 client.
///
/// # Examples
///
/// ```no_run
/// use std::sync::Arc;
/// use tokio_util::sync::CancellationToken;
/// use mcpwire::mcp::client::{start_read_loop, JsonRpcClient, RequestOptions};
/// use mcpwire::mcp::transport::{HttpTransport, HttpTransportOptions, Transport};
///
/// # #[tokio::main]
/// # async fn main() -> mcpwire::error::Result<()> {
/// let transport: Arc<dyn Transport> = Arc::new(HttpTransport::new(
///     url::Url::parse("http://localhost:3000/mcp")?,
///     HttpTransportOptions::default(),
/// )?);
/// transport.start().await?;
/// let client = Arc::new(JsonRpcClient::new(Arc::clone(&transport)));
/// let _loop = start_read_loop(transport.events(), CancellationToken::new(), Arc::clone(&client));
/// let tools = client
///     .request("tools/list", None, &RequestOptions::default())
///     .await?;
/// # let _ = tools;
/// # Ok(())
/// # }
/// ```
pub struct JsonRpcClient {
    transport: Arc<dyn Transport>,
    /// Monotonically increasing request ID counter.
    next_id: AtomicU64,
    /// In-flight requests waiting for a response.
    pending: Mutex<PendingMap>,
    notification_handlers: Mutex<HashMap<String, NotificationHandler>>,
    server_request_handlers: Mutex<HashMap<String, ServerRequestHandler>>,
    error_handler: Mutex<Option<ErrorHandler>>,
    closed: AtomicBool,
}

impl std::fmt::Debug for JsonRpcClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("JsonRpcClient")
            .field("transport", &self.transport)
            .field("next_id", &self.next_id.load(Ordering::Relaxed))
            .field("closed", &self.closed.load(Ordering::Relaxed))
            .finish_non_exhaustive()
    }
}

impl JsonRpcClient {
    /// Create a client over an already-constructed transport.
    pub fn new(transport: Arc<dyn Transport>) -> Self {
        Self {
            transport,
            next_id: AtomicU64::new(1),
            pending: Mutex::new(HashMap::new()),
            notification_handlers: Mutex::new(HashMap::new()),
            server_request_handlers: Mutex::new(HashMap::new()),
            error_handler: Mutex::new(None),
            closed: AtomicBool::new(false),
        }
    }

    /// The transport this client drives.
    pub fn transport(&self) -> &Arc<dyn Transport> {
        &self.transport
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    /// Number of requests awaiting a reply.
    pub async fn pending_count(&self) -> usize {
        self.pending.lock().await.len()
    }

    /// Send a JSON-RPC request and await its `result`.
    ///
    /// # Errors
    ///
    /// - [`McpError::Closed`] if the client is closed, or closes while the
    ///   request is in flight.
    /// - [`McpError::Cancelled`] if `options.cancel` fires, including when it
    ///   was already cancelled (nothing is sent in that case).
    /// - [`McpError::Timeout`] if `options.timeout` elapses.
    /// - [`McpError::Rpc`] carrying the server's code, message, and data.
    /// - Any error the transport reports for this request.
    pub async fn request(
        &self,
        method: &str,
        params: Option<serde_json::Value>,
        options: &RequestOptions,
    ) -> Result<serde_json::Value> {
        if self.is_closed() {
            return Err(McpError::Closed);
        }
        if options.is_cancelled() {
            return Err(McpError::Cancelled {
                method: method.to_string(),
            });
        }

        let id = self.next_id.fetch_add(1, Ordering::SeqCst);

        // Register the pending slot before sending so the response can never
        // arrive before we are ready to receive it.
        let (tx, mut rx) = oneshot::channel();
        {
            let mut pending = self.pending.lock().await;
            // `shutdown` marks closed before draining under this lock.
            if self.is_closed() {
                return Err(McpError::Closed);
            }
            pending.insert(id, tx);
        }

        let send = self
            .transport
            .send(JsonRpcMessage::request(id, method, params));
        let cancelled = async {
            match &options.cancel {
                Some(token) => token.cancelled().await,
                None => std::future::pending().await,
            }
        };
        let deadline = async {
            match options.timeout {
                Some(timeout) => tokio::time::sleep(timeout).await,
                None => std::future::pending().await,
            }
        };
        tokio::pin!(send, cancelled, deadline);

        let mut sent = false;
        loop {
            tokio::select! {
                biased;

                _ = &mut cancelled => {
                    self.forget(id).await;
                    tracing::debug!("request {id} ({method}) cancelled by caller");
                    return Err(McpError::Cancelled { method: method.to_string() });
                }
                _ = &mut deadline => {
                    self.forget(id).await;
                    return Err(McpError::Timeout {
                        method: method.to_string(),
                        elapsed_ms: options.timeout.unwrap_or_default().as_millis(),
                    });
                }
                outcome = &mut rx => {
                    // The sender is only dropped without a value if the
                    // client state is torn down underneath us.
                    return outcome.unwrap_or(Err(McpError::Closed));
                }
                result = &mut send, if !sent => match result {
                    Ok(()) => sent = true,
                    Err(e) => {
                        self.forget(id).await;
                        return Err(e);
                    }
                },
            }
        }
    }

    /// Send a JSON-RPC notification (no response expected).
    ///
    /// # Errors
    ///
    /// Returns [`McpError::Closed`] after close, or the transport's error.
    pub async fn notify(&self, method: &str, params: Option<serde_json::Value>) -> Result<()> {
        if self.is_closed() {
            return Err(McpError::Closed);
        }
        self.transport
            .send(JsonRpcMessage::notification(method, params))
            .await
    }

    /// Register a handler for a server-sent notification.
    ///
    /// Registering a second handler for the same method replaces the first.
    pub async fn on_notification(
        &self,
        method: impl Into<String>,
        f: impl Fn(Option<serde_json::Value>) + Send + Sync + 'static,
    ) {
        self.notification_handlers
            .lock()
            .await
            .insert(method.into(), Arc::new(f));
    }

    /// Register a handler for a server-initiated request.
    ///
    /// Registering a second handler for the same method replaces the first.
    pub async fn on_server_request<F>(&self, method: impl Into<String>, f: F)
    where
        F: Fn(
                RequestId,
                Option<serde_json::Value>,
            ) -> BoxFuture<'static, std::result::Result<serde_json::Value, JsonRpcError>>
            + Send
            + Sync
            + 'static,
    {
        self.server_request_handlers
            .lock()
            .await
            .insert(method.into(), Arc::new(f));
    }

    /// Install the handler that observes transport errors and protocol
    /// violations.
    pub async fn on_error(&self, f: impl Fn(&McpError) + Send + Sync + 'static) {
        let handler: ErrorHandler = Arc::new(f);
        *self.error_handler.lock().await = Some(handler);
    }

    /// Mark the client closed and settle every pending request with
    /// [`McpError::Closed`]. The transport is left to the caller.
    pub async fn shutdown(&self) {
        self.closed.store(true, Ordering::SeqCst);
        self.settle_all().await;
    }

    async fn forget(&self, id: u64) {
        self.pending.lock().await.remove(&id);
    }

    async fn settle_all(&self) {
        let drained: Vec<_> = self.pending.lock().await.drain().collect();
        if !drained.is_empty() {
            tracing::debug!("settling {} pending request(s) on close", drained.len());
        }
        for (_, tx) in drained {
            let _ = tx.send(Err(McpError::Closed));
        }
    }

    async fn report(&self, error: &McpError) {
        let handler = self.error_handler.lock().await.clone();
        match handler {
            Some(handler) => handler(error),
            None => tracing::debug!("unhandled MCP client error: {error}"),
        }
    }
}

/// Start the JSON-RPC read loop as a background Tokio task.
///
/// The loop drains `events` and dispatches each one:
///
/// - **Response / error reply**: settles the matching pending request.
/// - **Server-initiated request**: answered on a spawned task by the
///   registered handler, or with `-32601 Method not found`.
/// - **Notification**: passed to the registered handler, if any.
/// - **Transport error**: passed to the error handler and, when tied to a
///   request id, settles that request with the error.
/// - **Closed** (or end of stream): marks the client closed and settles
///   every pending request with [`McpError::Closed`].
///
/// Cancelling `cancellation` stops the loop and settles all pending
/// requests the same way.
pub fn start_read_loop(
    mut events: EventStream,
    cancellation: CancellationToken,
    client: Arc<JsonRpcClient>,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        loop {
            tokio::select! {
                biased;

                _ = cancellation.cancelled() => {
                    client.shutdown().await;
                    break;
                }

                event = events.next() => match event {
                    Some(TransportEvent::Message(message)) => dispatch_message(message, &client).await,
                    Some(TransportEvent::Error { error, request_id }) => {
                        handle_transport_error(error, request_id, &client).await;
                    }
                    Some(TransportEvent::Closed) | None => {
                        tracing::debug!("MCP transport closed");
                        client.shutdown().await;
                        break;
                    }
                },
            }
        }
    })
}

/// Classify and dispatch a single inbound message.
async fn dispatch_message(message: JsonRpcMessage, client: &Arc<JsonRpcClient>) {
    match message {
        JsonRpcMessage::Response(response) => {
            settle(client, &response.id, Ok(response.result)).await;
        }
        JsonRpcMessage::Error(reply) => {
            settle(client, &reply.id, Err(reply.error.into())).await;
        }
        JsonRpcMessage::Request(request) => {
            let client = Arc::clone(client);
            tokio::spawn(async move {
                handle_server_request(request, &client).await;
            });
        }
        JsonRpcMessage::Notification(notification) => {
            handle_notification(notification, client).await;
        }
    }
}

/// Resolve a pending request, or report the reply as a protocol violation.
async fn settle(client: &Arc<JsonRpcClient>, id: &RequestId, outcome: Result<serde_json::Value>) {
    let tx = match id.as_u64() {
        Some(key) => client.pending.lock().await.remove(&key),
        None => None,
    };

    match tx {
        // Ignore send errors: the caller may have already given up.
        Some(tx) => {
            let _ = tx.send(outcome);
        }
        None => {
            tracing::warn!("MCP read loop: received a response for unknown id {id}");
            let error = McpError::Protocol {
                message: "Protocol error: Received a response for an unknown message ID".into(),
                data: Some(serde_json::json!({ "id": id })),
            };
            client.report(&error).await;
        }
    }
}

async fn handle_transport_error(
    error: McpError,
    request_id: Option<RequestId>,
    client: &Arc<JsonRpcClient>,
) {
    client.report(&error).await;
    let Some(key) = request_id.as_ref().and_then(RequestId::as_u64) else {
        return;
    };
    let tx = client.pending.lock().await.remove(&key);
    if let Some(tx) = tx {
        let _ = tx.send(Err(error));
    }
}

/// Call the registered server-request handler and send exactly one reply.
async fn handle_server_request(request: JsonRpcRequest, client: &Arc<JsonRpcClient>) {
    // Look up the handler while holding the lock, then drop the lock before
    // awaiting so a handler may call back into the client.
    let handler = client
        .server_request_handlers
        .lock()
        .await
        .get(&request.method)
        .cloned();

    let reply = match handler {
        Some(handler) => match handler(request.id.clone(), request.params).await {
            Ok(result) => JsonRpcMessage::response(request.id, result),
            Err(error) => JsonRpcMessage::error(request.id, error),
        },
        None => {
            tracing::debug!("no handler for server request `{}`", request.method);
            JsonRpcMessage::error(
                request.id,
                JsonRpcError::new(METHOD_NOT_FOUND, "Method not found")
                    .with_data(serde_json::json!({ "method": request.method })),
            )
        }
    };

    if let Err(e) = client.transport.send(reply).await {
        tracing::warn!("failed to answer server request: {e}");
        client.report(&e).await;
    }
}

/// Call the registered notification handler.
async fn handle_notification(notification: JsonRpcNotification, client: &Arc<JsonRpcClient>) {
    let handler = client
        .notification_handlers
        .lock()
        .await
        .get(&notification.method)
        .cloned();
    match handler {
        Some(handler) => handler(notification.params),
        None => tracing::debug!(
            "MCP read loop: no handler for notification '{}'; ignoring",
            notification.method
        ),
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{CONNECTION_CLOSED, REQUEST_CANCELLED, REQUEST_TIMEOUT};
    use crate::mcp::transport::fake::{FakeTransport, FakeTransportHandle};
    use std::sync::atomic::AtomicUsize;

    fn make_client() -> (Arc<JsonRpcClient>, FakeTransportHandle, CancellationToken) {
        let (transport, handle) = FakeTransport::new();
        let transport: Arc<dyn Transport> = Arc::new(transport);
        let token = CancellationToken::new();
        let client = Arc::new(JsonRpcClient::new(Arc::clone(&transport)));
        start_read_loop(transport.events(), token.clone(), Arc::clone(&client));
        (client, handle, token)
    }

    fn spawn_request(
        client: &Arc<JsonRpcClient>,
        method: &'static str,
        options: RequestOptions,
    ) -> tokio::task::JoinHandle<Result<serde_json::Value>> {
        let client = Arc::clone(client);
        tokio::spawn(async move { client.request(method, None, &options).await })
    }

    #[tokio::test]
    async fn test_request_resolves_with_correct_result() {
        let (client, mut handle, _token) = make_client();
        let task = spawn_request(&client, "tools/list", RequestOptions::default());

        let request = handle.next_request_for("tools/list").await;
        assert_eq!(request.id, RequestId::Number(1));
        handle.respond(request.id, serde_json::json!({ "tools": [] }));

        let result = task.await.unwrap().unwrap();
        assert_eq!(result, serde_json::json!({ "tools": [] }));
        assert_eq!(client.pending_count().await, 0);
    }

    #[tokio::test]
    async fn test_out_of_order_replies_settle_their_own_requests() {
        let (client, mut handle, _token) = make_client();
        let first = spawn_request(&client, "tools/call", RequestOptions::default());
        let r1 = handle.next_request_for("tools/call").await;
        let second = spawn_request(&client, "tools/call", RequestOptions::default());
        let r2 = handle.next_request_for("tools/call").await;
        assert_ne!(r1.id, r2.id);

        handle.respond(r2.id.clone(), serde_json::json!({ "which": "second" }));
        let second = second.await.unwrap().unwrap();
        assert_eq!(second["which"], "second");
        assert!(!first.is_finished());

        handle.respond(r1.id, serde_json::json!({ "which": "first" }));
        assert_eq!(first.await.unwrap().unwrap()["which"], "first");
    }

    #[tokio::test]
    async fn test_ids_strictly_increase() {
        let (client, mut handle, _token) = make_client();
        let mut seen = Vec::new();
        for _ in 0..3 {
            let _task = spawn_request(&client, "tools/list", RequestOptions::default());
            seen.push(handle.next_request_for("tools/list").await.id);
        }
        assert_eq!(
            seen,
            vec![RequestId::Number(1), RequestId::Number(2), RequestId::Number(3)]
        );
    }

    #[tokio::test]
    async fn test_json_rpc_error_response_preserves_code_and_data() {
        let (client, mut handle, _token) = make_client();
        let task = spawn_request(&client, "tools/call", RequestOptions::default());
        let request = handle.next_request_for("tools/call").await;
        handle.respond_error(
            request.id,
            JsonRpcError::new(-32042, "quota exceeded").with_data(serde_json::json!({ "limit": 5 })),
        );

        let err = task.await.unwrap().unwrap_err();
        assert_eq!(err.code(), -32042);
        assert_eq!(err.to_string(), "quota exceeded");
        assert_eq!(err.data(), Some(&serde_json::json!({ "limit": 5 })));
    }

    #[tokio::test]
    async fn test_request_timeout_fires_and_forgets_entry() {
        let (client, _handle, _token) = make_client();
        let err = client
            .request(
                "tools/list",
                None,
                &RequestOptions::default().with_timeout(Duration::from_millis(50)),
            )
            .await
            .unwrap_err();
        assert_eq!(err.code(), REQUEST_TIMEOUT);
        assert_eq!(client.pending_count().await, 0);
    }

    #[tokio::test]
    async fn test_cancel_aborts_in_flight_request() {
        let (client, mut handle, _token) = make_client();
        let cancel = CancellationToken::new();
        let task = spawn_request(
            &client,
            "tools/call",
            RequestOptions::default().with_cancel(cancel.clone()),
        );
        handle.next_request_for("tools/call").await;
        cancel.cancel();

        let err = task.await.unwrap().unwrap_err();
        assert_eq!(err.code(), REQUEST_CANCELLED);
        assert!(err.to_string().contains("Request was aborted"));
        assert_eq!(client.pending_count().await, 0);
    }

    #[tokio::test]
    async fn test_already_cancelled_token_sends_nothing() {
        let (client, mut handle, _token) = make_client();
        let cancel = CancellationToken::new();
        cancel.cancel();
        let err = client
            .request("tools/list", None, &RequestOptions::default().with_cancel(cancel))
            .await
            .unwrap_err();
        assert_eq!(err.code(), REQUEST_CANCELLED);
        handle.assert_no_outbound(Duration::from_millis(50)).await;
    }

    #[tokio::test]
    async fn test_transport_close_settles_all_pending() {
        let (client, mut handle, _token) = make_client();
        let a = spawn_request(&client, "tools/list", RequestOptions::default());
        let b = spawn_request(&client, "prompts/list", RequestOptions::default());
        handle.next_request_for("tools/list").await;
        handle.next_request_for("prompts/list").await;

        handle.close();

        for task in [a, b] {
            let err = task.await.unwrap().unwrap_err();
            assert_eq!(err.code(), CONNECTION_CLOSED);
        }
        assert!(client.is_closed());
        let err = client
            .request("tools/list", None, &RequestOptions::default())
            .await
            .unwrap_err();
        assert!(matches!(err, McpError::Closed));
    }

    #[tokio::test]
    async fn test_close_during_registration_does_not_strand_request() {
        let (client, mut handle, _token) = make_client();

        // Park the request on the pending lock, then close underneath it.
        let guard = client.pending.lock().await;
        let task = spawn_request(&client, "tools/list", RequestOptions::default());
        tokio::time::sleep(Duration::from_millis(20)).await;
        client.closed.store(true, Ordering::SeqCst);
        drop(guard);

        let outcome = tokio::time::timeout(Duration::from_secs(2), task)
            .await
            .expect("request stranded after close")
            .expect("task panicked");
        assert!(matches!(outcome, Err(McpError::Closed)));
        assert_eq!(client.pending_count().await, 0);
        handle.assert_no_outbound(Duration::from_millis(50)).await;
    }

    #[tokio::test]
    async fn test_cancelling_read_loop_settles_pending() {
        let (client, mut handle, token) = make_client();
        let task = spawn_request(&client, "tools/list", RequestOptions::default());
        handle.next_request_for("tools/list").await;
        token.cancel();
        let outcome = tokio::time::timeout(Duration::from_secs(2), task)
            .await
            .expect("request task did not complete after loop exit")
            .expect("task panicked");
        assert!(matches!(outcome, Err(McpError::Closed)));
    }

    #[tokio::test]
    async fn test_transport_error_for_request_settles_it_and_notifies_handler() {
        let (client, mut handle, _token) = make_client();
        let seen = Arc::new(AtomicUsize::new(0));
        let seen_clone = Arc::clone(&seen);
        client
            .on_error(move |_e: &McpError| {
                seen_clone.fetch_add(1, Ordering::SeqCst);
            })
            .await;

        let task = spawn_request(&client, "tools/list", RequestOptions::default());
        let request = handle.next_request_for("tools/list").await;
        handle.report_error(
            McpError::HttpStatus {
                status: 500,
                body: "boom".into(),
            },
            Some(request.id),
        );

        let err = task.await.unwrap().unwrap_err();
        assert!(matches!(err, McpError::HttpStatus { status: 500, .. }));
        assert_eq!(seen.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_unknown_response_id_reported_as_protocol_error() {
        let (client, handle, _token) = make_client();
        let (tx, rx) = oneshot::channel::<String>();
        let tx = std::sync::Mutex::new(Some(tx));
        client
            .on_error(move |e: &McpError| {
                if let Some(tx) = tx.lock().unwrap().take() {
                    let _ = tx.send(e.to_string());
                }
            })
            .await;

        handle.respond(RequestId::Number(99), serde_json::json!({}));
        let message = tokio::time::timeout(Duration::from_secs(2), rx)
            .await
            .unwrap()
            .unwrap();
        assert!(message.contains("unknown message ID"));
        assert!(!client.is_closed());
    }

    #[tokio::test]
    async fn test_server_request_without_handler_gets_method_not_found() {
        let (_client, mut handle, _token) = make_client();
        handle.inject(JsonRpcMessage::request(
            RequestId::String("srv-1".into()),
            "sampling/createMessage",
            None,
        ));
        match handle.next_outbound().await {
            JsonRpcMessage::Error(reply) => {
                assert_eq!(reply.id, RequestId::String("srv-1".into()));
                assert_eq!(reply.error.code, METHOD_NOT_FOUND);
            }
            other => panic!("expected error reply, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_server_request_handler_result_sent_with_original_id() {
        let (client, mut handle, _token) = make_client();
        client
            .on_server_request("ping", |_id, _params| {
                Box::pin(async { Ok(serde_json::json!({})) })
            })
            .await;
        handle.inject(JsonRpcMessage::request(7u64, "ping", None));
        match handle.next_outbound().await {
            JsonRpcMessage::Response(reply) => assert_eq!(reply.id, RequestId::Number(7)),
            other => panic!("expected response, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_notification_handler_called_for_matching_method() {
        let (client, handle, _token) = make_client();
        let (tx, rx) = oneshot::channel::<Option<serde_json::Value>>();
        let tx = std::sync::Mutex::new(Some(tx));
        client
            .on_notification("notifications/tools/list_changed", move |params| {
                if let Some(tx) = tx.lock().unwrap().take() {
                    let _ = tx.send(params);
                }
            })
            .await;

        handle.inject(JsonRpcMessage::notification(
            "notifications/tools/list_changed",
            Some(serde_json::json!({ "reason": "reload" })),
        ));
        let params = tokio::time::timeout(Duration::from_secs(2), rx)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(params, Some(serde_json::json!({ "reason": "reload" })));
    }

    #[tokio::test]
    async fn test_notify_sends_without_id() {
        let (client, mut handle, _token) = make_client();
        client
            .notify("notifications/initialized", None)
            .await
            .unwrap();
        let sent = handle.next_outbound().await;
        assert!(matches!(sent, JsonRpcMessage::Notification(_)));
        assert!(sent.id().is_none());
    }
}

//! Streamable HTTP transport for MCP
//!
//! This module implements [`HttpTransport`]. Every outbound JSON-RPC message
//! is sent as an HTTP POST. The server may reply with:
//!
//! - `application/json` -- one message or a batch array in the body
//! - `text/event-stream` -- a short-lived SSE stream carrying the reply (and
//!   possibly server requests or notifications before it)
//! - `202 Accepted` -- no body; the reply will be pushed on the inbound
//!   stream
//!
//! Independently, a long-lived GET stream (`Accept: text/event-stream`)
//! carries server-pushed messages. It is opened on [`Transport::start`] and
//! reopened whenever a `202` arrives while it is down. A `405` on that GET
//! means the server offers no push channel; the transport carries on
//! without one.
//!
//! # Session management
//!
//! Any response carrying an `mcp-session-id` header sets the session id that
//! is echoed on every later POST, GET, and the final DELETE.
//!
//! # Resumption
//!
//! Every frame with an `id:` field on the GET stream advances the
//! resumption cursor; ids on POST reply streams belong to those streams and
//! are not tracked. When the GET stream ends or fails to open for any reason
//! other than [`Transport::close`], it is reopened with `last-event-id: <cursor>` after
//! `min(max_delay, initial_delay * growth_factor^attempt)`. The attempt
//! counter resets on every successful open; once `max_retries` reconnects
//! have failed a fatal error is reported and the stream stays down.
//!
//! # Authorization
//!
//! With an [`AuthProvider`] configured, its token is sent as
//! `Authorization: Bearer`. A `401` triggers one authorization attempt and
//! one retry of the same exchange; a second `401` is final. A re-authorized
//! GET resumes from the stored cursor.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use futures::{Stream, StreamExt};
use reqwest::header::{ACCEPT, AUTHORIZATION, CONTENT_TYPE};
use reqwest::{RequestBuilder, Response, StatusCode};
use tokio::sync::RwLock;
use tokio_util::sync::CancellationToken;
use url::Url;

use crate::error::{McpError, Result};
use crate::mcp::auth::{resource_metadata_from_headers, AuthProvider, AuthResult, AuthorizationRequest};
use crate::mcp::message::{JsonRpcMessage, RequestId};
use crate::mcp::transport::event_stream::{decode_sse, SseEvent};
use crate::mcp::transport::{EventChannel, EventStream, Transport};
use crate::mcp::types::LATEST_PROTOCOL_VERSION;

/// Session id header, set by the server and echoed by the client.
pub const HEADER_SESSION_ID: &str = "mcp-session-id";
/// Negotiated protocol version header.
pub const HEADER_PROTOCOL_VERSION: &str = "mcp-protocol-version";
/// SSE resumption cursor header.
pub const HEADER_LAST_EVENT_ID: &str = "last-event-id";

const POST_ACCEPT: &str = "application/json, text/event-stream";
const STREAM_ACCEPT: &str = "text/event-stream";

/// Inbound stream reconnection policy.
///
/// # Examples
///
/// ```
/// use std::time::Duration;
/// use mcpwire::mcp::transport::ReconnectOptions;
///
/// let options = ReconnectOptions::default();
/// assert_eq!(options.delay_for(0), Duration::from_millis(1000));
/// assert_eq!(options.delay_for(1), Duration::from_millis(1500));
/// assert_eq!(options.delay_for(20), Duration::from_millis(30_000));
/// ```
#[derive(Debug, Clone, PartialEq)]
pub struct ReconnectOptions {
    /// Delay before the first reconnect.
    pub initial_delay: Duration,
    /// Upper bound on any single delay.
    pub max_delay: Duration,
    /// Multiplier applied per attempt.
    pub growth_factor: f64,
    /// Reconnects attempted before giving up.
    pub max_retries: u32,
}

impl Default for ReconnectOptions {
    fn default() -> Self {
        Self {
            initial_delay: Duration::from_millis(1000),
            max_delay: Duration::from_millis(30_000),
            growth_factor: 1.5,
            max_retries: 2,
        }
    }
}

impl ReconnectOptions {
    /// Delay before reconnect number `attempt` (zero-based).
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let initial = self.initial_delay.as_millis() as f64;
        let max = self.max_delay.as_millis() as f64;
        let exponent = i32::try_from(attempt).unwrap_or(i32::MAX);
        let delay = (initial * self.growth_factor.powi(exponent)).min(max);
        Duration::from_millis(delay as u64)
    }
}

/// Construction options for [`HttpTransport`].
#[derive(Debug, Clone, Default)]
pub struct HttpTransportOptions {
    /// Extra headers sent on every request.
    pub headers: HashMap<String, String>,
    /// Token source and authorization flow.
    pub auth_provider: Option<Arc<dyn AuthProvider>>,
    /// Inbound stream reconnection policy.
    pub reconnect: ReconnectOptions,
    /// Session id to resume instead of waiting for the server to assign one.
    pub session_id: Option<String>,
}

/// Streamable HTTP transport.
///
/// # Examples
///
/// ```no_run
/// use mcpwire::mcp::transport::{HttpTransport, HttpTransportOptions, Transport};
/// use url::Url;
///
/// # #[tokio::main]
/// # async fn main() -> mcpwire::error::Result<()> {
/// let transport = HttpTransport::new(
///     Url::parse("http://localhost:3000/mcp")?,
///     HttpTransportOptions::default(),
/// )?;
/// transport.start().await?;
/// # Ok(())
/// # }
/// ```
pub struct HttpTransport {
    inner: Arc<HttpInner>,
}

struct HttpInner {
    http: reqwest::Client,
    endpoint: Url,
    headers: HashMap<String, String>,
    auth_provider: Option<Arc<dyn AuthProvider>>,
    reconnect: ReconnectOptions,
    session_id: RwLock<Option<String>>,
    last_event_id: RwLock<Option<String>>,
    protocol_version: RwLock<String>,
    started: AtomicBool,
    closed: AtomicBool,
    /// Set while a task owns the inbound GET stream.
    inbound_active: AtomicBool,
    shutdown: CancellationToken,
    events: EventChannel,
}

/// Result of one attempt to open the inbound GET stream.
enum InboundOpen {
    Stream(Response),
    NotSupported,
    Unauthorized(Option<Url>),
}

impl HttpTransport {
    /// Construct a transport targeting `endpoint`. No I/O happens here.
    ///
    /// # Errors
    ///
    /// Returns [`McpError::Transport`] if the HTTP client cannot be built.
    pub fn new(endpoint: Url, options: HttpTransportOptions) -> Result<Self> {
        let http = reqwest::Client::builder()
            .build()
            .map_err(|e| McpError::transport_with("failed to build HTTP client", e))?;

        Ok(Self {
            inner: Arc::new(HttpInner {
                http,
                endpoint,
                headers: options.headers,
                auth_provider: options.auth_provider,
                reconnect: options.reconnect,
                session_id: RwLock::new(options.session_id),
                last_event_id: RwLock::new(None),
                protocol_version: RwLock::new(LATEST_PROTOCOL_VERSION.to_string()),
                started: AtomicBool::new(false),
                closed: AtomicBool::new(false),
                inbound_active: AtomicBool::new(false),
                shutdown: CancellationToken::new(),
                events: EventChannel::new(),
            }),
        })
    }

    /// Session id assigned by the server, if any.
    pub async fn session_id(&self) -> Option<String> {
        self.inner.session_id.read().await.clone()
    }

    /// Id of the last event received on the inbound GET stream, if any.
    pub async fn last_event_id(&self) -> Option<String> {
        self.inner.last_event_id.read().await.clone()
    }

    /// Whether a task currently owns the inbound GET stream.
    pub fn inbound_active(&self) -> bool {
        self.inner.inbound_active.load(Ordering::SeqCst)
    }
}

impl std::fmt::Debug for HttpTransport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HttpTransport")
            .field("endpoint", &self.inner.endpoint.as_str())
            .field("started", &self.inner.started.load(Ordering::Relaxed))
            .field("closed", &self.inner.closed.load(Ordering::Relaxed))
            .field("has_auth_provider", &self.inner.auth_provider.is_some())
            .finish_non_exhaustive()
    }
}

#[async_trait::async_trait]
impl Transport for HttpTransport {
    async fn start(&self) -> Result<()> {
        if self.inner.closed.load(Ordering::SeqCst) {
            return Err(McpError::transport("HttpTransport is closed"));
        }
        if self.inner.started.swap(true, Ordering::SeqCst) {
            return Err(McpError::transport("HttpTransport already started"));
        }
        self.inner.spawn_inbound();
        Ok(())
    }

    /// POST one message.
    ///
    /// Non-success statuses other than `401` are reported as error events
    /// tied to the request id and do not fail the call. Authorization
    /// failures and network errors fail the call.
    async fn send(&self, message: JsonRpcMessage) -> Result<()> {
        self.inner.ensure_open()?;
        let body = serde_json::to_string(&message)?;
        let request_id = match &message {
            JsonRpcMessage::Request(request) => Some(request.id.clone()),
            _ => None,
        };

        tokio::select! {
            biased;

            _ = self.inner.shutdown.cancelled() => Err(McpError::Closed),
            result = self.inner.post(body, request_id) => result,
        }
    }

    async fn close(&self) -> Result<()> {
        if self.inner.closed.swap(true, Ordering::SeqCst) {
            return Ok(());
        }
        self.inner.shutdown.cancel();
        self.inner.terminate_session().await;
        self.inner.events.close();
        Ok(())
    }

    async fn set_protocol_version(&self, version: &str) {
        *self.inner.protocol_version.write().await = version.to_string();
    }

    fn events(&self) -> EventStream {
        self.inner.events.stream()
    }
}

impl Drop for HttpTransport {
    fn drop(&mut self) {
        // Stops the inbound task, which holds its own Arc to the state.
        self.inner.shutdown.cancel();
    }
}

impl HttpInner {
    fn ensure_open(&self) -> Result<()> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(McpError::transport("HttpTransport is closed"));
        }
        if !self.started.load(Ordering::SeqCst) {
            return Err(McpError::transport("HttpTransport not started"));
        }
        Ok(())
    }

    /// Attach the headers shared by every exchange.
    async fn apply_headers(&self, mut req: RequestBuilder) -> Result<RequestBuilder> {
        for (k, v) in &self.headers {
            req = req.header(k.as_str(), v.as_str());
        }
        req = req.header(HEADER_PROTOCOL_VERSION, self.protocol_version.read().await.as_str());
        if let Some(id) = self.session_id.read().await.as_deref() {
            req = req.header(HEADER_SESSION_ID, id);
        }
        if let Some(provider) = &self.auth_provider {
            if let Some(tokens) = provider.tokens().await? {
                req = req.header(AUTHORIZATION, format!("Bearer {}", tokens.access_token));
            }
        }
        Ok(req)
    }

    async fn capture_session(&self, response: &Response) {
        let Some(id) = response
            .headers()
            .get(HEADER_SESSION_ID)
            .and_then(|v| v.to_str().ok())
        else {
            return;
        };
        let mut current = self.session_id.write().await;
        if current.as_deref() != Some(id) {
            tracing::debug!("MCP session id assigned: {id}");
            *current = Some(id.to_string());
        }
    }

    /// Run the provider's authorization flow after a `401`.
    async fn reauthorize(&self, resource_metadata_url: Option<Url>) -> Result<()> {
        let Some(provider) = &self.auth_provider else {
            return Err(McpError::Unauthorized(
                "server requires authorization and no auth provider is configured".into(),
            ));
        };
        let request = AuthorizationRequest {
            server_url: self.endpoint.clone(),
            resource_metadata_url,
        };
        match provider.authorize(request).await {
            Ok(AuthResult::Authorized) => Ok(()),
            Ok(AuthResult::Redirect) => Err(McpError::Unauthorized(
                "authorization requires user interaction".into(),
            )),
            Err(e) => Err(McpError::Unauthorized(format!(
                "authorization flow failed: {e}"
            ))),
        }
    }

    // -----------------------------------------------------------------------
    // Outbound path
    // -----------------------------------------------------------------------

    async fn post(self: &Arc<Self>, body: String, request_id: Option<RequestId>) -> Result<()> {
        let mut auth_attempted = false;

        loop {
            let req = self
                .http
                .post(self.endpoint.clone())
                .header(CONTENT_TYPE, "application/json")
                .header(ACCEPT, POST_ACCEPT)
                .body(body.clone());
            let req = self.apply_headers(req).await?;

            let response = match req.send().await {
                Ok(r) => r,
                Err(e) => {
                    tracing::debug!("MCP POST failed: {e}");
                    self.events
                        .report(McpError::transport(format!("POST failed: {e}")), None);
                    return Err(McpError::transport_with("POST failed", e));
                }
            };

            self.capture_session(&response).await;
            let status = response.status();

            if status == StatusCode::UNAUTHORIZED {
                let hint = resource_metadata_from_headers(response.headers());
                let message = if auth_attempted {
                    "server rejected credentials after authorization".to_string()
                } else {
                    auth_attempted = true;
                    match self.reauthorize(hint).await {
                        Ok(()) => continue,
                        Err(McpError::Unauthorized(message)) => message,
                        Err(other) => other.to_string(),
                    }
                };
                self.events
                    .report(McpError::Unauthorized(message.clone()), request_id);
                return Err(McpError::Unauthorized(message));
            }

            if status == StatusCode::ACCEPTED {
                self.spawn_inbound();
                return Ok(());
            }

            if !status.is_success() {
                let text = response.text().await.unwrap_or_default();
                tracing::debug!("MCP POST returned HTTP {status}");
                self.events.report(
                    McpError::HttpStatus {
                        status: status.as_u16(),
                        body: text,
                    },
                    request_id,
                );
                return Ok(());
            }

            if request_id.is_none() {
                // Notifications and replies expect no payload.
                return Ok(());
            }

            let content_type = response
                .headers()
                .get(CONTENT_TYPE)
                .and_then(|v| v.to_str().ok())
                .unwrap_or("")
                .to_ascii_lowercase();

            if content_type.starts_with("application/json") {
                match response.text().await {
                    Ok(text) => self.events.deliver(&text, request_id.as_ref()),
                    Err(e) => self.events.report(
                        McpError::transport_with("failed to read response body", e),
                        request_id,
                    ),
                }
            } else if content_type.starts_with(STREAM_ACCEPT) {
                let frames = decode_sse(response.bytes_stream());
                if let Some(e) = self.read_frames(frames, false).await {
                    self.events.report(e, request_id);
                }
            } else {
                self.events.report(
                    McpError::transport(format!("Unexpected content type: {content_type}")),
                    request_id,
                );
            }
            return Ok(());
        }
    }

    /// Dispatch SSE frames until the stream ends. Returns the read error
    /// that ended it, if any. Only the inbound stream passes `track_cursor`.
    async fn read_frames<S>(&self, frames: S, track_cursor: bool) -> Option<McpError>
    where
        S: Stream<Item = Result<SseEvent>>,
    {
        tokio::pin!(frames);
        while let Some(frame) = frames.next().await {
            let event = match frame {
                Ok(event) => event,
                Err(e) => return Some(e),
            };
            if event.kind() == "message" && !event.data.is_empty() {
                self.events.deliver(&event.data, None);
            } else if !event.data.is_empty() {
                tracing::debug!("ignoring SSE event of type `{}`", event.kind());
            }
            if let Some(id) = event.id.filter(|_| track_cursor) {
                *self.last_event_id.write().await = Some(id);
            }
        }
        None
    }

    // -----------------------------------------------------------------------
    // Inbound path
    // -----------------------------------------------------------------------

    /// Start the inbound stream task unless one is already running.
    fn spawn_inbound(self: &Arc<Self>) {
        if self.closed.load(Ordering::SeqCst) || self.shutdown.is_cancelled() {
            return;
        }
        if self.inbound_active.swap(true, Ordering::SeqCst) {
            return;
        }
        let inner = Arc::clone(self);
        tokio::spawn(async move {
            inner.run_inbound().await;
            inner.inbound_active.store(false, Ordering::SeqCst);
        });
    }

    async fn open_inbound(&self) -> Result<InboundOpen> {
        let mut req = self
            .http
            .get(self.endpoint.clone())
            .header(ACCEPT, STREAM_ACCEPT);
        req = self.apply_headers(req).await?;
        if let Some(cursor) = self.last_event_id.read().await.as_deref() {
            req = req.header(HEADER_LAST_EVENT_ID, cursor);
        }

        let response = req
            .send()
            .await
            .map_err(|e| McpError::transport_with("failed to open SSE stream", e))?;
        self.capture_session(&response).await;

        match response.status() {
            StatusCode::METHOD_NOT_ALLOWED => Ok(InboundOpen::NotSupported),
            StatusCode::UNAUTHORIZED => Ok(InboundOpen::Unauthorized(
                resource_metadata_from_headers(response.headers()),
            )),
            status if status.is_success() => Ok(InboundOpen::Stream(response)),
            status => {
                let body = response.text().await.unwrap_or_default();
                Err(McpError::HttpStatus {
                    status: status.as_u16(),
                    body,
                })
            }
        }
    }

    async fn run_inbound(&self) {
        let mut attempt: u32 = 0;
        let mut reconnecting = false;
        let mut auth_attempted = false;

        loop {
            if reconnecting {
                if attempt >= self.reconnect.max_retries {
                    let max = self.reconnect.max_retries;
                    tracing::warn!("MCP inbound stream gave up after {max} reconnection attempts");
                    self.events.report(
                        McpError::transport(format!(
                            "Maximum reconnection attempts ({max}) exceeded."
                        )),
                        None,
                    );
                    return;
                }
                let delay = self.reconnect.delay_for(attempt);
                attempt += 1;
                tracing::debug!("reconnecting MCP inbound stream in {delay:?} (attempt {attempt})");
                tokio::select! {
                    biased;

                    _ = self.shutdown.cancelled() => return,
                    _ = tokio::time::sleep(delay) => {}
                }
            }

            let opened = tokio::select! {
                biased;

                _ = self.shutdown.cancelled() => return,
                opened = self.open_inbound() => opened,
            };

            match opened {
                Ok(InboundOpen::Stream(response)) => {
                    attempt = 0;
                    auth_attempted = false;
                    tracing::debug!("MCP inbound stream open");
                    let frames = decode_sse(response.bytes_stream());
                    let ended = tokio::select! {
                        biased;

                        _ = self.shutdown.cancelled() => return,
                        ended = self.read_frames(frames, true) => ended,
                    };
                    match ended {
                        Some(e) => {
                            tracing::debug!("MCP inbound stream dropped: {e}");
                            self.events.report(e, None);
                        }
                        None => tracing::debug!("MCP inbound stream ended"),
                    }
                    reconnecting = true;
                }
                Ok(InboundOpen::NotSupported) => {
                    tracing::debug!("server does not offer an inbound SSE stream (405)");
                    return;
                }
                Ok(InboundOpen::Unauthorized(hint)) => {
                    if self.auth_provider.is_some() && !auth_attempted {
                        auth_attempted = true;
                        match self.reauthorize(hint).await {
                            Ok(()) => continue,
                            Err(e) => {
                                self.events.report(e, None);
                                return;
                            }
                        }
                    }
                    self.events.report(
                        McpError::Unauthorized("inbound stream rejected credentials".into()),
                        None,
                    );
                    return;
                }
                Err(e) => {
                    tracing::debug!("MCP inbound stream failed to open: {e}");
                    self.events.report(e, None);
                    reconnecting = true;
                }
            }
        }
    }

    // -----------------------------------------------------------------------
    // Teardown
    // -----------------------------------------------------------------------

    /// Best-effort DELETE releasing the server-side session.
    async fn terminate_session(&self) {
        let Some(session_id) = self.session_id.read().await.clone() else {
            return;
        };
        let req = match self.apply_headers(self.http.delete(self.endpoint.clone())).await {
            Ok(req) => req,
            Err(e) => {
                tracing::debug!("skipping session termination: {e}");
                return;
            }
        };
        match req.send().await {
            Ok(response) => tracing::debug!(
                "MCP session {session_id} terminated with HTTP {}",
                response.status()
            ),
            Err(e) => tracing::debug!("MCP session termination failed: {e}"),
        }
    }
}

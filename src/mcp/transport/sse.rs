//! Legacy HTTP+SSE transport
//!
//! Older MCP servers expose a single GET event stream. The first frame is
//! `event: endpoint` whose data is the URL (absolute or relative to the
//! stream URL) that accepts POSTed client messages. Server messages arrive
//! as `event: message` frames on the same stream.
//!
//! [`SseTransport::start`] resolves only once the endpoint is known. An
//! endpoint on a different origin than the stream is rejected.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use futures::{Stream, StreamExt};
use reqwest::header::{ACCEPT, CONTENT_TYPE};
use tokio::sync::{oneshot, RwLock};
use tokio_util::sync::CancellationToken;
use url::Url;

use crate::error::{McpError, Result};
use crate::mcp::message::{JsonRpcMessage, RequestId};
use crate::mcp::transport::event_stream::{decode_sse, SseEvent};
use crate::mcp::transport::{EventChannel, EventStream, Transport};

/// Legacy HTTP+SSE transport.
pub struct SseTransport {
    inner: Arc<SseInner>,
}

struct SseInner {
    http: reqwest::Client,
    url: Url,
    headers: HashMap<String, String>,
    endpoint: RwLock<Option<Url>>,
    started: AtomicBool,
    closed: AtomicBool,
    shutdown: CancellationToken,
    events: EventChannel,
}

impl SseTransport {
    /// Construct a transport for the event stream at `url`.
    pub fn new(url: Url, headers: HashMap<String, String>) -> Result<Self> {
        let http = reqwest::Client::builder()
            .build()
            .map_err(|e| McpError::transport_with("failed to build HTTP client", e))?;
        Ok(Self {
            inner: Arc::new(SseInner {
                http,
                url,
                headers,
                endpoint: RwLock::new(None),
                started: AtomicBool::new(false),
                closed: AtomicBool::new(false),
                shutdown: CancellationToken::new(),
                events: EventChannel::new(),
            }),
        })
    }

    /// POST endpoint announced by the server, once known.
    pub async fn endpoint(&self) -> Option<Url> {
        self.inner.endpoint.read().await.clone()
    }
}

impl std::fmt::Debug for SseTransport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SseTransport")
            .field("url", &self.inner.url.as_str())
            .field("started", &self.inner.started.load(Ordering::Relaxed))
            .finish_non_exhaustive()
    }
}

/// Resolve the announced endpoint against the stream URL and require the
/// same origin.
fn resolve_endpoint(base: &Url, announced: &str) -> Result<Url> {
    let endpoint = base.join(announced.trim())?;
    if endpoint.origin() != base.origin() {
        return Err(McpError::transport(format!(
            "Endpoint origin does not match connection origin: {}",
            endpoint.origin().ascii_serialization()
        )));
    }
    Ok(endpoint)
}

#[async_trait::async_trait]
impl Transport for SseTransport {
    async fn start(&self) -> Result<()> {
        if self.inner.closed.load(Ordering::SeqCst) {
            return Err(McpError::transport("SseTransport is closed"));
        }
        if self.inner.started.swap(true, Ordering::SeqCst) {
            return Err(McpError::transport("SseTransport already started"));
        }

        let mut req = self
            .inner
            .http
            .get(self.inner.url.clone())
            .header(ACCEPT, "text/event-stream");
        for (k, v) in &self.inner.headers {
            req = req.header(k.as_str(), v.as_str());
        }
        let response = req
            .send()
            .await
            .map_err(|e| McpError::transport_with("failed to open SSE stream", e))?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(McpError::HttpStatus {
                status: status.as_u16(),
                body,
            });
        }

        let (endpoint_tx, endpoint_rx) = oneshot::channel();
        let inner = Arc::clone(&self.inner);
        let frames = decode_sse(response.bytes_stream());
        tokio::spawn(async move {
            inner.read_stream(frames, endpoint_tx).await;
        });

        match endpoint_rx.await {
            Ok(Ok(endpoint)) => {
                tracing::debug!("SSE endpoint announced: {endpoint}");
                Ok(())
            }
            Ok(Err(e)) => Err(e),
            Err(_) => Err(McpError::transport(
                "SSE stream ended before an endpoint was announced",
            )),
        }
    }

    async fn send(&self, message: JsonRpcMessage) -> Result<()> {
        if self.inner.closed.load(Ordering::SeqCst) {
            return Err(McpError::transport("SseTransport is closed"));
        }
        let Some(endpoint) = self.inner.endpoint.read().await.clone() else {
            return Err(McpError::transport("SseTransport not connected"));
        };
        let request_id: Option<RequestId> = match &message {
            JsonRpcMessage::Request(request) => Some(request.id.clone()),
            _ => None,
        };

        let mut req = self
            .inner
            .http
            .post(endpoint)
            .header(CONTENT_TYPE, "application/json")
            .body(serde_json::to_string(&message)?);
        for (k, v) in &self.inner.headers {
            req = req.header(k.as_str(), v.as_str());
        }

        let response = req
            .send()
            .await
            .map_err(|e| McpError::transport_with("POST failed", e))?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            self.inner.events.report(
                McpError::HttpStatus {
                    status: status.as_u16(),
                    body: body.clone(),
                },
                request_id,
            );
            return Err(McpError::HttpStatus {
                status: status.as_u16(),
                body,
            });
        }
        Ok(())
    }

    async fn close(&self) -> Result<()> {
        if self.inner.closed.swap(true, Ordering::SeqCst) {
            return Ok(());
        }
        self.inner.shutdown.cancel();
        self.inner.events.close();
        Ok(())
    }

    fn events(&self) -> EventStream {
        self.inner.events.stream()
    }
}

impl Drop for SseTransport {
    fn drop(&mut self) {
        self.inner.shutdown.cancel();
    }
}

impl SseInner {
    async fn read_stream<S>(&self, frames: S, endpoint_tx: oneshot::Sender<Result<Url>>)
    where
        S: Stream<Item = Result<SseEvent>>,
    {
        tokio::pin!(frames);
        let mut endpoint_tx = Some(endpoint_tx);

        loop {
            let frame = tokio::select! {
                biased;

                _ = self.shutdown.cancelled() => return,
                frame = frames.next() => frame,
            };

            match frame {
                Some(Ok(event)) => match event.kind() {
                    "endpoint" => match resolve_endpoint(&self.url, &event.data) {
                        Ok(endpoint) => {
                            *self.endpoint.write().await = Some(endpoint.clone());
                            if let Some(tx) = endpoint_tx.take() {
                                let _ = tx.send(Ok(endpoint));
                            }
                        }
                        Err(e) => {
                            tracing::warn!("rejecting SSE endpoint: {e}");
                            match endpoint_tx.take() {
                                Some(tx) => {
                                    let _ = tx.send(Err(e));
                                }
                                None => self.events.report(e, None),
                            }
                            self.events.close();
                            return;
                        }
                    },
                    "message" => self.events.deliver(&event.data, None),
                    other => tracing::debug!("ignoring SSE event of type `{other}`"),
                },
                Some(Err(e)) => {
                    self.fail(e, endpoint_tx.take());
                    return;
                }
                None => {
                    self.fail(
                        McpError::transport("SSE connection closed unexpectedly"),
                        endpoint_tx.take(),
                    );
                    return;
                }
            }
        }
    }

    fn fail(&self, error: McpError, endpoint_tx: Option<oneshot::Sender<Result<Url>>>) {
        match endpoint_tx {
            Some(tx) => {
                let _ = tx.send(Err(error));
            }
            None => self.events.report(error, None),
        }
        self.events.close();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resolve_relative_endpoint() {
        let base = Url::parse("http://localhost:8080/sse").unwrap();
        let endpoint = resolve_endpoint(&base, "/messages?sessionId=abc").unwrap();
        assert_eq!(endpoint.as_str(), "http://localhost:8080/messages?sessionId=abc");
    }

    #[test]
    fn test_resolve_absolute_same_origin_endpoint() {
        let base = Url::parse("https://mcp.example.com/sse").unwrap();
        let endpoint = resolve_endpoint(&base, "https://mcp.example.com/post").unwrap();
        assert_eq!(endpoint.path(), "/post");
    }

    #[test]
    fn test_resolve_cross_origin_endpoint_rejected() {
        let base = Url::parse("https://mcp.example.com/sse").unwrap();
        let err = resolve_endpoint(&base, "https://evil.example.com/post").unwrap_err();
        assert!(err.to_string().contains("origin"));
    }

    #[tokio::test]
    async fn test_send_before_start_fails() {
        let t = SseTransport::new(
            Url::parse("http://localhost:9/sse").unwrap(),
            HashMap::new(),
        )
        .unwrap();
        let err = t
            .send(JsonRpcMessage::notification("notifications/initialized", None))
            .await
            .unwrap_err();
        assert!(err.to_string().contains("not connected"));
    }
}

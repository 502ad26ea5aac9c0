//! Authorization boundary for HTTP transports
//!
//! The transport never runs an OAuth flow itself. It asks an injected
//! [`AuthProvider`] for the current bearer token before each request and, on
//! a `401`, hands the provider the server URL plus the `resource_metadata`
//! hint from the `WWW-Authenticate` challenge. The provider either completes
//! authorization in-process ([`AuthResult::Authorized`]) or reports that the
//! user must be sent elsewhere ([`AuthResult::Redirect`]).

use reqwest::header::{HeaderMap, WWW_AUTHENTICATE};
use serde::{Deserialize, Serialize};
use url::Url;

use crate::error::Result;

/// Tokens returned by an [`AuthProvider`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthTokens {
    /// Value sent as `Authorization: Bearer <access_token>`.
    pub access_token: String,
    /// Token type reported by the authorization server.
    #[serde(default = "default_token_type")]
    pub token_type: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub refresh_token: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expires_in: Option<u64>,
}

fn default_token_type() -> String {
    "Bearer".to_string()
}

impl AuthTokens {
    /// Bearer tokens with only an access token set.
    pub fn bearer(access_token: impl Into<String>) -> Self {
        Self {
            access_token: access_token.into(),
            token_type: default_token_type(),
            refresh_token: None,
            expires_in: None,
        }
    }
}

/// Context handed to [`AuthProvider::authorize`] after a `401`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthorizationRequest {
    /// The MCP endpoint that rejected the request.
    pub server_url: Url,
    /// Protected-resource metadata URL advertised in the challenge, if any.
    pub resource_metadata_url: Option<Url>,
}

/// Outcome of an authorization attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthResult {
    /// Fresh tokens are available; the rejected request may be retried.
    Authorized,
    /// The flow needs user interaction outside this process.
    Redirect,
}

/// Supplies bearer tokens and drives the authorization flow on demand.
///
/// # Examples
///
/// ```
/// use mcpwire::mcp::auth::{AuthProvider, StaticTokenProvider};
///
/// # #[tokio::main]
/// # async fn main() {
/// let provider = StaticTokenProvider::new("secret");
/// let tokens = provider.tokens().await.unwrap().unwrap();
/// assert_eq!(tokens.access_token, "secret");
/// # }
/// ```
#[async_trait::async_trait]
pub trait AuthProvider: Send + Sync + std::fmt::Debug {
    /// Current tokens, or `None` when the client is not yet authorized.
    async fn tokens(&self) -> Result<Option<AuthTokens>>;

    /// Run (or resume) the authorization flow after a `401`.
    async fn authorize(&self, request: AuthorizationRequest) -> Result<AuthResult>;
}

/// Provider backed by a fixed, pre-issued token.
///
/// It cannot obtain a new token, so every authorization attempt reports
/// [`AuthResult::Redirect`].
#[derive(Clone)]
pub struct StaticTokenProvider {
    token: String,
}

impl StaticTokenProvider {
    pub fn new(token: impl Into<String>) -> Self {
        Self {
            token: token.into(),
        }
    }
}

impl std::fmt::Debug for StaticTokenProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StaticTokenProvider")
            .field("token", &"<redacted>")
            .finish()
    }
}

#[async_trait::async_trait]
impl AuthProvider for StaticTokenProvider {
    async fn tokens(&self) -> Result<Option<AuthTokens>> {
        Ok(Some(AuthTokens::bearer(self.token.clone())))
    }

    async fn authorize(&self, request: AuthorizationRequest) -> Result<AuthResult> {
        tracing::debug!(
            "static token rejected by {}; no flow available",
            request.server_url
        );
        Ok(AuthResult::Redirect)
    }
}

/// Extract the `resource_metadata` URL from a `WWW-Authenticate` challenge.
///
/// Accepts quoted (`resource_metadata="https://..."`) and unquoted forms.
/// Returns `None` when the attribute is absent or is not a valid URL.
///
/// # Examples
///
/// ```
/// use mcpwire::mcp::auth::parse_resource_metadata_url;
///
/// let url = parse_resource_metadata_url(
///     r#"Bearer realm="mcp", resource_metadata="https://api.example.com/.well-known/oauth-protected-resource""#,
/// );
/// assert_eq!(url.unwrap().host_str(), Some("api.example.com"));
/// assert!(parse_resource_metadata_url("Bearer realm=\"mcp\"").is_none());
/// ```
pub fn parse_resource_metadata_url(www_authenticate: &str) -> Option<Url> {
    let key = "resource_metadata=";
    let pos = www_authenticate.find(key)?;
    let rest = &www_authenticate[pos + key.len()..];

    let raw = if let Some(inner) = rest.strip_prefix('"') {
        let end = inner.find('"')?;
        &inner[..end]
    } else {
        let end = rest
            .find(|c: char| c.is_whitespace() || c == ',')
            .unwrap_or(rest.len());
        &rest[..end]
    };
    Url::parse(raw).ok()
}

/// [`parse_resource_metadata_url`] applied to a response's headers.
pub(crate) fn resource_metadata_from_headers(headers: &HeaderMap) -> Option<Url> {
    headers
        .get(WWW_AUTHENTICATE)
        .and_then(|v| v.to_str().ok())
        .and_then(parse_resource_metadata_url)
}

#[cfg(test)]
mod tests {
    use super::*;
    use reqwest::header::HeaderValue;

    #[test]
    fn test_parse_resource_metadata_unquoted() {
        let url =
            parse_resource_metadata_url("Bearer resource_metadata=https://a.example/meta, scope=x");
        assert_eq!(url.unwrap().as_str(), "https://a.example/meta");
    }

    #[test]
    fn test_parse_resource_metadata_invalid_url_is_none() {
        assert!(parse_resource_metadata_url("Bearer resource_metadata=\"not a url\"").is_none());
    }

    #[test]
    fn test_resource_metadata_from_headers() {
        let mut headers = HeaderMap::new();
        headers.insert(
            WWW_AUTHENTICATE,
            HeaderValue::from_static(r#"Bearer resource_metadata="https://a.example/prm""#),
        );
        assert!(resource_metadata_from_headers(&headers).is_some());
        assert!(resource_metadata_from_headers(&HeaderMap::new()).is_none());
    }

    #[tokio::test]
    async fn test_static_provider_cannot_reauthorize() {
        let provider = StaticTokenProvider::new("t");
        let result = provider
            .authorize(AuthorizationRequest {
                server_url: Url::parse("https://mcp.example/mcp").unwrap(),
                resource_metadata_url: None,
            })
            .await
            .unwrap();
        assert_eq!(result, AuthResult::Redirect);
    }

    #[test]
    fn test_static_provider_debug_redacts_token() {
        let rendered = format!("{:?}", StaticTokenProvider::new("super-secret"));
        assert!(!rendered.contains("super-secret"));
    }

    #[test]
    fn test_tokens_deserialize_default_type() {
        let tokens: AuthTokens = serde_json::from_str(r#"{"access_token":"abc"}"#).unwrap();
        assert_eq!(tokens.token_type, "Bearer");
    }
}

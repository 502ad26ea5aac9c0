//! Error types for mcpwire
//!
//! Every failure surfaced by the library is an [`McpError`]. Callers branch
//! on [`McpError::code`] (a JSON-RPC error code) instead of matching on
//! message text; server-reported errors keep their original code and
//! structured `data`.

use thiserror::Error;

/// Invalid JSON was received.
pub const PARSE_ERROR: i64 = -32700;
/// The JSON sent is not a valid JSON-RPC envelope.
pub const INVALID_REQUEST: i64 = -32600;
/// The method does not exist or is not available.
pub const METHOD_NOT_FOUND: i64 = -32601;
/// Invalid method parameters.
pub const INVALID_PARAMS: i64 = -32602;
/// Internal JSON-RPC error.
pub const INTERNAL_ERROR: i64 = -32603;

/// Network, HTTP status, or body decoding failure.
pub const TRANSPORT_ERROR: i64 = -32000;
/// The client or transport has been closed.
pub const CONNECTION_CLOSED: i64 = -32001;
/// A caller-supplied timeout elapsed.
pub const REQUEST_TIMEOUT: i64 = -32002;
/// The caller cancelled the request.
pub const REQUEST_CANCELLED: i64 = -32003;
/// Authorization was required and could not be obtained.
pub const UNAUTHORIZED: i64 = -32004;
/// The server did not advertise the capability needed for a method.
pub const CAPABILITY_NOT_SUPPORTED: i64 = -32005;
/// A method was invoked before the handshake completed.
pub const NOT_INITIALIZED: i64 = -32006;

/// Boxed error used as the optional cause of transport failures.
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Main error type for mcpwire operations
#[derive(Error, Debug)]
pub enum McpError {
    /// Network failure, unreadable body, or unexpected content type
    #[error("MCP transport error: {message}")]
    Transport {
        /// Human-readable description
        message: String,
        /// Underlying cause, when one exists
        #[source]
        source: Option<BoxError>,
    },

    /// Non-success HTTP status returned by the server
    #[error("MCP transport error: HTTP {status}: {body}")]
    HttpStatus {
        /// Response status code
        status: u16,
        /// Response body text (may be empty)
        body: String,
    },

    /// Malformed envelope, unknown response id, or unexpected server message
    #[error("MCP protocol error: {message}")]
    Protocol {
        /// Human-readable description
        message: String,
        /// Validation detail, when available
        data: Option<serde_json::Value>,
    },

    /// JSON-RPC `error` object returned by the server
    #[error("{message}")]
    Rpc {
        /// Server-provided error code
        code: i64,
        /// Server-provided message
        message: String,
        /// Server-provided structured data
        data: Option<serde_json::Value>,
    },

    /// 401 without a usable auth provider, or a failed authorization flow
    #[error("MCP authorization error: {0}")]
    Unauthorized(String),

    /// The caller cancelled the request
    #[error("Request was aborted: {method}")]
    Cancelled {
        /// Method of the aborted request
        method: String,
    },

    /// The caller-supplied timeout elapsed before a reply arrived
    #[error("Request timed out after {elapsed_ms}ms: {method}")]
    Timeout {
        /// Method of the timed-out request
        method: String,
        /// Configured timeout in milliseconds
        elapsed_ms: u128,
    },

    /// The server did not advertise a capability required by the method
    #[error("Server does not support {capability}")]
    CapabilityNotSupported {
        /// Capability family (`tools`, `resources`, `prompts`)
        capability: &'static str,
    },

    /// The method is outside the set this client knows how to issue
    #[error("Unsupported method: {0}")]
    UnsupportedMethod(String),

    /// A request was attempted before the handshake completed
    #[error("MCP client is not initialized")]
    NotInitialized,

    /// The client or transport has been closed
    #[error("Connection closed")]
    Closed,

    /// The server selected a protocol version this client does not speak
    #[error("Server's protocol version is not supported: {got}")]
    UnsupportedProtocolVersion {
        /// Version returned by the server
        got: String,
        /// Versions this client accepts
        supported: Vec<String>,
    },

    /// Configuration-related errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// IO errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization errors
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// YAML parsing errors
    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    /// HTTP client errors
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// URL parsing errors
    #[error("Invalid URL: {0}")]
    Url(#[from] url::ParseError),
}

impl McpError {
    /// Build a [`McpError::Transport`] without a cause.
    pub fn transport(message: impl Into<String>) -> Self {
        Self::Transport {
            message: message.into(),
            source: None,
        }
    }

    /// Build a [`McpError::Transport`] wrapping `source`.
    pub fn transport_with(message: impl Into<String>, source: impl Into<BoxError>) -> Self {
        Self::Transport {
            message: message.into(),
            source: Some(source.into()),
        }
    }

    /// Build a [`McpError::Protocol`] without data.
    pub fn protocol(message: impl Into<String>) -> Self {
        Self::Protocol {
            message: message.into(),
            data: None,
        }
    }

    /// The JSON-RPC error code associated with this error.
    ///
    /// Server-reported errors keep the server's code; client-local failures
    /// map to the standard JSON-RPC codes or to the `-32000..=-32006`
    /// implementation range defined in this module.
    ///
    /// # Examples
    ///
    /// ```
    /// use mcpwire::error::{McpError, CONNECTION_CLOSED};
    ///
    /// assert_eq!(McpError::Closed.code(), CONNECTION_CLOSED);
    /// let rpc = McpError::Rpc { code: -32042, message: "nope".into(), data: None };
    /// assert_eq!(rpc.code(), -32042);
    /// ```
    pub fn code(&self) -> i64 {
        match self {
            Self::Rpc { code, .. } => *code,
            Self::Transport { .. } | Self::HttpStatus { .. } | Self::Http(_) | Self::Io(_) => {
                TRANSPORT_ERROR
            }
            Self::Protocol { .. } | Self::UnsupportedProtocolVersion { .. } => INVALID_REQUEST,
            Self::Serialization(_) => PARSE_ERROR,
            Self::Unauthorized(_) => UNAUTHORIZED,
            Self::Cancelled { .. } => REQUEST_CANCELLED,
            Self::Timeout { .. } => REQUEST_TIMEOUT,
            Self::CapabilityNotSupported { .. } => CAPABILITY_NOT_SUPPORTED,
            Self::UnsupportedMethod(_) => METHOD_NOT_FOUND,
            Self::NotInitialized => NOT_INITIALIZED,
            Self::Closed => CONNECTION_CLOSED,
            Self::Config(_) | Self::Yaml(_) | Self::Url(_) => INVALID_PARAMS,
        }
    }

    /// Structured data attached to the error, if any.
    pub fn data(&self) -> Option<&serde_json::Value> {
        match self {
            Self::Rpc { data, .. } | Self::Protocol { data, .. } => data.as_ref(),
            _ => None,
        }
    }
}

/// Result type alias for mcpwire library operations
///
/// The binary layers `anyhow` on top of this for command-level context.
pub type Result<T> = std::result::Result<T, McpError>;

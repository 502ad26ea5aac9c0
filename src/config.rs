//! Configuration management for mcpwire
//!
//! This module handles loading, parsing, validating, and managing
//! configuration from files, environment variables, and CLI overrides.
//! Later sources win: file, then `MCPWIRE_*` environment variables, then
//! command-line flags.

use crate::error::{McpError, Result};
use crate::mcp::auth::{AuthProvider, StaticTokenProvider};
use crate::mcp::client::RequestOptions;
use crate::mcp::protocol::ClientOptions;
use crate::mcp::transport::{ReconnectOptions, TransportConfig};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

/// Main configuration structure for mcpwire
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// Which server to talk to and how
    #[serde(default)]
    pub server: ServerConfig,
    /// Client identity and request defaults
    #[serde(default)]
    pub client: ClientConfig,
    /// Inbound stream reconnection policy (Streamable HTTP only)
    #[serde(default)]
    pub reconnect: ReconnectConfig,
    /// Log output settings
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Transport used to reach the server
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum TransportKind {
    /// Streamable HTTP
    #[default]
    Http,
    /// Legacy HTTP+SSE
    Sse,
    /// Child process over stdin/stdout
    Stdio,
}

impl std::str::FromStr for TransportKind {
    type Err = McpError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "http" => Ok(Self::Http),
            "sse" => Ok(Self::Sse),
            "stdio" => Ok(Self::Stdio),
            other => Err(McpError::Config(format!(
                "Invalid transport: {other}. Must be one of: http, sse, stdio"
            ))),
        }
    }
}

/// Server connection settings
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Transport kind
    #[serde(default)]
    pub transport: TransportKind,

    /// Endpoint URL (http and sse)
    #[serde(default)]
    pub url: Option<String>,

    /// Executable to spawn (stdio)
    #[serde(default)]
    pub command: Option<String>,

    /// Arguments for `command`
    #[serde(default)]
    pub args: Vec<String>,

    /// Extra environment for `command`
    #[serde(default)]
    pub env: HashMap<String, String>,

    /// Working directory for `command`
    #[serde(default)]
    pub cwd: Option<PathBuf>,

    /// Extra HTTP headers sent on every request
    #[serde(default)]
    pub headers: HashMap<String, String>,

    /// Static bearer token
    #[serde(default)]
    pub bearer_token: Option<String>,
}

/// Client identity and request defaults
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClientConfig {
    /// `clientInfo.name`
    #[serde(default = "default_client_name")]
    pub name: String,

    /// `clientInfo.version`
    #[serde(default = "default_client_version")]
    pub version: String,

    /// Per-request timeout; unset means wait indefinitely
    #[serde(default)]
    pub request_timeout_seconds: Option<u64>,
}

fn default_client_name() -> String {
    crate::mcp::protocol::DEFAULT_CLIENT_NAME.to_string()
}

fn default_client_version() -> String {
    crate::mcp::protocol::DEFAULT_CLIENT_VERSION.to_string()
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            name: default_client_name(),
            version: default_client_version(),
            request_timeout_seconds: None,
        }
    }
}

/// Reconnection policy for the inbound event stream
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReconnectConfig {
    /// Delay before the first reconnect (milliseconds)
    #[serde(default = "default_initial_delay_ms")]
    pub initial_delay_ms: u64,

    /// Upper bound on any delay (milliseconds)
    #[serde(default = "default_max_delay_ms")]
    pub max_delay_ms: u64,

    /// Multiplier applied per attempt
    #[serde(default = "default_growth_factor")]
    pub growth_factor: f64,

    /// Reconnects attempted before giving up
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
}

fn default_initial_delay_ms() -> u64 {
    1000
}

fn default_max_delay_ms() -> u64 {
    30_000
}

fn default_growth_factor() -> f64 {
    1.5
}

fn default_max_retries() -> u32 {
    2
}

impl Default for ReconnectConfig {
    fn default() -> Self {
        Self {
            initial_delay_ms: default_initial_delay_ms(),
            max_delay_ms: default_max_delay_ms(),
            growth_factor: default_growth_factor(),
            max_retries: default_max_retries(),
        }
    }
}

/// Log output settings
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Emit JSON lines instead of human-readable output
    #[serde(default)]
    pub json: bool,
}

impl Config {
    /// Load configuration from file with environment and CLI overrides
    ///
    /// A missing file is not an error: defaults are used and a warning is
    /// logged.
    ///
    /// # Errors
    ///
    /// Returns error if the file exists but cannot be read or parsed
    pub fn load(path: &str, cli: &crate::cli::Cli) -> Result<Self> {
        let mut config = if Path::new(path).exists() {
            Self::from_file(path)?
        } else {
            tracing::warn!("Config file not found at {}, using defaults", path);
            Self::default()
        };

        config.apply_env_vars();
        config.apply_cli_overrides(cli);

        Ok(config)
    }

    fn from_file(path: &str) -> Result<Self> {
        let contents = std::fs::read_to_string(path)
            .map_err(|e| McpError::Config(format!("Failed to read config file: {}", e)))?;
        serde_yaml::from_str(&contents)
            .map_err(|e| McpError::Config(format!("Failed to parse config: {}", e)))
    }

    fn apply_env_vars(&mut self) {
        if let Ok(url) = std::env::var("MCPWIRE_SERVER_URL") {
            self.server.url = Some(url);
        }

        if let Ok(transport) = std::env::var("MCPWIRE_TRANSPORT") {
            match transport.parse() {
                Ok(kind) => self.server.transport = kind,
                Err(_) => tracing::warn!("Invalid MCPWIRE_TRANSPORT: {}", transport),
            }
        }

        if let Ok(token) = std::env::var("MCPWIRE_BEARER_TOKEN") {
            self.server.bearer_token = Some(token);
        }

        if let Ok(name) = std::env::var("MCPWIRE_CLIENT_NAME") {
            self.client.name = name;
        }

        if let Ok(timeout) = std::env::var("MCPWIRE_REQUEST_TIMEOUT_SECONDS") {
            if let Ok(value) = timeout.parse() {
                self.client.request_timeout_seconds = Some(value);
            } else {
                tracing::warn!("Invalid MCPWIRE_REQUEST_TIMEOUT_SECONDS: {}", timeout);
            }
        }

        if let Ok(retries) = std::env::var("MCPWIRE_MAX_RETRIES") {
            if let Ok(value) = retries.parse() {
                self.reconnect.max_retries = value;
            } else {
                tracing::warn!("Invalid MCPWIRE_MAX_RETRIES: {}", retries);
            }
        }
    }

    fn apply_cli_overrides(&mut self, cli: &crate::cli::Cli) {
        if let Some(url) = &cli.url {
            self.server.url = Some(url.clone());
        }
        if let Some(transport) = cli.transport {
            self.server.transport = transport;
        }
        if cli.verbose {
            tracing::debug!("Verbose mode enabled");
        }
    }

    /// Validate the configuration
    ///
    /// # Errors
    ///
    /// Returns [`McpError::Config`] describing the first failed check
    pub fn validate(&self) -> Result<()> {
        match self.server.transport {
            TransportKind::Http | TransportKind::Sse => {
                let url = self.server.url.as_deref().unwrap_or_default();
                if url.is_empty() {
                    return Err(McpError::Config(
                        "server.url is required for http and sse transports".to_string(),
                    ));
                }
                let parsed = url::Url::parse(url)
                    .map_err(|e| McpError::Config(format!("Invalid server.url: {}", e)))?;
                if !matches!(parsed.scheme(), "http" | "https") {
                    return Err(McpError::Config(format!(
                        "server.url must use http or https, got: {}",
                        parsed.scheme()
                    )));
                }
            }
            TransportKind::Stdio => {
                if self.server.command.as_deref().unwrap_or_default().is_empty() {
                    return Err(McpError::Config(
                        "server.command is required for the stdio transport".to_string(),
                    ));
                }
            }
        }

        if self.client.name.trim().is_empty() {
            return Err(McpError::Config("client.name cannot be empty".to_string()));
        }

        if self.reconnect.growth_factor < 1.0 {
            return Err(McpError::Config(
                "reconnect.growth_factor must be at least 1.0".to_string(),
            ));
        }

        if self.reconnect.initial_delay_ms > self.reconnect.max_delay_ms {
            return Err(McpError::Config(
                "reconnect.initial_delay_ms must not exceed reconnect.max_delay_ms".to_string(),
            ));
        }

        Ok(())
    }

    /// Describe the configured transport.
    ///
    /// # Errors
    ///
    /// Returns [`McpError::Config`] if required fields are missing, or
    /// [`McpError::Url`] if the URL does not parse. Call
    /// [`Config::validate`] first for friendlier messages.
    pub fn to_transport_config(&self) -> Result<TransportConfig> {
        let server = &self.server;
        match server.transport {
            TransportKind::Http => {
                let auth_provider = server.bearer_token.as_ref().map(|token| {
                    Arc::new(StaticTokenProvider::new(token.clone())) as Arc<dyn AuthProvider>
                });
                Ok(TransportConfig::Http {
                    url: self.server_url()?,
                    headers: server.headers.clone(),
                    auth_provider,
                    reconnect: self.reconnect_options(),
                })
            }
            TransportKind::Sse => {
                let mut headers = server.headers.clone();
                if let Some(token) = &server.bearer_token {
                    headers.insert("Authorization".to_string(), format!("Bearer {token}"));
                }
                Ok(TransportConfig::Sse {
                    url: self.server_url()?,
                    headers,
                })
            }
            TransportKind::Stdio => Ok(TransportConfig::Stdio {
                command: server.command.clone().ok_or_else(|| {
                    McpError::Config("server.command is required for the stdio transport".into())
                })?,
                args: server.args.clone(),
                env: server.env.clone(),
                cwd: server.cwd.clone(),
            }),
        }
    }

    fn server_url(&self) -> Result<url::Url> {
        let url = self
            .server
            .url
            .as_deref()
            .ok_or_else(|| McpError::Config("server.url is required".to_string()))?;
        Ok(url::Url::parse(url)?)
    }

    /// Reconnection policy in transport terms.
    pub fn reconnect_options(&self) -> ReconnectOptions {
        ReconnectOptions {
            initial_delay: Duration::from_millis(self.reconnect.initial_delay_ms),
            max_delay: Duration::from_millis(self.reconnect.max_delay_ms),
            growth_factor: self.reconnect.growth_factor,
            max_retries: self.reconnect.max_retries,
        }
    }

    /// Client identity for the handshake.
    pub fn client_options(&self) -> ClientOptions {
        ClientOptions::default()
            .with_name(&self.client.name)
            .with_version(&self.client.version)
    }

    /// Default options for each request.
    pub fn request_options(&self) -> RequestOptions {
        RequestOptions {
            cancel: None,
            timeout: self.client.request_timeout_seconds.map(Duration::from_secs),
        }
    }
}

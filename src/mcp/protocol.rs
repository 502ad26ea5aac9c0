//! MCP protocol client over [`JsonRpcClient`]
//!
//! [`McpClient`] owns one transport and one [`JsonRpcClient`] and layers the
//! MCP session on top of them:
//!
//! - the `initialize` / `notifications/initialized` handshake, with protocol
//!   version negotiation against [`SUPPORTED_PROTOCOL_VERSIONS`];
//! - capability gating: `tools/*`, `resources/*` and `prompts/*` fail locally
//!   unless the server advertised the matching capability;
//! - typed facades for listing and invoking tools, resources and prompts,
//!   each validating the server's result before returning it;
//! - answering server-initiated `elicitation/create` requests through an
//!   application-supplied [`ElicitationHandler`].
//!
//! # Design
//!
//! The negotiated session is written once by [`McpClient::initialize`] and
//! never changes afterwards. Every check before a request runs in a fixed
//! order: closed, then not initialized, then capability, then unknown method.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, OnceLock};

use serde::de::DeserializeOwned;
use serde::Serialize;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::error::{McpError, Result, INTERNAL_ERROR, INVALID_PARAMS};
use crate::mcp::client::{start_read_loop, BoxFuture, JsonRpcClient, RequestOptions};
use crate::mcp::message::{JsonRpcError, RequestId};
use crate::mcp::transport::{create_transport, Transport, TransportConfig};
use crate::mcp::types::{
    CallToolParams, CallToolResult, ClientCapabilities, ElicitationCreateParams, ElicitationResult,
    GetPromptParams, GetPromptResult, Implementation, InitializeParams, InitializeResult,
    ListPromptsResult, ListResourceTemplatesResult, ListResourcesResult, ListToolsResult, McpTool,
    PaginatedParams, ReadResourceParams, ReadResourceResult, ServerCapabilities, Validate,
    LATEST_PROTOCOL_VERSION, METHOD_ELICITATION_CREATE, METHOD_INITIALIZE, METHOD_INITIALIZED,
    METHOD_PROMPTS_GET, METHOD_PROMPTS_LIST, METHOD_RESOURCES_LIST, METHOD_RESOURCES_READ,
    METHOD_RESOURCES_TEMPLATES_LIST, METHOD_TOOLS_CALL, METHOD_TOOLS_LIST,
    SUPPORTED_PROTOCOL_VERSIONS,
};

/// Name advertised in `clientInfo` unless overridden.
pub const DEFAULT_CLIENT_NAME: &str = "mcpwire-client";

/// Version advertised in `clientInfo` unless overridden.
pub const DEFAULT_CLIENT_VERSION: &str = "1.0.0";

/// Error code returned for `elicitation/create` when no handler is set.
const METHOD_NOT_SUPPORTED: i64 = -32000;

// ---------------------------------------------------------------------------
// Capability flag enum
// ---------------------------------------------------------------------------

/// A method family gated on a server capability.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServerCapabilityFlag {
    /// `tools/list` and `tools/call`.
    Tools,
    /// `resources/list`, `resources/read` and `resources/templates/list`.
    Resources,
    /// `prompts/list` and `prompts/get`.
    Prompts,
}

impl ServerCapabilityFlag {
    /// Capability family required by `method`.
    ///
    /// `Ok(None)` means the method needs no capability; an unknown method is
    /// rejected with [`McpError::UnsupportedMethod`].
    fn for_method(method: &str) -> Result<Option<Self>> {
        if method == METHOD_INITIALIZE {
            Ok(None)
        } else if method.starts_with("tools/") {
            Ok(Some(Self::Tools))
        } else if method.starts_with("resources/") {
            Ok(Some(Self::Resources))
        } else if method.starts_with("prompts/") {
            Ok(Some(Self::Prompts))
        } else {
            Err(McpError::UnsupportedMethod(method.to_string()))
        }
    }

    fn name(self) -> &'static str {
        match self {
            Self::Tools => "tools",
            Self::Resources => "resources",
            Self::Prompts => "prompts",
        }
    }

    fn advertised_by(self, capabilities: &ServerCapabilities) -> bool {
        match self {
            Self::Tools => capabilities.tools.is_some(),
            Self::Resources => capabilities.resources.is_some(),
            Self::Prompts => capabilities.prompts.is_some(),
        }
    }
}

// ---------------------------------------------------------------------------
// Elicitation handler trait
// ---------------------------------------------------------------------------

/// Callback invoked when the server sends an `elicitation/create` request.
///
/// Implementors present the request to the user and return the answer. An
/// `Err` is sent back to the server as `-32603 Internal error`.
///
/// # Examples
///
/// ```
/// use mcpwire::mcp::client::BoxFuture;
/// use mcpwire::mcp::message::RequestId;
/// use mcpwire::mcp::protocol::ElicitationHandler;
/// use mcpwire::mcp::types::{ElicitationAction, ElicitationCreateParams, ElicitationResult};
///
/// struct AutoDecline;
///
/// impl ElicitationHandler for AutoDecline {
///     fn create_elicitation<'a>(
///         &'a self,
///         _id: RequestId,
///         _params: ElicitationCreateParams,
///     ) -> BoxFuture<'a, mcpwire::error::Result<ElicitationResult>> {
///         Box::pin(async move {
///             Ok(ElicitationResult {
///                 action: ElicitationAction::Decline,
///                 content: None,
///             })
///         })
///     }
/// }
/// ```
pub trait ElicitationHandler: Send + Sync {
    /// Collect structured user input for a server-initiated elicitation.
    ///
    /// # Arguments
    ///
    /// * `id` - The server's request id.
    /// * `params` - The validated elicitation parameters.
    fn create_elicitation<'a>(
        &'a self,
        id: RequestId,
        params: ElicitationCreateParams,
    ) -> BoxFuture<'a, Result<ElicitationResult>>;
}

// ---------------------------------------------------------------------------
// Client options
// ---------------------------------------------------------------------------

/// Identity and handlers for an [`McpClient`].
#[derive(Clone)]
pub struct ClientOptions {
    /// `clientInfo.name` sent at handshake.
    pub name: String,
    /// `clientInfo.version` sent at handshake.
    pub version: String,
    /// Answers `elicitation/create`; also turns on the `elicitation`
    /// client capability.
    pub elicitation_handler: Option<Arc<dyn ElicitationHandler>>,
    /// Receives every transport error and protocol violation.
    pub error_handler: Option<Arc<dyn Fn(&McpError) + Send + Sync>>,
}

impl Default for ClientOptions {
    fn default() -> Self {
        Self {
            name: DEFAULT_CLIENT_NAME.to_string(),
            version: DEFAULT_CLIENT_VERSION.to_string(),
            elicitation_handler: None,
            error_handler: None,
        }
    }
}

impl std::fmt::Debug for ClientOptions {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClientOptions")
            .field("name", &self.name)
            .field("version", &self.version)
            .field("elicitation_handler", &self.elicitation_handler.is_some())
            .field("error_handler", &self.error_handler.is_some())
            .finish()
    }
}

impl ClientOptions {
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    pub fn with_version(mut self, version: impl Into<String>) -> Self {
        self.version = version.into();
        self
    }

    pub fn with_elicitation_handler(mut self, handler: Arc<dyn ElicitationHandler>) -> Self {
        self.elicitation_handler = Some(handler);
        self
    }

    pub fn with_error_handler(mut self, handler: impl Fn(&McpError) + Send + Sync + 'static) -> Self {
        self.error_handler = Some(Arc::new(handler));
        self
    }

    fn capabilities(&self) -> ClientCapabilities {
        ClientCapabilities {
            elicitation: self
                .elicitation_handler
                .as_ref()
                .map(|_| serde_json::json!({})),
            ..Default::default()
        }
    }
}

// ---------------------------------------------------------------------------
// McpClient
// ---------------------------------------------------------------------------

/// An MCP client session bound to a single server.
///
/// # Examples
///
/// ```no_run
/// use mcpwire::mcp::client::RequestOptions;
/// use mcpwire::mcp::protocol::{ClientOptions, McpClient};
/// use mcpwire::mcp::transport::TransportConfig;
///
/// # #[tokio::main]
/// # async fn main() -> mcpwire::error::Result<()> {
/// let config = TransportConfig::Http {
///     url: url::Url::parse("http://localhost:3000/mcp")?,
///     headers: Default::default(),
///     auth_provider: None,
///     reconnect: Default::default(),
/// };
/// let client = McpClient::connect(config, ClientOptions::default()).await?;
/// let page = client.list_tools(None, &RequestOptions::default()).await?;
/// for tool in &page.tools {
///     println!("{}", tool.name);
/// }
/// client.close().await?;
/// # Ok(())
/// # }
/// ```
pub struct McpClient {
    rpc: Arc<JsonRpcClient>,
    options: ClientOptions,
    session: OnceLock<InitializeResult>,
    /// Cancellation token and task of the running read loop.
    read_loop: Mutex<Option<(CancellationToken, JoinHandle<()>)>>,
    initializing: AtomicBool,
    closed: AtomicBool,
}

impl std::fmt::Debug for McpClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("McpClient")
            .field("options", &self.options)
            .field("session", &self.session.get())
            .field("closed", &self.closed.load(Ordering::Relaxed))
            .finish_non_exhaustive()
    }
}

impl McpClient {
    /// Wrap any transport. Nothing is started until [`McpClient::initialize`].
    pub fn new(transport: Arc<dyn Transport>, options: ClientOptions) -> Self {
        Self {
            rpc: Arc::new(JsonRpcClient::new(transport)),
            options,
            session: OnceLock::new(),
            read_loop: Mutex::new(None),
            initializing: AtomicBool::new(false),
            closed: AtomicBool::new(false),
        }
    }

    /// Build the transport described by `config` and complete the handshake.
    ///
    /// # Errors
    ///
    /// Returns the transport construction error, or whatever
    /// [`McpClient::initialize`] returns.
    pub async fn connect(config: TransportConfig, options: ClientOptions) -> Result<Self> {
        let transport = create_transport(config)?;
        let client = Self::new(transport, options);
        client.initialize().await?;
        Ok(client)
    }

    /// Start the transport and perform the MCP handshake.
    ///
    /// Sends `initialize` with this client's identity and capabilities,
    /// rejects a protocol version outside [`SUPPORTED_PROTOCOL_VERSIONS`],
    /// stores the server's capabilities, and sends
    /// `notifications/initialized`. Any failure closes the client before the
    /// error is returned.
    ///
    /// # Errors
    ///
    /// - [`McpError::Closed`] if the client was closed.
    /// - [`McpError::UnsupportedProtocolVersion`] if the server picked a
    ///   version this client does not speak.
    /// - [`McpError::Protocol`] if the result does not parse.
    /// - Any transport or JSON-RPC error raised along the way.
    pub async fn initialize(&self) -> Result<&InitializeResult> {
        if self.is_closed() {
            return Err(McpError::Closed);
        }
        if let Some(session) = self.session.get() {
            return Ok(session);
        }
        if self.initializing.swap(true, Ordering::SeqCst) {
            return Err(McpError::protocol("initialize is already in progress"));
        }

        match self.handshake().await {
            Ok(result) => {
                tracing::info!(
                    "MCP session established with {} {} (protocol {})",
                    result.server_info.name,
                    result.server_info.version,
                    result.protocol_version
                );
                Ok(self.session.get_or_init(|| result))
            }
            Err(e) => {
                tracing::debug!("MCP handshake failed: {e}");
                if let Err(close_err) = self.close().await {
                    tracing::debug!("close after failed handshake: {close_err}");
                }
                Err(e)
            }
        }
    }

    async fn handshake(&self) -> Result<InitializeResult> {
        if let Some(handler) = self.options.error_handler.clone() {
            self.rpc.on_error(move |e: &McpError| handler(e)).await;
        }
        self.register_elicitation().await;

        let transport = Arc::clone(self.rpc.transport());
        let events = transport.events();
        transport.start().await?;

        let token = CancellationToken::new();
        let handle = start_read_loop(events, token.clone(), Arc::clone(&self.rpc));
        *self.read_loop.lock().await = Some((token, handle));

        let params = InitializeParams {
            protocol_version: LATEST_PROTOCOL_VERSION.to_string(),
            capabilities: self.options.capabilities(),
            client_info: Implementation::new(&self.options.name, &self.options.version),
        };
        let raw = self
            .rpc
            .request(
                METHOD_INITIALIZE,
                Some(serde_json::to_value(params)?),
                &RequestOptions::default(),
            )
            .await?;
        let result: InitializeResult = parse_result(raw)?;

        if !SUPPORTED_PROTOCOL_VERSIONS.contains(&result.protocol_version.as_str()) {
            return Err(McpError::UnsupportedProtocolVersion {
                got: result.protocol_version,
                supported: SUPPORTED_PROTOCOL_VERSIONS
                    .iter()
                    .map(|s| s.to_string())
                    .collect(),
            });
        }

        transport.set_protocol_version(&result.protocol_version).await;
        self.rpc.notify(METHOD_INITIALIZED, None).await?;
        Ok(result)
    }

    /// Install the `elicitation/create` handler. It is always present so the
    /// server gets a definite answer even when the application set none.
    async fn register_elicitation(&self) {
        let handler = self.options.elicitation_handler.clone();
        self.rpc
            .on_server_request(METHOD_ELICITATION_CREATE, move |id, params| {
                let handler = handler.clone();
                Box::pin(async move { answer_elicitation(handler, id, params).await })
            })
            .await;
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    /// The negotiated session, once the handshake has completed.
    pub fn session(&self) -> Option<&InitializeResult> {
        self.session.get()
    }

    /// Capabilities the server advertised at handshake.
    pub fn server_capabilities(&self) -> Option<&ServerCapabilities> {
        self.session.get().map(|s| &s.capabilities)
    }

    /// Server identity from the handshake.
    pub fn server_info(&self) -> Option<&Implementation> {
        self.session.get().map(|s| &s.server_info)
    }

    /// Protocol version the server selected.
    pub fn protocol_version(&self) -> Option<&str> {
        self.session.get().map(|s| s.protocol_version.as_str())
    }

    /// Whether the server advertised `capability`.
    pub fn capable(&self, capability: ServerCapabilityFlag) -> bool {
        self.server_capabilities()
            .is_some_and(|caps| capability.advertised_by(caps))
    }

    /// Issue a raw request after the session checks.
    ///
    /// # Errors
    ///
    /// In order: [`McpError::Closed`], [`McpError::NotInitialized`],
    /// [`McpError::CapabilityNotSupported`], [`McpError::UnsupportedMethod`];
    /// then anything [`JsonRpcClient::request`] returns. None of the local
    /// failures generate network traffic.
    pub async fn request(
        &self,
        method: &str,
        params: Option<serde_json::Value>,
        options: &RequestOptions,
    ) -> Result<serde_json::Value> {
        if self.is_closed() {
            return Err(McpError::Closed);
        }
        let session = self.session.get().ok_or(McpError::NotInitialized)?;
        if let Some(flag) = ServerCapabilityFlag::for_method(method)? {
            if !flag.advertised_by(&session.capabilities) {
                return Err(McpError::CapabilityNotSupported {
                    capability: flag.name(),
                });
            }
        }
        self.rpc.request(method, params, options).await
    }

    async fn typed_request<P, R>(
        &self,
        method: &str,
        params: Option<P>,
        options: &RequestOptions,
    ) -> Result<R>
    where
        P: Serialize,
        R: DeserializeOwned + Validate,
    {
        let params = params.map(serde_json::to_value).transpose()?;
        let raw = self.request(method, params, options).await?;
        parse_result(raw)
    }

    /// One page of `tools/list`.
    pub async fn list_tools(
        &self,
        params: Option<PaginatedParams>,
        options: &RequestOptions,
    ) -> Result<ListToolsResult> {
        self.typed_request(METHOD_TOOLS_LIST, params, options).await
    }

    /// Every tool, following `nextCursor` until the server stops returning one.
    pub async fn list_all_tools(&self, options: &RequestOptions) -> Result<Vec<McpTool>> {
        let mut tools = Vec::new();
        let mut cursor: Option<String> = None;

        loop {
            let page = self
                .list_tools(Some(PaginatedParams { cursor }), options)
                .await?;
            tools.extend(page.tools);

            match page.next_cursor {
                Some(c) if !c.is_empty() => cursor = Some(c),
                _ => break,
            }
        }

        Ok(tools)
    }

    /// Invoke a named tool.
    ///
    /// Cancelling `options.cancel` aborts the call with
    /// [`McpError::Cancelled`].
    pub async fn call_tool(
        &self,
        name: &str,
        arguments: Option<serde_json::Value>,
        options: &RequestOptions,
    ) -> Result<CallToolResult> {
        let params = CallToolParams {
            name: name.to_string(),
            arguments,
            meta: None,
        };
        self.typed_request(METHOD_TOOLS_CALL, Some(params), options)
            .await
    }

    pub async fn list_resources(
        &self,
        params: Option<PaginatedParams>,
        options: &RequestOptions,
    ) -> Result<ListResourcesResult> {
        self.typed_request(METHOD_RESOURCES_LIST, params, options)
            .await
    }

    pub async fn list_resource_templates(
        &self,
        params: Option<PaginatedParams>,
        options: &RequestOptions,
    ) -> Result<ListResourceTemplatesResult> {
        self.typed_request(METHOD_RESOURCES_TEMPLATES_LIST, params, options)
            .await
    }

    /// Read the contents of a resource by URI.
    pub async fn read_resource(
        &self,
        uri: &str,
        options: &RequestOptions,
    ) -> Result<ReadResourceResult> {
        let params = ReadResourceParams {
            uri: uri.to_string(),
        };
        self.typed_request(METHOD_RESOURCES_READ, Some(params), options)
            .await
    }

    pub async fn list_prompts(
        &self,
        params: Option<PaginatedParams>,
        options: &RequestOptions,
    ) -> Result<ListPromptsResult> {
        self.typed_request(METHOD_PROMPTS_LIST, params, options)
            .await
    }

    /// Render a prompt, substituting `arguments` into its template.
    pub async fn get_prompt(
        &self,
        name: &str,
        arguments: Option<HashMap<String, String>>,
        options: &RequestOptions,
    ) -> Result<GetPromptResult> {
        let params = GetPromptParams {
            name: name.to_string(),
            arguments,
        };
        self.typed_request(METHOD_PROMPTS_GET, Some(params), options)
            .await
    }

    /// Register a handler for a server notification such as
    /// `notifications/tools/list_changed`.
    pub async fn on_notification(
        &self,
        method: impl Into<String>,
        f: impl Fn(Option<serde_json::Value>) + Send + Sync + 'static,
    ) {
        self.rpc.on_notification(method, f).await;
    }

    /// Tear the session down.
    ///
    /// Stops the read loop, settles every pending request with
    /// [`McpError::Closed`], and closes the transport. Safe to call before
    /// the handshake completes, and more than once.
    pub async fn close(&self) -> Result<()> {
        if self.closed.swap(true, Ordering::SeqCst) {
            return Ok(());
        }
        let read_loop = self.read_loop.lock().await.take();
        if let Some((token, handle)) = read_loop {
            token.cancel();
            if let Err(e) = handle.await {
                tracing::debug!("MCP read loop ended abnormally: {e}");
            }
        }
        self.rpc.shutdown().await;
        self.rpc.transport().close().await
    }
}

/// Deserialize and validate a server result.
fn parse_result<T>(raw: serde_json::Value) -> Result<T>
where
    T: DeserializeOwned + Validate,
{
    let parsed: T = serde_json::from_value(raw).map_err(|e| parse_failure(e.to_string()))?;
    parsed
        .validate()
        .map_err(|e| parse_failure(e.to_string()))?;
    Ok(parsed)
}

fn parse_failure(detail: String) -> McpError {
    McpError::Protocol {
        message: "Failed to parse server response".to_string(),
        data: Some(serde_json::Value::String(detail)),
    }
}

async fn answer_elicitation(
    handler: Option<Arc<dyn ElicitationHandler>>,
    id: RequestId,
    params: Option<serde_json::Value>,
) -> std::result::Result<serde_json::Value, JsonRpcError> {
    let Some(handler) = handler else {
        return Err(JsonRpcError::new(METHOD_NOT_SUPPORTED, "Method not supported"));
    };

    let params: ElicitationCreateParams =
        serde_json::from_value(params.unwrap_or(serde_json::Value::Null)).map_err(|e| {
            JsonRpcError::new(INVALID_PARAMS, "Invalid params")
                .with_data(serde_json::Value::String(e.to_string()))
        })?;

    let result = handler
        .create_elicitation(id, params)
        .await
        .map_err(|e| {
            tracing::warn!("elicitation handler failed: {e}");
            JsonRpcError::new(INTERNAL_ERROR, "Internal error")
                .with_data(serde_json::Value::String(e.to_string()))
        })?;

    serde_json::to_value(result).map_err(|e| {
        JsonRpcError::new(INTERNAL_ERROR, "Internal error")
            .with_data(serde_json::Value::String(e.to_string()))
    })
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

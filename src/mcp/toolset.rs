//! Callable wrappers around the server's tool listing
//!
//! [`load_tools`] turns `tools/list` into [`RemoteTool`] values a host can
//! hand to its own tool loop. Each one keeps the server-side metadata and
//! forwards [`RemoteTool::execute`] to `tools/call` on the owning client.

use std::collections::HashSet;
use std::sync::Arc;

use crate::error::Result;
use crate::mcp::client::RequestOptions;
use crate::mcp::protocol::McpClient;
use crate::mcp::types::{CallToolResult, McpTool};

/// Which listed tools to expose.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum ToolSchemas {
    /// Every tool the server lists.
    #[default]
    Automatic,
    /// Only tools whose names are in the set. Names the server does not
    /// list are ignored.
    Named(HashSet<String>),
}

impl ToolSchemas {
    /// Expose only the given tool names.
    pub fn named<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::Named(names.into_iter().map(Into::into).collect())
    }

    fn admits(&self, name: &str) -> bool {
        match self {
            Self::Automatic => true,
            Self::Named(names) => names.contains(name),
        }
    }
}

/// A server tool bound to the client that can invoke it.
#[derive(Debug, Clone)]
pub struct RemoteTool {
    name: String,
    description: Option<String>,
    title: Option<String>,
    meta: Option<serde_json::Value>,
    input_schema: serde_json::Value,
    client: Arc<McpClient>,
}

impl RemoteTool {
    fn new(tool: McpTool, client: Arc<McpClient>) -> Self {
        let title = tool.annotations.as_ref().and_then(|a| a.title.clone());
        Self {
            input_schema: normalize_schema(tool.input_schema),
            name: tool.name,
            description: tool.description,
            title,
            meta: tool.meta,
            client,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn description(&self) -> Option<&str> {
        self.description.as_deref()
    }

    /// Display title from `annotations.title`.
    pub fn title(&self) -> Option<&str> {
        self.title.as_deref()
    }

    /// The server's `_meta` object, untouched.
    pub fn meta(&self) -> Option<&serde_json::Value> {
        self.meta.as_ref()
    }

    /// Input schema, always an object schema.
    pub fn input_schema(&self) -> &serde_json::Value {
        &self.input_schema
    }

    /// Function-calling style definition of this tool.
    pub fn tool_definition(&self) -> serde_json::Value {
        serde_json::json!({
            "name": self.name,
            "description": self.description.clone().unwrap_or_default(),
            "parameters": self.input_schema,
        })
    }

    /// Invoke the tool with `tools/call`.
    ///
    /// # Errors
    ///
    /// Same as [`McpClient::call_tool`].
    pub async fn execute(
        &self,
        arguments: serde_json::Value,
        options: &RequestOptions,
    ) -> Result<CallToolResult> {
        self.client
            .call_tool(&self.name, Some(arguments), options)
            .await
    }
}

/// List the server's tools and wrap the ones `schemas` admits.
///
/// # Errors
///
/// Returns whatever [`McpClient::list_all_tools`] returns.
pub async fn load_tools(
    client: &Arc<McpClient>,
    schemas: &ToolSchemas,
    options: &RequestOptions,
) -> Result<Vec<RemoteTool>> {
    let tools = client.list_all_tools(options).await?;
    let selected: Vec<_> = tools
        .into_iter()
        .filter(|tool| schemas.admits(&tool.name))
        .map(|tool| RemoteTool::new(tool, Arc::clone(client)))
        .collect();
    tracing::debug!("loaded {} MCP tool(s)", selected.len());
    Ok(selected)
}

/// Force an object schema with `properties` present and no extra keys.
fn normalize_schema(schema: serde_json::Value) -> serde_json::Value {
    let mut object = match schema {
        serde_json::Value::Object(map) => map,
        _ => serde_json::Map::new(),
    };
    object.insert("type".into(), serde_json::json!("object"));
    object
        .entry("properties")
        .or_insert_with(|| serde_json::json!({}));
    object.insert("additionalProperties".into(), serde_json::json!(false));
    serde_json::Value::Object(object)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mcp::protocol::ClientOptions;
    use crate::mcp::transport::fake::FakeTransport;
    use crate::mcp::types::{LATEST_PROTOCOL_VERSION, METHOD_INITIALIZE, METHOD_TOOLS_CALL, METHOD_TOOLS_LIST};
    use serde_json::json;

    #[test]
    fn test_normalize_schema_fills_defaults() {
        let schema = normalize_schema(json!({ "type": "object" }));
        assert_eq!(
            schema,
            json!({ "type": "object", "properties": {}, "additionalProperties": false })
        );
    }

    #[test]
    fn test_normalize_schema_keeps_properties_and_required() {
        let schema = normalize_schema(json!({
            "type": "object",
            "properties": { "q": { "type": "string" } },
            "required": ["q"],
            "additionalProperties": true
        }));
        assert_eq!(schema["properties"]["q"]["type"], "string");
        assert_eq!(schema["required"], json!(["q"]));
        assert_eq!(schema["additionalProperties"], false);
    }

    #[test]
    fn test_named_schemas_admit_only_listed() {
        let schemas = ToolSchemas::named(["echo"]);
        assert!(schemas.admits("echo"));
        assert!(!schemas.admits("add"));
        assert!(ToolSchemas::Automatic.admits("anything"));
    }

    #[tokio::test]
    async fn test_load_and_execute_named_tool() {
        let (transport, mut handle) = FakeTransport::new();
        let client = Arc::new(McpClient::new(Arc::new(transport), ClientOptions::default()));

        let init = {
            let client = Arc::clone(&client);
            tokio::spawn(async move { client.initialize().await.map(|_| ()) })
        };
        let request = handle.next_request_for(METHOD_INITIALIZE).await;
        handle.respond(
            request.id,
            json!({
                "protocolVersion": LATEST_PROTOCOL_VERSION,
                "capabilities": { "tools": {} },
                "serverInfo": { "name": "s", "version": "1" }
            }),
        );
        init.await.unwrap().unwrap();

        let load = {
            let client = Arc::clone(&client);
            tokio::spawn(async move {
                load_tools(
                    &client,
                    &ToolSchemas::named(["echo", "missing"]),
                    &RequestOptions::default(),
                )
                .await
            })
        };
        let request = handle.next_request_for(METHOD_TOOLS_LIST).await;
        handle.respond(
            request.id,
            json!({
                "tools": [
                    {
                        "name": "echo",
                        "description": "Echo input",
                        "inputSchema": { "type": "object" },
                        "annotations": { "title": "Echo" },
                        "_meta": { "origin": "test" }
                    },
                    { "name": "add", "inputSchema": { "type": "object" } }
                ]
            }),
        );
        let tools = load.await.unwrap().unwrap();
        assert_eq!(tools.len(), 1);
        let echo = tools.into_iter().next().unwrap();
        assert_eq!(echo.title(), Some("Echo"));
        assert_eq!(echo.meta(), Some(&json!({ "origin": "test" })));
        assert_eq!(echo.tool_definition()["parameters"]["additionalProperties"], false);

        let call = tokio::spawn(async move {
            echo.execute(json!({ "text": "hi" }), &RequestOptions::default())
                .await
        });
        let request = handle.next_request_for(METHOD_TOOLS_CALL).await;
        let params = request.params.unwrap();
        assert_eq!(params["name"], "echo");
        assert_eq!(params["arguments"], json!({ "text": "hi" }));
        handle.respond(
            request.id,
            json!({ "content": [{ "type": "text", "text": "hi" }] }),
        );
        assert!(!call.await.unwrap().unwrap().is_error());
    }
}

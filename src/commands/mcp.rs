//! MCP command handlers
//!
//! Each handler connects with the configured transport, performs one
//! operation, prints the result, and closes the client.

use std::collections::HashMap;

use anyhow::{Context, Result};
use colored::Colorize;
use prettytable::{cell, row, Table};

use crate::config::Config;
use crate::mcp::protocol::McpClient;
use crate::mcp::types::{
    CallToolResult, Content, GetPromptResult, PaginatedParams, Prompt, ReadResourceResult,
    Resource, ResourceContents, ResourceTemplate, ServerCapabilities,
};

/// Connect using `config`, run `op`, and always close the client.
async fn with_client<T, F>(config: &Config, op: F) -> Result<T>
where
    F: for<'a> FnOnce(&'a McpClient) -> crate::mcp::client::BoxFuture<'a, Result<T>>,
{
    let transport = config
        .to_transport_config()
        .context("Invalid server configuration")?;
    let client = McpClient::connect(transport, config.client_options())
        .await
        .context("Failed to connect to MCP server")?;

    let outcome = op(&client).await;
    if let Err(e) = client.close().await {
        tracing::debug!("Error while closing MCP client: {e}");
    }
    outcome
}

/// `tools`: list every tool.
pub async fn list_tools(config: &Config) -> Result<()> {
    let options = config.request_options();
    let tools = with_client(config, |client| {
        Box::pin(async move {
            client
                .list_all_tools(&options)
                .await
                .context("tools/list failed")
        })
    })
    .await?;

    let mut table = Table::new();
    table.add_row(row!["Name", "Title", "Description"]);
    for tool in &tools {
        let title = tool
            .title
            .clone()
            .or_else(|| tool.annotations.as_ref().and_then(|a| a.title.clone()))
            .unwrap_or_default();
        table.add_row(row![tool.name, title, tool.description.as_deref().unwrap_or("")]);
    }
    println!("\n{} tool(s):\n", tools.len());
    table.printstd();
    println!();
    Ok(())
}

/// `call`: invoke one tool with JSON arguments.
pub async fn call_tool(config: &Config, name: &str, args: &str) -> Result<()> {
    let arguments: serde_json::Value =
        serde_json::from_str(args).context("--args must be valid JSON")?;
    if !arguments.is_object() {
        anyhow::bail!("--args must be a JSON object");
    }

    let options = config.request_options();
    let name = name.to_string();
    let result = with_client(config, |client| {
        Box::pin(async move {
            client
                .call_tool(&name, Some(arguments), &options)
                .await
                .with_context(|| format!("tools/call `{name}` failed"))
        })
    })
    .await?;

    if result.is_error() {
        println!("{}", "Tool reported an error:".red().bold());
    }
    println!("{}", render_call_result(&result));
    Ok(())
}

/// `resources`: list every resource.
pub async fn list_resources(config: &Config) -> Result<()> {
    let options = config.request_options();
    let resources: Vec<Resource> = with_client(config, |client| {
        Box::pin(async move {
            let mut items = Vec::new();
            let mut cursor = None;
            loop {
                let page = client
                    .list_resources(Some(PaginatedParams { cursor }), &options)
                    .await
                    .context("resources/list failed")?;
                items.extend(page.resources);
                match page.next_cursor {
                    Some(c) if !c.is_empty() => cursor = Some(c),
                    _ => break,
                }
            }
            Ok(items)
        })
    })
    .await?;

    let mut table = Table::new();
    table.add_row(row!["URI", "Name", "MIME Type"]);
    for resource in &resources {
        table.add_row(row![
            resource.uri,
            resource.name,
            resource.mime_type.as_deref().unwrap_or("")
        ]);
    }
    println!("\n{} resource(s):\n", resources.len());
    table.printstd();
    println!();
    Ok(())
}

/// `templates`: list every resource template.
pub async fn list_resource_templates(config: &Config) -> Result<()> {
    let options = config.request_options();
    let templates: Vec<ResourceTemplate> = with_client(config, |client| {
        Box::pin(async move {
            let mut items = Vec::new();
            let mut cursor = None;
            loop {
                let page = client
                    .list_resource_templates(Some(PaginatedParams { cursor }), &options)
                    .await
                    .context("resources/templates/list failed")?;
                items.extend(page.resource_templates);
                match page.next_cursor {
                    Some(c) if !c.is_empty() => cursor = Some(c),
                    _ => break,
                }
            }
            Ok(items)
        })
    })
    .await?;

    let mut table = Table::new();
    table.add_row(row!["URI Template", "Name", "Description"]);
    for template in &templates {
        table.add_row(row![
            template.uri_template,
            template.name,
            template.description.as_deref().unwrap_or("")
        ]);
    }
    println!("\n{} template(s):\n", templates.len());
    table.printstd();
    println!();
    Ok(())
}

/// `read`: print a resource's contents.
pub async fn read_resource(config: &Config, uri: &str) -> Result<()> {
    let options = config.request_options();
    let uri = uri.to_string();
    let result = with_client(config, |client| {
        Box::pin(async move {
            client
                .read_resource(&uri, &options)
                .await
                .with_context(|| format!("resources/read `{uri}` failed"))
        })
    })
    .await?;
    println!("{}", render_resource(&result));
    Ok(())
}

/// `prompts`: list every prompt.
pub async fn list_prompts(config: &Config) -> Result<()> {
    let options = config.request_options();
    let prompts: Vec<Prompt> = with_client(config, |client| {
        Box::pin(async move {
            let mut items = Vec::new();
            let mut cursor = None;
            loop {
                let page = client
                    .list_prompts(Some(PaginatedParams { cursor }), &options)
                    .await
                    .context("prompts/list failed")?;
                items.extend(page.prompts);
                match page.next_cursor {
                    Some(c) if !c.is_empty() => cursor = Some(c),
                    _ => break,
                }
            }
            Ok(items)
        })
    })
    .await?;

    let mut table = Table::new();
    table.add_row(row!["Name", "Arguments", "Description"]);
    for prompt in &prompts {
        let arguments = prompt
            .arguments
            .iter()
            .map(|a| {
                if a.required.unwrap_or(false) {
                    format!("{}*", a.name)
                } else {
                    a.name.clone()
                }
            })
            .collect::<Vec<_>>()
            .join(", ");
        table.add_row(row![
            prompt.name,
            arguments,
            prompt.description.as_deref().unwrap_or("")
        ]);
    }
    println!("\n{} prompt(s):\n", prompts.len());
    table.printstd();
    println!();
    Ok(())
}

/// `prompt`: render a prompt with `KEY=VALUE` arguments.
pub async fn get_prompt(config: &Config, name: &str, args: Vec<(String, String)>) -> Result<()> {
    let options = config.request_options();
    let name = name.to_string();
    let arguments: HashMap<String, String> = args.into_iter().collect();
    let arguments = (!arguments.is_empty()).then_some(arguments);
    let result = with_client(config, |client| {
        Box::pin(async move {
            client
                .get_prompt(&name, arguments, &options)
                .await
                .with_context(|| format!("prompts/get `{name}` failed"))
        })
    })
    .await?;
    println!("{}", render_prompt(&result));
    Ok(())
}

/// `ping-info`: show what the handshake negotiated.
pub async fn ping_info(config: &Config) -> Result<()> {
    let (version, server, capabilities, instructions) = with_client(config, |client| {
        Box::pin(async move {
            let session = client
                .session()
                .context("MCP session missing after handshake")?;
            Ok((
                session.protocol_version.clone(),
                session.server_info.clone(),
                session.capabilities.clone(),
                session.instructions.clone(),
            ))
        })
    })
    .await?;

    println!("{} {}", "Connected:".green().bold(), server.name);
    println!("  Server version:   {}", server.version);
    println!("  Protocol version: {}", version.cyan());
    println!("  Capabilities:     {}", format_capabilities(&capabilities));
    if let Some(instructions) = instructions {
        println!("  Instructions:     {}", instructions);
    }
    Ok(())
}

/// Comma-separated capability families, or `none`.
pub(crate) fn format_capabilities(caps: &ServerCapabilities) -> String {
    let mut names = Vec::new();
    if caps.tools.is_some() {
        names.push("tools");
    }
    if caps.resources.is_some() {
        names.push("resources");
    }
    if caps.prompts.is_some() {
        names.push("prompts");
    }
    if caps.logging.is_some() {
        names.push("logging");
    }
    if caps.completions.is_some() {
        names.push("completions");
    }
    if names.is_empty() {
        "none".to_string()
    } else {
        names.join(", ")
    }
}

fn render_content(content: &Content) -> String {
    match content {
        Content::Text { text } => text.clone(),
        Content::Image { mime_type, data } => format!("[image {mime_type}, {} bytes base64]", data.len()),
        Content::Audio { mime_type, data } => format!("[audio {mime_type}, {} bytes base64]", data.len()),
        Content::Resource { resource } => render_resource_contents(resource),
    }
}

fn render_resource_contents(contents: &ResourceContents) -> String {
    match contents {
        ResourceContents::Text(text) => text.text.clone(),
        ResourceContents::Blob(blob) => format!(
            "[blob {} {}, {} bytes base64]",
            blob.uri,
            blob.mime_type.as_deref().unwrap_or("application/octet-stream"),
            blob.blob.len()
        ),
    }
}

pub(crate) fn render_call_result(result: &CallToolResult) -> String {
    match result {
        CallToolResult::Content(result) => {
            let mut blocks: Vec<String> = result.content.iter().map(render_content).collect();
            if let Some(structured) = &result.structured_content {
                blocks.push(structured.to_string());
            }
            blocks.join("\n")
        }
        CallToolResult::Legacy { tool_result } => tool_result.to_string(),
    }
}

fn render_resource(result: &ReadResourceResult) -> String {
    result
        .contents
        .iter()
        .map(render_resource_contents)
        .collect::<Vec<_>>()
        .join("\n")
}

fn render_prompt(result: &GetPromptResult) -> String {
    let mut lines = Vec::new();
    if let Some(description) = &result.description {
        lines.push(description.dimmed().to_string());
    }
    for message in &result.messages {
        let role = format!("{:?}", message.role).to_lowercase();
        lines.push(format!("{}: {}", role.bold(), render_content(&message.content)));
    }
    lines.join("\n")
}

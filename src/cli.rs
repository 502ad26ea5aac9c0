//! Command-line interface definition for mcpwire
//!
//! This module defines the CLI structure using clap's derive API: global
//! connection overrides plus one subcommand per MCP operation.

use clap::{Parser, Subcommand};

use crate::config::TransportKind;

/// mcpwire - Model Context Protocol client
///
/// Connect to an MCP server over Streamable HTTP, legacy SSE, or stdio and
/// inspect or invoke its tools, resources and prompts.
#[derive(Parser, Debug, Clone)]
#[command(name = "mcpwire")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Path to configuration file
    #[arg(short, long, default_value = "config/config.yaml")]
    pub config: Option<String>,

    /// Enable verbose logging
    #[arg(short, long)]
    pub verbose: bool,

    /// Server URL (overrides config and MCPWIRE_SERVER_URL)
    #[arg(long, global = true)]
    pub url: Option<String>,

    /// Transport to use (overrides config and MCPWIRE_TRANSPORT)
    #[arg(long, value_enum, global = true)]
    pub transport: Option<TransportKind>,

    /// Command to execute
    #[command(subcommand)]
    pub command: Commands,
}

/// Available commands for mcpwire
#[derive(Subcommand, Debug, Clone)]
pub enum Commands {
    /// List the server's tools
    Tools,

    /// Invoke a tool
    Call {
        /// Tool name
        name: String,

        /// Tool arguments as a JSON object
        #[arg(short, long, default_value = "{}")]
        args: String,
    },

    /// List the server's resources
    Resources,

    /// List the server's resource templates
    Templates,

    /// Read a resource by URI
    Read {
        /// Resource URI
        uri: String,
    },

    /// List the server's prompts
    Prompts,

    /// Render a prompt
    Prompt {
        /// Prompt name
        name: String,

        /// Prompt argument as KEY=VALUE (repeatable)
        #[arg(short = 'a', long = "arg", value_parser = parse_key_value)]
        args: Vec<(String, String)>,
    },

    /// Show the negotiated protocol version, server info and capabilities
    PingInfo,
}

/// Parse a `KEY=VALUE` pair.
fn parse_key_value(raw: &str) -> std::result::Result<(String, String), String> {
    match raw.split_once('=') {
        Some((key, value)) if !key.is_empty() => Ok((key.to_string(), value.to_string())),
        _ => Err(format!("expected KEY=VALUE, got `{raw}`")),
    }
}

impl Cli {
    /// Parse command line arguments
    pub fn parse_args() -> Self {
        Self::parse()
    }
}

impl Default for Cli {
    fn default() -> Self {
        Self {
            config: Some("config/config.yaml".to_string()),
            verbose: false,
            url: None,
            transport: None,
            command: Commands::PingInfo,
        }
    }
}

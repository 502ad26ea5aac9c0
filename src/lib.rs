//! mcpwire - Model Context Protocol client library
//!
//! This library provides an MCP client that talks JSON-RPC 2.0 to a single
//! server over Streamable HTTP, legacy HTTP+SSE, or a child process's stdio.
//!
//! # Architecture
//!
//! The library is organized into the following modules:
//!
//! - `mcp`: envelopes, payload types, transports, the correlation engine and
//!   the protocol client
//! - `config`: Configuration management and validation
//! - `error`: Error types and result aliases
//! - `cli`: Command-line interface definition
//! - `commands`: Handlers behind the `mcpwire` binary
//!
//! # Example
//!
//! ```no_run
//! use mcpwire::mcp::{McpClient, RequestOptions};
//! use mcpwire::Config;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = Config::load("config/config.yaml", &Default::default())?;
//!     config.validate()?;
//!
//!     let client = McpClient::connect(config.to_transport_config()?, config.client_options()).await?;
//!     let tools = client.list_all_tools(&RequestOptions::default()).await?;
//!     println!("{} tools", tools.len());
//!     client.close().await?;
//!     Ok(())
//! }
//! ```

pub mod cli;
pub mod commands;
pub mod config;
pub mod error;
pub mod mcp;

// Re-export commonly used types
pub use config::Config;
pub use error::{McpError, Result};
pub use mcp::McpClient;

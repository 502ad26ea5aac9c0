//! Model Context Protocol client
//!
//! Targets protocol revision **2025-06-18**, falling back to **2025-03-26**
//! and **2024-11-05** when the server selects an older revision.
//!
//! # Module Layout
//!
//! - `message`   -- JSON-RPC 2.0 envelopes and their validation
//! - `types`     -- MCP payloads: capabilities, tools, resources, prompts,
//!   elicitation
//! - `client`    -- Transport-agnostic JSON-RPC correlation engine
//! - `protocol`  -- [`McpClient`]: handshake, capability gating, facades
//! - `toolset`   -- Listed tools as callable [`RemoteTool`] values
//! - `auth`      -- Authorization provider boundary
//! - `transport` -- `Transport` trait plus Streamable HTTP, legacy SSE and
//!   stdio implementations

pub mod auth;
pub mod client;
pub mod message;
pub mod protocol;
pub mod toolset;
pub mod transport;
pub mod types;

pub use client::RequestOptions;
pub use protocol::{ClientOptions, ElicitationHandler, McpClient};
pub use toolset::{load_tools, RemoteTool, ToolSchemas};
pub use transport::{create_transport, Transport, TransportConfig};

//! MCP Client: JSON-RPC over stdio to a single tool-host process.
//!
//! This module handles:
//! - Spawning and tearing down the tool-host child process
//! - Line-delimited JSON framing over the process stdio
//! - Request/response correlation by id, plus one-way notifications
//! - The initialize handshake and capability catalog (tools, resources)

pub mod catalog;
pub mod client;
pub mod errors;
pub mod lifecycle;
pub mod transport;
pub mod types;

// Re-exports for convenience
pub use catalog::{bootstrap, BootstrapState, Catalog};
pub use client::McpClient;
pub use errors::McpError;
pub use lifecycle::{spawn_server, ManagedServer};
pub use types::{ClientInfo, McpResource, McpToolDefinition, ServerConfig};

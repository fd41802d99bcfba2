//! MCP Client error types.

use thiserror::Error;

/// Errors that can occur during MCP client operations.
#[derive(Debug, Error)]
pub enum McpError {
    /// The tool-host process failed to start.
    #[error("failed to spawn server '{command}': {reason}")]
    SpawnFailed { command: String, reason: String },

    /// A bootstrap step (initialize, list tools, list resources) failed.
    #[error("handshake failed during '{step}': {reason}")]
    HandshakeFailed { step: String, reason: String },

    /// Byte-stream I/O failure or closed stream.
    #[error("transport error: {reason}")]
    TransportError { reason: String },

    /// The server replied with a JSON-RPC error envelope.
    #[error("server error [{code}]: {message}")]
    Remote {
        code: i32,
        message: String,
        data: Option<serde_json::Value>,
    },

    /// The reply was well-formed JSON but not the expected shape.
    #[error("unexpected reply to '{method}': {reason}")]
    ProtocolError { method: String, reason: String },

    /// No reply arrived within the configured call timeout.
    #[error("'{method}' (id {id}) timed out after {timeout_ms}ms")]
    Timeout {
        method: String,
        id: u64,
        timeout_ms: u64,
    },
}

impl McpError {
    /// Whether the remote side answered with an error envelope, as opposed to
    /// the session itself being broken.
    pub fn is_remote(&self) -> bool {
        matches!(self, McpError::Remote { .. })
    }
}

//! Agent Core error types.

use thiserror::Error;

use crate::inference::InferenceError;
use crate::mcp_client::McpError;

/// Errors that abort the current question.
///
/// Remote tool errors never show up here; they are folded into the
/// conversation as text.
#[derive(Debug, Error)]
pub enum AgentError {
    /// The completion call failed (network, HTTP, malformed reply, credential).
    #[error("completion failed: {0}")]
    Completion(#[from] InferenceError),

    /// The tool host is unreachable (stream closed, write failed).
    #[error("tool host unavailable: {0}")]
    ToolHost(#[from] McpError),
}

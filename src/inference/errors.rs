//! Completion client error types.
//!
//! These carry the context needed for log entries and for the message shown
//! to the operator; structured logging is the caller's responsibility.

use thiserror::Error;

/// Errors that can occur while asking the model for a completion.
#[derive(Debug, Error)]
pub enum InferenceError {
    /// TCP/HTTP connection to the completion endpoint failed.
    #[error("connection failed to {endpoint}: {reason}")]
    ConnectionFailed { endpoint: String, reason: String },

    /// The endpoint did not respond within the configured timeout.
    #[error("completion request timed out after {duration_secs}s")]
    Timeout { duration_secs: u64 },

    /// Non-2xx HTTP response from the endpoint.
    #[error("HTTP {status}: {body}")]
    HttpError { status: u16, body: String },

    /// The response body was not a usable chat completion.
    #[error("malformed completion response: {reason}")]
    MalformedResponse { reason: String },

    /// A tool call's arguments were not valid JSON.
    #[error("tool call parse error: {reason}")]
    ToolCallParseError { raw_response: String, reason: String },

    /// An API key was configured but resolved to nothing.
    #[error("missing credential: {name} is empty")]
    MissingCredential { name: String },
}

impl InferenceError {
    /// Whether a retry has a chance of succeeding.
    ///
    /// Rate limiting and gateway/server failures are transient; client
    /// errors and malformed payloads are not.
    pub fn is_retriable(&self) -> bool {
        matches!(
            self,
            InferenceError::ConnectionFailed { .. }
                | InferenceError::Timeout { .. }
                | InferenceError::HttpError { status: 429, .. }
                | InferenceError::HttpError {
                    status: 500..=599,
                    ..
                }
        )
    }
}

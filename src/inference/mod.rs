//! Completion client: OpenAI-compatible chat completions with tool calling.
//!
//! The orchestrator only depends on the [`CompletionClient`] trait; the
//! HTTP implementation here is one provider behind it.

pub mod client;
pub mod config;
pub mod errors;
pub mod types;

// Re-exports for convenience
pub use client::{CompletionClient, InferenceClient};
pub use config::ModelConfig;
pub use errors::InferenceError;
pub use types::{ChatMessage, CompletionResult, Role, ToolCall, ToolDefinition};

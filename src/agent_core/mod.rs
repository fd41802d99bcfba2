//! Agent Core: the question-answering loop.
//!
//! Submodules:
//! - `conversation`: Append-only message history for one question
//! - `loop_guard`: Repeat detection over consecutive tool-calling turns
//! - `tool_result`: Shapes tool replies into text for the model
//! - `orchestrator`: Drives completion turns and tool invocations
//! - `errors`: Agent-level error types

pub mod conversation;
pub mod errors;
pub mod loop_guard;
pub mod orchestrator;
pub mod tool_result;

// Re-exports for convenience
pub use conversation::Conversation;
pub use errors::AgentError;
pub use loop_guard::{GuardDecision, LoopGuard, ToolCallSignature};
pub use orchestrator::{AgentSettings, Orchestrator, QuestionOutcome, QuestionReport};

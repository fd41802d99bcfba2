//! Conversation history for a single question.
//!
//! Append-only: the full sequence is what the completion client receives on
//! every turn.

use crate::inference::types::{ChatMessage, ToolCall};

#[derive(Debug, Clone, Default)]
pub struct Conversation {
    messages: Vec<ChatMessage>,
}

impl Conversation {
    /// Start a conversation, optionally led by a system directive.
    pub fn new(system_prompt: Option<&str>) -> Self {
        let mut conversation = Self::default();
        if let Some(prompt) = system_prompt.filter(|p| !p.trim().is_empty()) {
            conversation.messages.push(ChatMessage::system(prompt));
        }
        conversation
    }

    pub fn push_user(&mut self, text: &str) {
        self.messages.push(ChatMessage::user(text));
    }

    pub fn push_assistant_text(&mut self, text: &str) {
        self.messages.push(ChatMessage::assistant(text));
    }

    pub fn push_assistant_tool_calls(&mut self, calls: &[ToolCall]) {
        self.messages.push(ChatMessage::assistant_tool_calls(calls));
    }

    pub fn push_tool_result(&mut self, tool_call_id: &str, text: &str) {
        self.messages.push(ChatMessage::tool_result(tool_call_id, text));
    }

    pub fn messages(&self) -> &[ChatMessage] {
        &self.messages
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }
}

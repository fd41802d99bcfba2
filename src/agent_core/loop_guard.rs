//! Repeat detection for tool-calling turns.
//!
//! A turn's signature is every requested call's name and serialized
//! arguments, concatenated in order. When the model asks for the exact same
//! set again and again, the guard trips so the loop can force an answer.

use crate::inference::types::ToolCall;

/// Default number of consecutive repeats that trips the guard (three
/// identical turns in a row).
pub const DEFAULT_REPEAT_LIMIT: u32 = 2;

/// "Which tools with which arguments" for one turn.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ToolCallSignature(String);

impl ToolCallSignature {
    pub fn of(calls: &[ToolCall]) -> Self {
        let mut key = String::new();
        for call in calls {
            key.push_str(&call.name);
            key.push_str(&call.arguments.to_string());
        }
        Self(key)
    }
}

/// Whether the loop may execute this turn's calls.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GuardDecision {
    Proceed,
    Trip,
}

/// Per-question repeat counter.
#[derive(Debug, Clone)]
pub struct LoopGuard {
    last_signature: Option<ToolCallSignature>,
    repeat_count: u32,
    peak_repeat_count: u32,
    limit: u32,
}

impl LoopGuard {
    pub fn new(limit: u32) -> Self {
        Self {
            last_signature: None,
            repeat_count: 0,
            peak_repeat_count: 0,
            limit: limit.max(1),
        }
    }

    /// Record this turn's signature and decide.
    pub fn observe(&mut self, signature: ToolCallSignature) -> GuardDecision {
        if self.last_signature.as_ref() == Some(&signature) {
            self.repeat_count += 1;
        } else {
            self.repeat_count = 0;
            self.last_signature = Some(signature);
        }
        self.peak_repeat_count = self.peak_repeat_count.max(self.repeat_count);

        if self.repeat_count >= self.limit {
            GuardDecision::Trip
        } else {
            GuardDecision::Proceed
        }
    }

    pub fn repeat_count(&self) -> u32 {
        self.repeat_count
    }

    /// Highest repeat count seen during this question.
    pub fn peak_repeat_count(&self) -> u32 {
        self.peak_repeat_count
    }
}

impl Default for LoopGuard {
    fn default() -> Self {
        Self::new(DEFAULT_REPEAT_LIMIT)
    }
}

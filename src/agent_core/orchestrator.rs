//! Tool invocation loop.
//!
//! Per question:
//! 1. Send the conversation plus tool catalog to the completion client
//! 2. Text reply → done
//! 3. Tool calls → record them, check the repeat guard, run each call in
//!    order through the MCP client, append the results, go to 1
//!
//! When the same set of calls comes back three turns in a row the calls are
//! not run again. Instead the model gets a summary of everything the tools
//! returned and one last chance to answer; whatever it sends back ends the
//! question, even if that is yet another tool request.

use std::sync::Arc;

use serde::Deserialize;

use super::conversation::Conversation;
use super::errors::AgentError;
use super::loop_guard::{GuardDecision, LoopGuard, ToolCallSignature, DEFAULT_REPEAT_LIMIT};
use super::tool_result::{render_call_error, render_call_result};
use crate::inference::types::{CompletionResult, ToolCall, ToolDefinition};
use crate::inference::CompletionClient;
use crate::mcp_client::{Catalog, McpClient, McpError, McpToolDefinition};

/// Tool message recorded for calls the loop guard refused to run.
const SKIPPED_CALL_NOTE: &str =
    "Not executed: this exact call was already made. See the collected results below.";

// ─── Settings ────────────────────────────────────────────────────────────────

/// Loop behaviour knobs (the `agent` section of the config file).
#[derive(Debug, Clone, Deserialize)]
pub struct AgentSettings {
    /// Directive placed before the user's question.
    #[serde(default)]
    pub system_prompt: Option<String>,
    /// Consecutive identical tool turns tolerated before forcing an answer.
    #[serde(default = "default_repeat_limit")]
    pub repeat_limit: u32,
    /// Start each question from the previous conversation.
    #[serde(default)]
    pub carry_history: bool,
}

fn default_repeat_limit() -> u32 {
    DEFAULT_REPEAT_LIMIT
}

impl Default for AgentSettings {
    fn default() -> Self {
        Self {
            system_prompt: None,
            repeat_limit: DEFAULT_REPEAT_LIMIT,
            carry_history: false,
        }
    }
}

// ─── Outcomes ────────────────────────────────────────────────────────────────

/// How a question ended.
#[derive(Debug, Clone, PartialEq)]
pub enum QuestionOutcome {
    /// The model answered on its own.
    Answer(String),
    /// The repeat guard fired and the follow-up turn produced text.
    ForcedAnswer(String),
    /// The repeat guard fired and the model still asked for tools. Best-effort
    /// terminal state: no answer is available.
    Unresolved(Vec<ToolCall>),
}

impl QuestionOutcome {
    /// The answer text, if the question ended with one.
    pub fn text(&self) -> Option<&str> {
        match self {
            QuestionOutcome::Answer(text) | QuestionOutcome::ForcedAnswer(text) => Some(text),
            QuestionOutcome::Unresolved(_) => None,
        }
    }

    /// Whether the repeat guard ended the question.
    pub fn is_forced(&self) -> bool {
        !matches!(self, QuestionOutcome::Answer(_))
    }
}

/// Outcome plus the counters gathered while reaching it.
#[derive(Debug, Clone)]
pub struct QuestionReport {
    pub outcome: QuestionOutcome,
    /// Completion round-trips made.
    pub turns: u32,
    /// `tools/call` requests issued.
    pub tool_invocations: usize,
    pub peak_repeat_count: u32,
}

/// State for one question. Discarded when the question ends.
struct QuestionSession {
    conversation: Conversation,
    guard: LoopGuard,
    history: Vec<String>,
    turns: u32,
    tool_invocations: usize,
}

// ─── Orchestrator ────────────────────────────────────────────────────────────

pub struct Orchestrator<C> {
    completion: C,
    tools: Arc<McpClient>,
    tool_definitions: Vec<ToolDefinition>,
    settings: AgentSettings,
    carried: Option<Conversation>,
}

impl<C: CompletionClient> Orchestrator<C> {
    pub fn new(
        completion: C,
        tools: Arc<McpClient>,
        catalog: &Catalog,
        settings: AgentSettings,
    ) -> Self {
        Self {
            completion,
            tools,
            tool_definitions: adapt_tools(&catalog.tools),
            settings,
            carried: None,
        }
    }

    /// Tool catalog in the shape the completion client expects.
    pub fn tool_definitions(&self) -> &[ToolDefinition] {
        &self.tool_definitions
    }

    /// Run the loop for one user question.
    ///
    /// Completion failures and a dead tool host abort the question; remote
    /// tool errors do not.
    pub async fn ask(&mut self, question: &str) -> Result<QuestionReport, AgentError> {
        let mut conversation = match (&self.carried, self.settings.carry_history) {
            (Some(previous), true) => previous.clone(),
            _ => Conversation::new(self.settings.system_prompt.as_deref()),
        };
        conversation.push_user(question);

        let mut session = QuestionSession {
            conversation,
            guard: LoopGuard::new(self.settings.repeat_limit),
            history: Vec::new(),
            turns: 0,
            tool_invocations: 0,
        };

        let outcome = self.run(&mut session).await?;

        tracing::info!(
            turns = session.turns,
            tool_invocations = session.tool_invocations,
            forced = outcome.is_forced(),
            answered = outcome.text().is_some(),
            "question finished"
        );

        if self.settings.carry_history && outcome.text().is_some() {
            self.carried = Some(session.conversation);
        }

        Ok(QuestionReport {
            outcome,
            turns: session.turns,
            tool_invocations: session.tool_invocations,
            peak_repeat_count: session.guard.peak_repeat_count(),
        })
    }

    async fn run(&self, session: &mut QuestionSession) -> Result<QuestionOutcome, AgentError> {
        loop {
            session.turns += 1;
            tracing::info!(
                turn = session.turns,
                message_count = session.conversation.len(),
                "agent turn"
            );

            let calls = match self.complete(session).await? {
                CompletionResult::Text(answer) => {
                    session.conversation.push_assistant_text(&answer);
                    return Ok(QuestionOutcome::Answer(answer));
                }
                CompletionResult::ToolCalls(calls) => calls,
            };

            tracing::info!(
                turn = session.turns,
                tools = ?calls.iter().map(|c| c.name.as_str()).collect::<Vec<_>>(),
                "model requested tools"
            );
            session.conversation.push_assistant_tool_calls(&calls);

            if session.guard.observe(ToolCallSignature::of(&calls)) == GuardDecision::Trip {
                return self.force_answer(session, &calls).await;
            }

            self.execute_calls(session, &calls).await?;
        }
    }

    async fn complete(&self, session: &QuestionSession) -> Result<CompletionResult, AgentError> {
        self.completion
            .complete(session.conversation.messages(), &self.tool_definitions)
            .await
            .map_err(|e| {
                tracing::error!(turn = session.turns, error = %e, "completion failed");
                AgentError::Completion(e)
            })
    }

    /// Run each call in order, one at a time, appending its result.
    async fn execute_calls(
        &self,
        session: &mut QuestionSession,
        calls: &[ToolCall],
    ) -> Result<(), AgentError> {
        for call in calls {
            session.tool_invocations += 1;
            tracing::info!(
                tool = %call.name,
                call_id = %call.id,
                arguments = %call.arguments,
                "calling tool"
            );

            let text = match self.tools.call_tool(&call.name, call.arguments.clone()).await {
                Ok(result) => render_call_result(&call.name, &result),
                Err(
                    e @ (McpError::Remote { .. }
                    | McpError::Timeout { .. }
                    | McpError::ProtocolError { .. }),
                ) => {
                    tracing::warn!(tool = %call.name, error = %e, "tool call failed");
                    render_call_error(&call.name, &e)
                }
                Err(e) => return Err(AgentError::ToolHost(e)),
            };

            session.history.push(text.clone());
            session.conversation.push_tool_result(&call.id, &text);
        }
        Ok(())
    }

    /// Loop guard fired: summarize, ask once more, stop regardless.
    async fn force_answer(
        &self,
        session: &mut QuestionSession,
        calls: &[ToolCall],
    ) -> Result<QuestionOutcome, AgentError> {
        tracing::warn!(
            repeat_count = session.guard.repeat_count(),
            tools = ?calls.iter().map(|c| c.name.as_str()).collect::<Vec<_>>(),
            "identical tool calls repeated, forcing a direct answer"
        );

        for call in calls {
            session.conversation.push_tool_result(&call.id, SKIPPED_CALL_NOTE);
        }
        session.conversation.push_user(&summary_prompt(&session.history));
        session.turns += 1;

        match self.complete(session).await? {
            CompletionResult::Text(answer) => {
                session.conversation.push_assistant_text(&answer);
                Ok(QuestionOutcome::ForcedAnswer(answer))
            }
            CompletionResult::ToolCalls(calls) => {
                tracing::warn!(
                    raw = %serde_json::to_string(&calls).unwrap_or_default(),
                    "model still requested tools after forced summary, stopping"
                );
                Ok(QuestionOutcome::Unresolved(calls))
            }
        }
    }
}

// ─── Helpers ─────────────────────────────────────────────────────────────────

/// Convert MCP tool definitions to function-calling definitions.
///
/// Schemas that are not JSON objects are replaced by an empty object schema;
/// a missing `properties` map is added.
pub fn adapt_tools(tools: &[McpToolDefinition]) -> Vec<ToolDefinition> {
    tools
        .iter()
        .map(|tool| {
            let mut schema = match &tool.input_schema {
                serde_json::Value::Object(map) => map.clone(),
                _ => serde_json::Map::new(),
            };
            schema
                .entry("type")
                .or_insert_with(|| serde_json::Value::String("object".into()));
            schema
                .entry("properties")
                .or_insert_with(|| serde_json::Value::Object(serde_json::Map::new()));
            ToolDefinition::function(
                &tool.name,
                &tool.description,
                serde_json::Value::Object(schema),
            )
        })
        .collect()
}

/// The synthetic user message sent when the loop guard fires.
pub fn summary_prompt(history: &[String]) -> String {
    let collected = if history.is_empty() {
        "(no tool results were collected)".to_string()
    } else {
        history
            .iter()
            .map(|h| format!("- {}", h.replace('\n', "\n  ")))
            .collect::<Vec<_>>()
            .join("\n")
    };
    format!(
        "You keep requesting the same tool calls with the same arguments. \
         Here is everything the tools returned so far:\n\n{collected}\n\n\
         Answer the original question directly using only this information. \
         Do not call any more tools."
    )
}

// ─── Tests ───────────────────────────────────────────────────────────────────

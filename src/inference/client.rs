//! OpenAI-compatible completion client.
//!
//! Sends the conversation plus tool catalog to `/chat/completions` and turns
//! the reply into a [`CompletionResult`]. Transient failures are retried a
//! bounded number of times with exponential backoff; everything else is
//! surfaced to the caller as-is.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client as HttpClient;
use serde::Deserialize;
use uuid::Uuid;

use super::config::ModelConfig;
use super::errors::InferenceError;
use super::types::{ChatCompletionRequest, ChatMessage, CompletionResult, ToolCall, ToolDefinition};

/// TCP connection timeout.
const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

// ─── CompletionClient ────────────────────────────────────────────────────────

/// Conversation + tool catalog in, model decision out.
#[async_trait]
pub trait CompletionClient: Send + Sync {
    async fn complete(
        &self,
        messages: &[ChatMessage],
        tools: &[ToolDefinition],
    ) -> Result<CompletionResult, InferenceError>;
}

// ─── InferenceClient ─────────────────────────────────────────────────────────

/// HTTP client for an OpenAI-compatible chat completions endpoint.
pub struct InferenceClient {
    http: HttpClient,
    model: ModelConfig,
}

impl InferenceClient {
    /// Build the client. Does not check connectivity.
    pub fn from_config(model: ModelConfig) -> Result<Self, InferenceError> {
        let mut builder = HttpClient::builder().connect_timeout(CONNECT_TIMEOUT);
        if let Some(secs) = model.request_timeout_secs {
            builder = builder.timeout(Duration::from_secs(secs));
        }
        let http = builder.build().map_err(|e| InferenceError::ConnectionFailed {
            endpoint: model.base_url.clone(),
            reason: format!("failed to build HTTP client: {e}"),
        })?;

        Ok(Self { http, model })
    }

    /// Display name of the configured model.
    pub fn model_name(&self) -> &str {
        &self.model.model_name
    }

    pub fn endpoint(&self) -> String {
        format!("{}/chat/completions", self.model.base_url.trim_end_matches('/'))
    }

    /// One HTTP round-trip, no retries.
    async fn send_once(&self, body: &ChatCompletionRequest) -> Result<CompletionResult, InferenceError> {
        let url = self.endpoint();
        let mut request = self.http.post(&url).json(body);
        if let Some(key) = &self.model.api_key {
            if key.trim().is_empty() {
                return Err(InferenceError::MissingCredential {
                    name: "model.api_key".into(),
                });
            }
            request = request.bearer_auth(key);
        }

        let response = request.send().await.map_err(|e| {
            if e.is_timeout() {
                InferenceError::Timeout {
                    duration_secs: self.model.request_timeout_secs.unwrap_or_default(),
                }
            } else {
                InferenceError::ConnectionFailed {
                    endpoint: url.clone(),
                    reason: e.to_string(),
                }
            }
        })?;

        let status = response.status();
        if !status.is_success() {
            let body_text = response.text().await.unwrap_or_default();
            return Err(InferenceError::HttpError {
                status: status.as_u16(),
                body: body_text,
            });
        }

        let body_text = response
            .text()
            .await
            .map_err(|e| InferenceError::MalformedResponse {
                reason: format!("failed to read response body: {e}"),
            })?;

        parse_completion_response(&body_text)
    }

    fn backoff(&self, attempt: u32) -> Duration {
        Duration::from_millis(self.model.retry_base_delay_ms.saturating_mul(1 << attempt.min(16)))
    }
}

#[async_trait]
impl CompletionClient for InferenceClient {
    async fn complete(
        &self,
        messages: &[ChatMessage],
        tools: &[ToolDefinition],
    ) -> Result<CompletionResult, InferenceError> {
        let tools = (!tools.is_empty()).then(|| tools.to_vec());
        let body = ChatCompletionRequest {
            model: self.model.model_name.clone(),
            messages: messages.to_vec(),
            tool_choice: tools.as_ref().map(|_| "auto".to_string()),
            tools,
            temperature: self.model.temperature,
            max_tokens: self.model.max_tokens,
            stream: false,
        };

        tracing::info!(
            url = %self.endpoint(),
            model = %body.model,
            message_count = body.messages.len(),
            tool_count = body.tools.as_ref().map(|t| t.len()).unwrap_or(0),
            "completion request"
        );

        let mut attempt = 0;
        loop {
            match self.send_once(&body).await {
                Ok(result) => return Ok(result),
                Err(e) if e.is_retriable() && attempt < self.model.max_retries => {
                    let delay = self.backoff(attempt);
                    tracing::warn!(
                        error = %e,
                        attempt = attempt + 1,
                        max_retries = self.model.max_retries,
                        delay_ms = delay.as_millis() as u64,
                        "completion failed, retrying"
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                Err(e) => return Err(e),
            }
        }
    }
}

// ─── Response Parsing ────────────────────────────────────────────────────────

/// Turn a non-streaming chat completion body into a [`CompletionResult`].
///
/// A non-empty `tool_calls` array wins over any accompanying text.
pub fn parse_completion_response(body: &str) -> Result<CompletionResult, InferenceError> {
    #[derive(Deserialize)]
    struct Response {
        choices: Vec<Choice>,
    }

    #[derive(Deserialize)]
    struct Choice {
        message: Message,
    }

    #[derive(Deserialize)]
    struct Message {
        content: Option<String>,
        tool_calls: Option<Vec<WireToolCall>>,
    }

    #[derive(Deserialize)]
    struct WireToolCall {
        id: Option<String>,
        function: WireFunction,
    }

    #[derive(Deserialize)]
    struct WireFunction {
        name: String,
        #[serde(default)]
        arguments: String,
    }

    let resp: Response =
        serde_json::from_str(body).map_err(|e| InferenceError::MalformedResponse {
            reason: format!("failed to parse completion response: {e}"),
        })?;

    let message = resp
        .choices
        .into_iter()
        .next()
        .ok_or(InferenceError::MalformedResponse {
            reason: "empty choices array".into(),
        })?
        .message;

    let wire_calls = message.tool_calls.unwrap_or_default();
    if wire_calls.is_empty() {
        return Ok(CompletionResult::Text(message.content.unwrap_or_default()));
    }

    let mut calls = Vec::with_capacity(wire_calls.len());
    for tc in wire_calls {
        let raw = tc.function.arguments.trim();
        let arguments = if raw.is_empty() {
            serde_json::Value::Object(serde_json::Map::new())
        } else {
            serde_json::from_str(raw).map_err(|e| InferenceError::ToolCallParseError {
                raw_response: raw.to_string(),
                reason: format!("invalid JSON arguments for '{}': {e}", tc.function.name),
            })?
        };
        calls.push(ToolCall {
            id: tc.id.unwrap_or_else(|| format!("call_{}", Uuid::new_v4())),
            name: tc.function.name,
            arguments,
        });
    }

    Ok(CompletionResult::ToolCalls(calls))
}

// ─── Tests ───────────────────────────────────────────────────────────────────

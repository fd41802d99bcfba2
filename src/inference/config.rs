//! Completion endpoint configuration.

use serde::Deserialize;

/// Which model to talk to and how.
#[derive(Debug, Clone, Deserialize)]
pub struct ModelConfig {
    /// OpenAI-compatible base URL, e.g. `https://api.openai.com/v1`.
    pub base_url: String,
    pub model_name: String,
    /// Bearer token. `None` sends no `Authorization` header (local servers);
    /// an empty string means the variable it was read from is unset.
    #[serde(default)]
    pub api_key: Option<String>,
    #[serde(default = "default_temperature")]
    pub temperature: f32,
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,
    /// Whole-request timeout. `None` waits as long as the server takes.
    #[serde(default)]
    pub request_timeout_secs: Option<u64>,
    /// Extra attempts after a transient failure. 0 disables retrying.
    #[serde(default)]
    pub max_retries: u32,
    /// First backoff delay; doubles on each further attempt.
    #[serde(default = "default_retry_base_delay_ms")]
    pub retry_base_delay_ms: u64,
}

fn default_temperature() -> f32 {
    0.2
}
fn default_max_tokens() -> u32 {
    1024
}
fn default_retry_base_delay_ms() -> u64 {
    500
}

//! Application configuration.
//!
//! One YAML file holds the model endpoint, the tool-host command and the
//! agent knobs. String values may reference the environment as `${VAR}` or
//! `${VAR:-default}`; defaults may start with `~`.
//!
//! ```yaml
//! model:
//!   base_url: "https://api.openai.com/v1"
//!   model_name: "gpt-4o-mini"
//!   api_key: "${OPENAI_API_KEY}"
//! server:
//!   command: "node"
//!   args: ["${COFFEE_SERVER:-~/coffee-mcp/dist/index.js}"]
//! agent:
//!   system_prompt: "You answer questions about the coffee shop menu."
//! ```

use std::path::{Path, PathBuf};

use serde::Deserialize;
use thiserror::Error;

use crate::agent_core::AgentSettings;
use crate::inference::ModelConfig;
use crate::mcp_client::{ClientInfo, ServerConfig};

/// File name searched for when no path is given.
pub const CONFIG_FILE_NAME: &str = "mcp-chat-client.yaml";

/// Environment variable naming the config file explicitly.
pub const CONFIG_ENV_VAR: &str = "MCP_CHAT_CLIENT_CONFIG";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("no config file found (set {CONFIG_ENV_VAR} or create {CONFIG_FILE_NAME})")]
    NotFound,

    #[error("failed to read {path}: {reason}")]
    Read { path: String, reason: String },

    #[error("failed to parse {path}: {reason}")]
    Parse { path: String, reason: String },

    #[error("invalid config: {reason}")]
    Invalid { reason: String },
}

// ─── Types ───────────────────────────────────────────────────────────────────

/// Top-level config file.
#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    pub model: ModelConfig,
    pub server: ServerConfig,
    #[serde(default)]
    pub agent: AgentSettings,
    /// Identity sent in `initialize`. Defaults to this crate's name and version.
    #[serde(default)]
    pub client_info: Option<ClientInfo>,
}

impl AppConfig {
    pub fn client_info(&self) -> ClientInfo {
        self.client_info.clone().unwrap_or_default()
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.server.command.trim().is_empty() {
            return Err(ConfigError::Invalid {
                reason: "server.command is empty".into(),
            });
        }
        if self.model.base_url.trim().is_empty() {
            return Err(ConfigError::Invalid {
                reason: "model.base_url is empty".into(),
            });
        }
        if self.model.model_name.trim().is_empty() {
            return Err(ConfigError::Invalid {
                reason: "model.model_name is empty".into(),
            });
        }
        Ok(())
    }
}

// ─── Loading ─────────────────────────────────────────────────────────────────

/// Locate the config file.
///
/// `MCP_CHAT_CLIENT_CONFIG` wins when set; otherwise search upward from
/// `start` for `mcp-chat-client.yaml`.
pub fn find_config_path(start: &Path) -> Result<PathBuf, ConfigError> {
    if let Ok(path) = std::env::var(CONFIG_ENV_VAR) {
        if !path.is_empty() {
            return Ok(PathBuf::from(expand_tilde(&path)));
        }
    }

    let mut dir = start.to_path_buf();
    loop {
        let candidate = dir.join(CONFIG_FILE_NAME);
        if candidate.is_file() {
            return Ok(candidate);
        }
        if !dir.pop() {
            break;
        }
    }

    Err(ConfigError::NotFound)
}

/// Read, interpolate, parse and validate a config file.
pub fn load_config(path: &Path) -> Result<AppConfig, ConfigError> {
    let raw = std::fs::read_to_string(path).map_err(|e| ConfigError::Read {
        path: path.display().to_string(),
        reason: e.to_string(),
    })?;

    let config = parse_config(&raw).map_err(|e| match e {
        ConfigError::Parse { reason, .. } => ConfigError::Parse {
            path: path.display().to_string(),
            reason,
        },
        other => other,
    })?;

    tracing::info!(
        path = %path.display(),
        model = %config.model.model_name,
        server = %config.server.command,
        "loaded config"
    );
    Ok(config)
}

/// Parse config text after environment interpolation.
pub fn parse_config(raw: &str) -> Result<AppConfig, ConfigError> {
    let interpolated = interpolate_env_vars(raw);
    let mut config: AppConfig =
        serde_yaml::from_str(&interpolated).map_err(|e| ConfigError::Parse {
            path: "<inline>".into(),
            reason: e.to_string(),
        })?;

    config.server.cwd = config.server.cwd.as_deref().map(expand_tilde);
    config.validate()?;
    Ok(config)
}

// ─── Env-var interpolation ───────────────────────────────────────────────────

/// Replace `${VAR}` and `${VAR:-default}` in a string.
fn interpolate_env_vars(input: &str) -> String {
    let mut result = String::with_capacity(input.len());
    let mut chars = input.chars().peekable();

    while let Some(ch) = chars.next() {
        if ch == '$' && chars.peek() == Some(&'{') {
            chars.next();
            let mut var_expr = String::new();
            for c in chars.by_ref() {
                if c == '}' {
                    break;
                }
                var_expr.push(c);
            }
            result.push_str(&resolve_var_expr(&var_expr));
        } else {
            result.push(ch);
        }
    }

    result
}

/// Resolve `VAR` or `VAR:-default`. Unset without default → empty string.
fn resolve_var_expr(expr: &str) -> String {
    if let Some(idx) = expr.find(":-") {
        let var_name = &expr[..idx];
        let default = &expr[idx + 2..];
        std::env::var(var_name).unwrap_or_else(|_| expand_tilde(default))
    } else {
        std::env::var(expr).unwrap_or_default()
    }
}

/// Expand a leading `~` to the user's home directory.
fn expand_tilde(path: &str) -> String {
    if let Some(rest) = path.strip_prefix('~') {
        if let Some(home) = dirs::home_dir() {
            return format!("{}{rest}", home.display());
        }
    }
    path.to_string()
}

// ─── Tests ───────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    const MINIMAL: &str = r#"
model:
  base_url: "http://localhost:11434/v1"
  model_name: "qwen2.5"
server:
  command: "node"
  args: ["server.js"]
"#;

    #[test]
    fn test_minimal_config_uses_defaults() {
        let config = parse_config(MINIMAL).unwrap();
        assert_eq!(config.server.args, vec!["server.js"]);
        assert!(config.server.call_timeout_secs.is_none());
        assert_eq!(config.agent.repeat_limit, 2);
        assert!(!config.agent.carry_history);
        assert!(config.agent.system_prompt.is_none());
        assert_eq!(config.client_info().name, env!("CARGO_PKG_NAME"));
    }

    #[test]
    fn test_unset_key_variable_becomes_empty() {
        std::env::remove_var("__MCP_CHAT_TEST_UNSET_KEY__");
        let raw = MINIMAL.replace(
            "model_name: \"qwen2.5\"",
            "model_name: \"qwen2.5\"\n  api_key: \"${__MCP_CHAT_TEST_UNSET_KEY__}\"",
        );
        let config = parse_config(&raw).unwrap();
        assert_eq!(config.model.api_key.as_deref(), Some(""));
    }

    #[test]
    fn test_interpolate_env_vars_with_default() {
        std::env::remove_var("__MCP_CHAT_TEST_MISSING__");
        assert_eq!(
            interpolate_env_vars("${__MCP_CHAT_TEST_MISSING__:-/fallback/path}"),
            "/fallback/path"
        );
    }

    #[test]
    fn test_interpolate_env_vars_with_value() {
        std::env::set_var("__MCP_CHAT_TEST_SET__", "/custom/path");
        assert_eq!(
            interpolate_env_vars("cmd: ${__MCP_CHAT_TEST_SET__:-/fallback}"),
            "cmd: /custom/path"
        );
        std::env::remove_var("__MCP_CHAT_TEST_SET__");
    }

    #[test]
    fn test_interpolate_no_vars() {
        let input = "price: $5 {not a var}";
        assert_eq!(interpolate_env_vars(input), input);
    }

    #[test]
    fn test_expand_tilde() {
        let result = expand_tilde("~/coffee");
        assert!(!result.starts_with('~'));
        assert!(result.ends_with("/coffee"));
        assert_eq!(expand_tilde("/abs/path"), "/abs/path");
    }

    #[test]
    fn test_empty_command_rejected() {
        let raw = MINIMAL.replace("command: \"node\"", "command: \"\"");
        assert!(matches!(
            parse_config(&raw),
            Err(ConfigError::Invalid { .. })
        ));
    }

    #[test]
    fn test_missing_section_is_parse_error() {
        let err = parse_config("model:\n  base_url: x\n  model_name: y\n").unwrap_err();
        assert!(matches!(err, ConfigError::Parse { .. }));
    }

    #[test]
    fn test_find_and_load_from_parent_dir() {
        let root = tempfile::tempdir().unwrap();
        std::fs::write(root.path().join(CONFIG_FILE_NAME), MINIMAL).unwrap();
        let nested = root.path().join("a").join("b");
        std::fs::create_dir_all(&nested).unwrap();

        let found = find_config_path(&nested).unwrap();
        assert_eq!(found, root.path().join(CONFIG_FILE_NAME));

        let config = load_config(&found).unwrap();
        assert_eq!(config.model.model_name, "qwen2.5");
    }

    #[test]
    fn test_load_missing_file_is_read_error() {
        let dir = tempfile::tempdir().unwrap();
        let err = load_config(&dir.path().join("absent.yaml")).unwrap_err();
        assert!(matches!(err, ConfigError::Read { .. }));
    }
}

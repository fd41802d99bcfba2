//! Tool result text shaping.
//!
//! Tool hosts often return a JSON document as the text of the first content
//! item (`{"names":["Latte","Mocha"]}`). When that text parses, it is
//! flattened into `key: value` lines that read well both for the model and
//! in the summary shown when the loop guard fires. Anything else passes
//! through untouched.

use serde_json::Value;

use crate::mcp_client::types::CallToolResult;
use crate::mcp_client::McpError;

/// Maximum characters kept from a single tool result.
pub const MAX_TOOL_RESULT_CHARS: usize = 6_000;

/// Text for a successful `tools/call` reply.
pub fn render_call_result(tool_name: &str, result: &CallToolResult) -> String {
    let raw = result.first_text().unwrap_or_default();
    if result.is_error {
        return format!("Error from tool '{tool_name}': {raw}");
    }
    if raw.is_empty() {
        return "No result returned.".to_string();
    }
    truncate_tool_result(&reformat(raw), tool_name)
}

/// Text fed back to the model when the call itself failed.
pub fn render_call_error(tool_name: &str, err: &McpError) -> String {
    match err {
        McpError::Remote { code, message, .. } => {
            format!("Error calling tool '{tool_name}' [{code}]: {message}")
        }
        other => format!("Error calling tool '{tool_name}': {other}"),
    }
}

/// Best-effort reinterpretation of `raw` as structured data.
pub fn reformat(raw: &str) -> String {
    let Ok(parsed) = serde_json::from_str::<Value>(raw) else {
        return raw.to_string();
    };

    match &parsed {
        Value::Object(map) if !map.is_empty() => map
            .iter()
            .map(|(key, value)| format!("{key}: {}", display_value(value)))
            .collect::<Vec<_>>()
            .join("\n"),
        Value::Array(_) | Value::String(_) | Value::Number(_) | Value::Bool(_) => {
            display_value(&parsed)
        }
        _ => raw.to_string(),
    }
}

fn display_value(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Array(items) if items.iter().all(is_scalar) => items
            .iter()
            .map(display_value)
            .collect::<Vec<_>>()
            .join(", "),
        Value::Null => "none".to_string(),
        other => other.to_string(),
    }
}

fn is_scalar(value: &Value) -> bool {
    !matches!(value, Value::Array(_) | Value::Object(_))
}

/// Cap a result at `MAX_TOOL_RESULT_CHARS` on a char boundary.
fn truncate_tool_result(result: &str, tool_name: &str) -> String {
    if result.chars().count() <= MAX_TOOL_RESULT_CHARS {
        return result.to_string();
    }

    let total = result.chars().count();
    let truncated: String = result.chars().take(MAX_TOOL_RESULT_CHARS).collect();
    tracing::warn!(
        tool = tool_name,
        original_chars = total,
        truncated_to = MAX_TOOL_RESULT_CHARS,
        "tool result truncated"
    );
    format!("{truncated}\n\n[... truncated: showing first {MAX_TOOL_RESULT_CHARS} of {total} chars]")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn text_result(text: &str) -> CallToolResult {
        serde_json::from_value(serde_json::json!({
            "content": [{"type": "text", "text": text}]
        }))
        .unwrap()
    }

    #[test]
    fn test_reformat_object_with_list() {
        assert_eq!(
            reformat(r#"{"names":["Latte","Mocha"]}"#),
            "names: Latte, Mocha"
        );
    }

    #[test]
    fn test_reformat_nested_object_stays_json() {
        let out = reformat(r#"{"drink":{"name":"Latte","price":4.5},"available":true}"#);
        assert!(out.contains("available: true"));
        assert!(out.contains(r#"drink: {"name":"Latte","price":4.5}"#));
    }

    #[test]
    fn test_reformat_plain_text_untouched() {
        assert_eq!(reformat("Latte is espresso with milk."), "Latte is espresso with milk.");
        assert_eq!(reformat("{}"), "{}");
    }

    #[test]
    fn test_render_uses_first_content_item() {
        let result: CallToolResult = serde_json::from_value(serde_json::json!({
            "content": [{"type": "text", "text": "first"}, {"type": "text", "text": "second"}]
        }))
        .unwrap();
        assert_eq!(render_call_result("t", &result), "first");
    }

    #[test]
    fn test_render_is_error_flag() {
        let mut result = text_result("no such drink");
        result.is_error = true;
        assert_eq!(
            render_call_result("getDrinkInfo", &result),
            "Error from tool 'getDrinkInfo': no such drink"
        );
    }

    #[test]
    fn test_render_remote_error() {
        let err = McpError::Remote {
            code: -32602,
            message: "unknown drink".into(),
            data: None,
        };
        assert_eq!(
            render_call_error("getDrinkInfo", &err),
            "Error calling tool 'getDrinkInfo' [-32602]: unknown drink"
        );
    }

    #[test]
    fn test_long_result_truncated() {
        let long = "x".repeat(MAX_TOOL_RESULT_CHARS + 10);
        let out = render_call_result("t", &text_result(&long));
        assert!(out.contains("[... truncated"));
        assert!(out.starts_with(&"x".repeat(100)));
    }
}

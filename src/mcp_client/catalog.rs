//! Capability catalog: the handshake that runs once per session.
//!
//! Linear, no retries:
//! 1. `initialize` with protocol version and client identity
//! 2. `notifications/initialized`
//! 3. `tools/list` if the server declares tools
//! 4. `resources/list` if the server declares resources
//!
//! Any failure before the catalog is complete aborts startup.

use super::client::McpClient;
use super::errors::McpError;
use super::types::{
    ClientInfo, InitializeResult, McpResource, McpToolDefinition, ServerCapabilities, ServerInfo,
    PROTOCOL_VERSION,
};

/// Where the handshake currently stands.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BootstrapState {
    Uninitialized,
    Initialized,
    ReadyToList,
    Ready,
}

/// Everything the server offers, fetched once and never mutated.
#[derive(Debug, Clone, PartialEq)]
pub struct Catalog {
    pub protocol_version: Option<String>,
    pub server_info: ServerInfo,
    pub capabilities: ServerCapabilities,
    pub tools: Vec<McpToolDefinition>,
    pub resources: Vec<McpResource>,
}

impl Catalog {
    /// Look up a tool by name.
    pub fn tool(&self, name: &str) -> Option<&McpToolDefinition> {
        self.tools.iter().find(|t| t.name == name)
    }

    /// Human-readable server label for banners and logs.
    pub fn server_label(&self) -> String {
        match (&self.server_info.name, &self.server_info.version) {
            (Some(name), Some(version)) => format!("{name} {version}"),
            (Some(name), None) => name.clone(),
            _ => "unknown server".to_string(),
        }
    }
}

/// Run the handshake against `client` and build the catalog.
pub async fn bootstrap(client: &McpClient, client_info: &ClientInfo) -> Result<Catalog, McpError> {
    let mut state = BootstrapState::Uninitialized;
    tracing::debug!(?state, "starting handshake");

    let params = serde_json::json!({
        "protocolVersion": PROTOCOL_VERSION,
        "capabilities": {},
        "clientInfo": client_info,
    });
    let raw = client
        .call("initialize", Some(params))
        .await
        .map_err(|e| handshake_error("initialize", e))?;
    let init: InitializeResult =
        serde_json::from_value(raw).map_err(|e| McpError::HandshakeFailed {
            step: "initialize".into(),
            reason: format!("failed to parse initialize response: {e}"),
        })?;
    state = BootstrapState::Initialized;
    tracing::info!(
        ?state,
        server = ?init.server_info.name,
        version = ?init.server_info.version,
        protocol = ?init.protocol_version,
        "server initialized"
    );

    client
        .notify("notifications/initialized", None)
        .await
        .map_err(|e| handshake_error("notifications/initialized", e))?;
    state = BootstrapState::ReadyToList;
    tracing::debug!(?state, "initialized notification sent");

    let tools = if init.capabilities.tools.is_some() {
        client
            .list_tools()
            .await
            .map_err(|e| handshake_error("tools/list", e))?
    } else {
        Vec::new()
    };

    let resources = if init.capabilities.resources.is_some() {
        client
            .list_resources()
            .await
            .map_err(|e| handshake_error("resources/list", e))?
    } else {
        Vec::new()
    };

    state = BootstrapState::Ready;
    tracing::info!(
        ?state,
        tool_count = tools.len(),
        resource_count = resources.len(),
        tools = ?tools.iter().map(|t| t.name.as_str()).collect::<Vec<_>>(),
        "catalog ready"
    );

    Ok(Catalog {
        protocol_version: init.protocol_version,
        server_info: init.server_info,
        capabilities: init.capabilities,
        tools,
        resources,
    })
}

fn handshake_error(step: &str, err: McpError) -> McpError {
    McpError::HandshakeFailed {
        step: step.to_string(),
        reason: err.to_string(),
    }
}

// ─── Tests ───────────────────────────────────────────────────────────────────

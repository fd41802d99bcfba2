//! Tool-host process lifecycle.
//!
//! Spawns the server as a child process with piped stdio, forwards its
//! stderr into the log, and tears it down on exit. One client per process.

use std::process::Stdio;
use std::sync::Arc;
use std::time::Duration;

use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::{Child, ChildStderr, Command};

use super::client::McpClient;
use super::errors::McpError;
use super::types::ServerConfig;

/// Grace period between closing the server's stdin and killing it.
const SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(2);

// ─── ManagedServer ───────────────────────────────────────────────────────────

/// A running tool-host process and the client bound to its stdio.
pub struct ManagedServer {
    process: Child,
    pub client: Arc<McpClient>,
}

impl ManagedServer {
    /// OS process id, if the child is still known to the OS.
    pub fn pid(&self) -> Option<u32> {
        self.process.id()
    }

    /// Close stdin, wait briefly for a clean exit, then kill.
    pub async fn shutdown(mut self) {
        let _ = self.client.close().await;

        match tokio::time::timeout(SHUTDOWN_TIMEOUT, self.process.wait()).await {
            Ok(Ok(status)) => tracing::info!(%status, "server exited"),
            _ => {
                tracing::warn!("server did not exit in time, killing");
                let _ = self.process.kill().await;
            }
        }
    }
}

/// Spawn the tool host described by `config`.
pub fn spawn_server(config: &ServerConfig) -> Result<ManagedServer, McpError> {
    let mut cmd = Command::new(&config.command);
    cmd.args(&config.args);
    for (key, value) in &config.env {
        cmd.env(key, value);
    }
    if let Some(dir) = &config.cwd {
        cmd.current_dir(dir);
    }
    cmd.stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);

    let mut child = cmd.spawn().map_err(|e| McpError::SpawnFailed {
        command: config.command.clone(),
        reason: e.to_string(),
    })?;

    let stdin = child.stdin.take().ok_or_else(|| McpError::SpawnFailed {
        command: config.command.clone(),
        reason: "failed to capture stdin".into(),
    })?;
    let stdout = child.stdout.take().ok_or_else(|| McpError::SpawnFailed {
        command: config.command.clone(),
        reason: "failed to capture stdout".into(),
    })?;
    if let Some(stderr) = child.stderr.take() {
        tokio::spawn(forward_stderr(stderr));
    }

    tracing::info!(
        command = %config.command,
        args = ?config.args,
        pid = ?child.id(),
        "server process spawned"
    );

    let client = McpClient::new(stdout, stdin)
        .with_call_timeout(config.call_timeout_secs.map(Duration::from_secs));

    Ok(ManagedServer {
        process: child,
        client: Arc::new(client),
    })
}

/// Relay the server's stderr into the log until it closes.
async fn forward_stderr(stderr: ChildStderr) {
    let mut lines = BufReader::new(stderr).lines();
    loop {
        match lines.next_line().await {
            Ok(Some(line)) => tracing::debug!(target: "tool_host", "{line}"),
            Ok(None) => break,
            Err(e) => {
                tracing::debug!(error = %e, "stopped reading server stderr");
                break;
            }
        }
    }
}

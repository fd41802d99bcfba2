pub mod agent_core;
pub mod config;
pub mod inference;
pub mod mcp_client;
pub mod shell;

use std::path::{Path, PathBuf};

/// Return the platform-standard data directory for this client.
///
/// - macOS: `~/Library/Application Support/mcp-chat-client/`
/// - Linux: `$XDG_DATA_HOME/mcp-chat-client/` (fallback `~/.local/share/...`)
///
/// Falls back to `~/.mcp-chat-client/` when neither can be resolved.
pub fn data_dir() -> PathBuf {
    if let Some(dir) = dirs::data_dir() {
        return dir.join("mcp-chat-client");
    }
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".mcp-chat-client")
}

/// Where log lines go.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogTarget {
    /// `client.log` in the data directory, rotated on each start.
    File,
    Stderr,
}

/// Initialize the tracing subscriber.
///
/// `RUST_LOG` overrides the default filter. Stdout is left alone: it
/// belongs to the interactive shell. Returns the log file path when logging
/// to a file.
pub fn init_tracing(target: LogTarget) -> std::io::Result<Option<PathBuf>> {
    use tracing_subscriber::fmt;
    use tracing_subscriber::EnvFilter;

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("mcp_chat_client=info,warn"));

    let log_path = match target {
        LogTarget::Stderr => {
            fmt::fmt()
                .with_env_filter(filter)
                .with_writer(std::io::stderr)
                .with_target(true)
                .init();
            None
        }
        LogTarget::File => {
            let (log_path, log_file) = open_log_file(&data_dir())?;
            fmt::fmt()
                .with_env_filter(filter)
                .with_writer(std::sync::Mutex::new(log_file))
                .with_ansi(false)
                .with_target(true)
                .init();
            Some(log_path)
        }
    };

    tracing::info!(
        version = env!("CARGO_PKG_VERSION"),
        log_file = ?log_path,
        pid = std::process::id(),
        "=== mcp-chat-client starting ==="
    );
    Ok(log_path)
}

/// Previous runs' logs kept next to the current one.
const KEPT_LOGS: u32 = 3;

/// `client.log` → `client.log.{generation}`.
fn rotated_path(base: &Path, generation: u32) -> PathBuf {
    let mut name = base.as_os_str().to_owned();
    name.push(format!(".{generation}"));
    PathBuf::from(name)
}

/// Shift each previous log one generation older, dropping the one that
/// falls off the end. Gaps in the chain are fine.
fn rotate_log_file(base: &Path, keep: u32) {
    let _ = std::fs::remove_file(rotated_path(base, keep));
    for generation in (1..keep).rev() {
        let _ = std::fs::rename(
            rotated_path(base, generation),
            rotated_path(base, generation + 1),
        );
    }
    let _ = std::fs::rename(base, rotated_path(base, 1));
}

/// Open a fresh log for this run. Each event is a single unbuffered write,
/// so nothing is lost when the process is killed mid-question.
fn open_log_file(log_dir: &Path) -> std::io::Result<(PathBuf, std::fs::File)> {
    std::fs::create_dir_all(log_dir)?;
    let path = log_dir.join("client.log");
    rotate_log_file(&path, KEPT_LOGS);
    let file = std::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(&path)?;
    Ok((path, file))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rotate_keeps_last_three() {
        let dir = tempfile::tempdir().unwrap();
        let base = dir.path().join("client.log");

        for run in 0..5 {
            rotate_log_file(&base, KEPT_LOGS);
            std::fs::write(&base, format!("run {run}")).unwrap();
        }

        assert_eq!(std::fs::read_to_string(&base).unwrap(), "run 4");
        assert_eq!(
            std::fs::read_to_string(dir.path().join("client.log.1")).unwrap(),
            "run 3"
        );
        assert_eq!(
            std::fs::read_to_string(dir.path().join("client.log.3")).unwrap(),
            "run 1"
        );
        assert!(!dir.path().join("client.log.4").exists());
    }

    #[test]
    fn test_open_log_file_starts_fresh() {
        use std::io::Write;
        let dir = tempfile::tempdir().unwrap();
        let logs = dir.path().join("logs");

        let (path, mut file) = open_log_file(&logs).unwrap();
        file.write_all(b"first run\n").unwrap();
        drop(file);

        let (again, _file) = open_log_file(&logs).unwrap();
        assert_eq!(again, path);
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "");
        assert_eq!(
            std::fs::read_to_string(rotated_path(&path, 1)).unwrap(),
            "first run\n"
        );
    }

    #[test]
    fn test_data_dir_is_named_for_the_client() {
        let dir = data_dir();
        assert!(dir.ends_with("mcp-chat-client") || dir.ends_with(".mcp-chat-client"));
    }
}

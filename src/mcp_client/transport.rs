//! Line-delimited JSON transport.
//!
//! Frames a byte stream into one JSON document per `\n`-terminated line in
//! both directions:
//! - `LineWriter` serializes a message and writes it with its newline under a
//!   lock, so concurrent writers never interleave partial lines
//! - `LineReader` yields complete envelopes only, skipping blank lines and
//!   lines that are not valid JSON-RPC (server log noise, garbage)

use serde::Serialize;
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncWrite, AsyncWriteExt, BufReader};
use tokio::sync::Mutex;

use super::errors::McpError;
use super::types::JsonRpcEnvelope;

/// Maximum number of bytes of a skipped line echoed into the log.
const LOG_PREVIEW_BYTES: usize = 200;

type BoxedReader = Box<dyn AsyncRead + Send + Unpin>;
type BoxedWriter = Box<dyn AsyncWrite + Send + Unpin>;

// ─── Writer ──────────────────────────────────────────────────────────────────

/// Writing half: one serialized document per line.
pub struct LineWriter {
    writer: Mutex<BoxedWriter>,
}

impl LineWriter {
    pub fn new(writer: impl AsyncWrite + Send + Unpin + 'static) -> Self {
        Self {
            writer: Mutex::new(Box::new(writer)),
        }
    }

    /// Serialize `message` and write it as a single `\n`-terminated line.
    pub async fn send<T: Serialize>(&self, message: &T) -> Result<(), McpError> {
        let mut line = serde_json::to_string(message).map_err(|e| McpError::TransportError {
            reason: format!("failed to serialize message: {e}"),
        })?;
        line.push('\n');

        let mut writer = self.writer.lock().await;
        writer
            .write_all(line.as_bytes())
            .await
            .map_err(|e| McpError::TransportError {
                reason: format!("failed to write to server stdin: {e}"),
            })?;
        writer.flush().await.map_err(|e| McpError::TransportError {
            reason: format!("failed to flush server stdin: {e}"),
        })?;

        tracing::debug!(bytes = line.len(), line = %line.trim_end(), "-> sent");
        Ok(())
    }

    /// Close the write side so the server sees EOF on its stdin.
    pub async fn close(&self) -> Result<(), McpError> {
        let mut writer = self.writer.lock().await;
        writer.shutdown().await.map_err(|e| McpError::TransportError {
            reason: format!("failed to close server stdin: {e}"),
        })
    }
}

// ─── Reader ──────────────────────────────────────────────────────────────────

/// Reading half: yields one parsed envelope per complete line.
///
/// Bytes of a line still in flight stay in `buf` across calls, so a caller
/// that abandons `next_envelope` (timeout) loses nothing.
pub struct LineReader {
    reader: BufReader<BoxedReader>,
    buf: Vec<u8>,
    skipped: u64,
}

impl LineReader {
    pub fn new(reader: impl AsyncRead + Send + Unpin + 'static) -> Self {
        let boxed: BoxedReader = Box::new(reader);
        Self {
            reader: BufReader::new(boxed),
            buf: Vec::new(),
            skipped: 0,
        }
    }

    /// Number of lines dropped as malformed so far.
    pub fn skipped_lines(&self) -> u64 {
        self.skipped
    }

    /// Wait for the next well-formed envelope.
    ///
    /// Returns `Ok(None)` once the stream is closed. A trailing fragment with
    /// no newline at EOF is discarded, never returned.
    pub async fn next_envelope(&mut self) -> Result<Option<JsonRpcEnvelope>, McpError> {
        loop {
            let read = self
                .reader
                .read_until(b'\n', &mut self.buf)
                .await
                .map_err(|e| McpError::TransportError {
                    reason: format!("failed to read from server stdout: {e}"),
                })?;

            if read == 0 || self.buf.last() != Some(&b'\n') {
                if !self.buf.is_empty() {
                    tracing::warn!(
                        bytes = self.buf.len(),
                        "discarding unterminated line at end of stream"
                    );
                    self.buf.clear();
                }
                return Ok(None);
            }

            let line = std::mem::take(&mut self.buf);
            if let Some(envelope) = self.parse_line(&line) {
                return Ok(Some(envelope));
            }
        }
    }

    fn parse_line(&mut self, line: &[u8]) -> Option<JsonRpcEnvelope> {
        let text = String::from_utf8_lossy(line);
        let trimmed = text.trim();
        if trimmed.is_empty() {
            return None;
        }

        match serde_json::from_str::<JsonRpcEnvelope>(trimmed) {
            Ok(envelope) => {
                tracing::debug!(line = %trimmed, "<- received");
                Some(envelope)
            }
            Err(e) => {
                self.skipped += 1;
                tracing::warn!(
                    error = %e,
                    line = %preview(trimmed),
                    skipped_total = self.skipped,
                    "skipping malformed line from server"
                );
                None
            }
        }
    }
}

fn preview(line: &str) -> &str {
    if line.len() <= LOG_PREVIEW_BYTES {
        return line;
    }
    let mut end = LOG_PREVIEW_BYTES;
    while !line.is_char_boundary(end) {
        end -= 1;
    }
    &line[..end]
}

// ─── Tests ───────────────────────────────────────────────────────────────────

//! MCP Client: request/response correlation over the line transport.
//!
//! Every request gets a fresh, strictly increasing id and a pending entry
//! holding a oneshot resolver. Whichever caller currently owns the reader
//! pulls the next envelope and routes it to the pending entry with the
//! matching id, so replies resolve the right caller even when they arrive
//! out of order. Notifications carry no id and are never awaited.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

use tokio::io::{AsyncRead, AsyncWrite};
use tokio::sync::{oneshot, Mutex};

use super::errors::McpError;
use super::transport::{LineReader, LineWriter};
use super::types::{
    CallToolResult, JsonRpcEnvelope, JsonRpcRequest, ListResourcesResult, ListToolsResult,
    McpResource, McpToolDefinition, ReadResourceResult,
};

/// A request that has been written and is awaiting its reply.
struct PendingRequest {
    method: String,
    issued_at: Instant,
    resolver: oneshot::Sender<JsonRpcEnvelope>,
}

// ─── McpClient ───────────────────────────────────────────────────────────────

/// JSON-RPC client bound to one server session.
pub struct McpClient {
    writer: LineWriter,
    reader: Mutex<LineReader>,
    pending: std::sync::Mutex<HashMap<u64, PendingRequest>>,
    next_id: AtomicU64,
    call_timeout: Option<Duration>,
}

impl McpClient {
    /// Create a client over a server's stdout (`reader`) and stdin (`writer`).
    pub fn new(
        reader: impl AsyncRead + Send + Unpin + 'static,
        writer: impl AsyncWrite + Send + Unpin + 'static,
    ) -> Self {
        Self {
            writer: LineWriter::new(writer),
            reader: Mutex::new(LineReader::new(reader)),
            pending: std::sync::Mutex::new(HashMap::new()),
            next_id: AtomicU64::new(1),
            call_timeout: None,
        }
    }

    /// Fail calls whose reply does not arrive within `timeout`.
    pub fn with_call_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.call_timeout = timeout;
        self
    }

    /// Number of requests currently awaiting a reply.
    pub fn pending_count(&self) -> usize {
        self.pending_map().len()
    }

    // ─── Core primitives ─────────────────────────────────────────────────

    /// Send a request and wait for its result.
    ///
    /// A reply carrying `error` fails with [`McpError::Remote`]; the caller
    /// decides whether that is fatal.
    pub async fn call(
        &self,
        method: &str,
        params: Option<serde_json::Value>,
    ) -> Result<serde_json::Value, McpError> {
        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        let (tx, rx) = oneshot::channel();
        self.pending_map().insert(
            id,
            PendingRequest {
                method: method.to_string(),
                issued_at: Instant::now(),
                resolver: tx,
            },
        );

        if let Err(e) = self.writer.send(&JsonRpcRequest::new(id, method, params)).await {
            self.forget(id);
            return Err(e);
        }

        let waited = match self.call_timeout {
            Some(limit) => match tokio::time::timeout(limit, self.await_reply(rx)).await {
                Ok(reply) => reply,
                Err(_) => {
                    self.forget(id);
                    return Err(McpError::Timeout {
                        method: method.to_string(),
                        id,
                        timeout_ms: limit.as_millis() as u64,
                    });
                }
            },
            None => self.await_reply(rx).await,
        };

        match waited {
            Ok(envelope) => extract_result(method, envelope),
            Err(e) => {
                self.forget(id);
                Err(e)
            }
        }
    }

    /// Send a one-way notification. Nothing is awaited.
    pub async fn notify(
        &self,
        method: &str,
        params: Option<serde_json::Value>,
    ) -> Result<(), McpError> {
        self.writer
            .send(&JsonRpcRequest::notification(method, params))
            .await
    }

    /// Close the server's stdin.
    pub async fn close(&self) -> Result<(), McpError> {
        self.writer.close().await
    }

    // ─── Typed helpers ───────────────────────────────────────────────────

    /// `ping`: liveness check, returns `{}`.
    pub async fn ping(&self) -> Result<(), McpError> {
        self.call("ping", Some(serde_json::json!({}))).await.map(|_| ())
    }

    /// `tools/list`.
    pub async fn list_tools(&self) -> Result<Vec<McpToolDefinition>, McpError> {
        let result = self.call("tools/list", Some(serde_json::json!({}))).await?;
        let parsed: ListToolsResult = decode("tools/list", result)?;
        Ok(parsed.tools)
    }

    /// `resources/list`.
    pub async fn list_resources(&self) -> Result<Vec<McpResource>, McpError> {
        let result = self
            .call("resources/list", Some(serde_json::json!({})))
            .await?;
        let parsed: ListResourcesResult = decode("resources/list", result)?;
        Ok(parsed.resources)
    }

    /// `tools/call` with `{name, arguments}`.
    pub async fn call_tool(
        &self,
        name: &str,
        arguments: serde_json::Value,
    ) -> Result<CallToolResult, McpError> {
        let params = serde_json::json!({
            "name": name,
            "arguments": arguments,
        });
        let result = self.call("tools/call", Some(params)).await?;
        decode("tools/call", result)
    }

    /// `resources/read`: returns the text of the first content item.
    pub async fn read_resource(&self, uri: &str) -> Result<String, McpError> {
        let result = self
            .call("resources/read", Some(serde_json::json!({ "uri": uri })))
            .await?;
        let parsed: ReadResourceResult = decode("resources/read", result)?;
        Ok(parsed
            .contents
            .into_iter()
            .next()
            .and_then(|c| c.text)
            .unwrap_or_default())
    }

    // ─── Correlation ─────────────────────────────────────────────────────

    /// Wait until `rx` is resolved, reading and routing envelopes whenever
    /// this caller holds the reader.
    async fn await_reply(
        &self,
        mut rx: oneshot::Receiver<JsonRpcEnvelope>,
    ) -> Result<JsonRpcEnvelope, McpError> {
        loop {
            tokio::select! {
                biased;
                resolved = &mut rx => {
                    return resolved.map_err(|_| McpError::TransportError {
                        reason: "pending request was dropped before its reply arrived".into(),
                    });
                }
                mut reader = self.reader.lock() => {
                    // Another caller may have routed our reply while we
                    // waited for the reader.
                    if let Ok(envelope) = rx.try_recv() {
                        return Ok(envelope);
                    }
                    let Some(envelope) = reader.next_envelope().await? else {
                        return Err(McpError::TransportError {
                            reason: "server stdout closed (process may have exited)".into(),
                        });
                    };
                    drop(reader);
                    self.route(envelope);
                }
            }
        }
    }

    /// Hand an inbound envelope to the pending request it answers.
    fn route(&self, envelope: JsonRpcEnvelope) {
        if !envelope.is_response() {
            match envelope.method.as_deref() {
                Some(method) => {
                    tracing::debug!(method, "ignoring server-initiated message")
                }
                None => tracing::warn!("ignoring envelope with neither id nor method"),
            }
            return;
        }

        let Some(id) = envelope.id else {
            return;
        };
        let pending = self.pending_map().remove(&id);
        match pending {
            Some(request) => {
                tracing::debug!(
                    id,
                    method = %request.method,
                    elapsed_ms = request.issued_at.elapsed().as_millis() as u64,
                    "reply matched"
                );
                // The receiver is gone if the caller timed out; nothing to do.
                let _ = request.resolver.send(envelope);
            }
            None => tracing::warn!(id, "reply for unknown request id, dropping"),
        }
    }

    fn forget(&self, id: u64) {
        self.pending_map().remove(&id);
    }

    fn pending_map(&self) -> std::sync::MutexGuard<'_, HashMap<u64, PendingRequest>> {
        self.pending
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

// ─── Response Helpers ────────────────────────────────────────────────────────

/// Extract the result from a reply, converting error envelopes to `McpError`.
pub fn extract_result(
    method: &str,
    envelope: JsonRpcEnvelope,
) -> Result<serde_json::Value, McpError> {
    if let Some(err) = envelope.error {
        return Err(McpError::Remote {
            code: err.code,
            message: err.message,
            data: err.data,
        });
    }

    envelope.result.ok_or_else(|| McpError::ProtocolError {
        method: method.to_string(),
        reason: "reply has neither result nor error".into(),
    })
}

fn decode<T: serde::de::DeserializeOwned>(
    method: &str,
    value: serde_json::Value,
) -> Result<T, McpError> {
    serde_json::from_value(value).map_err(|e| McpError::ProtocolError {
        method: method.to_string(),
        reason: e.to_string(),
    })
}

// ─── Tests ───────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mcp_client::types::JsonRpcError;
    use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader, DuplexStream};

    /// Connect a client to the far ends of two in-memory pipes.
    fn connected() -> (McpClient, BufReader<DuplexStream>, DuplexStream) {
        let (client_out, server_in) = tokio::io::duplex(8192);
        let (server_out, client_in) = tokio::io::duplex(8192);
        (
            McpClient::new(client_in, client_out),
            BufReader::new(server_in),
            server_out,
        )
    }

    async fn read_request(reader: &mut BufReader<DuplexStream>) -> serde_json::Value {
        let mut line = String::new();
        reader.read_line(&mut line).await.unwrap();
        serde_json::from_str(&line).unwrap()
    }

    async fn reply(out: &mut DuplexStream, body: serde_json::Value) {
        let mut line = body.to_string();
        line.push('\n');
        out.write_all(line.as_bytes()).await.unwrap();
    }

    #[tokio::test]
    async fn test_sequential_calls_match_ids_and_increase() {
        let (client, mut server_in, mut server_out) = connected();

        let server = tokio::spawn(async move {
            let mut seen = Vec::new();
            for _ in 0..5 {
                let req = read_request(&mut server_in).await;
                let id = req["id"].as_u64().unwrap();
                seen.push(id);
                reply(
                    &mut server_out,
                    serde_json::json!({"jsonrpc": "2.0", "id": id, "result": {"echo": id}}),
                )
                .await;
            }
            seen
        });

        for _ in 0..5 {
            let result = client.call("ping", None).await.unwrap();
            assert!(result["echo"].is_u64());
        }

        let seen = server.await.unwrap();
        assert!(seen.windows(2).all(|w| w[1] > w[0]));
        assert_eq!(client.pending_count(), 0);
    }

    #[tokio::test]
    async fn test_malformed_line_between_replies_does_not_break_correlation() {
        let (client, mut server_in, mut server_out) = connected();

        let server = tokio::spawn(async move {
            let first = read_request(&mut server_in).await;
            reply(
                &mut server_out,
                serde_json::json!({"jsonrpc": "2.0", "id": first["id"], "result": "one"}),
            )
            .await;
            server_out.write_all(b"{this is not json\n").await.unwrap();
            let second = read_request(&mut server_in).await;
            reply(
                &mut server_out,
                serde_json::json!({"jsonrpc": "2.0", "id": second["id"], "result": "two"}),
            )
            .await;
        });

        assert_eq!(client.call("a", None).await.unwrap(), "one");
        assert_eq!(client.call("b", None).await.unwrap(), "two");
        server.await.unwrap();
    }

    #[tokio::test]
    async fn test_out_of_order_replies_resolve_by_id() {
        let (client, mut server_in, mut server_out) = connected();

        let server = tokio::spawn(async move {
            let a = read_request(&mut server_in).await;
            let b = read_request(&mut server_in).await;
            // Answer the second request first.
            for req in [&b, &a] {
                reply(
                    &mut server_out,
                    serde_json::json!({"jsonrpc": "2.0", "id": req["id"], "result": req["method"]}),
                )
                .await;
            }
        });

        let (ra, rb) = tokio::join!(client.call("first", None), client.call("second", None));
        assert_eq!(ra.unwrap(), "first");
        assert_eq!(rb.unwrap(), "second");
        server.await.unwrap();
    }

    #[tokio::test]
    async fn test_error_envelope_becomes_remote_error() {
        let (client, mut server_in, mut server_out) = connected();

        tokio::spawn(async move {
            let req = read_request(&mut server_in).await;
            reply(
                &mut server_out,
                serde_json::json!({
                    "jsonrpc": "2.0",
                    "id": req["id"],
                    "error": {"code": -32602, "message": "unknown drink"}
                }),
            )
            .await;
        });

        let err = client
            .call_tool("getDrinkInfo", serde_json::json!({"name": "Tea"}))
            .await
            .unwrap_err();
        match err {
            McpError::Remote { code, message, .. } => {
                assert_eq!(code, -32602);
                assert_eq!(message, "unknown drink");
            }
            other => panic!("expected Remote, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_notification_is_not_awaited() {
        let (client, mut server_in, _server_out) = connected();

        client
            .notify("notifications/initialized", None)
            .await
            .unwrap();
        let sent = read_request(&mut server_in).await;
        assert!(sent.get("id").is_none());
        assert_eq!(client.pending_count(), 0);
    }

    #[tokio::test]
    async fn test_server_notifications_and_unknown_ids_are_skipped() {
        let (client, mut server_in, mut server_out) = connected();

        tokio::spawn(async move {
            let req = read_request(&mut server_in).await;
            reply(
                &mut server_out,
                serde_json::json!({"jsonrpc": "2.0", "method": "notifications/progress"}),
            )
            .await;
            reply(
                &mut server_out,
                serde_json::json!({"jsonrpc": "2.0", "id": 999, "result": "stale"}),
            )
            .await;
            reply(
                &mut server_out,
                serde_json::json!({"jsonrpc": "2.0", "id": req["id"], "result": "fresh"}),
            )
            .await;
        });

        assert_eq!(client.call("ping", None).await.unwrap(), "fresh");
    }

    #[tokio::test]
    async fn test_timeout_clears_pending_entry() {
        let (client, _server_in, _server_out) = connected();
        let client = client.with_call_timeout(Some(Duration::from_millis(20)));

        let err = client.call("tools/list", None).await.unwrap_err();
        assert!(matches!(err, McpError::Timeout { .. }));
        assert_eq!(client.pending_count(), 0);
    }

    #[tokio::test]
    async fn test_closed_stream_fails_call() {
        let (client, _server_in, server_out) = connected();
        drop(server_out);

        let err = client.call("ping", None).await.unwrap_err();
        assert!(matches!(err, McpError::TransportError { .. }));
        assert_eq!(client.pending_count(), 0);
    }

    #[test]
    fn test_extract_result_missing_both() {
        let envelope = JsonRpcEnvelope {
            jsonrpc: Some("2.0".into()),
            id: Some(1),
            method: None,
            result: None,
            error: None,
        };
        let err = extract_result("ping", envelope).unwrap_err();
        assert!(matches!(err, McpError::ProtocolError { .. }));
    }

    #[test]
    fn test_extract_result_error() {
        let envelope = JsonRpcEnvelope {
            jsonrpc: Some("2.0".into()),
            id: Some(1),
            method: None,
            result: None,
            error: Some(JsonRpcError {
                code: -32601,
                message: "Method not found".into(),
                data: None,
            }),
        };
        let err = extract_result("resources/list", envelope).unwrap_err();
        assert!(err.is_remote());
    }
}

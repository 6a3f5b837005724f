//! MCP (JSON-RPC 2.0) server exposing the Nagios tool catalog.
//!
//! The same [`McpServer`] backs both transports: `serve_stdio` for local
//! clients and `handle_incoming_message` for the HTTP endpoint.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use serde_json::{Map, Value, json};
use tokio::io::{
    self, AsyncBufRead, AsyncBufReadExt, AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt,
    BufReader,
};
use tokio::sync::mpsc;
use tokio::task::AbortHandle;

pub mod fetch;
pub mod registry;

pub use fetch::{Fetcher, HttpFetcher};
pub use registry::{TOOLS, ToolBinding, ToolDefinition, ToolRegistry, find_tool};

const MCP_SERVER_NAME: &str = "nagios-mcp";
/// Newest first; the first entry is offered when the client asks for something else.
const SUPPORTED_PROTOCOL_VERSIONS: [&str; 3] = ["2025-06-18", "2025-03-26", "2024-11-05"];

/// Tool calls currently running on the stdio transport, keyed by request id.
type InFlight = Arc<Mutex<HashMap<String, AbortHandle>>>;

pub struct McpServer<F> {
    registry: Arc<ToolRegistry<F>>,
    in_flight: InFlight,
}

impl<F> Clone for McpServer<F> {
    fn clone(&self) -> Self {
        Self {
            registry: Arc::clone(&self.registry),
            in_flight: Arc::clone(&self.in_flight),
        }
    }
}

impl<F: Fetcher + 'static> McpServer<F> {
    pub fn new(fetcher: F) -> Self {
        Self {
            registry: Arc::new(ToolRegistry::new(fetcher)),
            in_flight: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    pub async fn serve_stdio(&self) -> io::Result<()> {
        tracing::info!(server = MCP_SERVER_NAME, "serving MCP over stdio");
        self.serve(io::stdin(), io::stdout()).await
    }

    /// Reads messages until EOF. Tool calls run as their own tasks; every
    /// response goes through one writer task so frames never interleave.
    pub async fn serve<R, W>(&self, reader: R, writer: W) -> io::Result<()>
    where
        R: AsyncRead + Unpin,
        W: AsyncWrite + Unpin + Send + 'static,
    {
        let (tx, mut rx) = mpsc::unbounded_channel::<(Framing, Value)>();
        let writer_task = tokio::spawn(async move {
            let mut writer = writer;
            while let Some((framing, message)) = rx.recv().await {
                write_message(&mut writer, framing, &message).await?;
            }
            Ok::<_, io::Error>(())
        });

        let mut reader = BufReader::new(reader);
        while let Some(frame) = read_message(&mut reader).await? {
            let parsed = frame
                .body
                .and_then(|body| serde_json::from_slice::<Value>(&body).map_err(|e| e.to_string()));
            let incoming = match parsed {
                Ok(incoming) => incoming,
                Err(reason) => {
                    tracing::warn!(error = %reason, "dropping unparseable MCP message");
                    let _ = tx.send((frame.framing, parse_error_response()));
                    continue;
                }
            };
            self.dispatch(incoming, frame.framing, &tx).await;
        }

        // Let running tool calls finish; the writer stops once every sender is gone.
        drop(tx);
        writer_task.await.map_err(io::Error::other)?
    }

    async fn dispatch(
        &self,
        incoming: Value,
        framing: Framing,
        tx: &mpsc::UnboundedSender<(Framing, Value)>,
    ) {
        if let Some(key) = tool_call_id(&incoming).map(Value::to_string) {
            self.spawn_tool_call(key, incoming, framing, tx.clone());
            return;
        }

        let is_batch = incoming.is_array();
        let mut responses = self.handle_incoming_message(incoming).await;
        let response = match responses.len() {
            0 => return,
            1 if !is_batch => responses.remove(0),
            _ => Value::Array(responses),
        };
        let _ = tx.send((framing, response));
    }

    fn spawn_tool_call(
        &self,
        key: String,
        incoming: Value,
        framing: Framing,
        tx: mpsc::UnboundedSender<(Framing, Value)>,
    ) {
        let server = self.clone();
        let task_key = key.clone();

        // Registration happens under the lock, so a fast task cannot
        // deregister before it is registered.
        let mut in_flight = self.in_flight.lock().unwrap_or_else(|e| e.into_inner());
        if in_flight.contains_key(&key) {
            tracing::warn!(request_id = %key, "rejecting tools/call with an id already in flight");
            let id = incoming.get("id").cloned().unwrap_or(Value::Null);
            let error = RpcError::invalid_request(format!(
                "Request id {key} is already in use by a running tool call"
            ));
            let _ = tx.send((framing, error_response(id, error)));
            return;
        }
        let handle = tokio::spawn(async move {
            let response = server.handle_single_message(incoming).await;
            server
                .in_flight
                .lock()
                .unwrap_or_else(|e| e.into_inner())
                .remove(&task_key);
            if let Some(response) = response {
                let _ = tx.send((framing, response));
            }
        });
        in_flight.insert(key, handle.abort_handle());
    }

    fn cancel(&self, params: &Value) {
        let Some(request_id) = params.get("requestId") else {
            return;
        };
        let key = request_id.to_string();
        let handle = self
            .in_flight
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .remove(&key);
        match handle {
            Some(handle) => {
                handle.abort();
                tracing::info!(request_id = %key, "cancelled in-flight tool call");
            }
            None => tracing::debug!(request_id = %key, "cancel for unknown or finished request"),
        }
    }

    pub async fn handle_incoming_message(&self, incoming: Value) -> Vec<Value> {
        let mut responses = Vec::new();

        if let Some(batch) = incoming.as_array() {
            if batch.is_empty() {
                responses.push(error_response(
                    Value::Null,
                    RpcError::invalid_request("Batch request must not be empty"),
                ));
                return responses;
            }
            for item in batch {
                if let Some(response) = self.handle_single_message(item.clone()).await {
                    responses.push(response);
                }
            }
            return responses;
        }

        if let Some(response) = self.handle_single_message(incoming).await {
            responses.push(response);
        }
        responses
    }

    async fn handle_single_message(&self, incoming: Value) -> Option<Value> {
        let Some(obj) = incoming.as_object() else {
            return Some(error_response(
                Value::Null,
                RpcError::invalid_request("Request must be a JSON object"),
            ));
        };

        if obj.get("jsonrpc").and_then(Value::as_str) != Some("2.0") {
            let id = obj.get("id").cloned().unwrap_or(Value::Null);
            return Some(error_response(
                id,
                RpcError::invalid_request("jsonrpc must be '2.0'"),
            ));
        }

        let Some(method) = obj.get("method").and_then(Value::as_str) else {
            // A client response; this server never sends requests.
            return None;
        };

        let params = obj.get("params").cloned().unwrap_or(Value::Null);
        if let Some(id) = obj.get("id").cloned() {
            let result = self.handle_request(method, params).await;
            Some(match result {
                Ok(payload) => success_response(id, payload),
                Err(err) => error_response(id, err),
            })
        } else {
            self.handle_notification(method, &params);
            None
        }
    }

    fn handle_notification(&self, method: &str, params: &Value) {
        match method {
            "notifications/cancelled" => self.cancel(params),
            "notifications/initialized" => tracing::debug!("client initialized"),
            // Unknown notifications are ignored.
            _ => {}
        }
    }

    async fn handle_request(&self, method: &str, params: Value) -> Result<Value, RpcError> {
        match method {
            "initialize" => Ok(initialize_payload(&params)),
            "ping" => Ok(json!({})),
            "tools/list" => Ok(self.tools_list_payload()),
            "tools/call" => self.handle_tools_call(params).await,
            "resources/list" => Ok(json!({ "resources": [] })),
            "prompts/list" => Ok(json!({ "prompts": [] })),
            _ => Err(RpcError::method_not_found(method)),
        }
    }

    fn tools_list_payload(&self) -> Value {
        let tools: Vec<Value> = self
            .registry
            .definitions()
            .iter()
            .map(ToolDefinition::to_value)
            .collect();
        json!({ "tools": tools })
    }

    async fn handle_tools_call(&self, params: Value) -> Result<Value, RpcError> {
        let params = params
            .as_object()
            .ok_or_else(|| RpcError::invalid_params("tools/call params must be an object"))?;

        let name = params
            .get("name")
            .and_then(Value::as_str)
            .ok_or_else(|| RpcError::invalid_params("tools/call requires string field 'name'"))?;

        let args = match params.get("arguments") {
            Some(Value::Object(map)) => map.clone(),
            Some(Value::Null) | None => Map::new(),
            Some(_) => {
                return Err(RpcError::invalid_params(
                    "tools/call 'arguments' must be an object",
                ));
            }
        };

        Ok(match self.registry.call(name, &args).await {
            Ok(payload) => build_tool_call_response(
                json!({
                    "status": "complete",
                    "tool": name,
                    "data": payload
                }),
                false,
            ),
            Err(err) => {
                tracing::warn!(tool = name, error = %err, code = err.code(), "tool call failed");
                build_tool_call_response(
                    json!({
                        "status": "error",
                        "tool": name,
                        "error": err.to_value()
                    }),
                    true,
                )
            }
        })
    }
}

fn initialize_payload(params: &Value) -> Value {
    let requested = params.get("protocolVersion").and_then(Value::as_str);
    let protocol_version = requested
        .filter(|v| SUPPORTED_PROTOCOL_VERSIONS.contains(v))
        .unwrap_or(SUPPORTED_PROTOCOL_VERSIONS[0]);
    json!({
        "protocolVersion": protocol_version,
        "capabilities": {
            "tools": { "listChanged": false },
            "resources": { "listChanged": false },
            "prompts": { "listChanged": false }
        },
        "serverInfo": {
            "name": MCP_SERVER_NAME,
            "version": env!("CARGO_PKG_VERSION")
        },
        "instructions": "Read-only access to Nagios Core status and configuration. Start with get_overall_health_summary or get_alerts, then drill down with get_host_status / get_service_status. Use get_object_list_config to discover valid host, group and contact names."
    })
}

/// Id of a single `tools/call` request, the only kind that runs off the read loop.
fn tool_call_id(incoming: &Value) -> Option<&Value> {
    let obj = incoming.as_object()?;
    if obj.get("method").and_then(Value::as_str) != Some("tools/call") {
        return None;
    }
    obj.get("id").filter(|id| !id.is_null())
}

fn build_tool_call_response(envelope: Value, is_error: bool) -> Value {
    // Agents often read only the text block, so it carries the full envelope.
    let text = to_pretty_json(&envelope);
    if is_error {
        json!({
            "isError": true,
            "content": [{ "type": "text", "text": text }],
            "structuredContent": envelope
        })
    } else {
        json!({
            "content": [{ "type": "text", "text": text }],
            "structuredContent": envelope
        })
    }
}

#[derive(Debug)]
struct RpcError {
    code: i64,
    message: String,
}

impl RpcError {
    fn parse_error() -> Self {
        Self {
            code: -32700,
            message: "Parse error".to_string(),
        }
    }

    fn invalid_request(message: impl Into<String>) -> Self {
        Self {
            code: -32600,
            message: message.into(),
        }
    }

    fn method_not_found(method: &str) -> Self {
        Self {
            code: -32601,
            message: format!("Method not found: {method}"),
        }
    }

    fn invalid_params(message: impl Into<String>) -> Self {
        Self {
            code: -32602,
            message: message.into(),
        }
    }
}

fn success_response(id: Value, result: Value) -> Value {
    json!({
        "jsonrpc": "2.0",
        "id": id,
        "result": result
    })
}

fn error_response(id: Value, error: RpcError) -> Value {
    json!({
        "jsonrpc": "2.0",
        "id": id,
        "error": {
            "code": error.code,
            "message": error.message
        }
    })
}

/// JSON-RPC parse error (`-32700`) with a null id.
pub fn parse_error_response() -> Value {
    error_response(Value::Null, RpcError::parse_error())
}

/// How a message arrived on stdio; the reply uses the same framing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Framing {
    /// One JSON document per line.
    Line,
    /// LSP-style `Content-Length` header block followed by the body.
    ContentLength,
}

/// Upper bound for a `Content-Length` body; larger frames are skipped unread.
const MAX_FRAME_BYTES: usize = 16 * 1024 * 1024;

/// One message off the wire. `body` is `Err` when the framing itself was
/// unusable; the caller answers that with a parse error and keeps reading.
#[derive(Debug)]
struct Frame {
    framing: Framing,
    body: Result<Vec<u8>, String>,
}

/// Only I/O failures and EOF inside a header block are errors here; bad
/// bytes become a [`Frame`] with an `Err` body.
async fn read_message<R>(reader: &mut R) -> io::Result<Option<Frame>>
where
    R: AsyncBufRead + Unpin,
{
    loop {
        let mut line = Vec::new();
        if reader.read_until(b'\n', &mut line).await? == 0 {
            return Ok(None);
        }
        let trimmed = line.trim_ascii();
        if trimmed.is_empty() {
            continue;
        }

        let content_length = match content_length_header(trimmed) {
            None => {
                return Ok(Some(Frame {
                    framing: Framing::Line,
                    body: Ok(trimmed.to_vec()),
                }));
            }
            Some(parsed) => parsed,
        };

        // Skip any further headers up to the blank separator line.
        loop {
            let mut header = Vec::new();
            if reader.read_until(b'\n', &mut header).await? == 0 {
                return Err(io::Error::new(
                    io::ErrorKind::UnexpectedEof,
                    "Unexpected EOF while reading MCP headers",
                ));
            }
            if header.trim_ascii().is_empty() {
                break;
            }
        }

        let body = match content_length {
            Err(reason) => Err(reason),
            Ok(length) if length > MAX_FRAME_BYTES => {
                let skipped = io::copy(&mut (&mut *reader).take(length as u64), &mut io::sink()).await?;
                if skipped < length as u64 {
                    return Err(io::Error::new(
                        io::ErrorKind::UnexpectedEof,
                        "Unexpected EOF while skipping oversized MCP message",
                    ));
                }
                Err(format!(
                    "Content-Length {length} exceeds the {MAX_FRAME_BYTES} byte limit"
                ))
            }
            Ok(length) => {
                let mut body = vec![0_u8; length];
                reader.read_exact(&mut body).await?;
                Ok(body)
            }
        };
        return Ok(Some(Frame {
            framing: Framing::ContentLength,
            body,
        }));
    }
}

/// `None` when the line is not a `Content-Length` header at all.
fn content_length_header(line: &[u8]) -> Option<Result<usize, String>> {
    let line = std::str::from_utf8(line).ok()?;
    let (name, value) = line.split_once(':')?;
    if !name.trim().eq_ignore_ascii_case("content-length") {
        return None;
    }
    Some(
        value
            .trim()
            .parse::<usize>()
            .map_err(|_| format!("invalid Content-Length header: {}", value.trim())),
    )
}

async fn write_message<W>(writer: &mut W, framing: Framing, value: &Value) -> io::Result<()>
where
    W: AsyncWrite + Unpin,
{
    let body = serde_json::to_vec(value).map_err(|e| {
        io::Error::new(
            io::ErrorKind::InvalidData,
            format!("Failed to serialize JSON: {e}"),
        )
    })?;
    match framing {
        Framing::Line => {
            writer.write_all(&body).await?;
            writer.write_all(b"\n").await?;
        }
        Framing::ContentLength => {
            let header = format!(
                "Content-Length: {}\r\nContent-Type: application/json\r\n\r\n",
                body.len()
            );
            writer.write_all(header.as_bytes()).await?;
            writer.write_all(&body).await?;
        }
    }
    writer.flush().await
}

fn to_pretty_json(value: &Value) -> String {
    serde_json::to_string_pretty(value).unwrap_or_else(|_| "{}".to_string())
}

use serde_json::{Value, json};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU8, Ordering};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};
use tracing_subscriber::EnvFilter;
use xcodebuild_mcp::execution::{ProgressSink, ProgressUpdate};
use xcodebuild_mcp::mcp::{ErrorCode, ErrorResponse, McpServer, ToolRequest};
use xcodebuild_mcp::{Result, ServerConfig};

const DEFAULT_PROTOCOL_VERSION: &str = "2024-11-05";

#[derive(serde::Deserialize)]
struct JsonRpcRequest {
    #[allow(dead_code)]
    jsonrpc: String,
    id: Option<Value>,
    method: String,
    params: Option<Value>,
}

#[derive(serde::Serialize)]
struct JsonRpcResponse {
    jsonrpc: String,
    id: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    result: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<ErrorResponse>,
}

impl JsonRpcResponse {
    fn result(id: Option<Value>, result: Value) -> Self {
        Self {
            jsonrpc: "2.0".to_string(),
            id,
            result: Some(result),
            error: None,
        }
    }

    fn error(id: Option<Value>, error: ErrorResponse) -> Self {
        Self {
            jsonrpc: "2.0".to_string(),
            id,
            result: None,
            error: Some(error),
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    // stdout carries the protocol, so logs go to stderr
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let config = ServerConfig::from_env();
    debug!("Configuration: {:?}", config);
    let server = Arc::new(McpServer::new(config)?);

    let schemas = server.get_tool_schemas()?;
    info!("xcodebuild-mcp ready with {} tools", schemas.len());
    for schema in &schemas {
        debug!("  - {}: {}", schema.name, schema.description);
    }

    // Single writer so responses and progress notifications never interleave
    let (tx, mut rx) = mpsc::unbounded_channel::<String>();
    let writer = tokio::spawn(async move {
        let mut stdout = tokio::io::stdout();
        while let Some(line) = rx.recv().await {
            if stdout.write_all(line.as_bytes()).await.is_err()
                || stdout.write_all(b"\n").await.is_err()
                || stdout.flush().await.is_err()
            {
                error!("stdout closed, dropping remaining messages");
                break;
            }
        }
    });

    let mut stdin = BufReader::new(tokio::io::stdin());
    let mut buf = Vec::new();
    loop {
        buf.clear();
        if stdin.read_until(b'\n', &mut buf).await? == 0 {
            break;
        }

        let request = match decode_request(&buf) {
            Some(Ok(request)) => request,
            Some(Err(response)) => {
                send(&tx, &response);
                continue;
            }
            None => continue,
        };

        // Notifications carry no id and get no response
        if request.id.is_none() {
            debug!("Notification {}", request.method);
            continue;
        }

        match request.method.as_str() {
            "tools/call" => {
                let server = server.clone();
                let tx = tx.clone();
                tokio::spawn(async move {
                    let response = handle_tool_call(&server, request.id, request.params, &tx).await;
                    send(&tx, &response);
                });
            }
            _ => {
                let response = handle_request(&server, request);
                send(&tx, &response);
            }
        }
    }

    info!("stdin closed, shutting down");
    drop(tx);
    writer
        .await
        .map_err(|e| xcodebuild_mcp::XcodeError::Mcp(format!("writer task failed: {}", e)))?;
    Ok(())
}

/// Decodes one input line. `None` for blank lines; an error response for
/// bytes that are not UTF-8 or not a JSON-RPC request.
fn decode_request(buf: &[u8]) -> Option<std::result::Result<JsonRpcRequest, JsonRpcResponse>> {
    let parse_error = |e: &dyn std::fmt::Display| {
        JsonRpcResponse::error(
            None,
            ErrorResponse::new(ErrorCode::PARSE_ERROR, format!("Parse error: {}", e)),
        )
    };

    let line = match std::str::from_utf8(buf) {
        Ok(line) => line.trim(),
        Err(e) => return Some(Err(parse_error(&e))),
    };
    if line.is_empty() {
        return None;
    }
    Some(serde_json::from_str(line).map_err(|e| parse_error(&e)))
}

fn send(tx: &mpsc::UnboundedSender<String>, response: &JsonRpcResponse) {
    match serde_json::to_string(response) {
        Ok(line) => {
            if tx.send(line).is_err() {
                warn!("Writer stopped; response dropped");
            }
        }
        Err(e) => error!("Failed to serialize response: {}", e),
    }
}

fn handle_request(server: &McpServer, request: JsonRpcRequest) -> JsonRpcResponse {
    match request.method.as_str() {
        "initialize" => {
            let protocol_version = request
                .params
                .as_ref()
                .and_then(|p| p.get("protocolVersion"))
                .and_then(|v| v.as_str())
                .unwrap_or(DEFAULT_PROTOCOL_VERSION)
                .to_string();
            JsonRpcResponse::result(
                request.id,
                json!({
                    "protocolVersion": protocol_version,
                    "capabilities": {"tools": {}},
                    "serverInfo": {
                        "name": env!("CARGO_PKG_NAME"),
                        "version": env!("CARGO_PKG_VERSION")
                    }
                }),
            )
        }
        "ping" => JsonRpcResponse::result(request.id, json!({})),
        "tools/list" => match server.get_tool_schemas() {
            Ok(schemas) => JsonRpcResponse::result(
                request.id,
                json!({
                    "tools": schemas.iter().map(|s| json!({
                        "name": s.name,
                        "description": s.description,
                        "inputSchema": s.parameters
                    })).collect::<Vec<_>>()
                }),
            ),
            Err(e) => JsonRpcResponse::error(request.id, e.into()),
        },
        _ => JsonRpcResponse::error(
            request.id,
            ErrorResponse::new(
                ErrorCode::METHOD_NOT_FOUND,
                format!("Method not found: {}", request.method),
            ),
        ),
    }
}

async fn handle_tool_call(
    server: &McpServer,
    id: Option<Value>,
    params: Option<Value>,
    tx: &mpsc::UnboundedSender<String>,
) -> JsonRpcResponse {
    let Some(params) = params else {
        return JsonRpcResponse::error(
            id,
            ErrorResponse::new(ErrorCode::INVALID_PARAMS, "Invalid params: params required"),
        );
    };
    let Some(name) = params.get("name").and_then(|v| v.as_str()) else {
        return JsonRpcResponse::error(
            id,
            ErrorResponse::new(ErrorCode::INVALID_PARAMS, "Invalid params: missing 'name'"),
        );
    };

    let progress = params
        .get("_meta")
        .and_then(|m| m.get("progressToken"))
        .cloned()
        .map(|token| progress_notifier(token, tx.clone()));

    let request = ToolRequest {
        tool_name: name.to_string(),
        params: params.get("arguments").cloned().unwrap_or_else(|| json!({})),
    };

    match server.call_tool(request, progress).await {
        Ok(response) => match serde_json::to_value(&response.result) {
            Ok(result) => JsonRpcResponse::result(id, result),
            Err(e) => JsonRpcResponse::error(id, ErrorResponse::new(ErrorCode::INTERNAL_ERROR, e.to_string())),
        },
        Err(e) => {
            warn!("Tool {} failed: {}", name, e);
            JsonRpcResponse::error(id, e.into())
        }
    }
}

/// Forwards executor progress as MCP `notifications/progress` messages.
///
/// MCP wants `progress` to increase with every notification for a token,
/// while the executor may reset to a phase floor or start a second run. The
/// highest value sent so far is kept, and running updates that would not
/// raise it are dropped.
struct ProgressNotifier {
    token: Value,
    tx: mpsc::UnboundedSender<String>,
    sent: AtomicU8,
    started: AtomicBool,
}

impl ProgressNotifier {
    fn new(token: Value, tx: mpsc::UnboundedSender<String>) -> Self {
        Self {
            token,
            tx,
            sent: AtomicU8::new(0),
            started: AtomicBool::new(false),
        }
    }
}

impl ProgressSink for ProgressNotifier {
    fn emit(&self, update: ProgressUpdate) {
        let previous = self.sent.fetch_max(update.progress, Ordering::SeqCst);
        let first = !self.started.swap(true, Ordering::SeqCst);
        if !first && update.progress <= previous && !update.status.is_terminal() {
            return;
        }

        let notification = json!({
            "jsonrpc": "2.0",
            "method": "notifications/progress",
            "params": {
                "progressToken": self.token,
                "progress": previous.max(update.progress),
                "total": 100,
                "message": update.message
            }
        });
        // unbounded send never blocks the output-draining task
        let _ = self.tx.send(notification.to_string());
    }
}

fn progress_notifier(token: Value, tx: mpsc::UnboundedSender<String>) -> Arc<dyn ProgressSink> {
    Arc::new(ProgressNotifier::new(token, tx))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use xcodebuild_mcp::execution::ProgressStatus;

    fn update(status: ProgressStatus, progress: u8) -> ProgressUpdate {
        ProgressUpdate {
            operation_id: "op".to_string(),
            status,
            progress,
            message: format!("at {}", progress),
            timestamp: Utc::now(),
            details: None,
        }
    }

    #[test]
    fn test_invalid_utf8_line_is_a_parse_error() {
        let response = match decode_request(b"{\"method\": \"ping\xff\"}\n") {
            Some(Err(response)) => response,
            _ => panic!("expected a parse error"),
        };
        let error = response.error.unwrap();
        assert_eq!(error.code, ErrorCode::PARSE_ERROR);
        assert!(response.id.is_none());
    }

    #[test]
    fn test_decode_request_lines() {
        assert!(decode_request(b"  \r\n").is_none());
        assert!(matches!(decode_request(b"not json\n"), Some(Err(_))));

        let request = match decode_request(b"{\"jsonrpc\":\"2.0\",\"id\":1,\"method\":\"ping\"}\n") {
            Some(Ok(request)) => request,
            _ => panic!("expected a request"),
        };
        assert_eq!(request.method, "ping");
        assert_eq!(request.id, Some(json!(1)));
    }

    fn sent(rx: &mut mpsc::UnboundedReceiver<String>) -> Vec<u64> {
        let mut values = Vec::new();
        while let Ok(line) = rx.try_recv() {
            let value: Value = serde_json::from_str(&line).unwrap();
            assert_eq!(value["params"]["progressToken"], "tok");
            values.push(value["params"]["progress"].as_u64().unwrap());
        }
        values
    }

    #[test]
    fn test_progress_never_goes_backwards() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let notifier = ProgressNotifier::new(json!("tok"), tx);

        notifier.emit(update(ProgressStatus::Running, 0));
        notifier.emit(update(ProgressStatus::Running, 22));
        notifier.emit(update(ProgressStatus::Running, 99));
        // phase floor after a reset, then a throttled repeat
        notifier.emit(update(ProgressStatus::Running, 33));
        notifier.emit(update(ProgressStatus::Running, 99));
        notifier.emit(update(ProgressStatus::Completed, 100));

        assert_eq!(sent(&mut rx), vec![0, 22, 99, 100]);
    }

    #[test]
    fn test_second_execution_continues_from_high_water_mark() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let notifier = ProgressNotifier::new(json!("tok"), tx);

        notifier.emit(update(ProgressStatus::Running, 0));
        notifier.emit(update(ProgressStatus::Running, 40));
        notifier.emit(update(ProgressStatus::Failed, 40));
        notifier.emit(update(ProgressStatus::Running, 0));
        notifier.emit(update(ProgressStatus::Running, 10));
        notifier.emit(update(ProgressStatus::Completed, 100));

        assert_eq!(sent(&mut rx), vec![0, 40, 40, 100]);
    }
}

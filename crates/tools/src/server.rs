//! Stdio server: one JSON-RPC message per line on stdin, one reply per line
//! on stdout. Logging goes to stderr; stdout belongs to the protocol.

use std::sync::Arc;

use browser::Session;
use serde_json::json;
use thiserror::Error;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};

use crate::definitions::tool_definitions;
use crate::dispatch::call_tool;
use crate::protocol::{
    tool_result, RpcRequest, RpcResponse, METHOD_NOT_FOUND, PARSE_ERROR,
};

pub const SERVER_NAME: &str = "agent-browse";
pub const PROTOCOL_VERSION: &str = "2024-11-05";

#[derive(Debug, Error)]
pub enum ServerError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Serve until stdin closes or the process is interrupted. The session is
/// stopped on the way out either way, so Chrome never outlives us.
pub async fn run(session: Arc<Session>) -> Result<(), ServerError> {
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut stdout = tokio::io::stdout();

    loop {
        tokio::select! {
            line = lines.next_line() => {
                let Some(line) = line? else {
                    tracing::info!("stdin closed");
                    break;
                };
                if line.trim().is_empty() {
                    continue;
                }
                if let Some(response) = handle_line(&session, &line).await {
                    let mut payload = serde_json::to_string(&response)?;
                    payload.push('\n');
                    stdout.write_all(payload.as_bytes()).await?;
                    stdout.flush().await?;
                }
            }
            _ = tokio::signal::ctrl_c() => {
                tracing::info!("interrupted");
                break;
            }
        }
    }

    if let Err(e) = session.stop().await {
        tracing::warn!("session stop during shutdown: {}", e);
    }
    Ok(())
}

async fn handle_line(session: &Session, line: &str) -> Option<RpcResponse> {
    let request: RpcRequest = match serde_json::from_str(line) {
        Ok(request) => request,
        Err(e) => {
            return Some(RpcResponse::failure(
                None,
                PARSE_ERROR,
                format!("parse error: {}", e),
            ));
        }
    };
    handle_request(session, request).await
}

/// Dispatch one request. Notifications (no id) are consumed without reply.
pub async fn handle_request(session: &Session, request: RpcRequest) -> Option<RpcResponse> {
    let RpcRequest {
        id, method, params, ..
    } = request;

    let response = match method.as_str() {
        "initialize" => RpcResponse::success(
            id.clone(),
            json!({
                "protocolVersion": PROTOCOL_VERSION,
                "capabilities": { "tools": {} },
                "serverInfo": {
                    "name": SERVER_NAME,
                    "version": env!("CARGO_PKG_VERSION"),
                },
            }),
        ),

        "tools/list" => {
            RpcResponse::success(id.clone(), json!({ "tools": tool_definitions() }))
        }

        "tools/call" => {
            let name = params["name"].as_str().unwrap_or_default().to_string();
            let arguments = params
                .get("arguments")
                .cloned()
                .unwrap_or_else(|| json!({}));

            tracing::debug!(tool = %name, "tool call");
            // Every tool failure becomes a result with isError, never a
            // protocol-level error: the agent reads the message and moves on.
            let result = match call_tool(session, &name, &arguments).await {
                Ok(payload) => tool_result(&payload, false),
                Err(e) => tool_result(&json!(format!("Error: {}", e)), true),
            };
            RpcResponse::success(id.clone(), result)
        }

        other => {
            if id.is_none() {
                tracing::debug!(method = other, "ignoring notification");
                return None;
            }
            RpcResponse::failure(
                id.clone(),
                METHOD_NOT_FOUND,
                format!("method not found: {}", other),
            )
        }
    };

    // Replies only exist for requests that carried an id.
    id.as_ref()?;
    Some(response)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::RequestId;
    use browser::SessionConfig;

    fn request(id: Option<i64>, method: &str, params: serde_json::Value) -> RpcRequest {
        RpcRequest {
            jsonrpc: "2.0".to_string(),
            id: id.map(RequestId::Number),
            method: method.to_string(),
            params,
        }
    }

    #[tokio::test]
    async fn initialize_advertises_tool_capability() {
        let session = Session::new(SessionConfig::default());
        let response = handle_request(&session, request(Some(1), "initialize", json!({})))
            .await
            .unwrap();
        let result = response.result.unwrap();
        assert_eq!(result["serverInfo"]["name"], SERVER_NAME);
        assert!(result["capabilities"]["tools"].is_object());
    }

    #[tokio::test]
    async fn tools_list_returns_the_catalog() {
        let session = Session::new(SessionConfig::default());
        let response = handle_request(&session, request(Some(2), "tools/list", json!({})))
            .await
            .unwrap();
        let tools = response.result.unwrap()["tools"].as_array().unwrap().len();
        assert_eq!(tools, 18);
    }

    #[tokio::test]
    async fn tool_failures_come_back_as_error_results() {
        let session = Session::new(SessionConfig::default());
        let response = handle_request(
            &session,
            request(
                Some(3),
                "tools/call",
                json!({ "name": "browser_click", "arguments": { "selector": "#go" } }),
            ),
        )
        .await
        .unwrap();

        let result = response.result.unwrap();
        assert_eq!(result["isError"], true);
        let text = result["content"][0]["text"].as_str().unwrap();
        assert!(text.starts_with("Error: "));
        assert!(text.contains("not running"));
    }

    #[tokio::test]
    async fn successful_tool_call_is_not_an_error_result() {
        let session = Session::new(SessionConfig::default());
        let response = handle_request(
            &session,
            request(Some(4), "tools/call", json!({ "name": "browser_status" })),
        )
        .await
        .unwrap();

        let result = response.result.unwrap();
        assert_eq!(result["isError"], false);
        assert!(result["content"][0]["text"]
            .as_str()
            .unwrap()
            .contains("\"running\": false"));
    }

    #[tokio::test]
    async fn notifications_get_no_reply() {
        let session = Session::new(SessionConfig::default());
        let response = handle_request(
            &session,
            request(None, "notifications/initialized", json!({})),
        )
        .await;
        assert!(response.is_none());
    }

    #[tokio::test]
    async fn unknown_method_with_id_is_method_not_found() {
        let session = Session::new(SessionConfig::default());
        let response = handle_request(&session, request(Some(5), "resources/list", json!({})))
            .await
            .unwrap();
        assert_eq!(response.error.unwrap().code, METHOD_NOT_FOUND);
    }
}

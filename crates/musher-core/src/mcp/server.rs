//! MCP JSON-RPC server over a workspace.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt};
use tracing::{debug, warn};

use crate::client::RunOptions;
use crate::workspace::Workspace;

/// Name of the single tool this server exposes.
pub const TOOL_NAME: &str = "multiagent.run";

/// Protocol revision reported by `initialize`.
const PROTOCOL_VERSION: &str = "2025-06-18";

const PARSE_ERROR: i32 = -32700;
const METHOD_NOT_FOUND: i32 = -32601;
const INVALID_PARAMS: i32 = -32602;
const DISPATCH_FAILED: i32 = -32000;

/// An incoming JSON-RPC request.
#[derive(Debug, Deserialize)]
pub struct JsonRpcRequest {
    #[serde(default)]
    #[allow(dead_code)]
    jsonrpc: Option<String>,
    #[serde(default)]
    pub id: Option<Value>,
    pub method: String,
    #[serde(default)]
    pub params: Option<Value>,
}

/// An outgoing JSON-RPC response; exactly one of `result` / `error` is set.
#[derive(Debug, Serialize)]
pub struct JsonRpcResponse {
    jsonrpc: &'static str,
    id: Value,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<JsonRpcError>,
}

#[derive(Debug, Serialize)]
pub struct JsonRpcError {
    pub code: i32,
    pub message: String,
}

impl JsonRpcResponse {
    fn ok(id: Value, result: Value) -> Self {
        Self {
            jsonrpc: "2.0",
            id,
            result: Some(result),
            error: None,
        }
    }

    fn fail(id: Value, code: i32, message: impl Into<String>) -> Self {
        Self {
            jsonrpc: "2.0",
            id,
            result: None,
            error: Some(JsonRpcError {
                code,
                message: message.into(),
            }),
        }
    }
}

/// Arguments for the `multiagent.run` tool.
#[derive(Debug, Deserialize)]
struct RunToolArguments {
    agent: String,
    prompt: String,
    /// Optional invocation options bundle, same shape as [`RunOptions`].
    #[serde(default)]
    config: RunOptions,
}

/// Exposes a [`Workspace`] over the MCP wire protocol.
///
/// The server is stateless between requests; all state (agent registry,
/// history) lives in the workspace. A failed request produces a structured
/// error response and never terminates the serve loop.
pub struct McpServer {
    workspace: Arc<Workspace>,
    server_name: String,
}

impl McpServer {
    pub fn new(workspace: Arc<Workspace>) -> Self {
        Self::with_name(workspace, "musher-local")
    }

    pub fn with_name(workspace: Arc<Workspace>, server_name: impl Into<String>) -> Self {
        Self {
            workspace,
            server_name: server_name.into(),
        }
    }

    /// Dispatch one request to a response.
    pub async fn handle_request(&self, request: JsonRpcRequest) -> JsonRpcResponse {
        let id = request.id.unwrap_or(Value::Null);
        debug!(method = %request.method, "mcp request");

        match request.method.as_str() {
            "initialize" => JsonRpcResponse::ok(id, self.initialize_result()),
            "tools/list" => JsonRpcResponse::ok(id, self.list_tools_result()),
            "tools/call" => self.handle_call_tool(id, request.params).await,
            other => JsonRpcResponse::fail(
                id,
                METHOD_NOT_FOUND,
                format!("unsupported method '{other}'"),
            ),
        }
    }

    fn initialize_result(&self) -> Value {
        json!({
            "protocolVersion": PROTOCOL_VERSION,
            "serverInfo": {
                "name": self.server_name,
                "version": env!("CARGO_PKG_VERSION"),
            },
            "capabilities": {
                "tools": {"listChanged": false},
            },
        })
    }

    fn list_tools_result(&self) -> Value {
        json!({
            "tools": [
                {
                    "name": TOOL_NAME,
                    "description": "Run a prompt on behalf of a registered agent.",
                    "inputSchema": {
                        "type": "object",
                        "required": ["agent", "prompt"],
                        "properties": {
                            "agent": {"type": "string"},
                            "prompt": {"type": "string"},
                            "config": {"type": "object"},
                        },
                    },
                }
            ]
        })
    }

    async fn handle_call_tool(&self, id: Value, params: Option<Value>) -> JsonRpcResponse {
        let Some(params) = params else {
            return JsonRpcResponse::fail(id, INVALID_PARAMS, "tools/call requires params");
        };

        let tool_name = match params.get("name").and_then(Value::as_str) {
            Some(name) => name,
            None => {
                return JsonRpcResponse::fail(id, INVALID_PARAMS, "tool name must be a string");
            }
        };
        if tool_name != TOOL_NAME {
            return JsonRpcResponse::fail(
                id,
                INVALID_PARAMS,
                format!("unknown tool '{tool_name}'"),
            );
        }

        let arguments = params.get("arguments").cloned().unwrap_or(json!({}));
        let arguments: RunToolArguments = match serde_json::from_value(arguments) {
            Ok(arguments) => arguments,
            Err(e) => {
                return JsonRpcResponse::fail(id, INVALID_PARAMS, format!("invalid arguments: {e}"));
            }
        };

        match self
            .workspace
            .run(&arguments.agent, &arguments.prompt, arguments.config)
            .await
        {
            Ok(result) => {
                let mut payload = json!({
                    "content": [
                        {
                            "type": "text",
                            "text": result.last_message().unwrap_or(""),
                        }
                    ],
                    "isError": !result.succeeded(),
                });

                let mut metadata = serde_json::Map::new();
                if !result.errors.is_empty() {
                    metadata.insert("errors".to_string(), json!(result.errors));
                }
                if let Some(usage) = result.usage {
                    metadata.insert(
                        "usage".to_string(),
                        json!({
                            "input": usage.input_tokens,
                            "cached": usage.cached_input_tokens,
                            "output": usage.output_tokens,
                        }),
                    );
                }
                if !metadata.is_empty() {
                    payload["metadata"] = Value::Object(metadata);
                }

                JsonRpcResponse::ok(id, payload)
            }
            Err(e) => {
                warn!(agent = %arguments.agent, error = %e, "tool dispatch failed");
                JsonRpcResponse::fail(id, DISPATCH_FAILED, e.to_string())
            }
        }
    }

    /// Serve newline-delimited requests until the reader reaches EOF.
    ///
    /// Blank lines are skipped; unparsable lines are answered with a parse
    /// error. One failed request never stops the loop.
    pub async fn serve<R, W>(&self, reader: R, mut writer: W) -> std::io::Result<()>
    where
        R: AsyncBufRead + Unpin,
        W: AsyncWrite + Unpin,
    {
        let mut lines = reader.lines();
        while let Some(line) = lines.next_line().await? {
            let line = line.trim();
            if line.is_empty() {
                continue;
            }

            let response = match serde_json::from_str::<JsonRpcRequest>(line) {
                Ok(request) => self.handle_request(request).await,
                Err(e) => {
                    JsonRpcResponse::fail(Value::Null, PARSE_ERROR, format!("parse error: {e}"))
                }
            };

            let payload = serde_json::to_string(&response).map_err(std::io::Error::other)?;
            writer.write_all(payload.as_bytes()).await?;
            writer.write_all(b"\n").await?;
            writer.flush().await?;
        }
        Ok(())
    }
}

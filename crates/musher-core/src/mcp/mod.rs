//! Minimal MCP-flavoured JSON-RPC adapter over a [`Workspace`].
//!
//! Implements just enough of the protocol for other agent-orchestration
//! systems to drive registered agents: `initialize`, `tools/list`, and a
//! single `tools/call` tool. Requests and responses are newline-delimited
//! JSON objects; see [`McpServer::serve`].
//!
//! [`Workspace`]: crate::workspace::Workspace

pub mod server;

pub use server::{JsonRpcRequest, JsonRpcResponse, McpServer, TOOL_NAME};

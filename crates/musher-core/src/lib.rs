//! Core library for musher: drive the [Codex CLI] from Rust.
//!
//! The crate shells out to the `codex` executable, parses the JSON event
//! stream produced by `codex exec --experimental-json`, and layers two
//! conveniences on top:
//!
//! - a [`workspace::Workspace`] that coordinates several named agents over
//!   one project tree, serialising runs per agent and recording history;
//! - an [`mcp::McpServer`] exposing that workspace to other orchestration
//!   systems over a small JSON-RPC surface.
//!
//! ```text
//! caller
//!   |
//!   v
//! CodexClient::run --spawn--> codex exec --experimental-json
//!   |                              |
//!   |   stdout JSONL --> EventAggregator --> RunResult
//!   |   stderr  ------> buffered diagnostics
//!   v
//! Workspace::run (per-agent lock, history)
//!   |
//!   v
//! McpServer (initialize / tools/list / tools/call)
//! ```
//!
//! There is deliberately no process-wide default client; construct a
//! [`client::CodexClient`] and pass it where it is needed.
//!
//! [Codex CLI]: https://github.com/openai/codex

pub mod client;
pub mod events;
pub mod mcp;
pub mod runner;
pub mod workspace;

// Re-export the primary public API at the crate root.
pub use client::{
    ClientError, CodexClient, ConfigOverrides, LoginMode, LoginOptions, LoginStatus, Resume,
    RunOptions, SandboxMode,
};
pub use events::{EventAggregator, RunResult, ThreadEvent, Usage};
pub use mcp::McpServer;
pub use runner::Runner;
pub use workspace::{AgentInfo, AgentRun, RegisterOptions, Workspace, WorkspaceError};

//! `musher mcp serve` -- expose a workspace over stdio.

use std::path::Path;
use std::sync::Arc;

use anyhow::Context;
use tokio::io::BufReader;
use tracing::info;

use musher_core::client::CodexClient;
use musher_core::mcp::McpServer;
use musher_core::workspace::{RegisterOptions, Workspace};

/// Parse an `--agent` spec: `NAME` or `NAME=RELATIVE/PATH`.
fn parse_agent_spec(spec: &str) -> (&str, Option<&str>) {
    match spec.split_once('=') {
        Some((name, path)) => (name, Some(path)),
        None => (spec, None),
    }
}

pub async fn run_serve(
    client: Arc<CodexClient>,
    root: &Path,
    agent_specs: &[String],
    server_name: &str,
) -> anyhow::Result<()> {
    std::fs::create_dir_all(root)
        .with_context(|| format!("failed to create workspace root {}", root.display()))?;

    let workspace = Workspace::new(root, client)
        .with_context(|| format!("failed to open workspace at {}", root.display()))?;

    for spec in agent_specs {
        let (name, relative) = parse_agent_spec(spec);
        workspace
            .register(
                name,
                RegisterOptions {
                    relative_path: relative.map(Into::into),
                    ..RegisterOptions::default()
                },
            )
            .with_context(|| format!("failed to register agent '{name}'"))?;
    }

    info!(
        root = %root.display(),
        agents = agent_specs.len(),
        "serving workspace over stdio"
    );

    let server = McpServer::with_name(Arc::new(workspace), server_name);
    server
        .serve(BufReader::new(tokio::io::stdin()), tokio::io::stdout())
        .await
        .context("mcp serve loop failed")?;
    Ok(())
}

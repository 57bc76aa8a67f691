//! `musher` -- drive the Codex CLI from the command line.

mod serve_cmd;

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, bail};
use clap::{Parser, Subcommand};

use musher_core::client::{
    CodexClient, ConfigOverrides, LoginMode, LoginOptions, Resume, RunOptions, SandboxMode,
};
use musher_core::events::{ItemKind, ThreadEvent};

#[derive(Parser)]
#[command(name = "musher", about = "Drive the Codex CLI and coordinate local agent teams")]
struct Cli {
    /// Name or path of the codex binary
    #[arg(long, global = true, default_value = "codex")]
    codex_bin: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run a single prompt through codex exec
    Exec {
        /// The prompt to execute
        prompt: String,
        /// Image attachments
        #[arg(long = "image")]
        images: Vec<PathBuf>,
        /// Model override
        #[arg(long)]
        model: Option<String>,
        /// Use a local open-source model
        #[arg(long)]
        oss: bool,
        /// Configuration profile
        #[arg(long)]
        profile: Option<String>,
        /// Low-friction sandboxed auto-execution
        #[arg(long)]
        full_auto: bool,
        /// Skip approvals and sandboxing entirely
        #[arg(long)]
        dangerously_bypass_approvals: bool,
        /// Sandbox policy: read-only, workspace-write or danger-full-access
        #[arg(long)]
        sandbox: Option<String>,
        /// Working directory for the run
        #[arg(long)]
        cd: Option<PathBuf>,
        /// Skip the git repository check
        #[arg(long)]
        skip_git_repo_check: bool,
        /// Expose the plan tool to the agent
        #[arg(long)]
        include_plan_tool: bool,
        /// Write the final assistant message to this file
        #[arg(long)]
        output_last_message: Option<PathBuf>,
        /// Constrain the final message with this JSON schema file
        #[arg(long)]
        output_schema: Option<PathBuf>,
        /// Configuration override, key=value (repeatable)
        #[arg(short = 'c', long = "config")]
        overrides: Vec<String>,
        /// Resume the most recent session
        #[arg(long, conflicts_with = "resume")]
        resume_last: bool,
        /// Resume a specific session id
        #[arg(long)]
        resume: Option<String>,
        /// Skip the login-status pre-flight check
        #[arg(long)]
        skip_login_check: bool,
    },
    /// Authenticate with codex
    Login {
        /// Log in with an API key instead of the ChatGPT flow
        #[arg(long)]
        api_key: Option<String>,
        /// Use the experimental device-code flow
        #[arg(long)]
        device_code: bool,
    },
    /// Remove stored codex credentials
    Logout,
    /// Show the current authentication status
    Status,
    /// MCP protocol adapter
    Mcp {
        #[command(subcommand)]
        command: McpCommands,
    },
}

#[derive(Subcommand)]
enum McpCommands {
    /// Serve a multi-agent workspace over stdio
    Serve {
        /// Workspace root directory (created if missing)
        #[arg(long)]
        root: PathBuf,
        /// Agent to register: NAME or NAME=RELATIVE/PATH (repeatable)
        #[arg(long = "agent", required = true)]
        agents: Vec<String>,
        /// Server name reported by initialize
        #[arg(long, default_value = "musher-local")]
        server_name: String,
    },
}

async fn cmd_exec(
    client: &CodexClient,
    prompt: &str,
    options: RunOptions,
) -> anyhow::Result<()> {
    let result = client
        .run_with_events(prompt, &options, |event| {
            // Stream assistant text as it arrives; everything else is noise
            // at this level.
            if let Some(ThreadEvent::ItemCompleted { item: Some(item) }) =
                ThreadEvent::classify(event)
            {
                if let Some(details) = item.details {
                    if details.item_type == Some(ItemKind::AssistantMessage) {
                        if let Some(text) = details.text {
                            println!("{text}");
                        }
                    }
                }
            }
        })
        .await
        .context("codex exec failed")?;

    if let Some(usage) = result.usage {
        eprintln!(
            "tokens: {} input ({} cached), {} output, {} total",
            usage.input_tokens,
            usage.cached_input_tokens,
            usage.output_tokens,
            usage.total_tokens()
        );
    }
    if !result.succeeded() {
        bail!("run finished with errors: {}", result.errors.join("; "));
    }
    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let client = CodexClient::with_binary(&cli.codex_bin);

    match cli.command {
        Commands::Exec {
            prompt,
            images,
            model,
            oss,
            profile,
            full_auto,
            dangerously_bypass_approvals,
            sandbox,
            cd,
            skip_git_repo_check,
            include_plan_tool,
            output_last_message,
            output_schema,
            overrides,
            resume_last,
            resume,
            skip_login_check,
        } => {
            let sandbox_mode = sandbox
                .map(|s| s.parse::<SandboxMode>().map_err(anyhow::Error::msg))
                .transpose()?;
            let resume = if resume_last {
                Some(Resume::Last)
            } else {
                resume.map(Resume::Session)
            };
            let options = RunOptions {
                images,
                model,
                oss,
                profile,
                full_auto,
                dangerously_bypass_approvals,
                sandbox_mode,
                cwd: cd,
                skip_git_repo_check,
                include_plan_tool,
                last_message_path: output_last_message,
                output_schema,
                config_overrides: ConfigOverrides::Raw(overrides),
                resume,
                require_login: !skip_login_check,
                ..RunOptions::default()
            };
            cmd_exec(&client, &prompt, options).await?;
        }
        Commands::Login {
            api_key,
            device_code,
        } => {
            let options = LoginOptions {
                mode: if api_key.is_some() {
                    LoginMode::ApiKey
                } else {
                    LoginMode::ChatGpt
                },
                api_key,
                use_device_code: device_code,
                ..LoginOptions::default()
            };
            client.login(&options).await.context("login failed")?;
            println!("Logged in.");
        }
        Commands::Logout => {
            client.logout().await.context("logout failed")?;
            println!("Logged out.");
        }
        Commands::Status => {
            let status = client.login_status().await?;
            println!("{}", status.message);
            if !status.logged_in {
                std::process::exit(1);
            }
        }
        Commands::Mcp { command } => match command {
            McpCommands::Serve {
                root,
                agents,
                server_name,
            } => {
                serve_cmd::run_serve(Arc::new(client), &root, &agents, &server_name).await?;
            }
        },
    }

    Ok(())
}

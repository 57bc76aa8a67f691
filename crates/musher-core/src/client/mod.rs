//! The process invoker: spawns the `codex` executable and turns its
//! experimental JSON output into a [`RunResult`].

pub mod auth;
pub mod options;

pub use auth::{LoginMode, LoginOptions, LoginStatus};
pub use options::{ConfigOverrides, Resume, RunOptions, SandboxMode};

use std::collections::HashMap;
use std::io::ErrorKind;
use std::path::Path;
use std::process::Stdio;

use serde_json::Value;
use thiserror::Error;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::Command;
use tracing::{debug, warn};

use crate::events::aggregator::MalformedEvent;
use crate::events::{EventAggregator, RunResult};

/// Errors raised by [`CodexClient`].
#[derive(Debug, Error)]
pub enum ClientError {
    /// The configured executable could not be found.
    #[error("codex binary '{binary}' was not found on PATH")]
    BinaryNotFound { binary: String },

    /// The executable exists but `--version` did not succeed.
    #[error("failed to invoke '{binary} --version': {stderr}")]
    BinaryCheckFailed { binary: String, stderr: String },

    /// The child process could not be spawned.
    #[error("failed to spawn '{binary}': {source}")]
    Spawn {
        binary: String,
        #[source]
        source: std::io::Error,
    },

    /// A caller-supplied option combination is unusable.
    #[error("invalid invocation options: {0}")]
    InvalidOptions(String),

    /// An operation required authentication but codex is logged out.
    #[error("codex is not authenticated; log in before invoking run")]
    NotAuthenticated,

    /// `codex login` / `codex logout` exited unsuccessfully.
    #[error("{0}")]
    LoginFailed(String),

    /// The event stream contained an undecodable line.
    #[error(transparent)]
    MalformedEvent(#[from] MalformedEvent),

    /// `codex exec` exited with a non-zero status.
    ///
    /// Carries the captured diagnostic text and whatever was aggregated
    /// before the failure.
    #[error("codex exec exited with status {status}")]
    RunFailed {
        status: i32,
        stderr: String,
        partial: Box<RunResult>,
    },

    /// I/O failure while talking to the child process.
    #[error("i/o error while running codex: {0}")]
    Io(#[from] std::io::Error),
}

/// Wrapper around the Codex CLI executable.
///
/// Holds the binary name/path and an environment overlay applied to every
/// invocation (caller overrides win over the inherited process environment).
/// Construction is cheap and does not touch the binary; call
/// [`CodexClient::verify_binary`] to surface a missing installation early.
#[derive(Clone)]
pub struct CodexClient {
    binary: String,
    base_env: HashMap<String, String>,
}

impl std::fmt::Debug for CodexClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        // The env overlay may hold credentials; only the binary is printed.
        f.debug_struct("CodexClient")
            .field("binary", &self.binary)
            .finish()
    }
}

impl Default for CodexClient {
    fn default() -> Self {
        Self::new()
    }
}

impl CodexClient {
    /// Create a client that looks for `codex` on `$PATH`.
    pub fn new() -> Self {
        Self::with_binary("codex")
    }

    /// Create a client with a custom binary path.
    pub fn with_binary(binary: impl Into<String>) -> Self {
        Self {
            binary: binary.into(),
            base_env: HashMap::new(),
        }
    }

    /// Add an environment variable to every invocation made by this client.
    pub fn env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.base_env.insert(key.into(), value.into());
        self
    }

    /// Point the CLI at an alternate `CODEX_HOME` directory.
    pub fn codex_home(self, path: impl AsRef<Path>) -> Self {
        let path = path.as_ref().display().to_string();
        self.env("CODEX_HOME", path)
    }

    /// The binary name or path this client invokes.
    pub fn binary(&self) -> &str {
        &self.binary
    }

    fn command(&self) -> Command {
        let mut cmd = Command::new(&self.binary);
        cmd.envs(&self.base_env);
        cmd
    }

    fn spawn_error(&self, source: std::io::Error) -> ClientError {
        if source.kind() == ErrorKind::NotFound {
            ClientError::BinaryNotFound {
                binary: self.binary.clone(),
            }
        } else {
            ClientError::Spawn {
                binary: self.binary.clone(),
                source,
            }
        }
    }

    /// Run `codex --version` to confirm the binary is present and usable.
    pub async fn verify_binary(&self) -> Result<(), ClientError> {
        let output = self
            .command()
            .arg("--version")
            .stdin(Stdio::null())
            .output()
            .await
            .map_err(|e| self.spawn_error(e))?;

        if output.status.success() {
            Ok(())
        } else {
            Err(ClientError::BinaryCheckFailed {
                binary: self.binary.clone(),
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            })
        }
    }

    /// Run `codex exec` for a prompt and aggregate its event stream.
    ///
    /// Resolves once the child has exited and both of its output streams are
    /// fully drained. See [`CodexClient::run_with_events`] to observe events
    /// as they arrive.
    pub async fn run(&self, prompt: &str, options: &RunOptions) -> Result<RunResult, ClientError> {
        self.run_with_events(prompt, options, |_| {}).await
    }

    /// Like [`CodexClient::run`], invoking `on_event` synchronously with
    /// each freshly aggregated event, in arrival order, on the task that
    /// drains the stream.
    pub async fn run_with_events<F>(
        &self,
        prompt: &str,
        options: &RunOptions,
        mut on_event: F,
    ) -> Result<RunResult, ClientError>
    where
        F: FnMut(&Value),
    {
        if options.require_login {
            let status = self.login_status_with_env(&options.env).await?;
            if !status.logged_in {
                return Err(ClientError::NotAuthenticated);
            }
        }

        let args = options.to_exec_args(prompt);
        debug!(binary = %self.binary, ?args, "spawning codex exec");

        let mut child = self
            .command()
            .args(&args)
            .envs(&options.env)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|e| self.spawn_error(e))?;

        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| std::io::Error::other("child stdout was not captured"))?;
        let stderr = child
            .stderr
            .take()
            .ok_or_else(|| std::io::Error::other("child stderr was not captured"))?;

        // Auxiliary drain so a chatty stderr can never block the stdout
        // consumer (or vice versa). Joined before returning.
        let stderr_task = tokio::spawn(async move {
            let mut buffered = String::new();
            let mut lines = BufReader::new(stderr).lines();
            while let Ok(Some(line)) = lines.next_line().await {
                buffered.push_str(&line);
                buffered.push('\n');
            }
            buffered
        });

        let mut aggregator = EventAggregator::new();
        let mut lines = BufReader::new(stdout).lines();
        loop {
            let line = match lines.next_line().await {
                Ok(Some(line)) => line,
                Ok(None) => break,
                Err(e) => {
                    let _ = child.kill().await;
                    let _ = child.wait().await;
                    stderr_task.abort();
                    return Err(ClientError::Io(e));
                }
            };
            match aggregator.push_line(&line) {
                Ok(Some(event)) => on_event(event),
                Ok(None) => {}
                Err(malformed) => {
                    // The stream can no longer be trusted; stop the child
                    // before surfacing the offending line.
                    let _ = child.kill().await;
                    let _ = child.wait().await;
                    stderr_task.abort();
                    return Err(ClientError::MalformedEvent(malformed));
                }
            }
        }

        let status = child.wait().await?;
        let stderr_text = stderr_task.await.unwrap_or_else(|e| {
            warn!(error = %e, "stderr drain task failed");
            String::new()
        });

        let result = aggregator.finish(stderr_text);
        if !status.success() {
            return Err(ClientError::RunFailed {
                status: status.code().unwrap_or(-1),
                stderr: result.stderr.clone(),
                partial: Box::new(result),
            });
        }

        debug!(
            events = result.events.len(),
            thread_id = result.thread_id.as_deref().unwrap_or(""),
            "codex exec completed"
        );
        Ok(result)
    }
}

//! Authentication helpers: wrappers over `codex login` / `codex logout`.
//!
//! The CLI reports status as human-readable text (usually on stderr) and
//! signals "logged out" with a non-zero exit code, so classification is a
//! substring heuristic over the combined output.

use std::collections::HashMap;
use std::process::Stdio;

use tracing::debug;

use super::{ClientError, CodexClient};

/// Authentication mode in use by the Codex CLI.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoginMode {
    ChatGpt,
    ApiKey,
    /// Logged in, but the status text matched no known mode.
    Unknown,
    /// Not logged in.
    LoggedOut,
}

/// Result of `codex login status`.
#[derive(Debug, Clone)]
pub struct LoginStatus {
    pub logged_in: bool,
    pub mode: LoginMode,
    /// The CLI's status text, verbatim.
    pub message: String,
}

/// Options for [`CodexClient::login`].
#[derive(Debug, Clone)]
pub struct LoginOptions {
    /// Which authentication flow to start. `ApiKey` requires `api_key`.
    pub mode: LoginMode,
    pub api_key: Option<String>,
    /// Use the experimental device-code flow instead of the local server.
    pub use_device_code: bool,
    /// Experimental OAuth issuer override.
    pub issuer: Option<String>,
    /// Experimental OAuth client id override.
    pub client_id: Option<String>,
    /// Capture the CLI's output and return it instead of inheriting the
    /// terminal. The ChatGPT flow prints a URL the user must open, so the
    /// default is to stream straight through.
    pub capture_output: bool,
    /// Extra environment for the login subprocess.
    pub env: HashMap<String, String>,
}

impl Default for LoginOptions {
    fn default() -> Self {
        Self {
            mode: LoginMode::ChatGpt,
            api_key: None,
            use_device_code: false,
            issuer: None,
            client_id: None,
            capture_output: false,
            env: HashMap::new(),
        }
    }
}

fn classify_logged_in(message: &str) -> LoginMode {
    if message.contains("ChatGPT") {
        LoginMode::ChatGpt
    } else if message.contains("API key") {
        LoginMode::ApiKey
    } else {
        LoginMode::Unknown
    }
}

impl CodexClient {
    /// Query the current authentication status via `codex login status`.
    pub async fn login_status(&self) -> Result<LoginStatus, ClientError> {
        self.login_status_with_env(&HashMap::new()).await
    }

    /// [`CodexClient::login_status`] with extra environment variables.
    pub async fn login_status_with_env(
        &self,
        extra_env: &HashMap<String, String>,
    ) -> Result<LoginStatus, ClientError> {
        let output = self
            .command()
            .args(["login", "status"])
            .envs(extra_env)
            .stdin(Stdio::null())
            .output()
            .await
            .map_err(|e| self.spawn_error(e))?;

        let stderr = String::from_utf8_lossy(&output.stderr);
        let stdout = String::from_utf8_lossy(&output.stdout);
        let message = if stderr.trim().is_empty() {
            stdout.trim().to_string()
        } else {
            stderr.trim().to_string()
        };

        let status = if output.status.success() {
            LoginStatus {
                logged_in: true,
                mode: classify_logged_in(&message),
                message,
            }
        } else {
            LoginStatus {
                logged_in: false,
                mode: LoginMode::LoggedOut,
                message: if message.is_empty() {
                    "Not logged in".to_string()
                } else {
                    message
                },
            }
        };
        debug!(logged_in = status.logged_in, mode = ?status.mode, "codex login status");
        Ok(status)
    }

    /// Authenticate with codex.
    ///
    /// Returns the captured combined output when
    /// [`LoginOptions::capture_output`] is set, `None` otherwise.
    pub async fn login(&self, options: &LoginOptions) -> Result<Option<String>, ClientError> {
        let mut args = vec!["login".to_string()];

        match options.mode {
            LoginMode::ApiKey => {
                let api_key = options.api_key.as_ref().ok_or_else(|| {
                    ClientError::InvalidOptions(
                        "an API key must be provided when logging in with mode api-key".to_string(),
                    )
                })?;
                args.push("--api-key".to_string());
                args.push(api_key.clone());
            }
            _ => {
                if options.use_device_code {
                    args.push("--experimental_use-device-code".to_string());
                }
                if let Some(issuer) = &options.issuer {
                    args.push("--experimental_issuer".to_string());
                    args.push(issuer.clone());
                }
                if let Some(client_id) = &options.client_id {
                    args.push("--experimental_client-id".to_string());
                    args.push(client_id.clone());
                }
            }
        }

        let mut cmd = self.command();
        cmd.args(&args).envs(&options.env);

        if options.capture_output {
            let output = cmd
                .stdin(Stdio::null())
                .output()
                .await
                .map_err(|e| self.spawn_error(e))?;
            let mut combined = String::from_utf8_lossy(&output.stdout).into_owned();
            combined.push_str(&String::from_utf8_lossy(&output.stderr));
            if !output.status.success() {
                let message = combined.trim();
                return Err(ClientError::LoginFailed(if message.is_empty() {
                    format!(
                        "codex login exited with status {}",
                        output.status.code().unwrap_or(-1)
                    )
                } else {
                    message.to_string()
                }));
            }
            Ok(Some(combined))
        } else {
            // Inherit stdio so the user sees the login URL / device code.
            let status = cmd.status().await.map_err(|e| self.spawn_error(e))?;
            if !status.success() {
                return Err(ClientError::LoginFailed(
                    "codex login exited with a non-zero status".to_string(),
                ));
            }
            Ok(None)
        }
    }

    /// Remove stored codex credentials via `codex logout`.
    pub async fn logout(&self) -> Result<(), ClientError> {
        let output = self
            .command()
            .arg("logout")
            .stdin(Stdio::null())
            .output()
            .await
            .map_err(|e| self.spawn_error(e))?;

        if output.status.success() {
            Ok(())
        } else {
            let stderr = String::from_utf8_lossy(&output.stderr);
            let stdout = String::from_utf8_lossy(&output.stdout);
            let message = if stderr.trim().is_empty() {
                stdout.trim().to_string()
            } else {
                stderr.trim().to_string()
            };
            Err(ClientError::LoginFailed(if message.is_empty() {
                "failed to log out".to_string()
            } else {
                message
            }))
        }
    }
}

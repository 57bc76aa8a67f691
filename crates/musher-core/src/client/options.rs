//! Invocation options for `codex exec` and their argument-vector encoding.

use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

use serde::Deserialize;
use serde_json::Value;

/// Sandbox policy forwarded to `codex exec --sandbox`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SandboxMode {
    ReadOnly,
    WorkspaceWrite,
    DangerFullAccess,
}

impl SandboxMode {
    pub fn as_flag(&self) -> &'static str {
        match self {
            SandboxMode::ReadOnly => "read-only",
            SandboxMode::WorkspaceWrite => "workspace-write",
            SandboxMode::DangerFullAccess => "danger-full-access",
        }
    }
}

impl fmt::Display for SandboxMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_flag())
    }
}

impl FromStr for SandboxMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "read-only" => Ok(SandboxMode::ReadOnly),
            "workspace-write" => Ok(SandboxMode::WorkspaceWrite),
            "danger-full-access" => Ok(SandboxMode::DangerFullAccess),
            other => Err(format!(
                "unknown sandbox mode {other:?} (expected \"read-only\", \
                 \"workspace-write\" or \"danger-full-access\")"
            )),
        }
    }
}

/// Session continuation directive: `codex exec resume [--last | <id>]`.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Resume {
    /// Resume the most recent session (`--last`).
    Last,
    /// Resume a specific session by id.
    Session(String),
}

/// `-c key=value` configuration overrides.
///
/// The map form formats each entry in key order; the raw form passes
/// pre-formatted `key=value` strings through unchanged. Either way each
/// entry becomes its own `-c` flag-value pair.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(untagged)]
pub enum ConfigOverrides {
    Map(BTreeMap<String, Value>),
    Raw(Vec<String>),
}

impl Default for ConfigOverrides {
    fn default() -> Self {
        ConfigOverrides::Map(BTreeMap::new())
    }
}

impl ConfigOverrides {
    pub fn is_empty(&self) -> bool {
        match self {
            ConfigOverrides::Map(map) => map.is_empty(),
            ConfigOverrides::Raw(entries) => entries.is_empty(),
        }
    }

    fn append_args(&self, args: &mut Vec<String>) {
        match self {
            ConfigOverrides::Map(map) => {
                for (key, value) in map {
                    args.push("-c".to_string());
                    args.push(format!("{key}={}", render_override_value(value)));
                }
            }
            ConfigOverrides::Raw(entries) => {
                for entry in entries {
                    args.push("-c".to_string());
                    args.push(entry.clone());
                }
            }
        }
    }
}

/// Scalar strings are rendered bare; everything else as compact JSON, which
/// is what the codex config parser expects for non-string values.
fn render_override_value(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// Options for one `codex exec` invocation.
///
/// Mirrors the CLI flag surface; every field is optional. `Deserialize` with
/// per-field defaults so the MCP adapter can decode an options bundle from
/// request params.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RunOptions {
    /// Image attachments, one `--image` flag each.
    pub images: Vec<PathBuf>,
    /// Model override (`--model`).
    pub model: Option<String>,
    /// Use a local open-source model (`--oss`).
    pub oss: bool,
    /// Configuration profile (`--profile`).
    pub profile: Option<String>,
    /// Low-friction sandboxed auto-execution (`--full-auto`).
    pub full_auto: bool,
    /// `--dangerously-bypass-approvals-and-sandbox`.
    pub dangerously_bypass_approvals: bool,
    /// Sandbox policy (`--sandbox`).
    pub sandbox_mode: Option<SandboxMode>,
    /// Working directory for the invocation (`--cd`).
    pub cwd: Option<PathBuf>,
    /// `--skip-git-repo-check`.
    pub skip_git_repo_check: bool,
    /// `--include-plan-tool`.
    pub include_plan_tool: bool,
    /// Write the final assistant message here (`--output-last-message`).
    pub last_message_path: Option<PathBuf>,
    /// JSON schema constraining the final message (`--output-schema`).
    pub output_schema: Option<PathBuf>,
    /// `-c key=value` overrides.
    pub config_overrides: ConfigOverrides,
    /// Continue a previous session instead of starting fresh.
    pub resume: Option<Resume>,
    /// Check `codex login status` before spawning and refuse to run while
    /// logged out. Defaults to true.
    pub require_login: bool,
    /// Extra environment variables for this invocation; win over both the
    /// inherited environment and the client's own overlay.
    pub env: HashMap<String, String>,
}

impl Default for RunOptions {
    fn default() -> Self {
        Self {
            images: Vec::new(),
            model: None,
            oss: false,
            profile: None,
            full_auto: false,
            dangerously_bypass_approvals: false,
            sandbox_mode: None,
            cwd: None,
            skip_git_repo_check: false,
            include_plan_tool: false,
            last_message_path: None,
            output_schema: None,
            config_overrides: ConfigOverrides::default(),
            resume: None,
            require_login: true,
            env: HashMap::new(),
        }
    }
}

impl RunOptions {
    /// Build the argument vector for `codex exec`.
    ///
    /// Deterministic: fixed subcommand and format flags first, then one flag
    /// per supplied option in a stable order, then config overrides, then
    /// the resume directive (if any), then the prompt.
    pub fn to_exec_args(&self, prompt: &str) -> Vec<String> {
        let mut args = vec!["exec".to_string(), "--experimental-json".to_string()];

        for image in &self.images {
            args.push("--image".to_string());
            args.push(image.display().to_string());
        }
        if let Some(model) = &self.model {
            args.push("--model".to_string());
            args.push(model.clone());
        }
        if self.oss {
            args.push("--oss".to_string());
        }
        if let Some(profile) = &self.profile {
            args.push("--profile".to_string());
            args.push(profile.clone());
        }
        if self.full_auto {
            args.push("--full-auto".to_string());
        }
        if self.dangerously_bypass_approvals {
            args.push("--dangerously-bypass-approvals-and-sandbox".to_string());
        }
        if let Some(mode) = self.sandbox_mode {
            args.push("--sandbox".to_string());
            args.push(mode.as_flag().to_string());
        }
        if let Some(cwd) = &self.cwd {
            args.push("--cd".to_string());
            args.push(cwd.display().to_string());
        }
        if self.skip_git_repo_check {
            args.push("--skip-git-repo-check".to_string());
        }
        if self.include_plan_tool {
            args.push("--include-plan-tool".to_string());
        }
        if let Some(path) = &self.last_message_path {
            args.push("--output-last-message".to_string());
            args.push(path.display().to_string());
        }
        if let Some(path) = &self.output_schema {
            args.push("--output-schema".to_string());
            args.push(path.display().to_string());
        }

        self.config_overrides.append_args(&mut args);

        match &self.resume {
            Some(Resume::Last) => {
                args.push("resume".to_string());
                args.push("--last".to_string());
            }
            Some(Resume::Session(id)) => {
                args.push("resume".to_string());
                args.push(id.clone());
            }
            None => {}
        }

        args.push(prompt.to_string());
        args
    }
}

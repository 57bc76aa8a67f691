//! Multi-agent coordination over a shared project tree.
//!
//! A [`Workspace`] maps agent names to working directories under one root
//! and serialises each agent's invocations with a per-agent lock. Distinct
//! agents run fully concurrently; two invocations for the *same* agent are
//! strictly ordered. Every successful run is appended to that agent's
//! history; a failed run propagates to the caller without an entry.

use std::path::{Component, Path, PathBuf};
use std::sync::{Arc, RwLock};

use chrono::{DateTime, Utc};
use thiserror::Error;
use tracing::{debug, info};

use crate::client::{ClientError, RunOptions};
use crate::events::RunResult;
use crate::runner::Runner;

/// Errors raised by [`Workspace`].
#[derive(Debug, Error)]
pub enum WorkspaceError {
    /// An agent with this name is already registered.
    #[error("agent '{0}' is already registered")]
    DuplicateAgent(String),

    /// The requested working directory is not under the workspace root.
    #[error("agent working directory '{}' is outside the workspace root", .path.display())]
    PathEscape { path: PathBuf },

    /// No agent with this name is registered.
    #[error("unknown agent '{0}'")]
    UnknownAgent(String),

    /// The underlying invocation failed.
    #[error(transparent)]
    Client(#[from] ClientError),

    /// Filesystem failure while resolving or creating directories.
    #[error("workspace i/o error: {0}")]
    Io(#[from] std::io::Error),
}

/// Record of one invocation issued through the workspace.
#[derive(Debug, Clone)]
pub struct AgentRun {
    /// Name of the agent that ran.
    pub agent: String,
    /// The prompt that was executed.
    pub prompt: String,
    /// The aggregated result.
    pub result: RunResult,
    /// When the run completed.
    pub timestamp: DateTime<Utc>,
}

/// Public snapshot of a registered agent.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AgentInfo {
    pub name: String,
    pub working_directory: PathBuf,
}

/// Options for [`Workspace::register`].
#[derive(Debug, Clone)]
pub struct RegisterOptions {
    /// Directory the agent operates from, relative to the workspace root.
    /// When omitted the agent uses the root itself.
    pub relative_path: Option<PathBuf>,
    /// Create the directory if it does not exist. Defaults to true;
    /// creation is idempotent.
    pub create_missing: bool,
}

impl Default for RegisterOptions {
    fn default() -> Self {
        Self {
            relative_path: None,
            create_missing: true,
        }
    }
}

struct AgentEntry {
    name: String,
    working_directory: PathBuf,
    /// Serialises this agent's invocations and guards the history append.
    history: tokio::sync::Mutex<Vec<AgentRun>>,
}

/// Shared root and agent registry coordinating multiple agents.
pub struct Workspace {
    root: PathBuf,
    runner: Arc<dyn Runner>,
    /// Registration order is preserved; names are unique.
    agents: RwLock<Vec<Arc<AgentEntry>>>,
}

impl std::fmt::Debug for Workspace {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let names: Vec<String> = self
            .read_agents()
            .iter()
            .map(|a| a.name.clone())
            .collect();
        f.debug_struct("Workspace")
            .field("root", &self.root)
            .field("runner", &self.runner.name())
            .field("agents", &names)
            .finish()
    }
}

impl Workspace {
    /// Create a workspace rooted at an existing directory.
    pub fn new(root: impl AsRef<Path>, runner: Arc<dyn Runner>) -> Result<Self, WorkspaceError> {
        let root = std::fs::canonicalize(root.as_ref())?;
        Ok(Self {
            root,
            runner,
            agents: RwLock::new(Vec::new()),
        })
    }

    /// Path to the workspace root shared across agents.
    pub fn root(&self) -> &Path {
        &self.root
    }

    fn read_agents(&self) -> Vec<Arc<AgentEntry>> {
        self.agents
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    fn agent_entry(&self, name: &str) -> Result<Arc<AgentEntry>, WorkspaceError> {
        self.agents
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .iter()
            .find(|agent| agent.name == name)
            .cloned()
            .ok_or_else(|| WorkspaceError::UnknownAgent(name.to_string()))
    }

    /// Register a new agent.
    ///
    /// Fails with [`WorkspaceError::DuplicateAgent`] if the name is taken
    /// and with [`WorkspaceError::PathEscape`] if the resolved directory
    /// would lie outside the root.
    pub fn register(
        &self,
        name: &str,
        options: RegisterOptions,
    ) -> Result<AgentInfo, WorkspaceError> {
        let working_directory = match &options.relative_path {
            Some(relative) => resolve_under_root(&self.root, relative)?,
            None => self.root.clone(),
        };

        let mut agents = self.agents.write().unwrap_or_else(|e| e.into_inner());
        if agents.iter().any(|agent| agent.name == name) {
            return Err(WorkspaceError::DuplicateAgent(name.to_string()));
        }

        if options.create_missing {
            std::fs::create_dir_all(&working_directory)?;
        }

        info!(agent = name, dir = %working_directory.display(), "registered agent");
        agents.push(Arc::new(AgentEntry {
            name: name.to_string(),
            working_directory: working_directory.clone(),
            history: tokio::sync::Mutex::new(Vec::new()),
        }));

        Ok(AgentInfo {
            name: name.to_string(),
            working_directory,
        })
    }

    /// Registered agents, in registration order.
    pub fn agents(&self) -> Vec<AgentInfo> {
        self.read_agents()
            .iter()
            .map(|agent| AgentInfo {
                name: agent.name.clone(),
                working_directory: agent.working_directory.clone(),
            })
            .collect()
    }

    /// Look up one registered agent.
    pub fn agent(&self, name: &str) -> Result<AgentInfo, WorkspaceError> {
        let entry = self.agent_entry(name)?;
        Ok(AgentInfo {
            name: entry.name.clone(),
            working_directory: entry.working_directory.clone(),
        })
    }

    /// Execute a prompt for a registered agent.
    ///
    /// The working directory defaults to the agent's directory unless the
    /// caller supplied one. Invocations for the same agent are serialised
    /// by the agent's lock; the lock also covers the history append, so
    /// history order matches execution order.
    pub async fn run(
        &self,
        agent_name: &str,
        prompt: &str,
        mut options: RunOptions,
    ) -> Result<RunResult, WorkspaceError> {
        let agent = self.agent_entry(agent_name)?;

        if options.cwd.is_none() {
            options.cwd = Some(agent.working_directory.clone());
        }

        let mut history = agent.history.lock().await;
        debug!(agent = agent_name, "starting run");
        let result = self.runner.run_prompt(prompt, &options).await?;
        history.push(AgentRun {
            agent: agent.name.clone(),
            prompt: prompt.to_string(),
            result: result.clone(),
            timestamp: Utc::now(),
        });
        debug!(agent = agent_name, runs = history.len(), "run recorded");
        Ok(result)
    }

    /// Captured history for one agent (append order) or for the whole
    /// workspace (merged, sorted by timestamp ascending; ties keep
    /// registration-then-append order thanks to the stable sort).
    pub async fn history(
        &self,
        agent_name: Option<&str>,
    ) -> Result<Vec<AgentRun>, WorkspaceError> {
        match agent_name {
            Some(name) => {
                let agent = self.agent_entry(name)?;
                let history = agent.history.lock().await;
                Ok(history.clone())
            }
            None => {
                let mut runs = Vec::new();
                for agent in self.read_agents() {
                    let history = agent.history.lock().await;
                    runs.extend(history.iter().cloned());
                }
                runs.sort_by_key(|run| run.timestamp);
                Ok(runs)
            }
        }
    }
}

/// Lexically resolve `path` against `root` and reject anything that would
/// land outside it. Deliberately does not hit the filesystem: agent
/// directories may not exist yet.
fn resolve_under_root(root: &Path, path: &Path) -> Result<PathBuf, WorkspaceError> {
    let mut resolved = if path.is_absolute() {
        PathBuf::new()
    } else {
        root.to_path_buf()
    };

    for component in path.components() {
        match component {
            Component::Prefix(prefix) => resolved.push(prefix.as_os_str()),
            Component::RootDir => resolved.push(Component::RootDir),
            Component::CurDir => {}
            Component::ParentDir => {
                resolved.pop();
            }
            Component::Normal(part) => resolved.push(part),
        }
    }

    if resolved.starts_with(root) {
        Ok(resolved)
    } else {
        Err(WorkspaceError::PathEscape {
            path: path.to_path_buf(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn resolve_plain_relative_path() {
        let root = Path::new("/work/project");
        let resolved = resolve_under_root(root, Path::new("team/bob")).unwrap();
        assert_eq!(resolved, PathBuf::from("/work/project/team/bob"));
    }

    #[test]
    fn resolve_collapses_dot_and_dotdot() {
        let root = Path::new("/work/project");
        let resolved = resolve_under_root(root, Path::new("team/./x/../bob")).unwrap();
        assert_eq!(resolved, PathBuf::from("/work/project/team/bob"));
    }

    #[test]
    fn resolve_rejects_escape_via_dotdot() {
        let root = Path::new("/work/project");
        assert!(matches!(
            resolve_under_root(root, Path::new("../outside")),
            Err(WorkspaceError::PathEscape { .. })
        ));
        assert!(matches!(
            resolve_under_root(root, Path::new("team/../../outside")),
            Err(WorkspaceError::PathEscape { .. })
        ));
    }

    #[test]
    fn resolve_accepts_absolute_path_inside_root() {
        let root = Path::new("/work/project");
        let resolved = resolve_under_root(root, Path::new("/work/project/sub")).unwrap();
        assert_eq!(resolved, PathBuf::from("/work/project/sub"));
    }

    #[test]
    fn resolve_rejects_absolute_path_outside_root() {
        let root = Path::new("/work/project");
        assert!(matches!(
            resolve_under_root(root, Path::new("/elsewhere")),
            Err(WorkspaceError::PathEscape { .. })
        ));
    }

    #[test]
    fn resolve_root_itself_via_dotdot_chain_is_rejected_when_below_root() {
        let root = Path::new("/work/project");
        // "a/.." resolves back to the root, which is allowed.
        let resolved = resolve_under_root(root, Path::new("a/..")).unwrap();
        assert_eq!(resolved, PathBuf::from("/work/project"));
    }
}

//! The `Runner` trait -- the seam between the workspace and the process
//! invoker.
//!
//! [`Workspace`](crate::workspace::Workspace) depends on `Arc<dyn Runner>`
//! rather than on [`CodexClient`] directly, so coordination logic can be
//! exercised without spawning real subprocesses.

use async_trait::async_trait;

use crate::client::{ClientError, CodexClient, RunOptions};
use crate::events::RunResult;

/// Something that can execute a prompt and report an aggregated result.
///
/// Object-safe so it can be shared as `Arc<dyn Runner>`.
#[async_trait]
pub trait Runner: Send + Sync {
    /// Human-readable name for this runner (e.g. "codex").
    fn name(&self) -> &str;

    /// Execute one prompt to completion.
    async fn run_prompt(
        &self,
        prompt: &str,
        options: &RunOptions,
    ) -> Result<RunResult, ClientError>;
}

#[async_trait]
impl Runner for CodexClient {
    fn name(&self) -> &str {
        "codex"
    }

    async fn run_prompt(
        &self,
        prompt: &str,
        options: &RunOptions,
    ) -> Result<RunResult, ClientError> {
        self.run(prompt, options).await
    }
}

// Compile-time assertion: Runner must be object-safe.
const _: () = {
    fn _assert_object_safe(_: &dyn Runner) {}
};

#[cfg(test)]
mod tests {
    use super::*;

    struct EchoRunner;

    #[async_trait]
    impl Runner for EchoRunner {
        fn name(&self) -> &str {
            "echo"
        }

        async fn run_prompt(
            &self,
            prompt: &str,
            _options: &RunOptions,
        ) -> Result<RunResult, ClientError> {
            Ok(RunResult {
                events: vec![],
                assistant_messages: vec![format!("echo:{prompt}")],
                reasoning: vec![],
                usage: None,
                errors: vec![],
                raw_output: String::new(),
                stderr: String::new(),
                thread_id: None,
            })
        }
    }

    #[tokio::test]
    async fn trait_usable_as_object() {
        let runner: Box<dyn Runner> = Box::new(EchoRunner);
        assert_eq!(runner.name(), "echo");
        let result = runner
            .run_prompt("hi", &RunOptions::default())
            .await
            .unwrap();
        assert_eq!(result.last_message(), Some("echo:hi"));
    }

    #[test]
    fn codex_client_is_a_runner() {
        let client = CodexClient::new();
        assert_eq!(Runner::name(&client), "codex");
    }
}

//! Test helpers: fabricate fake `codex`-shaped executables.
//!
//! Tests exercise the invoker end-to-end by pointing it at a shell script
//! that mimics the real CLI: it answers `--version` and `login`/`logout`
//! subcommands, then plays back a scripted JSONL stream for `exec`. The
//! script can also append its argument vector to a file so tests can assert
//! on exactly what would have been passed to the real binary.

use std::path::{Path, PathBuf};

use serde_json::Value;

/// Builder for a fake codex executable.
///
/// ```no_run
/// use musher_test_utils::FakeCodex;
/// use serde_json::json;
///
/// let dir = tempfile::tempdir().unwrap();
/// let binary = FakeCodex::new()
///     .event(json!({"type": "thread.started", "thread_id": "t1"}))
///     .stderr_line("warming up")
///     .write(dir.path(), "fake_codex.sh");
/// ```
#[derive(Debug, Clone, Default)]
pub struct FakeCodex {
    stdout_lines: Vec<StdoutLine>,
    stderr_lines: Vec<String>,
    exit_code: i32,
    login_message: Option<String>,
    login_exit: i32,
    logout_message: Option<String>,
    logout_exit: i32,
    args_file: Option<PathBuf>,
    sleep_secs: Option<u32>,
}

#[derive(Debug, Clone)]
enum StdoutLine {
    /// Emitted verbatim via a quoted `printf`.
    Literal(String),
    /// Inserted as-is into the script, so `$VAR` / `$(cmd)` expand.
    Shell(String),
}

impl FakeCodex {
    pub fn new() -> Self {
        Self {
            login_message: Some("Logged in using ChatGPT".to_string()),
            ..Self::default()
        }
    }

    /// Emit a JSON event on stdout.
    pub fn event(mut self, event: Value) -> Self {
        self.stdout_lines.push(StdoutLine::Literal(event.to_string()));
        self
    }

    /// Emit a raw line on stdout (useful for malformed-stream tests).
    pub fn raw_line(mut self, line: impl Into<String>) -> Self {
        self.stdout_lines.push(StdoutLine::Literal(line.into()));
        self
    }

    /// Insert a shell command that produces one stdout line, with variable
    /// and command substitution intact (e.g. `echo "...$(pwd)..."`).
    pub fn shell_line(mut self, command: impl Into<String>) -> Self {
        self.stdout_lines.push(StdoutLine::Shell(command.into()));
        self
    }

    /// Emit a diagnostic line on stderr.
    pub fn stderr_line(mut self, line: impl Into<String>) -> Self {
        self.stderr_lines.push(line.into());
        self
    }

    /// Exit status for `exec` invocations (default 0).
    pub fn exit_code(mut self, code: i32) -> Self {
        self.exit_code = code;
        self
    }

    /// Report "logged in" for `login status` with the given status text.
    pub fn logged_in(mut self, message: impl Into<String>) -> Self {
        self.login_message = Some(message.into());
        self.login_exit = 0;
        self
    }

    /// Report "logged out": `login status` prints the message and exits 1.
    pub fn logged_out(mut self, message: impl Into<String>) -> Self {
        self.login_message = Some(message.into());
        self.login_exit = 1;
        self
    }

    /// Scripted behaviour for `logout`.
    pub fn logout_response(mut self, message: impl Into<String>, exit: i32) -> Self {
        self.logout_message = Some(message.into());
        self.logout_exit = exit;
        self
    }

    /// Append the full argument vector (one argument per line, then a
    /// blank line) to this file on every `exec` invocation.
    pub fn record_args(mut self, path: impl Into<PathBuf>) -> Self {
        self.args_file = Some(path.into());
        self
    }

    /// Sleep before emitting anything, to keep the process alive.
    pub fn sleep_secs(mut self, secs: u32) -> Self {
        self.sleep_secs = Some(secs);
        self
    }

    /// Write the script into `dir` and return its path.
    ///
    /// # Panics
    ///
    /// Panics on I/O failure; this is test-only plumbing.
    pub fn write(&self, dir: &Path, name: &str) -> PathBuf {
        let path = dir.join(name);
        std::fs::write(&path, self.render()).expect("failed to write fake codex script");

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755))
                .expect("failed to mark fake codex script executable");
        }

        path
    }

    fn render(&self) -> String {
        let mut script = String::from("#!/bin/sh\n");

        script.push_str("case \"$1\" in\n");
        script.push_str("  --version)\n    echo \"codex-cli 0.0.0-fake\"\n    exit 0\n    ;;\n");

        let login_message = self.login_message.as_deref().unwrap_or("Not logged in");
        script.push_str("  login)\n");
        script.push_str(&format!(
            "    echo {} >&2\n    exit {}\n    ;;\n",
            shell_quote(login_message),
            self.login_exit
        ));

        let logout_message = self.logout_message.as_deref().unwrap_or("Logged out");
        script.push_str("  logout)\n");
        script.push_str(&format!(
            "    echo {} >&2\n    exit {}\n    ;;\n",
            shell_quote(logout_message),
            self.logout_exit
        ));
        script.push_str("esac\n");

        if let Some(args_file) = &self.args_file {
            script.push_str(&format!(
                "printf '%s\\n' \"$@\" >> {file}\nprintf '\\n' >> {file}\n",
                file = shell_quote(&args_file.display().to_string())
            ));
        }

        if let Some(secs) = self.sleep_secs {
            script.push_str(&format!("sleep {secs}\n"));
        }

        for line in &self.stderr_lines {
            script.push_str(&format!("echo {} >&2\n", shell_quote(line)));
        }

        for line in &self.stdout_lines {
            match line {
                StdoutLine::Literal(text) => {
                    script.push_str(&format!("printf '%s\\n' {}\n", shell_quote(text)));
                }
                StdoutLine::Shell(command) => {
                    script.push_str(command);
                    script.push('\n');
                }
            }
        }

        script.push_str(&format!("exit {}\n", self.exit_code));
        script
    }
}

/// Single-quote a string for POSIX sh, escaping embedded quotes.
fn shell_quote(text: &str) -> String {
    format!("'{}'", text.replace('\'', r#"'\''"#))
}

/// Read an argument-vector recording produced by [`FakeCodex::record_args`]:
/// one invocation per blank-line-separated block, one argument per line.
pub fn read_recorded_args(path: &Path) -> Vec<Vec<String>> {
    let content = std::fs::read_to_string(path).unwrap_or_default();
    content
        .split("\n\n")
        .filter(|block| !block.trim().is_empty())
        .map(|block| block.lines().map(str::to_string).collect())
        .collect()
}

//! End-to-end tests for `CodexClient::run` against fake codex binaries.

use musher_core::client::{ClientError, CodexClient, ConfigOverrides, Resume, RunOptions};
use musher_test_utils::{FakeCodex, read_recorded_args};
use serde_json::{Value, json};
use std::collections::BTreeMap;

fn no_login_check() -> RunOptions {
    RunOptions {
        require_login: false,
        ..RunOptions::default()
    }
}

#[tokio::test]
async fn aggregates_a_full_event_stream() {
    let tmp = tempfile::tempdir().unwrap();
    let binary = FakeCodex::new()
        .event(json!({"type": "thread.started", "thread_id": "t-42"}))
        .event(json!({
            "type": "item.completed",
            "item": {"id": "1", "details": {"item_type": "reasoning", "text": "Considering"}}
        }))
        .event(json!({
            "type": "item.completed",
            "item": {"id": "2", "details": {"item_type": "assistant_message", "text": "All done"}}
        }))
        .event(json!({
            "type": "turn.completed",
            "usage": {"input_tokens": 10, "cached_input_tokens": 4, "output_tokens": 6}
        }))
        .stderr_line("codex: starting")
        .write(tmp.path(), "fake_codex.sh");

    let client = CodexClient::with_binary(binary.display().to_string());
    let result = client.run("do the thing", &no_login_check()).await.unwrap();

    assert_eq!(result.thread_id.as_deref(), Some("t-42"));
    assert_eq!(result.reasoning, vec!["Considering"]);
    assert_eq!(result.assistant_messages, vec!["All done"]);
    assert_eq!(result.last_message(), Some("All done"));
    assert_eq!(result.usage.map(|u| u.total_tokens()), Some(20));
    assert!(result.succeeded());
    assert_eq!(result.events.len(), 4);
    assert!(result.stderr.contains("codex: starting"));
}

#[tokio::test]
async fn run_with_events_sees_events_in_arrival_order() {
    let tmp = tempfile::tempdir().unwrap();
    let binary = FakeCodex::new()
        .event(json!({"type": "thread.started", "thread_id": "t"}))
        .event(json!({"type": "turn.completed", "usage": {"input_tokens": 1}}))
        .write(tmp.path(), "fake_codex.sh");

    let client = CodexClient::with_binary(binary.display().to_string());
    let mut seen = Vec::new();
    client
        .run_with_events("hi", &no_login_check(), |event: &Value| {
            seen.push(
                event
                    .get("type")
                    .and_then(Value::as_str)
                    .unwrap_or("")
                    .to_string(),
            );
        })
        .await
        .unwrap();

    assert_eq!(seen, vec!["thread.started", "turn.completed"]);
}

#[tokio::test]
async fn environment_overlay_wins_over_inherited_values() {
    let tmp = tempfile::tempdir().unwrap();
    // The fake echoes $MUSHER_PROBE back as a thread id.
    let binary = FakeCodex::new()
        .shell_line(
            r#"printf '{"type":"thread.started","thread_id":"%s"}\n' "$MUSHER_PROBE""#,
        )
        .write(tmp.path(), "fake_codex.sh");

    let client =
        CodexClient::with_binary(binary.display().to_string()).env("MUSHER_PROBE", "from-client");
    let result = client.run("hi", &no_login_check()).await.unwrap();
    assert_eq!(result.thread_id.as_deref(), Some("from-client"));

    // A per-run override beats the client overlay.
    let mut options = no_login_check();
    options
        .env
        .insert("MUSHER_PROBE".to_string(), "from-run".to_string());
    let result = client.run("hi", &options).await.unwrap();
    assert_eq!(result.thread_id.as_deref(), Some("from-run"));
}

#[tokio::test]
async fn nonzero_exit_carries_stderr_and_partial_output() {
    let tmp = tempfile::tempdir().unwrap();
    let binary = FakeCodex::new()
        .event(json!({
            "type": "item.completed",
            "item": {"details": {"item_type": "assistant_message", "text": "partial"}}
        }))
        .stderr_line("codex: out of quota")
        .exit_code(2)
        .write(tmp.path(), "fake_codex.sh");

    let client = CodexClient::with_binary(binary.display().to_string());
    let err = client.run("hi", &no_login_check()).await.unwrap_err();
    match err {
        ClientError::RunFailed {
            status,
            stderr,
            partial,
        } => {
            assert_eq!(status, 2);
            assert!(stderr.contains("out of quota"));
            assert_eq!(partial.assistant_messages, vec!["partial"]);
        }
        other => panic!("expected RunFailed, got {other:?}"),
    }
}

#[tokio::test]
async fn malformed_stream_line_aborts_the_run() {
    let tmp = tempfile::tempdir().unwrap();
    let binary = FakeCodex::new()
        .event(json!({"type": "thread.started", "thread_id": "t"}))
        .raw_line("this is not json")
        .write(tmp.path(), "fake_codex.sh");

    let client = CodexClient::with_binary(binary.display().to_string());
    let err = client.run("hi", &no_login_check()).await.unwrap_err();
    match err {
        ClientError::MalformedEvent(malformed) => {
            assert_eq!(malformed.line, "this is not json");
        }
        other => panic!("expected MalformedEvent, got {other:?}"),
    }
}

#[tokio::test]
async fn missing_binary_is_reported_as_not_found() {
    let client = CodexClient::with_binary("/nonexistent/path/to/codex");
    let err = client.run("hi", &no_login_check()).await.unwrap_err();
    assert!(matches!(err, ClientError::BinaryNotFound { .. }), "{err:?}");
}

#[tokio::test]
async fn verify_binary_succeeds_for_a_working_script() {
    let tmp = tempfile::tempdir().unwrap();
    let binary = FakeCodex::new().write(tmp.path(), "fake_codex.sh");

    let client = CodexClient::with_binary(binary.display().to_string());
    client.verify_binary().await.unwrap();

    let missing = CodexClient::with_binary("/nonexistent/path/to/codex");
    assert!(matches!(
        missing.verify_binary().await.unwrap_err(),
        ClientError::BinaryNotFound { .. }
    ));
}

#[tokio::test]
async fn argument_vector_matches_the_option_set() {
    let tmp = tempfile::tempdir().unwrap();
    let args_file = tmp.path().join("args.txt");
    let binary = FakeCodex::new()
        .record_args(&args_file)
        .write(tmp.path(), "fake_codex.sh");

    let options = RunOptions {
        model: Some("o4-mini".to_string()),
        profile: Some("workspace".to_string()),
        skip_git_repo_check: true,
        config_overrides: ConfigOverrides::Map(BTreeMap::from([
            ("approval".to_string(), json!("never")),
            ("model_reasoning_effort".to_string(), json!("high")),
        ])),
        require_login: false,
        ..RunOptions::default()
    };

    let client = CodexClient::with_binary(binary.display().to_string());
    client.run("build it", &options).await.unwrap();

    let recorded = read_recorded_args(&args_file);
    assert_eq!(recorded.len(), 1);
    assert_eq!(recorded[0], options.to_exec_args("build it"));
    assert_eq!(recorded[0].last().map(String::as_str), Some("build it"));
}

#[tokio::test]
async fn resume_directive_reaches_the_command_line() {
    let tmp = tempfile::tempdir().unwrap();
    let args_file = tmp.path().join("args.txt");
    let binary = FakeCodex::new()
        .record_args(&args_file)
        .write(tmp.path(), "fake_codex.sh");

    let options = RunOptions {
        resume: Some(Resume::Session("sess-9".to_string())),
        require_login: false,
        ..RunOptions::default()
    };

    let client = CodexClient::with_binary(binary.display().to_string());
    client.run("continue", &options).await.unwrap();

    let recorded = read_recorded_args(&args_file);
    assert_eq!(
        recorded[0],
        vec!["exec", "--experimental-json", "resume", "sess-9", "continue"]
    );
}

#[tokio::test]
async fn run_refuses_to_start_while_logged_out() {
    let tmp = tempfile::tempdir().unwrap();
    let args_file = tmp.path().join("args.txt");
    let binary = FakeCodex::new()
        .logged_out("Not logged in")
        .record_args(&args_file)
        .write(tmp.path(), "fake_codex.sh");

    let client = CodexClient::with_binary(binary.display().to_string());
    let err = client
        .run("hi", &RunOptions::default())
        .await
        .unwrap_err();
    assert!(matches!(err, ClientError::NotAuthenticated), "{err:?}");
    // The exec subcommand never ran.
    assert!(read_recorded_args(&args_file).is_empty());
}

#[tokio::test]
async fn login_check_passes_when_authenticated() {
    let tmp = tempfile::tempdir().unwrap();
    let binary = FakeCodex::new()
        .logged_in("Logged in using ChatGPT")
        .event(json!({
            "type": "item.completed",
            "item": {"details": {"item_type": "assistant_message", "text": "ok"}}
        }))
        .write(tmp.path(), "fake_codex.sh");

    let client = CodexClient::with_binary(binary.display().to_string());
    let result = client.run("hi", &RunOptions::default()).await.unwrap();
    assert_eq!(result.last_message(), Some("ok"));
}

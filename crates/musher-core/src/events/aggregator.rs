//! Folds the line-oriented event stream into a [`RunResult`].

use serde_json::Value;
use thiserror::Error;
use tracing::debug;

use super::{ItemKind, RunResult, ThreadEvent, Usage};

/// A stdout line that could not be decoded as JSON.
///
/// Fatal to the invocation that produced it: the stream contract is one JSON
/// object per line, so an undecodable line means the output can no longer be
/// trusted.
#[derive(Debug, Error)]
#[error("undecodable JSON event from codex exec: {line}")]
pub struct MalformedEvent {
    /// The offending raw line, for diagnosis.
    pub line: String,
    #[source]
    pub source: serde_json::Error,
}

/// Accumulates events from `codex exec` one line at a time.
///
/// Lines must be pushed in arrival order. Empty and whitespace-only lines
/// are skipped. Call [`EventAggregator::finish`] at end of stream to obtain
/// the immutable [`RunResult`].
#[derive(Debug, Default)]
pub struct EventAggregator {
    raw_lines: Vec<String>,
    events: Vec<Value>,
    assistant_messages: Vec<String>,
    reasoning: Vec<String>,
    errors: Vec<String>,
    thread_id: Option<String>,
    usage: Option<Usage>,
}

impl EventAggregator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Decode and classify one stdout line.
    ///
    /// Returns the freshly recorded event so callers can forward it to a
    /// per-event callback, or `None` when the line was blank.
    pub fn push_line(&mut self, raw_line: &str) -> Result<Option<&Value>, MalformedEvent> {
        let line = raw_line.trim();
        if line.is_empty() {
            return Ok(None);
        }

        let value: Value = serde_json::from_str(line).map_err(|source| MalformedEvent {
            line: line.to_string(),
            source,
        })?;

        match ThreadEvent::classify(&value) {
            Some(ThreadEvent::ThreadStarted { thread_id }) => {
                // First occurrence wins; later ones are not expected.
                if self.thread_id.is_none() {
                    self.thread_id = thread_id;
                }
            }
            Some(ThreadEvent::ItemCompleted { item }) => {
                if let Some(details) = item.and_then(|item| item.details) {
                    match (details.item_type, details.text) {
                        (Some(ItemKind::AssistantMessage), Some(text)) => {
                            self.assistant_messages.push(text);
                        }
                        (Some(ItemKind::Reasoning), Some(text)) => {
                            self.reasoning.push(text);
                        }
                        _ => {}
                    }
                }
            }
            Some(ThreadEvent::TurnCompleted { usage }) => {
                if let Some(usage) = usage {
                    self.usage = Some(usage);
                }
            }
            Some(ThreadEvent::TurnFailed { error }) => {
                if let Some(message) = error.and_then(|e| e.message) {
                    self.errors.push(message);
                }
            }
            Some(ThreadEvent::Error { message }) => {
                if let Some(message) = message {
                    self.errors.push(message);
                }
            }
            None => {
                debug!(
                    event_type = value.get("type").and_then(|v| v.as_str()).unwrap_or(""),
                    "ignoring unrecognised stream event"
                );
            }
        }

        self.raw_lines.push(line.to_string());
        self.events.push(value);
        Ok(self.events.last())
    }

    /// Number of events recorded so far.
    pub fn event_count(&self) -> usize {
        self.events.len()
    }

    /// Consume the aggregator and produce the final result snapshot.
    pub fn finish(self, stderr: String) -> RunResult {
        RunResult {
            events: self.events,
            assistant_messages: self.assistant_messages,
            reasoning: self.reasoning,
            usage: self.usage,
            errors: self.errors,
            raw_output: self.raw_lines.join("\n"),
            stderr,
            thread_id: self.thread_id,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn push(aggregator: &mut EventAggregator, line: &str) {
        aggregator
            .push_line(line)
            .unwrap_or_else(|e| panic!("line should aggregate: {e}"));
    }

    #[test]
    fn collects_messages_reasoning_and_usage() {
        let mut aggregator = EventAggregator::new();
        push(&mut aggregator, r#"{"type":"thread.started","thread_id":"abc"}"#);
        push(
            &mut aggregator,
            r#"{"type":"item.completed","item":{"id":"1","details":{"item_type":"assistant_message","text":"Hello"}}}"#,
        );
        push(
            &mut aggregator,
            r#"{"type":"item.completed","item":{"id":"2","details":{"item_type":"reasoning","text":"Thinking"}}}"#,
        );
        push(
            &mut aggregator,
            r#"{"type":"turn.completed","usage":{"input_tokens":7,"cached_input_tokens":2,"output_tokens":5}}"#,
        );

        let result = aggregator.finish(String::new());
        assert_eq!(result.thread_id.as_deref(), Some("abc"));
        assert_eq!(result.assistant_messages, vec!["Hello"]);
        assert_eq!(result.reasoning, vec!["Thinking"]);
        let usage = result.usage.expect("usage recorded");
        assert_eq!(usage.input_tokens, 7);
        assert_eq!(usage.cached_input_tokens, 2);
        assert_eq!(usage.output_tokens, 5);
        assert_eq!(usage.total_tokens(), 14);
        assert!(result.succeeded());
        assert_eq!(result.last_message(), Some("Hello"));
        assert_eq!(result.events.len(), 4);
    }

    #[test]
    fn records_errors_from_turn_failed_and_error_events() {
        let mut aggregator = EventAggregator::new();
        push(&mut aggregator, r#"{"type":"turn.failed","error":{"message":"failure"}}"#);
        push(&mut aggregator, r#"{"type":"error","message":"secondary"}"#);

        let result = aggregator.finish("boom".to_string());
        assert!(!result.succeeded());
        assert_eq!(result.errors, vec!["failure", "secondary"]);
        assert_eq!(result.stderr, "boom");
    }

    #[test]
    fn first_thread_id_wins() {
        let mut aggregator = EventAggregator::new();
        push(&mut aggregator, r#"{"type":"thread.started","thread_id":"first"}"#);
        push(&mut aggregator, r#"{"type":"thread.started","thread_id":"second"}"#);
        let result = aggregator.finish(String::new());
        assert_eq!(result.thread_id.as_deref(), Some("first"));
    }

    #[test]
    fn last_usage_wins() {
        let mut aggregator = EventAggregator::new();
        push(
            &mut aggregator,
            r#"{"type":"turn.completed","usage":{"input_tokens":1,"cached_input_tokens":0,"output_tokens":1}}"#,
        );
        push(
            &mut aggregator,
            r#"{"type":"turn.completed","usage":{"input_tokens":9,"cached_input_tokens":3,"output_tokens":4}}"#,
        );
        let result = aggregator.finish(String::new());
        assert_eq!(result.usage.map(|u| u.input_tokens), Some(9));
    }

    #[test]
    fn unknown_event_types_are_recorded_but_ignored() {
        let mut aggregator = EventAggregator::new();
        push(&mut aggregator, r#"{"type":"turn.started","turn_id":"t1"}"#);
        let result = aggregator.finish(String::new());
        assert_eq!(result.events.len(), 1);
        assert!(result.assistant_messages.is_empty());
        assert!(result.errors.is_empty());
        assert!(result.succeeded());
    }

    #[test]
    fn blank_lines_are_skipped() {
        let mut aggregator = EventAggregator::new();
        assert!(aggregator.push_line("").unwrap().is_none());
        assert!(aggregator.push_line("   \t").unwrap().is_none());
        assert_eq!(aggregator.event_count(), 0);
    }

    #[test]
    fn malformed_line_is_fatal_and_surfaces_the_line() {
        let mut aggregator = EventAggregator::new();
        let err = aggregator
            .push_line("this is not json")
            .expect_err("malformed line must error");
        assert_eq!(err.line, "this is not json");
    }

    #[test]
    fn push_line_returns_the_recorded_event() {
        let mut aggregator = EventAggregator::new();
        let event = aggregator
            .push_line(r#"{"type":"thread.started","thread_id":"abc"}"#)
            .unwrap()
            .expect("non-blank line records an event");
        assert_eq!(
            event.get("type").and_then(Value::as_str),
            Some("thread.started")
        );
    }

    #[test]
    fn raw_output_joins_lines_with_newlines() {
        let mut aggregator = EventAggregator::new();
        push(&mut aggregator, r#"{"type":"a.b"}"#);
        push(&mut aggregator, r#"{"type":"c.d"}"#);
        let result = aggregator.finish(String::new());
        assert_eq!(result.raw_output, "{\"type\":\"a.b\"}\n{\"type\":\"c.d\"}");
    }
}

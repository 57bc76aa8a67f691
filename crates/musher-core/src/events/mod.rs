//! Typed model for the `codex exec --experimental-json` event stream.
//!
//! The CLI emits one JSON object per line on stdout, each carrying a `type`
//! discriminator. [`ThreadEvent`] decodes the shapes this crate reacts to;
//! every other `type` is kept as a raw [`serde_json::Value`] but otherwise
//! ignored, so new event kinds never break aggregation.

pub mod aggregator;

pub use aggregator::EventAggregator;

use serde::Deserialize;
use serde_json::Value;

/// Token usage counters reported by a `turn.completed` event.
///
/// Only the most recently seen `turn.completed` is retained for a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
pub struct Usage {
    #[serde(default)]
    pub input_tokens: u64,
    #[serde(default)]
    pub cached_input_tokens: u64,
    #[serde(default)]
    pub output_tokens: u64,
}

impl Usage {
    /// Total tokens consumed (input + cached input + output).
    pub fn total_tokens(&self) -> u64 {
        self.input_tokens + self.cached_input_tokens + self.output_tokens
    }
}

/// Kind of a completed item, from `item.details.item_type`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ItemKind {
    AssistantMessage,
    Reasoning,
    /// Any item type this crate does not track.
    #[serde(other)]
    Other,
}

/// Detail payload nested inside an `item.completed` event.
#[derive(Debug, Clone, Deserialize)]
pub struct ItemDetails {
    #[serde(default)]
    pub item_type: Option<ItemKind>,
    #[serde(default)]
    pub text: Option<String>,
}

/// The item wrapper of an `item.completed` event.
#[derive(Debug, Clone, Deserialize)]
pub struct CompletedItem {
    #[serde(default)]
    pub details: Option<ItemDetails>,
}

/// Error payload of a `turn.failed` event.
#[derive(Debug, Clone, Deserialize)]
pub struct ErrorDetail {
    #[serde(default)]
    pub message: Option<String>,
}

/// One recognised event from the stream, keyed on the `type` field.
///
/// All nested fields are optional: a recognised `type` with an unexpected
/// payload shape still decodes (and the aggregator simply has nothing to
/// collect from it).
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type")]
pub enum ThreadEvent {
    #[serde(rename = "thread.started")]
    ThreadStarted {
        #[serde(default)]
        thread_id: Option<String>,
    },
    #[serde(rename = "item.completed")]
    ItemCompleted {
        #[serde(default)]
        item: Option<CompletedItem>,
    },
    #[serde(rename = "turn.completed")]
    TurnCompleted {
        #[serde(default)]
        usage: Option<Usage>,
    },
    #[serde(rename = "turn.failed")]
    TurnFailed {
        #[serde(default)]
        error: Option<ErrorDetail>,
    },
    #[serde(rename = "error")]
    Error {
        #[serde(default)]
        message: Option<String>,
    },
}

impl ThreadEvent {
    /// Classify a decoded stream event.
    ///
    /// Returns `None` for unknown `type` values and for recognised types
    /// whose nested payload does not match the expected shape -- both are
    /// ignorable, never an error.
    pub fn classify(value: &Value) -> Option<ThreadEvent> {
        serde_json::from_value(value.clone()).ok()
    }
}

/// Structured result of one `codex exec` invocation.
///
/// Built once by [`EventAggregator::finish`] and never mutated afterwards.
#[derive(Debug, Clone)]
pub struct RunResult {
    /// Every decoded event, in arrival order.
    pub events: Vec<Value>,
    /// Texts of `item.completed` assistant-message items, in arrival order.
    pub assistant_messages: Vec<String>,
    /// Texts of `item.completed` reasoning items, in arrival order.
    pub reasoning: Vec<String>,
    /// Counters from the last `turn.completed` event, if any.
    pub usage: Option<Usage>,
    /// Messages from `turn.failed` and `error` events, in arrival order.
    pub errors: Vec<String>,
    /// The raw stdout lines, newline-joined.
    pub raw_output: String,
    /// Everything the CLI wrote to stderr.
    pub stderr: String,
    /// `thread_id` from the first `thread.started` event, if any.
    pub thread_id: Option<String>,
}

impl RunResult {
    /// The final assistant message, if the run produced one.
    pub fn last_message(&self) -> Option<&str> {
        self.assistant_messages.last().map(String::as_str)
    }

    /// True when the run finished without emitting an error event.
    pub fn succeeded(&self) -> bool {
        self.errors.is_empty()
    }
}

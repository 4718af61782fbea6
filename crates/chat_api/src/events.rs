use serde::{Deserialize, Serialize};

/// Reserved line prefix for tool-invocation log entries.
pub const STEP_MARKER: &str = "[STEP]";
/// Reserved line prefix for tool-result log entries.
pub const OBS_MARKER: &str = "[OBS]";
/// Reserved terminal line; everything after it is discarded.
pub const DONE_MARKER: &str = "[DONE]";

/// Kind of auxiliary log entry surfaced alongside the reply text.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepKind {
    Step,
    Observation,
}

impl StepKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Step => "step",
            Self::Observation => "observation",
        }
    }
}

/// Protocol event emitted by the decoder after line classification.
///
/// The wire format is line-framed text, not JSON; these events exist only
/// in memory between the decoder and its consumer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StreamEvent {
    /// One line of assistant prose; `text` keeps its trailing newline so
    /// reassembly preserves paragraph breaks.
    ContentFragment { text: String },
    /// Tool-invocation log entry with the marker stripped and trimmed.
    Step { text: String },
    /// Tool-result log entry with the marker stripped and trimmed.
    Observation { text: String },
    /// Terminal marker; no further events follow.
    Completion,
}

impl StreamEvent {
    /// Returns true when this event terminates the stream.
    #[must_use]
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completion)
    }
}

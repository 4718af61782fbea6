use chat_api::{MessageRole, StepKind, StepRecord, ThreadMessage, DONE_MARKER};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    User,
    Assistant,
}

/// One auxiliary log record: a tool invocation or its result.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StepEntry {
    pub kind: StepKind,
    pub text: String,
}

impl StepEntry {
    #[must_use]
    pub fn step(text: impl Into<String>) -> Self {
        Self {
            kind: StepKind::Step,
            text: text.into(),
        }
    }

    #[must_use]
    pub fn observation(text: impl Into<String>) -> Self {
        Self {
            kind: StepKind::Observation,
            text: text.into(),
        }
    }
}

impl From<StepRecord> for StepEntry {
    fn from(record: StepRecord) -> Self {
        Self {
            kind: record.kind,
            text: record.content,
        }
    }
}

/// One slot in the ordered conversation log.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConversationMessage {
    pub role: Role,
    pub content: String,
    pub image: Option<String>,
    pub timestamp: Option<String>,
    pub is_streaming: bool,
    pub step_log: Vec<StepEntry>,
    pub step_log_visible: bool,
}

impl ConversationMessage {
    fn user(content: impl Into<String>, image: Option<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
            image,
            timestamp: None,
            is_streaming: false,
            step_log: Vec::new(),
            step_log_visible: false,
        }
    }

    fn streaming_placeholder() -> Self {
        Self {
            role: Role::Assistant,
            content: String::new(),
            image: None,
            timestamp: None,
            is_streaming: true,
            step_log: Vec::new(),
            step_log_visible: false,
        }
    }
}

impl From<ThreadMessage> for ConversationMessage {
    fn from(message: ThreadMessage) -> Self {
        Self {
            role: match message.role {
                MessageRole::User => Role::User,
                MessageRole::Assistant => Role::Assistant,
            },
            content: message.content,
            image: message.image,
            timestamp: message.timestamp,
            is_streaming: false,
            step_log: message.steps.into_iter().map(StepEntry::from).collect(),
            step_log_visible: false,
        }
    }
}

/// Ordered conversation log with index-addressed, single-writer-per-index
/// mutation.
///
/// Streaming sessions write exclusively through the index captured at their
/// start; every streaming mutation is a no-op once the message at that index
/// has been finalized, which bounds each session to at most one terminal
/// transition.
#[derive(Debug, Default)]
pub struct ConversationLog {
    messages: Vec<ConversationMessage>,
}

impl ConversationLog {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the log with persisted history fetched from the backend.
    pub fn hydrate(&mut self, messages: Vec<ThreadMessage>) {
        self.messages = messages.into_iter().map(ConversationMessage::from).collect();
    }

    #[must_use]
    pub fn messages(&self) -> &[ConversationMessage] {
        &self.messages
    }

    #[must_use]
    pub fn message(&self, index: usize) -> Option<&ConversationMessage> {
        self.messages.get(index)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.messages.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    /// Number of user turns submitted so far.
    #[must_use]
    pub fn user_turns(&self) -> usize {
        self.messages
            .iter()
            .filter(|message| message.role == Role::User)
            .count()
    }

    /// Append a user turn; returns its index.
    pub fn push_user(&mut self, content: impl Into<String>, image: Option<String>) -> usize {
        self.messages.push(ConversationMessage::user(content, image));
        self.messages.len() - 1
    }

    /// Append an empty streaming assistant slot; returns its index, or
    /// `None` while another message is still streaming (the prior session
    /// must be finalized first).
    ///
    /// The returned index is the session's fixed target: callers must never
    /// re-derive it from the log length later.
    pub fn push_streaming_placeholder(&mut self) -> Option<usize> {
        if self.has_streaming_message() {
            return None;
        }

        self.messages.push(ConversationMessage::streaming_placeholder());
        Some(self.messages.len() - 1)
    }

    #[must_use]
    pub fn has_streaming_message(&self) -> bool {
        self.messages.iter().any(|message| message.is_streaming)
    }

    /// Append a content fragment to the streaming message at `index`.
    ///
    /// Returns the full accumulated content, or `None` once the message is
    /// finalized (late fragments are dropped).
    pub fn append_content(&mut self, index: usize, fragment: &str) -> Option<String> {
        let message = self.streaming_message_mut(index)?;
        message.content.push_str(fragment);
        Some(message.content.clone())
    }

    /// Append a step-log entry to the streaming message at `index`.
    ///
    /// Returns a snapshot of the live step log, or `None` once finalized.
    pub fn push_step(&mut self, index: usize, entry: StepEntry) -> Option<Vec<StepEntry>> {
        let message = self.streaming_message_mut(index)?;
        message.step_log.push(entry);
        Some(message.step_log.clone())
    }

    /// Finalize the message at `index`: strip any done-marker text, trim,
    /// clear the streaming flag, and stamp the completion time.
    ///
    /// Idempotent: returns `false` when the message was already finalized.
    pub fn finalize(&mut self, index: usize, timestamp: Option<String>) -> bool {
        let Some(message) = self.streaming_message_mut(index) else {
            return false;
        };

        message.content = message.content.replace(DONE_MARKER, "").trim().to_string();
        message.is_streaming = false;
        message.timestamp = timestamp;
        true
    }

    /// Flip step-log visibility for the message at `index`.
    ///
    /// Works on live and finalized messages alike; the step log itself lives
    /// in the message, so there is no stale snapshot to disagree with.
    pub fn toggle_step_log(&mut self, index: usize) -> Option<bool> {
        let message = self.messages.get_mut(index)?;
        message.step_log_visible = !message.step_log_visible;
        Some(message.step_log_visible)
    }

    fn streaming_message_mut(&mut self, index: usize) -> Option<&mut ConversationMessage> {
        self.messages
            .get_mut(index)
            .filter(|message| message.is_streaming)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn placeholder_index_is_fixed_and_streaming() {
        let mut log = ConversationLog::new();
        let user = log.push_user("hello", None);
        let target = log.push_streaming_placeholder().unwrap();

        assert_eq!(user, 0);
        assert_eq!(target, 1);
        assert!(log.message(target).unwrap().is_streaming);
        assert_eq!(log.user_turns(), 1);
    }

    #[test]
    fn second_placeholder_is_refused_while_one_streams() {
        let mut log = ConversationLog::new();
        log.push_user("q", None);
        let target = log.push_streaming_placeholder().unwrap();

        assert!(log.has_streaming_message());
        assert_eq!(log.push_streaming_placeholder(), None);
        assert_eq!(log.len(), 2);

        log.finalize(target, None);
        assert!(log.push_streaming_placeholder().is_some());
    }

    #[test]
    fn append_content_accumulates_in_arrival_order() {
        let mut log = ConversationLog::new();
        log.push_user("q", None);
        let target = log.push_streaming_placeholder().unwrap();

        assert_eq!(log.append_content(target, "Hello\n").as_deref(), Some("Hello\n"));
        assert_eq!(
            log.append_content(target, "world\n").as_deref(),
            Some("Hello\nworld\n")
        );
    }

    #[test]
    fn finalize_strips_marker_text_and_is_idempotent() {
        let mut log = ConversationLog::new();
        log.push_user("q", None);
        let target = log.push_streaming_placeholder().unwrap();
        log.append_content(target, "answer [DONE]\n");

        assert!(log.finalize(target, Some("2026-08-23T10:00:00Z".to_string())));
        let message = log.message(target).unwrap();
        assert_eq!(message.content, "answer");
        assert!(!message.is_streaming);
        assert_eq!(message.timestamp.as_deref(), Some("2026-08-23T10:00:00Z"));

        assert!(!log.finalize(target, None));
        assert_eq!(
            log.message(target).unwrap().timestamp.as_deref(),
            Some("2026-08-23T10:00:00Z")
        );
    }

    #[test]
    fn mutations_after_finalize_are_dropped() {
        let mut log = ConversationLog::new();
        log.push_user("q", None);
        let target = log.push_streaming_placeholder().unwrap();
        log.finalize(target, None);

        assert_eq!(log.append_content(target, "late"), None);
        assert_eq!(log.push_step(target, StepEntry::step("late")), None);
        assert_eq!(log.message(target).unwrap().content, "");
    }

    #[test]
    fn toggle_twice_restores_visibility() {
        let mut log = ConversationLog::new();
        log.push_user("q", None);
        let target = log.push_streaming_placeholder().unwrap();
        log.finalize(target, None);

        let original = log.message(target).unwrap().step_log_visible;
        assert_eq!(log.toggle_step_log(target), Some(!original));
        assert_eq!(log.toggle_step_log(target), Some(original));
        assert_eq!(log.toggle_step_log(99), None);
    }

    #[test]
    fn hydrate_maps_persisted_messages() {
        let mut log = ConversationLog::new();
        log.hydrate(vec![
            serde_json::from_str(r#"{ "role": "user", "content": "hi" }"#).unwrap(),
            serde_json::from_str(
                r#"{ "role": "assistant", "content": "hello", "steps": [{ "type": "observation", "content": "ok" }] }"#,
            )
            .unwrap(),
        ]);

        assert_eq!(log.len(), 2);
        assert_eq!(log.messages()[1].role, Role::Assistant);
        assert_eq!(
            log.messages()[1].step_log,
            vec![StepEntry::observation("ok")]
        );
        assert!(log.messages().iter().all(|message| !message.is_streaming));
    }
}

use serde::{Deserialize, Serialize};

use crate::events::StepKind;

/// Request body posted to the streaming chat endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatRequest {
    pub thread_id: String,
    pub question: String,
    /// Pre-uploaded image URL attached to the turn, when present.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub image: Option<String>,
}

impl ChatRequest {
    #[must_use]
    pub fn new(thread_id: impl Into<String>, question: impl Into<String>) -> Self {
        Self {
            thread_id: thread_id.into(),
            question: question.into(),
            image: None,
        }
    }

    #[must_use]
    pub fn with_image(mut self, image: impl Into<String>) -> Self {
        self.image = Some(image.into());
        self
    }
}

/// Thread summary returned by the thread listing endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Thread {
    pub id: String,
    pub title: String,
}

/// Creation response; the backend names the id field differently here.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct CreatedThread {
    pub thread_id: String,
    pub title: String,
}

/// Role attached to a persisted message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MessageRole {
    User,
    Assistant,
}

/// Auxiliary log record persisted with an assistant message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StepRecord {
    #[serde(rename = "type")]
    pub kind: StepKind,
    pub content: String,
}

/// Persisted message fetched from the message-history endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ThreadMessage {
    pub role: MessageRole,
    pub content: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub steps: Vec<StepRecord>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn chat_request_omits_absent_image() {
        let body = serde_json::to_value(ChatRequest::new("t-1", "hello")).unwrap();
        assert_eq!(
            body,
            serde_json::json!({ "thread_id": "t-1", "question": "hello" })
        );

        let with_image =
            serde_json::to_value(ChatRequest::new("t-1", "hello").with_image("/images/a.png"))
                .unwrap();
        assert_eq!(with_image["image"], "/images/a.png");
    }

    #[test]
    fn thread_message_tolerates_missing_optional_fields() {
        let message: ThreadMessage = serde_json::from_str(
            r#"{ "role": "assistant", "content": "Hi", "steps": [{ "type": "step", "content": "call_tool" }] }"#,
        )
        .unwrap();

        assert_eq!(message.role, MessageRole::Assistant);
        assert_eq!(message.timestamp, None);
        assert_eq!(message.steps.len(), 1);
        assert_eq!(message.steps[0].kind, StepKind::Step);
    }
}

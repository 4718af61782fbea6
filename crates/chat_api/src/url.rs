/// Default base URL for the chat backend.
pub const DEFAULT_CHAT_BASE_URL: &str = "http://localhost:8000";

/// Normalize a base URL to the streaming chat endpoint.
///
/// Normalization rules:
/// 1) keep `/chat/stream` unchanged
/// 2) append `/stream` when path ends in `/chat`
/// 3) append `/chat/stream` otherwise
pub fn normalize_stream_url(input: &str) -> String {
    let base = if input.trim().is_empty() {
        DEFAULT_CHAT_BASE_URL
    } else {
        input.trim()
    };

    let trimmed = base.trim_end_matches('/');
    if trimmed.ends_with("/chat/stream") {
        return trimmed.to_string();
    }
    if trimmed.ends_with("/chat") {
        return format!("{trimmed}/stream");
    }
    format!("{trimmed}/chat/stream")
}

pub fn threads_url(base: &str) -> String {
    format!("{}/threads", base_or_default(base))
}

pub fn thread_url(base: &str, thread_id: &str) -> String {
    format!("{}/threads/{thread_id}", base_or_default(base))
}

pub fn messages_url(base: &str, thread_id: &str) -> String {
    format!("{}/messages/{thread_id}", base_or_default(base))
}

fn base_or_default(base: &str) -> &str {
    let trimmed = base.trim().trim_end_matches('/');
    if trimmed.is_empty() {
        DEFAULT_CHAT_BASE_URL
    } else {
        trimmed
    }
}

use std::fmt;

use reqwest::StatusCode;
use serde::Deserialize;
use serde_json::Error as JsonError;

/// Transport and decode errors surfaced by this crate.
///
/// There is deliberately no malformed-framing variant: the decoder treats
/// every unrecognized line as assistant content, so the wire protocol has no
/// invalid-input case.
#[derive(Debug)]
pub enum ChatApiError {
    /// Header key/value could not be represented on the wire.
    InvalidHeader(String),
    /// Request construction or connection failure.
    Request(reqwest::Error),
    /// Non-success status before streaming began; the session never starts.
    Status(StatusCode, String),
    /// Connection dropped or timed out mid-stream; partial state is kept.
    StreamInterrupted(String),
    RetryExhausted {
        status: Option<StatusCode>,
        last_error: Option<String>,
    },
    Serde(JsonError),
    /// Cooperative cancellation observed at a suspension point.
    Cancelled,
    Unknown(String),
}

impl ChatApiError {
    /// True for the explicit-stop case, which is finalized without a notice.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled)
    }
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
    detail: Option<String>,
    message: Option<String>,
    error: Option<String>,
}

impl fmt::Display for ChatApiError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InvalidHeader(value) => write!(f, "invalid header: {value}"),
            Self::Request(error) => write!(f, "request error: {error}"),
            Self::Status(status, message) => write!(f, "HTTP {status} {message}"),
            Self::StreamInterrupted(message) => write!(f, "stream interrupted: {message}"),
            Self::RetryExhausted { status, last_error } => {
                let status = status
                    .map(|status| status.as_u16().to_string())
                    .unwrap_or_else(|| "n/a".to_owned());
                write!(f, "retry exhausted after max attempts (status: {status}, last_error: {last_error:?})")
            }
            Self::Serde(error) => write!(f, "serialization error: {error}"),
            Self::Cancelled => write!(f, "request was cancelled"),
            Self::Unknown(message) => write!(f, "{message}"),
        }
    }
}

impl std::error::Error for ChatApiError {}

impl From<reqwest::Error> for ChatApiError {
    fn from(error: reqwest::Error) -> Self {
        Self::Request(error)
    }
}

impl From<JsonError> for ChatApiError {
    fn from(error: JsonError) -> Self {
        Self::Serde(error)
    }
}

/// Extract a human-readable message from an error response body.
///
/// The backend reports failures as JSON with a `detail` field; older
/// deployments use `message` or `error`. Plain-text bodies pass through.
pub fn parse_error_message(status: StatusCode, body: &str) -> String {
    if let Ok(parsed) = serde_json::from_str::<ErrorBody>(body) {
        if let Some(message) = [parsed.detail, parsed.message, parsed.error]
            .into_iter()
            .flatten()
            .find(|value| !value.trim().is_empty())
        {
            return message;
        }
    }

    if body.trim().is_empty() {
        status
            .canonical_reason()
            .unwrap_or("request failed")
            .to_string()
    } else {
        body.to_string()
    }
}

//! Transport-only chat backend client primitives.
//!
//! This crate owns request building, line-framed reply decoding, and the
//! plain request/response thread-store calls. It intentionally contains no
//! credential lifecycle code and no conversation or UI state.
//!
//! The reply protocol is newline-delimited UTF-8 text with three reserved
//! line forms: `[STEP]<text>`, `[OBS]<text>`, and a bare `[DONE]` terminal
//! line; every other line is assistant content. Decoding is
//! chunking-invariant: the carry buffer in [`StreamDecoder`] makes splits
//! inside markers and inside multi-byte code points safe.

pub mod client;
pub mod config;
pub mod decoder;
pub mod error;
pub mod events;
pub mod headers;
pub mod payload;
pub mod threads;
pub mod url;

pub use client::{CancellationSignal, ChatApiClient, StreamEnd, StreamResult};
pub use config::ChatApiConfig;
pub use decoder::StreamDecoder;
pub use error::ChatApiError;
pub use events::{StepKind, StreamEvent, DONE_MARKER, OBS_MARKER, STEP_MARKER};
pub use payload::{ChatRequest, CreatedThread, MessageRole, StepRecord, Thread, ThreadMessage};
pub use url::normalize_stream_url;

pub use reqwest::StatusCode;

//! Streaming conversational client core.
//!
//! Invariant: single writer per index — a streaming session mutates the
//! conversation log only through the target index captured when it started,
//! never through "whatever is currently last".
//!
//! # Public API Overview
//! - Submit turns and stream replies via [`ChatSessions`].
//! - Inspect and toggle conversation state via [`ConversationLog`].
//! - Plug transports in at the [`ChatTransport`] seam; [`HttpChatTransport`]
//!   is the real backend adapter over `chat_api`.
//!
//! Each session runs on its own worker thread; every decoded event is
//! applied under the log mutex and published as a [`SessionUpdate`] in
//! arrival order, and nothing is published for an index after its
//! finalization write.

pub mod conversation;
pub mod error;
pub mod session;
pub mod transport;

pub use conversation::{ConversationLog, ConversationMessage, Role, StepEntry};
pub use error::SessionError;
pub use session::{
    derive_title, ChatSessions, SessionHandle, SessionId, SessionOutcome, SessionUpdate,
    UpdateListener, TITLE_MAX_CHARS,
};
pub use transport::{CancelSignal, ChatTransport, HttpChatTransport};

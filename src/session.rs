use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::thread::{self, JoinHandle};

use chat_api::{ChatApiError, ChatRequest, StreamEvent};
use time::format_description::well_known::Rfc3339;
use time::OffsetDateTime;

use crate::conversation::{ConversationLog, StepEntry};
use crate::error::SessionError;
use crate::transport::{CancelSignal, ChatTransport};

pub type SessionId = u64;

/// Maximum length, in characters, of a derived thread title.
pub const TITLE_MAX_CHARS: usize = 30;

/// How a session reached its terminal state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionOutcome {
    Completed,
    /// Explicit stop; partial output kept, no error notice.
    Cancelled,
    /// Non-success status before streaming began; the reply never started.
    Rejected { notice: String },
    /// Connection dropped mid-stream; partial output kept.
    Interrupted { notice: String },
}

impl SessionOutcome {
    /// User-visible notice text, when this outcome warrants one.
    #[must_use]
    pub fn notice(&self) -> Option<&str> {
        match self {
            Self::Completed | Self::Cancelled => None,
            Self::Rejected { notice } | Self::Interrupted { notice } => Some(notice),
        }
    }
}

/// Incremental state published to the UI, in strict arrival order.
///
/// No update for an index is ever published after that index's `Finalized`
/// update.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionUpdate {
    Content { index: usize, content: String },
    StepLog { index: usize, step_log: Vec<StepEntry> },
    Finalized { index: usize, outcome: SessionOutcome },
}

/// Listener invoked for every published update.
///
/// Invoked while the conversation log is locked, which is what orders each
/// update strictly after the state write it reports. Listeners must hand the
/// update off (channel, queue) and must not call back into [`ChatSessions`]
/// or the log.
pub type UpdateListener = Arc<dyn Fn(SessionUpdate) + Send + Sync>;

/// Handle returned by [`ChatSessions::start_session`].
#[derive(Debug, Clone)]
pub struct SessionHandle {
    pub session_id: SessionId,
    /// The conversation-log slot this session finalizes into; fixed at start.
    pub target_index: usize,
}

struct ActiveSession {
    session_id: SessionId,
    target_index: usize,
    cancel: CancelSignal,
}

struct SessionContext {
    session_id: SessionId,
    target_index: usize,
    cancel: CancelSignal,
    request: ChatRequest,
    first_turn: bool,
}

/// Session aggregator for one conversation thread.
///
/// Owns at most one active streaming session at a time. Each session
/// captures its target index at start and writes only through that index;
/// starting a new session first cancels and finalizes the prior one, so the
/// log never holds two streaming messages.
pub struct ChatSessions {
    transport: Arc<dyn ChatTransport>,
    log: Arc<Mutex<ConversationLog>>,
    on_update: UpdateListener,
    thread_id: String,
    next_session_id: AtomicU64,
    active: Mutex<Option<ActiveSession>>,
    workers: Mutex<Vec<JoinHandle<()>>>,
}

impl ChatSessions {
    pub fn new(
        thread_id: impl Into<String>,
        transport: Arc<dyn ChatTransport>,
        log: Arc<Mutex<ConversationLog>>,
        on_update: UpdateListener,
    ) -> Arc<Self> {
        Arc::new(Self {
            transport,
            log,
            on_update,
            thread_id: thread_id.into(),
            next_session_id: AtomicU64::new(1),
            active: Mutex::new(None),
            workers: Mutex::new(Vec::new()),
        })
    }

    /// Shared conversation log backing this thread.
    #[must_use]
    pub fn log(&self) -> Arc<Mutex<ConversationLog>> {
        Arc::clone(&self.log)
    }

    /// Submit a user turn and start streaming the reply.
    ///
    /// Appends the user message and a streaming placeholder, captures the
    /// placeholder's index as the session's fixed target, and spawns a worker
    /// that drives the transport. A still-active prior session is cancelled
    /// and finalized with its partial output before anything is appended.
    pub fn start_session(
        self: &Arc<Self>,
        question: &str,
        image: Option<String>,
    ) -> Result<SessionHandle, SessionError> {
        let question = question.trim();
        if question.is_empty() {
            return Err(SessionError::EmptyQuestion);
        }

        // The active guard is held across displacement, log mutation, and
        // registration, so concurrent starts and stops serialize fully.
        let mut active = self.lock_active();
        if let Some(prior) = active.take() {
            prior.cancel.store(true, Ordering::SeqCst);
            self.finalize_session(prior.target_index, SessionOutcome::Cancelled);
        }

        let (target_index, first_turn) = {
            let mut log = lock_unpoisoned(&self.log);
            if log.has_streaming_message() {
                return Err(SessionError::SessionActive);
            }
            log.push_user(question, image.clone());
            let first_turn = log.user_turns() == 1;
            let Some(target_index) = log.push_streaming_placeholder() else {
                return Err(SessionError::SessionActive);
            };
            (target_index, first_turn)
        };

        let session_id = self.next_session_id.fetch_add(1, Ordering::SeqCst);
        let cancel: CancelSignal = Arc::new(AtomicBool::new(false));

        let mut request = ChatRequest::new(self.thread_id.clone(), question);
        if let Some(image) = image {
            request = request.with_image(image);
        }

        let context = SessionContext {
            session_id,
            target_index,
            cancel: Arc::clone(&cancel),
            request,
            first_turn,
        };

        *active = Some(ActiveSession {
            session_id,
            target_index,
            cancel,
        });

        match self.spawn_worker(context) {
            Ok(handle) => {
                drop(active);
                self.reap_finished_workers();
                lock_unpoisoned(&self.workers).push(handle);
                Ok(SessionHandle {
                    session_id,
                    target_index,
                })
            }
            Err(error) => {
                *active = None;
                drop(active);
                self.finalize_session(
                    target_index,
                    SessionOutcome::Interrupted {
                        notice: error.clone(),
                    },
                );
                Err(SessionError::WorkerSpawn(error))
            }
        }
    }

    /// Cooperatively stop the active session.
    ///
    /// Signals cancellation and finalizes immediately with whatever content
    /// and step log have accumulated so far; partial output is never
    /// discarded and no error notice is issued.
    pub fn stop(&self) {
        let active = self.lock_active().take();
        if let Some(active) = active {
            active.cancel.store(true, Ordering::SeqCst);
            self.finalize_session(active.target_index, SessionOutcome::Cancelled);
        }
    }

    /// Flip step-log visibility for the message at `index`.
    ///
    /// The step log is stored in the message itself and mutated live during
    /// streaming, so toggling and publishing always agree on one source of
    /// truth per index.
    pub fn toggle_step_log(&self, index: usize) -> Option<bool> {
        lock_unpoisoned(&self.log).toggle_step_log(index)
    }

    /// True while a session is streaming.
    #[must_use]
    pub fn has_active_session(&self) -> bool {
        self.lock_active().is_some()
    }

    /// Cancel the active session and join all worker threads.
    pub fn shutdown(&self) {
        self.stop();
        let workers = std::mem::take(&mut *lock_unpoisoned(&self.workers));
        for handle in workers {
            let _ = handle.join();
        }
    }

    fn spawn_worker(self: &Arc<Self>, context: SessionContext) -> Result<JoinHandle<()>, String> {
        let sessions = Arc::clone(self);
        thread::Builder::new()
            .name(format!("chat-session-{}", context.session_id))
            .spawn(move || sessions.run_worker(context))
            .map_err(|error| error.to_string())
    }

    fn run_worker(self: Arc<Self>, context: SessionContext) {
        let stream_result = catch_unwind(AssertUnwindSafe(|| {
            let mut on_event = |event: StreamEvent| self.apply_stream_event(&context, event);
            self.transport
                .stream_chat(&context.request, &context.cancel, &mut on_event)
        }));

        let outcome = match stream_result {
            // A graceful close without the done marker is treated as a
            // completion where the server omitted the trailing marker.
            Ok(Ok(_)) => SessionOutcome::Completed,
            Ok(Err(error)) if error.is_cancelled() => SessionOutcome::Cancelled,
            Ok(Err(ChatApiError::Status(status, message))) => SessionOutcome::Rejected {
                notice: format!("HTTP {status} {message}"),
            },
            Ok(Err(error)) => SessionOutcome::Interrupted {
                notice: error.to_string(),
            },
            Err(_) => SessionOutcome::Interrupted {
                notice: "session worker panicked".to_string(),
            },
        };

        let rejected = matches!(outcome, SessionOutcome::Rejected { .. });
        self.finalize_session(context.target_index, outcome);

        // Title persistence is a side effect on the thread collaborator,
        // fire-and-forget relative to message finalization. A rejected
        // session never produced a reply, so the thread keeps its name.
        if context.first_turn && !rejected {
            let title = derive_title(&context.request.question);
            let _ = self
                .transport
                .rename_thread(&context.request.thread_id, &title);
        }

        self.clear_active_if_matching(context.session_id);
    }

    fn apply_stream_event(&self, context: &SessionContext, event: StreamEvent) {
        // Stop promptly once cancellation is signalled; the line was already
        // classified, but nothing past the signal reaches the log.
        if context.cancel.load(Ordering::Acquire) {
            return;
        }

        let index = context.target_index;
        let mut log = lock_unpoisoned(&self.log);
        let update = match event {
            StreamEvent::ContentFragment { text } => log
                .append_content(index, &text)
                .map(|content| SessionUpdate::Content { index, content }),
            StreamEvent::Step { text } => log
                .push_step(index, StepEntry::step(text))
                .map(|step_log| SessionUpdate::StepLog { index, step_log }),
            StreamEvent::Observation { text } => log
                .push_step(index, StepEntry::observation(text))
                .map(|step_log| SessionUpdate::StepLog { index, step_log }),
            // Finalization is driven by the transport's return value.
            StreamEvent::Completion => None,
        };

        // Published while the log guard is held: the guard serializes every
        // publication with the state write it reports, so no update for an
        // index can trail that index's finalization.
        if let Some(update) = update {
            (self.on_update)(update);
        }
    }

    fn finalize_session(&self, index: usize, outcome: SessionOutcome) {
        let mut log = lock_unpoisoned(&self.log);
        if log.finalize(index, now_rfc3339()) {
            (self.on_update)(SessionUpdate::Finalized { index, outcome });
        }
    }

    fn clear_active_if_matching(&self, session_id: SessionId) {
        {
            let mut active = self.lock_active();
            if active.as_ref().map(|session| session.session_id) == Some(session_id) {
                *active = None;
            }
        }
        self.reap_finished_workers();
    }

    /// Join workers that have already exited; live handles stay.
    fn reap_finished_workers(&self) {
        let mut workers = lock_unpoisoned(&self.workers);
        let mut live = Vec::with_capacity(workers.len());
        for handle in workers.drain(..) {
            if handle.is_finished() {
                let _ = handle.join();
            } else {
                live.push(handle);
            }
        }
        *workers = live;
    }

    fn lock_active(&self) -> MutexGuard<'_, Option<ActiveSession>> {
        lock_unpoisoned(&self.active)
    }
}

/// Derive a short thread title from the first user turn.
#[must_use]
pub fn derive_title(question: &str) -> String {
    question.trim().chars().take(TITLE_MAX_CHARS).collect()
}

fn now_rfc3339() -> Option<String> {
    OffsetDateTime::now_utc().format(&Rfc3339).ok()
}

fn lock_unpoisoned<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    match mutex.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}

#[cfg(test)]
mod tests {
    use std::sync::{Arc, Mutex};
    use std::thread;
    use std::time::{Duration, Instant};

    use chat_api::{ChatApiError, ChatRequest, StreamEnd, StreamEvent};

    use super::{derive_title, lock_unpoisoned, ChatSessions};
    use crate::conversation::ConversationLog;
    use crate::transport::{CancelSignal, ChatTransport};

    struct InstantTransport;

    impl ChatTransport for InstantTransport {
        fn stream_chat(
            &self,
            _request: &ChatRequest,
            _cancel: &CancelSignal,
            on_event: &mut dyn FnMut(StreamEvent),
        ) -> Result<StreamEnd, ChatApiError> {
            on_event(StreamEvent::ContentFragment {
                text: "ok\n".to_string(),
            });
            Ok(StreamEnd::Completed)
        }

        fn rename_thread(&self, _thread_id: &str, _title: &str) -> Result<(), ChatApiError> {
            Ok(())
        }
    }

    #[test]
    fn finished_workers_are_joined_not_accumulated() {
        let sessions = ChatSessions::new(
            "t-1",
            Arc::new(InstantTransport),
            Arc::new(Mutex::new(ConversationLog::new())),
            Arc::new(|_| {}),
        );

        for _ in 0..4 {
            sessions
                .start_session("question", None)
                .expect("session should start");
            let deadline = Instant::now() + Duration::from_secs(5);
            while sessions.has_active_session() {
                assert!(Instant::now() < deadline, "worker never finished");
                thread::sleep(Duration::from_millis(1));
            }
        }

        let deadline = Instant::now() + Duration::from_secs(5);
        loop {
            sessions.reap_finished_workers();
            if lock_unpoisoned(&sessions.workers).is_empty() {
                break;
            }
            assert!(
                Instant::now() < deadline,
                "finished workers were never joined"
            );
            thread::sleep(Duration::from_millis(1));
        }
    }

    #[test]
    fn derive_title_truncates_at_character_boundaries() {
        assert_eq!(derive_title("short question"), "short question");
        assert_eq!(
            derive_title("an extremely long question that keeps going"),
            "an extremely long question tha"
        );
        // 30 characters, not 30 bytes.
        let multibyte = "é".repeat(40);
        assert_eq!(derive_title(&multibyte).chars().count(), 30);
        assert_eq!(derive_title("  padded  "), "padded");
    }
}

use thiserror::Error;

/// Errors raised while starting a session.
///
/// Everything that happens after a session has started is converted into a
/// finalized message plus a published outcome; it never surfaces as an error.
#[derive(Debug, Error)]
pub enum SessionError {
    #[error("question must not be empty")]
    EmptyQuestion,

    #[error("a session is already streaming")]
    SessionActive,

    #[error("failed to spawn session worker: {0}")]
    WorkerSpawn(String),
}

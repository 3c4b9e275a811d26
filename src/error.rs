use thiserror::Error;
use uuid::Uuid;

/// Errors returned to the command surface.
#[derive(Debug, Error)]
pub enum CommandError {
    /// The requested transition is not legal from the session's current
    /// state. Absence of a session reports the state as "idle".
    #[error("cannot {action} while session is {state}")]
    InvalidState {
        action: &'static str,
        state: &'static str,
    },

    #[error("already recording in this voice context")]
    AlreadyRecording,

    #[error("session {0} not found")]
    SessionNotFound(Uuid),

    #[error("internal error: {0}")]
    Internal(#[from] anyhow::Error),
}

/// Classified failure from an external service adapter.
///
/// Adapters classify, the pipeline retries: `Transient` is retried with
/// backoff, `Permanent` fails the stage immediately, `Malformed` gets one
/// corrective retry in the analyze stage before failing.
#[derive(Debug, Clone, Error)]
pub enum ServiceError {
    #[error("transient service error: {0}")]
    Transient(String),

    #[error("permanent service error: {0}")]
    Permanent(String),

    #[error("malformed response: {0}")]
    Malformed(String),
}

impl ServiceError {
    pub fn is_transient(&self) -> bool {
        matches!(self, ServiceError::Transient(_))
    }
}

/// Error produced by a single pipeline stage.
#[derive(Debug, Error)]
pub enum StageError {
    /// No speaker produced any audio. Terminal, never retried.
    #[error("no audio was captured for this session")]
    EmptySession,

    #[error(transparent)]
    Service(#[from] ServiceError),

    /// Store write failed. Treated as transient.
    #[error("store error: {0}")]
    Store(String),

    #[error("audio error: {0}")]
    Audio(String),
}

impl StageError {
    /// Whether the pipeline's bounded retry loop should try this stage again.
    pub fn is_retryable(&self) -> bool {
        match self {
            StageError::EmptySession => false,
            StageError::Service(e) => e.is_transient(),
            StageError::Store(_) => true,
            StageError::Audio(_) => false,
        }
    }
}

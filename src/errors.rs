//! Typed error hierarchy for storyforge.
//!
//! Four enums cover the four layers:
//! - `StoreError`: session/checkpoint persistence failures
//! - `WorkflowError`: caller-facing orchestration failures
//! - `WorkerError`: a phase worker that could not produce its artifact
//! - `ProviderError`: video provider submit/poll failures

use thiserror::Error;

/// Errors from the session and checkpoint store.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Session {session_id} not found")]
    SessionNotFound { session_id: String },

    #[error("Session {session_id} has no saved state")]
    StateMissing { session_id: String },

    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("State serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Persisted state has schema version {found}, newest supported is {supported}")]
    UnsupportedSchema { found: u32, supported: u32 },

    #[error("Invalid column '{column}': {message}")]
    InvalidColumn { column: String, message: String },

    #[error("Database lock poisoned")]
    LockPoisoned,
}

/// Errors surfaced to callers of the orchestrator operations.
///
/// Only these escape the orchestrator boundary. Worker failures are recorded
/// in the persisted state instead.
#[derive(Debug, Error)]
pub enum WorkflowError {
    #[error("Session {session_id} not found")]
    SessionNotFound { session_id: String },

    #[error("Invalid state: {0}")]
    InvalidState(String),

    #[error("Session {session_id} already completed")]
    AlreadyCompleted { session_id: String },

    #[error("Session {session_id} is being driven by another caller")]
    SessionBusy { session_id: String },

    #[error("Failed to acquire session lock at {path}: {source}")]
    Lock {
        path: std::path::PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error(transparent)]
    Store(StoreError),
}

impl From<StoreError> for WorkflowError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::SessionNotFound { session_id } => Self::SessionNotFound { session_id },
            other => Self::Store(other),
        }
    }
}

/// Errors from a single phase worker invocation.
#[derive(Debug, Error)]
pub enum WorkerError {
    #[error("Missing input: {0}")]
    MissingInput(&'static str),

    #[error("Worker {worker} cannot handle phase {phase}")]
    UnexpectedPhase { worker: &'static str, phase: String },

    #[error("{0}")]
    Generation(String),

    #[error("No video provider registered for platform '{0}'")]
    UnknownPlatform(String),

    #[error(transparent)]
    Provider(#[from] ProviderError),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

/// Errors from a video provider collaborator.
#[derive(Debug, Error)]
pub enum ProviderError {
    #[error("Transport error: {0}")]
    Transport(String),

    #[error("Provider API error ({status}): {message}")]
    Api { status: u16, message: String },

    #[error("Task {0} not found")]
    TaskNotFound(String),
}

impl ProviderError {
    /// Whether the failure is worth retrying.
    ///
    /// Only connection, SSL and timeout failures qualify; everything else is
    /// fatal for the current submission.
    pub fn is_transient(&self) -> bool {
        let message = self.to_string().to_lowercase();
        ["ssl", "connection", "timeout"]
            .iter()
            .any(|needle| message.contains(needle))
    }
}

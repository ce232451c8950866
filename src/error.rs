//! Error types shared across the queue's components.

use crate::types::job::JobId;
use crate::types::states::JobState;

/// Failure reported by a [`JobStore`](crate::store::JobStore).
#[derive(Debug, Clone, thiserror::Error)]
pub enum StoreError {
    /// Another job already holds this fingerprint. Callers re-resolve.
    #[error("a job with fingerprint {0} already exists")]
    Conflict(String),
    #[error("job not found: {0}")]
    NotFound(JobId),
    #[error("store unavailable: {0}")]
    Unavailable(String),
}

/// An illegal state machine edge was requested.
#[derive(Debug, Clone, Copy, Eq, PartialEq, thiserror::Error)]
#[error("job {id}: illegal transition {from} -> {to}")]
pub struct TransitionError {
    pub id: JobId,
    pub from: JobState,
    pub to: JobState,
}

#[derive(Debug, thiserror::Error)]
pub enum SubmitError {
    #[error(transparent)]
    Store(#[from] StoreError),
    /// The create conflicted, but the conflicting job then couldn't be read
    /// back. Only possible with a store that loses writes.
    #[error("fingerprint {0} conflicted but no job holds it")]
    LostConflict(String),
}

#[derive(Debug, thiserror::Error)]
pub enum WorkerError {
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error(transparent)]
    Transition(#[from] TransitionError),
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("{0} must be greater than zero")]
    Zero(&'static str),
    #[error("reading config file: {0}")]
    Io(#[from] std::io::Error),
    #[error("parsing config file: {0}")]
    Parse(#[from] serde_yaml::Error),
}

//! Errors raised out of a task handler.
//!
//! Handlers normally report through `TaskOutcome`. An `Err` reaching the queue is
//! retried with backoff unless it is a [`TaskError::Fatal`].

#[derive(Debug, thiserror::Error)]
pub enum TaskError {
    /// Worth another attempt once the retry budget allows.
    #[error(transparent)]
    Transient(anyhow::Error),

    /// Fail the task immediately.
    #[error(transparent)]
    Fatal(anyhow::Error),
}

impl TaskError {
    pub fn recoverable(err: impl Into<anyhow::Error>) -> Self {
        TaskError::Transient(err.into())
    }

    pub fn unrecoverable(err: impl Into<anyhow::Error>) -> Self {
        TaskError::Fatal(err.into())
    }

    pub fn is_recoverable(&self) -> bool {
        matches!(self, TaskError::Transient(_))
    }
}

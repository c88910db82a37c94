//! Generation error taxonomy
//!
//! The variant decides what happens to the asset: transport failures are retried by
//! the queue, everything else fails the asset (except `NotFound`, which aborts the
//! invocation without touching state).

use montage_core::error::AppError;
use montage_storage::StorageError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum GenerationError {
    /// Missing or inactive model, or a model without a provider.
    #[error("Configuration error: {0}")]
    Config(String),

    /// Malformed or error-coded provider response.
    #[error("{0}")]
    Provider(String),

    /// Connection failure, timeout, or a provider-side overload/server error.
    #[error("Transport error: {0}")]
    Transport(String),

    /// The asset vanished mid-flight.
    #[error("Not found: {0}")]
    NotFound(String),

    /// A state the generation flow can never legitimately reach.
    #[error("Invariant violated: {0}")]
    Invariant(String),

    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("Database error: {0}")]
    Database(#[source] AppError),
}

impl GenerationError {
    /// Retried by the queue rather than failing the asset.
    pub fn is_transport(&self) -> bool {
        matches!(self, GenerationError::Transport(_))
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, GenerationError::NotFound(_))
    }

    /// Classify a reqwest failure.
    pub fn from_reqwest(context: &str, err: reqwest::Error) -> Self {
        if err.is_timeout() || err.is_connect() || err.is_request() {
            return GenerationError::Transport(format!("{}: {}", context, err));
        }
        if let Some(status) = err.status() {
            if status.as_u16() == 429 || status.is_server_error() {
                return GenerationError::Transport(format!("{}: {}", context, err));
            }
            return GenerationError::Provider(format!("{}: {}", context, err));
        }
        if err.is_decode() || err.is_body() {
            return GenerationError::Provider(format!("{}: {}", context, err));
        }
        GenerationError::Transport(format!("{}: {}", context, err))
    }
}

impl From<AppError> for GenerationError {
    fn from(err: AppError) -> Self {
        match err {
            AppError::NotFound(what) => GenerationError::NotFound(what),
            other => GenerationError::Database(other),
        }
    }
}

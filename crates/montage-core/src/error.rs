//! Shared error type for repositories, the model registry and the command line.
//!
//! Generation failures (provider responses, transport problems) have their own type in
//! `montage-generation` and convert from `AppError` at the edges.

#[cfg(feature = "sqlx")]
use sqlx::Error as SqlxError;

#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[cfg(feature = "sqlx")]
    #[error("Database error: {0}")]
    Database(#[source] SqlxError),

    #[cfg(not(feature = "sqlx"))]
    #[error("Database error: {0}")]
    Database(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Invalid status transition: {0}")]
    InvalidTransition(String),

    #[error("Internal error: {0}")]
    Internal(String),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

#[cfg(feature = "sqlx")]
impl From<SqlxError> for AppError {
    fn from(err: SqlxError) -> Self {
        match err {
            SqlxError::RowNotFound => AppError::NotFound("row not found".to_string()),
            other => AppError::Database(other),
        }
    }
}

impl From<serde_json::Error> for AppError {
    fn from(err: serde_json::Error) -> Self {
        AppError::InvalidInput(format!("JSON error: {}", err))
    }
}

impl From<crate::lifecycle::TransitionRejected> for AppError {
    fn from(err: crate::lifecycle::TransitionRejected) -> Self {
        AppError::InvalidTransition(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lifecycle::TransitionRejected;
    use crate::models::AssetStatus;

    #[cfg(feature = "sqlx")]
    #[test]
    fn row_not_found_maps_to_not_found() {
        let err = AppError::from(sqlx::Error::RowNotFound);
        assert!(matches!(err, AppError::NotFound(_)));

        let err = AppError::from(sqlx::Error::PoolTimedOut);
        assert!(matches!(err, AppError::Database(_)));
    }

    #[test]
    fn rejected_transition_names_both_states() {
        let err = AppError::from(TransitionRejected {
            from: AssetStatus::Failed,
            to: AssetStatus::Processing,
        });
        assert!(matches!(err, AppError::InvalidTransition(_)));
        let message = err.to_string();
        assert!(message.contains("failed"));
        assert!(message.contains("processing"));
    }

    #[test]
    fn anyhow_errors_pass_through() {
        let err = AppError::from(anyhow::anyhow!("pool exhausted"));
        assert_eq!(err.to_string(), "pool exhausted");
    }
}

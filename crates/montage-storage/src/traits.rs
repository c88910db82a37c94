//! Storage abstraction trait
//!
//! Generated results are written through the [`Storage`] trait so the generation core
//! never knows which backend holds the bytes.

use crate::StorageBackend;
use async_trait::async_trait;
use thiserror::Error;

/// Storage operation errors
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("Upload failed: {0}")]
    UploadFailed(String),

    #[error("Download failed: {0}")]
    DownloadFailed(String),

    #[error("Delete failed: {0}")]
    DeleteFailed(String),

    #[error("File not found: {0}")]
    NotFound(String),

    #[error("Invalid storage key: {0}")]
    InvalidKey(String),

    #[error("Storage backend error: {0}")]
    BackendError(String),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Configuration error: {0}")]
    ConfigError(String),
}

/// Result type for storage operations
pub type StorageResult<T> = Result<T, StorageError>;

/// Opaque blob store.
///
/// Keys are relative paths such as `generated/3f2a...c1.mp4`. They must not contain `..`
/// or start with `/`.
#[async_trait]
pub trait Storage: Send + Sync {
    /// Store `data` under `key` and return its public URL.
    async fn put(&self, key: &str, data: Vec<u8>, content_type: &str) -> StorageResult<String>;

    async fn get(&self, key: &str) -> StorageResult<Vec<u8>>;

    async fn exists(&self, key: &str) -> StorageResult<bool>;

    /// Delete `key`. Returns `false` when there was nothing to delete.
    async fn delete(&self, key: &str) -> StorageResult<bool>;

    /// Public URL for `key`.
    fn url(&self, key: &str) -> String;

    fn backend_type(&self) -> StorageBackend;
}

#[cfg(feature = "storage-local")]
use crate::LocalStorage;
#[cfg(feature = "storage-s3")]
use crate::S3Storage;
use crate::{Storage, StorageBackend, StorageError, StorageResult};
use montage_core::MontageConfig;
use std::sync::Arc;

#[allow(dead_code)]
fn required(value: &Option<String>, var: &str) -> StorageResult<String> {
    value
        .clone()
        .ok_or_else(|| StorageError::ConfigError(format!("{} not configured", var)))
}

/// Build the blob store selected by `STORAGE_BACKEND`.
pub async fn create_storage(config: &MontageConfig) -> StorageResult<Arc<dyn Storage>> {
    let storage: Arc<dyn Storage> = match config.storage_backend {
        #[cfg(feature = "storage-s3")]
        StorageBackend::S3 => Arc::new(S3Storage::new(
            required(&config.s3_bucket, "S3_BUCKET")?,
            required(&config.s3_region, "S3_REGION")?,
            config.s3_endpoint.clone(),
        )?),

        #[cfg(feature = "storage-local")]
        StorageBackend::Local => Arc::new(
            LocalStorage::new(
                required(&config.local_storage_path, "LOCAL_STORAGE_PATH")?,
                required(&config.local_storage_base_url, "LOCAL_STORAGE_BASE_URL")?,
            )
            .await?,
        ),

        #[allow(unreachable_patterns)]
        other => {
            return Err(StorageError::ConfigError(format!(
                "{} storage backend not compiled in",
                other
            )))
        }
    };

    tracing::info!(backend = %config.storage_backend, "Storage initialized");
    Ok(storage)
}

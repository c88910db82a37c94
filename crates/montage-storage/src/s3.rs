use crate::keys::validate_key;
use crate::traits::{Storage, StorageError, StorageResult};
use crate::StorageBackend;
use async_trait::async_trait;
use bytes::Bytes;
use object_store::aws::{AmazonS3, AmazonS3Builder};
use object_store::path::Path;
use object_store::Error as ObjectStoreError;
use object_store::{ObjectStoreExt, PutPayload, Result as ObjectResult};

/// Prefix under which all keys live in the bucket, so public URLs carry a `/media/` segment.
const KEY_PREFIX: &str = "media";

/// S3 storage implementation
#[derive(Clone)]
pub struct S3Storage {
    store: AmazonS3,
    bucket: String,
    region: String,
    endpoint_url: Option<String>,
}

impl S3Storage {
    /// Create a new S3Storage instance
    ///
    /// `endpoint_url` selects an S3-compatible provider (e.g. "http://localhost:9000" for
    /// MinIO). Credentials come from the usual AWS environment variables.
    pub fn new(bucket: String, region: String, endpoint_url: Option<String>) -> StorageResult<Self> {
        let mut builder = AmazonS3Builder::from_env()
            .with_region(region.clone())
            .with_bucket_name(bucket.clone());

        if let Some(ref endpoint) = endpoint_url {
            let allow_http = endpoint.starts_with("http://");
            builder = builder
                .with_endpoint(endpoint.clone())
                .with_allow_http(allow_http);
        }

        let store = builder
            .build()
            .map_err(|e| StorageError::ConfigError(e.to_string()))?;

        Ok(S3Storage {
            store,
            bucket,
            region,
            endpoint_url,
        })
    }

    fn location(key: &str) -> StorageResult<Path> {
        validate_key(key)?;
        Ok(Path::from(format!("{}/{}", KEY_PREFIX, key)))
    }
}

/// Public URL for an object key.
///
/// Path-style `{endpoint}/{bucket}/{key}` for S3-compatible endpoints, virtual-hosted
/// AWS style otherwise.
fn object_url(endpoint_url: Option<&str>, bucket: &str, region: &str, key: &str) -> String {
    match endpoint_url {
        Some(endpoint) => format!(
            "{}/{}/{}/{}",
            endpoint.trim_end_matches('/'),
            bucket,
            KEY_PREFIX,
            key
        ),
        None => format!(
            "https://{}.s3.{}.amazonaws.com/{}/{}",
            bucket, region, KEY_PREFIX, key
        ),
    }
}

#[async_trait]
impl Storage for S3Storage {
    async fn put(&self, key: &str, data: Vec<u8>, content_type: &str) -> StorageResult<String> {
        let location = Self::location(key)?;
        let size = data.len() as u64;
        let start = std::time::Instant::now();

        let result: ObjectResult<_> = self
            .store
            .put(&location, PutPayload::from(Bytes::from(data)))
            .await;

        result.map_err(|e| {
            tracing::error!(
                error = %e,
                bucket = %self.bucket,
                key = %key,
                size_bytes = size,
                duration_ms = start.elapsed().as_secs_f64() * 1000.0,
                "S3 upload failed"
            );
            StorageError::UploadFailed(e.to_string())
        })?;

        tracing::info!(
            bucket = %self.bucket,
            key = %key,
            content_type,
            size_bytes = size,
            duration_ms = start.elapsed().as_secs_f64() * 1000.0,
            "S3 upload successful"
        );

        Ok(self.url(key))
    }

    async fn get(&self, key: &str) -> StorageResult<Vec<u8>> {
        let location = Self::location(key)?;

        let result: ObjectResult<_> = self.store.get(&location).await;
        let result = result.map_err(|e| match e {
            ObjectStoreError::NotFound { .. } => StorageError::NotFound(key.to_string()),
            other => StorageError::DownloadFailed(other.to_string()),
        })?;

        let bytes = result
            .bytes()
            .await
            .map_err(|e| StorageError::DownloadFailed(e.to_string()))?;

        Ok(bytes.to_vec())
    }

    async fn exists(&self, key: &str) -> StorageResult<bool> {
        let location = Self::location(key)?;
        match self.store.head(&location).await {
            Ok(_) => Ok(true),
            Err(ObjectStoreError::NotFound { .. }) => Ok(false),
            Err(e) => Err(StorageError::BackendError(e.to_string())),
        }
    }

    async fn delete(&self, key: &str) -> StorageResult<bool> {
        // S3 deletes are idempotent, so check first to report whether anything was removed
        if !self.exists(key).await? {
            return Ok(false);
        }

        let location = Self::location(key)?;
        let result: ObjectResult<_> = self.store.delete(&location).await;
        result.map_err(|e| {
            tracing::error!(error = %e, bucket = %self.bucket, key = %key, "S3 delete failed");
            StorageError::DeleteFailed(e.to_string())
        })?;

        tracing::info!(bucket = %self.bucket, key = %key, "S3 delete successful");
        Ok(true)
    }

    fn url(&self, key: &str) -> String {
        object_url(self.endpoint_url.as_deref(), &self.bucket, &self.region, key)
    }

    fn backend_type(&self) -> StorageBackend {
        StorageBackend::S3
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::keys::url_to_path;

    #[test]
    fn aws_url_round_trips_through_url_to_path() {
        let url = object_url(None, "montage", "eu-west-1", "generated/abc.mp4");
        assert_eq!(
            url,
            "https://montage.s3.eu-west-1.amazonaws.com/media/generated/abc.mp4"
        );
        assert_eq!(url_to_path(&url), "generated/abc.mp4");
    }

    #[test]
    fn endpoint_url_is_path_style() {
        let url = object_url(
            Some("http://localhost:9000/"),
            "montage",
            "us-east-1",
            "generated/abc.jpg",
        );
        assert_eq!(url, "http://localhost:9000/montage/media/generated/abc.jpg");
    }
}

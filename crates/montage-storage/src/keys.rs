//! Storage key helpers shared by all backends.

use crate::{StorageError, StorageResult};

/// Directory generated results are stored under.
pub const GENERATED_PREFIX: &str = "generated";

/// Reject keys that could escape the storage root.
pub fn validate_key(key: &str) -> StorageResult<()> {
    if key.is_empty() || key.contains("..") || key.starts_with('/') {
        return Err(StorageError::InvalidKey(format!(
            "Storage key contains invalid characters: {}",
            key
        )));
    }
    Ok(())
}

/// Best-effort mapping from a public URL back to a storage key.
///
/// Everything after the first `/media/` segment when present, otherwise the last two
/// path segments.
pub fn url_to_path(url: &str) -> String {
    if let Some((_, rest)) = url.split_once("/media/") {
        return rest.to_string();
    }

    let segments: Vec<&str> = url.split('/').collect();
    let start = segments.len().saturating_sub(2);
    segments[start..].join("/")
}

/// Key for a generated result: `generated/<32 hex chars><ext>`.
pub fn generated_key(unique: &str, extension: &str) -> String {
    format!("{}/{}{}", GENERATED_PREFIX, unique, extension)
}

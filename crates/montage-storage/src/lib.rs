//! Montage Storage Library
//!
//! Blob storage for generated results: the [`Storage`] trait plus local filesystem and
//! S3 (via `object_store`) backends.
//!
//! # Storage key format
//!
//! Keys are relative paths. Generated results use `generated/<uuid-hex><ext>`. Public URLs
//! of both backends contain a `/media/` segment so [`url_to_path`] can map them back.

pub mod factory;
pub mod keys;
#[cfg(feature = "storage-local")]
pub mod local;
#[cfg(feature = "storage-s3")]
pub mod s3;
pub mod traits;

pub use factory::create_storage;
pub use keys::{generated_key, url_to_path};
#[cfg(feature = "storage-local")]
pub use local::LocalStorage;
pub use montage_core::StorageBackend;
#[cfg(feature = "storage-s3")]
pub use s3::S3Storage;
pub use traits::{Storage, StorageError, StorageResult};

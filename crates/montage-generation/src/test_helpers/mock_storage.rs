//! In-memory storage for testing

use async_trait::async_trait;
use montage_storage::{Storage, StorageBackend, StorageError, StorageResult};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};

pub const MEMORY_BASE_URL: &str = "https://cdn.test/media";

/// Stored objects keyed by storage key, with their content types.
#[derive(Clone, Default)]
pub struct MemoryStorage {
    objects: Arc<Mutex<HashMap<String, (Vec<u8>, String)>>>,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn keys(&self) -> Vec<String> {
        let mut keys: Vec<String> = self.objects.lock().unwrap().keys().cloned().collect();
        keys.sort();
        keys
    }

    pub fn content_type(&self, key: &str) -> Option<String> {
        self.objects
            .lock()
            .unwrap()
            .get(key)
            .map(|(_, ct)| ct.clone())
    }
}

#[async_trait]
impl Storage for MemoryStorage {
    async fn put(&self, key: &str, data: Vec<u8>, content_type: &str) -> StorageResult<String> {
        montage_storage::keys::validate_key(key)?;
        self.objects
            .lock()
            .unwrap()
            .insert(key.to_string(), (data, content_type.to_string()));
        Ok(self.url(key))
    }

    async fn get(&self, key: &str) -> StorageResult<Vec<u8>> {
        self.objects
            .lock()
            .unwrap()
            .get(key)
            .map(|(data, _)| data.clone())
            .ok_or_else(|| StorageError::NotFound(key.to_string()))
    }

    async fn exists(&self, key: &str) -> StorageResult<bool> {
        Ok(self.objects.lock().unwrap().contains_key(key))
    }

    async fn delete(&self, key: &str) -> StorageResult<bool> {
        Ok(self.objects.lock().unwrap().remove(key).is_some())
    }

    fn url(&self, key: &str) -> String {
        format!("{}/{}", MEMORY_BASE_URL, key)
    }

    fn backend_type(&self) -> StorageBackend {
        StorageBackend::Local
    }
}

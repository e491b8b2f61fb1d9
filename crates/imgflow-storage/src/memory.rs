use crate::traits::{Storage, StorageError, StorageResult};
use crate::StorageBackend;
use async_trait::async_trait;
use bytes::Bytes;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};

#[derive(Debug, Clone)]
struct StoredObject {
    data: Bytes,
    content_type: String,
}

/// In-memory storage for tests and local runs
///
/// Counts every `put` per object so callers can assert how many writes happened.
#[derive(Clone, Default)]
pub struct InMemoryStorage {
    objects: Arc<Mutex<HashMap<(String, String), StoredObject>>>,
    put_counts: Arc<Mutex<HashMap<(String, String), usize>>>,
}

impl InMemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }

    fn id(location: &str, key: &str) -> (String, String) {
        (location.to_string(), key.to_string())
    }

    /// Seed an object without counting it as a pipeline write.
    pub fn insert(&self, location: &str, key: &str, data: impl Into<Bytes>, content_type: &str) {
        self.objects.lock().unwrap_or_else(|p| p.into_inner()).insert(
            Self::id(location, key),
            StoredObject {
                data: data.into(),
                content_type: content_type.to_string(),
            },
        );
    }

    pub fn contains(&self, location: &str, key: &str) -> bool {
        self.objects
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .contains_key(&Self::id(location, key))
    }

    pub fn content_type(&self, location: &str, key: &str) -> Option<String> {
        self.objects
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .get(&Self::id(location, key))
            .map(|o| o.content_type.clone())
    }

    /// Number of `put` calls for one object.
    pub fn put_count(&self, location: &str, key: &str) -> usize {
        self.put_counts
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .get(&Self::id(location, key))
            .copied()
            .unwrap_or(0)
    }

    /// Number of `put` calls across all objects.
    pub fn total_puts(&self) -> usize {
        self.put_counts
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .values()
            .sum()
    }
}

#[async_trait]
impl Storage for InMemoryStorage {
    async fn get(&self, location: &str, key: &str) -> StorageResult<Bytes> {
        self.objects
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .get(&Self::id(location, key))
            .map(|o| o.data.clone())
            .ok_or_else(|| StorageError::NotFound(format!("{}/{}", location, key)))
    }

    async fn put(
        &self,
        location: &str,
        key: &str,
        data: Bytes,
        content_type: &str,
    ) -> StorageResult<()> {
        *self
            .put_counts
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .entry(Self::id(location, key))
            .or_insert(0) += 1;
        self.insert(location, key, data, content_type);
        Ok(())
    }

    fn backend_type(&self) -> StorageBackend {
        StorageBackend::Memory
    }
}

use crate::traits::{Storage, StorageError, StorageResult};
use crate::StorageBackend;
use async_trait::async_trait;
use bytes::Bytes;
use std::io::ErrorKind as IoErrorKind;
use std::path::{Path, PathBuf};
use tokio::fs;
use tokio::io::AsyncWriteExt;
use uuid::Uuid;

/// Local filesystem storage implementation
///
/// Objects live at `{base_path}/{location}/{key}`.
#[derive(Clone)]
pub struct LocalStorage {
    base_path: PathBuf,
}

impl LocalStorage {
    /// Create a new LocalStorage instance rooted at `base_path` (created if missing).
    pub async fn new(base_path: impl Into<PathBuf>) -> StorageResult<Self> {
        let base_path = base_path.into();

        fs::create_dir_all(&base_path).await.map_err(|e| {
            StorageError::ConfigError(format!(
                "Failed to create storage directory {}: {}",
                base_path.display(),
                e
            ))
        })?;

        Ok(LocalStorage { base_path })
    }

    /// Convert location and key to a filesystem path with security validation
    ///
    /// Rejects anything that could escape the base storage directory.
    fn object_path(&self, location: &str, key: &str) -> StorageResult<PathBuf> {
        if location.is_empty()
            || location.contains('/')
            || location.contains('\\')
            || location.starts_with('.')
        {
            return Err(StorageError::InvalidKey(format!(
                "Invalid storage location '{}'",
                location
            )));
        }
        if key.is_empty() || key.contains("..") || key.starts_with('/') || key.contains('\\') {
            return Err(StorageError::InvalidKey(
                "Storage key contains invalid characters".to_string(),
            ));
        }

        let path = self.base_path.join(location).join(key);

        let base_canonical = self.base_path.canonicalize().map_err(|e| {
            StorageError::ConfigError(format!("Failed to canonicalize base path: {}", e))
        })?;

        if let Ok(canonical) = path.canonicalize() {
            if canonical.strip_prefix(&base_canonical).is_err() {
                return Err(StorageError::InvalidKey(
                    "Storage key resolves outside storage directory".to_string(),
                ));
            }
        } else if path.strip_prefix(&self.base_path).is_err() {
            return Err(StorageError::InvalidKey(
                "Storage key resolves outside storage directory".to_string(),
            ));
        }

        Ok(path)
    }

    /// Ensure parent directory exists
    async fn ensure_parent_dir(&self, path: &Path) -> StorageResult<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).await?;
        }
        Ok(())
    }
}

#[async_trait]
impl Storage for LocalStorage {
    async fn get(&self, location: &str, key: &str) -> StorageResult<Bytes> {
        let path = self.object_path(location, key)?;
        let start = std::time::Instant::now();

        let data = fs::read(&path).await.map_err(|e| match e.kind() {
            IoErrorKind::NotFound => StorageError::NotFound(format!("{}/{}", location, key)),
            _ => StorageError::DownloadFailed(format!(
                "Failed to read file {}: {}",
                path.display(),
                e
            )),
        })?;

        tracing::debug!(
            path = %path.display(),
            key = %key,
            size_bytes = data.len(),
            duration_ms = start.elapsed().as_secs_f64() * 1000.0,
            "Local storage read successful"
        );

        Ok(Bytes::from(data))
    }

    async fn put(
        &self,
        location: &str,
        key: &str,
        data: Bytes,
        _content_type: &str,
    ) -> StorageResult<()> {
        let path = self.object_path(location, key)?;
        let size = data.len();

        self.ensure_parent_dir(&path).await?;

        let start = std::time::Instant::now();

        // Readers never observe a partially written object
        let tmp_path = path.with_file_name(format!(".{}.tmp", Uuid::new_v4()));

        let mut file = fs::File::create(&tmp_path).await.map_err(|e| {
            StorageError::UploadFailed(format!(
                "Failed to create file {}: {}",
                tmp_path.display(),
                e
            ))
        })?;

        file.write_all(&data).await.map_err(|e| {
            StorageError::UploadFailed(format!("Failed to write file {}: {}", tmp_path.display(), e))
        })?;

        file.sync_all().await.map_err(|e| {
            StorageError::UploadFailed(format!("Failed to sync file {}: {}", tmp_path.display(), e))
        })?;
        drop(file);

        if let Err(e) = fs::rename(&tmp_path, &path).await {
            let _ = fs::remove_file(&tmp_path).await;
            return Err(StorageError::UploadFailed(format!(
                "Failed to move file into place {}: {}",
                path.display(),
                e
            )));
        }

        tracing::info!(
            path = %path.display(),
            key = %key,
            size_bytes = size,
            duration_ms = start.elapsed().as_secs_f64() * 1000.0,
            "Local storage write successful"
        );

        Ok(())
    }

    fn backend_type(&self) -> StorageBackend {
        StorageBackend::Local
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    async fn storage() -> (TempDir, LocalStorage) {
        let dir = TempDir::new().unwrap();
        let storage = LocalStorage::new(dir.path()).await.unwrap();
        (dir, storage)
    }

    #[tokio::test]
    async fn test_put_then_get() {
        let (_dir, storage) = storage().await;
        storage
            .put(
                "uploads",
                "processed/resize/photo.jpg",
                Bytes::from_static(b"jpeg"),
                "image/jpeg",
            )
            .await
            .unwrap();

        let data = storage
            .get("uploads", "processed/resize/photo.jpg")
            .await
            .unwrap();
        assert_eq!(&data[..], b"jpeg");
    }

    #[tokio::test]
    async fn test_put_overwrites() {
        let (_dir, storage) = storage().await;
        storage
            .put("uploads", "a.txt", Bytes::from_static(b"one"), "text/plain")
            .await
            .unwrap();
        storage
            .put("uploads", "a.txt", Bytes::from_static(b"two"), "text/plain")
            .await
            .unwrap();
        assert_eq!(&storage.get("uploads", "a.txt").await.unwrap()[..], b"two");
    }

    #[tokio::test]
    async fn test_missing_object_is_not_found() {
        let (_dir, storage) = storage().await;
        let err = storage.get("uploads", "resize/none.jpg").await.unwrap_err();
        assert!(matches!(err, StorageError::NotFound(_)));
    }

    #[tokio::test]
    async fn test_rejects_path_traversal() {
        let (_dir, storage) = storage().await;
        for (location, key) in [
            ("uploads", "../secret"),
            ("uploads", "/etc/passwd"),
            ("../uploads", "a.jpg"),
            ("up/loads", "a.jpg"),
            ("", "a.jpg"),
        ] {
            let err = storage.get(location, key).await.unwrap_err();
            assert!(
                matches!(err, StorageError::InvalidKey(_)),
                "{}/{} should be rejected",
                location,
                key
            );
        }
    }
}

#[cfg(feature = "storage-local")]
use crate::LocalStorage;
#[cfg(feature = "storage-s3")]
use crate::S3Storage;
use crate::{InMemoryStorage, Storage, StorageBackend, StorageError, StorageResult};
use imgflow_core::StorageConfig;
use std::sync::Arc;

/// Create a storage backend based on configuration
pub async fn create_storage(config: &StorageConfig) -> StorageResult<Arc<dyn Storage>> {
    match config.backend {
        #[cfg(feature = "storage-s3")]
        StorageBackend::S3 => {
            let region = config.s3_region.clone().ok_or_else(|| {
                StorageError::ConfigError("S3_REGION or AWS_REGION not configured".to_string())
            })?;

            let storage = S3Storage::new(region, config.s3_endpoint.clone());
            Ok(Arc::new(storage))
        }

        #[cfg(not(feature = "storage-s3"))]
        StorageBackend::S3 => Err(StorageError::ConfigError(
            "S3 storage backend not available (storage-s3 feature not enabled)".to_string(),
        )),

        #[cfg(feature = "storage-local")]
        StorageBackend::Local => {
            let base_path = config.local_storage_path.clone().ok_or_else(|| {
                StorageError::ConfigError("LOCAL_STORAGE_PATH not configured".to_string())
            })?;

            let storage = LocalStorage::new(base_path).await?;
            Ok(Arc::new(storage))
        }

        #[cfg(not(feature = "storage-local"))]
        StorageBackend::Local => Err(StorageError::ConfigError(
            "Local storage backend not available (storage-local feature not enabled)".to_string(),
        )),

        StorageBackend::Memory => {
            tracing::warn!("Using in-memory object storage; objects are lost on restart");
            Ok(Arc::new(InMemoryStorage::new()))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(backend: StorageBackend) -> StorageConfig {
        StorageConfig {
            backend,
            local_storage_path: None,
            s3_region: None,
            s3_endpoint: None,
        }
    }

    #[tokio::test]
    async fn test_memory_backend() {
        let storage = create_storage(&config(StorageBackend::Memory)).await.unwrap();
        assert_eq!(storage.backend_type(), StorageBackend::Memory);
    }

    #[cfg(feature = "storage-local")]
    #[tokio::test]
    async fn test_local_backend_requires_path() {
        assert!(matches!(
            create_storage(&config(StorageBackend::Local)).await,
            Err(StorageError::ConfigError(_))
        ));

        let dir = tempfile::TempDir::new().unwrap();
        let mut cfg = config(StorageBackend::Local);
        cfg.local_storage_path = Some(dir.path().display().to_string());
        let storage = create_storage(&cfg).await.unwrap();
        assert_eq!(storage.backend_type(), StorageBackend::Local);
    }

    #[cfg(feature = "storage-s3")]
    #[tokio::test]
    async fn test_s3_backend_requires_region() {
        assert!(matches!(
            create_storage(&config(StorageBackend::S3)).await,
            Err(StorageError::ConfigError(_))
        ));
    }
}

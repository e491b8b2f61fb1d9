//! Storage abstraction trait
//!
//! This module defines the Storage trait that all storage backends must implement.

use crate::StorageBackend;
use async_trait::async_trait;
use bytes::Bytes;
use imgflow_core::PipelineError;
use thiserror::Error;

/// Storage operation errors
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("Upload failed: {0}")]
    UploadFailed(String),

    #[error("Download failed: {0}")]
    DownloadFailed(String),

    #[error("Object not found: {0}")]
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

impl StorageError {
    /// Classify a failed `get` of a source object.
    pub fn into_read_error(self) -> PipelineError {
        match self {
            StorageError::NotFound(key) => PipelineError::ObjectNotFound(key),
            StorageError::InvalidKey(_) | StorageError::ConfigError(_) => {
                PipelineError::Unprocessable(self.to_string())
            }
            other => PipelineError::ReadFailure(other.to_string()),
        }
    }

    /// Classify a failed `put` of an artifact.
    pub fn into_write_error(self) -> PipelineError {
        match self {
            StorageError::InvalidKey(_) | StorageError::ConfigError(_) => {
                PipelineError::Unprocessable(self.to_string())
            }
            other => PipelineError::WriteFailure(other.to_string()),
        }
    }
}

/// Result type for storage operations
pub type StorageResult<T> = Result<T, StorageError>;

/// Storage abstraction trait
///
/// The pipeline only ever reads whole source objects and writes whole artifacts, so the
/// interface is two calls. `location` is the bucket; backends that are not bucketed map it
/// onto a directory or a map key.
#[async_trait]
pub trait Storage: Send + Sync {
    /// Read a whole object. A missing object is [`StorageError::NotFound`].
    async fn get(&self, location: &str, key: &str) -> StorageResult<Bytes>;

    /// Write a whole object, replacing any existing one.
    async fn put(
        &self,
        location: &str,
        key: &str,
        data: Bytes,
        content_type: &str,
    ) -> StorageResult<()>;

    /// Get the storage backend type
    fn backend_type(&self) -> StorageBackend;
}

use async_trait::async_trait;
use imgflow_core::{MarkerBackend, PipelineError, ProcessingRecord, ProcessingStatus};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum MarkerError {
    #[error("Marker store unavailable: {0}")]
    Unavailable(String),

    #[error("Corrupt processing record: {0}")]
    CorruptRecord(String),
}

impl From<MarkerError> for PipelineError {
    fn from(err: MarkerError) -> Self {
        match err {
            MarkerError::Unavailable(detail) => PipelineError::StoreUnavailable(detail),
            MarkerError::CorruptRecord(detail) => PipelineError::Unprocessable(detail),
        }
    }
}

pub type MarkerResult<T> = Result<T, MarkerError>;

/// Durable store of processing records
///
/// Implementations must make `insert_if_absent` and `update_if` atomic with respect to each
/// other: of two concurrent conditional writes against the same record, at most one succeeds.
#[async_trait]
pub trait MarkerStore: Send + Sync {
    /// Create the record unless one already exists for its key. Returns whether it was created.
    async fn insert_if_absent(&self, record: &ProcessingRecord) -> MarkerResult<bool>;

    async fn get(&self, processing_key: &str) -> MarkerResult<Option<ProcessingRecord>>;

    /// Replace the record stored under `next.processing_key` only if it still has
    /// `expected_status` and `expected_version`. Returns whether the write happened.
    async fn update_if(
        &self,
        expected_status: ProcessingStatus,
        expected_version: u64,
        next: &ProcessingRecord,
    ) -> MarkerResult<bool>;

    async fn health_check(&self) -> MarkerResult<()>;

    fn backend_type(&self) -> MarkerBackend;
}

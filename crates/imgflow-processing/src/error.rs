use imgflow_core::PipelineError;
use thiserror::Error;

/// Transformation failures
///
/// All of them are deterministic for a given input, so each maps to a permanent kind.
#[derive(Debug, Error)]
pub enum ProcessingError {
    #[error("Unsupported format: {0}")]
    UnsupportedFormat(String),

    #[error("Corrupt image: {0}")]
    CorruptImage(String),

    #[error("Encoding failed: {0}")]
    EncodeFailed(String),
}

impl From<ProcessingError> for PipelineError {
    fn from(err: ProcessingError) -> Self {
        match err {
            ProcessingError::UnsupportedFormat(detail) => PipelineError::UnsupportedFormat(detail),
            ProcessingError::CorruptImage(detail) => PipelineError::CorruptImage(detail),
            ProcessingError::EncodeFailed(detail) => {
                PipelineError::Unprocessable(format!("Encoding failed: {}", detail))
            }
        }
    }
}

//! Error types module
//!
//! Every failure raised while dispatching a delivery is a [`PipelineError`]. Each variant maps
//! to exactly one machine-readable [`ErrorKind`], and the kind alone decides whether the
//! failure is transient (the broker may redeliver) or permanent (the record is marked failed).

use serde::{Deserialize, Serialize};
use std::fmt::{Display, Formatter, Result as FmtResult};

/// Log level for error reporting
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogLevel {
    /// Debug level - for expected errors like malformed or unroutable input
    Debug,
    /// Warning level - for recoverable issues and bad image payloads
    Warn,
    /// Error level - for unexpected failures
    Error,
}

/// Metadata describing how an error should be classified and reported
pub trait ErrorMetadata {
    /// Machine-readable error code (e.g., "UNROUTABLE_KEY")
    fn error_code(&self) -> &'static str;

    /// Whether this error is recoverable (the delivery can be retried)
    fn is_recoverable(&self) -> bool;

    /// Log level for this error
    fn log_level(&self) -> LogLevel;
}

/// Machine-readable failure kind carried by a failed outcome.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ErrorKind {
    MalformedEnvelope,
    UnroutableKey,
    UnsupportedFormat,
    CorruptImage,
    ObjectNotFound,
    ReadFailure,
    WriteFailure,
    StoreUnavailable,
    Internal,
    /// Deterministic failure that no redelivery can fix (encoder refusal, invalid storage key).
    Unprocessable,
}

impl ErrorKind {
    /// Transient kinds leave the processing record claimable so a redelivery can retry.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            ErrorKind::ReadFailure
                | ErrorKind::WriteFailure
                | ErrorKind::StoreUnavailable
                | ErrorKind::Internal
        )
    }
}

impl Display for ErrorKind {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        let name = match self {
            ErrorKind::MalformedEnvelope => "MalformedEnvelope",
            ErrorKind::UnroutableKey => "UnroutableKey",
            ErrorKind::UnsupportedFormat => "UnsupportedFormat",
            ErrorKind::CorruptImage => "CorruptImage",
            ErrorKind::ObjectNotFound => "ObjectNotFound",
            ErrorKind::ReadFailure => "ReadFailure",
            ErrorKind::WriteFailure => "WriteFailure",
            ErrorKind::StoreUnavailable => "StoreUnavailable",
            ErrorKind::Internal => "Internal",
            ErrorKind::Unprocessable => "Unprocessable",
        };
        write!(f, "{}", name)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PipelineError {
    #[error("Malformed envelope: {0}")]
    MalformedEnvelope(String),

    #[error("Unroutable key: {0}")]
    UnroutableKey(String),

    #[error("Unsupported format: {0}")]
    UnsupportedFormat(String),

    #[error("Corrupt image: {0}")]
    CorruptImage(String),

    #[error("Object not found: {0}")]
    ObjectNotFound(String),

    #[error("Read failed: {0}")]
    ReadFailure(String),

    #[error("Write failed: {0}")]
    WriteFailure(String),

    #[error("Marker store unavailable: {0}")]
    StoreUnavailable(String),

    #[error("Internal error: {0}")]
    Internal(String),

    #[error("Unprocessable: {0}")]
    Unprocessable(String),
}

impl PipelineError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            PipelineError::MalformedEnvelope(_) => ErrorKind::MalformedEnvelope,
            PipelineError::UnroutableKey(_) => ErrorKind::UnroutableKey,
            PipelineError::UnsupportedFormat(_) => ErrorKind::UnsupportedFormat,
            PipelineError::CorruptImage(_) => ErrorKind::CorruptImage,
            PipelineError::ObjectNotFound(_) => ErrorKind::ObjectNotFound,
            PipelineError::ReadFailure(_) => ErrorKind::ReadFailure,
            PipelineError::WriteFailure(_) => ErrorKind::WriteFailure,
            PipelineError::StoreUnavailable(_) => ErrorKind::StoreUnavailable,
            PipelineError::Internal(_) => ErrorKind::Internal,
            PipelineError::Unprocessable(_) => ErrorKind::Unprocessable,
        }
    }

    /// The detail string without the kind prefix.
    pub fn detail(&self) -> &str {
        match self {
            PipelineError::MalformedEnvelope(d)
            | PipelineError::UnroutableKey(d)
            | PipelineError::UnsupportedFormat(d)
            | PipelineError::CorruptImage(d)
            | PipelineError::ObjectNotFound(d)
            | PipelineError::ReadFailure(d)
            | PipelineError::WriteFailure(d)
            | PipelineError::StoreUnavailable(d)
            | PipelineError::Internal(d)
            | PipelineError::Unprocessable(d) => d,
        }
    }
}

impl ErrorMetadata for PipelineError {
    fn error_code(&self) -> &'static str {
        match self {
            PipelineError::MalformedEnvelope(_) => "MALFORMED_ENVELOPE",
            PipelineError::UnroutableKey(_) => "UNROUTABLE_KEY",
            PipelineError::UnsupportedFormat(_) => "UNSUPPORTED_FORMAT",
            PipelineError::CorruptImage(_) => "CORRUPT_IMAGE",
            PipelineError::ObjectNotFound(_) => "OBJECT_NOT_FOUND",
            PipelineError::ReadFailure(_) => "READ_FAILURE",
            PipelineError::WriteFailure(_) => "WRITE_FAILURE",
            PipelineError::StoreUnavailable(_) => "STORE_UNAVAILABLE",
            PipelineError::Internal(_) => "INTERNAL_ERROR",
            PipelineError::Unprocessable(_) => "UNPROCESSABLE",
        }
    }

    fn is_recoverable(&self) -> bool {
        self.kind().is_transient()
    }

    fn log_level(&self) -> LogLevel {
        match self {
            PipelineError::MalformedEnvelope(_)
            | PipelineError::UnroutableKey(_)
            | PipelineError::ObjectNotFound(_) => LogLevel::Debug,
            PipelineError::UnsupportedFormat(_)
            | PipelineError::CorruptImage(_)
            | PipelineError::ReadFailure(_)
            | PipelineError::WriteFailure(_)
            | PipelineError::Unprocessable(_) => LogLevel::Warn,
            PipelineError::StoreUnavailable(_) | PipelineError::Internal(_) => LogLevel::Error,
        }
    }
}

use crate::error::{ErrorKind, PipelineError};
use serde::{Deserialize, Serialize};
use std::fmt::{Display, Formatter, Result as FmtResult};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum OutcomeStatus {
    Success,
    Skipped,
    Failed,
}

impl Display for OutcomeStatus {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        match self {
            OutcomeStatus::Success => write!(f, "Success"),
            OutcomeStatus::Skipped => write!(f, "Skipped"),
            OutcomeStatus::Failed => write!(f, "Failed"),
        }
    }
}

/// Where a derived artifact was written.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutputRef {
    pub location: String,
    pub key: String,
}

/// Result of dispatching one delivery, returned to the invoking runtime.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Outcome {
    pub status: OutcomeStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub kind: Option<ErrorKind>,
    pub detail: String,
    pub retryable: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub retry_after_secs: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub processing_key: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output: Option<OutputRef>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub attempt: Option<u32>,
}

impl Outcome {
    pub fn success(detail: impl Into<String>, output: OutputRef) -> Self {
        Self {
            status: OutcomeStatus::Success,
            kind: None,
            detail: detail.into(),
            retryable: false,
            retry_after_secs: None,
            processing_key: None,
            output: Some(output),
            attempt: None,
        }
    }

    pub fn skipped(detail: impl Into<String>) -> Self {
        Self {
            status: OutcomeStatus::Skipped,
            kind: None,
            detail: detail.into(),
            retryable: false,
            retry_after_secs: None,
            processing_key: None,
            output: None,
            attempt: None,
        }
    }

    /// A permanent failure; callers mark transient ones with [`Outcome::retry_after`].
    pub fn failed(error: &PipelineError) -> Self {
        Self {
            status: OutcomeStatus::Failed,
            kind: Some(error.kind()),
            detail: error.detail().to_string(),
            retryable: false,
            retry_after_secs: None,
            processing_key: None,
            output: None,
            attempt: None,
        }
    }

    pub fn retry_after(mut self, secs: u64) -> Self {
        self.retryable = true;
        self.retry_after_secs = Some(secs);
        self
    }

    pub fn with_processing_key(mut self, key: impl Into<String>) -> Self {
        self.processing_key = Some(key.into());
        self
    }

    pub fn with_attempt(mut self, attempt: u32) -> Self {
        self.attempt = Some(attempt);
        self
    }

    pub fn with_kind(mut self, kind: ErrorKind) -> Self {
        self.kind = Some(kind);
        self
    }

    pub fn is_success(&self) -> bool {
        self.status == OutcomeStatus::Success
    }

    pub fn is_skipped(&self) -> bool {
        self.status == OutcomeStatus::Skipped
    }

    pub fn is_failed(&self) -> bool {
        self.status == OutcomeStatus::Failed
    }
}

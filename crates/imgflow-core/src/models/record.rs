use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::fmt::{Display, Formatter, Result as FmtResult};
use std::str::FromStr;

/// Identifier of one unit of idempotent work: an object plus the fingerprint of one upload.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ProcessingKey {
    pub source_location: String,
    pub object_key: String,
    pub fingerprint: String,
}

impl ProcessingKey {
    pub fn new(
        source_location: impl Into<String>,
        object_key: impl Into<String>,
        fingerprint: impl Into<String>,
    ) -> Self {
        Self {
            source_location: source_location.into(),
            object_key: object_key.into(),
            fingerprint: fingerprint.into(),
        }
    }
}

/// Rendered as `{location}/{key}#{fingerprint}`, the form stored in the marker store.
impl Display for ProcessingKey {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        write!(
            f,
            "{}/{}#{}",
            self.source_location, self.object_key, self.fingerprint
        )
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ProcessingStatus {
    Pending,
    InProgress,
    Completed,
    Failed,
}

impl Display for ProcessingStatus {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        match self {
            ProcessingStatus::Pending => write!(f, "pending"),
            ProcessingStatus::InProgress => write!(f, "in_progress"),
            ProcessingStatus::Completed => write!(f, "completed"),
            ProcessingStatus::Failed => write!(f, "failed"),
        }
    }
}

impl FromStr for ProcessingStatus {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(ProcessingStatus::Pending),
            "in_progress" => Ok(ProcessingStatus::InProgress),
            "completed" => Ok(ProcessingStatus::Completed),
            "failed" => Ok(ProcessingStatus::Failed),
            _ => Err(anyhow::anyhow!("Invalid processing status: {}", s)),
        }
    }
}

/// Durable state of one processing key.
///
/// Records are never mutated in place: each transition returns the next record with
/// `version` bumped by one, and the marker store only accepts it if the stored record still
/// has the previous status and version.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProcessingRecord {
    pub processing_key: String,
    pub object_key: String,
    pub fingerprint: String,
    pub status: ProcessingStatus,
    pub attempt_count: u32,
    pub version: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output_key: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_error: Option<String>,
    pub created_at: DateTime<Utc>,
    pub last_updated: DateTime<Utc>,
}

impl ProcessingRecord {
    /// First sighting of a processing key.
    pub fn pending(key: &ProcessingKey, now: DateTime<Utc>) -> Self {
        Self {
            processing_key: key.to_string(),
            object_key: key.object_key.clone(),
            fingerprint: key.fingerprint.clone(),
            status: ProcessingStatus::Pending,
            attempt_count: 0,
            version: 0,
            output_key: None,
            last_error: None,
            created_at: now,
            last_updated: now,
        }
    }

    fn next(&self, status: ProcessingStatus, now: DateTime<Utc>) -> Self {
        Self {
            status,
            version: self.version + 1,
            last_updated: now,
            ..self.clone()
        }
    }

    /// Claim for processing (`Pending` claim or stale `InProgress` reclaim).
    pub fn claimed(&self, now: DateTime<Utc>) -> Self {
        let mut next = self.next(ProcessingStatus::InProgress, now);
        next.attempt_count = self.attempt_count + 1;
        next
    }

    pub fn completed(&self, output_key: impl Into<String>, now: DateTime<Utc>) -> Self {
        let mut next = self.next(ProcessingStatus::Completed, now);
        next.output_key = Some(output_key.into());
        next.last_error = None;
        next
    }

    /// Hand the key back after a transient failure so a redelivery can claim it.
    pub fn released(&self, error: impl Into<String>, now: DateTime<Utc>) -> Self {
        let mut next = self.next(ProcessingStatus::Pending, now);
        next.last_error = Some(error.into());
        next
    }

    pub fn failed(&self, error: impl Into<String>, now: DateTime<Utc>) -> Self {
        let mut next = self.next(ProcessingStatus::Failed, now);
        next.last_error = Some(error.into());
        next
    }

    /// Operator retry of a failed key; the attempt budget starts over.
    pub fn reset(&self, now: DateTime<Utc>) -> Self {
        let mut next = self.next(ProcessingStatus::Pending, now);
        next.attempt_count = 0;
        next
    }

    /// An `InProgress` record untouched for longer than `window` belongs to a dead worker.
    pub fn is_stale(&self, now: DateTime<Utc>, window: Duration) -> bool {
        self.status == ProcessingStatus::InProgress && now - self.last_updated >= window
    }
}

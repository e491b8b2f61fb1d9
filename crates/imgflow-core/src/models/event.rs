use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// One storage notification, decoded from a delivery payload.
///
/// The optional attributes identify a specific upload of the object; they feed the
/// content fingerprint so a duplicate delivery maps to the same processing key while a
/// re-upload does not.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NotificationEvent {
    /// Bucket / container the object was written to
    pub source_location: String,
    /// Decoded object key
    pub object_key: String,
    pub size_bytes: u64,
    pub event_time: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub event_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub etag: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sequencer: Option<String>,
}

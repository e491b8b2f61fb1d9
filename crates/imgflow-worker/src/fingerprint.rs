//! Fingerprints that tell one upload of an object apart from another

use imgflow_core::NotificationEvent;
use sha2::{Digest, Sha256};

/// Hash of the upload attributes carried by the notification.
///
/// Redeliveries of one notification carry identical attributes, so they share a fingerprint;
/// overwriting the object produces a new etag, version or sequencer and therefore a new one.
pub fn event_fingerprint(event: &NotificationEvent) -> String {
    let mut hasher = Sha256::new();
    let size = event.size_bytes.to_string();
    let time = event.event_time.to_rfc3339();
    let parts = [
        event.source_location.as_str(),
        event.object_key.as_str(),
        size.as_str(),
        event.etag.as_deref().unwrap_or(""),
        event.version_id.as_deref().unwrap_or(""),
        event.sequencer.as_deref().unwrap_or(""),
        time.as_str(),
    ];
    for part in parts {
        // Length prefix keeps ("ab", "c") and ("a", "bc") apart
        hasher.update((part.len() as u64).to_be_bytes());
        hasher.update(part.as_bytes());
    }
    hex::encode(hasher.finalize())
}

/// SHA-256 of the object body.
pub fn content_fingerprint(data: &[u8]) -> String {
    hex::encode(Sha256::digest(data))
}

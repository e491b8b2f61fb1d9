//! Application-wide constants

/// API path prefix
pub const API_PREFIX: &str = "/v1";

/// Upper bound for a readiness probe against the marker store
pub const READINESS_TIMEOUT_SECS: u64 = 5;

//! Health check handlers.

use crate::constants::READINESS_TIMEOUT_SECS;
use crate::state::AppState;
use axum::{extract::State, http::StatusCode, response::IntoResponse, Json};
use std::sync::Arc;
use std::time::Duration;

/// Liveness probe - process is running.
pub async fn liveness_check() -> impl IntoResponse {
    (
        StatusCode::OK,
        Json(serde_json::json!({ "status": "alive" })),
    )
}

/// Readiness probe - the marker store answers.
pub async fn readiness_check(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let timeout = Duration::from_secs(READINESS_TIMEOUT_SECS);

    let mut response = serde_json::json!({
        "status": "ready",
        "marker_store": "unknown",
        "marker_backend": state.markers.backend_type().to_string(),
    });

    let ready = match tokio::time::timeout(timeout, state.markers.health_check()).await {
        Ok(Ok(())) => {
            response["marker_store"] = serde_json::json!("ready");
            true
        }
        Ok(Err(e)) => {
            tracing::error!(error = %e, "Marker store readiness check failed");
            response["marker_store"] = serde_json::json!(format!("not_ready: {}", e));
            false
        }
        Err(_) => {
            tracing::error!("Marker store readiness check timed out");
            response["marker_store"] = serde_json::json!("timeout");
            false
        }
    };

    if ready {
        (StatusCode::OK, Json(response))
    } else {
        response["status"] = serde_json::json!("not_ready");
        (StatusCode::SERVICE_UNAVAILABLE, Json(response))
    }
}

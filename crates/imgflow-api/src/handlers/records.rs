//! Processing record inspection and operator reset

use crate::error::HttpAppError;
use crate::state::AppState;
use axum::{
    extract::{rejection::JsonRejection, Path, Query, State},
    Json,
};
use imgflow_core::ProcessingRecord;
use imgflow_worker::ResetResult;
use serde::Deserialize;
use std::sync::Arc;

#[derive(Debug, Deserialize)]
pub struct ResetRequest {
    pub processing_key: String,
}

#[derive(Debug, Deserialize)]
pub struct RecordQuery {
    pub processing_key: String,
}

/// `GET /v1/records/{*processing_key}`
///
/// Processing keys have the form `bucket/key#fingerprint`. The `#` must be sent as `%23`,
/// otherwise the client treats the fingerprint as a URL fragment and never sends it. Slashes
/// may stay literal.
pub async fn get_record(
    State(state): State<Arc<AppState>>,
    Path(processing_key): Path<String>,
) -> Result<Json<ProcessingRecord>, HttpAppError> {
    inspect(&state, &processing_key).await
}

/// `GET /v1/records?processing_key=...`, for clients that build URLs with a query encoder.
pub async fn find_record(
    State(state): State<Arc<AppState>>,
    Query(query): Query<RecordQuery>,
) -> Result<Json<ProcessingRecord>, HttpAppError> {
    inspect(&state, &query.processing_key).await
}

async fn inspect(
    state: &AppState,
    processing_key: &str,
) -> Result<Json<ProcessingRecord>, HttpAppError> {
    state
        .dispatcher
        .guard()
        .inspect(processing_key)
        .await?
        .map(Json)
        .ok_or_else(|| {
            HttpAppError::NotFound(format!("No processing record for {}", processing_key))
        })
}

pub async fn reset_record(
    State(state): State<Arc<AppState>>,
    payload: Result<Json<ResetRequest>, JsonRejection>,
) -> Result<Json<ProcessingRecord>, HttpAppError> {
    let Json(request) = payload?;
    if request.processing_key.trim().is_empty() {
        return Err(HttpAppError::InvalidInput(
            "processing_key must not be empty".to_string(),
        ));
    }

    match state.dispatcher.guard().reset(&request.processing_key).await? {
        ResetResult::Reset(record) => Ok(Json(record)),
        ResetResult::NotFound => Err(HttpAppError::NotFound(format!(
            "No processing record for {}",
            request.processing_key
        ))),
        ResetResult::NotFailed(status) => Err(HttpAppError::Conflict(format!(
            "Processing record is {}, only failed records can be reset",
            status
        ))),
    }
}

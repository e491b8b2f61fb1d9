//! Push endpoint for broker deliveries

use crate::state::AppState;
use axum::{
    extract::State,
    http::{header::RETRY_AFTER, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use bytes::Bytes;
use imgflow_core::Outcome;
use serde::Serialize;
use std::sync::Arc;

#[derive(Debug, Serialize)]
pub struct DeliveryResponse {
    pub outcomes: Vec<Outcome>,
}

/// Dispatch every record in the payload, in order.
///
/// Answers 200 when nothing needs redelivering (successes, skips and permanent failures are
/// all acknowledged) and 503 with `Retry-After` when at least one outcome is retryable.
#[tracing::instrument(skip(state, body), fields(payload_bytes = body.len()))]
pub async fn receive_delivery(State(state): State<Arc<AppState>>, body: Bytes) -> Response {
    let outcomes = state.dispatcher.handle_batch(&body).await;

    let retry_after = outcomes
        .iter()
        .filter(|o| o.retryable)
        .map(|o| o.retry_after_secs.unwrap_or(0))
        .max();

    let body = Json(DeliveryResponse { outcomes });
    match retry_after {
        Some(secs) => {
            tracing::info!(retry_after_secs = secs, "Delivery needs redelivery");
            let mut response = (StatusCode::SERVICE_UNAVAILABLE, body).into_response();
            response
                .headers_mut()
                .insert(RETRY_AFTER, HeaderValue::from(secs));
            response
        }
        None => (StatusCode::OK, body).into_response(),
    }
}

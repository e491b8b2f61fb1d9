//! Route configuration and setup.
//!
//! Pipeline and record routes live under [`API_PREFIX`]; health checks in [health](health).

mod health;

use crate::constants::API_PREFIX;
use crate::handlers::{deliveries, records};
use crate::state::AppState;
use axum::{
    extract::DefaultBodyLimit,
    routing::{get, post},
    Router,
};
use imgflow_core::Config;
use std::sync::Arc;
use tower_http::trace::TraceLayer;

/// Setup all application routes
pub fn setup_routes(config: &Config, state: Arc<AppState>) -> Router<()> {
    let api_routes = Router::new()
        .route("/deliveries", post(deliveries::receive_delivery))
        .route("/records", get(records::find_record))
        .route("/records/reset", post(records::reset_record))
        .route("/records/{*processing_key}", get(records::get_record));

    let health_routes = Router::new()
        .route("/live", get(health::liveness_check))
        .route("/ready", get(health::readiness_check));

    Router::new()
        .nest(API_PREFIX, api_routes)
        .nest("/health", health_routes)
        .layer(DefaultBodyLimit::max(config.base.max_payload_bytes))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

//! Application setup and initialization

pub mod routes;
pub mod server;

use crate::state::AppState;
use anyhow::{Context, Result};
use imgflow_core::{Clock, Config, MonotonicClock};
use imgflow_db::create_marker_store;
use imgflow_storage::create_storage;
use imgflow_worker::Dispatcher;
use std::sync::Arc;

/// Initialize the entire application
pub async fn initialize_app(config: Config) -> Result<(Arc<AppState>, axum::Router)> {
    // Validate configuration first - fail fast on misconfiguration
    config.validate().context("Configuration validation failed")?;

    crate::telemetry::init_telemetry(&config.base.log_format)?;

    tracing::info!(
        environment = %config.base.environment,
        storage_backend = %config.storage.backend,
        marker_backend = %config.marker.backend,
        routes = config.pipeline.routes.len(),
        "Configuration loaded and validated successfully"
    );

    let storage = create_storage(&config.storage)
        .await
        .context("Failed to initialize object storage")?;
    let markers = create_marker_store(&config.marker)
        .await
        .context("Failed to initialize marker store")?;
    let clock: Arc<dyn Clock> = Arc::new(MonotonicClock::new());

    let dispatcher = Dispatcher::new(&config, storage, markers.clone(), clock)?;
    let state = Arc::new(AppState::new(config.clone(), dispatcher, markers));

    let router = routes::setup_routes(&config, state.clone());

    Ok((state, router))
}

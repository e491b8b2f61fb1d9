use crate::{InMemoryMarkerStore, MarkerStore};
use imgflow_core::{MarkerBackend, MarkerConfig};
use std::sync::Arc;

/// Create the marker store selected by configuration
pub async fn create_marker_store(
    config: &MarkerConfig,
) -> Result<Arc<dyn MarkerStore>, anyhow::Error> {
    match config.backend {
        #[cfg(feature = "postgres")]
        MarkerBackend::Postgres => {
            let url = config
                .database_url
                .as_deref()
                .ok_or_else(|| anyhow::anyhow!("DATABASE_URL not configured"))?;
            let store = crate::PgMarkerStore::connect(
                url,
                config.db_max_connections,
                config.db_timeout_seconds,
            )
            .await?;
            tracing::info!("PostgreSQL marker store connected");
            Ok(Arc::new(store))
        }

        #[cfg(not(feature = "postgres"))]
        MarkerBackend::Postgres => Err(anyhow::anyhow!(
            "PostgreSQL marker store not available (postgres feature not enabled)"
        )),

        MarkerBackend::Memory => {
            tracing::warn!(
                "Using in-memory marker store; idempotency is per-process and lost on restart"
            );
            Ok(Arc::new(InMemoryMarkerStore::new()))
        }
    }
}

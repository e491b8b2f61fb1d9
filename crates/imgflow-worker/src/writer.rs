use crate::guard::Lease;
use imgflow_core::{Clock, OutputRef, PipelineError, ProcessingStatus};
use imgflow_db::MarkerStore;
use imgflow_processing::Artifact;
use imgflow_storage::{Storage, StorageError};
use std::sync::Arc;
use std::time::Instant;

/// Persists an artifact, then records the key as completed.
///
/// The artifact goes first: a crash between the two steps leaves the record `InProgress`,
/// and the reclaiming dispatcher overwrites the object with identical bytes.
pub struct ResultWriter {
    storage: Arc<dyn Storage>,
    store: Arc<dyn MarkerStore>,
    clock: Arc<dyn Clock>,
}

impl ResultWriter {
    pub fn new(storage: Arc<dyn Storage>, store: Arc<dyn MarkerStore>, clock: Arc<dyn Clock>) -> Self {
        Self {
            storage,
            store,
            clock,
        }
    }

    #[tracing::instrument(skip(self, artifact, lease), fields(processing_key = %lease.processing_key()))]
    pub async fn write(
        &self,
        artifact: &Artifact,
        output_location: &str,
        output_key: &str,
        lease: &Lease,
    ) -> Result<OutputRef, PipelineError> {
        let start = Instant::now();

        self.storage
            .put(
                output_location,
                output_key,
                artifact.data.clone(),
                &artifact.content_type,
            )
            .await
            .map_err(StorageError::into_write_error)?;

        let completed = lease.record().completed(output_key, self.clock.now());
        let recorded = self
            .store
            .update_if(ProcessingStatus::InProgress, lease.version(), &completed)
            .await?;

        if recorded {
            tracing::info!(
                bucket = %output_location,
                key = %output_key,
                size_bytes = artifact.size_bytes(),
                attempt = lease.attempt(),
                duration_ms = start.elapsed().as_secs_f64() * 1000.0,
                "Artifact written"
            );
        } else {
            // Reclaimed after going stale; the other holder writes the same bytes
            tracing::warn!(
                bucket = %output_location,
                key = %output_key,
                version = lease.version(),
                "Lease lost before completion was recorded, artifact kept"
            );
        }

        Ok(OutputRef {
            location: output_location.to_string(),
            key: output_key.to_string(),
        })
    }
}

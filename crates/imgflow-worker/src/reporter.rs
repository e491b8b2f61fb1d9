use crate::guard::Lease;
use imgflow_core::{
    Clock, ErrorMetadata, LogLevel, Outcome, PipelineError, ProcessingStatus, RetryPolicy,
};
use imgflow_db::MarkerStore;
use std::sync::Arc;

/// Turns a pipeline failure into an [`Outcome`] and settles the processing record.
///
/// Transient failures hand the key back (`InProgress -> Pending`) so a redelivery can retry
/// it; permanent ones, and transient ones that used up the attempt budget, mark it `Failed`.
pub struct FailureReporter {
    store: Arc<dyn MarkerStore>,
    clock: Arc<dyn Clock>,
    retry: RetryPolicy,
    max_attempts: u32,
}

impl FailureReporter {
    pub fn new(
        store: Arc<dyn MarkerStore>,
        clock: Arc<dyn Clock>,
        retry: RetryPolicy,
        max_attempts: u32,
    ) -> Self {
        Self {
            store,
            clock,
            retry,
            max_attempts,
        }
    }

    /// `lease` is `None` when the failure happened before a processing key was claimed.
    pub async fn report(&self, error: &PipelineError, lease: Option<&Lease>) -> Outcome {
        log_error(error);

        let Some(lease) = lease else {
            let outcome = Outcome::failed(error);
            return if error.is_recoverable() {
                outcome.retry_after(self.retry.backoff_secs(1))
            } else {
                outcome
            };
        };

        let attempt = lease.attempt();
        let now = self.clock.now();
        let exhausted = attempt >= self.max_attempts;

        let (next, outcome) = if error.is_recoverable() && !exhausted {
            (
                lease.record().released(error.to_string(), now),
                Outcome::failed(error).retry_after(self.retry.backoff_secs(attempt)),
            )
        } else if error.is_recoverable() {
            tracing::warn!(
                processing_key = %lease.processing_key(),
                attempt = attempt,
                kind = %error.kind(),
                "Attempt budget exhausted, failing permanently"
            );
            let mut outcome = Outcome::failed(error);
            outcome.detail = format!(
                "{} (attempt budget exhausted after {} attempts)",
                outcome.detail, attempt
            );
            (lease.record().failed(error.to_string(), now), outcome)
        } else {
            (
                lease.record().failed(error.to_string(), now),
                Outcome::failed(error),
            )
        };

        match self
            .store
            .update_if(ProcessingStatus::InProgress, lease.version(), &next)
            .await
        {
            Ok(true) => {}
            Ok(false) => tracing::warn!(
                processing_key = %lease.processing_key(),
                version = lease.version(),
                "Lease lost before failure was recorded"
            ),
            Err(e) => tracing::error!(
                processing_key = %lease.processing_key(),
                error = %e,
                original_error = %error,
                "Failed to record failure in marker store"
            ),
        }

        outcome
            .with_processing_key(lease.processing_key())
            .with_attempt(attempt)
    }
}

fn log_error(error: &PipelineError) {
    let code = error.error_code();
    match error.log_level() {
        LogLevel::Debug => tracing::debug!(error = %error, error_code = code, "Delivery failed"),
        LogLevel::Warn => tracing::warn!(error = %error, error_code = code, "Delivery failed"),
        LogLevel::Error => tracing::error!(error = %error, error_code = code, "Delivery failed"),
    }
}

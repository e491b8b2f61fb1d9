//! Single entry point for a delivery: parse, route, gate, transform, write

use crate::fingerprint::{content_fingerprint, event_fingerprint};
use crate::guard::{AcquireResult, IdempotencyGuard, Lease};
use crate::reporter::FailureReporter;
use crate::writer::ResultWriter;
use bytes::Bytes;
use imgflow_core::{
    Clock, Config, EnvelopeParser, FingerprintMode, NotificationEvent, Outcome, OutputRef,
    PipelineError, PrefixRouter, ProcessingKey, RoutingDecision,
};
use imgflow_db::MarkerStore;
use imgflow_processing::TransformationExecutor;
use imgflow_storage::{Storage, StorageError};
use std::sync::Arc;
use std::time::Instant;
use tracing::Instrument;
use uuid::Uuid;

pub struct Dispatcher {
    router: PrefixRouter,
    fingerprint_mode: FingerprintMode,
    output_location: Option<String>,
    storage: Arc<dyn Storage>,
    executor: Arc<TransformationExecutor>,
    guard: IdempotencyGuard,
    writer: ResultWriter,
    reporter: FailureReporter,
}

impl Dispatcher {
    pub fn new(
        config: &Config,
        storage: Arc<dyn Storage>,
        store: Arc<dyn MarkerStore>,
        clock: Arc<dyn Clock>,
    ) -> anyhow::Result<Self> {
        let router = PrefixRouter::new(config.pipeline.routes.clone())?;

        Ok(Self {
            router,
            fingerprint_mode: config.idempotency.fingerprint_mode,
            output_location: config.pipeline.output_location.clone(),
            executor: Arc::new(TransformationExecutor::new(config.pipeline.resize)),
            guard: IdempotencyGuard::new(store.clone(), clock.clone(), &config.idempotency),
            writer: ResultWriter::new(storage.clone(), store.clone(), clock.clone()),
            reporter: FailureReporter::new(
                store,
                clock,
                config.retry,
                config.idempotency.max_attempts,
            ),
            storage,
        })
    }

    pub fn guard(&self) -> &IdempotencyGuard {
        &self.guard
    }

    /// Dispatch one single-record payload. Never fails: every exit is an [`Outcome`].
    pub async fn handle(&self, raw: &[u8]) -> Outcome {
        let span = tracing::info_span!(
            "delivery",
            delivery_id = %Uuid::new_v4(),
            bucket = tracing::field::Empty,
            key = tracing::field::Empty,
        );
        self.dispatch(raw).instrument(span).await
    }

    /// Split a batched payload and dispatch each record in order.
    pub async fn handle_batch(&self, raw: &[u8]) -> Vec<Outcome> {
        let mut outcomes = Vec::new();
        for part in EnvelopeParser::split(raw) {
            outcomes.push(self.handle(&part).await);
        }
        outcomes
    }

    async fn dispatch(&self, raw: &[u8]) -> Outcome {
        let start = Instant::now();

        let event = match EnvelopeParser::parse(raw) {
            Ok(event) => event,
            Err(e) => return self.reporter.report(&e, None).await,
        };
        let span = tracing::Span::current();
        span.record("bucket", event.source_location.as_str());
        span.record("key", event.object_key.as_str());

        let decision = match self.router.route(&event.object_key) {
            Ok(decision) => decision,
            Err(e) => return self.reporter.report(&e, None).await,
        };

        let (fingerprint, prefetched) = match self.fingerprint_mode {
            FingerprintMode::Event => (event_fingerprint(&event), None),
            FingerprintMode::Content => match self.read(&event).await {
                Ok(data) => (content_fingerprint(&data), Some(data)),
                Err(e) => return self.reporter.report(&e, None).await,
            },
        };
        let key = ProcessingKey::new(&event.source_location, &event.object_key, fingerprint);

        let lease = match self.guard.acquire(&key).await {
            Ok(AcquireResult::Proceed(lease)) => lease,
            Ok(AcquireResult::AlreadyCompleted { output_key }) => {
                let detail = match output_key {
                    Some(output_key) => format!("already completed, output at {}", output_key),
                    None => "already completed".to_string(),
                };
                return skipped(&key, detail);
            }
            Ok(AcquireResult::AlreadyInProgress) => {
                return skipped(&key, "already in progress".to_string());
            }
            Ok(AcquireResult::AlreadyFailed { last_error }) => {
                let detail = match last_error {
                    Some(error) => format!("previously failed: {}", error),
                    None => "previously failed".to_string(),
                };
                return skipped(&key, detail);
            }
            Err(e) => {
                return self
                    .reporter
                    .report(&e, None)
                    .await
                    .with_processing_key(key.to_string())
            }
        };

        match self.process(&event, &decision, prefetched, &lease).await {
            Ok(output) => {
                tracing::info!(
                    processing_key = %key,
                    kind = %decision.transformation_kind,
                    attempt = lease.attempt(),
                    output_key = %output.key,
                    duration_ms = start.elapsed().as_secs_f64() * 1000.0,
                    "Delivery processed"
                );
                Outcome::success(
                    format!("{} written", decision.transformation_kind),
                    output,
                )
                .with_processing_key(key.to_string())
                .with_attempt(lease.attempt())
            }
            Err(e) => self.reporter.report(&e, Some(&lease)).await,
        }
    }

    async fn process(
        &self,
        event: &NotificationEvent,
        decision: &RoutingDecision,
        prefetched: Option<Bytes>,
        lease: &Lease,
    ) -> Result<OutputRef, PipelineError> {
        let data = match prefetched {
            Some(data) => data,
            None => self.read(event).await?,
        };

        let executor = self.executor.clone();
        let kind = decision.transformation_kind;
        let artifact = tokio::task::spawn_blocking(move || executor.execute(kind, &data))
            .await
            .map_err(|e| PipelineError::Internal(format!("Transformation task failed: {}", e)))??;

        let location = self
            .output_location
            .as_deref()
            .unwrap_or(&event.source_location);
        self.writer
            .write(&artifact, location, &decision.output_key, lease)
            .await
    }

    async fn read(&self, event: &NotificationEvent) -> Result<Bytes, PipelineError> {
        let start = Instant::now();
        let data = self
            .storage
            .get(&event.source_location, &event.object_key)
            .await
            .map_err(StorageError::into_read_error)?;

        tracing::debug!(
            bucket = %event.source_location,
            key = %event.object_key,
            size_bytes = data.len(),
            duration_ms = start.elapsed().as_secs_f64() * 1000.0,
            "Source object read"
        );
        Ok(data)
    }
}

fn skipped(key: &ProcessingKey, detail: String) -> Outcome {
    tracing::info!(processing_key = %key, detail = %detail, "Delivery skipped");
    Outcome::skipped(detail).with_processing_key(key.to_string())
}

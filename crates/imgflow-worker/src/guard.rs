//! Exactly-once gate in front of the transformation

use chrono::{DateTime, Duration, Utc};
use imgflow_core::{
    Clock, IdempotencyConfig, PipelineError, ProcessingKey, ProcessingRecord, ProcessingStatus,
};
use imgflow_db::MarkerStore;
use std::sync::Arc;

/// Conditional writes lost to a concurrent dispatcher before giving up on this delivery.
const MAX_ACQUIRE_ROUNDS: usize = 4;

/// Proof of ownership of a processing key, valid while the record is still at `version`.
#[derive(Debug, Clone)]
pub struct Lease {
    record: ProcessingRecord,
}

impl Lease {
    pub fn processing_key(&self) -> &str {
        &self.record.processing_key
    }

    pub fn version(&self) -> u64 {
        self.record.version
    }

    /// 1-based attempt number of this claim.
    pub fn attempt(&self) -> u32 {
        self.record.attempt_count
    }

    /// The record as it was written by the claim.
    pub fn record(&self) -> &ProcessingRecord {
        &self.record
    }
}

#[derive(Debug, Clone)]
pub enum AcquireResult {
    Proceed(Lease),
    AlreadyCompleted { output_key: Option<String> },
    AlreadyInProgress,
    AlreadyFailed { last_error: Option<String> },
}

#[derive(Debug, Clone)]
pub enum ResetResult {
    Reset(ProcessingRecord),
    NotFound,
    NotFailed(ProcessingStatus),
}

pub struct IdempotencyGuard {
    store: Arc<dyn MarkerStore>,
    clock: Arc<dyn Clock>,
    staleness_window: Duration,
    max_attempts: u32,
}

impl IdempotencyGuard {
    pub fn new(store: Arc<dyn MarkerStore>, clock: Arc<dyn Clock>, config: &IdempotencyConfig) -> Self {
        Self {
            store,
            clock,
            staleness_window: config.staleness_window(),
            max_attempts: config.max_attempts,
        }
    }

    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    /// Decide whether this delivery does the work for `key`.
    ///
    /// Every transition is a conditional write on (status, version). Losing one means another
    /// dispatcher moved the record first, so the record is read again and re-evaluated.
    #[tracing::instrument(skip(self, key), fields(processing_key = %key))]
    pub async fn acquire(&self, key: &ProcessingKey) -> Result<AcquireResult, PipelineError> {
        let id = key.to_string();

        for _ in 0..MAX_ACQUIRE_ROUNDS {
            let now = self.clock.now();
            let record = match self.store.get(&id).await? {
                Some(record) => record,
                None => {
                    let fresh = ProcessingRecord::pending(key, now);
                    if self.store.insert_if_absent(&fresh).await? {
                        tracing::debug!(processing_key = %id, "Processing record created");
                        if let Some(lease) = self.claim(&fresh, now).await? {
                            return Ok(AcquireResult::Proceed(lease));
                        }
                    }
                    continue;
                }
            };

            match record.status {
                ProcessingStatus::Completed => {
                    return Ok(AcquireResult::AlreadyCompleted {
                        output_key: record.output_key,
                    });
                }
                ProcessingStatus::Failed => {
                    return Ok(AcquireResult::AlreadyFailed {
                        last_error: record.last_error,
                    });
                }
                ProcessingStatus::InProgress if !record.is_stale(now, self.staleness_window) => {
                    return Ok(AcquireResult::AlreadyInProgress);
                }
                ProcessingStatus::InProgress | ProcessingStatus::Pending => {
                    if record.attempt_count >= self.max_attempts {
                        if let Some(result) = self.give_up(&record, now).await? {
                            return Ok(result);
                        }
                        continue;
                    }

                    if record.status == ProcessingStatus::InProgress {
                        tracing::warn!(
                            processing_key = %id,
                            attempt = record.attempt_count,
                            last_updated = %record.last_updated,
                            "Reclaiming stale in-progress record"
                        );
                    }
                    if let Some(lease) = self.claim(&record, now).await? {
                        return Ok(AcquireResult::Proceed(lease));
                    }
                }
            }
        }

        tracing::warn!(
            processing_key = %id,
            rounds = MAX_ACQUIRE_ROUNDS,
            "Lost every conditional write for processing key, treating as in progress"
        );
        Ok(AcquireResult::AlreadyInProgress)
    }

    async fn claim(
        &self,
        record: &ProcessingRecord,
        now: DateTime<Utc>,
    ) -> Result<Option<Lease>, PipelineError> {
        let claimed = record.claimed(now);
        if self
            .store
            .update_if(record.status, record.version, &claimed)
            .await?
        {
            tracing::debug!(
                processing_key = %claimed.processing_key,
                attempt = claimed.attempt_count,
                version = claimed.version,
                "Processing key claimed"
            );
            Ok(Some(Lease { record: claimed }))
        } else {
            Ok(None)
        }
    }

    async fn give_up(
        &self,
        record: &ProcessingRecord,
        now: DateTime<Utc>,
    ) -> Result<Option<AcquireResult>, PipelineError> {
        let detail = format!(
            "attempt budget exhausted after {} attempts",
            record.attempt_count
        );
        let failed = record.failed(
            record
                .last_error
                .as_ref()
                .map(|e| format!("{} ({})", e, detail))
                .unwrap_or(detail),
            now,
        );

        if !self
            .store
            .update_if(record.status, record.version, &failed)
            .await?
        {
            return Ok(None);
        }

        tracing::warn!(
            processing_key = %failed.processing_key,
            attempt = record.attempt_count,
            "Processing key marked failed"
        );
        Ok(Some(AcquireResult::AlreadyFailed {
            last_error: failed.last_error,
        }))
    }

    pub async fn inspect(&self, processing_key: &str) -> Result<Option<ProcessingRecord>, PipelineError> {
        Ok(self.store.get(processing_key).await?)
    }

    /// Operator retry: move a `Failed` record back to `Pending` with a fresh attempt budget.
    pub async fn reset(&self, processing_key: &str) -> Result<ResetResult, PipelineError> {
        for _ in 0..MAX_ACQUIRE_ROUNDS {
            let Some(record) = self.store.get(processing_key).await? else {
                return Ok(ResetResult::NotFound);
            };
            if record.status != ProcessingStatus::Failed {
                return Ok(ResetResult::NotFailed(record.status));
            }

            let reset = record.reset(self.clock.now());
            if self
                .store
                .update_if(ProcessingStatus::Failed, record.version, &reset)
                .await?
            {
                tracing::info!(processing_key = %processing_key, "Processing record reset");
                return Ok(ResetResult::Reset(reset));
            }
        }

        match self.store.get(processing_key).await? {
            Some(record) => Ok(ResetResult::NotFailed(record.status)),
            None => Ok(ResetResult::NotFound),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use imgflow_core::{FingerprintMode, ManualClock};
    use imgflow_db::InMemoryMarkerStore;

    struct Harness {
        store: Arc<InMemoryMarkerStore>,
        clock: Arc<ManualClock>,
        guard: IdempotencyGuard,
    }

    fn harness(max_attempts: u32) -> Harness {
        let store = Arc::new(InMemoryMarkerStore::new());
        let clock = Arc::new(ManualClock::new(
            Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap(),
        ));
        let guard = IdempotencyGuard::new(
            store.clone(),
            clock.clone(),
            &IdempotencyConfig {
                staleness_window_secs: 300,
                max_attempts,
                fingerprint_mode: FingerprintMode::Event,
            },
        );
        Harness {
            store,
            clock,
            guard,
        }
    }

    fn key() -> ProcessingKey {
        ProcessingKey::new("uploads", "resize/photo.jpg", "fp1")
    }

    async fn proceed(guard: &IdempotencyGuard) -> Lease {
        match guard.acquire(&key()).await.unwrap() {
            AcquireResult::Proceed(lease) => lease,
            other => panic!("expected Proceed, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_first_acquire_claims_new_record() {
        let h = harness(3);
        let lease = proceed(&h.guard).await;

        assert_eq!(lease.attempt(), 1);
        assert_eq!(lease.version(), 1);
        let stored = h.store.get(&key().to_string()).await.unwrap().unwrap();
        assert_eq!(stored.status, ProcessingStatus::InProgress);
    }

    #[tokio::test]
    async fn test_fresh_in_progress_is_not_reclaimed() {
        let h = harness(3);
        proceed(&h.guard).await;
        h.clock.advance(Duration::seconds(299));

        assert!(matches!(
            h.guard.acquire(&key()).await.unwrap(),
            AcquireResult::AlreadyInProgress
        ));
    }

    #[tokio::test]
    async fn test_stale_in_progress_is_reclaimed_with_next_attempt() {
        let h = harness(3);
        let first = proceed(&h.guard).await;
        h.clock.advance(Duration::seconds(300));

        let second = proceed(&h.guard).await;
        assert_eq!(second.attempt(), 2);
        assert!(second.version() > first.version());
    }

    #[tokio::test]
    async fn test_stale_reclaim_respects_attempt_budget() {
        let h = harness(1);
        proceed(&h.guard).await;
        h.clock.advance(Duration::seconds(600));

        match h.guard.acquire(&key()).await.unwrap() {
            AcquireResult::AlreadyFailed { last_error } => {
                assert!(last_error.unwrap().contains("attempt budget exhausted"));
            }
            other => panic!("expected AlreadyFailed, got {:?}", other),
        }
        let stored = h.store.get(&key().to_string()).await.unwrap().unwrap();
        assert_eq!(stored.status, ProcessingStatus::Failed);
    }

    #[tokio::test]
    async fn test_completed_record_is_skipped() {
        let h = harness(3);
        let lease = proceed(&h.guard).await;
        let done = lease.record().completed("processed/resize/photo.jpg", h.clock.now());
        assert!(h
            .store
            .update_if(ProcessingStatus::InProgress, lease.version(), &done)
            .await
            .unwrap());

        match h.guard.acquire(&key()).await.unwrap() {
            AcquireResult::AlreadyCompleted { output_key } => {
                assert_eq!(output_key.as_deref(), Some("processed/resize/photo.jpg"));
            }
            other => panic!("expected AlreadyCompleted, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_released_record_is_claimed_again() {
        let h = harness(3);
        let lease = proceed(&h.guard).await;
        let released = lease.record().released("Read failed: timeout", h.clock.now());
        assert!(h
            .store
            .update_if(ProcessingStatus::InProgress, lease.version(), &released)
            .await
            .unwrap());

        let again = proceed(&h.guard).await;
        assert_eq!(again.attempt(), 2);
    }

    #[tokio::test]
    async fn test_reset_only_applies_to_failed_records() {
        let h = harness(3);
        assert!(matches!(
            h.guard.reset("nope").await.unwrap(),
            ResetResult::NotFound
        ));

        let lease = proceed(&h.guard).await;
        assert!(matches!(
            h.guard.reset(lease.processing_key()).await.unwrap(),
            ResetResult::NotFailed(ProcessingStatus::InProgress)
        ));

        let failed = lease.record().failed("Corrupt image: bad", h.clock.now());
        assert!(h
            .store
            .update_if(ProcessingStatus::InProgress, lease.version(), &failed)
            .await
            .unwrap());
        assert!(matches!(
            h.guard.acquire(&key()).await.unwrap(),
            AcquireResult::AlreadyFailed { .. }
        ));

        match h.guard.reset(lease.processing_key()).await.unwrap() {
            ResetResult::Reset(record) => {
                assert_eq!(record.status, ProcessingStatus::Pending);
                assert_eq!(record.attempt_count, 0);
            }
            other => panic!("expected Reset, got {:?}", other),
        }
        assert_eq!(proceed(&h.guard).await.attempt(), 1);
    }

    #[tokio::test]
    async fn test_unavailable_store_is_store_unavailable() {
        let h = harness(3);
        h.store.set_unavailable(true);
        let err = h.guard.acquire(&key()).await.unwrap_err();
        assert_eq!(err.kind(), imgflow_core::ErrorKind::StoreUnavailable);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_acquire_has_single_winner() {
        let h = harness(3);
        let guard = Arc::new(h.guard);

        let handles: Vec<_> = (0..16)
            .map(|_| {
                let guard = guard.clone();
                tokio::spawn(async move { guard.acquire(&key()).await.unwrap() })
            })
            .collect();

        let mut winners = 0;
        for handle in handles {
            if let AcquireResult::Proceed(_) = handle.await.unwrap() {
                winners += 1;
            }
        }
        assert_eq!(winners, 1);
    }
}

use crate::traits::{MarkerError, MarkerResult, MarkerStore};
use async_trait::async_trait;
use imgflow_core::{MarkerBackend, ProcessingRecord, ProcessingStatus};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::RwLock;

/// Marker store held in process memory
///
/// Conditional writes take the write lock for the whole compare-and-set, so they are atomic
/// within one process. Records do not survive a restart.
#[derive(Clone, Default)]
pub struct InMemoryMarkerStore {
    records: Arc<RwLock<HashMap<String, ProcessingRecord>>>,
    unavailable: Arc<AtomicBool>,
}

impl InMemoryMarkerStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every call fail with [`MarkerError::Unavailable`] until switched back.
    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    pub async fn len(&self) -> usize {
        self.records.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.records.read().await.is_empty()
    }

    /// All stored records, in no particular order.
    pub async fn records(&self) -> Vec<ProcessingRecord> {
        self.records.read().await.values().cloned().collect()
    }

    fn check_available(&self) -> MarkerResult<()> {
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(MarkerError::Unavailable(
                "in-memory marker store switched off".to_string(),
            ));
        }
        Ok(())
    }
}

#[async_trait]
impl MarkerStore for InMemoryMarkerStore {
    async fn insert_if_absent(&self, record: &ProcessingRecord) -> MarkerResult<bool> {
        self.check_available()?;
        let mut records = self.records.write().await;
        if records.contains_key(&record.processing_key) {
            return Ok(false);
        }
        records.insert(record.processing_key.clone(), record.clone());
        Ok(true)
    }

    async fn get(&self, processing_key: &str) -> MarkerResult<Option<ProcessingRecord>> {
        self.check_available()?;
        Ok(self.records.read().await.get(processing_key).cloned())
    }

    async fn update_if(
        &self,
        expected_status: ProcessingStatus,
        expected_version: u64,
        next: &ProcessingRecord,
    ) -> MarkerResult<bool> {
        self.check_available()?;
        let mut records = self.records.write().await;
        match records.get_mut(&next.processing_key) {
            Some(current)
                if current.status == expected_status && current.version == expected_version =>
            {
                *current = next.clone();
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn health_check(&self) -> MarkerResult<()> {
        self.check_available()
    }

    fn backend_type(&self) -> MarkerBackend {
        MarkerBackend::Memory
    }
}

use crate::traits::{MarkerError, MarkerResult, MarkerStore};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use imgflow_core::{MarkerBackend, ProcessingRecord, ProcessingStatus};
use sqlx::postgres::PgPoolOptions;
use sqlx::{PgPool, Postgres};
use std::time::Duration;

const SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS processing_records (
    processing_key TEXT PRIMARY KEY,
    object_key TEXT NOT NULL,
    fingerprint TEXT NOT NULL,
    status TEXT NOT NULL,
    attempt_count INTEGER NOT NULL DEFAULT 0,
    version BIGINT NOT NULL DEFAULT 0,
    output_key TEXT,
    last_error TEXT,
    created_at TIMESTAMPTZ NOT NULL,
    last_updated TIMESTAMPTZ NOT NULL
)
"#;

const STATUS_INDEX: &str = r#"
CREATE INDEX IF NOT EXISTS idx_processing_records_status_updated
    ON processing_records (status, last_updated)
"#;

#[derive(sqlx::FromRow)]
struct RecordRow {
    processing_key: String,
    object_key: String,
    fingerprint: String,
    status: String,
    attempt_count: i32,
    version: i64,
    output_key: Option<String>,
    last_error: Option<String>,
    created_at: DateTime<Utc>,
    last_updated: DateTime<Utc>,
}

impl TryFrom<RecordRow> for ProcessingRecord {
    type Error = MarkerError;

    fn try_from(row: RecordRow) -> Result<Self, Self::Error> {
        let status = row.status.parse::<ProcessingStatus>().map_err(|e| {
            MarkerError::CorruptRecord(format!("{}: {}", row.processing_key, e))
        })?;
        Ok(ProcessingRecord {
            attempt_count: u32::try_from(row.attempt_count).unwrap_or(0),
            version: u64::try_from(row.version).unwrap_or(0),
            processing_key: row.processing_key,
            object_key: row.object_key,
            fingerprint: row.fingerprint,
            status,
            output_key: row.output_key,
            last_error: row.last_error,
            created_at: row.created_at,
            last_updated: row.last_updated,
        })
    }
}

fn unavailable(e: sqlx::Error) -> MarkerError {
    MarkerError::Unavailable(e.to_string())
}

fn to_i64(version: u64) -> i64 {
    i64::try_from(version).unwrap_or(i64::MAX)
}

fn to_i32(attempts: u32) -> i32 {
    i32::try_from(attempts).unwrap_or(i32::MAX)
}

/// PostgreSQL-backed marker store
#[derive(Clone)]
pub struct PgMarkerStore {
    pool: PgPool,
}

impl PgMarkerStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Connect and make sure the `processing_records` table exists.
    pub async fn connect(
        database_url: &str,
        max_connections: u32,
        timeout_seconds: u64,
    ) -> MarkerResult<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .acquire_timeout(Duration::from_secs(timeout_seconds))
            .connect(database_url)
            .await
            .map_err(|e| {
                tracing::error!(error = %e, "Failed to connect to marker database");
                unavailable(e)
            })?;

        let store = Self::new(pool);
        store.ensure_schema().await?;
        Ok(store)
    }

    pub async fn ensure_schema(&self) -> MarkerResult<()> {
        sqlx::query(SCHEMA)
            .execute(&self.pool)
            .await
            .map_err(unavailable)?;
        sqlx::query(STATUS_INDEX)
            .execute(&self.pool)
            .await
            .map_err(unavailable)?;
        tracing::info!("Marker store schema ready");
        Ok(())
    }
}

#[async_trait]
impl MarkerStore for PgMarkerStore {
    #[tracing::instrument(skip(self, record), fields(processing_key = %record.processing_key))]
    async fn insert_if_absent(&self, record: &ProcessingRecord) -> MarkerResult<bool> {
        let result = sqlx::query(
            r#"
            INSERT INTO processing_records (
                processing_key, object_key, fingerprint, status, attempt_count, version,
                output_key, last_error, created_at, last_updated
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
            ON CONFLICT (processing_key) DO NOTHING
            "#,
        )
        .bind(&record.processing_key)
        .bind(&record.object_key)
        .bind(&record.fingerprint)
        .bind(record.status.to_string())
        .bind(to_i32(record.attempt_count))
        .bind(to_i64(record.version))
        .bind(record.output_key.as_deref())
        .bind(record.last_error.as_deref())
        .bind(record.created_at)
        .bind(record.last_updated)
        .execute(&self.pool)
        .await
        .map_err(|e| {
            tracing::error!(error = %e, "Failed to insert processing record");
            unavailable(e)
        })?;

        Ok(result.rows_affected() == 1)
    }

    async fn get(&self, processing_key: &str) -> MarkerResult<Option<ProcessingRecord>> {
        let row = sqlx::query_as::<Postgres, RecordRow>(
            r#"
            SELECT processing_key, object_key, fingerprint, status, attempt_count, version,
                   output_key, last_error, created_at, last_updated
            FROM processing_records
            WHERE processing_key = $1
            "#,
        )
        .bind(processing_key)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| {
            tracing::error!(error = %e, processing_key = %processing_key, "Failed to load processing record");
            unavailable(e)
        })?;

        row.map(ProcessingRecord::try_from).transpose()
    }

    #[tracing::instrument(skip(self, next), fields(processing_key = %next.processing_key, to = %next.status))]
    async fn update_if(
        &self,
        expected_status: ProcessingStatus,
        expected_version: u64,
        next: &ProcessingRecord,
    ) -> MarkerResult<bool> {
        let result = sqlx::query(
            r#"
            UPDATE processing_records
            SET status = $1,
                attempt_count = $2,
                version = $3,
                output_key = $4,
                last_error = $5,
                last_updated = $6
            WHERE processing_key = $7
              AND status = $8
              AND version = $9
            "#,
        )
        .bind(next.status.to_string())
        .bind(to_i32(next.attempt_count))
        .bind(to_i64(next.version))
        .bind(next.output_key.as_deref())
        .bind(next.last_error.as_deref())
        .bind(next.last_updated)
        .bind(&next.processing_key)
        .bind(expected_status.to_string())
        .bind(to_i64(expected_version))
        .execute(&self.pool)
        .await
        .map_err(|e| {
            tracing::error!(error = %e, "Failed to update processing record");
            unavailable(e)
        })?;

        Ok(result.rows_affected() == 1)
    }

    async fn health_check(&self) -> MarkerResult<()> {
        sqlx::query("SELECT 1")
            .execute(&self.pool)
            .await
            .map_err(unavailable)?;
        Ok(())
    }

    fn backend_type(&self) -> MarkerBackend {
        MarkerBackend::Postgres
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn row(status: &str) -> RecordRow {
        let t = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        RecordRow {
            processing_key: "uploads/resize/a.jpg#fp".into(),
            object_key: "resize/a.jpg".into(),
            fingerprint: "fp".into(),
            status: status.into(),
            attempt_count: 2,
            version: 5,
            output_key: None,
            last_error: Some("Read failed: timeout".into()),
            created_at: t,
            last_updated: t,
        }
    }

    #[test]
    fn test_row_conversion() {
        let record = ProcessingRecord::try_from(row("in_progress")).unwrap();
        assert_eq!(record.status, ProcessingStatus::InProgress);
        assert_eq!(record.attempt_count, 2);
        assert_eq!(record.version, 5);
    }

    #[test]
    fn test_row_with_unknown_status_is_corrupt() {
        assert!(matches!(
            ProcessingRecord::try_from(row("paused")),
            Err(MarkerError::CorruptRecord(_))
        ));
    }
}

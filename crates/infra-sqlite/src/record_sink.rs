// SQLite RecordSink Implementation

use crate::map_sqlx_error;
use async_trait::async_trait;
use harvest_core::domain::{JobKind, Record};
use harvest_core::error::Result;
use harvest_core::port::{RecordSink, SinkError, TimeProvider};
use sqlx::SqlitePool;
use std::sync::Arc;
use tracing::debug;

/// Upserts extracted records keyed by (kind, record id)
pub struct SqliteRecordSink {
    pool: SqlitePool,
    time_provider: Arc<dyn TimeProvider>,
}

impl SqliteRecordSink {
    pub fn new(pool: SqlitePool, time_provider: Arc<dyn TimeProvider>) -> Self {
        Self {
            pool,
            time_provider,
        }
    }

    /// Number of stored records of one kind
    pub async fn count(&self, kind: &JobKind) -> Result<i64> {
        sqlx::query_scalar("SELECT COUNT(*) FROM extracted_records WHERE kind = ?")
            .bind(kind.as_str())
            .fetch_one(&self.pool)
            .await
            .map_err(map_sqlx_error)
    }

    /// Stored payload of one keyed record
    pub async fn find(&self, kind: &JobKind, key: &str) -> Result<Option<serde_json::Value>> {
        let payload: Option<String> = sqlx::query_scalar(
            "SELECT payload FROM extracted_records WHERE kind = ? AND record_key = ?",
        )
        .bind(kind.as_str())
        .bind(key)
        .fetch_optional(&self.pool)
        .await
        .map_err(map_sqlx_error)?;

        payload
            .map(|p| serde_json::from_str(&p))
            .transpose()
            .map_err(Into::into)
    }
}

#[async_trait]
impl RecordSink for SqliteRecordSink {
    async fn insert(&self, kind: &JobKind, record: &Record) -> std::result::Result<(), SinkError> {
        if !record.as_value().is_object() {
            return Err(SinkError::Rejected(
                "record is not a JSON object".to_string(),
            ));
        }

        let key = record.key();
        let payload = serde_json::to_string(record.as_value())
            .map_err(|e| SinkError::Rejected(e.to_string()))?;
        let now = self.time_provider.now_millis();

        sqlx::query(
            r#"
            INSERT INTO extracted_records (kind, record_key, payload, inserted_at, updated_at)
            VALUES (?, ?, ?, ?, ?)
            ON CONFLICT(kind, record_key) DO UPDATE SET
                payload = excluded.payload,
                updated_at = excluded.updated_at
            "#,
        )
        .bind(kind.as_str())
        .bind(key.as_deref())
        .bind(&payload)
        .bind(now)
        .bind(now)
        .execute(&self.pool)
        .await
        .map_err(|e| SinkError::Storage(map_sqlx_error(e).to_string()))?;

        debug!(kind = %kind, key = ?key, "Stored record");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{create_pool, run_migrations};
    use harvest_core::port::time_provider::SystemTimeProvider;
    use serde_json::json;
    use tokio_test::assert_ok;

    async fn setup_sink() -> SqliteRecordSink {
        let pool = create_pool("sqlite::memory:").await.unwrap();
        run_migrations(&pool).await.unwrap();
        SqliteRecordSink::new(pool, Arc::new(SystemTimeProvider))
    }

    fn telegram() -> JobKind {
        JobKind::new("telegram")
    }

    #[tokio::test]
    async fn test_insert_and_find() {
        let sink = setup_sink().await;
        let record = Record::new(json!({ "id": 42, "text": "hello" }));

        assert_ok!(sink.insert(&telegram(), &record).await);

        assert_eq!(sink.count(&telegram()).await.unwrap(), 1);
        let stored = sink.find(&telegram(), "42").await.unwrap().unwrap();
        assert_eq!(stored["text"], json!("hello"));
    }

    #[tokio::test]
    async fn test_same_key_is_upserted() {
        let sink = setup_sink().await;

        sink.insert(&telegram(), &Record::new(json!({ "id": "a", "v": 1 })))
            .await
            .unwrap();
        sink.insert(&telegram(), &Record::new(json!({ "id": "a", "v": 2 })))
            .await
            .unwrap();

        assert_eq!(sink.count(&telegram()).await.unwrap(), 1);
        let stored = sink.find(&telegram(), "a").await.unwrap().unwrap();
        assert_eq!(stored["v"], json!(2));
    }

    #[tokio::test]
    async fn test_kinds_do_not_collide() {
        let sink = setup_sink().await;
        let record = Record::new(json!({ "id": 1 }));

        sink.insert(&telegram(), &record).await.unwrap();
        sink.insert(&JobKind::new("instagram"), &record).await.unwrap();

        assert_eq!(sink.count(&telegram()).await.unwrap(), 1);
        assert_eq!(sink.count(&JobKind::new("instagram")).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_records_without_key_are_appended() {
        let sink = setup_sink().await;
        let record = Record::new(json!({ "text": "no id" }));

        sink.insert(&telegram(), &record).await.unwrap();
        sink.insert(&telegram(), &record).await.unwrap();

        assert_eq!(sink.count(&telegram()).await.unwrap(), 2);
    }

    #[tokio::test]
    async fn test_non_object_record_is_rejected() {
        let sink = setup_sink().await;

        let err = sink
            .insert(&telegram(), &Record::new(json!([1, 2, 3])))
            .await
            .unwrap_err();

        assert!(matches!(err, SinkError::Rejected(_)));
        assert_eq!(sink.count(&telegram()).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_find_missing_key() {
        let sink = setup_sink().await;
        assert!(sink.find(&telegram(), "nope").await.unwrap().is_none());
    }
}

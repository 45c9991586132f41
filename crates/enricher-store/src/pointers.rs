use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use rusqlite::OptionalExtension;
use serde_json::Value;
use tracing::debug;

use enricher_core::ports::PointerStore;
use enricher_core::{JobId, Pointer, PortError};

use crate::database::{expires_at, now_millis, Database};
use crate::error::StoreError;
use crate::row_helpers;

/// JSON hand-off records between stages, dropped after `ttl`.
pub struct SqlitePointerStore {
    db: Database,
    ttl: Duration,
}

impl SqlitePointerStore {
    pub fn new(db: Database, ttl: Duration) -> Self {
        Self { db, ttl }
    }

    /// Insert or replace the record behind `ptr`.
    pub fn put(&self, ptr: &Pointer, job_id: Option<&JobId>, value: &Value) -> Result<(), StoreError> {
        let payload = serde_json::to_string(value)?;
        self.db.with_conn(|conn| {
            conn.execute(
                "INSERT OR REPLACE INTO pointers (ptr, job_id, payload, created_at, expires_at)
                 VALUES (?1, ?2, ?3, ?4, ?5)",
                rusqlite::params![
                    ptr.as_str(),
                    job_id.map(|j| j.as_str().to_string()),
                    payload,
                    Utc::now().to_rfc3339(),
                    expires_at(self.ttl),
                ],
            )?;
            Ok(())
        })?;
        debug!(ptr = %ptr, "pointer written");
        Ok(())
    }

    /// Expired records read as missing.
    pub fn get(&self, ptr: &Pointer) -> Result<Value, StoreError> {
        let raw = self.db.with_conn(|conn| {
            let raw = conn
                .query_row(
                    "SELECT payload FROM pointers WHERE ptr = ?1 AND expires_at > ?2",
                    rusqlite::params![ptr.as_str(), now_millis()],
                    |row| Ok(row_helpers::get::<String>(row, 0, "pointers", "payload")),
                )
                .optional()?;
            Ok(raw)
        })?;
        match raw {
            Some(raw) => row_helpers::parse_json(&raw?, "pointers", "payload"),
            None => Err(StoreError::NotFound(ptr.to_string())),
        }
    }
}

#[async_trait]
impl PointerStore for SqlitePointerStore {
    async fn read_json(&self, ptr: &Pointer) -> Result<Value, PortError> {
        Ok(self.get(ptr)?)
    }

    async fn write_json(&self, job_id: &JobId, value: &Value) -> Result<Pointer, PortError> {
        let ptr = Pointer::for_result(job_id);
        self.put(&ptr, Some(job_id), value)?;
        Ok(ptr)
    }

    async fn write_context(&self, value: &Value) -> Result<Pointer, PortError> {
        let ptr = Pointer::for_context();
        self.put(&ptr, None, value)?;
        Ok(ptr)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn store(ttl: Duration) -> SqlitePointerStore {
        SqlitePointerStore::new(Database::in_memory().unwrap(), ttl)
    }

    #[tokio::test]
    async fn result_pointer_roundtrip() {
        let store = store(Duration::from_secs(60));
        let job = JobId::from_raw("job-1");
        let ptr = store.write_json(&job, &json!({"ok": true})).await.unwrap();
        assert_eq!(ptr.as_str(), "res:job-1");
        assert_eq!(store.read_json(&ptr).await.unwrap(), json!({"ok": true}));
    }

    #[tokio::test]
    async fn rewrite_replaces_payload() {
        let store = store(Duration::from_secs(60));
        let job = JobId::from_raw("job-1");
        store.write_json(&job, &json!(1)).await.unwrap();
        let ptr = store.write_json(&job, &json!(2)).await.unwrap();
        assert_eq!(store.read_json(&ptr).await.unwrap(), json!(2));
    }

    #[tokio::test]
    async fn context_pointers_are_distinct() {
        let store = store(Duration::from_secs(60));
        let a = store.write_context(&json!({"n": 1})).await.unwrap();
        let b = store.write_context(&json!({"n": 2})).await.unwrap();
        assert_ne!(a, b);
        assert_eq!(store.read_json(&b).await.unwrap()["n"], 2);
    }

    #[tokio::test]
    async fn expired_pointer_is_not_found() {
        let store = store(Duration::ZERO);
        let ptr = store.write_context(&json!({})).await.unwrap();
        assert!(matches!(store.read_json(&ptr).await, Err(PortError::NotFound(_))));
    }

    #[tokio::test]
    async fn unknown_pointer_is_not_found() {
        let store = store(Duration::from_secs(60));
        let err = store.read_json(&Pointer::from_raw("ctx:nope")).await.unwrap_err();
        assert!(matches!(err, PortError::NotFound(_)));
    }
}

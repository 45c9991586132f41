use std::time::Duration;

use async_trait::async_trait;
use rusqlite::OptionalExtension;
use serde_json::Value;

use enricher_core::ports::IdempotencyCache;
use enricher_core::PortError;

use crate::database::{expires_at, now_millis, Database};
use crate::error::StoreError;
use crate::row_helpers;

pub struct SqliteIdempotencyCache {
    db: Database,
}

impl SqliteIdempotencyCache {
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    /// Live entry for `key`; expired rows read as a miss.
    pub fn lookup(&self, key: &str) -> Result<Option<Value>, StoreError> {
        let raw = self.db.with_conn(|conn| {
            let raw = conn
                .query_row(
                    "SELECT value FROM idempotency WHERE key = ?1 AND expires_at > ?2",
                    rusqlite::params![key, now_millis()],
                    |row| Ok(row_helpers::get::<String>(row, 0, "idempotency", "value")),
                )
                .optional()?;
            Ok(raw)
        })?;
        raw.map(|raw| row_helpers::parse_json(&raw?, "idempotency", "value"))
            .transpose()
    }

    /// Upsert, restarting the TTL.
    pub fn store(&self, key: &str, value: &Value, ttl: Duration) -> Result<(), StoreError> {
        let raw = serde_json::to_string(value)?;
        self.db.with_conn(|conn| {
            conn.execute(
                "INSERT OR REPLACE INTO idempotency (key, value, expires_at) VALUES (?1, ?2, ?3)",
                rusqlite::params![key, raw, expires_at(ttl)],
            )?;
            Ok(())
        })
    }
}

#[async_trait]
impl IdempotencyCache for SqliteIdempotencyCache {
    async fn get(&self, key: &str) -> Result<Option<Value>, PortError> {
        Ok(self.lookup(key)?)
    }

    async fn set(&self, key: &str, value: &Value, ttl: Duration) -> Result<(), PortError> {
        Ok(self.store(key, value, ttl)?)
    }
}

use async_trait::async_trait;
use chrono::Utc;
use rusqlite::OptionalExtension;
use serde_json::{Map, Value};
use tracing::debug;

use enricher_core::ports::{ArtifactStore, ArtifactUpload, FetchedArtifact};
use enricher_core::{ArtifactPtr, PortError};

use crate::database::Database;
use crate::error::StoreError;
use crate::row_helpers;

/// Blobs in the `artifacts` table. Every upload gets a fresh id, even for identical content.
pub struct SqliteArtifactStore {
    db: Database,
}

impl SqliteArtifactStore {
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    pub fn put(&self, upload: &ArtifactUpload) -> Result<ArtifactPtr, StoreError> {
        if let Err(PortError::TooLarge { max, actual }) = upload.check_size() {
            return Err(StoreError::TooLarge { max, actual });
        }
        let ptr = ArtifactPtr::new();
        let metadata = serde_json::to_string(&upload.metadata)?;

        self.db.with_conn(|conn| {
            conn.execute(
                "INSERT INTO artifacts (id, content, content_type, retention, metadata, size_bytes, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
                rusqlite::params![
                    ptr.as_str(),
                    upload.content,
                    upload.content_type,
                    upload.retention.as_str(),
                    metadata,
                    upload.content.len() as i64,
                    Utc::now().to_rfc3339(),
                ],
            )?;
            Ok(())
        })?;

        debug!(artifact_ptr = %ptr, bytes = upload.content.len(), retention = upload.retention.as_str(), "artifact stored");
        Ok(ptr)
    }

    /// Stored metadata plus `content_type`, `retention` and `bytes`.
    pub fn get(&self, ptr: &ArtifactPtr) -> Result<FetchedArtifact, StoreError> {
        let row = self.db.with_conn(|conn| {
            let row = conn
                .query_row(
                    "SELECT content, content_type, retention, metadata, size_bytes FROM artifacts WHERE id = ?1",
                    [ptr.as_str()],
                    |row| {
                        Ok((
                            row_helpers::get::<Vec<u8>>(row, 0, "artifacts", "content"),
                            row_helpers::get::<String>(row, 1, "artifacts", "content_type"),
                            row_helpers::get::<String>(row, 2, "artifacts", "retention"),
                            row_helpers::get::<String>(row, 3, "artifacts", "metadata"),
                            row_helpers::get::<i64>(row, 4, "artifacts", "size_bytes"),
                        ))
                    },
                )
                .optional()?;
            Ok(row)
        })?;
        let Some((content, content_type, retention, metadata, size)) = row else {
            return Err(StoreError::NotFound(ptr.to_string()));
        };

        let mut meta: Map<String, Value> = row_helpers::parse_object(&metadata?, "artifacts", "metadata")?;
        meta.insert("content_type".into(), Value::String(content_type?));
        meta.insert("retention".into(), Value::String(retention?));
        meta.insert("bytes".into(), Value::from(size?));

        Ok(FetchedArtifact {
            content: content?,
            metadata: meta,
        })
    }
}

#[async_trait]
impl ArtifactStore for SqliteArtifactStore {
    async fn upload(&self, upload: ArtifactUpload) -> Result<ArtifactPtr, PortError> {
        Ok(self.put(&upload)?)
    }

    async fn fetch(&self, ptr: &ArtifactPtr) -> Result<FetchedArtifact, PortError> {
        Ok(self.get(ptr)?)
    }
}

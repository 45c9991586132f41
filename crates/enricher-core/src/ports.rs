use std::collections::BTreeMap;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::errors::PortError;
use crate::ids::{ArtifactPtr, JobId, Pointer};
use crate::types::SlackResult;

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RetentionClass {
    #[default]
    Standard,
    Audit,
}

impl RetentionClass {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Standard => "standard",
            Self::Audit => "audit",
        }
    }
}

impl std::str::FromStr for RetentionClass {
    type Err = String;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "standard" => Ok(Self::Standard),
            "audit" => Ok(Self::Audit),
            other => Err(format!("unknown retention class: {other}")),
        }
    }
}

/// Upload request. `max_bytes` of 0 means no ceiling.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ArtifactUpload {
    pub content: Vec<u8>,
    pub content_type: String,
    pub retention: RetentionClass,
    pub metadata: BTreeMap<String, String>,
    pub max_bytes: usize,
}

impl ArtifactUpload {
    pub fn text(content: impl Into<String>, content_type: &str) -> Self {
        Self {
            content: content.into().into_bytes(),
            content_type: content_type.to_string(),
            retention: RetentionClass::Standard,
            metadata: BTreeMap::new(),
            max_bytes: 0,
        }
    }

    pub fn json(value: &Value) -> Result<Self, PortError> {
        Ok(Self {
            content: serde_json::to_vec(value)?,
            content_type: "application/json".to_string(),
            retention: RetentionClass::Standard,
            metadata: BTreeMap::new(),
            max_bytes: 0,
        })
    }

    pub fn retention(mut self, retention: RetentionClass) -> Self {
        self.retention = retention;
        self
    }

    pub fn meta(mut self, key: &str, value: impl Into<String>) -> Self {
        self.metadata.insert(key.to_string(), value.into());
        self
    }

    pub fn max_bytes(mut self, max_bytes: usize) -> Self {
        self.max_bytes = max_bytes;
        self
    }

    /// Enforce the ceiling. Stores call this before persisting.
    pub fn check_size(&self) -> Result<(), PortError> {
        if self.max_bytes > 0 && self.content.len() > self.max_bytes {
            return Err(PortError::TooLarge {
                max: self.max_bytes,
                actual: self.content.len(),
            });
        }
        Ok(())
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct FetchedArtifact {
    pub content: Vec<u8>,
    /// Store-side metadata; includes `content_type` when known.
    pub metadata: Map<String, Value>,
}

impl FetchedArtifact {
    pub fn content_type(&self) -> Option<&str> {
        self.metadata.get("content_type").and_then(Value::as_str)
    }
}

#[async_trait]
pub trait ArtifactStore: Send + Sync {
    async fn upload(&self, upload: ArtifactUpload) -> Result<ArtifactPtr, PortError>;
    async fn fetch(&self, ptr: &ArtifactPtr) -> Result<FetchedArtifact, PortError>;
}

/// Context/result hand-off between stages. Entries expire after a bounded TTL.
#[async_trait]
pub trait PointerStore: Send + Sync {
    async fn read_json(&self, ptr: &Pointer) -> Result<Value, PortError>;
    async fn write_json(&self, job_id: &JobId, value: &Value) -> Result<Pointer, PortError>;
    /// Write a job context under a fresh pointer (used by local drivers).
    async fn write_context(&self, value: &Value) -> Result<Pointer, PortError>;
}

/// Short-lived key-value record guarding non-idempotent side effects.
#[async_trait]
pub trait IdempotencyCache: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<Value>, PortError>;
    async fn set(&self, key: &str, value: &Value, ttl: Duration) -> Result<(), PortError>;
}

#[async_trait]
pub trait WebhookSink: Send + Sync {
    async fn post(&self, url: &str, message: &str) -> Result<SlackResult, PortError>;
}

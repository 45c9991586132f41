//! In-memory collaborators for unit tests.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::{Map, Value};

use enricher_core::ports::{
    ArtifactStore, ArtifactUpload, FetchedArtifact, IdempotencyCache, PointerStore, WebhookSink,
};
use enricher_core::{ArtifactPtr, EvidenceBundle, EvidenceItem, JobId, Pointer, PortError, SlackResult};

pub fn bundle_with(evidence: Vec<EvidenceItem>) -> EvidenceBundle {
    EvidenceBundle {
        incident_id: "INC-1".into(),
        evidence,
        normalized_context: None,
        collected_at: "2026-01-01T00:00:00Z".into(),
    }
}

/// `fail_uploads` simulates a blob store outage on `upload`.
#[derive(Default)]
pub struct MemoryArtifactStore {
    items: Mutex<HashMap<String, (ArtifactUpload, ArtifactPtr)>>,
    pub fail_uploads: bool,
}

impl MemoryArtifactStore {
    pub fn failing() -> Self {
        Self {
            fail_uploads: true,
            ..Self::default()
        }
    }

    pub fn get(&self, ptr: &ArtifactPtr) -> Option<ArtifactUpload> {
        self.items.lock().get(ptr.as_str()).map(|(u, _)| u.clone())
    }

    pub fn len(&self) -> usize {
        self.items.lock().len()
    }
}

#[async_trait]
impl ArtifactStore for MemoryArtifactStore {
    async fn upload(&self, upload: ArtifactUpload) -> Result<ArtifactPtr, PortError> {
        upload.check_size()?;
        if self.fail_uploads {
            return Err(PortError::Unavailable("artifact store offline".into()));
        }
        let ptr = ArtifactPtr::new();
        self.items
            .lock()
            .insert(ptr.as_str().to_string(), (upload, ptr.clone()));
        Ok(ptr)
    }

    async fn fetch(&self, ptr: &ArtifactPtr) -> Result<FetchedArtifact, PortError> {
        let upload = self
            .get(ptr)
            .ok_or_else(|| PortError::NotFound(ptr.to_string()))?;
        let mut metadata: Map<String, Value> = upload
            .metadata
            .iter()
            .map(|(k, v)| (k.clone(), Value::String(v.clone())))
            .collect();
        metadata.insert("content_type".into(), Value::String(upload.content_type.clone()));
        Ok(FetchedArtifact {
            content: upload.content,
            metadata,
        })
    }
}

#[derive(Default)]
pub struct MemoryPointerStore {
    values: Mutex<HashMap<String, Value>>,
}

#[async_trait]
impl PointerStore for MemoryPointerStore {
    async fn read_json(&self, ptr: &Pointer) -> Result<Value, PortError> {
        self.values
            .lock()
            .get(ptr.as_str())
            .cloned()
            .ok_or_else(|| PortError::NotFound(ptr.to_string()))
    }

    async fn write_json(&self, job_id: &JobId, value: &Value) -> Result<Pointer, PortError> {
        let ptr = Pointer::for_result(job_id);
        self.values.lock().insert(ptr.as_str().to_string(), value.clone());
        Ok(ptr)
    }

    async fn write_context(&self, value: &Value) -> Result<Pointer, PortError> {
        let ptr = Pointer::for_context();
        self.values.lock().insert(ptr.as_str().to_string(), value.clone());
        Ok(ptr)
    }
}

/// Cache that ignores TTLs. `fail_writes` simulates a store outage on `set`.
#[derive(Default)]
pub struct MemoryCache {
    values: Mutex<HashMap<String, Value>>,
    pub fail_writes: bool,
}

impl MemoryCache {
    pub fn failing() -> Self {
        Self {
            fail_writes: true,
            ..Self::default()
        }
    }
}

#[async_trait]
impl IdempotencyCache for MemoryCache {
    async fn get(&self, key: &str) -> Result<Option<Value>, PortError> {
        Ok(self.values.lock().get(key).cloned())
    }

    async fn set(&self, key: &str, value: &Value, _ttl: Duration) -> Result<(), PortError> {
        if self.fail_writes {
            return Err(PortError::Unavailable("cache offline".into()));
        }
        self.values.lock().insert(key.to_string(), value.clone());
        Ok(())
    }
}

/// Records every post; answers with a fixed result.
#[derive(Default)]
pub struct RecordingSink {
    calls: AtomicUsize,
    pub messages: Mutex<Vec<(String, String)>>,
}

impl RecordingSink {
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl WebhookSink for RecordingSink {
    async fn post(&self, url: &str, message: &str) -> Result<SlackResult, PortError> {
        let n = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
        self.messages.lock().push((url.to_string(), message.to_string()));
        Ok(SlackResult {
            ok: true,
            channel: Some("#incidents".into()),
            ts: Some(format!("1700000000.00000{n}")),
            permalink: None,
        })
    }
}

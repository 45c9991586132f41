use std::sync::Arc;

use serde_json::Value;
use tracing::{debug, instrument, warn};

use enricher_core::json_path::{first_str, JsonPath};
use enricher_core::ports::ArtifactStore;
use enricher_core::{truncate_to_bytes, EvidenceBundle, EvidenceText, JobContext, JobError};

/// Item-count and byte ceilings for one aggregation. Zero selects the default.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct EvidenceBudget {
    pub max_items: usize,
    pub max_bytes: usize,
}

impl EvidenceBudget {
    pub const DEFAULT_MAX_ITEMS: usize = 4;
    pub const DEFAULT_MAX_BYTES: usize = 32_768;

    pub fn new(max_items: usize, max_bytes: usize) -> Self {
        Self {
            max_items: if max_items == 0 { Self::DEFAULT_MAX_ITEMS } else { max_items },
            max_bytes: if max_bytes == 0 { Self::DEFAULT_MAX_BYTES } else { max_bytes },
        }
    }
}

impl Default for EvidenceBudget {
    fn default() -> Self {
        Self::new(0, 0)
    }
}

/// Pulls bounded text for each evidence item out of the artifact store.
pub struct EvidenceAggregator {
    store: Arc<dyn ArtifactStore>,
    message_paths: Vec<JsonPath>,
    budget: EvidenceBudget,
}

impl EvidenceAggregator {
    pub fn new(store: Arc<dyn ArtifactStore>, message_paths: Vec<JsonPath>, budget: EvidenceBudget) -> Self {
        Self {
            store,
            message_paths,
            budget,
        }
    }

    /// Output keeps bundle order. A failed fetch skips that item; only
    /// cancellation or the job deadline abort the whole collection.
    #[instrument(skip_all, fields(incident_id = %bundle.incident_id, items = bundle.evidence.len()))]
    pub async fn collect(
        &self,
        ctx: &JobContext,
        bundle: &EvidenceBundle,
    ) -> Result<Vec<EvidenceText>, JobError> {
        let mut out = Vec::new();
        let mut total = 0usize;

        for item in &bundle.evidence {
            if out.len() >= self.budget.max_items || total >= self.budget.max_bytes {
                break;
            }
            let Some(ptr) = item.valid_ptr() else {
                continue;
            };

            let fetched = match ctx.guard(self.store.fetch(ptr)).await {
                Ok(fetched) => fetched,
                Err(e @ (JobError::Cancelled | JobError::Timeout(_))) => return Err(e),
                Err(e) => {
                    warn!(artifact_ptr = %ptr, kind = %item.kind, error = %e, "evidence fetch failed, skipping");
                    continue;
                }
            };

            let content_type = if item.content_type.trim().is_empty() {
                fetched.content_type().unwrap_or_default().to_string()
            } else {
                item.content_type.clone()
            };
            let raw = String::from_utf8_lossy(&fetched.content);
            let text = extract_text(&raw, &content_type, &self.message_paths);
            if text.is_empty() {
                continue;
            }
            let text = truncate_to_bytes(&text, self.budget.max_bytes - total);
            if text.is_empty() {
                continue;
            }

            total += text.len();
            debug!(artifact_ptr = %ptr, bytes = text.len(), total, "evidence collected");
            out.push(EvidenceText {
                kind: item.kind.clone(),
                title: item.title.clone(),
                artifact_ptr: ptr.clone(),
                content_type,
                content: text.to_string(),
            });
        }

        Ok(out)
    }
}

/// The meaningful text of an artifact: a known message field when the
/// content is a JSON document, otherwise the trimmed content itself.
pub fn extract_text(content: &str, content_type: &str, paths: &[JsonPath]) -> String {
    let trimmed = content.trim();
    let looks_json = content_type.to_ascii_lowercase().contains("json") || trimmed.starts_with('{');
    if looks_json {
        if let Ok(doc) = serde_json::from_str::<Value>(trimmed) {
            if let Some(message) = first_str(&doc, paths) {
                return message.trim().to_string();
            }
        }
    }
    trimmed.to_string()
}

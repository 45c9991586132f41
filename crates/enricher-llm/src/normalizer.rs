use tracing::{info, instrument};

use enricher_core::{redaction_active, EvidenceBundle, EvidenceText, Summary};

use crate::backend::{BackendSettings, ProviderKind, SummaryBackend};
use crate::error::LlmError;
use crate::mock::redacted_summary;

/// Bundle plus the bounded evidence text pulled for it.
#[derive(Clone, Debug, Default)]
pub struct SummaryInput {
    pub bundle: EvidenceBundle,
    pub evidence: Vec<EvidenceText>,
}

/// Turns evidence into a [`Summary`], applying the redaction gate before
/// any backend sees the data.
#[derive(Debug)]
pub struct SummaryNormalizer {
    backend: SummaryBackend,
}

impl SummaryNormalizer {
    pub fn new(backend: SummaryBackend) -> Self {
        Self { backend }
    }

    pub fn from_settings(settings: &BackendSettings) -> Result<Self, LlmError> {
        Ok(Self::new(SummaryBackend::from_settings(settings)?))
    }

    pub fn provider(&self) -> ProviderKind {
        self.backend.kind()
    }

    #[instrument(skip_all, fields(incident_id = %input.bundle.incident_id, provider = %self.provider()))]
    pub async fn summarize(
        &self,
        input: &SummaryInput,
        redaction_level: &str,
    ) -> Result<Summary, LlmError> {
        if redaction_active(redaction_level) {
            info!(redaction_level, "redaction active, skipping backend");
            return Ok(redacted_summary(&input.bundle.incident_id));
        }
        let mut summary = self.backend.summarize(&input.bundle, &input.evidence).await?;
        if summary.incident_id.is_empty() {
            summary.incident_id = input.bundle.incident_id.clone();
        }
        info!(model = %summary.model, confidence = summary.confidence(), "summary produced");
        Ok(summary)
    }
}

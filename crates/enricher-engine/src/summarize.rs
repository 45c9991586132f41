use serde::{Deserialize, Serialize};
use tracing::{info, instrument};

use enricher_core::ports::{ArtifactStore, ArtifactUpload, RetentionClass};
use enricher_core::{EvidenceBundle, JobContext, JobError, PolicyConstraints, Summary};
use enricher_llm::{SummaryInput, SummaryNormalizer};

use crate::evidence::EvidenceAggregator;

/// Context consumed by the summarize stage.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct SummarizeRequest {
    #[serde(default)]
    pub evidence: EvidenceBundle,
}

/// Aggregate evidence, summarize it, and persist the markdown as an audit artifact.
#[instrument(skip_all, fields(incident_id = %bundle.incident_id))]
pub async fn summarize_bundle(
    ctx: &JobContext,
    aggregator: &EvidenceAggregator,
    normalizer: &SummaryNormalizer,
    artifacts: &dyn ArtifactStore,
    bundle: &EvidenceBundle,
    policy: &PolicyConstraints,
) -> Result<Summary, JobError> {
    if bundle.incident_id.trim().is_empty() {
        return Err(JobError::validation("missing evidence in input"));
    }

    let evidence = aggregator.collect(ctx, bundle).await?;
    let input = SummaryInput {
        bundle: bundle.clone(),
        evidence,
    };
    let mut summary = ctx
        .guard(normalizer.summarize(&input, &policy.redaction_level))
        .await?;
    summary.incident_id = bundle.incident_id.clone();

    let upload = ArtifactUpload::text(summary.summary_md.clone(), "text/markdown")
        .retention(RetentionClass::Audit)
        .meta("kind", "summary")
        .meta("incident_id", summary.incident_id.clone())
        .max_bytes(policy.max_artifact_bytes);
    let ptr = ctx.guard(artifacts.upload(upload)).await?;

    info!(artifact_ptr = %ptr, model = %summary.model, evidence = input.evidence.len(), "summary stored");
    summary.artifact_ptr = Some(ptr);
    Ok(summary)
}

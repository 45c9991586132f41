use chrono::{SecondsFormat, Utc};
use serde_json::{json, Map, Value};
use tracing::{info, instrument};

use enricher_core::ports::{ArtifactStore, ArtifactUpload};
use enricher_core::{
    ArtifactPtr, EvidenceBundle, EvidenceItem, IncidentInput, JobContext, JobError, PolicyConstraints,
};

pub const KIND_INCIDENT_PAYLOAD: &str = "incident_payload";
pub const KIND_SOURCE_REFERENCE: &str = "source_reference";

/// Store the incident as evidence and describe it in a bundle.
///
/// Two items are produced: the incident itself as JSON (wrapped under
/// `incident` so `incident.raw.message` resolves) and a plain-text source
/// reference. Returns the bundle and every artifact written.
#[instrument(skip_all, fields(incident_id = %incident.incident_id))]
pub async fn collect_evidence(
    ctx: &JobContext,
    artifacts: &dyn ArtifactStore,
    incident: &IncidentInput,
    policy: &PolicyConstraints,
) -> Result<(EvidenceBundle, Vec<ArtifactPtr>), JobError> {
    incident.validate()?;
    let incident_id = incident.incident_id.trim();

    let payload = ArtifactUpload::json(&json!({ "incident": incident }))?
        .meta("kind", KIND_INCIDENT_PAYLOAD)
        .meta("incident_id", incident_id)
        .max_bytes(policy.max_artifact_bytes);
    let payload_bytes = payload.content.len();
    let payload_ptr = ctx.guard(artifacts.upload(payload)).await?;

    let reference_text = source_reference(incident);
    let reference = ArtifactUpload::text(reference_text, "text/plain")
        .meta("kind", KIND_SOURCE_REFERENCE)
        .meta("incident_id", incident_id)
        .max_bytes(policy.max_artifact_bytes);
    let reference_bytes = reference.content.len();
    let reference_ptr = ctx.guard(artifacts.upload(reference)).await?;

    let title = if incident.title.trim().is_empty() {
        format!("Incident {incident_id}")
    } else {
        incident.title.trim().to_string()
    };

    let bundle = EvidenceBundle {
        incident_id: incident_id.to_string(),
        evidence: vec![
            EvidenceItem {
                kind: KIND_INCIDENT_PAYLOAD.to_string(),
                title: title.clone(),
                artifact_ptr: Some(payload_ptr.clone()),
                content_type: "application/json".to_string(),
                bytes: payload_bytes,
            },
            EvidenceItem {
                kind: KIND_SOURCE_REFERENCE.to_string(),
                title: format!("Source reference for {title}"),
                artifact_ptr: Some(reference_ptr.clone()),
                content_type: "text/plain".to_string(),
                bytes: reference_bytes,
            },
        ],
        normalized_context: Some(normalized_context(incident)),
        collected_at: Utc::now().to_rfc3339_opts(SecondsFormat::Secs, true),
    };

    info!(items = bundle.evidence.len(), "evidence bundle assembled");
    Ok((bundle, vec![payload_ptr, reference_ptr]))
}

fn source_reference(incident: &IncidentInput) -> String {
    let or_unknown = |s: &str| {
        let s = s.trim();
        if s.is_empty() { "unknown".to_string() } else { s.to_string() }
    };
    format!(
        "incident_id: {}\ntitle: {}\nseverity: {}\nsource_system: {}\nsource_url: {}\n",
        incident.incident_id.trim(),
        or_unknown(&incident.title),
        or_unknown(&incident.severity),
        or_unknown(&incident.source.system),
        or_unknown(&incident.source.url),
    )
}

/// Non-blank descriptive fields, flattened.
fn normalized_context(incident: &IncidentInput) -> Map<String, Value> {
    [
        ("title", &incident.title),
        ("severity", &incident.severity),
        ("source_system", &incident.source.system),
        ("source_url", &incident.source.url),
    ]
    .into_iter()
    .filter(|(_, v)| !v.trim().is_empty())
    .map(|(k, v)| (k.to_string(), Value::String(v.trim().to_string())))
    .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::MemoryArtifactStore;
    use enricher_core::IncidentSource;

    fn incident() -> IncidentInput {
        IncidentInput {
            incident_id: "INC-1".into(),
            title: "Checkout latency".into(),
            severity: "sev2".into(),
            source: IncidentSource {
                system: "pagerduty".into(),
                url: "https://pd.example.com/incidents/1".into(),
            },
            raw: json!({"message": "p99 above 2s"}),
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn produces_two_items() {
        let store = MemoryArtifactStore::default();
        let (bundle, ptrs) = collect_evidence(
            &JobContext::default(),
            &store,
            &incident(),
            &PolicyConstraints::default(),
        )
        .await
        .unwrap();

        assert_eq!(bundle.incident_id, "INC-1");
        assert_eq!(bundle.evidence.len(), 2);
        assert_eq!(bundle.evidence[0].kind, "incident_payload");
        assert_eq!(bundle.evidence[1].kind, "source_reference");
        assert_eq!(ptrs.len(), 2);
        assert_eq!(store.len(), 2);

        let payload = store.get(&ptrs[0]).unwrap();
        let doc: Value = serde_json::from_slice(&payload.content).unwrap();
        assert_eq!(doc["incident"]["raw"]["message"], "p99 above 2s");
        assert_eq!(payload.metadata["kind"], "incident_payload");
        assert_eq!(bundle.evidence[0].bytes, payload.content.len());

        let ctx = bundle.normalized_context.unwrap();
        assert_eq!(ctx["severity"], "sev2");
        assert_eq!(ctx["source_system"], "pagerduty");
        assert!(bundle.collected_at.ends_with('Z'));
    }

    #[tokio::test]
    async fn sparse_incident_still_fetches() {
        let store = MemoryArtifactStore::default();
        let sparse = IncidentInput { incident_id: "INC-2".into(), ..Default::default() };
        let (bundle, _) = collect_evidence(&JobContext::default(), &store, &sparse, &PolicyConstraints::default())
            .await
            .unwrap();
        assert_eq!(bundle.evidence[0].title, "Incident INC-2");
        assert!(bundle.normalized_context.unwrap().is_empty());
    }

    #[tokio::test]
    async fn blank_incident_id_rejected() {
        let store = MemoryArtifactStore::default();
        let blank = IncidentInput { incident_id: "  ".into(), ..Default::default() };
        let err = collect_evidence(&JobContext::default(), &store, &blank, &PolicyConstraints::default())
            .await
            .unwrap_err();
        assert!(matches!(err, JobError::Validation(_)));
        assert_eq!(store.len(), 0);
    }

    #[tokio::test]
    async fn artifact_ceiling_is_policy_violation() {
        let store = MemoryArtifactStore::default();
        let policy = PolicyConstraints { max_artifact_bytes: 16, ..Default::default() };
        let err = collect_evidence(&JobContext::default(), &store, &incident(), &policy)
            .await
            .unwrap_err();
        assert!(matches!(err, JobError::PolicyViolation(_)));
    }
}

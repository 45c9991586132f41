use std::fmt::Write as _;

use enricher_core::{truncate_to_bytes, EvidenceBundle, EvidenceText};

pub const SYSTEM_PROMPT: &str = "\
You are an incident analysis assistant for on-call engineers.
Reply with a single JSON object and nothing else. No prose, no code fences.
Required keys: summary_md (string), highlights (array of strings), action_items (array of strings), confidence (number between 0 and 1).
Write summary_md as Markdown with these sections in order:
## Summary
## Interpretation
## Evidence
## Hypotheses
## Next steps
Only state what the evidence supports. Say so when evidence is missing.";

/// Render the user turn: incident metadata, then each evidence block.
/// The result never exceeds `max_bytes` (0 leaves it unbounded).
pub fn build_user_prompt(
    bundle: &EvidenceBundle,
    evidence: &[EvidenceText],
    max_bytes: usize,
) -> String {
    let mut out = String::new();
    out.push_str("Incident metadata:\n");
    let _ = writeln!(out, "- id: {}", bundle.incident_id);
    let _ = writeln!(out, "- collected_at: {}", bundle.collected_at);
    if let Some(context) = bundle.normalized_context.as_ref().filter(|c| !c.is_empty()) {
        if let Ok(encoded) = serde_json::to_string(context) {
            let _ = writeln!(out, "- context: {encoded}");
        }
    }

    if evidence.is_empty() {
        out.push_str("\nEvidence: none\n");
    } else {
        out.push_str("\nEvidence:\n");
        for (idx, item) in evidence.iter().enumerate() {
            let _ = writeln!(
                out,
                "[{}] kind={} title={} content_type={}",
                idx + 1,
                item.kind,
                item.title,
                item.content_type
            );
            out.push_str(&item.content);
            out.push_str("\n\n");
        }
    }

    let keep = truncate_to_bytes(&out, max_bytes).len();
    out.truncate(keep);
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use enricher_core::ArtifactPtr;
    use serde_json::json;

    fn bundle() -> EvidenceBundle {
        EvidenceBundle {
            incident_id: "INC-7".into(),
            evidence: vec![],
            normalized_context: json!({"severity": "sev2"}).as_object().cloned(),
            collected_at: "2026-03-01T10:00:00Z".into(),
        }
    }

    fn text(kind: &str, content: &str) -> EvidenceText {
        EvidenceText {
            kind: kind.into(),
            title: format!("{kind} title"),
            artifact_ptr: ArtifactPtr::from_raw("art_1"),
            content_type: "text/plain".into(),
            content: content.into(),
        }
    }

    #[test]
    fn metadata_and_empty_evidence() {
        let prompt = build_user_prompt(&bundle(), &[], 0);
        assert!(prompt.starts_with("Incident metadata:\n- id: INC-7\n"));
        assert!(prompt.contains("- collected_at: 2026-03-01T10:00:00Z\n"));
        assert!(prompt.contains(r#"- context: {"severity":"sev2"}"#));
        assert!(prompt.ends_with("\nEvidence: none\n"));
    }

    #[test]
    fn evidence_blocks_are_numbered() {
        let prompt = build_user_prompt(
            &bundle(),
            &[text("log", "disk full"), text("metric", "p99 9s")],
            0,
        );
        assert!(prompt.contains("[1] kind=log title=log title content_type=text/plain\ndisk full\n\n"));
        assert!(prompt.contains("[2] kind=metric"));
    }

    #[test]
    fn context_omitted_when_absent() {
        let mut b = bundle();
        b.normalized_context = None;
        assert!(!build_user_prompt(&b, &[], 0).contains("- context:"));
    }

    #[test]
    fn prompt_respects_byte_ceiling() {
        let prompt = build_user_prompt(&bundle(), &[text("log", &"é".repeat(500))], 101);
        assert!(prompt.len() <= 101);
        assert!(prompt.starts_with("Incident metadata:"));
    }
}

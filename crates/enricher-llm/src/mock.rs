use chrono::{DateTime, SecondsFormat, Utc};

use enricher_core::{EvidenceBundle, Summary};

pub const MOCK_MODEL: &str = "mock";
pub const REDACTED_MODEL: &str = "mock-redacted";
const MOCK_CONFIDENCE: f64 = 0.4;

/// Deterministic backend for tests and offline runs. Makes no network calls.
#[derive(Clone, Copy, Debug, Default)]
pub struct MockBackend;

impl MockBackend {
    pub fn summarize(&self, bundle: &EvidenceBundle) -> Summary {
        self.summarize_at(bundle, Utc::now())
    }

    pub fn summarize_at(&self, bundle: &EvidenceBundle, now: DateTime<Utc>) -> Summary {
        let count = bundle.evidence.len();
        let mut summary = Summary::new(&bundle.incident_id, MOCK_MODEL).with_confidence(MOCK_CONFIDENCE);
        summary.summary_md = format!(
            "Incident {} summary: collected {} evidence item(s) at {}.",
            bundle.incident_id,
            count,
            now.to_rfc3339_opts(SecondsFormat::Secs, true)
        );
        if count > 0 {
            summary.highlights.push(format!("{count} evidence item(s) collected"));
        }
        summary.action_items = vec![
            "review evidence bundle".to_string(),
            "confirm next steps".to_string(),
        ];
        summary
    }
}

/// Placeholder returned instead of any backend output while redaction is on.
pub fn redacted_summary(incident_id: &str) -> Summary {
    let mut summary = Summary::new(incident_id, REDACTED_MODEL).with_confidence(MOCK_CONFIDENCE);
    summary.summary_md = "Summary redacted by policy.".to_string();
    summary.highlights = vec!["redacted".to_string()];
    summary.action_items = vec!["request approval to view full details".to_string()];
    summary
}

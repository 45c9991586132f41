use std::fmt;

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};

use crate::errors::JobError;
use crate::ids::ArtifactPtr;

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct IncidentSource {
    #[serde(default)]
    pub system: String,
    #[serde(default)]
    pub url: String,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Destination {
    /// Raw mode as supplied; resolved with [`DestinationMode::resolve`].
    #[serde(default)]
    pub mode: String,
    #[serde(default)]
    pub slack_webhook_url: String,
}

/// Incident description handed to the fetch stage. Identity is `incident_id`.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct IncidentInput {
    #[serde(default)]
    pub incident_id: String,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub severity: String,
    #[serde(default)]
    pub source: IncidentSource,
    #[serde(default)]
    pub raw: Value,
    #[serde(default)]
    pub destination: Destination,
}

impl IncidentInput {
    /// Rejects a missing or blank `incident_id`.
    pub fn validate(&self) -> Result<(), JobError> {
        if self.incident_id.trim().is_empty() {
            return Err(JobError::validation("missing incident_id"));
        }
        Ok(())
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DestinationMode {
    #[default]
    Artifact,
    Slack,
}

impl DestinationMode {
    /// Case-insensitive; an unset mode means `artifact`.
    pub fn resolve(raw: &str) -> Result<Self, JobError> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "" | "artifact" => Ok(Self::Artifact),
            "slack" => Ok(Self::Slack),
            other => Err(JobError::validation(format!(
                "unsupported destination mode: {other}"
            ))),
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Artifact => "artifact",
            Self::Slack => "slack",
        }
    }
}

impl fmt::Display for DestinationMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One piece of collected evidence, stored out of line in the artifact store.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct EvidenceItem {
    #[serde(default)]
    pub kind: String,
    #[serde(default)]
    pub title: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub artifact_ptr: Option<ArtifactPtr>,
    #[serde(default)]
    pub content_type: String,
    #[serde(default)]
    pub bytes: usize,
}

impl EvidenceItem {
    /// The artifact reference, when present and non-blank.
    pub fn valid_ptr(&self) -> Option<&ArtifactPtr> {
        self.artifact_ptr.as_ref().filter(|p| !p.is_blank())
    }
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct EvidenceBundle {
    #[serde(default)]
    pub incident_id: String,
    #[serde(default)]
    pub evidence: Vec<EvidenceItem>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub normalized_context: Option<Map<String, Value>>,
    #[serde(default)]
    pub collected_at: String,
}

/// Bounded text pulled for one evidence item. Never persisted.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct EvidenceText {
    pub kind: String,
    pub title: String,
    pub artifact_ptr: ArtifactPtr,
    pub content_type: String,
    pub content: String,
}

/// Clamp into `[0, 1]`. NaN becomes 0.
pub fn clamp_confidence(value: f64) -> f64 {
    if value.is_nan() {
        return 0.0;
    }
    value.clamp(0.0, 1.0)
}

fn deserialize_confidence<'de, D: Deserializer<'de>>(d: D) -> Result<f64, D::Error> {
    Ok(clamp_confidence(f64::deserialize(d)?))
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Summary {
    #[serde(default)]
    pub incident_id: String,
    #[serde(default)]
    pub summary_md: String,
    #[serde(default)]
    pub highlights: Vec<String>,
    #[serde(default)]
    pub action_items: Vec<String>,
    #[serde(default, deserialize_with = "deserialize_confidence")]
    confidence: f64,
    #[serde(default)]
    pub model: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub artifact_ptr: Option<ArtifactPtr>,
}

impl Summary {
    pub fn new(incident_id: impl Into<String>, model: impl Into<String>) -> Self {
        Self {
            incident_id: incident_id.into(),
            model: model.into(),
            ..Self::default()
        }
    }

    pub fn confidence(&self) -> f64 {
        self.confidence
    }

    /// Out-of-range values are clipped, never rejected.
    pub fn set_confidence(&mut self, value: f64) {
        self.confidence = clamp_confidence(value);
    }

    pub fn with_confidence(mut self, value: f64) -> Self {
        self.set_confidence(value);
        self
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SlackResult {
    pub ok: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub channel: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ts: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub permalink: Option<String>,
}

/// Outcome of the post stage; the cached copy is the record of "already posted".
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PostResult {
    pub incident_id: String,
    pub mode: DestinationMode,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub slack: Option<SlackResult>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub artifact_ptr: Option<ArtifactPtr>,
    pub posted_at: String,
}

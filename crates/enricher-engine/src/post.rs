use std::sync::Arc;
use std::time::Duration;

use chrono::{SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::{info, instrument, warn};

use enricher_core::ports::{ArtifactStore, ArtifactUpload, IdempotencyCache, RetentionClass, WebhookSink};
use enricher_core::{
    DestinationMode, EvidenceBundle, IncidentInput, JobContext, JobError, PolicyConstraints, PortError,
    PostResult, Summary,
};

pub const POSTED_KEY_PREFIX: &str = "incident-enricher:posted:";

pub fn cache_key(incident_id: &str) -> String {
    format!("{POSTED_KEY_PREFIX}{}", incident_id.trim())
}

/// Context consumed by the post stage.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct PostInput {
    #[serde(default)]
    pub incident: IncidentInput,
    #[serde(default)]
    pub evidence: EvidenceBundle,
    #[serde(default)]
    pub summary: Summary,
}

impl PostInput {
    /// The incident id must be present, and any id carried by the evidence
    /// or summary must match it.
    pub fn validate(&self) -> Result<(), JobError> {
        self.incident.validate()?;
        let id = self.incident.incident_id.trim();
        for (what, other) in [
            ("evidence", self.evidence.incident_id.trim()),
            ("summary", self.summary.incident_id.trim()),
        ] {
            if !other.is_empty() && other != id {
                return Err(JobError::validation(format!(
                    "{what} incident_id {other} does not match {id}"
                )));
            }
        }
        Ok(())
    }
}

/// Performs the destination side effect at most once per incident while
/// its cache entry lives.
pub struct PostExecutor {
    artifacts: Arc<dyn ArtifactStore>,
    cache: Arc<dyn IdempotencyCache>,
    webhook: Arc<dyn WebhookSink>,
    default_webhook: Option<String>,
    ttl: Duration,
}

impl PostExecutor {
    pub fn new(
        artifacts: Arc<dyn ArtifactStore>,
        cache: Arc<dyn IdempotencyCache>,
        webhook: Arc<dyn WebhookSink>,
        ttl: Duration,
    ) -> Self {
        Self {
            artifacts,
            cache,
            webhook,
            default_webhook: None,
            ttl,
        }
    }

    pub fn with_default_webhook(mut self, url: Option<String>) -> Self {
        self.default_webhook = url.map(|u| u.trim().to_string()).filter(|u| !u.is_empty());
        self
    }

    #[instrument(skip_all, fields(incident_id = %input.incident.incident_id))]
    pub async fn execute(
        &self,
        ctx: &JobContext,
        input: &PostInput,
        policy: &PolicyConstraints,
    ) -> Result<PostResult, JobError> {
        input.validate()?;
        let incident_id = input.incident.incident_id.trim();
        let key = cache_key(incident_id);

        if let Some(cached) = ctx.guard(self.cache.get(&key)).await? {
            let result: PostResult = serde_json::from_value(cached).map_err(PortError::from)?;
            info!(mode = %result.mode, "already posted, returning cached result");
            return Ok(result);
        }

        let mode = DestinationMode::resolve(&input.incident.destination.mode)?;
        let mut result = PostResult {
            incident_id: incident_id.to_string(),
            mode,
            slack: None,
            artifact_ptr: None,
            posted_at: Utc::now().to_rfc3339_opts(SecondsFormat::Secs, true),
        };

        match mode {
            DestinationMode::Slack => {
                let url = self.webhook_url(&input.incident)?;
                if !policy.host_allowed(&url)? {
                    warn!("webhook host blocked by policy");
                    return Err(JobError::PolicyViolation(
                        "webhook host not allowed by policy".to_string(),
                    ));
                }
                let message = match input.summary.summary_md.trim() {
                    "" => format!("Incident {incident_id} summary ready"),
                    text => text.to_string(),
                };
                let audit = ArtifactUpload::text(message.clone(), "text/plain")
                    .retention(RetentionClass::Audit)
                    .meta("kind", "post_payload")
                    .meta("incident_id", incident_id)
                    .max_bytes(policy.max_artifact_bytes);
                audit.check_size()?;

                let slack = ctx.guard(self.webhook.post(&url, &message)).await?;
                info!(channel = slack.channel.as_deref().unwrap_or(""), "webhook posted");
                result.slack = Some(slack);

                // The post already happened: record it before surfacing an
                // upload failure so a retry cannot post twice.
                match ctx.guard(self.artifacts.upload(audit)).await {
                    Ok(ptr) => result.artifact_ptr = Some(ptr),
                    Err(err) => {
                        warn!(error = %err, "audit upload failed after post");
                        self.record(ctx, &key, &result).await?;
                        return Err(err);
                    }
                }
            }
            DestinationMode::Artifact => {
                let payload = json!({
                    "incident": input.incident,
                    "summary": input.summary,
                });
                let upload = ArtifactUpload::json(&payload)?
                    .retention(RetentionClass::Audit)
                    .meta("kind", "post_payload")
                    .meta("incident_id", incident_id)
                    .max_bytes(policy.max_artifact_bytes);
                result.artifact_ptr = Some(ctx.guard(self.artifacts.upload(upload)).await?);
            }
        }

        self.record(ctx, &key, &result).await?;
        info!(mode = %result.mode, "post recorded");
        Ok(result)
    }

    async fn record(&self, ctx: &JobContext, key: &str, result: &PostResult) -> Result<(), JobError> {
        let record = serde_json::to_value(result).map_err(PortError::from)?;
        ctx.guard(self.cache.set(key, &record, self.ttl)).await
    }

    /// Per-incident override first, then the process-wide default.
    fn webhook_url(&self, incident: &IncidentInput) -> Result<String, JobError> {
        let own = incident.destination.slack_webhook_url.trim();
        if !own.is_empty() {
            return Ok(own.to_string());
        }
        self.default_webhook
            .clone()
            .ok_or_else(|| JobError::validation("slack webhook url missing"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{MemoryArtifactStore, MemoryCache, RecordingSink};
    use enricher_core::Destination;

    const HOOK: &str = "https://hooks.slack.com/services/T/B/X";

    struct Fixture {
        artifacts: Arc<MemoryArtifactStore>,
        cache: Arc<MemoryCache>,
        sink: Arc<RecordingSink>,
    }

    impl Fixture {
        fn new() -> Self {
            Self::with_cache(MemoryCache::default())
        }

        fn with_cache(cache: MemoryCache) -> Self {
            Self {
                artifacts: Arc::new(MemoryArtifactStore::default()),
                cache: Arc::new(cache),
                sink: Arc::new(RecordingSink::default()),
            }
        }

        fn executor(&self) -> PostExecutor {
            PostExecutor::new(
                self.artifacts.clone(),
                self.cache.clone(),
                self.sink.clone(),
                Duration::from_secs(3600),
            )
        }
    }

    fn input(mode: &str, webhook: &str) -> PostInput {
        let mut summary = Summary::new("INC-1", "mock").with_confidence(0.4);
        summary.summary_md = "## Summary\nDB down".into();
        PostInput {
            incident: IncidentInput {
                incident_id: "INC-1".into(),
                destination: Destination {
                    mode: mode.into(),
                    slack_webhook_url: webhook.into(),
                },
                ..Default::default()
            },
            evidence: EvidenceBundle {
                incident_id: "INC-1".into(),
                ..Default::default()
            },
            summary,
        }
    }

    fn allow(hosts: &[&str]) -> PolicyConstraints {
        PolicyConstraints {
            allowed_hosts: Some(hosts.iter().map(|h| h.to_string()).collect()),
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn artifact_mode_uploads_payload_without_webhook() {
        let fx = Fixture::new();
        let result = fx
            .executor()
            .execute(&JobContext::default(), &input("", ""), &PolicyConstraints::default())
            .await
            .unwrap();

        assert_eq!(result.mode, DestinationMode::Artifact);
        assert_eq!(fx.sink.calls(), 0);
        let stored = fx.artifacts.get(result.artifact_ptr.as_ref().unwrap()).unwrap();
        assert_eq!(stored.retention, RetentionClass::Audit);
        assert_eq!(stored.metadata["kind"], "post_payload");
        let doc: serde_json::Value = serde_json::from_slice(&stored.content).unwrap();
        assert_eq!(doc["summary"]["summary_md"], "## Summary\nDB down");
        assert_eq!(doc["incident"]["incident_id"], "INC-1");
    }

    #[tokio::test]
    async fn slack_post_happens_once() {
        let fx = Fixture::new();
        let exec = fx.executor();
        let ctx = JobContext::default();
        let first = exec.execute(&ctx, &input("slack", HOOK), &PolicyConstraints::default()).await.unwrap();
        let second = exec.execute(&ctx, &input("slack", HOOK), &PolicyConstraints::default()).await.unwrap();

        assert_eq!(fx.sink.calls(), 1);
        assert_eq!(first, second);
        assert_eq!(first.slack.as_ref().unwrap().channel.as_deref(), Some("#incidents"));
        assert_eq!(fx.artifacts.len(), 1);
        let (url, message) = fx.sink.messages.lock()[0].clone();
        assert_eq!(url, HOOK);
        assert_eq!(message, "## Summary\nDB down");
    }

    #[tokio::test]
    async fn disallowed_host_never_reaches_sink() {
        let fx = Fixture::new();
        let err = fx
            .executor()
            .execute(&JobContext::default(), &input("slack", "https://evil.example.com/hook"), &allow(&["hooks.slack.com"]))
            .await
            .unwrap_err();

        assert!(matches!(err, JobError::PolicyViolation(_)));
        assert_eq!(fx.sink.calls(), 0);
        assert_eq!(fx.artifacts.len(), 0);
        assert_eq!(fx.cache.get(&cache_key("INC-1")).await.unwrap(), None);
    }

    #[tokio::test]
    async fn empty_allow_list_denies_everything() {
        let fx = Fixture::new();
        let err = fx
            .executor()
            .execute(&JobContext::default(), &input("slack", HOOK), &allow(&[]))
            .await
            .unwrap_err();
        assert!(matches!(err, JobError::PolicyViolation(_)));
        assert_eq!(fx.sink.calls(), 0);
    }

    #[tokio::test]
    async fn wildcard_host_allowed() {
        let fx = Fixture::new();
        fx.executor()
            .execute(&JobContext::default(), &input("slack", HOOK), &allow(&["*.slack.com"]))
            .await
            .unwrap();
        assert_eq!(fx.sink.calls(), 1);
    }

    #[tokio::test]
    async fn falls_back_to_default_webhook() {
        let fx = Fixture::new();
        let exec = fx.executor().with_default_webhook(Some(HOOK.to_string()));
        exec.execute(&JobContext::default(), &input("slack", ""), &PolicyConstraints::default())
            .await
            .unwrap();
        assert_eq!(fx.sink.messages.lock()[0].0, HOOK);
    }

    #[tokio::test]
    async fn missing_webhook_is_validation() {
        let fx = Fixture::new();
        let err = fx
            .executor()
            .execute(&JobContext::default(), &input("slack", ""), &PolicyConstraints::default())
            .await
            .unwrap_err();
        assert!(matches!(err, JobError::Validation(ref m) if m.contains("webhook")));
    }

    #[tokio::test]
    async fn unsupported_mode_is_validation() {
        let fx = Fixture::new();
        let err = fx
            .executor()
            .execute(&JobContext::default(), &input("email", ""), &PolicyConstraints::default())
            .await
            .unwrap_err();
        assert!(matches!(err, JobError::Validation(ref m) if m.contains("email")));
    }

    #[tokio::test]
    async fn blank_summary_gets_fallback_message() {
        let fx = Fixture::new();
        let mut post = input("slack", HOOK);
        post.summary.summary_md = "   ".into();
        fx.executor()
            .execute(&JobContext::default(), &post, &PolicyConstraints::default())
            .await
            .unwrap();
        assert_eq!(fx.sink.messages.lock()[0].1, "Incident INC-1 summary ready");
    }

    #[tokio::test]
    async fn cache_write_failure_fails_job() {
        let fx = Fixture::with_cache(MemoryCache::failing());
        let err = fx
            .executor()
            .execute(&JobContext::default(), &input("artifact", ""), &PolicyConstraints::default())
            .await
            .unwrap_err();
        assert!(err.is_retryable());
    }

    #[tokio::test]
    async fn oversized_slack_message_is_rejected_before_posting() {
        let fx = Fixture::new();
        let exec = fx.executor();
        let policy = PolicyConstraints {
            max_artifact_bytes: 16,
            ..Default::default()
        };
        for _ in 0..2 {
            let err = exec
                .execute(&JobContext::default(), &input("slack", HOOK), &policy)
                .await
                .unwrap_err();
            assert!(matches!(err, JobError::PolicyViolation(_)));
        }
        assert_eq!(fx.sink.calls(), 0);
        assert_eq!(fx.artifacts.len(), 0);
        assert_eq!(fx.cache.get(&cache_key("INC-1")).await.unwrap(), None);
    }

    #[tokio::test]
    async fn failed_audit_upload_does_not_repost_on_retry() {
        let fx = Fixture {
            artifacts: Arc::new(MemoryArtifactStore::failing()),
            cache: Arc::new(MemoryCache::default()),
            sink: Arc::new(RecordingSink::default()),
        };
        let exec = fx.executor();
        let ctx = JobContext::default();

        let err = exec
            .execute(&ctx, &input("slack", HOOK), &PolicyConstraints::default())
            .await
            .unwrap_err();
        assert!(err.is_retryable());

        let retried = exec
            .execute(&ctx, &input("slack", HOOK), &PolicyConstraints::default())
            .await
            .unwrap();
        assert_eq!(fx.sink.calls(), 1);
        assert_eq!(retried.slack.as_ref().unwrap().channel.as_deref(), Some("#incidents"));
        assert_eq!(retried.artifact_ptr, None);
    }

    #[tokio::test]
    async fn mismatched_summary_rejected() {
        let fx = Fixture::new();
        let mut post = input("artifact", "");
        post.summary.incident_id = "INC-2".into();
        let err = fx
            .executor()
            .execute(&JobContext::default(), &post, &PolicyConstraints::default())
            .await
            .unwrap_err();
        assert!(matches!(err, JobError::Validation(_)));
        assert_eq!(fx.artifacts.len(), 0);
    }

    #[tokio::test]
    async fn unparseable_webhook_url_is_validation() {
        let fx = Fixture::new();
        let err = fx
            .executor()
            .execute(&JobContext::default(), &input("slack", "not a url"), &PolicyConstraints::default())
            .await
            .unwrap_err();
        assert!(matches!(err, JobError::Validation(_)));
        assert_eq!(fx.sink.calls(), 0);
    }
}

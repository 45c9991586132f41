use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Instant;

use serde::de::DeserializeOwned;
use serde_json::Value;
use tokio::sync::Semaphore;
use tracing::{error, info, instrument, warn};

use enricher_core::ports::{ArtifactStore, IdempotencyCache, PointerStore, WebhookSink};
use enricher_core::{
    ArtifactPtr, IncidentInput, JobContext, JobError, JobRequest, JobResult, JobStatus, PolicyConstraints,
    PortError,
};
use enricher_llm::SummaryNormalizer;

use crate::evidence::EvidenceAggregator;
use crate::fetch::collect_evidence;
use crate::post::{PostExecutor, PostInput};
use crate::settings::WorkerSettings;
use crate::summarize::{summarize_bundle, SummarizeRequest};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Stage {
    Fetch,
    Summarize,
    Post,
}

impl Stage {
    pub const ALL: [Stage; 3] = [Stage::Fetch, Stage::Summarize, Stage::Post];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Fetch => "fetch",
            Self::Summarize => "summarize",
            Self::Post => "post",
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Stage {
    type Err = String;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "fetch" => Ok(Self::Fetch),
            "summarize" => Ok(Self::Summarize),
            "post" => Ok(Self::Post),
            other => Err(format!("unknown stage: {other}")),
        }
    }
}

/// External collaborators a worker talks to.
#[derive(Clone)]
pub struct Collaborators {
    pub artifacts: Arc<dyn ArtifactStore>,
    pub pointers: Arc<dyn PointerStore>,
    pub cache: Arc<dyn IdempotencyCache>,
    pub webhook: Arc<dyn WebhookSink>,
}

/// Runs stage jobs. Stateless between jobs; at most `max_parallel_jobs` at once.
pub struct Worker {
    settings: Arc<WorkerSettings>,
    ports: Collaborators,
    aggregator: EvidenceAggregator,
    normalizer: SummaryNormalizer,
    poster: PostExecutor,
    permits: Arc<Semaphore>,
}

impl Worker {
    /// Backend configuration errors surface here, before any job runs.
    pub fn new(settings: WorkerSettings, ports: Collaborators) -> Result<Self, JobError> {
        let normalizer = SummaryNormalizer::from_settings(&settings.backend_settings())?;
        let aggregator = EvidenceAggregator::new(
            ports.artifacts.clone(),
            settings.evidence_message_paths.clone(),
            settings.evidence_budget(),
        );
        let poster = PostExecutor::new(
            ports.artifacts.clone(),
            ports.cache.clone(),
            ports.webhook.clone(),
            settings.data_ttl(),
        )
        .with_default_webhook(settings.slack_webhook_url.clone());

        info!(
            worker_id = %settings.worker_id,
            pool = %settings.worker_pool,
            provider = %normalizer.provider(),
            max_parallel_jobs = settings.max_parallel_jobs,
            "worker ready"
        );

        Ok(Self {
            permits: Arc::new(Semaphore::new(settings.max_parallel_jobs.max(1))),
            settings: Arc::new(settings),
            ports,
            aggregator,
            normalizer,
            poster,
        })
    }

    pub fn settings(&self) -> &WorkerSettings {
        &self.settings
    }

    /// Resolve the job context, run `stage`, and write its output as the job result.
    #[instrument(skip_all, fields(stage = %stage, job_id = tracing::field::Empty))]
    pub async fn run(&self, stage: Stage, request: &JobRequest, ctx: JobContext) -> Result<JobResult, JobError> {
        let started = Instant::now();
        let job_id = request.job_id()?.clone();
        tracing::Span::current().record("job_id", job_id.as_str());

        let _permit = tokio::select! {
            biased;
            () = ctx.cancel.cancelled() => return Err(JobError::Cancelled),
            permit = self.permits.clone().acquire_owned() => {
                permit.map_err(|_| JobError::transient("worker is shutting down"))?
            }
        };
        let ctx = match self.settings.job_timeout() {
            Some(budget) => ctx.with_timeout(budget),
            None => ctx,
        };

        let outcome = self.dispatch(stage, request, &ctx).await;
        let (output, artifact_ptrs) = match outcome {
            Ok(out) => out,
            Err(e) => {
                if e.is_retryable() {
                    warn!(error_kind = e.error_kind(), error = %e, "job failed, retryable");
                } else {
                    error!(error_kind = e.error_kind(), error = %e, "job failed");
                }
                return Err(e);
            }
        };

        let result_ptr = ctx.guard(self.ports.pointers.write_json(&job_id, &output)).await?;
        let execution_ms = u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX);
        info!(result_ptr = %result_ptr, artifacts = artifact_ptrs.len(), execution_ms, "job succeeded");

        Ok(JobResult {
            job_id,
            status: JobStatus::Succeeded,
            result_ptr,
            worker_id: self.settings.worker_id.clone(),
            execution_ms,
            artifact_ptrs,
        })
    }

    async fn dispatch(
        &self,
        stage: Stage,
        request: &JobRequest,
        ctx: &JobContext,
    ) -> Result<(Value, Vec<ArtifactPtr>), JobError> {
        let policy = PolicyConstraints::from_env(&request.env)?;
        let context_ptr = request.context_ptr()?;
        let context = ctx.guard(self.ports.pointers.read_json(&context_ptr)).await?;

        match stage {
            Stage::Fetch => {
                let incident: IncidentInput = decode(context)?;
                let (bundle, ptrs) =
                    collect_evidence(ctx, self.ports.artifacts.as_ref(), &incident, &policy).await?;
                Ok((encode(&bundle)?, ptrs))
            }
            Stage::Summarize => {
                let input: SummarizeRequest = decode(context)?;
                let summary = summarize_bundle(
                    ctx,
                    &self.aggregator,
                    &self.normalizer,
                    self.ports.artifacts.as_ref(),
                    &input.evidence,
                    &policy,
                )
                .await?;
                let ptrs = summary.artifact_ptr.iter().cloned().collect();
                Ok((encode(&summary)?, ptrs))
            }
            Stage::Post => {
                let input: PostInput = decode(context)?;
                let result = self.poster.execute(ctx, &input, &policy).await?;
                let ptrs = result.artifact_ptr.iter().cloned().collect();
                Ok((encode(&result)?, ptrs))
            }
        }
    }
}

fn decode<T: DeserializeOwned>(context: Value) -> Result<T, JobError> {
    serde_json::from_value(context).map_err(|e| JobError::validation(format!("invalid job context: {e}")))
}

fn encode<T: serde::Serialize>(value: &T) -> Result<Value, JobError> {
    Ok(serde_json::to_value(value).map_err(PortError::from)?)
}

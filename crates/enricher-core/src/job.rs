use std::collections::HashMap;
use std::future::Future;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use crate::errors::JobError;
use crate::ids::{ArtifactPtr, JobId, Pointer};

/// Job as delivered by the dispatcher.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobRequest {
    pub job_id: Option<JobId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub context_ptr: Option<Pointer>,
    #[serde(default)]
    pub env: HashMap<String, String>,
}

impl JobRequest {
    pub fn new(job_id: JobId, context_ptr: Pointer) -> Self {
        Self {
            job_id: Some(job_id),
            context_ptr: Some(context_ptr),
            env: HashMap::new(),
        }
    }

    pub fn with_env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.insert(key.into(), value.into());
        self
    }

    pub fn job_id(&self) -> Result<&JobId, JobError> {
        self.job_id
            .as_ref()
            .filter(|id| !id.is_blank())
            .ok_or_else(|| JobError::validation("missing job_id"))
    }

    /// Explicit pointer first, then `env["context_ptr"]`.
    pub fn context_ptr(&self) -> Result<Pointer, JobError> {
        if let Some(ptr) = self.context_ptr.as_ref().filter(|p| !p.is_blank()) {
            return Ok(ptr.clone());
        }
        self.env
            .get("context_ptr")
            .map(|s| s.trim())
            .filter(|s| !s.is_empty())
            .map(Pointer::from_raw)
            .ok_or_else(|| JobError::validation("missing context pointer"))
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    Succeeded,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobResult {
    pub job_id: JobId,
    pub status: JobStatus,
    pub result_ptr: Pointer,
    pub worker_id: String,
    pub execution_ms: u64,
    #[serde(default)]
    pub artifact_ptrs: Vec<ArtifactPtr>,
}

/// Per-invocation cancellation and deadline scope.
#[derive(Clone, Debug)]
pub struct JobContext {
    pub cancel: CancellationToken,
    deadline: Option<(Instant, Duration)>,
}

impl JobContext {
    pub fn new(cancel: CancellationToken) -> Self {
        Self {
            cancel,
            deadline: None,
        }
    }

    /// Abort any guarded call still running `budget` from now.
    pub fn with_timeout(mut self, budget: Duration) -> Self {
        self.deadline = Some((Instant::now() + budget, budget));
        self
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// Await `fut` unless the job is cancelled or its deadline passes first.
    pub async fn guard<F, T, E>(&self, fut: F) -> Result<T, JobError>
    where
        F: Future<Output = Result<T, E>>,
        E: Into<JobError>,
    {
        if self.cancel.is_cancelled() {
            return Err(JobError::Cancelled);
        }
        let work = async { fut.await.map_err(Into::into) };
        match self.deadline {
            Some((deadline, budget)) => tokio::select! {
                biased;
                () = self.cancel.cancelled() => Err(JobError::Cancelled),
                res = tokio::time::timeout_at(deadline, work) => {
                    res.unwrap_or(Err(JobError::Timeout(budget)))
                }
            },
            None => tokio::select! {
                biased;
                () = self.cancel.cancelled() => Err(JobError::Cancelled),
                res = work => res,
            },
        }
    }
}

impl Default for JobContext {
    fn default() -> Self {
        Self::new(CancellationToken::new())
    }
}

use std::time::Duration;

/// Failure of a whole job invocation.
/// Classifies errors as fatal (surfaced, never retried) or transient (the
/// external scheduler may retry). The core itself never retries.
#[derive(Clone, Debug, thiserror::Error)]
pub enum JobError {
    // Fatal
    #[error("validation failed: {0}")]
    Validation(String),
    #[error("blocked by policy: {0}")]
    PolicyViolation(String),

    // Retryable
    #[error("transient failure: {0}")]
    Transient(String),
    #[error("cancelled")]
    Cancelled,
    #[error("deadline exceeded after {0:?}")]
    Timeout(Duration),
}

impl JobError {
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    pub fn transient(msg: impl Into<String>) -> Self {
        Self::Transient(msg.into())
    }

    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Transient(_) | Self::Cancelled | Self::Timeout(_))
    }

    pub fn is_fatal(&self) -> bool {
        !self.is_retryable()
    }

    /// Short classification string for logging.
    pub fn error_kind(&self) -> &'static str {
        match self {
            Self::Validation(_) => "validation",
            Self::PolicyViolation(_) => "policy_violation",
            Self::Transient(_) => "transient",
            Self::Cancelled => "cancelled",
            Self::Timeout(_) => "timeout",
        }
    }
}

/// Failure reported by an external collaborator (artifact store, pointer
/// store, idempotency cache, webhook sink).
#[derive(Clone, Debug, thiserror::Error)]
pub enum PortError {
    #[error("not found: {0}")]
    NotFound(String),
    #[error("payload too large: {actual} bytes > {max} bytes")]
    TooLarge { max: usize, actual: usize },
    #[error("unavailable: {0}")]
    Unavailable(String),
    #[error("corrupt value: {0}")]
    Corrupt(String),
}

impl From<PortError> for JobError {
    fn from(e: PortError) -> Self {
        match e {
            PortError::NotFound(what) => JobError::Validation(format!("not found: {what}")),
            err @ PortError::TooLarge { .. } => JobError::PolicyViolation(err.to_string()),
            err @ (PortError::Unavailable(_) | PortError::Corrupt(_)) => {
                JobError::Transient(err.to_string())
            }
        }
    }
}

impl From<serde_json::Error> for PortError {
    fn from(e: serde_json::Error) -> Self {
        PortError::Corrupt(e.to_string())
    }
}

use enricher_core::JobError;

/// Errors from summarization backends.
/// Configuration problems are fatal; everything on the wire is transient.
#[derive(Clone, Debug, thiserror::Error)]
pub enum LlmError {
    // Configuration
    #[error("unsupported llm provider: {0}")]
    UnknownProvider(String),
    #[error("missing setting: {0}")]
    MissingSetting(&'static str),

    // Wire
    #[error("network error: {0}")]
    Network(String),
    #[error("http {status}: {body}")]
    Http { status: u16, body: String },
    #[error("provider error: {0}")]
    Provider(String),
    #[error("decode response: {0}")]
    Decode(String),
    #[error("empty response from {0}")]
    EmptyResponse(&'static str),
}

impl LlmError {
    pub fn is_config(&self) -> bool {
        matches!(self, Self::UnknownProvider(_) | Self::MissingSetting(_))
    }

    /// Short classification string for logging.
    pub fn error_kind(&self) -> &'static str {
        match self {
            Self::UnknownProvider(_) => "unknown_provider",
            Self::MissingSetting(_) => "missing_setting",
            Self::Network(_) => "network",
            Self::Http { .. } => "http_status",
            Self::Provider(_) => "provider",
            Self::Decode(_) => "decode",
            Self::EmptyResponse(_) => "empty_response",
        }
    }
}

impl From<LlmError> for JobError {
    fn from(e: LlmError) -> Self {
        if e.is_config() {
            JobError::Validation(e.to_string())
        } else {
            JobError::Transient(e.to_string())
        }
    }
}

use std::path::PathBuf;
use std::time::Duration;

use figment::providers::{Env, Format, Json, Serialized};
use figment::Figment;
use serde::{Deserialize, Serialize};
use tracing::debug;

use enricher_core::json_path::JsonPath;
use enricher_llm::{BackendSettings, ProviderKind};

use crate::evidence::EvidenceBudget;

pub const ENV_PREFIX: &str = "ENRICHER_";
/// Env var naming an optional JSON settings file.
pub const CONFIG_FILE_ENV: &str = "ENRICHER_CONFIG";

#[derive(Debug, thiserror::Error)]
pub enum SettingsError {
    #[error("failed to load settings: {0}")]
    Load(String),
    #[error("invalid settings value: {0}")]
    InvalidValue(String),
}

impl From<figment::Error> for SettingsError {
    fn from(e: figment::Error) -> Self {
        SettingsError::Load(e.to_string())
    }
}

/// Process-wide worker configuration. Loaded once, then passed by reference.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WorkerSettings {
    /// Defaults to `<service>-<hostname>` when left blank.
    pub worker_id: String,
    pub worker_pool: String,
    pub max_parallel_jobs: usize,
    pub data_ttl_secs: u64,
    pub database_path: PathBuf,

    pub llm_provider: String,
    pub openai_api_key: Option<String>,
    pub openai_model: Option<String>,
    pub openai_base_url: String,
    pub ollama_url: String,
    pub ollama_model: Option<String>,
    pub ollama_temperature: f64,
    pub llm_max_input_bytes: usize,
    pub llm_max_evidence_bytes: usize,
    pub llm_max_evidence_items: usize,
    pub evidence_message_paths: Vec<JsonPath>,

    /// Process-wide default for slack destinations without their own URL.
    pub slack_webhook_url: Option<String>,

    pub http_timeout_secs: u64,
    pub job_timeout_secs: u64,
}

impl Default for WorkerSettings {
    fn default() -> Self {
        let backend = BackendSettings::default();
        Self {
            worker_id: String::new(),
            worker_pool: "incident-enricher".to_string(),
            max_parallel_jobs: 4,
            data_ttl_secs: 24 * 60 * 60,
            database_path: PathBuf::from("data/incident-enricher.db"),
            llm_provider: backend.provider,
            openai_api_key: None,
            openai_model: None,
            openai_base_url: backend.openai_base_url,
            ollama_url: backend.ollama_url,
            ollama_model: None,
            ollama_temperature: backend.ollama_temperature,
            llm_max_input_bytes: backend.max_input_bytes,
            llm_max_evidence_bytes: EvidenceBudget::DEFAULT_MAX_BYTES,
            llm_max_evidence_items: EvidenceBudget::DEFAULT_MAX_ITEMS,
            evidence_message_paths: vec![
                JsonPath::parse("raw.message"),
                JsonPath::parse("incident.raw.message"),
                JsonPath::parse("message"),
            ],
            slack_webhook_url: None,
            http_timeout_secs: backend.http_timeout.as_secs(),
            job_timeout_secs: 300,
        }
    }
}

impl WorkerSettings {
    /// Defaults, then the optional JSON file, then `ENRICHER_*` env vars.
    pub fn figment() -> Figment {
        Self::layered(std::env::var(CONFIG_FILE_ENV).ok().as_deref())
    }

    /// A named settings file must exist; extraction fails otherwise.
    fn layered(config_file: Option<&str>) -> Figment {
        let mut figment = Figment::from(Serialized::defaults(WorkerSettings::default()));
        if let Some(path) = config_file.map(str::trim).filter(|p| !p.is_empty()) {
            debug!(path = %path, "layering settings file");
            figment = figment.merge(Json::file_exact(path));
        }
        figment.merge(Env::prefixed(ENV_PREFIX).ignore(&["config"]))
    }

    pub fn from_figment(figment: Figment, service: &str) -> Result<Self, SettingsError> {
        let mut settings: WorkerSettings = figment.extract()?;
        if settings.worker_id.trim().is_empty() {
            settings.worker_id = default_worker_id(service);
        }
        settings.validate()?;
        Ok(settings)
    }

    pub fn validate(&self) -> Result<(), SettingsError> {
        if self.max_parallel_jobs == 0 {
            return Err(SettingsError::InvalidValue("max_parallel_jobs must be at least 1".into()));
        }
        if self.data_ttl_secs == 0 {
            return Err(SettingsError::InvalidValue("data_ttl_secs must be positive".into()));
        }
        if self.http_timeout_secs == 0 {
            return Err(SettingsError::InvalidValue("http_timeout_secs must be positive".into()));
        }
        if self.evidence_message_paths.iter().any(|p| p.segments().is_empty()) {
            return Err(SettingsError::InvalidValue("evidence_message_paths contains an empty path".into()));
        }
        self.llm_provider
            .parse::<ProviderKind>()
            .map_err(|e| SettingsError::InvalidValue(e.to_string()))?;
        Ok(())
    }

    pub fn data_ttl(&self) -> Duration {
        Duration::from_secs(self.data_ttl_secs)
    }

    /// `None` when 0, leaving jobs unbounded.
    pub fn job_timeout(&self) -> Option<Duration> {
        (self.job_timeout_secs > 0).then(|| Duration::from_secs(self.job_timeout_secs))
    }

    pub fn evidence_budget(&self) -> EvidenceBudget {
        EvidenceBudget::new(self.llm_max_evidence_items, self.llm_max_evidence_bytes)
    }

    pub fn backend_settings(&self) -> BackendSettings {
        BackendSettings {
            provider: self.llm_provider.clone(),
            openai_api_key: self.openai_api_key.clone(),
            openai_model: self.openai_model.clone(),
            openai_base_url: self.openai_base_url.clone(),
            ollama_url: self.ollama_url.clone(),
            ollama_model: self.ollama_model.clone(),
            ollama_temperature: self.ollama_temperature,
            max_input_bytes: self.llm_max_input_bytes,
            http_timeout: Duration::from_secs(self.http_timeout_secs),
        }
    }
}

fn default_worker_id(service: &str) -> String {
    let host = std::env::var("HOSTNAME")
        .ok()
        .map(|h| h.trim().to_string())
        .filter(|h| !h.is_empty())
        .unwrap_or_else(|| "local".to_string());
    format!("{service}-{host}")
}

/// Load settings for `service` from the process environment.
pub fn load_settings(service: &str) -> Result<WorkerSettings, SettingsError> {
    WorkerSettings::from_figment(WorkerSettings::figment(), service)
}

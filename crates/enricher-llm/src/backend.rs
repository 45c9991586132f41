use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use enricher_core::{EvidenceBundle, EvidenceText, Summary};

use crate::chat::{ChatBackend, ChatDialect};
use crate::error::LlmError;
use crate::mock::MockBackend;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ProviderKind {
    Mock,
    Ollama,
    OpenAi,
}

impl ProviderKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Mock => "mock",
            Self::Ollama => "ollama",
            Self::OpenAi => "openai",
        }
    }
}

impl fmt::Display for ProviderKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ProviderKind {
    type Err = LlmError;

    /// Case-insensitive. Blank names are rejected rather than defaulted.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "mock" => Ok(Self::Mock),
            "ollama" => Ok(Self::Ollama),
            "openai" => Ok(Self::OpenAi),
            _ => Err(LlmError::UnknownProvider(s.trim().to_string())),
        }
    }
}

/// Everything needed to build a backend.
#[derive(Clone, Debug, PartialEq)]
pub struct BackendSettings {
    pub provider: String,
    pub openai_api_key: Option<String>,
    pub openai_model: Option<String>,
    pub openai_base_url: String,
    pub ollama_url: String,
    pub ollama_model: Option<String>,
    pub ollama_temperature: f64,
    /// Ceiling on the rendered user prompt.
    pub max_input_bytes: usize,
    pub http_timeout: Duration,
}

impl Default for BackendSettings {
    fn default() -> Self {
        Self {
            provider: "mock".to_string(),
            openai_api_key: None,
            openai_model: None,
            openai_base_url: "https://api.openai.com".to_string(),
            ollama_url: "http://localhost:11434".to_string(),
            ollama_model: None,
            ollama_temperature: 0.2,
            max_input_bytes: 65_536,
            http_timeout: Duration::from_secs(120),
        }
    }
}

fn required(value: &Option<String>, name: &'static str) -> Result<String, LlmError> {
    value
        .as_deref()
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
        .ok_or(LlmError::MissingSetting(name))
}

/// Closed set of summarization backends, chosen once from settings.
#[derive(Debug)]
pub enum SummaryBackend {
    Mock(MockBackend),
    Chat(ChatBackend),
}

impl SummaryBackend {
    pub fn from_settings(settings: &BackendSettings) -> Result<Self, LlmError> {
        let kind: ProviderKind = settings.provider.parse()?;
        match kind {
            ProviderKind::Mock => Ok(Self::Mock(MockBackend)),
            ProviderKind::Ollama => {
                let model = required(&settings.ollama_model, "ollama_model")?;
                let backend = ChatBackend::new(
                    ChatDialect::Ollama,
                    &settings.ollama_url,
                    &model,
                    settings.http_timeout,
                )?
                .with_temperature(settings.ollama_temperature)
                .with_max_input_bytes(settings.max_input_bytes);
                Ok(Self::Chat(backend))
            }
            ProviderKind::OpenAi => {
                let key = required(&settings.openai_api_key, "openai_api_key")?;
                let model = required(&settings.openai_model, "openai_model")?;
                let backend = ChatBackend::new(
                    ChatDialect::OpenAi,
                    &settings.openai_base_url,
                    &model,
                    settings.http_timeout,
                )?
                .with_api_key(key)
                .with_max_input_bytes(settings.max_input_bytes);
                Ok(Self::Chat(backend))
            }
        }
    }

    pub fn kind(&self) -> ProviderKind {
        match self {
            Self::Mock(_) => ProviderKind::Mock,
            Self::Chat(chat) => match chat.dialect() {
                ChatDialect::Ollama => ProviderKind::Ollama,
                ChatDialect::OpenAi => ProviderKind::OpenAi,
            },
        }
    }

    pub async fn summarize(
        &self,
        bundle: &EvidenceBundle,
        evidence: &[EvidenceText],
    ) -> Result<Summary, LlmError> {
        match self {
            Self::Mock(mock) => Ok(mock.summarize(bundle)),
            Self::Chat(chat) => chat.summarize(bundle, evidence).await,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn provider_names_parse() {
        assert_eq!("MOCK".parse::<ProviderKind>().unwrap(), ProviderKind::Mock);
        assert_eq!(" ollama ".parse::<ProviderKind>().unwrap(), ProviderKind::Ollama);
        assert_eq!("openai".parse::<ProviderKind>().unwrap(), ProviderKind::OpenAi);
        assert!(matches!(
            "bard".parse::<ProviderKind>(),
            Err(LlmError::UnknownProvider(ref n)) if n == "bard"
        ));
        assert!("".parse::<ProviderKind>().is_err());
    }

    #[test]
    fn default_settings_build_mock() {
        let backend = SummaryBackend::from_settings(&BackendSettings::default()).unwrap();
        assert_eq!(backend.kind(), ProviderKind::Mock);
    }

    #[test]
    fn ollama_requires_model() {
        let settings = BackendSettings {
            provider: "ollama".into(),
            ollama_model: Some("  ".into()),
            ..Default::default()
        };
        assert!(matches!(
            SummaryBackend::from_settings(&settings),
            Err(LlmError::MissingSetting("ollama_model"))
        ));
    }

    #[test]
    fn openai_requires_key_then_model() {
        let mut settings = BackendSettings {
            provider: "openai".into(),
            ..Default::default()
        };
        assert!(matches!(
            SummaryBackend::from_settings(&settings),
            Err(LlmError::MissingSetting("openai_api_key"))
        ));
        settings.openai_api_key = Some("sk".into());
        assert!(matches!(
            SummaryBackend::from_settings(&settings),
            Err(LlmError::MissingSetting("openai_model"))
        ));
        settings.openai_model = Some("gpt-4o-mini".into());
        let backend = SummaryBackend::from_settings(&settings).unwrap();
        assert_eq!(backend.kind(), ProviderKind::OpenAi);
    }

    #[test]
    fn unknown_provider_rejected() {
        let settings = BackendSettings {
            provider: "claude-local".into(),
            ..Default::default()
        };
        let err = SummaryBackend::from_settings(&settings).unwrap_err();
        assert!(err.is_config());
    }
}

use std::time::Duration;

use reqwest::Client;
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, instrument};

use enricher_core::{EvidenceBundle, EvidenceText, Summary};

use crate::error::LlmError;
use crate::parse::parse_summary;
use crate::prompt::{build_user_prompt, SYSTEM_PROMPT};

const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// Wire format spoken by a chat backend.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ChatDialect {
    /// `POST {base}/api/chat`
    Ollama,
    /// `POST {base}/v1/chat/completions`
    OpenAi,
}

impl ChatDialect {
    pub fn name(self) -> &'static str {
        match self {
            Self::Ollama => "ollama",
            Self::OpenAi => "openai",
        }
    }

    fn path(self) -> &'static str {
        match self {
            Self::Ollama => "/api/chat",
            Self::OpenAi => "/v1/chat/completions",
        }
    }
}

#[derive(Serialize)]
struct Message<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Serialize)]
struct OllamaRequest<'a> {
    model: &'a str,
    messages: [Message<'a>; 2],
    stream: bool,
    format: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    options: Option<OllamaOptions>,
}

#[derive(Serialize)]
struct OllamaOptions {
    temperature: f64,
}

#[derive(Serialize)]
struct OpenAiRequest<'a> {
    model: &'a str,
    messages: [Message<'a>; 2],
    response_format: ResponseFormat<'a>,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f64>,
}

#[derive(Serialize)]
struct ResponseFormat<'a> {
    #[serde(rename = "type")]
    kind: &'a str,
}

#[derive(Deserialize)]
struct ReplyMessage {
    #[serde(default)]
    content: String,
}

#[derive(Deserialize)]
struct OllamaReply {
    #[serde(default)]
    message: Option<ReplyMessage>,
    #[serde(default)]
    error: Option<String>,
}

#[derive(Deserialize)]
struct OpenAiChoice {
    message: ReplyMessage,
}

#[derive(Deserialize)]
struct OpenAiReply {
    #[serde(default)]
    choices: Vec<OpenAiChoice>,
}

/// HTTP chat backend. One request per summary, no streaming.
pub struct ChatBackend {
    dialect: ChatDialect,
    client: Client,
    base_url: String,
    model: String,
    api_key: Option<SecretString>,
    temperature: f64,
    max_input_bytes: usize,
}

impl std::fmt::Debug for ChatBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChatBackend")
            .field("dialect", &self.dialect)
            .field("base_url", &self.base_url)
            .field("model", &self.model)
            .finish_non_exhaustive()
    }
}

impl ChatBackend {
    pub fn new(
        dialect: ChatDialect,
        base_url: &str,
        model: &str,
        timeout: Duration,
    ) -> Result<Self, LlmError> {
        let client = Client::builder()
            .connect_timeout(CONNECT_TIMEOUT)
            .timeout(timeout)
            .build()
            .map_err(|e| LlmError::Network(format!("build http client: {e}")))?;
        Ok(Self {
            dialect,
            client,
            base_url: base_url.trim().trim_end_matches('/').to_string(),
            model: model.trim().to_string(),
            api_key: None,
            temperature: 0.0,
            max_input_bytes: 0,
        })
    }

    pub fn with_api_key(mut self, key: impl Into<String>) -> Self {
        self.api_key = Some(SecretString::from(key.into()));
        self
    }

    /// Sent only when positive; otherwise the backend default applies.
    pub fn with_temperature(mut self, temperature: f64) -> Self {
        self.temperature = temperature;
        self
    }

    pub fn with_max_input_bytes(mut self, max_bytes: usize) -> Self {
        self.max_input_bytes = max_bytes;
        self
    }

    pub fn dialect(&self) -> ChatDialect {
        self.dialect
    }

    /// `"<provider>:<model>"`, recorded on every summary.
    pub fn model_tag(&self) -> String {
        format!("{}:{}", self.dialect.name(), self.model)
    }

    pub async fn summarize(
        &self,
        bundle: &EvidenceBundle,
        evidence: &[EvidenceText],
    ) -> Result<Summary, LlmError> {
        let prompt = build_user_prompt(bundle, evidence, self.max_input_bytes);
        let content = self.complete(SYSTEM_PROMPT, &prompt).await?;
        let payload = parse_summary(&content);

        let mut summary = Summary::new(&bundle.incident_id, self.model_tag())
            .with_confidence(payload.confidence);
        summary.summary_md = payload.summary_md;
        summary.highlights = payload.highlights;
        summary.action_items = payload.action_items;
        Ok(summary)
    }

    /// Send one system + user exchange and return the reply text.
    #[instrument(skip_all, fields(provider = self.dialect.name(), model = %self.model))]
    pub async fn complete(&self, system: &str, user: &str) -> Result<String, LlmError> {
        let url = format!("{}{}", self.base_url, self.dialect.path());
        let messages = [
            Message { role: "system", content: system },
            Message { role: "user", content: user },
        ];
        let temperature = (self.temperature > 0.0).then_some(self.temperature);

        let mut req = self.client.post(&url);
        req = match self.dialect {
            ChatDialect::Ollama => req.json(&OllamaRequest {
                model: &self.model,
                messages,
                stream: false,
                format: "json",
                options: temperature.map(|temperature| OllamaOptions { temperature }),
            }),
            ChatDialect::OpenAi => req.json(&OpenAiRequest {
                model: &self.model,
                messages,
                response_format: ResponseFormat { kind: "json_object" },
                temperature,
            }),
        };
        if let Some(key) = &self.api_key {
            req = req.bearer_auth(key.expose_secret());
        }

        let resp = req
            .send()
            .await
            .map_err(|e| LlmError::Network(e.to_string()))?;
        let status = resp.status();
        let body = resp
            .text()
            .await
            .map_err(|e| LlmError::Network(e.to_string()))?;
        debug!(status = status.as_u16(), bytes = body.len(), "chat response");

        if !status.is_success() {
            return Err(LlmError::Http {
                status: status.as_u16(),
                body: error_detail(&body).unwrap_or(body),
            });
        }

        let content = match self.dialect {
            ChatDialect::Ollama => {
                let reply: OllamaReply =
                    serde_json::from_str(&body).map_err(|e| LlmError::Decode(e.to_string()))?;
                if let Some(err) = reply.error.filter(|e| !e.trim().is_empty()) {
                    return Err(LlmError::Provider(err));
                }
                reply.message.map(|m| m.content).unwrap_or_default()
            }
            ChatDialect::OpenAi => {
                let reply: OpenAiReply =
                    serde_json::from_str(&body).map_err(|e| LlmError::Decode(e.to_string()))?;
                reply
                    .choices
                    .into_iter()
                    .next()
                    .map(|c| c.message.content)
                    .unwrap_or_default()
            }
        };

        if content.trim().is_empty() {
            return Err(LlmError::EmptyResponse(self.dialect.name()));
        }
        Ok(content)
    }
}

/// Pull a readable message out of an error body, if it has one.
fn error_detail(body: &str) -> Option<String> {
    let value: Value = serde_json::from_str(body).ok()?;
    match value.get("error")? {
        Value::String(s) => Some(s.clone()),
        Value::Object(obj) => obj.get("message").and_then(Value::as_str).map(str::to_string),
        _ => None,
    }
}

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde_json::{json, Value};
use tracing::{debug, instrument};

use enricher_core::ports::WebhookSink;
use enricher_core::{PortError, SlackResult};

/// Incoming-webhook client. One POST per message, no retries.
pub struct SlackWebhookSink {
    client: Client,
}

impl SlackWebhookSink {
    pub fn new(timeout: Duration) -> Result<Self, PortError> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| PortError::Unavailable(format!("build http client: {e}")))?;
        Ok(Self { client })
    }
}

#[async_trait]
impl WebhookSink for SlackWebhookSink {
    #[instrument(skip_all, fields(bytes = message.len()))]
    async fn post(&self, url: &str, message: &str) -> Result<SlackResult, PortError> {
        let resp = self
            .client
            .post(url)
            .json(&json!({ "text": message }))
            .send()
            .await
            .map_err(|e| PortError::Unavailable(format!("webhook request: {e}")))?;
        let status = resp.status();
        let body = resp
            .text()
            .await
            .map_err(|e| PortError::Unavailable(format!("webhook response: {e}")))?;
        debug!(status = status.as_u16(), "webhook response");

        if !status.is_success() {
            return Err(PortError::Unavailable(format!(
                "webhook returned {}: {}",
                status.as_u16(),
                body.trim()
            )));
        }
        parse_reply(&body)
    }
}

/// Plain `ok` bodies carry no metadata; JSON bodies may.
fn parse_reply(body: &str) -> Result<SlackResult, PortError> {
    let Ok(Value::Object(obj)) = serde_json::from_str::<Value>(body.trim()) else {
        return Ok(SlackResult {
            ok: true,
            ..SlackResult::default()
        });
    };
    let field = |key: &str| obj.get(key).and_then(Value::as_str).map(str::to_string);
    let ok = obj.get("ok").and_then(Value::as_bool).unwrap_or(true);
    if !ok {
        let reason = field("error").unwrap_or_else(|| "unknown error".to_string());
        return Err(PortError::Unavailable(format!("webhook rejected message: {reason}")));
    }
    Ok(SlackResult {
        ok,
        channel: field("channel"),
        ts: field("ts"),
        permalink: field("permalink"),
    })
}

//! Messages API client backing the orchestrator's model calls.

use analyst_core::{AnalystError, Message, ModelClient};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::config::ModelSection;

pub struct AnthropicClient {
    http: reqwest::Client,
    api_url: String,
    api_key: String,
    model: String,
    version: String,
}

#[derive(Serialize)]
struct MessagesRequest<'a> {
    model: &'a str,
    max_tokens: u32,
    messages: &'a [Message],
}

#[derive(Deserialize)]
struct MessagesResponse {
    #[serde(default)]
    content: Vec<ResponseBlock>,
}

#[derive(Deserialize)]
struct ResponseBlock {
    #[serde(default)]
    text: Option<String>,
}

#[derive(Deserialize)]
struct ErrorEnvelope {
    error: ErrorBody,
}

#[derive(Deserialize)]
struct ErrorBody {
    message: String,
}

impl AnthropicClient {
    pub fn new(section: &ModelSection, api_key: String) -> anyhow::Result<Self> {
        let http = reqwest::Client::builder()
            .connect_timeout(Duration::from_secs(30))
            .build()?;
        Ok(Self {
            http,
            api_url: section.api_url.clone(),
            api_key,
            model: section.model.clone(),
            version: section.anthropic_version.clone(),
        })
    }

    /// Build a client from config, reading the key from `section.api_key_env`.
    pub fn from_config(section: &ModelSection) -> anyhow::Result<Self> {
        let key = section.resolved_api_key().ok_or_else(|| {
            anyhow::anyhow!(
                "No API key found. Set the {} environment variable.",
                section.api_key_env
            )
        })?;
        Self::new(section, key)
    }
}

#[async_trait]
impl ModelClient for AnthropicClient {
    async fn complete(&self, messages: &[Message], max_tokens: u32) -> analyst_core::Result<String> {
        let body = MessagesRequest {
            model: &self.model,
            max_tokens,
            messages,
        };

        let response = self
            .http
            .post(&self.api_url)
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", &self.version)
            .json(&body)
            .send()
            .await
            .map_err(|e| AnalystError::upstream(format!("request failed: {}", e)))?;

        let status = response.status();
        let raw = response
            .text()
            .await
            .map_err(|e| AnalystError::upstream_status(status.as_u16(), e.to_string()))?;

        if !status.is_success() {
            return Err(AnalystError::upstream_status(
                status.as_u16(),
                error_message(status.as_u16(), &raw),
            ));
        }

        extract_text(&raw)
    }

    fn model_name(&self) -> &str {
        &self.model
    }
}

/// Message for a failed call, preferring the API's own error text.
fn error_message(status: u16, raw: &str) -> String {
    match serde_json::from_str::<ErrorEnvelope>(raw) {
        Ok(envelope) => format!("Claude API error: {} - {}", status, envelope.error.message),
        Err(_) => format!("Claude API error: {} - {}", status, raw.trim()),
    }
}

/// Text of the first content block.
fn extract_text(raw: &str) -> analyst_core::Result<String> {
    let parsed: MessagesResponse = serde_json::from_str(raw)
        .map_err(|e| AnalystError::Protocol(format!("unreadable response body: {}", e)))?;

    parsed
        .content
        .into_iter()
        .next()
        .and_then(|block| block.text)
        .ok_or_else(|| AnalystError::Protocol("response has no text content".into()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use analyst_core::ContentBlock;

    #[test]
    fn test_extract_text_from_first_block() {
        let raw = r#"{"id":"msg_1","content":[{"type":"text","text":"hello"},{"type":"text","text":"ignored"}]}"#;
        assert_eq!(extract_text(raw).unwrap(), "hello");
    }

    #[test]
    fn test_missing_text_is_protocol_error() {
        for raw in [r#"{"content":[]}"#, r#"{"content":[{"type":"tool_use"}]}"#, "{}", "not json"] {
            assert!(
                matches!(extract_text(raw), Err(AnalystError::Protocol(_))),
                "{}",
                raw
            );
        }
    }

    #[test]
    fn test_error_message_prefers_api_error_text() {
        let raw = r#"{"type":"error","error":{"type":"overloaded_error","message":"Overloaded"}}"#;
        assert_eq!(error_message(529, raw), "Claude API error: 529 - Overloaded");
        assert_eq!(error_message(502, "bad gateway\n"), "Claude API error: 502 - bad gateway");
    }

    #[test]
    fn test_request_body_shape() {
        let messages = vec![Message::user_blocks(vec![ContentBlock::text("hi")])];
        let body = MessagesRequest {
            model: "m",
            max_tokens: 4000,
            messages: &messages,
        };
        let value = serde_json::to_value(&body).unwrap();
        assert_eq!(value["model"], "m");
        assert_eq!(value["max_tokens"], 4000);
        assert_eq!(value["messages"][0]["content"][0]["type"], "text");
    }
}

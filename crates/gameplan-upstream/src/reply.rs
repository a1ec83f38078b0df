use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;
use tracing::warn;

use crate::UpstreamError;

/// The AI auto-responder, an opaque `text -> text` collaborator. Failure is
/// surfaced to the caller; nothing here retries.
#[async_trait]
pub trait ReplyGenerator: Send + Sync {
    async fn generate_reply(&self, prompt: &str) -> Result<String, UpstreamError>;
}

#[derive(Debug, Clone)]
pub struct ReplyConfig {
    /// Chat-completions endpoint of an OpenAI-compatible API.
    pub api_url: String,
    pub api_key: String,
    pub model: String,
    pub timeout: Duration,
}

pub struct HttpReplyGenerator {
    client: reqwest::Client,
    config: ReplyConfig,
}

impl HttpReplyGenerator {
    pub fn new(config: ReplyConfig) -> Result<Self, UpstreamError> {
        let client = reqwest::Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| UpstreamError::Reply(e.to_string()))?;
        Ok(Self { client, config })
    }
}

#[async_trait]
impl ReplyGenerator for HttpReplyGenerator {
    async fn generate_reply(&self, prompt: &str) -> Result<String, UpstreamError> {
        let body = serde_json::json!({
            "model": self.config.model,
            "messages": [
                { "role": "user", "content": prompt }
            ],
        });

        let response = self
            .client
            .post(&self.config.api_url)
            .bearer_auth(&self.config.api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| UpstreamError::Reply(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            warn!(%status, "reply provider rejected request");
            return Err(UpstreamError::Reply(format!("provider returned {status}")));
        }

        let completion: Completion = response
            .json()
            .await
            .map_err(|e| UpstreamError::Reply(e.to_string()))?;

        completion
            .choices
            .into_iter()
            .next()
            .map(|choice| choice.message.content)
            .filter(|content| !content.is_empty())
            .ok_or_else(|| UpstreamError::Reply("empty completion".to_string()))
    }
}

#[derive(Debug, Deserialize)]
struct Completion {
    choices: Vec<Choice>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: ChoiceMessage,
}

#[derive(Debug, Deserialize)]
struct ChoiceMessage {
    content: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn completion_shape_deserializes() {
        let raw = r#"{
            "id": "cmpl-1",
            "choices": [
                { "index": 0, "message": { "role": "assistant", "content": "On it." } }
            ],
            "usage": { "total_tokens": 12 }
        }"#;

        let completion: Completion = serde_json::from_str(raw).unwrap();
        assert_eq!(completion.choices[0].message.content, "On it.");
    }

    #[test]
    fn empty_choices_deserialize_to_no_reply() {
        let raw = r#"{ "choices": [] }"#;
        let completion: Completion = serde_json::from_str(raw).unwrap();
        assert!(completion.choices.is_empty());
    }
}

//! HTTP chat-completions backend for constrained generation.
//!
//! Implements the core [`ChatBackend`] over any OpenAI-compatible
//! `POST .../chat/completions` endpoint. Each call sends one user message
//! with `stream: false` and reads `choices[0].message.content`.
//!
//! There is no retry loop: a single failed request is reported to the
//! caller, which falls back to lexical ranking. Connect and overall request
//! time are both bounded by the `[llm]` timeouts.
//!
//! # Provider Selection
//!
//! ```rust
//! # use shelfmark::config::LlmConfig;
//! # use shelfmark::llm::create_backend;
//! # use shelfmark_core::generation::ChatBackend;
//! let backend = create_backend(&LlmConfig::default()).unwrap();
//! assert!(!backend.is_enabled());
//! ```

use anyhow::{anyhow, bail, Context, Result};
use async_trait::async_trait;
use serde::Deserialize;
use std::sync::Arc;
use std::time::Duration;

use shelfmark_core::generation::{ChatBackend, DisabledBackend};

use crate::config::LlmConfig;

pub struct ChatCompletionsBackend {
    client: reqwest::Client,
    endpoint: String,
    model: String,
    token: Option<String>,
}

impl ChatCompletionsBackend {
    pub fn new(config: &LlmConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .connect_timeout(Duration::from_secs(config.connect_timeout_secs))
            .timeout(Duration::from_secs(config.read_timeout_secs))
            .build()
            .context("failed to build HTTP client for llm")?;

        let token = config
            .token_env
            .as_deref()
            .and_then(|name| std::env::var(name).ok())
            .filter(|t| !t.trim().is_empty());

        Ok(Self {
            client,
            endpoint: config.endpoint.trim().to_string(),
            model: config.model.trim().to_string(),
            token,
        })
    }
}

#[derive(Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<Choice>,
}

#[derive(Deserialize)]
struct Choice {
    message: Message,
}

#[derive(Deserialize)]
struct Message {
    #[serde(default)]
    content: Option<String>,
}

#[async_trait]
impl ChatBackend for ChatCompletionsBackend {
    fn model_name(&self) -> &str {
        &self.model
    }

    async fn complete(&self, prompt: &str) -> Result<String> {
        let body = serde_json::json!({
            "model": self.model,
            "stream": false,
            "messages": [{ "role": "user", "content": prompt }],
        });

        let mut req = self.client.post(&self.endpoint).json(&body);
        if let Some(token) = &self.token {
            req = req.bearer_auth(token);
        }

        let response = req.send().await.context("llm request failed")?;
        let status = response.status();
        if !status.is_success() {
            let body_text = response.text().await.unwrap_or_default();
            bail!("llm endpoint error {}: {}", status, body_text);
        }

        let parsed: ChatResponse = response
            .json()
            .await
            .context("llm response is not a chat completion")?;
        parse_content(parsed)
    }
}

fn parse_content(resp: ChatResponse) -> Result<String> {
    resp.choices
        .into_iter()
        .next()
        .and_then(|c| c.message.content)
        .filter(|c| !c.trim().is_empty())
        .ok_or_else(|| anyhow!("llm response has no content"))
}

/// Pick the backend for the `[llm]` section.
pub fn create_backend(config: &LlmConfig) -> Result<Arc<dyn ChatBackend>> {
    if !config.enabled {
        return Ok(Arc::new(DisabledBackend));
    }
    Ok(Arc::new(ChatCompletionsBackend::new(config)?))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_content_takes_first_choice() {
        let resp: ChatResponse = serde_json::from_str(
            r#"{"choices":[{"message":{"role":"assistant","content":"{\"tags\":[]}"}}]}"#,
        )
        .unwrap();
        assert_eq!(parse_content(resp).unwrap(), r#"{"tags":[]}"#);
    }

    #[test]
    fn test_parse_content_rejects_empty() {
        let resp: ChatResponse = serde_json::from_str(r#"{"choices":[]}"#).unwrap();
        assert!(parse_content(resp).is_err());
        let resp: ChatResponse =
            serde_json::from_str(r#"{"choices":[{"message":{"content":"  "}}]}"#).unwrap();
        assert!(parse_content(resp).is_err());
    }

    #[test]
    fn test_enabled_backend_reports_model() {
        let cfg = LlmConfig {
            enabled: true,
            endpoint: "http://127.0.0.1:9/v1/chat/completions".into(),
            model: "deepseek-chat".into(),
            ..Default::default()
        };
        let backend = create_backend(&cfg).unwrap();
        assert!(backend.is_enabled());
        assert_eq!(backend.model_name(), "deepseek-chat");
    }
}

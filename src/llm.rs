//! # Language Model Client
//!
//! OpenAI-compatible chat-completions client for the VseGPT gateway, plus
//! the `LanguageModel` trait the search pipeline depends on. Every failure
//! mode (timeout, connection error, non-success status, malformed body)
//! degrades to `None` so the caller can fall back to deterministic
//! extraction; nothing here is allowed to surface as a crash.

use anyhow::{bail, Result};
use async_trait::async_trait;
use log::{debug, error, info};
use serde::Serialize;
use std::time::Duration;

/// Default request timeout for the chat-completions endpoint.
pub const LLM_TIMEOUT_SECS: u64 = 30;

const DEFAULT_BASE_URL: &str = "https://api.vsegpt.ru/v1";
const DEFAULT_MODEL: &str = "openai/gpt-4o-mini";

/// One role-tagged message in a chat request.
#[derive(Debug, Clone, Serialize)]
pub struct ChatMessage {
    pub role: String,
    pub content: String,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: "system".to_string(),
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: "user".to_string(),
            content: content.into(),
        }
    }
}

/// External language-model capability.
///
/// `ask` returns the raw completion text, or `None` on any transport or
/// protocol failure. Implementations must not panic or propagate errors.
#[async_trait]
pub trait LanguageModel: Send + Sync {
    async fn ask(
        &self,
        messages: &[ChatMessage],
        temperature: f32,
        max_tokens: u32,
    ) -> Option<String>;
}

/// HTTP client for the VseGPT chat-completions API.
pub struct VseGptClient {
    api_key: String,
    base_url: String,
    model: String,
    http: reqwest::Client,
}

#[derive(Serialize)]
struct CompletionRequest<'a> {
    model: &'a str,
    messages: &'a [ChatMessage],
    temperature: f32,
    max_tokens: u32,
}

impl VseGptClient {
    /// Create a client with the default gateway URL and model.
    pub fn new(api_key: &str) -> Result<Self> {
        Self::with_options(api_key, None, None)
    }

    pub fn with_options(
        api_key: &str,
        model: Option<&str>,
        base_url: Option<&str>,
    ) -> Result<Self> {
        if api_key.trim().is_empty() {
            bail!("VseGPT API key must not be empty");
        }

        let base_url = base_url.unwrap_or(DEFAULT_BASE_URL).trim_end_matches('/');
        if !base_url.ends_with("v1") {
            bail!("VseGPT base URL must end with 'v1', got: {}", base_url);
        }

        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(LLM_TIMEOUT_SECS))
            .build()?;

        let client = Self {
            api_key: api_key.to_string(),
            base_url: base_url.to_string(),
            model: model.unwrap_or(DEFAULT_MODEL).to_string(),
            http,
        };
        debug!(
            "VseGptClient initialized: url={}, model={}",
            client.base_url, client.model
        );
        Ok(client)
    }

    pub fn model(&self) -> &str {
        &self.model
    }
}

#[async_trait]
impl LanguageModel for VseGptClient {
    async fn ask(
        &self,
        messages: &[ChatMessage],
        temperature: f32,
        max_tokens: u32,
    ) -> Option<String> {
        let payload = CompletionRequest {
            model: &self.model,
            messages,
            temperature,
            max_tokens,
        };

        info!(
            "Sending {} messages to VseGPT (model: {})",
            messages.len(),
            self.model
        );

        let url = format!("{}/chat/completions", self.base_url);
        let response = match self
            .http
            .post(&url)
            .bearer_auth(&self.api_key)
            .json(&payload)
            .send()
            .await
        {
            Ok(resp) => resp,
            Err(e) if e.is_timeout() => {
                error!("VseGPT request timed out after {}s", LLM_TIMEOUT_SECS);
                return None;
            }
            Err(e) => {
                error!("VseGPT request failed: {}", e);
                return None;
            }
        };

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            let preview: String = body.chars().take(500).collect();
            error!("VseGPT returned {}: {}", status, preview);
            return None;
        }

        let data: serde_json::Value = match response.json().await {
            Ok(v) => v,
            Err(e) => {
                error!("Failed to decode VseGPT response body: {}", e);
                return None;
            }
        };

        if let Some(usage) = data.get("usage") {
            debug!(
                "Token usage: prompt={}, completion={}",
                usage.get("prompt_tokens").and_then(|v| v.as_u64()).unwrap_or(0),
                usage
                    .get("completion_tokens")
                    .and_then(|v| v.as_u64())
                    .unwrap_or(0)
            );
        }

        let answer = data
            .get("choices")
            .and_then(|c| c.get(0))
            .and_then(|c| c.get("message"))
            .and_then(|m| m.get("content"))
            .and_then(|c| c.as_str());

        match answer {
            Some(text) => {
                info!("VseGPT answered with {} characters", text.len());
                Some(text.to_string())
            }
            None => {
                error!("VseGPT response contains no choices/message/content");
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_client_rejects_empty_key() {
        assert!(VseGptClient::new("").is_err());
        assert!(VseGptClient::new("   ").is_err());
        assert!(VseGptClient::new("key").is_ok());
    }

    #[test]
    fn test_client_validates_base_url() {
        assert!(VseGptClient::with_options("key", None, Some("https://api.example.com")).is_err());
        let client =
            VseGptClient::with_options("key", Some("openai/gpt-4o"), Some("https://api.example.com/v1/"))
                .unwrap();
        assert_eq!(client.model(), "openai/gpt-4o");
        assert_eq!(client.base_url, "https://api.example.com/v1");
    }

    #[test]
    fn test_chat_message_roles() {
        assert_eq!(ChatMessage::system("a").role, "system");
        assert_eq!(ChatMessage::user("b").role, "user");
    }
}

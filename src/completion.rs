//! Completion provider abstraction and implementations.
//!
//! - **[`DisabledCompletion`]**: always errors; used when no provider is configured.
//! - **[`ChatCompletionClient`]**: calls an OpenAI-compatible
//!   `POST {base_url}/chat/completions` endpoint (OpenRouter by default).
//!
//! Use [`create_completion_service`] to pick one from configuration:
//!
//! ```rust
//! # use querybox::config::CompletionConfig;
//! # use querybox::completion::create_completion_service;
//! let mut config = CompletionConfig::default();
//! config.provider = "disabled".to_string();
//! let service = create_completion_service(&config).unwrap();
//! assert_eq!(service.model_name(), "disabled");
//! ```
//!
//! # Request Policy
//!
//! Exactly one attempt per call. Any non-success status is an error, as is a
//! body that is not JSON. A JSON body without `choices[0].message.content`
//! is an answer with no content (`Ok(None)`).

use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

use crate::config::CompletionConfig;
use crate::traits::CompletionService;

// ============ Disabled Provider ============

/// A provider that refuses every request.
///
/// Used when `completion.provider = "disabled"`; every turn then settles
/// with the apology message.
pub struct DisabledCompletion;

#[async_trait]
impl CompletionService for DisabledCompletion {
    fn model_name(&self) -> &str {
        "disabled"
    }

    async fn complete(&self, _prompt: &str) -> Result<Option<String>> {
        bail!("Completion provider is disabled")
    }
}

// ============ OpenAI-compatible Provider ============

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: [ChatMessage<'a>; 1],
}

#[derive(Debug, Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: &'a str,
}

/// Chat-completion client for OpenAI-compatible endpoints.
///
/// Sends the question as a single `user` message. No system prompt and no
/// earlier turns are included, so every call is independent of the transcript.
pub struct ChatCompletionClient {
    endpoint: String,
    model: String,
    api_key: String,
    client: reqwest::Client,
}

impl ChatCompletionClient {
    /// Build a client from configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if no API key can be resolved or the HTTP client
    /// cannot be constructed.
    pub fn new(config: &CompletionConfig) -> Result<Self> {
        let api_key = config.resolve_api_key().ok_or_else(|| {
            anyhow::anyhow!(
                "no completion API key: set completion.api_key or the {} environment variable",
                config.api_key_env
            )
        })?;

        let mut builder = reqwest::Client::builder();
        if config.timeout_secs > 0 {
            builder = builder.timeout(Duration::from_secs(config.timeout_secs));
        }
        let client = builder.build()?;

        Ok(Self {
            endpoint: format!("{}/chat/completions", config.base_url.trim_end_matches('/')),
            model: config.model.clone(),
            api_key,
            client,
        })
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }
}

#[async_trait]
impl CompletionService for ChatCompletionClient {
    fn model_name(&self) -> &str {
        &self.model
    }

    async fn complete(&self, prompt: &str) -> Result<Option<String>> {
        let body = ChatRequest {
            model: &self.model,
            messages: [ChatMessage {
                role: "user",
                content: prompt,
            }],
        };

        debug!(endpoint = %self.endpoint, model = %self.model, "sending completion request");

        let response = self
            .client
            .post(&self.endpoint)
            .header("Authorization", format!("Bearer {}", self.api_key))
            .header("Content-Type", "application/json")
            .json(&body)
            .send()
            .await
            .context("completion request failed")?;

        let status = response.status();
        if !status.is_success() {
            let body_text = response.text().await.unwrap_or_default();
            bail!("completion API error {}: {}", status, body_text);
        }

        let json: serde_json::Value = response
            .json()
            .await
            .context("completion response was not valid JSON")?;
        Ok(parse_completion_response(&json))
    }
}

/// Extract `choices[0].message.content` from a chat-completion body.
///
/// Missing fields, non-string content and empty strings all yield `None`.
pub fn parse_completion_response(json: &serde_json::Value) -> Option<String> {
    json.get("choices")
        .and_then(|c| c.as_array())
        .and_then(|choices| choices.first())
        .and_then(|choice| choice.get("message"))
        .and_then(|message| message.get("content"))
        .and_then(|content| content.as_str())
        .filter(|text| !text.is_empty())
        .map(str::to_string)
}

/// Create the [`CompletionService`] named by `completion.provider`.
///
/// | Config Value | Provider |
/// |-------------|----------|
/// | `"disabled"` | [`DisabledCompletion`] |
/// | `"openai"` | [`ChatCompletionClient`] |
pub fn create_completion_service(config: &CompletionConfig) -> Result<Arc<dyn CompletionService>> {
    match config.provider.as_str() {
        "disabled" => Ok(Arc::new(DisabledCompletion)),
        "openai" => Ok(Arc::new(ChatCompletionClient::new(config)?)),
        other => bail!("Unknown completion provider: {}", other),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn parses_first_choice_content() {
        let body = json!({
            "id": "gen-1",
            "choices": [
                { "message": { "role": "assistant", "content": "42" } },
                { "message": { "role": "assistant", "content": "43" } }
            ]
        });
        assert_eq!(parse_completion_response(&body).as_deref(), Some("42"));
    }

    #[test]
    fn missing_choices_is_no_content() {
        assert_eq!(parse_completion_response(&json!({})), None);
        assert_eq!(parse_completion_response(&json!({ "choices": [] })), None);
        assert_eq!(
            parse_completion_response(&json!({ "choices": [{ "message": {} }] })),
            None
        );
    }

    #[test]
    fn empty_or_non_string_content_is_no_content() {
        let empty = json!({ "choices": [{ "message": { "content": "" } }] });
        assert_eq!(parse_completion_response(&empty), None);
        let null = json!({ "choices": [{ "message": { "content": null } }] });
        assert_eq!(parse_completion_response(&null), None);
    }

    #[test]
    fn request_body_is_a_single_user_message() {
        let body = ChatRequest {
            model: "openai/gpt-3.5-turbo",
            messages: [ChatMessage {
                role: "user",
                content: "life?",
            }],
        };
        let value = serde_json::to_value(&body).unwrap();
        assert_eq!(
            value,
            json!({
                "model": "openai/gpt-3.5-turbo",
                "messages": [{ "role": "user", "content": "life?" }]
            })
        );
    }

    #[test]
    fn endpoint_joins_base_url() {
        let config = CompletionConfig {
            base_url: "http://127.0.0.1:9/v1/".to_string(),
            api_key: Some("sk-test".to_string()),
            ..CompletionConfig::default()
        };
        let client = ChatCompletionClient::new(&config).unwrap();
        assert_eq!(client.endpoint(), "http://127.0.0.1:9/v1/chat/completions");
    }

    #[test]
    fn missing_key_is_an_error() {
        let config = CompletionConfig {
            api_key: None,
            api_key_env: "QBX_TEST_UNSET_VARIABLE".to_string(),
            ..CompletionConfig::default()
        };
        assert!(ChatCompletionClient::new(&config).is_err());
    }

    #[tokio::test]
    async fn disabled_provider_errors() {
        assert!(DisabledCompletion.complete("hi").await.is_err());
    }
}

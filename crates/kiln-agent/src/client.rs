//! Text-generation client
//!
//! One request per call, no retries: a failed generation fails the job and
//! is only retried by the caller submitting a new round.

use async_trait::async_trait;
use kiln_core::{KilnError, LlmConfig, Result};
use std::time::Duration;

use crate::types::{ChatMessage, ChatRequest, ChatResponse};

/// Seam between the content generator and the text-generation service
#[async_trait]
pub trait TextGenerator: Send + Sync {
    /// Send one prompt and return the raw completion text
    async fn complete(&self, prompt: &str) -> Result<String>;
}

#[async_trait]
impl<T: TextGenerator + ?Sized> TextGenerator for std::sync::Arc<T> {
    async fn complete(&self, prompt: &str) -> Result<String> {
        (**self).complete(prompt).await
    }
}

/// OpenAI-compatible chat completion client
#[derive(Debug, Clone)]
pub struct ChatClient {
    http: reqwest::Client,
    endpoint: String,
    api_token: String,
    model: String,
    temperature: f32,
    timeout_secs: u64,
}

impl ChatClient {
    /// Create a client from configuration
    ///
    /// Fails with `Configuration` when no API token is set.
    pub fn new(config: &LlmConfig) -> Result<Self> {
        let api_token = config.api_token.clone().ok_or_else(|| {
            KilnError::Configuration("llm.api_token is not set".to_string())
        })?;

        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| KilnError::Configuration(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self {
            http,
            endpoint: format!("{}/chat/completions", config.base_url.trim_end_matches('/')),
            api_token,
            model: config.model.clone(),
            temperature: config.temperature,
            timeout_secs: config.timeout_secs,
        })
    }

    pub fn model(&self) -> &str {
        &self.model
    }
}

#[async_trait]
impl TextGenerator for ChatClient {
    async fn complete(&self, prompt: &str) -> Result<String> {
        tracing::info!(
            "Requesting completion from {} ({} prompt chars)",
            self.model,
            prompt.len()
        );

        let request = ChatRequest {
            model: self.model.clone(),
            messages: vec![ChatMessage {
                role: "user".to_string(),
                content: prompt.to_string(),
            }],
            temperature: self.temperature,
        };

        let response = self
            .http
            .post(&self.endpoint)
            .bearer_auth(&self.api_token)
            .json(&request)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    KilnError::Generation(format!(
                        "LLM request timed out after {}s",
                        self.timeout_secs
                    ))
                } else {
                    KilnError::Generation(format!("Failed to send request: {}", e))
                }
            })?;

        let status = response.status();
        if !status.is_success() {
            let error_text = response
                .text()
                .await
                .unwrap_or_else(|_| "Unknown".to_string());
            return Err(KilnError::Generation(format!(
                "LLM API error {}: {}",
                status, error_text
            )));
        }

        let chat_response: ChatResponse = response
            .json()
            .await
            .map_err(|e| KilnError::Generation(format!("Failed to parse response: {}", e)))?;

        let output = chat_response
            .choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message.content)
            .ok_or_else(|| KilnError::Generation("No content in response".to_string()))?;

        if let Some(ref usage) = chat_response.usage {
            tracing::info!(
                "Completion received ({} chars, {} prompt tokens, {} completion tokens)",
                output.len(),
                usage.prompt_tokens,
                usage.completion_tokens
            );
        } else {
            tracing::info!("Completion received ({} chars)", output.len());
        }

        Ok(output)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_client_requires_token() {
        let config = LlmConfig::default();
        assert!(matches!(
            ChatClient::new(&config),
            Err(KilnError::Configuration(_))
        ));
    }

    #[test]
    fn test_endpoint_joins_base_url() {
        let config = LlmConfig {
            base_url: "https://llm.example.com/v1/".to_string(),
            api_token: Some("token".to_string()),
            ..Default::default()
        };
        let client = ChatClient::new(&config).unwrap();
        assert_eq!(client.endpoint, "https://llm.example.com/v1/chat/completions");
        assert_eq!(client.model(), "openai/gpt-4o");
    }

    #[tokio::test]
    async fn test_unreachable_endpoint_is_generation_failure() {
        let config = LlmConfig {
            base_url: "http://127.0.0.1:9".to_string(),
            api_token: Some("token".to_string()),
            timeout_secs: 2,
            ..Default::default()
        };
        let client = ChatClient::new(&config).unwrap();
        let result = client.complete("make a page").await;
        assert!(matches!(result, Err(KilnError::Generation(_))));
    }
}

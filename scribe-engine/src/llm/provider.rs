//! Provider clients
//!
//! Thin reqwest adapters for the supported providers. Each client posts a
//! single JSON body and extracts the response text plus total-token usage;
//! everything else about the provider wire formats is out of scope.

use async_trait::async_trait;
use scribe_core::domain::pipeline::{LlmConfig, ProviderKind};
use serde_json::{Value, json};
use thiserror::Error;

/// Raw provider response
#[derive(Debug, Clone)]
pub struct ProviderResponse {
    pub text: String,
    pub total_tokens: Option<u64>,
    pub model: String,
}

/// Errors from a provider client
#[derive(Debug, Error)]
pub enum ProviderError {
    /// HTTP transport failure
    #[error("request failed: {0}")]
    Transport(#[from] reqwest::Error),

    /// Provider rejected the call
    #[error("provider returned status {status}: {message}")]
    Api { status: u16, message: String },

    /// Response body missing the expected fields
    #[error("malformed provider response: {0}")]
    Malformed(String),
}

/// One LLM provider client
#[async_trait]
pub trait LlmProvider: Send + Sync {
    async fn generate(&self, prompt: &str) -> Result<ProviderResponse, ProviderError>;
}

/// Pure mapping from provider kind to a client
pub fn client_for(kind: ProviderKind, config: &LlmConfig) -> Box<dyn LlmProvider> {
    match kind {
        ProviderKind::OpenAi => Box::new(OpenAiClient::new(config)),
        ProviderKind::Anthropic => Box::new(AnthropicClient::new(config)),
        ProviderKind::Google => Box::new(GoogleClient::new(config)),
    }
}

async fn error_for_status(response: reqwest::Response) -> Result<Value, ProviderError> {
    let status = response.status();
    if !status.is_success() {
        let message = response.text().await.unwrap_or_default();
        return Err(ProviderError::Api {
            status: status.as_u16(),
            message,
        });
    }
    Ok(response.json().await?)
}

// =============================================================================
// OpenAI
// =============================================================================

pub struct OpenAiClient {
    http: reqwest::Client,
    base_url: String,
    api_key: String,
    model: String,
    temperature: Option<f64>,
    max_tokens: Option<u32>,
}

impl OpenAiClient {
    pub fn new(config: &LlmConfig) -> Self {
        Self {
            http: reqwest::Client::new(),
            base_url: "https://api.openai.com/v1".to_string(),
            api_key: config.api_key.clone(),
            model: config.model.clone(),
            temperature: config.temperature,
            max_tokens: config.max_tokens,
        }
    }
}

#[async_trait]
impl LlmProvider for OpenAiClient {
    async fn generate(&self, prompt: &str) -> Result<ProviderResponse, ProviderError> {
        let mut body = json!({
            "model": self.model,
            "messages": [{"role": "user", "content": prompt}],
        });
        if let Some(temperature) = self.temperature {
            body["temperature"] = json!(temperature);
        }
        if let Some(max_tokens) = self.max_tokens {
            body["max_tokens"] = json!(max_tokens);
        }

        let response = self
            .http
            .post(format!("{}/chat/completions", self.base_url))
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await?;
        let body = error_for_status(response).await?;

        let text = body["choices"][0]["message"]["content"]
            .as_str()
            .ok_or_else(|| ProviderError::Malformed("missing choices[0].message.content".into()))?
            .to_string();
        let total_tokens = body["usage"]["total_tokens"].as_u64();

        Ok(ProviderResponse {
            text,
            total_tokens,
            model: self.model.clone(),
        })
    }
}

// =============================================================================
// Anthropic
// =============================================================================

pub struct AnthropicClient {
    http: reqwest::Client,
    base_url: String,
    api_key: String,
    model: String,
    temperature: Option<f64>,
    max_tokens: u32,
}

impl AnthropicClient {
    pub fn new(config: &LlmConfig) -> Self {
        Self {
            http: reqwest::Client::new(),
            base_url: "https://api.anthropic.com".to_string(),
            api_key: config.api_key.clone(),
            model: config.model.clone(),
            temperature: config.temperature,
            // The messages API requires max_tokens.
            max_tokens: config.max_tokens.unwrap_or(4096),
        }
    }
}

#[async_trait]
impl LlmProvider for AnthropicClient {
    async fn generate(&self, prompt: &str) -> Result<ProviderResponse, ProviderError> {
        let mut body = json!({
            "model": self.model,
            "max_tokens": self.max_tokens,
            "messages": [{"role": "user", "content": prompt}],
        });
        if let Some(temperature) = self.temperature {
            body["temperature"] = json!(temperature);
        }

        let response = self
            .http
            .post(format!("{}/v1/messages", self.base_url))
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", "2023-06-01")
            .json(&body)
            .send()
            .await?;
        let body = error_for_status(response).await?;

        let text = body["content"][0]["text"]
            .as_str()
            .ok_or_else(|| ProviderError::Malformed("missing content[0].text".into()))?
            .to_string();
        let total_tokens = match (
            body["usage"]["input_tokens"].as_u64(),
            body["usage"]["output_tokens"].as_u64(),
        ) {
            (Some(input), Some(output)) => Some(input + output),
            _ => None,
        };

        Ok(ProviderResponse {
            text,
            total_tokens,
            model: self.model.clone(),
        })
    }
}

// =============================================================================
// Google
// =============================================================================

pub struct GoogleClient {
    http: reqwest::Client,
    base_url: String,
    api_key: String,
    model: String,
    temperature: Option<f64>,
    max_tokens: Option<u32>,
}

impl GoogleClient {
    pub fn new(config: &LlmConfig) -> Self {
        Self {
            http: reqwest::Client::new(),
            base_url: "https://generativelanguage.googleapis.com/v1beta".to_string(),
            api_key: config.api_key.clone(),
            model: config.model.clone(),
            temperature: config.temperature,
            max_tokens: config.max_tokens,
        }
    }
}

#[async_trait]
impl LlmProvider for GoogleClient {
    async fn generate(&self, prompt: &str) -> Result<ProviderResponse, ProviderError> {
        let mut generation_config = json!({});
        if let Some(temperature) = self.temperature {
            generation_config["temperature"] = json!(temperature);
        }
        if let Some(max_tokens) = self.max_tokens {
            generation_config["maxOutputTokens"] = json!(max_tokens);
        }

        let body = json!({
            "contents": [{"parts": [{"text": prompt}]}],
            "generationConfig": generation_config,
        });

        let response = self
            .http
            .post(format!(
                "{}/models/{}:generateContent?key={}",
                self.base_url, self.model, self.api_key
            ))
            .json(&body)
            .send()
            .await?;
        let body = error_for_status(response).await?;

        let text = body["candidates"][0]["content"]["parts"][0]["text"]
            .as_str()
            .ok_or_else(|| {
                ProviderError::Malformed("missing candidates[0].content.parts[0].text".into())
            })?
            .to_string();
        let total_tokens = body["usageMetadata"]["totalTokenCount"].as_u64();

        Ok(ProviderResponse {
            text,
            total_tokens,
            model: self.model.clone(),
        })
    }
}

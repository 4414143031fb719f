//! LLM gateway
//!
//! Uniform `generate` capability over provider clients. Provider selection
//! is a pure mapping from the configured provider name; an unknown name is
//! an `UnsupportedProvider` error. Structured-JSON extraction is attempted
//! on the response text when requested — failure to parse yields no JSON,
//! never an error. Every call runs under the configured timeout; a timeout
//! is a stage failure eligible for job-level retry.

pub mod provider;

use scribe_core::EngineError;
use scribe_core::domain::pipeline::{LlmConfig, ProviderKind};
use serde_json::Value;
use std::time::Duration;

pub use provider::{LlmProvider, ProviderError, ProviderResponse};

const DEFAULT_TIMEOUT_SECS: u64 = 120;

/// Gateway outcome, structured extraction applied
#[derive(Debug, Clone)]
pub struct GenerateOutcome {
    pub text: String,
    /// Parsed structured output, when extraction was requested and the
    /// model's text was parseable as JSON
    pub json: Option<Value>,
    pub tokens_used: Option<u64>,
    pub model: String,
    pub provider: String,
}

/// Uniform generation capability over one provider client
pub struct LlmGateway {
    provider: Box<dyn LlmProvider>,
    provider_name: String,
    timeout: Duration,
}

impl LlmGateway {
    /// Builds a gateway for the configured provider
    pub fn from_config(config: &LlmConfig) -> Result<Self, EngineError> {
        let kind = ProviderKind::from_name(&config.provider)?;
        let client = provider::client_for(kind, config);
        Ok(Self {
            provider: client,
            provider_name: kind.as_str().to_string(),
            timeout: Duration::from_secs(config.timeout_secs.unwrap_or(DEFAULT_TIMEOUT_SECS)),
        })
    }

    /// Builds a gateway over an explicit provider client.
    ///
    /// Used for alternate transports and stubbed providers in tests.
    pub fn with_provider(
        provider: Box<dyn LlmProvider>,
        provider_name: impl Into<String>,
        timeout: Duration,
    ) -> Self {
        Self {
            provider,
            provider_name: provider_name.into(),
            timeout,
        }
    }

    /// Generates text for a prompt, optionally extracting structured JSON
    pub async fn generate(
        &self,
        prompt: &str,
        want_json: bool,
    ) -> Result<GenerateOutcome, EngineError> {
        let response = tokio::time::timeout(self.timeout, self.provider.generate(prompt))
            .await
            .map_err(|_| {
                EngineError::LlmGateway(format!(
                    "call timed out after {}s",
                    self.timeout.as_secs()
                ))
            })?
            .map_err(|e| EngineError::LlmGateway(e.to_string()))?;

        let json = if want_json {
            extract_json(&response.text)
        } else {
            None
        };

        Ok(GenerateOutcome {
            text: response.text,
            json,
            tokens_used: response.total_tokens,
            model: response.model,
            provider: self.provider_name.clone(),
        })
    }
}

/// Pulls a JSON value out of model output.
///
/// Models asked for JSON routinely wrap it in Markdown fences or prose;
/// try the whole text, then a fenced block, then the outermost braces.
pub fn extract_json(text: &str) -> Option<Value> {
    let trimmed = text.trim();

    if let Ok(value) = serde_json::from_str(trimmed) {
        return Some(value);
    }

    if let Some(fenced) = fenced_block(trimmed) {
        if let Ok(value) = serde_json::from_str(fenced) {
            return Some(value);
        }
    }

    let start = trimmed.find('{')?;
    let end = trimmed.rfind('}')?;
    if end <= start {
        return None;
    }
    serde_json::from_str(&trimmed[start..=end]).ok()
}

/// Contents of the first ``` fence, with an optional language tag
fn fenced_block(text: &str) -> Option<&str> {
    let open = text.find("```")?;
    let after = &text[open + 3..];
    let body_start = after.find('\n')? + 1;
    let body = &after[body_start..];
    let close = body.find("```")?;
    Some(body[..close].trim())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutil::StubProvider;
    use serde_json::json;

    #[test]
    fn test_extract_plain_json() {
        let value = extract_json(r#"{"summary": "fine"}"#).unwrap();
        assert_eq!(value, json!({"summary": "fine"}));
    }

    #[test]
    fn test_extract_fenced_json() {
        let text = "Here you go:\n```json\n{\"summary\": \"fine\"}\n```\nanything else?";
        let value = extract_json(text).unwrap();
        assert_eq!(value, json!({"summary": "fine"}));
    }

    #[test]
    fn test_extract_embedded_object() {
        let text = "The result is {\"n\": 3} as requested.";
        assert_eq!(extract_json(text).unwrap(), json!({"n": 3}));
    }

    #[test]
    fn test_extract_garbage_is_none() {
        assert_eq!(extract_json("no json anywhere"), None);
        assert_eq!(extract_json("{broken"), None);
    }

    #[tokio::test]
    async fn test_generate_propagates_usage_and_model() {
        let gateway = LlmGateway::with_provider(
            Box::new(StubProvider::with_text(r#"{"summary": "AI is..."}"#, Some(42))),
            "stub",
            Duration::from_secs(5),
        );

        let outcome = gateway.generate("Write about AI", true).await.unwrap();
        assert_eq!(outcome.tokens_used, Some(42));
        assert_eq!(outcome.provider, "stub");
        assert_eq!(outcome.json, Some(json!({"summary": "AI is..."})));
    }

    #[tokio::test]
    async fn test_parse_failure_is_not_an_error() {
        let gateway = LlmGateway::with_provider(
            Box::new(StubProvider::with_text("plain prose, no json", Some(7))),
            "stub",
            Duration::from_secs(5),
        );

        let outcome = gateway.generate("hello", true).await.unwrap();
        assert_eq!(outcome.json, None);
        assert_eq!(outcome.tokens_used, Some(7));
    }

    #[tokio::test]
    async fn test_timeout_is_a_gateway_error() {
        let gateway = LlmGateway::with_provider(
            Box::new(StubProvider::hanging()),
            "stub",
            Duration::from_millis(30),
        );

        let err = gateway.generate("hello", false).await.unwrap_err();
        assert!(matches!(err, EngineError::LlmGateway(_)));
        assert!(err.to_string().contains("timed out"));
    }
}

//! Shared test fixtures
//!
//! Temp pipeline trees under the system temp directory and a scripted LLM
//! provider. Everything here is test-only.

use crate::llm::provider::{LlmProvider, ProviderError, ProviderResponse};
use async_trait::async_trait;
use std::collections::VecDeque;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::sync::atomic::{AtomicU32, Ordering};
use uuid::Uuid;

/// Temp pipeline tree, removed on drop
pub struct PipelineFixture {
    root: PathBuf,
}

impl PipelineFixture {
    /// A "demo" pipeline: one required text input, a main prompt, an md
    /// report template, and a pass-through processor
    pub fn demo() -> Self {
        let root = std::env::temp_dir().join(format!("scribe-test-{}", Uuid::new_v4()));
        let fixture = Self { root };

        fixture.write(
            "demo/pipeline.json",
            r#"{
  "spec": {
    "name": "demo",
    "version": "1.0.0",
    "inputs": [
      { "name": "topic", "type": "text", "required": true }
    ],
    "outputs": ["md"]
  }
}"#,
        );
        fixture.write("demo/prompts/main.md", "Write about {{ data.topic }}");
        fixture.write("demo/templates/report.md.tmpl", "# Report\n{{ llm.summary }}");
        fixture.write(
            "demo/processor.lua",
            r#"return function(inputs)
    return { attributes = { topic = inputs.topic } }
end
"#,
        );

        fixture
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn dir(&self, rel: &str) -> PathBuf {
        self.root.join(rel)
    }

    pub fn write(&self, rel: &str, contents: &str) {
        let path = self.root.join(rel);
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(path, contents).unwrap();
    }

    pub fn remove(&self, rel: &str) {
        let _ = std::fs::remove_file(self.root.join(rel));
    }
}

impl Drop for PipelineFixture {
    fn drop(&mut self) {
        let _ = std::fs::remove_dir_all(&self.root);
    }
}

/// Scripted LLM provider for driving gateway and executor tests
pub struct StubProvider {
    responses: Mutex<VecDeque<Result<ProviderResponse, ProviderError>>>,
    fallback: Option<ProviderResponse>,
    calls: AtomicU32,
    hang: bool,
}

impl StubProvider {
    /// Always answers with the given text
    pub fn with_text(text: &str, total_tokens: Option<u64>) -> Self {
        Self {
            responses: Mutex::new(VecDeque::new()),
            fallback: Some(response(text, total_tokens)),
            calls: AtomicU32::new(0),
            hang: false,
        }
    }

    /// Fails `failures` times, then answers with the given text
    pub fn flaky(failures: u32, text: &str, total_tokens: Option<u64>) -> Self {
        let mut responses = VecDeque::new();
        for _ in 0..failures {
            responses.push_back(Err(ProviderError::Api {
                status: 503,
                message: "overloaded".to_string(),
            }));
        }
        Self {
            responses: Mutex::new(responses),
            fallback: Some(response(text, total_tokens)),
            calls: AtomicU32::new(0),
            hang: false,
        }
    }

    /// Fails every call
    pub fn failing() -> Self {
        Self {
            responses: Mutex::new(VecDeque::new()),
            fallback: None,
            calls: AtomicU32::new(0),
            hang: false,
        }
    }

    /// Never answers; used to exercise the gateway timeout
    pub fn hanging() -> Self {
        Self {
            responses: Mutex::new(VecDeque::new()),
            fallback: None,
            calls: AtomicU32::new(0),
            hang: true,
        }
    }

    pub fn calls(&self) -> u32 {
        self.calls.load(Ordering::SeqCst)
    }
}

fn response(text: &str, total_tokens: Option<u64>) -> ProviderResponse {
    ProviderResponse {
        text: text.to_string(),
        total_tokens,
        model: "stub-1".to_string(),
    }
}

#[async_trait]
impl LlmProvider for std::sync::Arc<StubProvider> {
    async fn generate(&self, prompt: &str) -> Result<ProviderResponse, ProviderError> {
        (**self).generate(prompt).await
    }
}

#[async_trait]
impl LlmProvider for StubProvider {
    async fn generate(&self, _prompt: &str) -> Result<ProviderResponse, ProviderError> {
        self.calls.fetch_add(1, Ordering::SeqCst);

        if self.hang {
            tokio::time::sleep(std::time::Duration::from_secs(3600)).await;
        }

        if let Some(scripted) = self.responses.lock().unwrap().pop_front() {
            return scripted;
        }

        match &self.fallback {
            Some(fallback) => Ok(fallback.clone()),
            None => Err(ProviderError::Api {
                status: 500,
                message: "stub always fails".to_string(),
            }),
        }
    }
}

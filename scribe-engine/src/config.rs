//! Engine configuration
//!
//! Every knob comes from environment variables with defaults where a
//! default makes sense, validated before the engine starts. A missing
//! required credential is a startup/submission-time error, never a stage
//! failure.

use crate::queue::QueueConfig;
use scribe_core::EngineError;
use scribe_core::domain::pipeline::{LlmConfig, ProviderKind};
use std::path::PathBuf;
use std::time::Duration;

/// Engine-wide configuration
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Root directory holding one subdirectory per pipeline
    pub pipelines_dir: PathBuf,

    /// SQLite ledger location
    pub db_path: PathBuf,

    /// Worker pool size
    pub workers: usize,

    /// Default LLM configuration; pipelines may override it
    pub llm: LlmConfig,

    /// Queue retry/lease tuning
    pub queue: QueueConfig,
}

impl EngineConfig {
    pub fn new(
        pipelines_dir: impl Into<PathBuf>,
        db_path: impl Into<PathBuf>,
        llm: LlmConfig,
    ) -> Self {
        Self {
            pipelines_dir: pipelines_dir.into(),
            db_path: db_path.into(),
            workers: 2,
            llm,
            queue: QueueConfig::default(),
        }
    }

    /// Creates configuration from environment variables
    ///
    /// Expected environment variables:
    /// - SCRIBE_LLM_PROVIDER (required: openai | anthropic | google)
    /// - SCRIBE_LLM_MODEL (required)
    /// - SCRIBE_LLM_API_KEY (required)
    /// - SCRIBE_PIPELINES_DIR (optional, default: ./pipelines)
    /// - SCRIBE_DB_PATH (optional, default: ./scribe.db)
    /// - SCRIBE_WORKERS (optional, default: 2)
    /// - SCRIBE_LLM_TIMEOUT_SECS (optional)
    /// - SCRIBE_QUEUE_MAX_ATTEMPTS (optional, default: 3)
    /// - SCRIBE_QUEUE_BASE_DELAY_MS (optional, default: 500)
    /// - SCRIBE_QUEUE_LEASE_SECS (optional, default: 60)
    pub fn from_env() -> Result<Self, EngineError> {
        let provider = require_env("SCRIBE_LLM_PROVIDER")?;
        let model = require_env("SCRIBE_LLM_MODEL")?;
        let api_key = require_env("SCRIBE_LLM_API_KEY")?;

        let llm = LlmConfig {
            provider,
            model,
            api_key,
            temperature: parse_env("SCRIBE_LLM_TEMPERATURE"),
            max_tokens: parse_env("SCRIBE_LLM_MAX_TOKENS"),
            timeout_secs: parse_env("SCRIBE_LLM_TIMEOUT_SECS"),
        };

        let mut queue = QueueConfig::default();
        if let Some(max_attempts) = parse_env::<u32>("SCRIBE_QUEUE_MAX_ATTEMPTS") {
            queue.max_attempts = max_attempts;
        }
        if let Some(base_delay_ms) = parse_env::<u64>("SCRIBE_QUEUE_BASE_DELAY_MS") {
            queue.base_delay = Duration::from_millis(base_delay_ms);
        }
        if let Some(lease_secs) = parse_env::<u64>("SCRIBE_QUEUE_LEASE_SECS") {
            queue.lease = Duration::from_secs(lease_secs);
        }

        Ok(Self {
            pipelines_dir: std::env::var("SCRIBE_PIPELINES_DIR")
                .unwrap_or_else(|_| "./pipelines".to_string())
                .into(),
            db_path: std::env::var("SCRIBE_DB_PATH")
                .unwrap_or_else(|_| "./scribe.db".to_string())
                .into(),
            workers: parse_env("SCRIBE_WORKERS").unwrap_or(2),
            llm,
            queue,
        })
    }

    /// Validates the configuration
    pub fn validate(&self) -> Result<(), EngineError> {
        ProviderKind::from_name(&self.llm.provider)?;

        if self.llm.model.is_empty() {
            return Err(EngineError::InvalidInput("llm model cannot be empty".into()));
        }
        if self.llm.api_key.is_empty() {
            return Err(EngineError::InvalidInput(format!(
                "missing api key for provider \"{}\"",
                self.llm.provider
            )));
        }
        if self.workers == 0 {
            return Err(EngineError::InvalidInput("workers must be greater than 0".into()));
        }
        if self.queue.max_attempts == 0 {
            return Err(EngineError::InvalidInput(
                "queue max_attempts must be greater than 0".into(),
            ));
        }

        Ok(())
    }
}

fn require_env(name: &str) -> Result<String, EngineError> {
    std::env::var(name)
        .map_err(|_| EngineError::InvalidInput(format!("{name} environment variable not set")))
}

fn parse_env<T: std::str::FromStr>(name: &str) -> Option<T> {
    std::env::var(name).ok().and_then(|s| s.parse().ok())
}

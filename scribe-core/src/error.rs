//! Engine error taxonomy
//!
//! Stage-local faults abort the remaining stages of an attempt and are
//! recorded verbatim on the execution record. Recovery happens only at
//! whole-job granularity via queue retry; no variant here implies an
//! in-stage retry.

use thiserror::Error;

/// Result type alias for engine operations
pub type Result<T> = std::result::Result<T, EngineError>;

/// Errors raised by the execution engine
#[derive(Debug, Error)]
pub enum EngineError {
    /// No pipeline directory matches the requested name
    #[error("pipeline \"{0}\" not found")]
    PipelineNotFound(String),

    /// The processor returned something other than `{attributes, metadata?}`
    #[error("processor contract violation: {0}")]
    ProcessorContractViolation(String),

    /// The pipeline's prompts directory yielded no rendered prompts
    #[error("no prompt templates found under {0}")]
    NoPromptsFound(String),

    /// Network, auth, provider, or timeout failure during the LLM call
    #[error("llm gateway: {0}")]
    LlmGateway(String),

    /// No report template matches the requested output format
    #[error("no report template for format \"{0}\"")]
    TemplateNotFound(String),

    /// A template expression could not be rendered
    #[error("template render failed at \"{expression}\": {reason}")]
    TemplateRender { expression: String, reason: String },

    /// Provider name with no registered client factory
    #[error("unsupported provider \"{0}\"")]
    UnsupportedProvider(String),

    /// The queue's retry budget for a job is consumed
    #[error("retry budget exhausted after {0} attempt(s)")]
    QueueDeliveryExhausted(u32),

    /// Submission-time input validation failure
    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// Execution-ledger persistence failure
    #[error("ledger: {0}")]
    Ledger(String),

    #[error("io: {0}")]
    Io(#[from] std::io::Error),
}

impl EngineError {
    /// Stage-tagged message, as recorded on the execution record
    pub fn for_record(&self, stage: &str) -> String {
        format!("{stage}: {self}")
    }
}

//! Stage result types
//!
//! Transient values produced by the processing, enrichment, and render
//! stages. All of these are scoped to a single execution attempt; nothing
//! here is persisted except through the bundle and report artifacts.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use uuid::Uuid;

/// Structured output of the data-processing stage
///
/// `attributes` is the sandbox's sole contractual output; the stage fails
/// when it is missing or empty. `metadata` is free-form and flows into the
/// bundle artifact only.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ProcessorResult {
    pub attributes: HashMap<String, serde_json::Value>,
    #[serde(default)]
    pub metadata: HashMap<String, serde_json::Value>,
}

/// Output of the LLM enrichment stage
///
/// `attributes` holds structured JSON parsed from the model output and is
/// empty when the output was not parseable; parse failure is not a stage
/// failure. Usage and model identity are captured either way.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlmEnrichment {
    pub attributes: HashMap<String, serde_json::Value>,
    pub raw_output: String,
    pub tokens_used: Option<u64>,
    pub model: String,
    pub provider: String,
}

/// Execution metadata exposed to the report render pass as `metadata`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutionMetadata {
    pub execution_id: Uuid,
    pub pipeline: String,
    pub pipeline_version: String,
    pub model: String,
    /// ISO-8601 timestamp of report generation
    pub generated_at: String,
    /// Elapsed time since the attempt entered `processing`
    pub elapsed_ms: i64,
}

/// Read-only composite context for the report render pass
#[derive(Debug, Clone, Serialize)]
pub struct TemplateContext {
    pub inputs: HashMap<String, serde_json::Value>,
    pub vars: HashMap<String, serde_json::Value>,
    pub data: HashMap<String, serde_json::Value>,
    pub llm: HashMap<String, serde_json::Value>,
    pub metadata: ExecutionMetadata,
}

/// What a finished execution produced
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutionOutcome {
    pub execution_id: Uuid,
    pub output_path: String,
    pub bundle_path: String,
    pub format: String,
    pub model: String,
    pub tokens_used: Option<u64>,
    pub elapsed_ms: i64,
}

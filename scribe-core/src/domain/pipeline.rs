//! Pipeline specification types
//!
//! A `PipelineSpec` arrives already validated by the configuration layer;
//! the engine's only boundary check is validating user-supplied inputs
//! against the declared fields before anything is queued or executed.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::error::EngineError;

/// Declared type of a pipeline input field
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum InputType {
    Text,
    Number,
    Select,
    File,
}

/// One declared input field
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InputSpec {
    pub name: String,
    #[serde(rename = "type")]
    pub input_type: InputType,
    #[serde(default)]
    pub label: Option<String>,
    #[serde(default)]
    pub required: bool,
    /// Allowed values for `select` inputs
    #[serde(default)]
    pub options: Vec<String>,
}

/// File locations within a pipeline directory
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PipelineFiles {
    /// Processor entry script, relative to the pipeline directory.
    /// Defaults to `processor.lua` when absent but the file exists.
    #[serde(default)]
    pub processor: Option<String>,
}

/// Declarative pipeline specification
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineSpec {
    pub name: String,
    pub version: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub inputs: Vec<InputSpec>,
    /// Output formats this pipeline declares it can render
    #[serde(default)]
    pub outputs: Vec<String>,
    /// Static variables exposed to both template passes as `vars`
    #[serde(default)]
    pub vars: HashMap<String, serde_json::Value>,
    #[serde(default)]
    pub files: PipelineFiles,
}

/// LLM provider identifier
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProviderKind {
    OpenAi,
    Anthropic,
    Google,
}

impl ProviderKind {
    pub fn as_str(self) -> &'static str {
        match self {
            ProviderKind::OpenAi => "openai",
            ProviderKind::Anthropic => "anthropic",
            ProviderKind::Google => "google",
        }
    }

    /// Resolves a provider name from configuration.
    ///
    /// Selection is a pure mapping; an unknown name is an
    /// `UnsupportedProvider` error, not a fallback.
    pub fn from_name(name: &str) -> Result<Self, EngineError> {
        match name {
            "openai" => Ok(ProviderKind::OpenAi),
            "anthropic" => Ok(ProviderKind::Anthropic),
            "google" => Ok(ProviderKind::Google),
            other => Err(EngineError::UnsupportedProvider(other.to_string())),
        }
    }
}

/// LLM call configuration for one pipeline run
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlmConfig {
    /// Provider name, resolved via [`ProviderKind::from_name`]
    pub provider: String,
    pub model: String,
    #[serde(default)]
    pub api_key: String,
    #[serde(default)]
    pub temperature: Option<f64>,
    #[serde(default)]
    pub max_tokens: Option<u32>,
    /// Per-call timeout; a timeout is a stage failure eligible for
    /// job-level retry
    #[serde(default)]
    pub timeout_secs: Option<u64>,
}

/// Validates user-supplied inputs against the declared input fields.
///
/// Required fields must be present and non-null, values must match the
/// declared type, `select` values must be one of the declared options, and
/// undeclared keys are rejected — nothing downstream may assume a field
/// exists that the pipeline never declared.
pub fn validate_inputs(
    spec: &PipelineSpec,
    inputs: &HashMap<String, serde_json::Value>,
) -> Result<(), EngineError> {
    for field in &spec.inputs {
        let value = inputs.get(&field.name);

        match value {
            None | Some(serde_json::Value::Null) => {
                if field.required {
                    return Err(EngineError::InvalidInput(format!(
                        "required input \"{}\" is missing",
                        field.name
                    )));
                }
            }
            Some(value) => {
                check_input_type(field, value)?;
            }
        }
    }

    let declared: std::collections::HashSet<&str> =
        spec.inputs.iter().map(|f| f.name.as_str()).collect();
    for key in inputs.keys() {
        if !declared.contains(key.as_str()) {
            return Err(EngineError::InvalidInput(format!(
                "input \"{key}\" is not declared by pipeline \"{}\"",
                spec.name
            )));
        }
    }

    Ok(())
}

fn check_input_type(field: &InputSpec, value: &serde_json::Value) -> Result<(), EngineError> {
    let ok = match field.input_type {
        InputType::Text | InputType::File => value.is_string(),
        InputType::Number => value.is_number(),
        InputType::Select => match value.as_str() {
            Some(s) => field.options.is_empty() || field.options.iter().any(|o| o == s),
            None => false,
        },
    };

    if ok {
        Ok(())
    } else {
        Err(EngineError::InvalidInput(format!(
            "input \"{}\" does not match declared type {:?}",
            field.name, field.input_type
        )))
    }
}

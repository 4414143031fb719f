//! Processor script loading and contract conversion
//!
//! A processor script is the pipeline's user-supplied data-processing unit.
//! It must evaluate to a function; the engine calls that function with the
//! validated inputs table and expects `{attributes = {...}, metadata = {...}}`
//! back. Anything else is a contract violation and fails the stage.

use mlua::{Lua, LuaSerdeExt, Value};
use scribe_core::domain::report::ProcessorResult;
use std::collections::HashMap;
use thiserror::Error;

/// Ways a processor run can fail
#[derive(Debug, Error)]
pub enum ProcessorError {
    /// The script violated the `(inputs) -> {attributes, metadata?}` contract
    #[error("{0}")]
    Contract(String),

    /// The script itself raised while evaluating or running
    #[error("script error: {0}")]
    Runtime(#[from] mlua::Error),
}

/// Evaluates a processor script and runs it against the given inputs.
///
/// The script source is evaluated fresh in the provided sandbox — callers
/// create one sandbox per execution, so no interpreter state leaks between
/// runs.
pub fn run_processor(
    lua: &Lua,
    source: &str,
    chunk_name: &str,
    inputs: &HashMap<String, serde_json::Value>,
) -> Result<ProcessorResult, ProcessorError> {
    let evaluated: Value = lua.load(source).set_name(chunk_name).eval()?;

    let func = match evaluated {
        Value::Function(func) => func,
        other => {
            return Err(ProcessorError::Contract(format!(
                "processor script must return a function, got {}",
                other.type_name()
            )));
        }
    };

    let lua_inputs = lua.to_value(inputs)?;
    let returned: Value = func.call(lua_inputs)?;

    result_from_value(lua, returned)
}

/// Converts the script's return value into a [`ProcessorResult`],
/// enforcing the attribute contract.
fn result_from_value(lua: &Lua, value: Value) -> Result<ProcessorResult, ProcessorError> {
    if !value.is_table() {
        return Err(ProcessorError::Contract(format!(
            "processor must return a table, got {}",
            value.type_name()
        )));
    }

    let result: ProcessorResult = lua.from_value(value).map_err(|e| {
        ProcessorError::Contract(format!("expected {{attributes, metadata?}}: {e}"))
    })?;

    if result.attributes.is_empty() {
        return Err(ProcessorError::Contract(
            "attributes must be a non-empty table".to_string(),
        ));
    }

    Ok(result)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sandbox::create_sandbox;
    use serde_json::json;

    fn inputs(topic: &str) -> HashMap<String, serde_json::Value> {
        HashMap::from([("topic".to_string(), json!(topic))])
    }

    #[test]
    fn test_processor_happy_path() {
        let lua = create_sandbox().unwrap();
        let source = r#"
            return function(inputs)
                return {
                    attributes = { topic = inputs.topic, doubled = inputs.topic .. inputs.topic },
                    metadata = { source = "test" },
                }
            end
        "#;

        let result = run_processor(&lua, source, "processor.lua", &inputs("AI")).unwrap();
        assert_eq!(result.attributes.get("topic"), Some(&json!("AI")));
        assert_eq!(result.attributes.get("doubled"), Some(&json!("AIAI")));
        assert_eq!(result.metadata.get("source"), Some(&json!("test")));
    }

    #[test]
    fn test_script_must_return_a_function() {
        let lua = create_sandbox().unwrap();
        let err = run_processor(&lua, "return { attributes = {} }", "p", &inputs("x"))
            .unwrap_err();
        assert!(matches!(err, ProcessorError::Contract(_)));
        assert!(err.to_string().contains("function"));
    }

    #[test]
    fn test_missing_attributes_is_contract_violation() {
        let lua = create_sandbox().unwrap();
        let source = "return function(inputs) return { metadata = {} } end";
        let err = run_processor(&lua, source, "p", &inputs("x")).unwrap_err();
        assert!(matches!(err, ProcessorError::Contract(_)));
    }

    #[test]
    fn test_empty_attributes_is_contract_violation() {
        let lua = create_sandbox().unwrap();
        let source = "return function(inputs) return { attributes = { n = nil } } end";
        let err = run_processor(&lua, source, "p", &inputs("x")).unwrap_err();
        assert!(matches!(err, ProcessorError::Contract(_)));
    }

    #[test]
    fn test_non_table_return_is_contract_violation() {
        let lua = create_sandbox().unwrap();
        let source = "return function(inputs) return 42 end";
        let err = run_processor(&lua, source, "p", &inputs("x")).unwrap_err();
        assert!(matches!(err, ProcessorError::Contract(_)));
        assert!(err.to_string().contains("table"));
    }

    #[test]
    fn test_script_runtime_error_surfaces() {
        let lua = create_sandbox().unwrap();
        let source = "return function(inputs) error('boom') end";
        let err = run_processor(&lua, source, "p", &inputs("x")).unwrap_err();
        assert!(matches!(err, ProcessorError::Runtime(_)));
        assert!(err.to_string().contains("boom"));
    }
}

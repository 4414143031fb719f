//! Template rendering
//!
//! Two pure passes share one substitution engine: pass 1 renders LLM
//! prompts from `{inputs, vars, data}`, pass 2 renders the report document
//! from the full template context. Expressions are `{{ dotted.path }}`
//! lookups into a JSON context. An unresolved path or an unterminated
//! expression fails the owning stage with the raw expression for
//! diagnosis; rendering has no other failure mode and no side effects.

use scribe_core::EngineError;
use scribe_core::domain::report::TemplateContext;
use serde_json::{Value, json};
use std::collections::HashMap;

/// Renders prompt templates from processor output and inputs
pub fn render_prompt(
    template: &str,
    inputs: &HashMap<String, Value>,
    vars: &HashMap<String, Value>,
    data: &HashMap<String, Value>,
) -> Result<String, EngineError> {
    let context = json!({
        "inputs": inputs,
        "vars": vars,
        "data": data,
    });
    render(template, &context)
}

/// Renders the final report document from the full execution context
pub fn render_report(template: &str, context: &TemplateContext) -> Result<String, EngineError> {
    let value = serde_json::to_value(context).map_err(|e| EngineError::TemplateRender {
        expression: String::new(),
        reason: format!("context not serializable: {e}"),
    })?;
    render(template, &value)
}

/// Substitutes every `{{ path }}` expression in `template` from `context`
pub fn render(template: &str, context: &Value) -> Result<String, EngineError> {
    let mut out = String::with_capacity(template.len());
    let mut rest = template;

    while let Some(start) = rest.find("{{") {
        out.push_str(&rest[..start]);
        let after = &rest[start + 2..];

        let Some(end) = after.find("}}") else {
            return Err(EngineError::TemplateRender {
                expression: snippet(&rest[start..]),
                reason: "unterminated expression".to_string(),
            });
        };

        let raw = &after[..end];
        let path = raw.trim();

        let value = lookup(context, path).ok_or_else(|| EngineError::TemplateRender {
            expression: format!("{{{{{raw}}}}}"),
            reason: "unresolved path".to_string(),
        })?;

        out.push_str(&stringify(value));
        rest = &after[end + 2..];
    }

    out.push_str(rest);
    Ok(out)
}

/// Walks a dotted path through objects (by key) and arrays (by index)
fn lookup<'a>(context: &'a Value, path: &str) -> Option<&'a Value> {
    if path.is_empty() {
        return None;
    }

    let mut current = context;
    for part in path.split('.') {
        current = match current {
            Value::Object(map) => map.get(part)?,
            Value::Array(items) => items.get(part.parse::<usize>().ok()?)?,
            _ => return None,
        };
    }
    Some(current)
}

fn stringify(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::String(s) => s.clone(),
        Value::Number(n) => n.to_string(),
        Value::Bool(b) => b.to_string(),
        other => serde_json::to_string(other).unwrap_or_default(),
    }
}

fn snippet(text: &str) -> String {
    text.chars().take(32).collect()
}

//! Files module
//!
//! Scoped file reads for processor scripts, restricted to the pipeline's
//! `data/` subtree. Content is auto-detected by extension: JSON becomes a
//! table, CSV becomes an array of row tables keyed by the header line,
//! anything else is returned as plain text.

use mlua::prelude::*;
use scribe_lua::SandboxModule;
use serde_json::Value;
use std::path::{Component, Path, PathBuf};

pub struct FilesModule {
    data_dir: PathBuf,
}

impl FilesModule {
    pub fn new(data_dir: PathBuf) -> Self {
        Self { data_dir }
    }
}

impl SandboxModule for FilesModule {
    fn id(&self) -> &'static str {
        "files"
    }

    fn register(&self, lua: &Lua) -> LuaResult<()> {
        let table = lua.create_table()?;

        let data_dir = self.data_dir.clone();
        table.set(
            "read",
            lua.create_function(move |lua, relpath: String| {
                let path = resolve_scoped(&data_dir, &relpath)?;
                let text = std::fs::read_to_string(&path).map_err(|e| {
                    LuaError::RuntimeError(format!("cannot read \"{relpath}\": {e}"))
                })?;
                lua.to_value(&detect_format(&path, &text))
            })?,
        )?;

        let data_dir = self.data_dir.clone();
        table.set(
            "exists",
            lua.create_function(move |_, relpath: String| {
                let path = resolve_scoped(&data_dir, &relpath)?;
                Ok(path.exists())
            })?,
        )?;

        lua.globals().set(self.id(), table)?;
        Ok(())
    }
}

/// Joins a relative path under the data directory, rejecting escapes
fn resolve_scoped(data_dir: &Path, relpath: &str) -> LuaResult<PathBuf> {
    let rel = Path::new(relpath);
    let escapes = rel.is_absolute()
        || rel
            .components()
            .any(|c| !matches!(c, Component::Normal(_) | Component::CurDir));

    if escapes {
        return Err(LuaError::RuntimeError(format!(
            "path \"{relpath}\" escapes the pipeline data directory"
        )));
    }

    Ok(data_dir.join(rel))
}

fn detect_format(path: &Path, text: &str) -> Value {
    match path.extension().and_then(|e| e.to_str()) {
        Some("json") => serde_json::from_str(text).unwrap_or_else(|_| Value::String(text.to_string())),
        Some("csv") => Value::Array(parse_csv(text)),
        _ => Value::String(text.to_string()),
    }
}

/// Header-keyed CSV rows; `""` escapes a quote inside a quoted field
fn parse_csv(text: &str) -> Vec<Value> {
    let mut lines = text.lines();
    let Some(header) = lines.next() else {
        return Vec::new();
    };
    let headers = split_csv_line(header);

    lines
        .filter(|line| !line.trim().is_empty())
        .map(|line| {
            let fields = split_csv_line(line);
            let mut row = serde_json::Map::new();
            for (i, header) in headers.iter().enumerate() {
                row.insert(
                    header.clone(),
                    Value::String(fields.get(i).cloned().unwrap_or_default()),
                );
            }
            Value::Object(row)
        })
        .collect()
}

fn split_csv_line(line: &str) -> Vec<String> {
    let mut fields = Vec::new();
    let mut field = String::new();
    let mut in_quotes = false;
    let mut chars = line.chars().peekable();

    while let Some(c) = chars.next() {
        match c {
            '"' if in_quotes && chars.peek() == Some(&'"') => {
                field.push('"');
                chars.next();
            }
            '"' => in_quotes = !in_quotes,
            ',' if !in_quotes => fields.push(std::mem::take(&mut field)),
            c => field.push(c),
        }
    }
    fields.push(field);
    fields
}

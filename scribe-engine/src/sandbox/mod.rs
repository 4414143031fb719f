//! Processor sandbox
//!
//! Runs the pipeline's processor script with an injected, capability-scoped
//! context instead of ambient access: file reads restricted to the
//! pipeline's `data/` subtree, bundle persistence, a pipeline-namespaced
//! cache handle, and a structured logger. Each execution gets a fresh
//! interpreter, so no module state survives between runs.

pub mod modules;

use crate::cache::CacheStore;
use modules::{BundleModule, CacheModule, FilesModule, LogModule};
use scribe_core::EngineError;
use scribe_core::domain::report::ProcessorResult;
use scribe_lua::module::register_modules;
use scribe_lua::{create_sandbox, run_processor};
use serde_json::Value;
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use uuid::Uuid;

/// Per-execution sandbox for the data-processing stage
pub struct ProcessorSandbox {
    pipeline_dir: PathBuf,
    cache: Arc<CacheStore>,
    execution_id: Uuid,
}

impl ProcessorSandbox {
    pub fn new(pipeline_dir: PathBuf, cache: Arc<CacheStore>, execution_id: Uuid) -> Self {
        Self {
            pipeline_dir,
            cache,
            execution_id,
        }
    }

    /// Runs a processor script against the validated inputs.
    ///
    /// Builds a fresh interpreter, registers the capability modules, and
    /// enforces the `{attributes, metadata?}` contract on the result.
    pub fn run(
        &self,
        source: &str,
        chunk_name: &str,
        inputs: &HashMap<String, Value>,
    ) -> Result<ProcessorResult, EngineError> {
        let lua = create_sandbox()
            .map_err(|e| EngineError::ProcessorContractViolation(format!("sandbox: {e}")))?;

        let namespace = self.pipeline_dir.to_string_lossy().to_string();
        let log = LogModule::new(self.execution_id);
        let cache = CacheModule::new(self.cache.scoped(namespace));
        let files = FilesModule::new(self.pipeline_dir.join("data"));
        let bundle = BundleModule::new(
            self.pipeline_dir.join("output").join("bundles"),
            self.execution_id,
        );

        register_modules(&lua, &[&log, &cache, &files, &bundle])
            .map_err(|e| EngineError::ProcessorContractViolation(format!("sandbox: {e}")))?;

        run_processor(&lua, source, chunk_name, inputs)
            .map_err(|e| EngineError::ProcessorContractViolation(e.to_string()))
    }
}

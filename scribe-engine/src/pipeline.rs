//! Pipeline resolution
//!
//! Resolves pipeline directories by name, loads the serde-validated spec,
//! and discovers prompt and report-template files by naming convention.
//! Richer configuration formats and their schema validation belong to the
//! external configuration layer; the engine consumes `pipeline.json`.

use scribe_core::EngineError;
use scribe_core::domain::pipeline::{LlmConfig, PipelineSpec};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use uuid::Uuid;

pub const SPEC_FILE: &str = "pipeline.json";
const DEFAULT_PROCESSOR: &str = "processor.lua";

/// Contents of a pipeline's `pipeline.json`
#[derive(Debug, Deserialize)]
struct PipelineFile {
    spec: PipelineSpec,
    #[serde(default)]
    llm: Option<LlmConfig>,
}

/// A pipeline resolved on disk
#[derive(Debug, Clone)]
pub struct LoadedPipeline {
    pub dir: PathBuf,
    pub spec: PipelineSpec,
    /// Per-pipeline LLM override; the engine default applies when absent
    pub llm: Option<LlmConfig>,
}

/// Root directory holding one subdirectory per pipeline
#[derive(Debug, Clone)]
pub struct PipelineRoot {
    root: PathBuf,
}

impl PipelineRoot {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Resolves a pipeline by name and loads its spec
    pub async fn resolve(&self, name: &str) -> Result<LoadedPipeline, EngineError> {
        // A pipeline name addresses exactly one directory under the root.
        if name.is_empty() || name.contains(['/', '\\']) || name.starts_with('.') {
            return Err(EngineError::PipelineNotFound(name.to_string()));
        }

        let dir = self.root.join(name);
        let spec_path = dir.join(SPEC_FILE);

        let raw = tokio::fs::read_to_string(&spec_path)
            .await
            .map_err(|_| EngineError::PipelineNotFound(name.to_string()))?;

        let file: PipelineFile = serde_json::from_str(&raw).map_err(|e| {
            EngineError::InvalidInput(format!("pipeline \"{name}\": malformed {SPEC_FILE}: {e}"))
        })?;

        Ok(LoadedPipeline {
            dir,
            spec: file.spec,
            llm: file.llm,
        })
    }

    /// Names of every pipeline under the root, sorted
    pub async fn list(&self) -> Result<Vec<String>, EngineError> {
        let mut names = Vec::new();
        let mut entries = match tokio::fs::read_dir(&self.root).await {
            Ok(entries) => entries,
            Err(_) => return Ok(names),
        };

        while let Some(entry) = entries.next_entry().await? {
            if !entry.file_type().await?.is_dir() {
                continue;
            }
            if tokio::fs::try_exists(entry.path().join(SPEC_FILE))
                .await
                .unwrap_or(false)
            {
                names.push(entry.file_name().to_string_lossy().to_string());
            }
        }

        names.sort();
        Ok(names)
    }

    /// Loads the processor source declared by (or conventional to) a pipeline.
    ///
    /// Returns `None` when the pipeline declares no processor and none
    /// exists under the default name. A declared-but-missing file is an
    /// error, not a silent skip.
    pub async fn processor_source(
        &self,
        pipeline: &LoadedPipeline,
    ) -> Result<Option<(String, String)>, EngineError> {
        let file = match &pipeline.spec.files.processor {
            Some(file) => file.clone(),
            None => {
                let default = pipeline.dir.join(DEFAULT_PROCESSOR);
                if !tokio::fs::try_exists(&default).await.unwrap_or(false) {
                    return Ok(None);
                }
                DEFAULT_PROCESSOR.to_string()
            }
        };

        let source = tokio::fs::read_to_string(pipeline.dir.join(&file)).await?;
        Ok(Some((source, file)))
    }

    /// Prompt templates under `prompts/`, sorted by name
    pub async fn load_prompts(&self, dir: &Path) -> Result<Vec<(String, String)>, EngineError> {
        let prompts_dir = dir.join("prompts");
        let mut prompts = Vec::new();

        let mut entries = match tokio::fs::read_dir(&prompts_dir).await {
            Ok(entries) => entries,
            Err(_) => return Ok(prompts),
        };

        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) != Some("md") {
                continue;
            }
            let name = path
                .file_stem()
                .and_then(|s| s.to_str())
                .unwrap_or_default()
                .to_string();
            let text = tokio::fs::read_to_string(&path).await?;
            prompts.push((name, text));
        }

        prompts.sort_by(|a, b| a.0.cmp(&b.0));
        Ok(prompts)
    }

    /// Report template for a format, trying the filename conventions in order
    pub async fn find_report_template(
        &self,
        dir: &Path,
        format: &str,
    ) -> Result<PathBuf, EngineError> {
        let templates = dir.join("templates");
        let candidates = [
            templates.join(format!("report.{format}.tmpl")),
            templates.join(format!("report.{format}.md")),
            templates.join(format!("report.{format}")),
        ];

        for candidate in candidates {
            if tokio::fs::try_exists(&candidate).await.unwrap_or(false) {
                return Ok(candidate);
            }
        }

        Err(EngineError::TemplateNotFound(format.to_string()))
    }

    /// Bundle artifact location, addressed by execution id
    pub fn bundle_path(&self, dir: &Path, execution_id: Uuid) -> PathBuf {
        dir.join("output")
            .join("bundles")
            .join(format!("{execution_id}.json"))
    }

    /// Report artifact location, addressed by execution id and format
    pub fn report_path(&self, dir: &Path, execution_id: Uuid, format: &str) -> PathBuf {
        dir.join("output")
            .join("reports")
            .join(format!("{execution_id}.{format}"))
    }
}

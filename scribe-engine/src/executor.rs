//! Pipeline executor
//!
//! Drives one execution attempt through the nine ordered stages and owns
//! every ledger transition for that attempt:
//!
//! 1. resolve the pipeline and load its spec
//! 2. run the processor sandbox
//! 3. persist the attribute bundle
//! 4. load and render the prompt templates
//! 5. call the LLM gateway with the primary prompt
//! 6. assemble the template context
//! 7. locate the report template for the requested format
//! 8. render and persist the report
//! 9. mark the record completed
//!
//! A fault at any stage aborts the rest, is recorded verbatim on the
//! ledger (stage name plus message), and re-raises to the synchronous
//! caller or to the worker's retry path. Stages never retry on their own;
//! retry is the queue's whole-job mechanism, and the execution-id-addressed
//! artifact paths make a rerun overwrite its partial side effects.

use crate::cache::CacheStore;
use crate::ledger::{CompletionUpdate, ExecutionLedger};
use crate::llm::LlmGateway;
use crate::pipeline::PipelineRoot;
use crate::sandbox::ProcessorSandbox;
use crate::template;
use chrono::Utc;
use scribe_core::EngineError;
use scribe_core::domain::job::{ExecutionRecord, JobData};
use scribe_core::domain::pipeline::validate_inputs;
use scribe_core::domain::report::{
    ExecutionMetadata, ExecutionOutcome, LlmEnrichment, ProcessorResult, TemplateContext,
};
use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, error, info};
use uuid::Uuid;

/// A stage fault with the stage that raised it
struct StageFailure {
    stage: &'static str,
    error: EngineError,
}

trait StageExt<T> {
    fn stage(self, name: &'static str) -> Result<T, StageFailure>;
}

impl<T> StageExt<T> for Result<T, EngineError> {
    fn stage(self, name: &'static str) -> Result<T, StageFailure> {
        self.map_err(|error| StageFailure { stage: name, error })
    }
}

pub struct Executor {
    ledger: Arc<ExecutionLedger>,
    cache: Arc<CacheStore>,
    gateway: Arc<LlmGateway>,
    pipelines: PipelineRoot,
}

impl Executor {
    pub fn new(
        ledger: Arc<ExecutionLedger>,
        cache: Arc<CacheStore>,
        gateway: Arc<LlmGateway>,
        pipelines: PipelineRoot,
    ) -> Self {
        Self {
            ledger,
            cache,
            gateway,
            pipelines,
        }
    }

    pub fn pipelines(&self) -> &PipelineRoot {
        &self.pipelines
    }

    /// Runs one attempt for a job end to end.
    ///
    /// Adopts the job's existing non-terminal record when a submitter
    /// already created one; otherwise inserts a fresh attempt row and
    /// points the job index at it.
    pub async fn execute(&self, job: &JobData) -> Result<ExecutionOutcome, EngineError> {
        let execution_id = self.ensure_record(job).await?;
        let started = Instant::now();

        self.ledger.mark_processing(execution_id, Utc::now()).await?;
        info!(
            job = %job.job_id,
            execution = %execution_id,
            pipeline = %job.pipeline_name,
            "execution started"
        );

        match self.run_stages(execution_id, job, started).await {
            Ok(outcome) => {
                self.ledger
                    .mark_completed(
                        execution_id,
                        CompletionUpdate {
                            completed_at: Utc::now(),
                            execution_time_ms: outcome.elapsed_ms,
                            tokens_used: outcome.tokens_used.map(|t| t as i64),
                            model: Some(outcome.model.clone()),
                            output_path: outcome.output_path.clone(),
                            bundle_path: outcome.bundle_path.clone(),
                        },
                    )
                    .await?;

                info!(
                    execution = %execution_id,
                    elapsed_ms = outcome.elapsed_ms,
                    output = %outcome.output_path,
                    "execution completed"
                );
                Ok(outcome)
            }
            Err(failure) => {
                let elapsed_ms = started.elapsed().as_millis() as i64;
                let message = failure.error.for_record(failure.stage);

                if let Err(ledger_error) = self
                    .ledger
                    .mark_failed(execution_id, &message, elapsed_ms)
                    .await
                {
                    error!(
                        execution = %execution_id,
                        error = %ledger_error,
                        "failed to record execution failure"
                    );
                }

                error!(
                    execution = %execution_id,
                    stage = failure.stage,
                    error = %failure.error,
                    "execution failed"
                );
                Err(failure.error)
            }
        }
    }

    /// Finds or creates the attempt record for a job.
    ///
    /// At most one record per job id is non-terminal at a time: a live
    /// record is adopted in place, a terminal one (prior failed attempt)
    /// gets a fresh row with the index re-pointed.
    async fn ensure_record(&self, job: &JobData) -> Result<Uuid, EngineError> {
        match self.ledger.find_by_job(job.job_id).await? {
            Some(record) if !record.status.is_terminal() => Ok(record.id),
            Some(_) => {
                let record = ExecutionRecord::queued(job);
                self.ledger.insert(&record).await?;
                self.ledger.repoint_job(job.job_id, record.id).await?;
                Ok(record.id)
            }
            None => {
                let record = ExecutionRecord::queued(job);
                self.ledger.insert(&record).await?;
                self.ledger.register_job(job.job_id, record.id).await?;
                Ok(record.id)
            }
        }
    }

    async fn run_stages(
        &self,
        execution_id: Uuid,
        job: &JobData,
        started: Instant,
    ) -> Result<ExecutionOutcome, StageFailure> {
        // 1. Resolve the pipeline and load its spec.
        let pipeline = self
            .pipelines
            .resolve(&job.pipeline_name)
            .await
            .stage("load-pipeline")?;
        validate_inputs(&pipeline.spec, &job.inputs).stage("load-pipeline")?;

        let gateway_override;
        let gateway = match &pipeline.llm {
            Some(config) => {
                gateway_override = LlmGateway::from_config(config).stage("load-pipeline")?;
                &gateway_override
            }
            None => self.gateway.as_ref(),
        };

        // 2. Run the processor sandbox.
        let processor = self
            .pipelines
            .processor_source(&pipeline)
            .await
            .stage("run-processor")?;
        let result = match processor {
            Some((source, chunk_name)) => {
                let sandbox = ProcessorSandbox::new(
                    pipeline.dir.clone(),
                    Arc::clone(&self.cache),
                    execution_id,
                );
                sandbox
                    .run(&source, &chunk_name, &job.inputs)
                    .stage("run-processor")?
            }
            // No processor declared: the validated inputs pass through as
            // the attribute set.
            None => ProcessorResult {
                attributes: job.inputs.clone(),
                metadata: HashMap::new(),
            },
        };
        debug!(
            execution = %execution_id,
            attributes = result.attributes.len(),
            "processor finished"
        );

        // 3. Persist the attribute bundle, independent of the report.
        let bundle_path = self.pipelines.bundle_path(&pipeline.dir, execution_id);
        write_json(&bundle_path, &result).await.stage("save-bundle")?;

        // 4. Load and render every prompt template.
        let prompt_files = self
            .pipelines
            .load_prompts(&pipeline.dir)
            .await
            .stage("render-prompts")?;
        let mut prompts = Vec::with_capacity(prompt_files.len());
        for (name, text) in prompt_files {
            let rendered =
                template::render_prompt(&text, &job.inputs, &pipeline.spec.vars, &result.attributes)
                    .stage("render-prompts")?;
            prompts.push((name, rendered));
        }
        if prompts.is_empty() {
            let prompts_dir = pipeline.dir.join("prompts").to_string_lossy().to_string();
            return Err(EngineError::NoPromptsFound(prompts_dir)).stage("render-prompts");
        }

        // 5. Call the gateway with the primary prompt, asking for
        //    structured JSON.
        let primary = prompts
            .iter()
            .find(|(name, _)| name == "main")
            .unwrap_or(&prompts[0]);
        let generated = gateway
            .generate(&primary.1, true)
            .await
            .stage("llm-generate")?;

        let enrichment = LlmEnrichment {
            attributes: generated
                .json
                .as_ref()
                .and_then(|v| v.as_object())
                .map(|obj| obj.clone().into_iter().collect())
                .unwrap_or_default(),
            raw_output: generated.text,
            tokens_used: generated.tokens_used,
            model: generated.model,
            provider: generated.provider,
        };

        // 6. Assemble the render context.
        let metadata = ExecutionMetadata {
            execution_id,
            pipeline: pipeline.spec.name.clone(),
            pipeline_version: pipeline.spec.version.clone(),
            model: enrichment.model.clone(),
            generated_at: Utc::now().to_rfc3339(),
            elapsed_ms: started.elapsed().as_millis() as i64,
        };
        let context = TemplateContext {
            inputs: job.inputs.clone(),
            vars: pipeline.spec.vars.clone(),
            data: result.attributes.clone(),
            llm: enrichment.attributes.clone(),
            metadata,
        };

        // 7. Locate the report template for the requested format.
        let template_path = self
            .pipelines
            .find_report_template(&pipeline.dir, &job.output_format)
            .await
            .stage("render-report")?;

        // 8. Render and persist the report artifact.
        let template_source = tokio::fs::read_to_string(&template_path)
            .await
            .map_err(EngineError::from)
            .stage("render-report")?;
        let document = template::render_report(&template_source, &context).stage("render-report")?;

        let report_path = self
            .pipelines
            .report_path(&pipeline.dir, execution_id, &job.output_format);
        if let Some(parent) = report_path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(EngineError::from)
                .stage("render-report")?;
        }
        tokio::fs::write(&report_path, document)
            .await
            .map_err(EngineError::from)
            .stage("render-report")?;

        // 9. Completion data; the caller records it on the ledger.
        Ok(ExecutionOutcome {
            execution_id,
            output_path: report_path.to_string_lossy().to_string(),
            bundle_path: bundle_path.to_string_lossy().to_string(),
            format: job.output_format.clone(),
            model: enrichment.model,
            tokens_used: enrichment.tokens_used,
            elapsed_ms: started.elapsed().as_millis() as i64,
        })
    }
}

async fn write_json(path: &Path, value: &ProcessorResult) -> Result<(), EngineError> {
    if let Some(parent) = path.parent() {
        tokio::fs::create_dir_all(parent).await?;
    }
    let pretty = serde_json::to_string_pretty(value)
        .map_err(|e| EngineError::Ledger(format!("bundle not serializable: {e}")))?;
    tokio::fs::write(path, pretty).await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::PipelineRoot;
    use crate::testutil::{PipelineFixture, StubProvider};
    use scribe_core::domain::job::ExecutionStatus;
    use serde_json::json;
    use std::time::Duration;

    async fn setup(
        fixture: &PipelineFixture,
        provider: Arc<StubProvider>,
    ) -> (Executor, Arc<ExecutionLedger>) {
        let ledger = Arc::new(ExecutionLedger::in_memory().await.unwrap());
        let cache = Arc::new(CacheStore::new());
        let gateway = Arc::new(LlmGateway::with_provider(
            Box::new(provider),
            "stub",
            Duration::from_secs(5),
        ));
        let executor = Executor::new(
            Arc::clone(&ledger),
            cache,
            gateway,
            PipelineRoot::new(fixture.root()),
        );
        (executor, ledger)
    }

    fn demo_job() -> JobData {
        JobData::new(
            "demo",
            HashMap::from([("topic".to_string(), json!("AI"))]),
            "md",
        )
    }

    #[tokio::test]
    async fn test_end_to_end_demo_scenario() {
        let fixture = PipelineFixture::demo();
        let provider = Arc::new(StubProvider::with_text(
            r#"{"summary": "AI is..."}"#,
            Some(42),
        ));
        let (executor, ledger) = setup(&fixture, Arc::clone(&provider)).await;

        let job = demo_job();
        let outcome = executor.execute(&job).await.unwrap();

        // Report artifact persisted under output/reports/<id>.md
        assert!(
            outcome
                .output_path
                .ends_with(&format!("{}.md", outcome.execution_id))
        );
        let report = std::fs::read_to_string(&outcome.output_path).unwrap();
        assert_eq!(report, "# Report\nAI is...");

        // Bundle artifact persisted independently
        let bundle: serde_json::Value =
            serde_json::from_str(&std::fs::read_to_string(&outcome.bundle_path).unwrap()).unwrap();
        assert_eq!(bundle["attributes"]["topic"], json!("AI"));

        // Ledger reached the terminal completed state with usage captured
        let record = ledger.find_by_job(job.job_id).await.unwrap().unwrap();
        assert_eq!(record.status, ExecutionStatus::Completed);
        assert_eq!(record.tokens_used, Some(42));
        assert_eq!(record.model.as_deref(), Some("stub-1"));
        assert!(record.started_at.is_some());
        assert!(record.completed_at.is_some());
        assert_eq!(provider.calls(), 1);
    }

    #[tokio::test]
    async fn test_missing_report_template_fails_after_bundle() {
        let fixture = PipelineFixture::demo();
        let provider = Arc::new(StubProvider::with_text(r#"{"summary": "x"}"#, Some(1)));
        let (executor, ledger) = setup(&fixture, provider).await;

        let mut job = demo_job();
        job.output_format = "pdf".to_string();

        let err = executor.execute(&job).await.unwrap_err();
        assert!(matches!(err, EngineError::TemplateNotFound(_)));

        let record = ledger.find_by_job(job.job_id).await.unwrap().unwrap();
        assert_eq!(record.status, ExecutionStatus::Failed);
        let error = record.error.unwrap();
        assert!(error.contains("render-report"));
        assert!(error.contains("no report template"));

        // Bundle from stage 3 survives; no report was written.
        let record_id = record.id;
        let bundle = fixture
            .dir("demo")
            .join("output/bundles")
            .join(format!("{record_id}.json"));
        assert!(bundle.exists());
        let report = fixture
            .dir("demo")
            .join("output/reports")
            .join(format!("{record_id}.pdf"));
        assert!(!report.exists());
    }

    #[tokio::test]
    async fn test_contract_violation_short_circuits_downstream_stages() {
        let fixture = PipelineFixture::demo();
        fixture.write(
            "demo/processor.lua",
            "return function(inputs) return { metadata = {} } end",
        );
        let provider = Arc::new(StubProvider::with_text("never used", None));
        let (executor, ledger) = setup(&fixture, Arc::clone(&provider)).await;

        let job = demo_job();
        let err = executor.execute(&job).await.unwrap_err();
        assert!(matches!(err, EngineError::ProcessorContractViolation(_)));

        // No downstream stage ran: no LLM call, no bundle.
        assert_eq!(provider.calls(), 0);
        assert!(!fixture.dir("demo").join("output/bundles").exists());

        let record = ledger.find_by_job(job.job_id).await.unwrap().unwrap();
        assert_eq!(record.status, ExecutionStatus::Failed);
        assert!(record.error.unwrap().starts_with("run-processor: "));
    }

    #[tokio::test]
    async fn test_unknown_pipeline_fails_first_stage() {
        let fixture = PipelineFixture::demo();
        let provider = Arc::new(StubProvider::with_text("unused", None));
        let (executor, ledger) = setup(&fixture, provider).await;

        let mut job = demo_job();
        job.pipeline_name = "ghost".to_string();

        let err = executor.execute(&job).await.unwrap_err();
        assert!(matches!(err, EngineError::PipelineNotFound(_)));

        let record = ledger.find_by_job(job.job_id).await.unwrap().unwrap();
        assert!(record.error.unwrap().starts_with("load-pipeline: "));
    }

    #[tokio::test]
    async fn test_unparseable_llm_output_still_completes() {
        let fixture = PipelineFixture::demo();
        fixture.write(
            "demo/templates/report.md.tmpl",
            "# {{ data.topic }}\n{{ llm }}",
        );
        let provider = Arc::new(StubProvider::with_text("plain prose", Some(7)));
        let (executor, ledger) = setup(&fixture, provider).await;

        let job = demo_job();
        let outcome = executor.execute(&job).await.unwrap();
        assert_eq!(outcome.tokens_used, Some(7));

        let record = ledger.find_by_job(job.job_id).await.unwrap().unwrap();
        assert_eq!(record.status, ExecutionStatus::Completed);

        // Empty structured attributes render as an empty object.
        let report = std::fs::read_to_string(&outcome.output_path).unwrap();
        assert_eq!(report, "# AI\n{}");
    }

    #[tokio::test]
    async fn test_empty_prompts_directory_fails() {
        let fixture = PipelineFixture::demo();
        fixture.remove("demo/prompts/main.md");
        let provider = Arc::new(StubProvider::with_text("unused", None));
        let (executor, ledger) = setup(&fixture, Arc::clone(&provider)).await;

        let job = demo_job();
        let err = executor.execute(&job).await.unwrap_err();
        assert!(matches!(err, EngineError::NoPromptsFound(_)));
        assert_eq!(provider.calls(), 0);

        let record = ledger.find_by_job(job.job_id).await.unwrap().unwrap();
        assert!(record.error.unwrap().starts_with("render-prompts: "));
    }

    #[tokio::test]
    async fn test_existing_nonterminal_record_is_adopted() {
        let fixture = PipelineFixture::demo();
        let provider = Arc::new(StubProvider::with_text(r#"{"summary": "s"}"#, None));
        let (executor, ledger) = setup(&fixture, provider).await;

        // A submitter created the queued record before the worker ran.
        let job = demo_job();
        let submitted = ExecutionRecord::queued(&job);
        ledger.insert(&submitted).await.unwrap();
        assert!(ledger.register_job(job.job_id, submitted.id).await.unwrap());

        let outcome = executor.execute(&job).await.unwrap();
        assert_eq!(outcome.execution_id, submitted.id);

        // Still exactly one record for this job.
        let record = ledger.find_by_job(job.job_id).await.unwrap().unwrap();
        assert_eq!(record.id, submitted.id);
        assert_eq!(record.status, ExecutionStatus::Completed);
    }

    #[tokio::test]
    async fn test_retry_creates_fresh_record_per_attempt() {
        let fixture = PipelineFixture::demo();
        let provider = Arc::new(StubProvider::failing());
        let (executor, ledger) = setup(&fixture, provider).await;

        let job = demo_job();
        executor.execute(&job).await.unwrap_err();
        let first = ledger.find_by_job(job.job_id).await.unwrap().unwrap();
        assert_eq!(first.status, ExecutionStatus::Failed);

        // A redelivery after a terminal attempt gets its own row.
        executor.execute(&job).await.unwrap_err();
        let second = ledger.find_by_job(job.job_id).await.unwrap().unwrap();
        assert_ne!(second.id, first.id);
        assert_eq!(second.status, ExecutionStatus::Failed);

        // The first attempt's row is preserved untouched.
        let preserved = ledger.find_by_id(first.id).await.unwrap().unwrap();
        assert_eq!(preserved.status, ExecutionStatus::Failed);
    }

    #[tokio::test]
    async fn test_pipeline_without_processor_passes_inputs_through() {
        let fixture = PipelineFixture::demo();
        fixture.remove("demo/processor.lua");
        fixture.write("demo/templates/report.md.tmpl", "topic: {{ data.topic }}");
        let provider = Arc::new(StubProvider::with_text("n/a", None));
        let (executor, _ledger) = setup(&fixture, provider).await;

        let outcome = executor.execute(&demo_job()).await.unwrap();
        let report = std::fs::read_to_string(&outcome.output_path).unwrap();
        assert_eq!(report, "topic: AI");
    }
}

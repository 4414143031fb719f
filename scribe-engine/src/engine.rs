//! Engine composition root
//!
//! One long-lived struct owning one queue, one ledger, one cache, and one
//! executor, constructed once at process start and shared by reference
//! with every worker. Submissions validate inputs at the boundary, claim
//! the job's unique index slot, create the `queued` ledger record, and
//! either execute inline (synchronous callers) or enqueue for the worker
//! pool (asynchronous callers, who observe progress by polling the
//! record).

use crate::cache::CacheStore;
use crate::config::EngineConfig;
use crate::executor::Executor;
use crate::ledger::ExecutionLedger;
use crate::llm::LlmGateway;
use crate::pipeline::PipelineRoot;
use crate::queue::JobQueue;
use crate::worker::WorkerPool;
use scribe_core::EngineError;
use scribe_core::domain::job::{ExecutionRecord, JobData};
use scribe_core::domain::pipeline::validate_inputs;
use scribe_core::domain::report::ExecutionOutcome;
use std::sync::Arc;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::info;
use uuid::Uuid;

pub struct Engine {
    config: EngineConfig,
    queue: Arc<JobQueue>,
    ledger: Arc<ExecutionLedger>,
    executor: Arc<Executor>,
}

impl Engine {
    /// Builds the engine from validated configuration
    pub async fn new(config: EngineConfig) -> Result<Self, EngineError> {
        config.validate()?;
        let gateway = Arc::new(LlmGateway::from_config(&config.llm)?);
        Self::assemble(config, gateway).await
    }

    /// Builds the engine over an explicit gateway.
    ///
    /// For embedders bringing alternate transports, and for tests with
    /// stubbed providers. Skips LLM credential validation, since the
    /// gateway is already built.
    pub async fn with_gateway(
        config: EngineConfig,
        gateway: LlmGateway,
    ) -> Result<Self, EngineError> {
        Self::assemble(config, Arc::new(gateway)).await
    }

    async fn assemble(
        config: EngineConfig,
        gateway: Arc<LlmGateway>,
    ) -> Result<Self, EngineError> {
        let ledger = if config.db_path.as_os_str() == ":memory:" {
            Arc::new(ExecutionLedger::in_memory().await?)
        } else {
            Arc::new(ExecutionLedger::open(&config.db_path).await?)
        };

        let cache = Arc::new(CacheStore::new());
        let executor = Arc::new(Executor::new(
            Arc::clone(&ledger),
            cache,
            gateway,
            PipelineRoot::new(config.pipelines_dir.clone()),
        ));
        let queue = Arc::new(JobQueue::new(config.queue.clone()));

        info!(
            pipelines_dir = %config.pipelines_dir.display(),
            db_path = %config.db_path.display(),
            workers = config.workers,
            "engine assembled"
        );

        Ok(Self {
            config,
            queue,
            ledger,
            executor,
        })
    }

    /// Synchronous path: validate, record, execute inline
    pub async fn execute(&self, job: JobData) -> Result<ExecutionOutcome, EngineError> {
        self.prepare(&job).await?;
        self.executor.execute(&job).await
    }

    /// Asynchronous path: validate, record, enqueue for the worker pool
    pub async fn enqueue(&self, job: JobData) -> Result<Uuid, EngineError> {
        self.prepare(&job).await?;
        Ok(self.queue.enqueue(job))
    }

    /// Submission boundary shared by both paths.
    ///
    /// Claiming the job-index slot first makes a double submission of the
    /// same job id fail loudly instead of racing into two live records.
    async fn prepare(&self, job: &JobData) -> Result<(), EngineError> {
        let pipeline = self
            .executor
            .pipelines()
            .resolve(&job.pipeline_name)
            .await?;
        validate_inputs(&pipeline.spec, &job.inputs)?;

        let record = ExecutionRecord::queued(job);
        if !self.ledger.register_job(job.job_id, record.id).await? {
            return Err(EngineError::InvalidInput(format!(
                "job {} was already submitted",
                job.job_id
            )));
        }
        self.ledger.insert(&record).await?;

        info!(job = %job.job_id, pipeline = %job.pipeline_name, "job submitted");
        Ok(())
    }

    /// Starts the configured number of workers
    pub fn start_workers(&self, shutdown: watch::Receiver<bool>) -> Vec<JoinHandle<()>> {
        let pool = WorkerPool::new(
            Arc::clone(&self.queue),
            Arc::clone(&self.executor),
            Arc::clone(&self.ledger),
        );
        pool.spawn(self.config.workers, shutdown)
    }

    /// Stops queue delivery; idle workers drain and exit
    pub fn close_queue(&self) {
        self.queue.close();
    }

    /// Removes a not-yet-started job; its record is finalized as failed
    pub async fn cancel(&self, job_id: Uuid) -> Result<bool, EngineError> {
        if !self.queue.cancel(job_id) {
            return Ok(false);
        }

        if let Some(record) = self.ledger.find_by_job(job_id).await? {
            self.ledger
                .mark_failed(record.id, "cancelled before execution", 0)
                .await?;
        }

        info!(job = %job_id, "job cancelled");
        Ok(true)
    }

    /// Current record for a job; asynchronous callers poll this
    pub async fn status(&self, job_id: Uuid) -> Result<Option<ExecutionRecord>, EngineError> {
        self.ledger.find_by_job(job_id).await
    }

    /// Recent executions, optionally filtered by pipeline
    pub async fn history(
        &self,
        pipeline: Option<&str>,
        limit: i64,
    ) -> Result<Vec<ExecutionRecord>, EngineError> {
        self.ledger.list_recent(pipeline, limit).await
    }

    /// Pipelines available under the configured root
    pub async fn list_pipelines(&self) -> Result<Vec<String>, EngineError> {
        self.executor.pipelines().list().await
    }
}

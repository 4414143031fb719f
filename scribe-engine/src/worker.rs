//! Worker pool
//!
//! N workers consume the shared queue; each processes one job to
//! completion before taking the next. A failed attempt goes back through
//! the queue's retry path; once the budget is exhausted the job's record
//! is finalized with the exhaustion noted, and asynchronous callers
//! observe it by polling the ledger.

use crate::executor::Executor;
use crate::ledger::ExecutionLedger;
use crate::queue::{Delivery, JobQueue, RetryDecision};
use scribe_core::EngineError;
use std::sync::Arc;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

/// Spawns and owns the shared pieces each worker needs
pub struct WorkerPool {
    queue: Arc<JobQueue>,
    executor: Arc<Executor>,
    ledger: Arc<ExecutionLedger>,
}

impl WorkerPool {
    pub fn new(
        queue: Arc<JobQueue>,
        executor: Arc<Executor>,
        ledger: Arc<ExecutionLedger>,
    ) -> Self {
        Self {
            queue,
            executor,
            ledger,
        }
    }

    /// Spawns `count` workers that run until shutdown flips true
    pub fn spawn(&self, count: usize, shutdown: watch::Receiver<bool>) -> Vec<JoinHandle<()>> {
        (0..count)
            .map(|index| {
                let worker = Worker {
                    index,
                    queue: Arc::clone(&self.queue),
                    executor: Arc::clone(&self.executor),
                    ledger: Arc::clone(&self.ledger),
                };
                let shutdown = shutdown.clone();
                tokio::spawn(async move { worker.run(shutdown).await })
            })
            .collect()
    }
}

struct Worker {
    index: usize,
    queue: Arc<JobQueue>,
    executor: Arc<Executor>,
    ledger: Arc<ExecutionLedger>,
}

impl Worker {
    async fn run(&self, mut shutdown: watch::Receiver<bool>) {
        info!(worker = self.index, "worker started");

        loop {
            tokio::select! {
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                }
                delivery = self.queue.dequeue() => {
                    let Some(delivery) = delivery else { break };
                    self.process(delivery).await;
                }
            }
        }

        info!(worker = self.index, "worker stopped");
    }

    /// One job to completion: execute, then ack or route the failure
    /// through the queue's retry decision.
    async fn process(&self, delivery: Delivery) {
        let job_id = delivery.job.job_id;
        debug!(
            worker = self.index,
            job = %job_id,
            attempt = delivery.attempt,
            "picked up job"
        );

        match self.executor.execute(&delivery.job).await {
            Ok(outcome) => {
                self.queue.ack(job_id);
                debug!(
                    worker = self.index,
                    job = %job_id,
                    execution = %outcome.execution_id,
                    "job acknowledged"
                );
            }
            Err(err) => {
                warn!(
                    worker = self.index,
                    job = %job_id,
                    attempt = delivery.attempt,
                    error = %err,
                    "attempt failed"
                );

                match self.queue.nack(job_id) {
                    Some(RetryDecision::Requeued { attempt, delay }) => {
                        info!(
                            job = %job_id,
                            next_attempt = attempt,
                            delay_ms = delay.as_millis() as u64,
                            "job requeued"
                        );
                    }
                    Some(RetryDecision::Exhausted { attempts }) => {
                        self.finalize_exhausted(job_id, attempts, &err).await;
                    }
                    // Lease expired mid-flight; another worker owns the
                    // job now.
                    None => {}
                }
            }
        }
    }

    async fn finalize_exhausted(&self, job_id: uuid::Uuid, attempts: u32, last_error: &EngineError) {
        error!(job = %job_id, attempts, "retry budget exhausted");

        let message = format!(
            "{}: {last_error}",
            EngineError::QueueDeliveryExhausted(attempts)
        );

        match self.ledger.find_by_job(job_id).await {
            Ok(Some(record)) => {
                let elapsed = record.execution_time_ms.unwrap_or(0);
                if let Err(e) = self.ledger.mark_failed(record.id, &message, elapsed).await {
                    error!(job = %job_id, error = %e, "failed to finalize exhausted job");
                }
            }
            Ok(None) => {
                warn!(job = %job_id, "exhausted job has no ledger record");
            }
            Err(e) => {
                error!(job = %job_id, error = %e, "failed to look up exhausted job");
            }
        }
    }
}

//! Scribe Engine
//!
//! The execution engine behind scribe's report pipelines.
//!
//! Architecture:
//! - Ledger: SQLite execution-state store, the sole source of truth for job status
//! - Queue: in-process priority queue with lease-based at-least-once delivery
//! - Cache: keyed TTL store shared across pipeline runs
//! - Sandbox: capability-scoped Lua environment for processor scripts
//! - Gateway: uniform LLM generation over provider clients
//! - Executor: the nine-stage pipeline state machine
//! - Workers: pool consuming the queue until shutdown
//!
//! Everything is owned by a single long-lived [`Engine`] constructed once
//! at process start and shared by reference with each worker.

pub mod cache;
pub mod config;
pub mod engine;
pub mod executor;
pub mod ledger;
pub mod llm;
pub mod pipeline;
pub mod queue;
pub mod sandbox;
pub mod template;
pub mod worker;

#[cfg(test)]
mod testutil;

pub use cache::CacheStore;
pub use config::EngineConfig;
pub use engine::Engine;
pub use executor::Executor;
pub use ledger::ExecutionLedger;
pub use llm::{GenerateOutcome, LlmGateway};
pub use queue::{Delivery, JobQueue, QueueConfig, RetryDecision};
pub use worker::WorkerPool;

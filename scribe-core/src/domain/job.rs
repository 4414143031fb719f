//! Job and execution-record domain types
//!
//! Structures shared between the queue (delivery), the executor (state
//! transitions), and the ledger (persistence).

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use uuid::Uuid;

/// Delivery priority for queued jobs
///
/// Lower rank is dequeued first; within one level delivery is FIFO by
/// enqueue order.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Priority {
    High,
    #[default]
    Normal,
    Low,
}

impl Priority {
    /// Numeric rank used for queue ordering
    pub fn rank(self) -> u8 {
        match self {
            Priority::High => 0,
            Priority::Normal => 1,
            Priority::Low => 2,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Priority::High => "high",
            Priority::Normal => "normal",
            Priority::Low => "low",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "high" => Some(Priority::High),
            "normal" => Some(Priority::Normal),
            "low" => Some(Priority::Low),
            _ => None,
        }
    }
}

/// A queued execution request
///
/// Immutable once enqueued. Retries re-deliver the same data under the
/// same `job_id`; each delivery is a new attempt.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobData {
    pub job_id: Uuid,
    pub pipeline_name: String,
    pub inputs: HashMap<String, serde_json::Value>,
    pub output_format: String,
    pub user_id: Option<String>,
    #[serde(default)]
    pub priority: Priority,
    pub created_at: chrono::DateTime<chrono::Utc>,
}

impl JobData {
    pub fn new(
        pipeline_name: impl Into<String>,
        inputs: HashMap<String, serde_json::Value>,
        output_format: impl Into<String>,
    ) -> Self {
        Self {
            job_id: Uuid::new_v4(),
            pipeline_name: pipeline_name.into(),
            inputs,
            output_format: output_format.into(),
            user_id: None,
            priority: Priority::Normal,
            created_at: chrono::Utc::now(),
        }
    }

    pub fn with_priority(mut self, priority: Priority) -> Self {
        self.priority = priority;
        self
    }

    pub fn with_user(mut self, user_id: impl Into<String>) -> Self {
        self.user_id = Some(user_id.into());
        self
    }
}

/// Execution lifecycle status
///
/// Transitions are one-way: `queued → processing → completed | failed`.
/// A failed attempt is terminal for its record; a retried job gets a fresh
/// record under the same `job_id`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExecutionStatus {
    Queued,
    Processing,
    Completed,
    Failed,
}

impl ExecutionStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, ExecutionStatus::Completed | ExecutionStatus::Failed)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            ExecutionStatus::Queued => "queued",
            ExecutionStatus::Processing => "processing",
            ExecutionStatus::Completed => "completed",
            ExecutionStatus::Failed => "failed",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "queued" => Some(ExecutionStatus::Queued),
            "processing" => Some(ExecutionStatus::Processing),
            "completed" => Some(ExecutionStatus::Completed),
            "failed" => Some(ExecutionStatus::Failed),
            _ => None,
        }
    }
}

/// One ledger row per execution attempt
///
/// Created at submission (synchronous callers and enqueuers alike) or at
/// first worker pickup, mutated only by the executor that owns the current
/// attempt, never deleted by this subsystem.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutionRecord {
    pub id: Uuid,
    pub job_id: Option<Uuid>,
    pub pipeline_name: String,
    pub inputs: HashMap<String, serde_json::Value>,
    pub output_format: String,
    pub status: ExecutionStatus,
    pub priority: Option<Priority>,
    pub created_at: chrono::DateTime<chrono::Utc>,
    pub started_at: Option<chrono::DateTime<chrono::Utc>>,
    pub completed_at: Option<chrono::DateTime<chrono::Utc>>,
    pub execution_time_ms: Option<i64>,
    pub tokens_used: Option<i64>,
    pub model: Option<String>,
    pub output_path: Option<String>,
    pub bundle_path: Option<String>,
    pub error: Option<String>,
}

impl ExecutionRecord {
    /// Creates a fresh `queued` record for a job submission
    pub fn queued(job: &JobData) -> Self {
        Self {
            id: Uuid::new_v4(),
            job_id: Some(job.job_id),
            pipeline_name: job.pipeline_name.clone(),
            inputs: job.inputs.clone(),
            output_format: job.output_format.clone(),
            status: ExecutionStatus::Queued,
            priority: Some(job.priority),
            created_at: job.created_at,
            started_at: None,
            completed_at: None,
            execution_time_ms: None,
            tokens_used: None,
            model: None,
            output_path: None,
            bundle_path: None,
            error: None,
        }
    }
}

//! Execution ledger
//!
//! SQLite-backed store of execution records, one row per attempt, plus an
//! explicit `job_index` table mapping each job id to its current attempt's
//! record. The ledger is the sole source of truth for job status; rows are
//! mutated only by the executor owning the current attempt and never
//! deleted by this subsystem.

use chrono::{DateTime, Utc};
use scribe_core::EngineError;
use scribe_core::domain::job::{ExecutionRecord, ExecutionStatus, Priority};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::SqlitePool;
use std::collections::HashMap;
use std::path::Path;
use std::str::FromStr;
use uuid::Uuid;

/// Fields written when an attempt completes
#[derive(Debug, Clone)]
pub struct CompletionUpdate {
    pub completed_at: DateTime<Utc>,
    pub execution_time_ms: i64,
    pub tokens_used: Option<i64>,
    pub model: Option<String>,
    pub output_path: String,
    pub bundle_path: String,
}

pub struct ExecutionLedger {
    pool: SqlitePool,
}

impl ExecutionLedger {
    /// Opens (creating if missing) a ledger database at the given path
    pub async fn open(path: &Path) -> Result<Self, EngineError> {
        let options = SqliteConnectOptions::new()
            .filename(path)
            .create_if_missing(true);
        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect_with(options)
            .await
            .map_err(ledger_err)?;

        let ledger = Self { pool };
        ledger.migrate().await?;
        Ok(ledger)
    }

    /// In-memory ledger for tests and ephemeral runs
    ///
    /// A single connection keeps every query on the same in-memory
    /// database.
    pub async fn in_memory() -> Result<Self, EngineError> {
        let options = SqliteConnectOptions::from_str("sqlite::memory:").map_err(ledger_err)?;
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect_with(options)
            .await
            .map_err(ledger_err)?;

        let ledger = Self { pool };
        ledger.migrate().await?;
        Ok(ledger)
    }

    async fn migrate(&self) -> Result<(), EngineError> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS executions (
                id TEXT PRIMARY KEY,
                job_id TEXT,
                pipeline_name TEXT NOT NULL,
                inputs TEXT NOT NULL,
                output_format TEXT NOT NULL,
                status TEXT NOT NULL,
                priority TEXT,
                created_at TEXT NOT NULL,
                started_at TEXT,
                completed_at TEXT,
                execution_time_ms INTEGER,
                tokens_used INTEGER,
                model TEXT,
                output_path TEXT,
                bundle_path TEXT,
                error TEXT
            )
            "#,
        )
        .execute(&self.pool)
        .await
        .map_err(ledger_err)?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS job_index (
                job_id TEXT PRIMARY KEY,
                execution_id TEXT NOT NULL
            )
            "#,
        )
        .execute(&self.pool)
        .await
        .map_err(ledger_err)?;

        Ok(())
    }

    /// Inserts a new attempt row
    pub async fn insert(&self, record: &ExecutionRecord) -> Result<(), EngineError> {
        let inputs = serde_json::to_string(&record.inputs)
            .map_err(|e| EngineError::Ledger(e.to_string()))?;

        sqlx::query(
            r#"
            INSERT INTO executions (
                id, job_id, pipeline_name, inputs, output_format, status,
                priority, created_at, started_at, completed_at,
                execution_time_ms, tokens_used, model, output_path,
                bundle_path, error
            )
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(record.id.to_string())
        .bind(record.job_id.map(|id| id.to_string()))
        .bind(&record.pipeline_name)
        .bind(inputs)
        .bind(&record.output_format)
        .bind(record.status.as_str())
        .bind(record.priority.map(|p| p.as_str()))
        .bind(record.created_at)
        .bind(record.started_at)
        .bind(record.completed_at)
        .bind(record.execution_time_ms)
        .bind(record.tokens_used)
        .bind(&record.model)
        .bind(&record.output_path)
        .bind(&record.bundle_path)
        .bind(&record.error)
        .execute(&self.pool)
        .await
        .map_err(ledger_err)?;

        Ok(())
    }

    /// Claims the job-id slot for a record.
    ///
    /// Returns `false` when another record already holds it — the
    /// uniqueness constraint that keeps two submitters racing on the same
    /// job id from ever creating two live executions.
    pub async fn register_job(
        &self,
        job_id: Uuid,
        execution_id: Uuid,
    ) -> Result<bool, EngineError> {
        let result = sqlx::query(
            "INSERT OR IGNORE INTO job_index (job_id, execution_id) VALUES (?, ?)",
        )
        .bind(job_id.to_string())
        .bind(execution_id.to_string())
        .execute(&self.pool)
        .await
        .map_err(ledger_err)?;

        Ok(result.rows_affected() > 0)
    }

    /// Re-points the job index at a new attempt's record.
    ///
    /// Legal only when the previous attempt's record is terminal; the
    /// executor checks that before calling.
    pub async fn repoint_job(&self, job_id: Uuid, execution_id: Uuid) -> Result<(), EngineError> {
        sqlx::query("UPDATE job_index SET execution_id = ? WHERE job_id = ?")
            .bind(execution_id.to_string())
            .bind(job_id.to_string())
            .execute(&self.pool)
            .await
            .map_err(ledger_err)?;

        Ok(())
    }

    pub async fn find_by_id(&self, id: Uuid) -> Result<Option<ExecutionRecord>, EngineError> {
        let row = sqlx::query_as::<_, ExecutionRow>(
            "SELECT * FROM executions WHERE id = ?",
        )
        .bind(id.to_string())
        .fetch_optional(&self.pool)
        .await
        .map_err(ledger_err)?;

        Ok(row.map(|r| r.into()))
    }

    /// Looks up the current attempt's record for a job via the index
    pub async fn find_by_job(&self, job_id: Uuid) -> Result<Option<ExecutionRecord>, EngineError> {
        let row = sqlx::query_as::<_, ExecutionRow>(
            r#"
            SELECT e.* FROM executions e
            JOIN job_index j ON j.execution_id = e.id
            WHERE j.job_id = ?
            "#,
        )
        .bind(job_id.to_string())
        .fetch_optional(&self.pool)
        .await
        .map_err(ledger_err)?;

        Ok(row.map(|r| r.into()))
    }

    /// Marks an attempt as started
    pub async fn mark_processing(
        &self,
        id: Uuid,
        started_at: DateTime<Utc>,
    ) -> Result<(), EngineError> {
        sqlx::query("UPDATE executions SET status = ?, started_at = ? WHERE id = ?")
            .bind(ExecutionStatus::Processing.as_str())
            .bind(started_at)
            .bind(id.to_string())
            .execute(&self.pool)
            .await
            .map_err(ledger_err)?;

        Ok(())
    }

    /// Marks an attempt completed with its artifacts and usage
    pub async fn mark_completed(
        &self,
        id: Uuid,
        update: CompletionUpdate,
    ) -> Result<(), EngineError> {
        sqlx::query(
            r#"
            UPDATE executions
            SET status = ?, completed_at = ?, execution_time_ms = ?,
                tokens_used = ?, model = ?, output_path = ?, bundle_path = ?
            WHERE id = ?
            "#,
        )
        .bind(ExecutionStatus::Completed.as_str())
        .bind(update.completed_at)
        .bind(update.execution_time_ms)
        .bind(update.tokens_used)
        .bind(&update.model)
        .bind(&update.output_path)
        .bind(&update.bundle_path)
        .bind(id.to_string())
        .execute(&self.pool)
        .await
        .map_err(ledger_err)?;

        Ok(())
    }

    /// Marks an attempt failed with the captured error
    pub async fn mark_failed(
        &self,
        id: Uuid,
        error: &str,
        execution_time_ms: i64,
    ) -> Result<(), EngineError> {
        sqlx::query(
            r#"
            UPDATE executions
            SET status = ?, completed_at = ?, execution_time_ms = ?, error = ?
            WHERE id = ?
            "#,
        )
        .bind(ExecutionStatus::Failed.as_str())
        .bind(Utc::now())
        .bind(execution_time_ms)
        .bind(error)
        .bind(id.to_string())
        .execute(&self.pool)
        .await
        .map_err(ledger_err)?;

        Ok(())
    }

    /// Recent executions, newest first, optionally filtered by pipeline
    pub async fn list_recent(
        &self,
        pipeline_name: Option<&str>,
        limit: i64,
    ) -> Result<Vec<ExecutionRecord>, EngineError> {
        let rows = match pipeline_name {
            Some(name) => {
                sqlx::query_as::<_, ExecutionRow>(
                    r#"
                    SELECT * FROM executions
                    WHERE pipeline_name = ?
                    ORDER BY created_at DESC LIMIT ?
                    "#,
                )
                .bind(name)
                .bind(limit)
                .fetch_all(&self.pool)
                .await
            }
            None => {
                sqlx::query_as::<_, ExecutionRow>(
                    "SELECT * FROM executions ORDER BY created_at DESC LIMIT ?",
                )
                .bind(limit)
                .fetch_all(&self.pool)
                .await
            }
        }
        .map_err(ledger_err)?;

        Ok(rows.into_iter().map(|r| r.into()).collect())
    }
}

fn ledger_err(err: sqlx::Error) -> EngineError {
    EngineError::Ledger(err.to_string())
}

// =============================================================================
// Database Row Types
// =============================================================================

#[derive(sqlx::FromRow)]
struct ExecutionRow {
    id: String,
    job_id: Option<String>,
    pipeline_name: String,
    inputs: String,
    output_format: String,
    status: String,
    priority: Option<String>,
    created_at: DateTime<Utc>,
    started_at: Option<DateTime<Utc>>,
    completed_at: Option<DateTime<Utc>>,
    execution_time_ms: Option<i64>,
    tokens_used: Option<i64>,
    model: Option<String>,
    output_path: Option<String>,
    bundle_path: Option<String>,
    error: Option<String>,
}

impl From<ExecutionRow> for ExecutionRecord {
    fn from(row: ExecutionRow) -> Self {
        let inputs: HashMap<String, serde_json::Value> =
            serde_json::from_str(&row.inputs).unwrap_or_default();

        ExecutionRecord {
            id: Uuid::parse_str(&row.id).unwrap_or_else(|_| Uuid::nil()),
            job_id: row.job_id.and_then(|id| Uuid::parse_str(&id).ok()),
            pipeline_name: row.pipeline_name,
            inputs,
            output_format: row.output_format,
            status: ExecutionStatus::from_str(&row.status).unwrap_or(ExecutionStatus::Failed),
            priority: row.priority.as_deref().and_then(Priority::from_str),
            created_at: row.created_at,
            started_at: row.started_at,
            completed_at: row.completed_at,
            execution_time_ms: row.execution_time_ms,
            tokens_used: row.tokens_used,
            model: row.model,
            output_path: row.output_path,
            bundle_path: row.bundle_path,
            error: row.error,
        }
    }
}

//! SQLite run repository implementation.
//!
//! Implements `RunRepository` from `trainflow-core` using sqlx with split
//! read/write pools. Trigger payloads and produced artifacts are stored as
//! JSON text columns.

use chrono::{DateTime, Utc};
use sqlx::Row;
use trainflow_core::repository::run::RunRepository;
use trainflow_types::artifact::ProducedArtifact;
use trainflow_types::error::RepositoryError;
use trainflow_types::workflow::{JobRunLog, JobStatus, WorkflowRun, WorkflowRunStatus};
use uuid::Uuid;

use super::pool::DatabasePool;

/// SQLite-backed implementation of `RunRepository`.
#[derive(Clone)]
pub struct SqliteRunRepository {
    pool: DatabasePool,
}

impl SqliteRunRepository {
    pub fn new(pool: DatabasePool) -> Self {
        Self { pool }
    }
}

// ---------------------------------------------------------------------------
// Internal row types
// ---------------------------------------------------------------------------

struct RunRow {
    id: String,
    workflow_name: String,
    status: String,
    trigger_type: String,
    trigger_payload: Option<String>,
    started_at: String,
    finished_at: Option<String>,
    error: Option<String>,
}

impl RunRow {
    fn from_row(row: &sqlx::sqlite::SqliteRow) -> Result<Self, sqlx::Error> {
        Ok(Self {
            id: row.try_get("id")?,
            workflow_name: row.try_get("workflow_name")?,
            status: row.try_get("status")?,
            trigger_type: row.try_get("trigger_type")?,
            trigger_payload: row.try_get("trigger_payload")?,
            started_at: row.try_get("started_at")?,
            finished_at: row.try_get("finished_at")?,
            error: row.try_get("error")?,
        })
    }

    fn into_run(self) -> Result<WorkflowRun, RepositoryError> {
        let status: WorkflowRunStatus =
            serde_json::from_value(serde_json::Value::String(self.status.clone()))
                .map_err(|_| RepositoryError::Query(format!("invalid run status: {}", self.status)))?;

        let trigger_payload = self
            .trigger_payload
            .as_deref()
            .map(|s| {
                serde_json::from_str(s)
                    .map_err(|e| RepositoryError::Query(format!("invalid trigger payload: {e}")))
            })
            .transpose()?;

        Ok(WorkflowRun {
            id: parse_uuid(&self.id)?,
            workflow_name: self.workflow_name,
            status,
            trigger_type: self.trigger_type,
            trigger_payload,
            started_at: parse_datetime(&self.started_at)?,
            finished_at: self.finished_at.as_deref().map(parse_datetime).transpose()?,
            error: self.error,
        })
    }
}

struct JobRow {
    id: String,
    run_id: String,
    job_name: String,
    status: String,
    instance_type: Option<String>,
    exit_code: Option<i64>,
    artifacts: String,
    error: Option<String>,
    started_at: Option<String>,
    finished_at: Option<String>,
}

impl JobRow {
    fn from_row(row: &sqlx::sqlite::SqliteRow) -> Result<Self, sqlx::Error> {
        Ok(Self {
            id: row.try_get("id")?,
            run_id: row.try_get("run_id")?,
            job_name: row.try_get("job_name")?,
            status: row.try_get("status")?,
            instance_type: row.try_get("instance_type")?,
            exit_code: row.try_get("exit_code")?,
            artifacts: row.try_get("artifacts")?,
            error: row.try_get("error")?,
            started_at: row.try_get("started_at")?,
            finished_at: row.try_get("finished_at")?,
        })
    }

    fn into_log(self) -> Result<JobRunLog, RepositoryError> {
        let status: JobStatus =
            serde_json::from_value(serde_json::Value::String(self.status.clone()))
                .map_err(|_| RepositoryError::Query(format!("invalid job status: {}", self.status)))?;

        let artifacts: Vec<ProducedArtifact> = serde_json::from_str(&self.artifacts)
            .map_err(|e| RepositoryError::Query(format!("invalid job artifacts: {e}")))?;

        let exit_code = self
            .exit_code
            .map(|c| {
                i32::try_from(c)
                    .map_err(|_| RepositoryError::Query(format!("exit code out of range: {c}")))
            })
            .transpose()?;

        Ok(JobRunLog {
            id: parse_uuid(&self.id)?,
            run_id: parse_uuid(&self.run_id)?,
            job_name: self.job_name,
            status,
            instance_type: self.instance_type,
            exit_code,
            artifacts,
            error: self.error,
            started_at: self.started_at.as_deref().map(parse_datetime).transpose()?,
            finished_at: self.finished_at.as_deref().map(parse_datetime).transpose()?,
        })
    }
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn parse_uuid(s: &str) -> Result<Uuid, RepositoryError> {
    s.parse::<Uuid>()
        .map_err(|e| RepositoryError::Query(format!("invalid UUID: {e}")))
}

fn parse_datetime(s: &str) -> Result<DateTime<Utc>, RepositoryError> {
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| RepositoryError::Query(format!("invalid datetime: {e}")))
}

fn format_datetime(dt: &DateTime<Utc>) -> String {
    dt.to_rfc3339()
}

fn rows_into_runs(rows: &[sqlx::sqlite::SqliteRow]) -> Result<Vec<WorkflowRun>, RepositoryError> {
    let mut runs = Vec::with_capacity(rows.len());
    for row in rows {
        let r = RunRow::from_row(row).map_err(|e| RepositoryError::Query(e.to_string()))?;
        runs.push(r.into_run()?);
    }
    Ok(runs)
}

// ---------------------------------------------------------------------------
// RunRepository impl
// ---------------------------------------------------------------------------

impl RunRepository for SqliteRunRepository {
    async fn create_run(&self, run: &WorkflowRun) -> Result<(), RepositoryError> {
        let trigger_payload = run
            .trigger_payload
            .as_ref()
            .map(serde_json::to_string)
            .transpose()
            .map_err(|e| RepositoryError::Query(e.to_string()))?;

        sqlx::query(
            r#"INSERT INTO workflow_runs
               (id, workflow_name, status, trigger_type, trigger_payload, started_at, finished_at, error)
               VALUES (?, ?, ?, ?, ?, ?, ?, ?)"#,
        )
        .bind(run.id.to_string())
        .bind(&run.workflow_name)
        .bind(run.status.as_str())
        .bind(&run.trigger_type)
        .bind(&trigger_payload)
        .bind(format_datetime(&run.started_at))
        .bind(run.finished_at.as_ref().map(format_datetime))
        .bind(&run.error)
        .execute(&self.pool.writer)
        .await
        .map_err(|e| match e {
            sqlx::Error::Database(db) if db.is_unique_violation() => {
                RepositoryError::Conflict(format!("run {} already exists", run.id))
            }
            other => RepositoryError::Query(other.to_string()),
        })?;

        Ok(())
    }

    async fn update_run_status(
        &self,
        run_id: &Uuid,
        status: WorkflowRunStatus,
        error: Option<&str>,
    ) -> Result<(), RepositoryError> {
        let finished_at = status
            .is_terminal()
            .then(|| format_datetime(&Utc::now()));

        let result = sqlx::query(
            "UPDATE workflow_runs SET status = ?, error = ?, finished_at = COALESCE(?, finished_at) WHERE id = ?",
        )
        .bind(status.as_str())
        .bind(error)
        .bind(&finished_at)
        .bind(run_id.to_string())
        .execute(&self.pool.writer)
        .await
        .map_err(|e| RepositoryError::Query(e.to_string()))?;

        if result.rows_affected() == 0 {
            return Err(RepositoryError::NotFound);
        }
        Ok(())
    }

    async fn get_run(&self, run_id: &Uuid) -> Result<Option<WorkflowRun>, RepositoryError> {
        let row = sqlx::query("SELECT * FROM workflow_runs WHERE id = ?")
            .bind(run_id.to_string())
            .fetch_optional(&self.pool.reader)
            .await
            .map_err(|e| RepositoryError::Query(e.to_string()))?;

        match row {
            Some(row) => {
                let r = RunRow::from_row(&row).map_err(|e| RepositoryError::Query(e.to_string()))?;
                Ok(Some(r.into_run()?))
            }
            None => Ok(None),
        }
    }

    async fn list_runs(
        &self,
        workflow_name: Option<&str>,
        limit: u32,
    ) -> Result<Vec<WorkflowRun>, RepositoryError> {
        // UUIDv7 ids sort by creation time, which breaks ties between runs
        // started within the same timestamp.
        let rows = match workflow_name {
            Some(name) => {
                sqlx::query(
                    "SELECT * FROM workflow_runs WHERE workflow_name = ? ORDER BY started_at DESC, id DESC LIMIT ?",
                )
                .bind(name)
                .bind(i64::from(limit))
                .fetch_all(&self.pool.reader)
                .await
            }
            None => {
                sqlx::query("SELECT * FROM workflow_runs ORDER BY started_at DESC, id DESC LIMIT ?")
                    .bind(i64::from(limit))
                    .fetch_all(&self.pool.reader)
                    .await
            }
        }
        .map_err(|e| RepositoryError::Query(e.to_string()))?;

        rows_into_runs(&rows)
    }

    async fn list_interrupted_runs(&self) -> Result<Vec<WorkflowRun>, RepositoryError> {
        let rows = sqlx::query(
            "SELECT * FROM workflow_runs WHERE status IN ('pending', 'running') ORDER BY started_at ASC, id ASC",
        )
        .fetch_all(&self.pool.reader)
        .await
        .map_err(|e| RepositoryError::Query(e.to_string()))?;

        rows_into_runs(&rows)
    }

    async fn create_job_log(&self, log: &JobRunLog) -> Result<(), RepositoryError> {
        let artifacts = serde_json::to_string(&log.artifacts)
            .map_err(|e| RepositoryError::Query(e.to_string()))?;

        sqlx::query(
            r#"INSERT INTO job_runs
               (id, run_id, job_name, status, instance_type, exit_code, artifacts, error, started_at, finished_at)
               VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)"#,
        )
        .bind(log.id.to_string())
        .bind(log.run_id.to_string())
        .bind(&log.job_name)
        .bind(log.status.as_str())
        .bind(&log.instance_type)
        .bind(log.exit_code)
        .bind(&artifacts)
        .bind(&log.error)
        .bind(log.started_at.as_ref().map(format_datetime))
        .bind(log.finished_at.as_ref().map(format_datetime))
        .execute(&self.pool.writer)
        .await
        .map_err(|e| match e {
            sqlx::Error::Database(db) if db.is_unique_violation() => RepositoryError::Conflict(
                format!("job '{}' already logged for run {}", log.job_name, log.run_id),
            ),
            other => RepositoryError::Query(other.to_string()),
        })?;

        Ok(())
    }

    async fn mark_job_started(
        &self,
        log_id: &Uuid,
        instance_type: Option<&str>,
    ) -> Result<(), RepositoryError> {
        let result = sqlx::query(
            "UPDATE job_runs SET status = 'running', instance_type = ?, started_at = ? WHERE id = ?",
        )
        .bind(instance_type)
        .bind(format_datetime(&Utc::now()))
        .bind(log_id.to_string())
        .execute(&self.pool.writer)
        .await
        .map_err(|e| RepositoryError::Query(e.to_string()))?;

        if result.rows_affected() == 0 {
            return Err(RepositoryError::NotFound);
        }
        Ok(())
    }

    async fn finish_job(
        &self,
        log_id: &Uuid,
        status: JobStatus,
        exit_code: Option<i32>,
        artifacts: &[ProducedArtifact],
        error: Option<&str>,
    ) -> Result<(), RepositoryError> {
        let artifacts =
            serde_json::to_string(artifacts).map_err(|e| RepositoryError::Query(e.to_string()))?;

        let result = sqlx::query(
            "UPDATE job_runs SET status = ?, exit_code = ?, artifacts = ?, error = ?, finished_at = ? WHERE id = ?",
        )
        .bind(status.as_str())
        .bind(exit_code)
        .bind(&artifacts)
        .bind(error)
        .bind(format_datetime(&Utc::now()))
        .bind(log_id.to_string())
        .execute(&self.pool.writer)
        .await
        .map_err(|e| RepositoryError::Query(e.to_string()))?;

        if result.rows_affected() == 0 {
            return Err(RepositoryError::NotFound);
        }
        Ok(())
    }

    async fn list_job_logs(&self, run_id: &Uuid) -> Result<Vec<JobRunLog>, RepositoryError> {
        let rows = sqlx::query("SELECT * FROM job_runs WHERE run_id = ? ORDER BY job_name ASC")
            .bind(run_id.to_string())
            .fetch_all(&self.pool.reader)
            .await
            .map_err(|e| RepositoryError::Query(e.to_string()))?;

        let mut logs = Vec::with_capacity(rows.len());
        for row in &rows {
            let r = JobRow::from_row(row).map_err(|e| RepositoryError::Query(e.to_string()))?;
            logs.push(r.into_log()?);
        }
        Ok(logs)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

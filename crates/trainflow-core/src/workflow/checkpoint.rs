//! Durable checkpoint manager for workflow runs.
//!
//! Wraps `RunRepository` to record every run and job transition (pending ->
//! running -> succeeded/failed/skipped/cancelled) so that `tflow runs` can
//! report history and runs interrupted by a crash can be closed out on the
//! next start.

use std::collections::HashMap;

use chrono::Utc;
use trainflow_types::artifact::ProducedArtifact;
use trainflow_types::workflow::{JobRunLog, JobStatus, WorkflowRun, WorkflowRunStatus};
use uuid::Uuid;

use crate::repository::run::RunRepository;

/// Error recorded on runs found unfinished at startup.
pub const INTERRUPTED_ERROR: &str = "interrupted: engine stopped before the run finished";

// ---------------------------------------------------------------------------
// CheckpointManager
// ---------------------------------------------------------------------------

/// Records execution checkpoints for workflow runs.
///
/// Generic over `R: RunRepository` so it works with SQLite in production and
/// an in-memory repository in tests.
pub struct CheckpointManager<R: RunRepository> {
    repo: R,
}

impl<R: RunRepository> CheckpointManager<R> {
    pub fn new(repo: R) -> Self {
        Self { repo }
    }

    /// Access the underlying repository.
    pub fn repo(&self) -> &R {
        &self.repo
    }

    // -----------------------------------------------------------------------
    // Run-level checkpoints
    // -----------------------------------------------------------------------

    /// Create the run record in `running` status.
    pub async fn create_run(
        &self,
        workflow_name: &str,
        trigger_type: &str,
        trigger_payload: Option<serde_json::Value>,
    ) -> Result<WorkflowRun, CheckpointError> {
        let run = WorkflowRun {
            id: Uuid::now_v7(),
            workflow_name: workflow_name.to_string(),
            status: WorkflowRunStatus::Running,
            trigger_type: trigger_type.to_string(),
            trigger_payload,
            started_at: Utc::now(),
            finished_at: None,
            error: None,
        };

        self.repo
            .create_run(&run)
            .await
            .map_err(|e| CheckpointError::Repository(e.to_string()))?;

        tracing::debug!(run_id = %run.id, workflow = workflow_name, "checkpointed run start");
        Ok(run)
    }

    /// Record the run's terminal status.
    pub async fn run_finished(
        &self,
        run_id: Uuid,
        status: WorkflowRunStatus,
        error: Option<&str>,
    ) -> Result<(), CheckpointError> {
        self.repo
            .update_run_status(&run_id, status, error)
            .await
            .map_err(|e| CheckpointError::Repository(e.to_string()))?;

        tracing::debug!(run_id = %run_id, status = status.as_str(), "checkpointed run status");
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Job-level checkpoints
    // -----------------------------------------------------------------------

    /// Create a `pending` log for every job so the run's full shape is
    /// visible before anything starts. Returns job name -> log id.
    pub async fn register_jobs<'a>(
        &self,
        run_id: Uuid,
        jobs: impl IntoIterator<Item = &'a str>,
    ) -> Result<HashMap<String, Uuid>, CheckpointError> {
        let mut ids = HashMap::new();
        for job in jobs {
            let log = JobRunLog {
                id: Uuid::now_v7(),
                run_id,
                job_name: job.to_string(),
                status: JobStatus::Pending,
                instance_type: None,
                exit_code: None,
                artifacts: Vec::new(),
                error: None,
                started_at: None,
                finished_at: None,
            };
            self.repo
                .create_job_log(&log)
                .await
                .map_err(|e| CheckpointError::Repository(e.to_string()))?;
            ids.insert(job.to_string(), log.id);
        }
        Ok(ids)
    }

    /// Pending -> running.
    pub async fn job_started(
        &self,
        log_id: Uuid,
        instance_type: Option<&str>,
    ) -> Result<(), CheckpointError> {
        self.repo
            .mark_job_started(&log_id, instance_type)
            .await
            .map_err(|e| CheckpointError::Repository(e.to_string()))?;
        tracing::debug!(log_id = %log_id, "checkpointed job start");
        Ok(())
    }

    pub async fn job_succeeded(
        &self,
        log_id: Uuid,
        artifacts: &[ProducedArtifact],
    ) -> Result<(), CheckpointError> {
        self.finish(log_id, JobStatus::Succeeded, Some(0), artifacts, None)
            .await
    }

    /// `exit_code` is `None` when the process never produced one (spawn
    /// failure, timeout, artifact error).
    pub async fn job_failed(
        &self,
        log_id: Uuid,
        exit_code: Option<i32>,
        error: &str,
    ) -> Result<(), CheckpointError> {
        self.finish(log_id, JobStatus::Failed, exit_code, &[], Some(error))
            .await
    }

    pub async fn job_skipped(&self, log_id: Uuid, caused_by: &str) -> Result<(), CheckpointError> {
        let reason = format!("skipped: upstream job '{caused_by}' did not succeed");
        self.finish(log_id, JobStatus::Skipped, None, &[], Some(&reason))
            .await
    }

    pub async fn job_cancelled(&self, log_id: Uuid) -> Result<(), CheckpointError> {
        self.finish(log_id, JobStatus::Cancelled, None, &[], Some("run cancelled"))
            .await
    }

    async fn finish(
        &self,
        log_id: Uuid,
        status: JobStatus,
        exit_code: Option<i32>,
        artifacts: &[ProducedArtifact],
        error: Option<&str>,
    ) -> Result<(), CheckpointError> {
        self.repo
            .finish_job(&log_id, status, exit_code, artifacts, error)
            .await
            .map_err(|e| CheckpointError::Repository(e.to_string()))?;
        tracing::debug!(log_id = %log_id, status = status.as_str(), "checkpointed job finish");
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Recovery
    // -----------------------------------------------------------------------

    /// Mark every run left `pending` or `running` as failed. Its jobs that
    /// were running become failed, jobs that never started become cancelled.
    /// Returns the ids of the runs that were closed out.
    pub async fn recover_interrupted(&self) -> Result<Vec<Uuid>, CheckpointError> {
        let runs = self
            .repo
            .list_interrupted_runs()
            .await
            .map_err(|e| CheckpointError::Repository(e.to_string()))?;

        let mut recovered = Vec::with_capacity(runs.len());
        for run in runs {
            let jobs = self
                .repo
                .list_job_logs(&run.id)
                .await
                .map_err(|e| CheckpointError::Repository(e.to_string()))?;
            for job in jobs.iter().filter(|j| !j.status.is_terminal()) {
                let status = match job.status {
                    JobStatus::Running => JobStatus::Failed,
                    _ => JobStatus::Cancelled,
                };
                self.finish(job.id, status, None, &[], Some(INTERRUPTED_ERROR))
                    .await?;
            }
            self.run_finished(run.id, WorkflowRunStatus::Failed, Some(INTERRUPTED_ERROR))
                .await?;
            tracing::warn!(run_id = %run.id, workflow = %run.workflow_name, "marked interrupted run as failed");
            recovered.push(run.id);
        }
        Ok(recovered)
    }

    /// Fetch a run and its job logs.
    pub async fn load_run(
        &self,
        run_id: Uuid,
    ) -> Result<(WorkflowRun, Vec<JobRunLog>), CheckpointError> {
        let run = self
            .repo
            .get_run(&run_id)
            .await
            .map_err(|e| CheckpointError::Repository(e.to_string()))?
            .ok_or(CheckpointError::RunNotFound(run_id))?;
        let jobs = self
            .repo
            .list_job_logs(&run_id)
            .await
            .map_err(|e| CheckpointError::Repository(e.to_string()))?;
        Ok((run, jobs))
    }
}

// ---------------------------------------------------------------------------
// Error type
// ---------------------------------------------------------------------------

/// Errors that can occur during checkpoint operations.
#[derive(Debug, thiserror::Error)]
pub enum CheckpointError {
    /// Underlying repository operation failed.
    #[error("checkpoint repository error: {0}")]
    Repository(String),

    #[error("workflow run not found: {0}")]
    RunNotFound(Uuid),
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

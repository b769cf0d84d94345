//! Run repository trait definition.
//!
//! Defines the storage interface for workflow runs and per-job logs. The
//! infrastructure layer (trainflow-infra) implements this trait with SQLite
//! persistence.

use trainflow_types::artifact::ProducedArtifact;
use trainflow_types::error::RepositoryError;
use trainflow_types::workflow::{JobRunLog, JobStatus, WorkflowRun, WorkflowRunStatus};
use uuid::Uuid;

/// Repository trait for run history persistence.
///
/// Covers two entity families:
/// - **Runs:** Create/update/query workflow execution instances.
/// - **Jobs:** Create/update/query per-job execution logs.
///
/// Uses native async fn in traits (Rust 2024 edition, no async_trait macro).
pub trait RunRepository: Send + Sync {
    // -----------------------------------------------------------------------
    // Runs
    // -----------------------------------------------------------------------

    /// Create a new workflow run record.
    fn create_run(
        &self,
        run: &WorkflowRun,
    ) -> impl std::future::Future<Output = Result<(), RepositoryError>> + Send;

    /// Update a run's status (and optionally its error message).
    ///
    /// Terminal statuses also stamp `finished_at`.
    fn update_run_status(
        &self,
        run_id: &Uuid,
        status: WorkflowRunStatus,
        error: Option<&str>,
    ) -> impl std::future::Future<Output = Result<(), RepositoryError>> + Send;

    /// Get a workflow run by its UUID.
    fn get_run(
        &self,
        run_id: &Uuid,
    ) -> impl std::future::Future<Output = Result<Option<WorkflowRun>, RepositoryError>> + Send;

    /// List runs, newest first, optionally filtered by workflow name.
    fn list_runs(
        &self,
        workflow_name: Option<&str>,
        limit: u32,
    ) -> impl std::future::Future<Output = Result<Vec<WorkflowRun>, RepositoryError>> + Send;

    /// List runs left in `pending` or `running` status (crash recovery).
    fn list_interrupted_runs(
        &self,
    ) -> impl std::future::Future<Output = Result<Vec<WorkflowRun>, RepositoryError>> + Send;

    // -----------------------------------------------------------------------
    // Jobs
    // -----------------------------------------------------------------------

    /// Create a new job log entry.
    fn create_job_log(
        &self,
        log: &JobRunLog,
    ) -> impl std::future::Future<Output = Result<(), RepositoryError>> + Send;

    /// Mark a job as running on the given instance type.
    fn mark_job_started(
        &self,
        log_id: &Uuid,
        instance_type: Option<&str>,
    ) -> impl std::future::Future<Output = Result<(), RepositoryError>> + Send;

    /// Record a job's final status, exit code, produced artifacts and error.
    fn finish_job(
        &self,
        log_id: &Uuid,
        status: JobStatus,
        exit_code: Option<i32>,
        artifacts: &[ProducedArtifact],
        error: Option<&str>,
    ) -> impl std::future::Future<Output = Result<(), RepositoryError>> + Send;

    /// List all job logs for a run, ordered by job name.
    fn list_job_logs(
        &self,
        run_id: &Uuid,
    ) -> impl std::future::Future<Output = Result<Vec<JobRunLog>, RepositoryError>> + Send;
}

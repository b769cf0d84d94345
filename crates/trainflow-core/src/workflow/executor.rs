//! Workflow executor: ready-set DAG execution with durable checkpointing.
//!
//! The `DagExecutor` starts every job the moment its last `needs` entry has
//! succeeded. Started jobs run concurrently on a `tokio::JoinSet`, bounded by
//! `max_parallel_jobs`. Each transition is checkpointed through
//! `CheckpointManager` and published on the `EventBus`.
//!
//! # Execution flow
//!
//! 1. Validate the definition (no job runs for an invalid workflow).
//! 2. Create the `WorkflowRun` record and a pending log per job.
//! 3. Launch ready jobs in name order while permits are available:
//!    resolve inputs, allocate output directories, build the invocation.
//! 4. On success, commit dataset outputs and release dependents.
//! 5. On failure, mark every transitive dependent `skipped`.
//! 6. On cancellation, stop launching; running jobs are killed, the rest are
//!    reported `cancelled`.
//! 7. Release run volumes and record the run's final status.

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};

use dashmap::DashMap;
use serde_json::Value;
use tokio::sync::{OwnedSemaphorePermit, Semaphore};
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use trainflow_types::artifact::{ArtifactKind, DatasetRef, ProducedArtifact};
use trainflow_types::config::TrainflowConfig;
use trainflow_types::error::ArtifactError;
use trainflow_types::event::WorkflowEvent;
use trainflow_types::workflow::{
    InputSpec, JobDefinition, JobStatus, WorkflowDefinition, WorkflowRunStatus,
};
use uuid::Uuid;

use crate::artifact::ArtifactStore;
use crate::event::bus::EventBus;
use crate::repository::run::RunRepository;
use crate::runner::{JobInvocation, JobOutcome, JobRunner, Mount, RunnerError};

use super::checkpoint::{CheckpointError, CheckpointManager};
use super::dag::JobGraph;
use super::definition::{WorkflowError, validate_definition};
use super::invocation::build_invocation;

// ---------------------------------------------------------------------------
// WorkflowExecutor trait
// ---------------------------------------------------------------------------

/// Trait for workflow execution engines.
///
/// Uses RPITIT (return-position `impl Trait` in traits) for async methods,
/// consistent with the project's Rust 2024 edition approach.
pub trait WorkflowExecutor: Send + Sync {
    /// Execute a workflow definition to completion.
    ///
    /// Job failures are reported in the returned `ExecutionResult`; an `Err`
    /// means the engine itself could not proceed.
    fn execute(
        &self,
        definition: &WorkflowDefinition,
        trigger_type: &str,
        trigger_payload: Option<Value>,
    ) -> impl std::future::Future<Output = Result<ExecutionResult, ExecutorError>> + Send;

    /// Cancel a running workflow.
    fn cancel(
        &self,
        run_id: Uuid,
    ) -> impl std::future::Future<Output = Result<(), ExecutorError>> + Send;
}

// ---------------------------------------------------------------------------
// Options and results
// ---------------------------------------------------------------------------

/// Engine settings that apply to every run.
#[derive(Debug, Clone)]
pub struct ExecutorOptions {
    /// Upper bound on concurrently running jobs within a run.
    pub max_parallel_jobs: usize,
    /// Fail a job that runs longer than this.
    pub job_timeout: Option<Duration>,
    /// Keep run volumes after the run finishes.
    pub keep_volumes: bool,
    /// Tier for jobs whose workflow sets none.
    pub default_instance_type: Option<String>,
}

impl Default for ExecutorOptions {
    fn default() -> Self {
        Self {
            max_parallel_jobs: 4,
            job_timeout: None,
            keep_volumes: false,
            default_instance_type: None,
        }
    }
}

impl From<&TrainflowConfig> for ExecutorOptions {
    fn from(config: &TrainflowConfig) -> Self {
        Self {
            max_parallel_jobs: config.max_parallel_jobs,
            job_timeout: config.job_timeout_secs.map(Duration::from_secs),
            keep_volumes: config.keep_volumes,
            default_instance_type: config.default_instance_type.clone(),
        }
    }
}

/// Final state of one job.
#[derive(Debug, Clone, PartialEq)]
pub struct JobResult {
    pub status: JobStatus,
    pub exit_code: Option<i32>,
    pub artifacts: Vec<ProducedArtifact>,
    pub error: Option<String>,
    /// Wall-clock runtime; `None` for jobs that never started.
    pub duration: Option<Duration>,
}

impl JobResult {
    fn failed(exit_code: Option<i32>, error: String, duration: Option<Duration>) -> Self {
        Self {
            status: JobStatus::Failed,
            exit_code,
            artifacts: Vec::new(),
            error: Some(error),
            duration,
        }
    }

    fn skipped(caused_by: &str) -> Self {
        Self {
            status: JobStatus::Skipped,
            exit_code: None,
            artifacts: Vec::new(),
            error: Some(format!("upstream job '{caused_by}' did not succeed")),
            duration: None,
        }
    }

    fn cancelled(duration: Option<Duration>) -> Self {
        Self {
            status: JobStatus::Cancelled,
            exit_code: None,
            artifacts: Vec::new(),
            error: None,
            duration,
        }
    }
}

/// Result of a completed workflow execution.
#[derive(Debug, Clone)]
pub struct ExecutionResult {
    pub run_id: Uuid,
    pub status: WorkflowRunStatus,
    /// Per-job results keyed by job name.
    pub jobs: BTreeMap<String, JobResult>,
    /// Summary of what went wrong, if the run did not succeed.
    pub error: Option<String>,
}

impl ExecutionResult {
    pub fn job_status(&self, job: &str) -> Option<JobStatus> {
        self.jobs.get(job).map(|r| r.status)
    }
}

// ---------------------------------------------------------------------------
// DagExecutor
// ---------------------------------------------------------------------------

/// Ready-set DAG executor with durable checkpointing.
///
/// Generic over the run repository, artifact store and job runner so the
/// same engine drives SQLite + Docker in production and in-memory fakes in
/// tests.
pub struct DagExecutor<R: RunRepository, S: ArtifactStore, J: JobRunner> {
    checkpoint: Arc<CheckpointManager<R>>,
    store: Arc<S>,
    runner: Arc<J>,
    event_bus: EventBus,
    options: ExecutorOptions,
    /// Cancellation tokens keyed by run_id.
    cancellation_tokens: DashMap<Uuid, CancellationToken>,
}

impl<R, S, J> DagExecutor<R, S, J>
where
    R: RunRepository + 'static,
    S: ArtifactStore + 'static,
    J: JobRunner + 'static,
{
    pub fn new(
        repo: R,
        store: Arc<S>,
        runner: Arc<J>,
        event_bus: EventBus,
        options: ExecutorOptions,
    ) -> Self {
        Self {
            checkpoint: Arc::new(CheckpointManager::new(repo)),
            store,
            runner,
            event_bus,
            options,
            cancellation_tokens: DashMap::new(),
        }
    }

    pub fn checkpoint(&self) -> &CheckpointManager<R> {
        &self.checkpoint
    }

    pub fn event_bus(&self) -> &EventBus {
        &self.event_bus
    }

    /// Ids of runs currently executing.
    pub fn active_runs(&self) -> Vec<Uuid> {
        self.cancellation_tokens.iter().map(|e| *e.key()).collect()
    }

    /// Cancel every active run (used by the CLI's Ctrl-C handler).
    pub fn cancel_all(&self) {
        for entry in self.cancellation_tokens.iter() {
            tracing::info!(run_id = %entry.key(), "cancelling run");
            entry.value().cancel();
        }
    }

    /// Drive all jobs of a run to a terminal status.
    async fn run_jobs<'a>(
        &self,
        def: &'a WorkflowDefinition,
        graph: &JobGraph<'a>,
        run_id: Uuid,
        token: &CancellationToken,
    ) -> Result<BTreeMap<String, JobResult>, ExecutorError> {
        let log_ids = self
            .checkpoint
            .register_jobs(run_id, def.jobs.keys().map(String::as_str))
            .await?;
        let semaphore = Arc::new(Semaphore::new(self.options.max_parallel_jobs.max(1)));

        let mut remaining: HashMap<&str, usize> = def
            .jobs
            .iter()
            .map(|(name, job)| (name.as_str(), job.needs.len()))
            .collect();
        let mut ready: BTreeSet<&str> = remaining
            .iter()
            .filter(|(_, count)| **count == 0)
            .map(|(name, _)| *name)
            .collect();
        let mut results: BTreeMap<String, JobResult> = BTreeMap::new();
        let mut produced: HashMap<(String, String), PathBuf> = HashMap::new();
        let mut join_set: JoinSet<Result<JobCompletion, ExecutorError>> = JoinSet::new();

        loop {
            // Launch ready jobs in name order while permits last.
            while !token.is_cancelled() {
                let Some(&name) = ready.first() else {
                    break;
                };
                let Ok(permit) = Arc::clone(&semaphore).try_acquire_owned() else {
                    break;
                };
                ready.remove(name);

                let log_id = log_ids[name];
                match self
                    .prepare_job(def, run_id, name, &def.jobs[name], &produced)
                    .await
                {
                    Ok(prepared) => {
                        let task = JobTask {
                            run_id,
                            name: name.to_string(),
                            log_id,
                            prepared,
                            checkpoint: Arc::clone(&self.checkpoint),
                            store: Arc::clone(&self.store),
                            runner: Arc::clone(&self.runner),
                            event_bus: self.event_bus.clone(),
                            token: token.clone(),
                            timeout: self.options.job_timeout,
                        };
                        join_set.spawn(run_job(task, permit));
                    }
                    Err(e) => {
                        drop(permit);
                        let error = format!("failed to prepare job: {e}");
                        tracing::error!(run_id = %run_id, job = name, error = %error, "job failed before start");
                        self.checkpoint.job_failed(log_id, None, &error).await?;
                        self.event_bus.publish(WorkflowEvent::JobFailed {
                            run_id,
                            job: name.to_string(),
                            exit_code: None,
                            error: error.clone(),
                        });
                        results.insert(name.to_string(), JobResult::failed(None, error, None));
                        self.skip_descendants(graph, run_id, name, &log_ids, &mut results)
                            .await?;
                    }
                }
            }

            let Some(joined) = join_set.join_next().await else {
                break;
            };
            let completion = match joined {
                Ok(Ok(completion)) => completion,
                Ok(Err(e)) => {
                    token.cancel();
                    join_set.shutdown().await;
                    return Err(e);
                }
                Err(e) => {
                    token.cancel();
                    join_set.shutdown().await;
                    return Err(ExecutorError::Join(e.to_string()));
                }
            };

            let JobCompletion {
                job,
                result,
                output_paths,
            } = completion;
            let status = result.status;
            results.insert(job.clone(), result);

            match status {
                JobStatus::Succeeded => {
                    for (output, path) in output_paths {
                        produced.insert((job.clone(), output), path);
                    }
                    for dependent in graph.dependents(&job) {
                        if let Some(count) = remaining.get_mut(dependent) {
                            *count = count.saturating_sub(1);
                            if *count == 0 && !results.contains_key(dependent) {
                                ready.insert(dependent);
                            }
                        }
                    }
                }
                JobStatus::Failed => {
                    self.skip_descendants(graph, run_id, &job, &log_ids, &mut results)
                        .await?;
                }
                _ => {}
            }
        }

        // Whatever was never started was stopped by cancellation.
        for name in def.jobs.keys() {
            if !results.contains_key(name) {
                self.checkpoint.job_cancelled(log_ids[name.as_str()]).await?;
                results.insert(name.clone(), JobResult::cancelled(None));
            }
        }

        Ok(results)
    }

    /// Mark every not-yet-finished transitive dependent of `failed` as skipped.
    async fn skip_descendants(
        &self,
        graph: &JobGraph<'_>,
        run_id: Uuid,
        failed: &str,
        log_ids: &HashMap<String, Uuid>,
        results: &mut BTreeMap<String, JobResult>,
    ) -> Result<(), ExecutorError> {
        for job in graph.descendants(failed) {
            if results.contains_key(job) {
                continue;
            }
            self.checkpoint.job_skipped(log_ids[job], failed).await?;
            self.event_bus.publish(WorkflowEvent::JobSkipped {
                run_id,
                job: job.to_string(),
                caused_by: failed.to_string(),
            });
            tracing::info!(run_id = %run_id, job, caused_by = failed, "job skipped");
            results.insert(job.to_string(), JobResult::skipped(failed));
        }
        Ok(())
    }

    /// Resolve inputs, allocate output directories and build the invocation.
    async fn prepare_job(
        &self,
        def: &WorkflowDefinition,
        run_id: Uuid,
        name: &str,
        job: &JobDefinition,
        produced: &HashMap<(String, String), PathBuf>,
    ) -> Result<PreparedJob, ExecutorError> {
        let mut mounts = Vec::with_capacity(job.inputs.len() + job.outputs.len());

        for (input, spec) in &job.inputs {
            let host_path = match spec {
                InputSpec::Binding(raw) => {
                    let binding = spec
                        .binding()
                        .ok_or_else(|| WorkflowError::UnknownOutput(raw.clone()))?;
                    produced
                        .get(&(binding.job.clone(), binding.output.clone()))
                        .cloned()
                        .ok_or_else(|| {
                            WorkflowError::UnknownOutput(format!(
                                "'{binding}' was not produced"
                            ))
                        })?
                }
                InputSpec::Artifact(artifact) => {
                    let reference: DatasetRef =
                        artifact.reference().unwrap_or_default().parse()?;
                    let version = self.store.resolve_dataset(&reference).await?;
                    tracing::info!(
                        run_id = %run_id,
                        job = name,
                        input = input.as_str(),
                        dataset = %version.pinned_ref(),
                        "resolved dataset input"
                    );
                    version.path
                }
            };
            mounts.push(Mount::input(input, host_path));
        }

        let mut outputs = Vec::with_capacity(job.outputs.len());
        for (output, spec) in &job.outputs {
            let (path, dataset) = match spec.kind {
                ArtifactKind::Volume => (self.store.create_volume(run_id, name, output).await?, None),
                ArtifactKind::Dataset => {
                    let reference: DatasetRef = spec.reference().unwrap_or_default().parse()?;
                    let staging = self.store.stage_dataset_output(run_id, name, output).await?;
                    (staging, Some(reference.name))
                }
            };
            mounts.push(Mount::output(output, path.clone()));
            outputs.push(PendingOutput {
                output: output.clone(),
                dataset,
                path,
            });
        }

        let instance_type = def
            .instance_type_for(job)
            .map(str::to_string)
            .or_else(|| self.options.default_instance_type.clone());
        let invocation = build_invocation(run_id, def, name, job, mounts, instance_type)?;

        Ok(PreparedJob {
            invocation,
            outputs,
        })
    }
}

impl<R, S, J> WorkflowExecutor for DagExecutor<R, S, J>
where
    R: RunRepository + 'static,
    S: ArtifactStore + 'static,
    J: JobRunner + 'static,
{
    async fn execute(
        &self,
        definition: &WorkflowDefinition,
        trigger_type: &str,
        trigger_payload: Option<Value>,
    ) -> Result<ExecutionResult, ExecutorError> {
        validate_definition(definition)?;
        let graph = JobGraph::new(definition)?;

        let run = self
            .checkpoint
            .create_run(&definition.name, trigger_type, trigger_payload)
            .await?;
        let run_id = run.id;

        let cancel_token = CancellationToken::new();
        self.cancellation_tokens.insert(run_id, cancel_token.clone());

        self.event_bus.publish(WorkflowEvent::RunStarted {
            run_id,
            workflow_name: definition.name.clone(),
            trigger_type: trigger_type.to_string(),
            job_count: definition.jobs.len(),
        });
        tracing::info!(
            run_id = %run_id,
            workflow = definition.name.as_str(),
            jobs = definition.jobs.len(),
            runner = self.runner.name(),
            "starting workflow execution"
        );

        let run_start = Instant::now();
        let result = self
            .run_jobs(definition, &graph, run_id, &cancel_token)
            .await;

        self.cancellation_tokens.remove(&run_id);
        if !self.options.keep_volumes {
            if let Err(e) = self.store.release_run(run_id).await {
                tracing::warn!(run_id = %run_id, error = %e, "failed to release run volumes");
            }
        }

        let duration_ms = run_start.elapsed().as_millis() as u64;
        match result {
            Ok(jobs) => {
                let status = run_status(&jobs);
                let error = failure_summary(&jobs);
                self.checkpoint
                    .run_finished(run_id, status, error.as_deref())
                    .await?;
                self.event_bus.publish(WorkflowEvent::RunFinished {
                    run_id,
                    workflow_name: definition.name.clone(),
                    status,
                    duration_ms,
                });
                tracing::info!(
                    run_id = %run_id,
                    workflow = definition.name.as_str(),
                    status = status.as_str(),
                    duration_ms,
                    "workflow execution finished"
                );
                Ok(ExecutionResult {
                    run_id,
                    status,
                    jobs,
                    error,
                })
            }
            Err(e) => {
                let err_msg = e.to_string();
                let _ = self
                    .checkpoint
                    .run_finished(run_id, WorkflowRunStatus::Failed, Some(&err_msg))
                    .await;
                self.event_bus.publish(WorkflowEvent::RunFinished {
                    run_id,
                    workflow_name: definition.name.clone(),
                    status: WorkflowRunStatus::Failed,
                    duration_ms,
                });
                tracing::error!(run_id = %run_id, error = %err_msg, "workflow execution aborted");
                Err(e)
            }
        }
    }

    async fn cancel(&self, run_id: Uuid) -> Result<(), ExecutorError> {
        let token = self
            .cancellation_tokens
            .get(&run_id)
            .ok_or(ExecutorError::RunNotFound(run_id))?;
        token.cancel();
        tracing::info!(run_id = %run_id, "workflow cancellation requested");
        Ok(())
    }
}

fn run_status(jobs: &BTreeMap<String, JobResult>) -> WorkflowRunStatus {
    let any = |status: JobStatus| jobs.values().any(|r| r.status == status);
    if any(JobStatus::Cancelled) {
        WorkflowRunStatus::Cancelled
    } else if any(JobStatus::Failed) {
        WorkflowRunStatus::Failed
    } else {
        WorkflowRunStatus::Succeeded
    }
}

fn failure_summary(jobs: &BTreeMap<String, JobResult>) -> Option<String> {
    let failed: Vec<&str> = jobs
        .iter()
        .filter(|(_, r)| r.status == JobStatus::Failed)
        .map(|(name, _)| name.as_str())
        .collect();
    let cancelled = jobs.values().any(|r| r.status == JobStatus::Cancelled);
    match (failed.is_empty(), cancelled) {
        (true, false) => None,
        (true, true) => Some("run cancelled".to_string()),
        (false, _) => Some(format!("failed jobs: {}", failed.join(", "))),
    }
}

// ---------------------------------------------------------------------------
// Job task
// ---------------------------------------------------------------------------

struct PendingOutput {
    output: String,
    /// Dataset name to commit under; `None` for volumes.
    dataset: Option<String>,
    path: PathBuf,
}

struct PreparedJob {
    invocation: JobInvocation,
    outputs: Vec<PendingOutput>,
}

struct JobCompletion {
    job: String,
    result: JobResult,
    /// Host paths downstream jobs mount for each output.
    output_paths: HashMap<String, PathBuf>,
}

struct JobTask<R: RunRepository, S: ArtifactStore, J: JobRunner> {
    run_id: Uuid,
    name: String,
    log_id: Uuid,
    prepared: PreparedJob,
    checkpoint: Arc<CheckpointManager<R>>,
    store: Arc<S>,
    runner: Arc<J>,
    event_bus: EventBus,
    token: CancellationToken,
    timeout: Option<Duration>,
}

/// Run one job to completion. The permit is held for the job's lifetime.
async fn run_job<R, S, J>(
    task: JobTask<R, S, J>,
    _permit: OwnedSemaphorePermit,
) -> Result<JobCompletion, ExecutorError>
where
    R: RunRepository,
    S: ArtifactStore,
    J: JobRunner,
{
    let JobTask {
        run_id,
        name,
        log_id,
        prepared,
        checkpoint,
        store,
        runner,
        event_bus,
        token,
        timeout,
    } = task;
    let invocation = &prepared.invocation;

    checkpoint
        .job_started(log_id, invocation.instance_type.as_deref())
        .await?;
    event_bus.publish(WorkflowEvent::JobStarted {
        run_id,
        job: name.clone(),
        instance_type: invocation.instance_type.clone(),
    });
    tracing::info!(
        run_id = %run_id,
        job = name.as_str(),
        image = invocation.image.as_str(),
        instance_type = invocation.instance_type.as_deref().unwrap_or("-"),
        "job started"
    );

    let started = Instant::now();
    let run = runner.run(invocation, &token);
    let outcome = match timeout {
        Some(limit) => tokio::time::timeout(limit, run)
            .await
            .unwrap_or(Err(RunnerError::TimedOut(limit))),
        None => run.await,
    };
    let duration = started.elapsed();

    let finished: Result<(), (Option<i32>, String)> = match outcome {
        Ok(outcome) if outcome.success() => Ok(()),
        Ok(outcome) => Err((Some(outcome.exit_code), exit_error(&outcome))),
        Err(RunnerError::Cancelled) => {
            checkpoint.job_cancelled(log_id).await?;
            tracing::info!(run_id = %run_id, job = name.as_str(), "job cancelled");
            return Ok(JobCompletion {
                job: name,
                result: JobResult::cancelled(Some(duration)),
                output_paths: HashMap::new(),
            });
        }
        Err(e) => Err((None, e.to_string())),
    };

    let committed = match finished {
        Ok(()) => commit_outputs(store.as_ref(), &prepared.outputs)
            .await
            .map_err(|e| (None, format!("failed to store outputs: {e}"))),
        Err(failure) => Err(failure),
    };

    match committed {
        Ok((artifacts, output_paths)) => {
            checkpoint.job_succeeded(log_id, &artifacts).await?;
            event_bus.publish(WorkflowEvent::JobSucceeded {
                run_id,
                job: name.clone(),
                duration_ms: duration.as_millis() as u64,
                artifacts: artifacts.clone(),
            });
            tracing::info!(
                run_id = %run_id,
                job = name.as_str(),
                duration_ms = duration.as_millis() as u64,
                artifacts = artifacts.len(),
                "job succeeded"
            );
            Ok(JobCompletion {
                job: name,
                result: JobResult {
                    status: JobStatus::Succeeded,
                    exit_code: Some(0),
                    artifacts,
                    error: None,
                    duration: Some(duration),
                },
                output_paths,
            })
        }
        Err((exit_code, error)) => {
            checkpoint.job_failed(log_id, exit_code, &error).await?;
            event_bus.publish(WorkflowEvent::JobFailed {
                run_id,
                job: name.clone(),
                exit_code,
                error: error.clone(),
            });
            tracing::error!(run_id = %run_id, job = name.as_str(), ?exit_code, error = %error, "job failed");
            Ok(JobCompletion {
                job: name,
                result: JobResult::failed(exit_code, error, Some(duration)),
                output_paths: HashMap::new(),
            })
        }
    }
}

fn exit_error(outcome: &JobOutcome) -> String {
    if outcome.stderr_tail.is_empty() {
        format!("exited with code {}", outcome.exit_code)
    } else {
        format!(
            "exited with code {}\n{}",
            outcome.exit_code, outcome.stderr_tail
        )
    }
}

/// Commit dataset outputs and collect the paths downstream jobs should mount.
async fn commit_outputs<S: ArtifactStore>(
    store: &S,
    outputs: &[PendingOutput],
) -> Result<(Vec<ProducedArtifact>, HashMap<String, PathBuf>), ArtifactError> {
    let mut artifacts = Vec::with_capacity(outputs.len());
    let mut paths = HashMap::with_capacity(outputs.len());
    for pending in outputs {
        match &pending.dataset {
            Some(dataset) => {
                let version = store.commit_dataset(dataset, &pending.path).await?;
                paths.insert(pending.output.clone(), version.path.clone());
                artifacts.push(ProducedArtifact {
                    output: pending.output.clone(),
                    kind: ArtifactKind::Dataset,
                    dataset: Some(version.name),
                    version: Some(version.version),
                    digest: Some(version.digest),
                    path: version.path,
                });
            }
            None => {
                paths.insert(pending.output.clone(), pending.path.clone());
                artifacts.push(ProducedArtifact {
                    output: pending.output.clone(),
                    kind: ArtifactKind::Volume,
                    dataset: None,
                    version: None,
                    digest: None,
                    path: pending.path.clone(),
                });
            }
        }
    }
    Ok((artifacts, paths))
}

// ---------------------------------------------------------------------------
// Error type
// ---------------------------------------------------------------------------

/// Errors that stop the executor itself. A failing job is not one of these.
#[derive(Debug, thiserror::Error)]
pub enum ExecutorError {
    #[error(transparent)]
    Workflow(#[from] WorkflowError),

    #[error(transparent)]
    Checkpoint(#[from] CheckpointError),

    #[error(transparent)]
    Artifact(#[from] ArtifactError),

    #[error("run not found: {0}")]
    RunNotFound(Uuid),

    #[error("task join error: {0}")]
    Join(String),
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

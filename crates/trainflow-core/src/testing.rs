//! Test doubles shared by the core test modules.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::{Duration, Instant};

use chrono::Utc;
use tokio_util::sync::CancellationToken;
use trainflow_types::artifact::{DatasetRef, DatasetSummary, DatasetVersion, ProducedArtifact, VersionSelector};
use trainflow_types::error::{ArtifactError, RepositoryError};
use trainflow_types::workflow::{
    Action, ActionParams, JobDefinition, JobRunLog, JobStatus, WorkflowDefinition, WorkflowRun,
    WorkflowRunStatus,
};
use uuid::Uuid;

use crate::artifact::ArtifactStore;
use crate::repository::run::RunRepository;
use crate::runner::{JobInvocation, JobOutcome, JobRunner, RunnerError};

// ---------------------------------------------------------------------------
// Definition builders
// ---------------------------------------------------------------------------

/// A `container@v1` job running `alpine true`.
pub fn job(needs: &[&str]) -> JobDefinition {
    JobDefinition {
        resources: None,
        needs: needs.iter().map(|s| s.to_string()).collect(),
        inputs: BTreeMap::new(),
        outputs: BTreeMap::new(),
        uses: Action::Container,
        with: ActionParams {
            image: Some("alpine".to_string()),
            args: vec!["true".to_string()],
            ..Default::default()
        },
        env: BTreeMap::new(),
    }
}

pub fn script_job(needs: &[&str], script: &str) -> JobDefinition {
    JobDefinition {
        uses: Action::Script,
        with: ActionParams {
            image: Some("ubuntu:18.04".to_string()),
            script: Some(script.to_string()),
            ..Default::default()
        },
        ..job(needs)
    }
}

pub fn workflow(name: &str, jobs: Vec<(&str, JobDefinition)>) -> WorkflowDefinition {
    WorkflowDefinition {
        name: name.to_string(),
        on: None,
        defaults: Default::default(),
        jobs: jobs
            .into_iter()
            .map(|(n, j)| (n.to_string(), j))
            .collect(),
    }
}

// ---------------------------------------------------------------------------
// In-memory run repository
// ---------------------------------------------------------------------------

#[derive(Default)]
pub struct MemoryRunRepository {
    runs: Mutex<Vec<WorkflowRun>>,
    jobs: Mutex<Vec<JobRunLog>>,
}

impl RunRepository for MemoryRunRepository {
    async fn create_run(&self, run: &WorkflowRun) -> Result<(), RepositoryError> {
        self.runs.lock().unwrap().push(run.clone());
        Ok(())
    }

    async fn update_run_status(
        &self,
        run_id: &Uuid,
        status: WorkflowRunStatus,
        error: Option<&str>,
    ) -> Result<(), RepositoryError> {
        let mut runs = self.runs.lock().unwrap();
        let run = runs
            .iter_mut()
            .find(|r| r.id == *run_id)
            .ok_or(RepositoryError::NotFound)?;
        run.status = status;
        run.error = error.map(str::to_string);
        if status.is_terminal() {
            run.finished_at = Some(Utc::now());
        }
        Ok(())
    }

    async fn get_run(&self, run_id: &Uuid) -> Result<Option<WorkflowRun>, RepositoryError> {
        Ok(self.runs.lock().unwrap().iter().find(|r| r.id == *run_id).cloned())
    }

    async fn list_runs(
        &self,
        workflow_name: Option<&str>,
        limit: u32,
    ) -> Result<Vec<WorkflowRun>, RepositoryError> {
        let mut runs: Vec<WorkflowRun> = self
            .runs
            .lock()
            .unwrap()
            .iter()
            .filter(|r| workflow_name.is_none_or(|n| r.workflow_name == n))
            .cloned()
            .collect();
        runs.sort_by(|a, b| b.id.cmp(&a.id));
        runs.truncate(limit as usize);
        Ok(runs)
    }

    async fn list_interrupted_runs(&self) -> Result<Vec<WorkflowRun>, RepositoryError> {
        Ok(self
            .runs
            .lock()
            .unwrap()
            .iter()
            .filter(|r| !r.status.is_terminal())
            .cloned()
            .collect())
    }

    async fn create_job_log(&self, log: &JobRunLog) -> Result<(), RepositoryError> {
        self.jobs.lock().unwrap().push(log.clone());
        Ok(())
    }

    async fn mark_job_started(
        &self,
        log_id: &Uuid,
        instance_type: Option<&str>,
    ) -> Result<(), RepositoryError> {
        let mut jobs = self.jobs.lock().unwrap();
        let log = jobs
            .iter_mut()
            .find(|j| j.id == *log_id)
            .ok_or(RepositoryError::NotFound)?;
        log.status = JobStatus::Running;
        log.instance_type = instance_type.map(str::to_string);
        log.started_at = Some(Utc::now());
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
        let mut jobs = self.jobs.lock().unwrap();
        let log = jobs
            .iter_mut()
            .find(|j| j.id == *log_id)
            .ok_or(RepositoryError::NotFound)?;
        log.status = status;
        log.exit_code = exit_code;
        log.artifacts = artifacts.to_vec();
        log.error = error.map(str::to_string);
        log.finished_at = Some(Utc::now());
        Ok(())
    }

    async fn list_job_logs(&self, run_id: &Uuid) -> Result<Vec<JobRunLog>, RepositoryError> {
        let mut logs: Vec<JobRunLog> = self
            .jobs
            .lock()
            .unwrap()
            .iter()
            .filter(|j| j.run_id == *run_id)
            .cloned()
            .collect();
        logs.sort_by(|a, b| a.job_name.cmp(&b.job_name));
        Ok(logs)
    }
}

// ---------------------------------------------------------------------------
// Temp-dir artifact store
// ---------------------------------------------------------------------------

/// Artifact store over a temp dir. Every commit creates a new version;
/// content addressing is covered by the real store's tests.
pub struct MemoryArtifactStore {
    root: tempfile::TempDir,
    datasets: Mutex<BTreeMap<String, Vec<DatasetVersion>>>,
    released: Mutex<Vec<Uuid>>,
}

impl MemoryArtifactStore {
    pub fn new() -> std::io::Result<Self> {
        Ok(Self {
            root: tempfile::tempdir()?,
            datasets: Mutex::new(BTreeMap::new()),
            released: Mutex::new(Vec::new()),
        })
    }

    /// Create `name:v1` holding a single file.
    pub fn seed(&self, name: &str) {
        let dir = self.root.path().join("datasets").join(name).join("v1");
        std::fs::create_dir_all(&dir).unwrap();
        std::fs::write(dir.join("seed.txt"), name).unwrap();
        self.push_version(name, dir);
    }

    pub fn released_runs(&self) -> Vec<Uuid> {
        self.released.lock().unwrap().clone()
    }

    fn run_dir(&self, run_id: Uuid) -> PathBuf {
        self.root.path().join("runs").join(run_id.to_string())
    }

    fn push_version(&self, name: &str, path: PathBuf) -> DatasetVersion {
        let mut datasets = self.datasets.lock().unwrap();
        let versions = datasets.entry(name.to_string()).or_default();
        let version = DatasetVersion {
            name: name.to_string(),
            version: versions.len() as u32 + 1,
            digest: format!("fake-{name}-{}", versions.len() + 1),
            path,
            tags: Vec::new(),
            file_count: 0,
            size_bytes: 0,
            created_at: Utc::now(),
        };
        versions.push(version.clone());
        version
    }
}

impl ArtifactStore for MemoryArtifactStore {
    async fn resolve_dataset(&self, reference: &DatasetRef) -> Result<DatasetVersion, ArtifactError> {
        let datasets = self.datasets.lock().unwrap();
        let versions = datasets
            .get(&reference.name)
            .ok_or_else(|| ArtifactError::DatasetNotFound(reference.name.clone()))?;
        let found = match &reference.selector {
            VersionSelector::Latest => versions.last(),
            VersionSelector::Version(v) => versions.iter().find(|d| d.version == *v),
            VersionSelector::Tag(t) => versions.iter().find(|d| d.tags.contains(t)),
        };
        found.cloned().ok_or_else(|| match &reference.selector {
            VersionSelector::Tag(t) => ArtifactError::TagNotFound {
                name: reference.name.clone(),
                tag: t.clone(),
            },
            VersionSelector::Version(v) => ArtifactError::VersionNotFound {
                name: reference.name.clone(),
                version: *v,
            },
            VersionSelector::Latest => ArtifactError::DatasetNotFound(reference.name.clone()),
        })
    }

    async fn create_volume(&self, run_id: Uuid, job: &str, output: &str) -> Result<PathBuf, ArtifactError> {
        let dir = self.run_dir(run_id).join("volumes").join(job).join(output);
        std::fs::create_dir_all(&dir)?;
        Ok(dir)
    }

    async fn stage_dataset_output(
        &self,
        run_id: Uuid,
        job: &str,
        output: &str,
    ) -> Result<PathBuf, ArtifactError> {
        let dir = self.run_dir(run_id).join("staging").join(job).join(output);
        std::fs::create_dir_all(&dir)?;
        Ok(dir)
    }

    async fn commit_dataset(&self, name: &str, staging: &Path) -> Result<DatasetVersion, ArtifactError> {
        let next = self
            .datasets
            .lock()
            .unwrap()
            .get(name)
            .map_or(1, |v| v.len() + 1);
        let dest = self.root.path().join("datasets").join(name).join(format!("v{next}"));
        if let Some(parent) = dest.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::rename(staging, &dest)?;
        Ok(self.push_version(name, dest))
    }

    async fn tag_version(&self, name: &str, version: u32, tag: &str) -> Result<DatasetVersion, ArtifactError> {
        let mut datasets = self.datasets.lock().unwrap();
        let versions = datasets
            .get_mut(name)
            .ok_or_else(|| ArtifactError::DatasetNotFound(name.to_string()))?;
        for v in versions.iter_mut() {
            v.tags.retain(|t| t != tag);
        }
        let target = versions
            .iter_mut()
            .find(|v| v.version == version)
            .ok_or_else(|| ArtifactError::VersionNotFound {
                name: name.to_string(),
                version,
            })?;
        target.tags.push(tag.to_string());
        Ok(target.clone())
    }

    async fn list_datasets(&self) -> Result<Vec<DatasetSummary>, ArtifactError> {
        Ok(self
            .datasets
            .lock()
            .unwrap()
            .iter()
            .filter_map(|(name, versions)| {
                versions.last().map(|latest| DatasetSummary {
                    name: name.clone(),
                    latest_version: latest.version,
                    version_count: versions.len() as u32,
                    updated_at: latest.created_at,
                })
            })
            .collect())
    }

    async fn list_versions(&self, name: &str) -> Result<Vec<DatasetVersion>, ArtifactError> {
        self.datasets
            .lock()
            .unwrap()
            .get(name)
            .cloned()
            .ok_or_else(|| ArtifactError::DatasetNotFound(name.to_string()))
    }

    async fn release_run(&self, run_id: Uuid) -> Result<(), ArtifactError> {
        let dir = self.run_dir(run_id);
        if dir.exists() {
            std::fs::remove_dir_all(dir)?;
        }
        self.released.lock().unwrap().push(run_id);
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Fake job runner
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Mark {
    Start,
    End,
}

/// Records start/end times, writes a marker file into every output mount,
/// and exits non-zero for jobs configured to fail.
#[derive(Default)]
pub struct FakeRunner {
    failing: HashSet<String>,
    hanging: HashSet<String>,
    delay: Duration,
    job_delays: HashMap<String, Duration>,
    marks: Mutex<Vec<(String, Mark, Instant)>>,
    inputs: Mutex<HashMap<String, Vec<String>>>,
    running: AtomicUsize,
    max_running: AtomicUsize,
}

impl FakeRunner {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn failing(mut self, job: &str) -> Self {
        self.failing.insert(job.to_string());
        self
    }

    /// The job runs until cancelled.
    pub fn hanging(mut self, job: &str) -> Self {
        self.hanging.insert(job.to_string());
        self
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub fn with_job_delay(mut self, job: &str, delay: Duration) -> Self {
        self.job_delays.insert(job.to_string(), delay);
        self
    }

    pub fn started_jobs(&self) -> Vec<String> {
        self.marks
            .lock()
            .unwrap()
            .iter()
            .filter(|(_, m, _)| *m == Mark::Start)
            .map(|(j, _, _)| j.clone())
            .collect()
    }

    pub fn max_concurrency(&self) -> usize {
        self.max_running.load(Ordering::SeqCst)
    }

    /// Input names whose host path existed when `job` started, sorted.
    pub fn inputs_seen(&self, job: &str) -> Vec<String> {
        self.inputs.lock().unwrap().get(job).cloned().unwrap_or_default()
    }

    /// Whether the run intervals of `a` and `b` overlapped.
    pub fn overlapped(&self, a: &str, b: &str) -> bool {
        match (self.mark(a, Mark::Start), self.mark(a, Mark::End), self.mark(b, Mark::Start), self.mark(b, Mark::End)) {
            (Some(sa), Some(ea), Some(sb), Some(eb)) => sa < eb && sb < ea,
            _ => false,
        }
    }

    /// Whether `later` started no earlier than `earlier` ended.
    pub fn started_after(&self, later: &str, earlier: &str) -> bool {
        match (self.mark(later, Mark::Start), self.mark(earlier, Mark::End)) {
            (Some(start), Some(end)) => start >= end,
            _ => false,
        }
    }

    fn mark(&self, job: &str, mark: Mark) -> Option<Instant> {
        self.marks
            .lock()
            .unwrap()
            .iter()
            .find(|(j, m, _)| j == job && *m == mark)
            .map(|(_, _, t)| *t)
    }

    fn record(&self, job: &str, mark: Mark) {
        self.marks
            .lock()
            .unwrap()
            .push((job.to_string(), mark, Instant::now()));
    }
}

impl JobRunner for FakeRunner {
    fn name(&self) -> &'static str {
        "fake"
    }

    async fn run(
        &self,
        invocation: &JobInvocation,
        cancel: &CancellationToken,
    ) -> Result<JobOutcome, RunnerError> {
        let job = invocation.job.as_str();
        self.record(job, Mark::Start);
        let now = self.running.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_running.fetch_max(now, Ordering::SeqCst);

        let mut seen: Vec<String> = invocation
            .mounts
            .iter()
            .filter(|m| m.read_only && m.host_path.exists())
            .map(|m| m.name.clone())
            .collect();
        seen.sort();
        self.inputs.lock().unwrap().insert(job.to_string(), seen);

        let delay = if self.hanging.contains(job) {
            Duration::from_secs(3600)
        } else {
            self.job_delays.get(job).copied().unwrap_or(self.delay)
        };
        let started = Instant::now();
        let cancelled = tokio::select! {
            _ = cancel.cancelled() => true,
            _ = tokio::time::sleep(delay) => false,
        };
        self.running.fetch_sub(1, Ordering::SeqCst);
        self.record(job, Mark::End);
        if cancelled {
            return Err(RunnerError::Cancelled);
        }

        for mount in invocation.mounts.iter().filter(|m| !m.read_only) {
            std::fs::write(mount.host_path.join(format!("{job}.txt")), job)?;
        }

        let failed = self.failing.contains(job);
        Ok(JobOutcome {
            exit_code: if failed { 1 } else { 0 },
            stdout_tail: String::new(),
            stderr_tail: if failed { "boom".to_string() } else { String::new() },
            duration: started.elapsed(),
        })
    }
}

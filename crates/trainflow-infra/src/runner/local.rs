//! Host-shell job runner for development without Docker.
//!
//! The job's image is ignored. A per-job work directory exposes the mounts
//! as `inputs/<name>` and `outputs/<name>` symlinks. Container paths in the
//! script or argument vector are rewritten: mount paths to the mounts' host
//! paths, the bare `/inputs` and `/outputs` roots to the work directory's
//! symlink folders (also exported as `$TRAINFLOW_INPUTS` / `$TRAINFLOW_OUTPUTS`).

use std::path::{Path, PathBuf};

use tokio::process::Command;
use tokio_util::sync::CancellationToken;
use trainflow_core::runner::{
    INPUTS_ROOT, JobCommand, JobInvocation, JobOutcome, JobRunner, Mount, OUTPUTS_ROOT, RunnerError,
};

use super::{drive, env_suffix};

/// Runs jobs as host processes with `bash`.
#[derive(Debug, Clone)]
pub struct LocalJobRunner {
    work_root: PathBuf,
}

impl LocalJobRunner {
    /// `work_root` holds one scratch directory per running job.
    pub fn new(work_root: impl Into<PathBuf>) -> Self {
        Self {
            work_root: work_root.into(),
        }
    }

    fn work_dir(&self, invocation: &JobInvocation) -> PathBuf {
        self.work_root
            .join(invocation.run_id.to_string())
            .join(&invocation.job)
    }

    /// Build the host command for `invocation` running in `work_dir`.
    pub fn command(&self, invocation: &JobInvocation, work_dir: &Path) -> Result<Command, RunnerError> {
        let paths = invocation
            .path_map()
            .with(INPUTS_ROOT, work_dir.join("inputs"))
            .with(OUTPUTS_ROOT, work_dir.join("outputs"));

        let mut command = match &invocation.command {
            JobCommand::Script(script) => {
                let mut c = Command::new("bash");
                c.arg("-ec").arg(paths.translate(script));
                c
            }
            JobCommand::Args(argv) => {
                let (program, rest) = argv
                    .split_first()
                    .ok_or_else(|| RunnerError::Spawn("empty argument vector".to_string()))?;
                let mut c = Command::new(paths.translate(program));
                c.args(rest.iter().map(|a| paths.translate(a)));
                c
            }
        };

        command.current_dir(work_dir);
        command.envs(&invocation.env);
        command.env("TRAINFLOW_INPUTS", work_dir.join("inputs"));
        command.env("TRAINFLOW_OUTPUTS", work_dir.join("outputs"));
        for mount in &invocation.mounts {
            let prefix = if mount.read_only { "INPUT" } else { "OUTPUT" };
            command.env(format!("{prefix}_{}", env_suffix(&mount.name)), &mount.host_path);
        }
        Ok(command)
    }

    async fn prepare_work_dir(invocation: &JobInvocation, work_dir: &Path) -> Result<(), RunnerError> {
        match tokio::fs::remove_dir_all(work_dir).await {
            Ok(()) => {}
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => return Err(e.into()),
        }
        tokio::fs::create_dir_all(work_dir.join("inputs")).await?;
        tokio::fs::create_dir_all(work_dir.join("outputs")).await?;
        for mount in &invocation.mounts {
            link_mount(mount, work_dir).await?;
        }
        Ok(())
    }
}

#[cfg(unix)]
async fn link_mount(mount: &Mount, work_dir: &Path) -> Result<(), RunnerError> {
    let side = if mount.read_only { "inputs" } else { "outputs" };
    tokio::fs::symlink(&mount.host_path, work_dir.join(side).join(&mount.name)).await?;
    Ok(())
}

#[cfg(not(unix))]
async fn link_mount(_mount: &Mount, _work_dir: &Path) -> Result<(), RunnerError> {
    // Without symlinks the per-mount INPUT_/OUTPUT_ variables are the only handles.
    Ok(())
}

impl JobRunner for LocalJobRunner {
    fn name(&self) -> &'static str {
        "local"
    }

    async fn run(
        &self,
        invocation: &JobInvocation,
        cancel: &CancellationToken,
    ) -> Result<JobOutcome, RunnerError> {
        let work_dir = self.work_dir(invocation);
        let command = self.command(invocation, &work_dir)?;
        Self::prepare_work_dir(invocation, &work_dir).await?;
        tracing::debug!(job = invocation.job.as_str(), work_dir = %work_dir.display(), "running job on host");

        let result = drive(command, &invocation.job, cancel).await;

        if let Err(e) = tokio::fs::remove_dir_all(&work_dir).await {
            tracing::debug!(work_dir = %work_dir.display(), "failed to remove work dir: {e}");
        }
        result
    }
}

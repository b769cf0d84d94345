//! Docker CLI job runner.
//!
//! Each invocation becomes one `docker run --rm` with the job's mounts bound
//! at `/inputs/<name>` (read-only) and `/outputs/<name>`. GPU tiers add
//! `--gpus all`. The container is named after the run and job so it can be
//! force-removed when the job is cancelled or times out.

use std::collections::BTreeMap;
use std::path::PathBuf;

use tokio::process::Command;
use tokio_util::sync::CancellationToken;
use trainflow_core::runner::{JobCommand, JobInvocation, JobOutcome, JobRunner, RunnerError};
use trainflow_types::config::{InstanceTypeConfig, TrainflowConfig};

use super::drive;

/// Runs jobs as containers through the `docker` CLI.
#[derive(Debug, Clone)]
pub struct DockerJobRunner {
    docker: PathBuf,
    instance_types: BTreeMap<String, InstanceTypeConfig>,
}

impl DockerJobRunner {
    pub fn new(config: &TrainflowConfig) -> Self {
        Self {
            docker: PathBuf::from("docker"),
            instance_types: config.instance_types.clone(),
        }
    }

    /// Use a specific `docker`-compatible binary (e.g. `podman`).
    pub fn with_binary(mut self, docker: impl Into<PathBuf>) -> Self {
        self.docker = docker.into();
        self
    }

    /// Container name for an invocation: `trainflow-<run>-<job>`.
    pub fn container_name(invocation: &JobInvocation) -> String {
        format!(
            "trainflow-{}-{}",
            invocation.run_id.simple(),
            invocation.job.to_ascii_lowercase()
        )
    }

    /// Arguments passed to the docker binary.
    pub fn run_args(&self, invocation: &JobInvocation) -> Vec<String> {
        let mut args: Vec<String> = vec![
            "run".into(),
            "--rm".into(),
            "--name".into(),
            Self::container_name(invocation),
            "--label".into(),
            format!("trainflow.run_id={}", invocation.run_id),
            "--label".into(),
            format!("trainflow.job={}", invocation.job),
        ];

        if let Some(tier) = &invocation.instance_type {
            args.push("--label".into());
            args.push(format!("trainflow.instance_type={tier}"));
            let tier_config = self.instance_types.get(tier).cloned().unwrap_or_default();
            if tier_config.gpu {
                args.push("--gpus".into());
                args.push("all".into());
            }
            args.extend(tier_config.docker_args);
        }

        for mount in &invocation.mounts {
            args.push("-v".into());
            let mut spec = format!("{}:{}", mount.host_path.display(), mount.container_path);
            if mount.read_only {
                spec.push_str(":ro");
            }
            args.push(spec);
        }

        for (key, value) in &invocation.env {
            args.push("-e".into());
            args.push(format!("{key}={value}"));
        }

        match &invocation.command {
            JobCommand::Script(script) => {
                args.extend(["--entrypoint".into(), "bash".into(), invocation.image.clone()]);
                args.extend(["-ec".into(), script.clone()]);
            }
            JobCommand::Args(argv) => {
                // args[0] is the program; it replaces the image entrypoint.
                if let Some((program, rest)) = argv.split_first() {
                    args.extend(["--entrypoint".into(), program.clone()]);
                    args.push(invocation.image.clone());
                    args.extend(rest.iter().cloned());
                } else {
                    args.push(invocation.image.clone());
                }
            }
        }
        args
    }
}

/// Force-removes the named container unless disarmed. Runs on drop so an
/// engine timeout (which drops the run future) also cleans up.
struct ContainerGuard {
    docker: PathBuf,
    name: String,
    armed: bool,
}

impl Drop for ContainerGuard {
    fn drop(&mut self) {
        if !self.armed {
            return;
        }
        tracing::debug!(container = %self.name, "removing job container");
        let spawned = std::process::Command::new(&self.docker)
            .args(["rm", "-f", &self.name])
            .stdin(std::process::Stdio::null())
            .stdout(std::process::Stdio::null())
            .stderr(std::process::Stdio::null())
            .spawn();
        if let Err(e) = spawned {
            tracing::warn!(container = %self.name, "failed to remove container: {e}");
        }
    }
}

impl JobRunner for DockerJobRunner {
    fn name(&self) -> &'static str {
        "docker"
    }

    async fn run(
        &self,
        invocation: &JobInvocation,
        cancel: &CancellationToken,
    ) -> Result<JobOutcome, RunnerError> {
        let args = self.run_args(invocation);
        tracing::debug!(job = invocation.job.as_str(), image = invocation.image.as_str(), "docker {}", args.join(" "));

        let mut command = Command::new(&self.docker);
        command.args(&args);

        let mut guard = ContainerGuard {
            docker: self.docker.clone(),
            name: Self::container_name(invocation),
            armed: true,
        };
        let result = drive(command, &invocation.job, cancel).await;
        // `--rm` already removed a container that exited on its own.
        guard.armed = matches!(result, Err(RunnerError::Cancelled));
        result
    }
}

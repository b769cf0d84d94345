//! Job runner adapters.
//!
//! - `docker` -- runs each job in a container through the `docker` CLI
//! - `local` -- runs each job on the host with `bash`
//!
//! Both drive the child process the same way: stdout and stderr are streamed
//! line by line into `tracing`, the last lines of each are kept for the job
//! log, and cancellation kills the process.

pub mod docker;
pub mod local;

use std::path::Path;
use std::process::{ExitStatus, Stdio};
use std::time::Instant;

use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::process::Command;
use tokio_util::sync::CancellationToken;
use trainflow_core::runner::{JobInvocation, JobOutcome, JobRunner, OutputTail, RunnerError};
use trainflow_types::config::{RunnerKind, TrainflowConfig};

use self::docker::DockerJobRunner;
use self::local::LocalJobRunner;

/// The runner selected by configuration (or `--runner`) at startup.
#[derive(Debug, Clone)]
pub enum ConfiguredRunner {
    Docker(DockerJobRunner),
    Local(LocalJobRunner),
}

impl ConfiguredRunner {
    /// Build the runner of `kind`. The local runner keeps its scratch
    /// directories under `{data_dir}/work`.
    pub fn new(kind: RunnerKind, config: &TrainflowConfig, data_dir: &Path) -> Self {
        match kind {
            RunnerKind::Docker => ConfiguredRunner::Docker(DockerJobRunner::new(config)),
            RunnerKind::Local => ConfiguredRunner::Local(LocalJobRunner::new(data_dir.join("work"))),
        }
    }
}

impl JobRunner for ConfiguredRunner {
    fn name(&self) -> &'static str {
        match self {
            ConfiguredRunner::Docker(r) => r.name(),
            ConfiguredRunner::Local(r) => r.name(),
        }
    }

    async fn run(
        &self,
        invocation: &JobInvocation,
        cancel: &CancellationToken,
    ) -> Result<JobOutcome, RunnerError> {
        match self {
            ConfiguredRunner::Docker(r) => r.run(invocation, cancel).await,
            ConfiguredRunner::Local(r) => r.run(invocation, cancel).await,
        }
    }
}

#[derive(Debug, Clone, Copy)]
enum Stream {
    Stdout,
    Stderr,
}

impl Stream {
    fn as_str(self) -> &'static str {
        match self {
            Stream::Stdout => "stdout",
            Stream::Stderr => "stderr",
        }
    }
}

/// Spawn `command` and wait for it, or kill it when `cancel` fires.
///
/// The child is spawned with `kill_on_drop`, so dropping the returned future
/// (an engine timeout) also stops the process.
pub(crate) async fn drive(
    mut command: Command,
    job: &str,
    cancel: &CancellationToken,
) -> Result<JobOutcome, RunnerError> {
    let program = command.as_std().get_program().to_string_lossy().into_owned();
    command
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);

    let started = Instant::now();
    let mut child = command
        .spawn()
        .map_err(|e| RunnerError::Spawn(format!("{program}: {e}")))?;

    let stdout = child
        .stdout
        .take()
        .map(|s| tokio::spawn(collect_lines(s, job.to_string(), Stream::Stdout)));
    let stderr = child
        .stderr
        .take()
        .map(|s| tokio::spawn(collect_lines(s, job.to_string(), Stream::Stderr)));

    let status = tokio::select! {
        status = child.wait() => status?,
        _ = cancel.cancelled() => {
            tracing::info!(job, "cancelling job process");
            child.kill().await?;
            return Err(RunnerError::Cancelled);
        }
    };

    let stdout_tail = join_tail(stdout).await;
    let stderr_tail = join_tail(stderr).await;

    Ok(JobOutcome {
        exit_code: exit_code(status),
        stdout_tail,
        stderr_tail,
        duration: started.elapsed(),
    })
}

async fn collect_lines<R>(reader: R, job: String, stream: Stream) -> OutputTail
where
    R: AsyncRead + Unpin,
{
    let mut tail = OutputTail::default();
    let mut lines = BufReader::new(reader).lines();
    loop {
        match lines.next_line().await {
            Ok(Some(line)) => {
                tracing::info!(target: "trainflow::job", job = job.as_str(), stream = stream.as_str(), "{line}");
                tail.push(line);
            }
            Ok(None) => break,
            Err(e) => {
                tracing::warn!(job = job.as_str(), stream = stream.as_str(), "stopped reading job output: {e}");
                break;
            }
        }
    }
    tail
}

async fn join_tail(handle: Option<tokio::task::JoinHandle<OutputTail>>) -> String {
    match handle {
        Some(h) => h.await.map(OutputTail::into_string).unwrap_or_default(),
        None => String::new(),
    }
}

/// Exit code of a finished process. A process killed by a signal reports
/// `128 + signal`, as shells do.
fn exit_code(status: ExitStatus) -> i32 {
    if let Some(code) = status.code() {
        return code;
    }
    #[cfg(unix)]
    {
        use std::os::unix::process::ExitStatusExt;
        if let Some(signal) = status.signal() {
            return 128 + signal;
        }
    }
    -1
}

/// Convert a mount name into an environment variable suffix
/// (`extracted-images` -> `EXTRACTED_IMAGES`).
pub(crate) fn env_suffix(name: &str) -> String {
    name.chars()
        .map(|c| if c.is_ascii_alphanumeric() { c.to_ascii_uppercase() } else { '_' })
        .collect()
}

//! Job runner trait and the invocation it executes.
//!
//! A `JobInvocation` is fully resolved: image, command, host paths for every
//! mount and the environment. Runners only decide *where* it executes
//! (container or host process); the executor owns everything else.

use std::collections::{BTreeMap, VecDeque};
use std::path::PathBuf;
use std::time::Duration;

use tokio_util::sync::CancellationToken;
use uuid::Uuid;

/// Number of trailing output lines kept for the job log.
pub const OUTPUT_TAIL_LINES: usize = 40;

/// Container-side root for input mounts.
pub const INPUTS_ROOT: &str = "/inputs";

/// Container-side root for output mounts.
pub const OUTPUTS_ROOT: &str = "/outputs";

/// A host directory bound into the job at `container_path`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Mount {
    pub name: String,
    pub host_path: PathBuf,
    pub container_path: String,
    pub read_only: bool,
}

impl Mount {
    pub fn input(name: &str, host_path: PathBuf) -> Self {
        Self {
            name: name.to_string(),
            host_path,
            container_path: format!("{INPUTS_ROOT}/{name}"),
            read_only: true,
        }
    }

    pub fn output(name: &str, host_path: PathBuf) -> Self {
        Self {
            name: name.to_string(),
            host_path,
            container_path: format!("{OUTPUTS_ROOT}/{name}"),
            read_only: false,
        }
    }
}

/// What to execute inside the image.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JobCommand {
    /// A literal argument vector; `args[0]` is the program.
    ///
    /// The program replaces the image's entrypoint (`docker run --entrypoint
    /// args[0] image args[1..]`), so `args` is the complete command line and
    /// never an argument list appended to the image's own entrypoint. The
    /// local runner executes `args[0]` directly, which keeps both runners
    /// running the same command.
    Args(Vec<String>),
    /// An inline shell script run with `bash -e`.
    Script(String),
}

/// A fully resolved unit of work handed to a `JobRunner`.
#[derive(Debug, Clone)]
pub struct JobInvocation {
    pub run_id: Uuid,
    pub job: String,
    pub image: String,
    pub command: JobCommand,
    pub mounts: Vec<Mount>,
    pub env: BTreeMap<String, String>,
    pub instance_type: Option<String>,
}

impl JobInvocation {
    /// Container-to-host mapping for every mount of this job.
    pub fn path_map(&self) -> PathMap {
        self.mounts.iter().fold(PathMap::default(), |map, mount| {
            map.with(&mount.container_path, mount.host_path.clone())
        })
    }

    /// Rewrite mount paths (`/inputs/<name>`, `/outputs/<name>`) in `text`
    /// to the mounts' host paths.
    pub fn translate_paths(&self, text: &str) -> String {
        self.path_map().translate(text)
    }
}

/// Container paths and the host paths they stand for.
///
/// A container path only matches as a whole path: it must not continue a
/// longer path on the left (`/data/inputs`) or a longer component on the
/// right (`/inputs/repository` for `/inputs/repo`). The longest matching
/// entry wins, so `/inputs/repo` takes precedence over a bare `/inputs`.
#[derive(Debug, Clone, Default)]
pub struct PathMap {
    entries: Vec<(String, String)>,
}

impl PathMap {
    pub fn with(mut self, container_path: &str, host_path: impl Into<PathBuf>) -> Self {
        let host = host_path.into().display().to_string();
        let container = container_path.trim_end_matches('/').to_string();
        self.entries.retain(|(c, _)| *c != container);
        self.entries.push((container, host));
        self.entries.sort_by(|a, b| b.0.len().cmp(&a.0.len()));
        self
    }

    pub fn translate(&self, text: &str) -> String {
        let mut out = String::with_capacity(text.len());
        let mut i = 0;
        while i < text.len() {
            let rest = &text[i..];
            let at_start = text[..i].chars().next_back().is_none_or(|c| !is_path_char(c));
            let hit = at_start
                .then(|| {
                    self.entries.iter().find(|(container, _)| {
                        rest.starts_with(container.as_str())
                            && rest[container.len()..]
                                .chars()
                                .next()
                                .is_none_or(ends_path)
                    })
                })
                .flatten();

            match hit {
                Some((container, host)) => {
                    out.push_str(host);
                    i += container.len();
                }
                None => {
                    let Some(c) = rest.chars().next() else { break };
                    out.push(c);
                    i += c.len_utf8();
                }
            }
        }
        out
    }
}

/// Characters that can continue a path to the left of a match.
fn is_path_char(c: char) -> bool {
    c.is_alphanumeric() || matches!(c, '/' | '.' | '_' | '-' | '~' | '$')
}

/// Characters allowed right after a matched container path.
fn ends_path(c: char) -> bool {
    c == '/'
        || c.is_whitespace()
        || matches!(c, '"' | '\'' | ';' | ':' | ',' | ')' | '|' | '&' | '>' | '<' | '`')
}

/// Result of a job process that ran to completion.
#[derive(Debug, Clone)]
pub struct JobOutcome {
    pub exit_code: i32,
    pub stdout_tail: String,
    pub stderr_tail: String,
    pub duration: Duration,
}

impl JobOutcome {
    pub fn success(&self) -> bool {
        self.exit_code == 0
    }
}

/// Errors that prevent a job from producing an exit code.
#[derive(Debug, thiserror::Error)]
pub enum RunnerError {
    #[error("failed to start job: {0}")]
    Spawn(String),

    #[error("job I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("job cancelled")]
    Cancelled,

    #[error("job timed out after {0:?}")]
    TimedOut(Duration),
}

/// Executes a resolved job invocation.
///
/// Implementations must stop the underlying process when `cancel` fires and
/// return `RunnerError::Cancelled`.
pub trait JobRunner: Send + Sync {
    /// Short runner name for logs (`docker`, `local`).
    fn name(&self) -> &'static str;

    /// Run the invocation to completion.
    fn run(
        &self,
        invocation: &JobInvocation,
        cancel: &CancellationToken,
    ) -> impl std::future::Future<Output = Result<JobOutcome, RunnerError>> + Send;
}

// ---------------------------------------------------------------------------
// Output tail
// ---------------------------------------------------------------------------

/// Bounded buffer keeping the last `capacity` lines of a stream.
#[derive(Debug, Clone)]
pub struct OutputTail {
    lines: VecDeque<String>,
    capacity: usize,
}

impl OutputTail {
    pub fn new(capacity: usize) -> Self {
        Self {
            lines: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    pub fn push(&mut self, line: impl Into<String>) {
        if self.capacity == 0 {
            return;
        }
        if self.lines.len() == self.capacity {
            self.lines.pop_front();
        }
        self.lines.push_back(line.into());
    }

    pub fn into_string(self) -> String {
        Vec::from(self.lines).join("\n")
    }
}

impl Default for OutputTail {
    fn default() -> Self {
        Self::new(OUTPUT_TAIL_LINES)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn invocation(mounts: Vec<Mount>) -> JobInvocation {
        JobInvocation {
            run_id: Uuid::nil(),
            job: "extractImages".to_string(),
            image: "ubuntu:18.04".to_string(),
            command: JobCommand::Script(String::new()),
            mounts,
            env: BTreeMap::new(),
            instance_type: None,
        }
    }

    #[test]
    fn mount_paths() {
        let m = Mount::input("repo", PathBuf::from("/data/v/repo"));
        assert_eq!(m.container_path, "/inputs/repo");
        assert!(m.read_only);
        let m = Mount::output("images", PathBuf::from("/data/s/images"));
        assert_eq!(m.container_path, "/outputs/images");
        assert!(!m.read_only);
    }

    #[test]
    fn translate_paths_prefers_longest_mount() {
        let inv = invocation(vec![
            Mount::input("repo", PathBuf::from("/h/a")),
            Mount::input("repo2", PathBuf::from("/h/b")),
            Mount::output("out", PathBuf::from("/h/c")),
        ]);
        let script = "cp /inputs/repo2/x /inputs/repo/y && ls /outputs/out";
        assert_eq!(inv.translate_paths(script), "cp /h/b/x /h/a/y && ls /h/c");
    }

    #[test]
    fn translate_paths_matches_whole_components_only() {
        let inv = invocation(vec![Mount::input("repo", PathBuf::from("/host/vol/repo"))]);
        assert_eq!(
            inv.translate_paths("ls /inputs/repository /data/inputs/repo '/inputs/repo'"),
            "ls /inputs/repository /data/inputs/repo '/host/vol/repo'"
        );
    }

    #[test]
    fn path_map_roots_yield_to_mounts() {
        let inv = invocation(vec![
            Mount::input("extracted-images", PathBuf::from("/host/ds/v1/data")),
            Mount::input("repo", PathBuf::from("/host/vol/repo")),
        ]);
        let map = inv.path_map().with(INPUTS_ROOT, "/work/inputs");
        let script = "python /inputs/repo/run_training.py --data-dir=/inputs \\\n  --dataset=extracted-images; ls /inputs/repository";
        assert_eq!(
            map.translate(script),
            "python /host/vol/repo/run_training.py --data-dir=/work/inputs \\\n  --dataset=extracted-images; ls /work/inputs/repository"
        );
    }

    #[test]
    fn output_tail_keeps_last_lines() {
        let mut tail = OutputTail::new(2);
        tail.push("a");
        tail.push("b");
        tail.push("c");
        assert_eq!(tail.into_string(), "b\nc");

        let mut empty = OutputTail::new(0);
        empty.push("ignored");
        assert_eq!(empty.into_string(), "");
    }
}

//! Global configuration types for trainflow.
//!
//! `TrainflowConfig` represents the top-level `config.toml` in the data
//! directory. Every field has a default so an empty file is valid.

use std::collections::BTreeMap;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// Which job runner executes jobs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunnerKind {
    /// Run each job in a container via the `docker` CLI.
    Docker,
    /// Run each job directly on the host with `bash`.
    Local,
}

impl std::str::FromStr for RunnerKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "docker" => Ok(RunnerKind::Docker),
            "local" => Ok(RunnerKind::Local),
            other => Err(format!("unknown runner '{other}' (expected docker or local)")),
        }
    }
}

/// Top-level configuration, loaded from `{data_dir}/config.toml`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrainflowConfig {
    /// Upper bound on jobs running at the same time within one run.
    #[serde(default = "default_max_parallel_jobs")]
    pub max_parallel_jobs: usize,

    /// Per-job wall-clock limit. `None` leaves hung jobs to the host environment.
    #[serde(default)]
    pub job_timeout_secs: Option<u64>,

    #[serde(default = "default_runner")]
    pub runner: RunnerKind,

    /// Keep run volumes on disk after the run finishes.
    #[serde(default)]
    pub keep_volumes: bool,

    /// Instance type used when neither the job nor the workflow sets one.
    #[serde(default)]
    pub default_instance_type: Option<String>,

    /// Runner behavior per instance tier.
    #[serde(default = "default_instance_types")]
    pub instance_types: BTreeMap<String, InstanceTypeConfig>,

    /// Directory scanned for workflow YAML files by `tflow serve`.
    #[serde(default)]
    pub workflows_dir: Option<PathBuf>,

    /// Environment variable holding the webhook HMAC secret.
    #[serde(default = "default_webhook_secret_env")]
    pub webhook_secret_env: String,

    #[serde(default)]
    pub server: ServerConfig,
}

/// How a hardware tier maps onto the runner.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct InstanceTypeConfig {
    /// Request GPU access (`docker run --gpus all`).
    #[serde(default)]
    pub gpu: bool,
    /// Extra flags passed to `docker run` for this tier.
    #[serde(default)]
    pub docker_args: Vec<String>,
}

/// HTTP listener settings for `tflow serve`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
}

fn default_max_parallel_jobs() -> usize {
    4
}

fn default_runner() -> RunnerKind {
    RunnerKind::Docker
}

fn default_webhook_secret_env() -> String {
    "TRAINFLOW_WEBHOOK_SECRET".to_string()
}

fn default_host() -> String {
    "127.0.0.1".to_string()
}

fn default_port() -> u16 {
    8610
}

fn default_instance_types() -> BTreeMap<String, InstanceTypeConfig> {
    let cpu = ["C3", "C4", "C5", "C7"];
    let gpu = ["P4000", "P5000", "P6000", "V100", "A100"];
    cpu.into_iter()
        .map(|t| (t.to_string(), InstanceTypeConfig::default()))
        .chain(gpu.into_iter().map(|t| {
            (
                t.to_string(),
                InstanceTypeConfig {
                    gpu: true,
                    docker_args: Vec::new(),
                },
            )
        }))
        .collect()
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
        }
    }
}

impl Default for TrainflowConfig {
    fn default() -> Self {
        Self {
            max_parallel_jobs: default_max_parallel_jobs(),
            job_timeout_secs: None,
            runner: default_runner(),
            keep_volumes: false,
            default_instance_type: None,
            instance_types: default_instance_types(),
            workflows_dir: None,
            webhook_secret_env: default_webhook_secret_env(),
            server: ServerConfig::default(),
        }
    }
}

impl TrainflowConfig {
    /// Runner settings for `tier`; unknown tiers get CPU-only defaults.
    pub fn instance_type(&self, tier: &str) -> InstanceTypeConfig {
        self.instance_types.get(tier).cloned().unwrap_or_default()
    }
}

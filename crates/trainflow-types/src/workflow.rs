//! Workflow domain types for trainflow.
//!
//! Defines the canonical intermediate representation for workflow YAML files
//! (`WorkflowDefinition` and `JobDefinition`) and the execution tracking
//! records (`WorkflowRun`, `JobRunLog`).

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::artifact::{ArtifactSpec, OutputBinding, ProducedArtifact};

// ---------------------------------------------------------------------------
// Workflow Definition (canonical IR)
// ---------------------------------------------------------------------------

/// The canonical workflow definition, deserialized from YAML.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkflowDefinition {
    /// Workflow name. Filled from the file stem when omitted in YAML.
    #[serde(default)]
    pub name: String,
    /// Source-control trigger binding. `None` means manual-only.
    #[serde(default, rename = "on", skip_serializing_if = "Option::is_none")]
    pub on: Option<TriggerSpec>,
    /// Workflow-wide defaults applied to every job.
    #[serde(default, skip_serializing_if = "Defaults::is_empty")]
    pub defaults: Defaults,
    /// Jobs keyed by name.
    pub jobs: BTreeMap<String, JobDefinition>,
}

impl WorkflowDefinition {
    /// Instance type for `job`: the job's own override, else the workflow default.
    pub fn instance_type_for<'a>(&'a self, job: &'a JobDefinition) -> Option<&'a str> {
        job.resources
            .as_ref()
            .and_then(|r| r.instance_type.as_deref())
            .or_else(|| {
                self.defaults
                    .resources
                    .as_ref()
                    .and_then(|r| r.instance_type.as_deref())
            })
    }

    /// Environment for `job`: workflow defaults overlaid with the job's own env.
    pub fn env_for(&self, job: &JobDefinition) -> BTreeMap<String, String> {
        let mut env = self.defaults.env.clone();
        env.extend(job.env.iter().map(|(k, v)| (k.clone(), v.clone())));
        env
    }

    /// Branch patterns from `on.github.branches.only`, empty when untriggered.
    pub fn push_branches(&self) -> Vec<&str> {
        self.on
            .as_ref()
            .and_then(|on| on.github.as_ref())
            .map(|gh| gh.branches.only.patterns())
            .unwrap_or_default()
    }
}

/// The `on:` block of a workflow.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TriggerSpec {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub github: Option<GithubTrigger>,
}

/// Trigger on pushes to matching branches of the source repository.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GithubTrigger {
    pub branches: BranchFilter,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BranchFilter {
    pub only: OneOrMany,
}

/// A YAML value that may be a single string or a list of strings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum OneOrMany {
    One(String),
    Many(Vec<String>),
}

impl OneOrMany {
    pub fn patterns(&self) -> Vec<&str> {
        match self {
            OneOrMany::One(s) => vec![s.as_str()],
            OneOrMany::Many(v) => v.iter().map(String::as_str).collect(),
        }
    }
}

/// Workflow-wide defaults.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Defaults {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resources: Option<Resources>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub env: BTreeMap<String, String>,
}

impl Defaults {
    pub fn is_empty(&self) -> bool {
        self.resources.is_none() && self.env.is_empty()
    }
}

/// Compute resources requested by a job.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Resources {
    /// Hardware tier name (e.g. `P4000`, `C5`). A scheduling hint for the runner.
    #[serde(
        default,
        rename = "instance-type",
        skip_serializing_if = "Option::is_none"
    )]
    pub instance_type: Option<String>,
}

// ---------------------------------------------------------------------------
// Job Definition
// ---------------------------------------------------------------------------

/// A single job in the workflow DAG.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobDefinition {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resources: Option<Resources>,
    /// Jobs that must succeed before this one starts (DAG edges).
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub needs: Vec<String>,
    /// Named inputs, mounted read-only at `/inputs/<name>`.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub inputs: BTreeMap<String, InputSpec>,
    /// Named outputs, written at `/outputs/<name>`.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub outputs: BTreeMap<String, ArtifactSpec>,
    /// The action that executes the job.
    pub uses: Action,
    /// Action parameters.
    #[serde(default)]
    pub with: ActionParams,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub env: BTreeMap<String, String>,
}

/// An input binding.
///
/// Either the short form `job.outputs.name` or an external artifact:
/// ```yaml
/// type: dataset
/// with:
///   ref: gradient-lsun-cat-extracted:latest
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum InputSpec {
    Binding(String),
    Artifact(ArtifactSpec),
}

impl InputSpec {
    /// The upstream output this input reads from, if it is a binding.
    pub fn binding(&self) -> Option<OutputBinding> {
        match self {
            InputSpec::Binding(s) => OutputBinding::parse(s),
            InputSpec::Artifact(_) => None,
        }
    }
}

/// The built-in actions a job can use.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Action {
    /// Run `image` with a literal argument vector.
    #[serde(rename = "container@v1")]
    Container,
    /// Run an inline shell script inside `image`.
    #[serde(rename = "script@v1")]
    Script,
    /// Clone a git repository into the job's single output.
    #[serde(rename = "git-checkout@v1")]
    GitCheckout,
}

impl std::fmt::Display for Action {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Action::Container => write!(f, "container@v1"),
            Action::Script => write!(f, "script@v1"),
            Action::GitCheckout => write!(f, "git-checkout@v1"),
        }
    }
}

/// Parameters for the job's action. Which fields are required depends on `uses`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActionParams {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub args: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub script: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    #[serde(default, rename = "ref", skip_serializing_if = "Option::is_none")]
    pub git_ref: Option<String>,
}

// ---------------------------------------------------------------------------
// Execution Status
// ---------------------------------------------------------------------------

/// Overall status of a workflow run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkflowRunStatus {
    Pending,
    Running,
    Succeeded,
    Failed,
    Cancelled,
}

impl WorkflowRunStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Succeeded | Self::Failed | Self::Cancelled)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Running => "running",
            Self::Succeeded => "succeeded",
            Self::Failed => "failed",
            Self::Cancelled => "cancelled",
        }
    }
}

/// Status of a single job within a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    Pending,
    Running,
    Succeeded,
    Failed,
    /// Not started because a transitive predecessor failed.
    Skipped,
    /// Not started, or killed, because the run was cancelled.
    Cancelled,
}

impl JobStatus {
    pub fn is_terminal(self) -> bool {
        !matches!(self, Self::Pending | Self::Running)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Running => "running",
            Self::Succeeded => "succeeded",
            Self::Failed => "failed",
            Self::Skipped => "skipped",
            Self::Cancelled => "cancelled",
        }
    }
}

// ---------------------------------------------------------------------------
// Run records
// ---------------------------------------------------------------------------

/// A single execution instance of a workflow.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkflowRun {
    /// UUIDv7 run ID.
    pub id: Uuid,
    pub workflow_name: String,
    pub status: WorkflowRunStatus,
    /// How this run was triggered (`manual`, `push`).
    pub trigger_type: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub trigger_payload: Option<serde_json::Value>,
    pub started_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub finished_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Execution log for a single job within a run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobRunLog {
    /// UUIDv7 log ID.
    pub id: Uuid,
    pub run_id: Uuid,
    pub job_name: String,
    pub status: JobStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub instance_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub exit_code: Option<i32>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub artifacts: Vec<ProducedArtifact>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub started_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub finished_at: Option<DateTime<Utc>>,
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::artifact::ArtifactKind;

    const SAMPLE: &str = r#"
on:
  github:
    branches:
      only: main
defaults:
  resources:
    instance-type: P4000
  env:
    TF_CPP_MIN_LOG_LEVEL: "2"
jobs:
  cloneRepo:
    outputs:
      repo:
        type: volume
    uses: git-checkout@v1
    with:
      url: https://github.com/NVlabs/stylegan2.git
  fetch:
    resources:
      instance-type: C5
    outputs:
      archive:
        type: dataset
        with:
          ref: cats-raw
    uses: container@v1
    with:
      image: ubuntu:18.04
      args: ["bash", "-c", "echo hi"]
  extract:
    needs: [cloneRepo, fetch]
    inputs:
      repo: cloneRepo.outputs.repo
      archive: fetch.outputs.archive
      extra:
        type: dataset
        with:
          ref: cats-extra:v2
    outputs:
      images:
        type: dataset
        with:
          ref: cats-extracted
    env:
      TF_CPP_MIN_LOG_LEVEL: "0"
    uses: script@v1
    with:
      image: tensorflow/tensorflow:1.14.0-gpu-py3
      script: |-
        python /inputs/repo/dataset_tool.py
"#;

    #[test]
    fn test_workflow_definition_yaml_parse() {
        let def: WorkflowDefinition = serde_yaml_ng::from_str(SAMPLE).expect("parse");
        assert_eq!(def.jobs.len(), 3);
        assert_eq!(def.push_branches(), vec!["main"]);

        let extract = &def.jobs["extract"];
        assert_eq!(extract.uses, Action::Script);
        assert_eq!(extract.needs, vec!["cloneRepo", "fetch"]);
        assert_eq!(extract.inputs.len(), 3);
        assert_eq!(
            extract.inputs["repo"].binding().unwrap().job,
            "cloneRepo"
        );
        match &extract.inputs["extra"] {
            InputSpec::Artifact(spec) => {
                assert_eq!(spec.kind, ArtifactKind::Dataset);
                assert_eq!(spec.reference(), Some("cats-extra:v2"));
            }
            other => panic!("expected artifact input, got {other:?}"),
        }

        let fetch = &def.jobs["fetch"];
        assert_eq!(fetch.uses, Action::Container);
        assert_eq!(fetch.with.args.len(), 3);
    }

    #[test]
    fn test_instance_type_and_env_resolution() {
        let def: WorkflowDefinition = serde_yaml_ng::from_str(SAMPLE).unwrap();
        assert_eq!(def.instance_type_for(&def.jobs["fetch"]), Some("C5"));
        assert_eq!(def.instance_type_for(&def.jobs["extract"]), Some("P4000"));

        // A job that is not part of the definition still resolves its own tier.
        let detached = def.jobs["fetch"].clone();
        let tier = def.instance_type_for(&detached);
        assert_eq!(tier, Some("C5"));

        let env = def.env_for(&def.jobs["extract"]);
        assert_eq!(env["TF_CPP_MIN_LOG_LEVEL"], "0");
        let env = def.env_for(&def.jobs["fetch"]);
        assert_eq!(env["TF_CPP_MIN_LOG_LEVEL"], "2");
    }

    #[test]
    fn test_branch_list_form() {
        let yaml = r#"
on:
  github:
    branches:
      only: [main, "release/*"]
jobs:
  a:
    uses: container@v1
    with:
      image: alpine
      args: ["true"]
"#;
        let def: WorkflowDefinition = serde_yaml_ng::from_str(yaml).unwrap();
        assert_eq!(def.push_branches(), vec!["main", "release/*"]);
    }

    #[test]
    fn test_untriggered_workflow_has_no_branches() {
        let yaml = "jobs:\n  a:\n    uses: container@v1\n    with:\n      image: alpine\n      args: [\"true\"]\n";
        let def: WorkflowDefinition = serde_yaml_ng::from_str(yaml).unwrap();
        assert!(def.push_branches().is_empty());
        assert!(def.defaults.is_empty());
    }

    #[test]
    fn test_unknown_action_rejected() {
        let yaml = "jobs:\n  a:\n    uses: magic@v9\n";
        assert!(serde_yaml_ng::from_str::<WorkflowDefinition>(yaml).is_err());
    }

    #[test]
    fn test_status_helpers() {
        assert!(JobStatus::Skipped.is_terminal());
        assert!(!JobStatus::Running.is_terminal());
        assert!(WorkflowRunStatus::Failed.is_terminal());
        assert!(!WorkflowRunStatus::Pending.is_terminal());

        let json = serde_json::to_string(&JobStatus::Skipped).unwrap();
        assert_eq!(json, "\"skipped\"");
        assert_eq!(JobStatus::Skipped.as_str(), "skipped");
    }

    #[test]
    fn test_definition_serialize_roundtrip() {
        let def: WorkflowDefinition = serde_yaml_ng::from_str(SAMPLE).unwrap();
        let yaml = serde_yaml_ng::to_string(&def).unwrap();
        assert!(yaml.contains("git-checkout@v1"));
        assert!(yaml.contains("instance-type: P4000"));
        let back: WorkflowDefinition = serde_yaml_ng::from_str(&yaml).unwrap();
        assert_eq!(back.jobs.len(), def.jobs.len());
        assert_eq!(back.jobs["extract"].inputs, def.jobs["extract"].inputs);
    }
}

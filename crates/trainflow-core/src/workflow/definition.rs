//! Workflow definition parsing, validation, and filesystem operations.
//!
//! Converts YAML files into the canonical `WorkflowDefinition` IR, validates
//! structural constraints (names, dependencies, output bindings, action
//! parameters, dataset write conflicts), and discovers workflow files on disk.

use std::collections::{BTreeMap, HashSet};
use std::path::{Path, PathBuf};

use thiserror::Error;
use trainflow_types::artifact::{ArtifactKind, ArtifactSpec, DatasetRef};
use trainflow_types::workflow::{Action, InputSpec, JobDefinition, WorkflowDefinition};

use super::dag::JobGraph;

// ---------------------------------------------------------------------------
// Error type
// ---------------------------------------------------------------------------

/// Errors that can occur during workflow operations.
#[derive(Debug, Error)]
pub enum WorkflowError {
    /// YAML parse failure.
    #[error("parse error: {0}")]
    ParseError(String),

    /// Structural validation failure.
    #[error("validation error: {0}")]
    ValidationError(String),

    /// Filesystem I/O failure.
    #[error("I/O error: {0}")]
    IoError(#[from] std::io::Error),

    /// Dependency graph contains a cycle.
    #[error("cycle detected: {0}")]
    CycleDetected(String),

    /// A job needs a job that does not exist.
    #[error("unknown dependency: {0}")]
    UnknownDependency(String),

    /// An input binding references an output that does not exist or is not upstream.
    #[error("unknown output reference: {0}")]
    UnknownOutput(String),

    /// Two concurrently schedulable jobs write the same dataset.
    #[error(
        "dataset '{dataset}' is written by '{first}' and '{second}', which may run concurrently"
    )]
    DatasetWriteConflict {
        dataset: String,
        first: String,
        second: String,
    },
}

// ---------------------------------------------------------------------------
// Parsing
// ---------------------------------------------------------------------------

/// Parse a YAML string into a validated `WorkflowDefinition`.
///
/// The YAML must carry a `name`; use [`load_workflow_file`] to default the
/// name from the file stem.
pub fn parse_workflow_yaml(yaml: &str) -> Result<WorkflowDefinition, WorkflowError> {
    let def = parse_unvalidated(yaml)?;
    validate_definition(&def)?;
    Ok(def)
}

/// Serialize a `WorkflowDefinition` to a YAML string.
pub fn serialize_workflow_yaml(def: &WorkflowDefinition) -> Result<String, WorkflowError> {
    serde_yaml_ng::to_string(def).map_err(|e| WorkflowError::ParseError(e.to_string()))
}

fn parse_unvalidated(yaml: &str) -> Result<WorkflowDefinition, WorkflowError> {
    serde_yaml_ng::from_str(yaml).map_err(|e| WorkflowError::ParseError(e.to_string()))
}

// ---------------------------------------------------------------------------
// Validation
// ---------------------------------------------------------------------------

fn is_identifier(s: &str) -> bool {
    !s.is_empty() && s.chars().all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
}

/// Validate structural constraints on a `WorkflowDefinition`.
///
/// Checks:
/// - Workflow, job, input and output names are identifiers
/// - At least one job exists
/// - `needs` entries exist, are unique and never self-referential
/// - Action parameters match the action
/// - Dataset outputs carry an unpinned ref; volumes carry none
/// - Input bindings point at declared outputs of upstream jobs
/// - The dependency graph is acyclic
/// - No two concurrently schedulable jobs write the same dataset
pub fn validate_definition(def: &WorkflowDefinition) -> Result<(), WorkflowError> {
    if def.name.is_empty() {
        return Err(WorkflowError::ValidationError(
            "workflow name must not be empty".to_string(),
        ));
    }
    if !is_identifier(&def.name) {
        return Err(WorkflowError::ValidationError(format!(
            "workflow name '{}' contains invalid characters (only alphanumerics, '-' and '_' allowed)",
            def.name
        )));
    }

    if def.jobs.is_empty() {
        return Err(WorkflowError::ValidationError(
            "workflow must have at least one job".to_string(),
        ));
    }

    for (name, job) in &def.jobs {
        if !is_identifier(name) {
            return Err(WorkflowError::ValidationError(format!(
                "job name '{name}' contains invalid characters"
            )));
        }
        validate_needs(def, name, job)?;
        validate_action(name, job)?;
        validate_outputs(name, job)?;
    }

    // Bindings must name declared outputs before reachability is meaningful.
    for (name, job) in &def.jobs {
        validate_inputs(def, name, job)?;
    }

    let graph = JobGraph::new(def)?;

    for (name, job) in &def.jobs {
        let ancestors = graph.ancestors(name);
        for (input, spec) in &job.inputs {
            if let Some(binding) = spec.binding() {
                if !ancestors.contains(binding.job.as_str()) {
                    return Err(WorkflowError::UnknownOutput(format!(
                        "input '{input}' of job '{name}' reads '{binding}', but '{}' is not in the job's needs chain",
                        binding.job
                    )));
                }
            }
        }
    }

    validate_dataset_writers(def, &graph)
}

fn validate_needs(
    def: &WorkflowDefinition,
    name: &str,
    job: &JobDefinition,
) -> Result<(), WorkflowError> {
    let mut seen = HashSet::new();
    for dep in &job.needs {
        if dep == name {
            return Err(WorkflowError::ValidationError(format!(
                "job '{name}' cannot need itself"
            )));
        }
        if !def.jobs.contains_key(dep) {
            return Err(WorkflowError::UnknownDependency(format!(
                "job '{name}' needs unknown job '{dep}'"
            )));
        }
        if !seen.insert(dep.as_str()) {
            return Err(WorkflowError::ValidationError(format!(
                "job '{name}' lists '{dep}' in needs more than once"
            )));
        }
    }
    Ok(())
}

fn validate_action(name: &str, job: &JobDefinition) -> Result<(), WorkflowError> {
    let missing = |field: &str| {
        WorkflowError::ValidationError(format!(
            "job '{name}' uses {} but has no '{field}'",
            job.uses
        ))
    };
    let blank = |v: &Option<String>| v.as_deref().is_none_or(|s| s.trim().is_empty());

    match job.uses {
        Action::Container => {
            if blank(&job.with.image) {
                return Err(missing("image"));
            }
            if job.with.args.is_empty() {
                return Err(missing("args"));
            }
        }
        Action::Script => {
            if blank(&job.with.image) {
                return Err(missing("image"));
            }
            if blank(&job.with.script) {
                return Err(missing("script"));
            }
        }
        Action::GitCheckout => {
            if blank(&job.with.url) {
                return Err(missing("url"));
            }
            if job.outputs.len() != 1 {
                return Err(WorkflowError::ValidationError(format!(
                    "job '{name}' uses git-checkout@v1 and must declare exactly one output (found {})",
                    job.outputs.len()
                )));
            }
        }
    }
    Ok(())
}

fn validate_outputs(name: &str, job: &JobDefinition) -> Result<(), WorkflowError> {
    for (output, spec) in &job.outputs {
        if !is_identifier(output) {
            return Err(WorkflowError::ValidationError(format!(
                "output name '{output}' of job '{name}' contains invalid characters"
            )));
        }
        match spec.kind {
            ArtifactKind::Volume => {
                if spec.with.is_some() {
                    return Err(WorkflowError::ValidationError(format!(
                        "volume output '{output}' of job '{name}' must not declare a ref"
                    )));
                }
            }
            ArtifactKind::Dataset => {
                let reference = dataset_output_ref(name, output, spec)?;
                if reference.is_pinned() {
                    return Err(WorkflowError::ValidationError(format!(
                        "dataset output '{output}' of job '{name}' must not pin a version ('{reference}')"
                    )));
                }
            }
        }
    }
    Ok(())
}

fn dataset_output_ref(
    job: &str,
    output: &str,
    spec: &ArtifactSpec,
) -> Result<DatasetRef, WorkflowError> {
    let raw = spec.reference().ok_or_else(|| {
        WorkflowError::ValidationError(format!(
            "dataset output '{output}' of job '{job}' has no ref"
        ))
    })?;
    raw.parse::<DatasetRef>().map_err(|e| {
        WorkflowError::ValidationError(format!("output '{output}' of job '{job}': {e}"))
    })
}

fn validate_inputs(
    def: &WorkflowDefinition,
    name: &str,
    job: &JobDefinition,
) -> Result<(), WorkflowError> {
    for (input, spec) in &job.inputs {
        if !is_identifier(input) {
            return Err(WorkflowError::ValidationError(format!(
                "input name '{input}' of job '{name}' contains invalid characters"
            )));
        }
        match spec {
            InputSpec::Binding(raw) => {
                let binding = spec.binding().ok_or_else(|| {
                    WorkflowError::ValidationError(format!(
                        "input '{input}' of job '{name}' must be '<job>.outputs.<name>', got '{raw}'"
                    ))
                })?;
                let upstream = def.jobs.get(&binding.job).ok_or_else(|| {
                    WorkflowError::UnknownOutput(format!(
                        "input '{input}' of job '{name}' references unknown job '{}'",
                        binding.job
                    ))
                })?;
                if !upstream.outputs.contains_key(&binding.output) {
                    return Err(WorkflowError::UnknownOutput(format!(
                        "input '{input}' of job '{name}' references '{binding}', but job '{}' declares no output '{}'",
                        binding.job, binding.output
                    )));
                }
            }
            InputSpec::Artifact(artifact) => {
                if artifact.kind != ArtifactKind::Dataset {
                    return Err(WorkflowError::ValidationError(format!(
                        "input '{input}' of job '{name}': only datasets can be referenced externally"
                    )));
                }
                let raw = artifact.reference().ok_or_else(|| {
                    WorkflowError::ValidationError(format!(
                        "dataset input '{input}' of job '{name}' has no ref"
                    ))
                })?;
                raw.parse::<DatasetRef>().map_err(|e| {
                    WorkflowError::ValidationError(format!(
                        "input '{input}' of job '{name}': {e}"
                    ))
                })?;
            }
        }
    }
    Ok(())
}

/// Reject dataset refs written by two jobs that may run at the same time.
///
/// Parallel writers would race on the dataset's `latest` pointer; writers
/// ordered by `needs` simply produce successive versions.
fn validate_dataset_writers(
    def: &WorkflowDefinition,
    graph: &JobGraph<'_>,
) -> Result<(), WorkflowError> {
    let writers = dataset_writers(def);
    for (dataset, jobs) in &writers {
        for (i, first) in jobs.iter().enumerate() {
            for second in &jobs[i + 1..] {
                if first == second {
                    return Err(WorkflowError::ValidationError(format!(
                        "job '{first}' writes dataset '{dataset}' from more than one output"
                    )));
                }
                if graph.can_run_concurrently(first, second) {
                    return Err(WorkflowError::DatasetWriteConflict {
                        dataset: dataset.clone(),
                        first: first.to_string(),
                        second: second.to_string(),
                    });
                }
            }
        }
    }
    Ok(())
}

/// Map each dataset name to the jobs that write it (one entry per output).
pub fn dataset_writers(def: &WorkflowDefinition) -> BTreeMap<String, Vec<&str>> {
    let mut writers: BTreeMap<String, Vec<&str>> = BTreeMap::new();
    for (name, job) in &def.jobs {
        for spec in job.outputs.values() {
            if spec.kind != ArtifactKind::Dataset {
                continue;
            }
            if let Some(reference) = spec.reference().and_then(|r| r.parse::<DatasetRef>().ok()) {
                writers.entry(reference.name).or_default().push(name.as_str());
            }
        }
    }
    writers
}

// ---------------------------------------------------------------------------
// Filesystem operations
// ---------------------------------------------------------------------------

/// Load a workflow definition from a YAML file.
///
/// When the YAML has no `name`, the file stem is used.
pub fn load_workflow_file(path: &Path) -> Result<WorkflowDefinition, WorkflowError> {
    let content = std::fs::read_to_string(path)?;
    let mut def = parse_unvalidated(&content)?;
    if def.name.is_empty() {
        def.name = path
            .file_stem()
            .and_then(|s| s.to_str())
            .unwrap_or_default()
            .to_string();
    }
    validate_definition(&def)?;
    Ok(def)
}

/// Save a workflow definition to a YAML file.
///
/// Creates parent directories if they don't exist.
pub fn save_workflow_file(path: &Path, def: &WorkflowDefinition) -> Result<(), WorkflowError> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let yaml = serialize_workflow_yaml(def)?;
    std::fs::write(path, yaml)?;
    Ok(())
}

/// Discover all workflow YAML files under `base_dir`.
///
/// Scans for `.yaml` and `.yml` files recursively. Files that fail to parse
/// or validate are logged and skipped.
pub fn discover_workflows(
    base_dir: &Path,
) -> Result<Vec<(PathBuf, WorkflowDefinition)>, WorkflowError> {
    let mut results = Vec::new();
    if !base_dir.exists() {
        return Ok(results);
    }
    discover_recursive(base_dir, &mut results)?;
    results.sort_by(|a, b| a.0.cmp(&b.0));
    Ok(results)
}

fn discover_recursive(
    dir: &Path,
    results: &mut Vec<(PathBuf, WorkflowDefinition)>,
) -> Result<(), WorkflowError> {
    for entry in std::fs::read_dir(dir)? {
        let path = entry?.path();
        if path.is_dir() {
            discover_recursive(&path, results)?;
        } else if path
            .extension()
            .is_some_and(|ext| ext == "yaml" || ext == "yml")
        {
            match load_workflow_file(&path) {
                Ok(def) => results.push((path, def)),
                Err(e) => {
                    tracing::warn!(?path, error = %e, "skipping invalid workflow file");
                }
            }
        }
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

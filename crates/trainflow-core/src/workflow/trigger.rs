//! Push triggers: match source-control push events against workflow branch filters.
//!
//! A workflow opts in with `on.github.branches.only`. `TriggerRegistry` holds
//! the loaded definitions and answers which of them a push should launch.
//! Workflows without an `on` block are manual-only and never match.

use std::sync::Arc;

use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use trainflow_types::workflow::WorkflowDefinition;

/// Trigger type recorded on runs launched by a push.
pub const PUSH_TRIGGER: &str = "push";

/// Trigger type recorded on runs launched from the CLI.
pub const MANUAL_TRIGGER: &str = "manual";

// ---------------------------------------------------------------------------
// Error type
// ---------------------------------------------------------------------------

#[derive(Debug, thiserror::Error)]
pub enum TriggerError {
    /// The payload is not a push event we understand.
    #[error("invalid push payload: {0}")]
    InvalidPayload(String),

    /// The push updated something other than a branch (a tag, a note).
    #[error("push to '{0}' is not a branch push")]
    NotABranch(String),

    /// The push deleted the branch; nothing to build.
    #[error("push deleted branch '{0}'")]
    BranchDeleted(String),
}

// ---------------------------------------------------------------------------
// Push events
// ---------------------------------------------------------------------------

/// The fields of a GitHub-style push payload the engine cares about.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PushEvent {
    /// `owner/name` of the pushed repository, when present.
    pub repository: Option<String>,
    pub branch: String,
    /// Head commit after the push.
    pub commit: Option<String>,
}

/// Extract a `PushEvent` from a webhook body.
///
/// Expects `ref: refs/heads/<branch>`; reads `after` and
/// `repository.full_name` when present.
pub fn parse_push_payload(payload: &Value) -> Result<PushEvent, TriggerError> {
    let git_ref = payload
        .get("ref")
        .and_then(Value::as_str)
        .ok_or_else(|| TriggerError::InvalidPayload("missing 'ref'".to_string()))?;

    let branch = git_ref
        .strip_prefix("refs/heads/")
        .filter(|b| !b.is_empty())
        .ok_or_else(|| TriggerError::NotABranch(git_ref.to_string()))?;

    if payload.get("deleted").and_then(Value::as_bool) == Some(true) {
        return Err(TriggerError::BranchDeleted(branch.to_string()));
    }

    Ok(PushEvent {
        repository: payload
            .pointer("/repository/full_name")
            .and_then(Value::as_str)
            .map(str::to_string),
        branch: branch.to_string(),
        commit: payload
            .get("after")
            .and_then(Value::as_str)
            .map(str::to_string),
    })
}

/// Match `branch` against `pattern`, where `*` matches any run of characters
/// (including `/`). Without a `*` the match is exact.
pub fn branch_matches(pattern: &str, branch: &str) -> bool {
    let p: Vec<char> = pattern.chars().collect();
    let b: Vec<char> = branch.chars().collect();

    let (mut pi, mut bi) = (0, 0);
    // Position of the last `*` seen and the branch index it was tried at.
    let mut star: Option<(usize, usize)> = None;

    while bi < b.len() {
        if pi < p.len() && p[pi] == '*' {
            star = Some((pi, bi));
            pi += 1;
        } else if pi < p.len() && p[pi] == b[bi] {
            pi += 1;
            bi += 1;
        } else if let Some((sp, sb)) = star {
            pi = sp + 1;
            bi = sb + 1;
            star = Some((sp, sb + 1));
        } else {
            return false;
        }
    }
    p[pi..].iter().all(|&c| c == '*')
}

// ---------------------------------------------------------------------------
// TriggerRegistry
// ---------------------------------------------------------------------------

/// Loaded workflow definitions keyed by name.
#[derive(Debug, Default)]
pub struct TriggerRegistry {
    workflows: DashMap<String, Arc<WorkflowDefinition>>,
}

impl TriggerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add or replace a definition. Returns the definition it replaced.
    pub fn register(&self, def: WorkflowDefinition) -> Option<Arc<WorkflowDefinition>> {
        let branches = def.push_branches().join(", ");
        let name = def.name.clone();
        let previous = self.workflows.insert(name.clone(), Arc::new(def));
        tracing::debug!(workflow = %name, branches = %branches, "registered workflow trigger");
        previous
    }

    pub fn unregister(&self, name: &str) -> Option<Arc<WorkflowDefinition>> {
        self.workflows.remove(name).map(|(_, def)| def)
    }

    pub fn get(&self, name: &str) -> Option<Arc<WorkflowDefinition>> {
        self.workflows.get(name).map(|e| Arc::clone(e.value()))
    }

    /// Registered workflow names, sorted.
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.workflows.iter().map(|e| e.key().clone()).collect();
        names.sort();
        names
    }

    pub fn len(&self) -> usize {
        self.workflows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.workflows.is_empty()
    }

    /// Workflows whose branch filter matches the push, sorted by name.
    pub fn matching(&self, event: &PushEvent) -> Vec<Arc<WorkflowDefinition>> {
        let mut matched: Vec<Arc<WorkflowDefinition>> = self
            .workflows
            .iter()
            .filter(|e| {
                e.value()
                    .push_branches()
                    .iter()
                    .any(|pattern| branch_matches(pattern, &event.branch))
            })
            .map(|e| Arc::clone(e.value()))
            .collect();
        matched.sort_by(|a, b| a.name.cmp(&b.name));
        matched
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{job, workflow};
    use serde_json::json;
    use trainflow_types::workflow::{BranchFilter, GithubTrigger, OneOrMany, TriggerSpec};

    fn on_branches(name: &str, only: OneOrMany) -> WorkflowDefinition {
        let mut def = workflow(name, vec![("a", job(&[]))]);
        def.on = Some(TriggerSpec {
            github: Some(GithubTrigger {
                branches: BranchFilter { only },
            }),
        });
        def
    }

    #[test]
    fn parse_branch_push() {
        let payload = json!({
            "ref": "refs/heads/main",
            "after": "9f1c2e",
            "repository": { "full_name": "acme/stylegan2-workflows" }
        });
        let event = parse_push_payload(&payload).unwrap();
        assert_eq!(event.branch, "main");
        assert_eq!(event.commit.as_deref(), Some("9f1c2e"));
        assert_eq!(event.repository.as_deref(), Some("acme/stylegan2-workflows"));
    }

    #[test]
    fn parse_rejects_tags_deletes_and_garbage() {
        let err = parse_push_payload(&json!({"ref": "refs/tags/v1.0"})).unwrap_err();
        assert!(matches!(err, TriggerError::NotABranch(_)));

        let err =
            parse_push_payload(&json!({"ref": "refs/heads/old", "deleted": true})).unwrap_err();
        assert!(matches!(err, TriggerError::BranchDeleted(b) if b == "old"));

        let err = parse_push_payload(&json!({"zen": "Keep it logically awesome."})).unwrap_err();
        assert!(matches!(err, TriggerError::InvalidPayload(_)));
    }

    #[test]
    fn branch_glob_matching() {
        assert!(branch_matches("main", "main"));
        assert!(!branch_matches("main", "main2"));
        assert!(!branch_matches("main", "mai"));
        assert!(branch_matches("release/*", "release/1.2"));
        assert!(branch_matches("release/*", "release/"));
        assert!(!branch_matches("release/*", "hotfix/1.2"));
        assert!(branch_matches("*", "feature/deep/nested"));
        assert!(branch_matches("feat*-gpu", "feature-x-gpu"));
        assert!(!branch_matches("feat*-gpu", "feature-x-cpu"));
        assert!(branch_matches("a*b*c", "aXXbYYbZc"));
    }

    #[test]
    fn registry_matches_by_branch() {
        let registry = TriggerRegistry::new();
        registry.register(on_branches("train", OneOrMany::One("main".to_string())));
        registry.register(on_branches(
            "nightly",
            OneOrMany::Many(vec!["main".to_string(), "release/*".to_string()]),
        ));
        registry.register(workflow("manual-only", vec![("a", job(&[]))]));
        assert_eq!(registry.len(), 3);

        let push = |branch: &str| PushEvent {
            repository: None,
            branch: branch.to_string(),
            commit: None,
        };

        let names = |defs: Vec<Arc<WorkflowDefinition>>| {
            defs.iter().map(|d| d.name.clone()).collect::<Vec<_>>()
        };
        assert_eq!(names(registry.matching(&push("main"))), vec!["nightly", "train"]);
        assert_eq!(names(registry.matching(&push("release/2"))), vec!["nightly"]);
        assert!(registry.matching(&push("dev")).is_empty());
    }

    #[test]
    fn registry_replace_and_remove() {
        let registry = TriggerRegistry::new();
        assert!(registry.register(workflow("wf", vec![("a", job(&[]))])).is_none());
        assert!(registry.register(workflow("wf", vec![("b", job(&[]))])).is_some());
        assert!(registry.get("wf").unwrap().jobs.contains_key("b"));
        assert_eq!(registry.names(), vec!["wf"]);
        assert!(registry.unregister("wf").is_some());
        assert!(registry.is_empty());
    }
}

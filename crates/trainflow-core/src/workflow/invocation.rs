//! Turn a job definition plus its resolved mounts into a `JobInvocation`.

use std::collections::BTreeMap;

use trainflow_types::workflow::{Action, JobDefinition, WorkflowDefinition};
use uuid::Uuid;

use super::definition::WorkflowError;
use crate::runner::{JobCommand, JobInvocation, Mount};

/// Image used by `git-checkout@v1`.
pub const GIT_IMAGE: &str = "alpine/git";

/// Build the invocation for `name`.
///
/// `mounts` must already point at existing host directories; inputs are
/// read-only and outputs writable. The environment is the workflow defaults
/// overlaid with the job's env, plus `TRAINFLOW_RUN_ID`, `TRAINFLOW_JOB` and
/// `TRAINFLOW_INSTANCE_TYPE` (when set).
pub fn build_invocation(
    run_id: Uuid,
    def: &WorkflowDefinition,
    name: &str,
    job: &JobDefinition,
    mounts: Vec<Mount>,
    instance_type: Option<String>,
) -> Result<JobInvocation, WorkflowError> {
    let missing = |field: &str| {
        WorkflowError::ValidationError(format!("job '{name}' uses {} but has no '{field}'", job.uses))
    };

    let (image, command) = match job.uses {
        Action::Container => {
            let image = job.with.image.clone().ok_or_else(|| missing("image"))?;
            if job.with.args.is_empty() {
                return Err(missing("args"));
            }
            (image, JobCommand::Args(job.with.args.clone()))
        }
        Action::Script => {
            let image = job.with.image.clone().ok_or_else(|| missing("image"))?;
            let script = job.with.script.clone().ok_or_else(|| missing("script"))?;
            (image, JobCommand::Script(script))
        }
        Action::GitCheckout => {
            let url = job.with.url.clone().ok_or_else(|| missing("url"))?;
            let target = mounts
                .iter()
                .find(|m| !m.read_only)
                .map(|m| m.container_path.clone())
                .ok_or_else(|| missing("output"))?;
            (GIT_IMAGE.to_string(), git_clone_command(&url, job.with.git_ref.as_deref(), &target))
        }
    };

    let mut env: BTreeMap<String, String> = def.env_for(job);
    env.insert("TRAINFLOW_RUN_ID".to_string(), run_id.to_string());
    env.insert("TRAINFLOW_JOB".to_string(), name.to_string());
    if let Some(tier) = &instance_type {
        env.insert("TRAINFLOW_INSTANCE_TYPE".to_string(), tier.clone());
    }

    Ok(JobInvocation {
        run_id,
        job: name.to_string(),
        image,
        command,
        mounts,
        env,
        instance_type,
    })
}

fn git_clone_command(url: &str, git_ref: Option<&str>, target: &str) -> JobCommand {
    let mut args = vec![
        "git".to_string(),
        "clone".to_string(),
        "--depth".to_string(),
        "1".to_string(),
    ];
    if let Some(r) = git_ref {
        args.push("--branch".to_string());
        args.push(r.to_string());
    }
    args.push(url.to_string());
    args.push(target.to_string());
    JobCommand::Args(args)
}

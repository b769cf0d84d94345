//! Workflow file commands: validate, plan and run.

use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, Result, bail};
use comfy_table::{Cell, Color, ContentArrangement, Table, presets};
use console::style;

use trainflow_core::event::RunSubscription;
use trainflow_core::workflow::dag::build_execution_plan;
use trainflow_core::workflow::definition::load_workflow_file;
use trainflow_core::workflow::executor::{ExecutionResult, WorkflowExecutor};
use trainflow_core::workflow::trigger::MANUAL_TRIGGER;
use trainflow_types::artifact::ArtifactKind;
use trainflow_types::event::WorkflowEvent;
use trainflow_types::workflow::{WorkflowDefinition, WorkflowRunStatus};

use super::{format_duration, job_status_cell};
use crate::state::AppState;

fn load(file: &Path) -> Result<WorkflowDefinition> {
    load_workflow_file(file).with_context(|| format!("invalid workflow file {}", file.display()))
}

// ---------------------------------------------------------------------------
// Validate
// ---------------------------------------------------------------------------

pub fn validate(file: &Path, json: bool) -> Result<()> {
    let def = load(file)?;
    let waves = build_execution_plan(&def)?;

    if json {
        let out = serde_json::json!({
            "valid": true,
            "name": def.name,
            "jobs": def.jobs.len(),
            "waves": waves.len(),
            "push_branches": def.push_branches(),
        });
        println!("{}", serde_json::to_string_pretty(&out)?);
    } else {
        println!(
            "  {} '{}' is valid: {} jobs in {} waves",
            style("*").green().bold(),
            style(&def.name).cyan(),
            def.jobs.len(),
            waves.len()
        );
        let branches = def.push_branches();
        if branches.is_empty() {
            println!("  Trigger: manual only");
        } else {
            println!("  Trigger: push to {}", branches.join(", "));
        }
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Plan
// ---------------------------------------------------------------------------

pub fn plan(file: &Path, json: bool) -> Result<()> {
    let def = load(file)?;
    let waves = build_execution_plan(&def)?;

    if json {
        let out: Vec<_> = waves
            .iter()
            .enumerate()
            .map(|(i, jobs)| serde_json::json!({ "wave": i + 1, "jobs": jobs }))
            .collect();
        println!("{}", serde_json::to_string_pretty(&out)?);
        return Ok(());
    }

    let mut table = Table::new();
    table
        .load_preset(presets::UTF8_FULL_CONDENSED)
        .set_content_arrangement(ContentArrangement::Dynamic)
        .set_header(vec![
            Cell::new("Wave").fg(Color::Cyan),
            Cell::new("Job"),
            Cell::new("Uses"),
            Cell::new("Instance"),
            Cell::new("Needs"),
            Cell::new("Outputs"),
        ]);

    for (i, jobs) in waves.iter().enumerate() {
        for name in jobs {
            let Some(job) = def.jobs.get(*name) else {
                continue;
            };
            table.add_row(vec![
                Cell::new(i + 1),
                Cell::new(name),
                Cell::new(job.uses),
                Cell::new(def.instance_type_for(job).unwrap_or("-")),
                Cell::new(job.needs.join(", ")),
                Cell::new(describe_outputs(job)),
            ]);
        }
    }

    println!();
    println!("  Plan for '{}'", style(&def.name).cyan());
    println!("{table}");
    Ok(())
}

fn describe_outputs(job: &trainflow_types::workflow::JobDefinition) -> String {
    job.outputs
        .iter()
        .map(|(name, spec)| match (spec.kind, spec.reference()) {
            (ArtifactKind::Dataset, Some(reference)) => format!("{name} -> {reference}"),
            (kind, _) => format!("{name} ({kind})"),
        })
        .collect::<Vec<_>>()
        .join("\n")
}

// ---------------------------------------------------------------------------
// Run
// ---------------------------------------------------------------------------

pub async fn run(file: &Path, state: &AppState, json: bool, quiet: bool) -> Result<()> {
    let def = load(file)?;

    let progress = (!json && !quiet).then(|| {
        let events = state.executor.event_bus().subscribe_run(None);
        tokio::spawn(render_progress(events))
    });

    // Ctrl-C cancels the run; running jobs are killed, pending ones reported cancelled.
    let executor = Arc::clone(&state.executor);
    let interrupt = tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            eprintln!("\n  {} cancelling...", style("!").yellow().bold());
            executor.cancel_all();
        }
    });

    let result = state.executor.execute(&def, MANUAL_TRIGGER, None).await;
    interrupt.abort();
    if let Some(handle) = progress {
        // The renderer stops on RunFinished; an executor error never publishes one.
        if result.is_err() {
            handle.abort();
        }
        let _ = handle.await;
    }
    let result = result.with_context(|| format!("workflow '{}' could not run", def.name))?;

    if json {
        println!("{}", serde_json::to_string_pretty(&result_json(&result))?);
    } else if !quiet {
        print_summary(&result);
    }

    if result.status != WorkflowRunStatus::Succeeded {
        bail!(
            "run {} {}: {}",
            result.run_id,
            result.status.as_str(),
            result.error.as_deref().unwrap_or("see job table")
        );
    }
    Ok(())
}

async fn render_progress(mut events: RunSubscription) {
    while let Some(event) = events.next().await {
        println!("{}", progress_line(&event));
    }
}

/// One progress line per event.
pub(crate) fn progress_line(event: &WorkflowEvent) -> String {
    match event {
        WorkflowEvent::RunStarted {
            run_id,
            workflow_name,
            job_count,
            ..
        } => format!(
            "  {} {} ({} jobs, run {})",
            style("▶").cyan().bold(),
            style(workflow_name).cyan(),
            job_count,
            run_id
        ),
        WorkflowEvent::JobStarted { job, instance_type, .. } => match instance_type {
            Some(tier) => format!("  {} {job} on {tier}", style("…").dim()),
            None => format!("  {} {job}", style("…").dim()),
        },
        WorkflowEvent::JobSucceeded {
            job,
            duration_ms,
            artifacts,
            ..
        } => {
            let datasets: Vec<String> = artifacts
                .iter()
                .filter_map(|a| Some(format!("{}:v{}", a.dataset.as_ref()?, a.version?)))
                .collect();
            let mut line = format!(
                "  {} {job} ({})",
                style("✓").green(),
                format_duration(*duration_ms)
            );
            if !datasets.is_empty() {
                line.push_str(&format!(" -> {}", datasets.join(", ")));
            }
            line
        }
        WorkflowEvent::JobFailed { job, error, .. } => {
            format!("  {} {job}: {error}", style("✗").red())
        }
        WorkflowEvent::JobSkipped { job, caused_by, .. } => format!(
            "  {} {job} skipped ({caused_by} did not succeed)",
            style("-").dim()
        ),
        WorkflowEvent::RunFinished {
            status, duration_ms, ..
        } => {
            let status = match status {
                WorkflowRunStatus::Succeeded => style(status.as_str()).green().bold(),
                _ => style(status.as_str()).red().bold(),
            };
            format!("  Run {status} in {}", format_duration(*duration_ms))
        }
    }
}

fn print_summary(result: &ExecutionResult) {
    let mut table = Table::new();
    table
        .load_preset(presets::UTF8_FULL_CONDENSED)
        .set_content_arrangement(ContentArrangement::Dynamic)
        .set_header(vec![
            Cell::new("Job").fg(Color::Cyan),
            Cell::new("Status"),
            Cell::new("Exit"),
            Cell::new("Duration"),
            Cell::new("Error"),
        ]);
    for (name, job) in &result.jobs {
        table.add_row(vec![
            Cell::new(name),
            job_status_cell(job.status),
            Cell::new(job.exit_code.map(|c| c.to_string()).unwrap_or_default()),
            Cell::new(
                job.duration
                    .map(|d| format_duration(d.as_millis() as u64))
                    .unwrap_or_default(),
            ),
            Cell::new(job.error.as_deref().unwrap_or("")),
        ]);
    }
    println!();
    println!("{table}");
}

pub(crate) fn result_json(result: &ExecutionResult) -> serde_json::Value {
    let jobs: serde_json::Map<String, serde_json::Value> = result
        .jobs
        .iter()
        .map(|(name, job)| {
            (
                name.clone(),
                serde_json::json!({
                    "status": job.status,
                    "exit_code": job.exit_code,
                    "artifacts": job.artifacts,
                    "error": job.error,
                    "duration_ms": job.duration.map(|d| d.as_millis() as u64),
                }),
            )
        })
        .collect();
    serde_json::json!({
        "run_id": result.run_id,
        "status": result.status,
        "error": result.error,
        "jobs": jobs,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;
    use std::path::PathBuf;
    use std::time::Duration;
    use trainflow_core::workflow::executor::JobResult;
    use trainflow_types::artifact::ProducedArtifact;
    use trainflow_types::workflow::JobStatus;
    use uuid::Uuid;

    fn shipped(name: &str) -> PathBuf {
        Path::new(env!("CARGO_MANIFEST_DIR"))
            .join("../../workflows")
            .join(name)
    }

    #[test]
    fn shipped_workflows_validate_and_plan() {
        validate(&shipped("stylegan2-prepare-data.yaml"), true).unwrap();
        plan(&shipped("stylegan2-train.yaml"), false).unwrap();
    }

    #[test]
    fn invalid_file_reports_path() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bad.yaml");
        std::fs::write(&path, "jobs:\n  a:\n    uses: script@v1\n    needs: [missing]\n").unwrap();
        let err = validate(&path, false).unwrap_err();
        assert!(format!("{err:#}").contains("bad.yaml"));
    }

    #[test]
    fn progress_lines_name_jobs_and_datasets() {
        let run_id = Uuid::nil();
        let line = progress_line(&WorkflowEvent::JobSucceeded {
            run_id,
            job: "extractImages".into(),
            duration_ms: 42_000,
            artifacts: vec![ProducedArtifact {
                output: "extracted-images".into(),
                kind: ArtifactKind::Dataset,
                dataset: Some("gradient-lsun-cat-extracted".into()),
                version: Some(3),
                digest: Some("abc".into()),
                path: PathBuf::from("/data"),
            }],
        });
        assert!(line.contains("extractImages"));
        assert!(line.contains("42s"));
        assert!(line.contains("gradient-lsun-cat-extracted:v3"));

        let skipped = progress_line(&WorkflowEvent::JobSkipped {
            run_id,
            job: "trainOurModel".into(),
            caused_by: "cloneStyleGAN2Repo".into(),
        });
        assert!(skipped.contains("trainOurModel skipped (cloneStyleGAN2Repo did not succeed)"));
    }

    #[test]
    fn result_json_lists_jobs() {
        let mut jobs = BTreeMap::new();
        jobs.insert(
            "clone".to_string(),
            JobResult {
                status: JobStatus::Failed,
                exit_code: Some(128),
                artifacts: vec![],
                error: Some("exit code 128".into()),
                duration: Some(Duration::from_millis(1500)),
            },
        );
        let result = ExecutionResult {
            run_id: Uuid::nil(),
            status: WorkflowRunStatus::Failed,
            jobs,
            error: Some("1 job failed".into()),
        };
        let out = result_json(&result);
        assert_eq!(out["status"], "failed");
        assert_eq!(out["jobs"]["clone"]["exit_code"], 128);
        assert_eq!(out["jobs"]["clone"]["duration_ms"], 1500);
    }
}

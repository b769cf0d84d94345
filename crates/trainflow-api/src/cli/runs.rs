//! Run history subcommands.

use anyhow::{Context, Result};
use clap::Subcommand;
use comfy_table::{Cell, Color, ContentArrangement, Table, presets};
use console::style;
use uuid::Uuid;

use trainflow_core::repository::run::RunRepository;
use trainflow_types::workflow::{JobRunLog, WorkflowRun};

use super::{format_duration, job_status_cell, run_status_cell};
use crate::state::AppState;

#[derive(Subcommand)]
pub enum RunsCommand {
    /// List recent runs, newest first.
    #[command(alias = "ls")]
    List {
        /// Only runs of this workflow.
        #[arg(long)]
        workflow: Option<String>,

        /// Maximum number of runs to display.
        #[arg(long, default_value = "20")]
        limit: u32,
    },

    /// Show a run and its per-job results.
    Show {
        /// Run UUID.
        run_id: String,
    },
}

pub async fn handle_runs_command(cmd: RunsCommand, state: &AppState, json: bool) -> Result<()> {
    match cmd {
        RunsCommand::List { workflow, limit } => list(state, workflow.as_deref(), limit, json).await,
        RunsCommand::Show { run_id } => show(state, &run_id, json).await,
    }
}

async fn list(state: &AppState, workflow: Option<&str>, limit: u32, json: bool) -> Result<()> {
    let runs = state
        .runs
        .list_runs(workflow, limit)
        .await
        .context("failed to list runs")?;

    if json {
        println!("{}", serde_json::to_string_pretty(&runs)?);
        return Ok(());
    }
    if runs.is_empty() {
        println!("  No runs yet.");
        return Ok(());
    }

    let mut table = Table::new();
    table
        .load_preset(presets::UTF8_FULL_CONDENSED)
        .set_content_arrangement(ContentArrangement::Dynamic)
        .set_header(vec![
            Cell::new("Run ID").fg(Color::Cyan),
            Cell::new("Workflow"),
            Cell::new("Status"),
            Cell::new("Trigger"),
            Cell::new("Started"),
            Cell::new("Duration"),
        ]);
    for run in &runs {
        table.add_row(vec![
            Cell::new(run.id),
            Cell::new(&run.workflow_name),
            run_status_cell(run.status),
            Cell::new(&run.trigger_type),
            Cell::new(run.started_at.format("%Y-%m-%d %H:%M:%S").to_string()),
            Cell::new(run_duration(run).unwrap_or_default()),
        ]);
    }
    println!("{table}");
    Ok(())
}

async fn show(state: &AppState, run_id: &str, json: bool) -> Result<()> {
    let run_id: Uuid = run_id
        .parse()
        .with_context(|| format!("'{run_id}' is not a run id"))?;
    let (run, jobs) = state.executor.checkpoint().load_run(run_id).await?;

    if json {
        let out = serde_json::json!({ "run": run, "jobs": jobs });
        println!("{}", serde_json::to_string_pretty(&out)?);
        return Ok(());
    }

    println!();
    println!(
        "  {} {} ({})",
        style(&run.workflow_name).cyan().bold(),
        run.id,
        run.status.as_str()
    );
    println!("  Trigger: {}", run.trigger_type);
    println!("  Started: {}", run.started_at.format("%Y-%m-%d %H:%M:%S"));
    if let Some(duration) = run_duration(&run) {
        println!("  Duration: {duration}");
    }
    if let Some(error) = &run.error {
        println!("  Error: {}", style(error).red());
    }
    println!();
    println!("{}", job_table(&jobs));
    Ok(())
}

fn job_table(jobs: &[JobRunLog]) -> Table {
    let mut table = Table::new();
    table
        .load_preset(presets::UTF8_FULL_CONDENSED)
        .set_content_arrangement(ContentArrangement::Dynamic)
        .set_header(vec![
            Cell::new("Job").fg(Color::Cyan),
            Cell::new("Status"),
            Cell::new("Instance"),
            Cell::new("Exit"),
            Cell::new("Artifacts"),
            Cell::new("Error"),
        ]);
    for job in jobs {
        let artifacts = job
            .artifacts
            .iter()
            .map(|a| match (&a.dataset, a.version) {
                (Some(name), Some(v)) => format!("{}: {name}:v{v}", a.output),
                _ => a.output.clone(),
            })
            .collect::<Vec<_>>()
            .join("\n");
        table.add_row(vec![
            Cell::new(&job.job_name),
            job_status_cell(job.status),
            Cell::new(job.instance_type.as_deref().unwrap_or("-")),
            Cell::new(job.exit_code.map(|c| c.to_string()).unwrap_or_default()),
            Cell::new(artifacts),
            Cell::new(job.error.as_deref().unwrap_or("")),
        ]);
    }
    table
}

fn run_duration(run: &WorkflowRun) -> Option<String> {
    let finished = run.finished_at?;
    let ms = (finished - run.started_at).num_milliseconds().max(0) as u64;
    Some(format_duration(ms))
}

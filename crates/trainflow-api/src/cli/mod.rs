//! CLI command definitions for the `tflow` binary.
//!
//! Uses clap derive macros. Workflow-file commands take a path
//! (`tflow run workflows/stylegan2-train.yaml`); history and dataset
//! commands are grouped under `runs` and `datasets`.

pub mod datasets;
pub mod runs;
pub mod workflow;

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use clap_complete::Shell;
use comfy_table::{Cell, Color};
use trainflow_types::config::RunnerKind;
use trainflow_types::workflow::{JobStatus, WorkflowRunStatus};

/// Run containerized ML pipelines defined as job DAGs.
#[derive(Parser)]
#[command(name = "tflow", version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Output machine-readable JSON instead of styled text.
    #[arg(long, global = true)]
    pub json: bool,

    /// Suppress all output except errors.
    #[arg(long, global = true)]
    pub quiet: bool,

    /// Detailed output (-v for info logs, -vv for debug, -vvv for trace).
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Parse and validate a workflow file.
    Validate {
        /// Path to the workflow YAML file.
        file: PathBuf,
    },

    /// Show the parallel execution waves of a workflow.
    Plan {
        /// Path to the workflow YAML file.
        file: PathBuf,
    },

    /// Run a workflow to completion.
    Run {
        /// Path to the workflow YAML file.
        file: PathBuf,

        /// Job runner to use (overrides `runner` in config.toml).
        #[arg(long, value_name = "docker|local")]
        runner: Option<RunnerKind>,
    },

    /// Start the webhook and REST API server.
    Serve {
        /// Port to listen on (defaults to `server.port` in config.toml).
        #[arg(long, short)]
        port: Option<u16>,

        /// Host to bind to (defaults to `server.host` in config.toml).
        #[arg(long)]
        host: Option<String>,

        /// Job runner for triggered runs.
        #[arg(long, value_name = "docker|local")]
        runner: Option<RunnerKind>,
    },

    /// Inspect run history.
    Runs {
        #[command(subcommand)]
        command: runs::RunsCommand,
    },

    /// Inspect and tag versioned datasets.
    Datasets {
        #[command(subcommand)]
        command: datasets::DatasetsCommand,
    },

    /// Generate shell completions.
    Completions {
        /// Shell to generate completions for.
        shell: Shell,
    },
}

pub(crate) fn run_status_cell(status: WorkflowRunStatus) -> Cell {
    let color = match status {
        WorkflowRunStatus::Pending => Color::Yellow,
        WorkflowRunStatus::Running => Color::Blue,
        WorkflowRunStatus::Succeeded => Color::Green,
        WorkflowRunStatus::Failed => Color::Red,
        WorkflowRunStatus::Cancelled => Color::DarkYellow,
    };
    Cell::new(status.as_str()).fg(color)
}

pub(crate) fn job_status_cell(status: JobStatus) -> Cell {
    let color = match status {
        JobStatus::Pending => Color::Yellow,
        JobStatus::Running => Color::Blue,
        JobStatus::Succeeded => Color::Green,
        JobStatus::Failed => Color::Red,
        JobStatus::Skipped => Color::DarkGrey,
        JobStatus::Cancelled => Color::DarkYellow,
    };
    Cell::new(status.as_str()).fg(color)
}

/// Human-readable duration: `850ms`, `42s`, `3m07s`, `2h05m`.
pub(crate) fn format_duration(ms: u64) -> String {
    let secs = ms / 1000;
    match secs {
        0 => format!("{ms}ms"),
        1..=59 => format!("{secs}s"),
        60..=3599 => format!("{}m{:02}s", secs / 60, secs % 60),
        _ => format!("{}h{:02}m", secs / 3600, (secs % 3600) / 60),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn cli_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn parses_run_with_runner_override() {
        let cli = Cli::try_parse_from(["tflow", "--json", "run", "wf.yaml", "--runner", "local"]).unwrap();
        assert!(cli.json);
        match cli.command {
            Commands::Run { file, runner } => {
                assert_eq!(file, PathBuf::from("wf.yaml"));
                assert_eq!(runner, Some(RunnerKind::Local));
            }
            _ => panic!("expected run"),
        }
    }

    #[test]
    fn rejects_unknown_runner() {
        assert!(Cli::try_parse_from(["tflow", "run", "wf.yaml", "--runner", "k8s"]).is_err());
    }

    #[test]
    fn global_flags_after_subcommand() {
        let cli = Cli::try_parse_from(["tflow", "runs", "list", "-vv", "--quiet"]).unwrap();
        assert_eq!(cli.verbose, 2);
        assert!(cli.quiet);
    }

    #[test]
    fn parses_dataset_tag() {
        let cli =
            Cli::try_parse_from(["tflow", "datasets", "tag", "gradient-lsun-cat", "v1", "golden"]).unwrap();
        match cli.command {
            Commands::Datasets {
                command: datasets::DatasetsCommand::Tag { name, version, tag },
            } => {
                assert_eq!(name, "gradient-lsun-cat");
                assert_eq!(version, "v1");
                assert_eq!(tag, "golden");
            }
            _ => panic!("expected datasets tag"),
        }
    }

    #[test]
    fn durations() {
        assert_eq!(format_duration(850), "850ms");
        assert_eq!(format_duration(42_000), "42s");
        assert_eq!(format_duration(187_000), "3m07s");
        assert_eq!(format_duration(7_500_000), "2h05m");
    }
}

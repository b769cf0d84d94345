//! Engine lifecycle events published on the event bus.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::artifact::ProducedArtifact;
use crate::workflow::WorkflowRunStatus;

/// Events emitted while a workflow run progresses.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum WorkflowEvent {
    RunStarted {
        run_id: Uuid,
        workflow_name: String,
        trigger_type: String,
        job_count: usize,
    },
    JobStarted {
        run_id: Uuid,
        job: String,
        instance_type: Option<String>,
    },
    JobSucceeded {
        run_id: Uuid,
        job: String,
        duration_ms: u64,
        artifacts: Vec<ProducedArtifact>,
    },
    JobFailed {
        run_id: Uuid,
        job: String,
        exit_code: Option<i32>,
        error: String,
    },
    JobSkipped {
        run_id: Uuid,
        job: String,
        /// The failed (or cancelled) job that caused the skip.
        caused_by: String,
    },
    RunFinished {
        run_id: Uuid,
        workflow_name: String,
        status: WorkflowRunStatus,
        duration_ms: u64,
    },
}

impl WorkflowEvent {
    /// The run this event belongs to.
    pub fn run_id(&self) -> Uuid {
        match self {
            WorkflowEvent::RunStarted { run_id, .. }
            | WorkflowEvent::JobStarted { run_id, .. }
            | WorkflowEvent::JobSucceeded { run_id, .. }
            | WorkflowEvent::JobFailed { run_id, .. }
            | WorkflowEvent::JobSkipped { run_id, .. }
            | WorkflowEvent::RunFinished { run_id, .. } => *run_id,
        }
    }
}

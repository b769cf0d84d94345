//! Read-only run history endpoints.

use axum::extract::{Path, Query, State};
use serde::Deserialize;
use uuid::Uuid;

use trainflow_core::repository::run::RunRepository;
use trainflow_types::workflow::WorkflowRun;

use crate::http::error::AppError;
use crate::http::response::{ApiResponse, RequestTimer};
use crate::state::AppState;

const MAX_LIMIT: u32 = 200;

#[derive(Debug, Deserialize)]
pub struct ListRunsQuery {
    /// Only runs of this workflow.
    pub workflow: Option<String>,
    #[serde(default = "default_limit")]
    pub limit: u32,
}

fn default_limit() -> u32 {
    20
}

/// GET /api/v1/runs - Recent runs, newest first.
pub async fn list_runs(
    State(state): State<AppState>,
    Query(query): Query<ListRunsQuery>,
) -> Result<ApiResponse<Vec<WorkflowRun>>, AppError> {
    let timer = RequestTimer::start();
    let runs = state
        .runs
        .list_runs(query.workflow.as_deref(), query.limit.clamp(1, MAX_LIMIT))
        .await?;
    Ok(ApiResponse::success(runs, &timer).with_link("self", "/api/v1/runs"))
}

/// GET /api/v1/runs/{id} - A run with its job logs.
pub async fn get_run(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<ApiResponse<serde_json::Value>, AppError> {
    let timer = RequestTimer::start();
    let run_id: Uuid = id
        .parse()
        .map_err(|_| AppError::Validation(format!("'{id}' is not a run id")))?;
    let (run, jobs) = state.executor.checkpoint().load_run(run_id).await?;

    Ok(ApiResponse::success(serde_json::json!({ "run": run, "jobs": jobs }), &timer)
        .with_link("self", format!("/api/v1/runs/{run_id}"))
        .with_link("runs", "/api/v1/runs"))
}

use axum::extract::State;

use crate::http::response::{ApiResponse, RequestTimer};
use crate::state::AppState;

/// GET /api/v1/health
pub async fn health(State(state): State<AppState>) -> ApiResponse<serde_json::Value> {
    let timer = RequestTimer::start();
    ApiResponse::success(
        serde_json::json!({
            "status": "ok",
            "version": env!("CARGO_PKG_VERSION"),
            "active_runs": state.executor.active_runs().len(),
            "workflows": state.triggers.names(),
        }),
        &timer,
    )
}

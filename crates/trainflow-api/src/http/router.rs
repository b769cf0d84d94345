//! Axum router configuration.
//!
//! All routes are under `/api/v1/`, wrapped in a request tracing layer.

use axum::Router;
use axum::routing::{get, post};
use tower_http::trace::TraceLayer;

use crate::http::handlers;
use crate::state::AppState;

pub fn build_router(state: AppState) -> Router {
    let api_routes = Router::new()
        .route("/health", get(handlers::health::health))
        .route("/webhooks/push", post(handlers::webhook::receive_push))
        .route("/runs", get(handlers::runs::list_runs))
        .route("/runs/{id}", get(handlers::runs::get_run));

    Router::new()
        .nest("/api/v1", api_routes)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

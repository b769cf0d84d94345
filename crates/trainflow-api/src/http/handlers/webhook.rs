//! Push webhook receiver.
//!
//! Verifies the body signature when a secret is configured, matches the
//! pushed branch against every registered workflow's `on.github.branches`
//! filter and starts each match in the background.

use std::sync::Arc;

use axum::body::Bytes;
use axum::extract::State;
use axum::http::HeaderMap;
use serde_json::Value;

use trainflow_core::workflow::executor::WorkflowExecutor;
use trainflow_core::workflow::trigger::{PUSH_TRIGGER, TriggerError, parse_push_payload};
use trainflow_infra::webhook::{SIGNATURE_HEADER, verify_signature};

use crate::http::error::AppError;
use crate::http::response::{ApiResponse, RequestTimer};
use crate::state::AppState;

/// GitHub names the delivery type in this header; only `push` starts runs.
const EVENT_HEADER: &str = "x-github-event";

/// POST /api/v1/webhooks/push
pub async fn receive_push(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<ApiResponse<Value>, AppError> {
    let timer = RequestTimer::start();

    if let Some(secret) = &state.webhook_secret {
        let signature = headers.get(SIGNATURE_HEADER).and_then(|v| v.to_str().ok());
        verify_signature(secret, &body, signature)?;
    }

    let event = headers
        .get(EVENT_HEADER)
        .and_then(|v| v.to_str().ok())
        .unwrap_or("push");
    if event != "push" {
        tracing::debug!(event, "ignoring non-push delivery");
        return Ok(ApiResponse::success(ignored(&format!("'{event}' event")), &timer));
    }

    let payload: Value = serde_json::from_slice(&body)
        .map_err(|e| AppError::Validation(format!("body is not JSON: {e}")))?;
    let push = match parse_push_payload(&payload) {
        Ok(push) => push,
        Err(TriggerError::InvalidPayload(msg)) => return Err(AppError::Validation(msg)),
        Err(other) => {
            tracing::info!("ignoring push: {other}");
            return Ok(ApiResponse::success(ignored(&other.to_string()), &timer));
        }
    };

    let matched = state.triggers.matching(&push);
    tracing::info!(
        branch = push.branch.as_str(),
        commit = push.commit.as_deref().unwrap_or(""),
        workflows = matched.len(),
        "push received"
    );

    let mut triggered = Vec::with_capacity(matched.len());
    for def in matched {
        triggered.push(def.name.clone());
        let executor = Arc::clone(&state.executor);
        let payload = payload.clone();
        tokio::spawn(async move {
            match executor.execute(&def, PUSH_TRIGGER, Some(payload)).await {
                Ok(result) => tracing::info!(
                    run_id = %result.run_id,
                    workflow = def.name.as_str(),
                    status = result.status.as_str(),
                    "push-triggered run finished"
                ),
                Err(e) => tracing::error!(
                    workflow = def.name.as_str(),
                    error = %e,
                    "push-triggered run failed to execute"
                ),
            }
        });
    }

    Ok(ApiResponse::accepted(
        serde_json::json!({
            "branch": push.branch,
            "commit": push.commit,
            "triggered": triggered,
        }),
        &timer,
    )
    .with_link("runs", "/api/v1/runs"))
}

fn ignored(reason: &str) -> Value {
    serde_json::json!({ "triggered": [], "ignored": reason })
}

//! Application error type mapping to HTTP status codes and envelope format.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde_json::json;

use trainflow_core::workflow::checkpoint::CheckpointError;
use trainflow_infra::webhook::WebhookError;
use trainflow_types::error::RepositoryError;

/// Application-level error that maps to HTTP responses.
#[derive(Debug)]
pub enum AppError {
    /// The requested run (or other entity) does not exist.
    NotFound(String),
    /// Webhook signature missing or wrong.
    Unauthorized(String),
    /// Malformed request.
    Validation(String),
    Internal(String),
}

impl From<CheckpointError> for AppError {
    fn from(e: CheckpointError) -> Self {
        match e {
            CheckpointError::RunNotFound(id) => AppError::NotFound(format!("run {id} not found")),
            other => AppError::Internal(other.to_string()),
        }
    }
}

impl From<RepositoryError> for AppError {
    fn from(e: RepositoryError) -> Self {
        match &e {
            RepositoryError::NotFound => AppError::NotFound(e.to_string()),
            _ => AppError::Internal(e.to_string()),
        }
    }
}

impl From<WebhookError> for AppError {
    fn from(e: WebhookError) -> Self {
        match &e {
            WebhookError::InvalidKey(_) => AppError::Internal(e.to_string()),
            _ => AppError::Unauthorized(e.to_string()),
        }
    }
}

impl AppError {
    fn parts(&self) -> (StatusCode, &'static str, &str) {
        match self {
            AppError::NotFound(msg) => (StatusCode::NOT_FOUND, "NOT_FOUND", msg),
            AppError::Unauthorized(msg) => (StatusCode::UNAUTHORIZED, "UNAUTHORIZED", msg),
            AppError::Validation(msg) => (StatusCode::BAD_REQUEST, "VALIDATION_ERROR", msg),
            AppError::Internal(msg) => (StatusCode::INTERNAL_SERVER_ERROR, "INTERNAL_ERROR", msg),
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, code, message) = self.parts();
        if status.is_server_error() {
            tracing::error!(code, "{message}");
        }

        let body = json!({
            "data": null,
            "meta": {
                "request_id": "",
                "timestamp": chrono::Utc::now().to_rfc3339(),
                "response_time_ms": 0
            },
            "errors": [{
                "code": code,
                "message": message,
            }]
        });

        (
            status,
            [(axum::http::header::CONTENT_TYPE, "application/json")],
            body.to_string(),
        )
            .into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    #[test]
    fn run_not_found_maps_to_404() {
        let err = AppError::from(CheckpointError::RunNotFound(Uuid::nil()));
        assert_eq!(err.into_response().status(), StatusCode::NOT_FOUND);
    }

    #[test]
    fn signature_errors_map_to_401() {
        let err = AppError::from(WebhookError::SignatureMismatch);
        assert_eq!(err.into_response().status(), StatusCode::UNAUTHORIZED);
        let err = AppError::from(WebhookError::InvalidKey("empty".into()));
        assert_eq!(err.into_response().status(), StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[test]
    fn repository_errors() {
        assert_eq!(
            AppError::from(RepositoryError::NotFound).into_response().status(),
            StatusCode::NOT_FOUND
        );
        assert_eq!(
            AppError::from(RepositoryError::Query("locked".into()))
                .into_response()
                .status(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }
}

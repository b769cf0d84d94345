//! Envelope response format for API responses.
//!
//! ```json
//! {
//!   "data": { ... },
//!   "meta": { "request_id": "...", "timestamp": "...", "response_time_ms": 5 },
//!   "_links": { "self": "..." }
//! }
//! ```
//!
//! Errors use the same envelope with `data: null` and an `errors` list
//! (see `error::AppError`).

use std::collections::BTreeMap;
use std::time::Instant;

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde::Serialize;
use uuid::Uuid;

/// Request id and start time, created when a handler begins.
#[derive(Debug)]
pub struct RequestTimer {
    request_id: String,
    started: Instant,
}

impl RequestTimer {
    pub fn start() -> Self {
        Self {
            request_id: Uuid::now_v7().to_string(),
            started: Instant::now(),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct ApiResponse<T: Serialize> {
    pub data: T,
    pub meta: ApiMeta,
    #[serde(rename = "_links", skip_serializing_if = "BTreeMap::is_empty")]
    pub links: BTreeMap<String, String>,
    #[serde(skip)]
    status: StatusCode,
}

#[derive(Debug, Serialize)]
pub struct ApiMeta {
    pub request_id: String,
    /// RFC 3339 timestamp of the response.
    pub timestamp: String,
    pub response_time_ms: u64,
}

impl<T: Serialize> ApiResponse<T> {
    /// A `200 OK` response carrying `data`.
    pub fn success(data: T, timer: &RequestTimer) -> Self {
        Self {
            data,
            meta: ApiMeta {
                request_id: timer.request_id.clone(),
                timestamp: chrono::Utc::now().to_rfc3339(),
                response_time_ms: timer.started.elapsed().as_millis() as u64,
            },
            links: BTreeMap::new(),
            status: StatusCode::OK,
        }
    }

    /// Same envelope, `202 Accepted` (work continues in the background).
    pub fn accepted(data: T, timer: &RequestTimer) -> Self {
        Self {
            status: StatusCode::ACCEPTED,
            ..Self::success(data, timer)
        }
    }

    pub fn with_link(mut self, rel: &str, href: impl Into<String>) -> Self {
        self.links.insert(rel.to_string(), href.into());
        self
    }
}

impl<T: Serialize> IntoResponse for ApiResponse<T> {
    fn into_response(self) -> Response {
        let body = serde_json::to_string(&self).unwrap_or_else(|_| {
            r#"{"data":null,"errors":[{"code":"SERIALIZATION_ERROR","message":"failed to serialize response"}]}"#.to_string()
        });

        (
            self.status,
            [(axum::http::header::CONTENT_TYPE, "application/json")],
            body,
        )
            .into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn envelope_shape() {
        let timer = RequestTimer::start();
        let resp = ApiResponse::success(serde_json::json!({"ok": true}), &timer)
            .with_link("self", "/api/v1/health");
        let value = serde_json::to_value(&resp).unwrap();
        assert_eq!(value["data"]["ok"], true);
        assert_eq!(value["_links"]["self"], "/api/v1/health");
        assert!(value["meta"]["request_id"].as_str().is_some_and(|s| !s.is_empty()));
        assert!(value.get("status").is_none());
    }

    #[test]
    fn accepted_status() {
        let resp = ApiResponse::accepted(Vec::<String>::new(), &RequestTimer::start());
        assert_eq!(resp.into_response().status(), StatusCode::ACCEPTED);
    }
}

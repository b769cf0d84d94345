//! HTTP layer for `tflow serve`.
//!
//! Axum routes under `/api/v1/`: health, the push webhook and read-only run
//! history, all answering in the envelope format of `response`.

pub mod error;
pub mod handlers;
pub mod response;
pub mod router;

//! HTTP request handlers.

pub mod health;
pub mod runs;
pub mod webhook;

//! Shared domain types for trainflow.
//!
//! Workflow definitions (the YAML IR), run tracking records, artifact
//! references, engine events and configuration, plus their error types.
//!
//! Zero infrastructure dependencies -- only serde, uuid, chrono, thiserror.

pub mod artifact;
pub mod config;
pub mod error;
pub mod event;
pub mod workflow;

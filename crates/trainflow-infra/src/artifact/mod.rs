//! Artifact storage adapters.

pub mod local;

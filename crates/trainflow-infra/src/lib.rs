//! Infrastructure layer for trainflow.
//!
//! Contains implementations of the port traits defined in `trainflow-core`:
//! SQLite run history, the filesystem artifact store, Docker and host-shell
//! job runners, plus the config loader and webhook signature checks.

pub mod artifact;
pub mod config;
pub mod runner;
pub mod sqlite;
pub mod webhook;

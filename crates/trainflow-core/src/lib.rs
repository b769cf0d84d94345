//! Business logic and port trait definitions for trainflow.
//!
//! This crate defines the "ports" (run repository, artifact store, job
//! runner) that the infrastructure layer implements, plus the workflow
//! engine itself. It depends only on `trainflow-types` -- never on
//! `trainflow-infra` or any database/IO crate.

pub mod artifact;
pub mod event;
pub mod repository;
pub mod runner;
pub mod workflow;

#[cfg(test)]
pub(crate) mod testing;

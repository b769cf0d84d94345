//! Workflow engine core: definition parsing, DAG analysis, scheduling and checkpointing.
//!
//! - `definition` -- YAML parsing, validation, filesystem load/discovery
//! - `dag` -- job graph, cycle detection, waves, reachability
//! - `invocation` -- translating a job's action into a runner invocation
//! - `checkpoint` -- durable run/job state transitions
//! - `executor` -- ready-set DAG executor with failure cascade
//! - `trigger` -- push-event matching against workflow branch filters

pub mod checkpoint;
pub mod dag;
pub mod definition;
pub mod executor;
pub mod invocation;
pub mod trigger;

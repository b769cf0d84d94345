//! Artifact store trait.
//!
//! Defines the interface for versioned dataset storage and run-scoped
//! volumes. Implementations live in trainflow-infra.

use std::path::{Path, PathBuf};

use trainflow_types::artifact::{DatasetRef, DatasetSummary, DatasetVersion};
use trainflow_types::error::ArtifactError;
use uuid::Uuid;

/// Trait for dataset and volume storage.
///
/// Dataset versions are immutable once committed; only the `latest` pointer
/// and tags move. Commits are content-addressed: committing content whose
/// digest equals the latest version's digest returns that version instead of
/// creating a new one.
///
/// Uses RPITIT (native async fn in traits, Rust 2024 edition).
pub trait ArtifactStore: Send + Sync {
    /// Resolve a reference (`name`, `name:latest`, `name:vN`, `name:<tag>`) to a stored version.
    fn resolve_dataset(
        &self,
        reference: &DatasetRef,
    ) -> impl std::future::Future<Output = Result<DatasetVersion, ArtifactError>> + Send;

    /// Create an empty run-scoped volume directory for a job output.
    fn create_volume(
        &self,
        run_id: Uuid,
        job: &str,
        output: &str,
    ) -> impl std::future::Future<Output = Result<PathBuf, ArtifactError>> + Send;

    /// Create an empty staging directory a job writes a dataset output into.
    fn stage_dataset_output(
        &self,
        run_id: Uuid,
        job: &str,
        output: &str,
    ) -> impl std::future::Future<Output = Result<PathBuf, ArtifactError>> + Send;

    /// Commit a staging directory as the next version of dataset `name`.
    fn commit_dataset(
        &self,
        name: &str,
        staging: &Path,
    ) -> impl std::future::Future<Output = Result<DatasetVersion, ArtifactError>> + Send;

    /// Attach a named tag to an existing version (moving it if already used).
    fn tag_version(
        &self,
        name: &str,
        version: u32,
        tag: &str,
    ) -> impl std::future::Future<Output = Result<DatasetVersion, ArtifactError>> + Send;

    /// List all datasets with their latest version.
    fn list_datasets(
        &self,
    ) -> impl std::future::Future<Output = Result<Vec<DatasetSummary>, ArtifactError>> + Send;

    /// List every version of a dataset, oldest first.
    fn list_versions(
        &self,
        name: &str,
    ) -> impl std::future::Future<Output = Result<Vec<DatasetVersion>, ArtifactError>> + Send;

    /// Remove a run's volumes and staging area.
    fn release_run(
        &self,
        run_id: Uuid,
    ) -> impl std::future::Future<Output = Result<(), ArtifactError>> + Send;
}

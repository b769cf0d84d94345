use thiserror::Error;

/// Errors from repository operations (used by trait definitions in trainflow-core).
#[derive(Debug, Error)]
pub enum RepositoryError {
    #[error("database connection error")]
    Connection,

    #[error("query error: {0}")]
    Query(String),

    #[error("entity not found")]
    NotFound,

    #[error("conflict: {0}")]
    Conflict(String),
}

/// Errors from the artifact store.
#[derive(Debug, Error)]
pub enum ArtifactError {
    #[error("dataset '{0}' not found")]
    DatasetNotFound(String),

    #[error("dataset '{name}' has no version v{version}")]
    VersionNotFound { name: String, version: u32 },

    #[error("dataset '{name}' has no tag '{tag}'")]
    TagNotFound { name: String, tag: String },

    #[error("invalid dataset reference: {0}")]
    InvalidRef(String),

    #[error("artifact I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("corrupt artifact metadata: {0}")]
    Metadata(String),
}

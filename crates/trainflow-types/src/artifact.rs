//! Artifact references and records.
//!
//! Jobs exchange data through two kinds of artifacts: versioned, named
//! **datasets** that outlive the run, and **volumes** that only live as long
//! as the run that created them. Dataset references use the grammar
//! `name`, `name:latest`, `name:vN` or `name:<tag>`.

use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::ArtifactError;

// ---------------------------------------------------------------------------
// Artifact kind and declaration
// ---------------------------------------------------------------------------

/// The storage class of an artifact.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ArtifactKind {
    /// Named, versioned, persists independently of the run.
    Dataset,
    /// Ephemeral, run-scoped, no versioning.
    Volume,
}

impl fmt::Display for ArtifactKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ArtifactKind::Dataset => write!(f, "dataset"),
            ArtifactKind::Volume => write!(f, "volume"),
        }
    }
}

/// An artifact declaration as it appears in YAML:
///
/// ```yaml
/// type: dataset
/// with:
///   ref: gradient-lsun-cat
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArtifactSpec {
    #[serde(rename = "type")]
    pub kind: ArtifactKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub with: Option<ArtifactWith>,
}

/// Parameters of an artifact declaration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArtifactWith {
    #[serde(rename = "ref")]
    pub reference: String,
}

impl ArtifactSpec {
    /// A volume declaration.
    pub fn volume() -> Self {
        Self {
            kind: ArtifactKind::Volume,
            with: None,
        }
    }

    /// A dataset declaration bound to `reference`.
    pub fn dataset(reference: impl Into<String>) -> Self {
        Self {
            kind: ArtifactKind::Dataset,
            with: Some(ArtifactWith {
                reference: reference.into(),
            }),
        }
    }

    /// The raw `ref` string, if any.
    pub fn reference(&self) -> Option<&str> {
        self.with.as_ref().map(|w| w.reference.as_str())
    }
}

// ---------------------------------------------------------------------------
// Dataset references
// ---------------------------------------------------------------------------

/// Which version of a dataset a reference points at.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum VersionSelector {
    /// The mutable `latest` pointer.
    Latest,
    /// An explicit immutable version (1-based).
    Version(u32),
    /// A named tag.
    Tag(String),
}

/// A parsed dataset reference such as `gradient-lsun-cat:v2`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct DatasetRef {
    pub name: String,
    pub selector: VersionSelector,
}

impl DatasetRef {
    /// Reference to the latest version of `name`.
    pub fn latest(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            selector: VersionSelector::Latest,
        }
    }

    /// Whether the reference carries an explicit selector other than latest.
    pub fn is_pinned(&self) -> bool {
        !matches!(self.selector, VersionSelector::Latest)
    }
}

/// Check that `name` is a valid dataset name: `[A-Za-z0-9][A-Za-z0-9._-]*`.
pub fn is_valid_dataset_name(name: &str) -> bool {
    let mut chars = name.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphanumeric() => {}
        _ => return false,
    }
    chars.all(|c| c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-'))
}

impl FromStr for DatasetRef {
    type Err = ArtifactError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (name, selector) = match s.split_once(':') {
            None => (s, VersionSelector::Latest),
            Some((name, sel)) => {
                let selector = if sel == "latest" {
                    VersionSelector::Latest
                } else if let Some(digits) = sel
                    .strip_prefix('v')
                    .filter(|d| !d.is_empty() && d.chars().all(|c| c.is_ascii_digit()))
                {
                    let version: u32 = digits
                        .parse()
                        .map_err(|_| ArtifactError::InvalidRef(s.to_string()))?;
                    if version == 0 {
                        return Err(ArtifactError::InvalidRef(format!(
                            "{s}: versions start at v1"
                        )));
                    }
                    VersionSelector::Version(version)
                } else if is_valid_dataset_name(sel) {
                    VersionSelector::Tag(sel.to_string())
                } else {
                    return Err(ArtifactError::InvalidRef(s.to_string()));
                };
                (name, selector)
            }
        };

        if !is_valid_dataset_name(name) {
            return Err(ArtifactError::InvalidRef(s.to_string()));
        }

        Ok(Self {
            name: name.to_string(),
            selector,
        })
    }
}

impl fmt::Display for DatasetRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.selector {
            VersionSelector::Latest => write!(f, "{}", self.name),
            VersionSelector::Version(v) => write!(f, "{}:v{}", self.name, v),
            VersionSelector::Tag(t) => write!(f, "{}:{}", self.name, t),
        }
    }
}

impl TryFrom<String> for DatasetRef {
    type Error = ArtifactError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<DatasetRef> for String {
    fn from(value: DatasetRef) -> Self {
        value.to_string()
    }
}

// ---------------------------------------------------------------------------
// Output bindings
// ---------------------------------------------------------------------------

/// A `<job>.outputs.<name>` reference from one job's input to another job's output.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct OutputBinding {
    pub job: String,
    pub output: String,
}

impl OutputBinding {
    /// Parse `job.outputs.name`. Returns `None` for any other shape.
    pub fn parse(s: &str) -> Option<Self> {
        let mut parts = s.trim().split('.');
        let job = parts.next()?;
        let keyword = parts.next()?;
        let output = parts.next()?;
        if parts.next().is_some() || keyword != "outputs" || job.is_empty() || output.is_empty() {
            return None;
        }
        Some(Self {
            job: job.to_string(),
            output: output.to_string(),
        })
    }
}

impl fmt::Display for OutputBinding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.outputs.{}", self.job, self.output)
    }
}

// ---------------------------------------------------------------------------
// Stored artifacts
// ---------------------------------------------------------------------------

/// A committed, immutable dataset version.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatasetVersion {
    pub name: String,
    pub version: u32,
    /// Lowercase hex SHA-256 over the version's relative paths and contents.
    pub digest: String,
    /// Directory holding the version's files.
    pub path: PathBuf,
    #[serde(default)]
    pub tags: Vec<String>,
    pub file_count: u64,
    pub size_bytes: u64,
    pub created_at: DateTime<Utc>,
}

impl DatasetVersion {
    /// `name:vN` reference pinned to this version.
    pub fn pinned_ref(&self) -> DatasetRef {
        DatasetRef {
            name: self.name.clone(),
            selector: VersionSelector::Version(self.version),
        }
    }
}

/// Summary of a dataset across all its versions.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatasetSummary {
    pub name: String,
    pub latest_version: u32,
    pub version_count: u32,
    pub updated_at: DateTime<Utc>,
}

/// An artifact produced by a job, recorded in the job's run log.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProducedArtifact {
    /// Output name as declared by the job.
    pub output: String,
    pub kind: ArtifactKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dataset: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub digest: Option<String>,
    pub path: PathBuf,
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

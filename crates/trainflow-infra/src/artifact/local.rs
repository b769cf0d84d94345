//! Local filesystem artifact store.
//!
//! Implements `ArtifactStore` from `trainflow-core`. Dataset versions are
//! immutable directories; only the `latest` pointer and `tags.json` change.
//!
//! ```text
//! {root}/datasets/<name>/
//!   v1/data/...        committed files
//!   v1/meta.json       digest, size, file count, creation time
//!   v2/...
//!   latest             "2"
//!   tags.json          {"golden": 1}
//! {root}/runs/<run_id>/
//!   volumes/<job>/<output>/
//!   staging/<job>/<output>/
//! ```

use std::collections::BTreeMap;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tokio::sync::Mutex;
use trainflow_core::artifact::ArtifactStore;
use trainflow_types::artifact::{
    DatasetRef, DatasetSummary, DatasetVersion, VersionSelector, is_valid_dataset_name,
};
use trainflow_types::error::ArtifactError;
use uuid::Uuid;

const LATEST_FILE: &str = "latest";
const TAGS_FILE: &str = "tags.json";
const META_FILE: &str = "meta.json";
const DATA_DIR: &str = "data";

/// Per-version metadata persisted as `v<N>/meta.json`.
#[derive(Debug, Serialize, Deserialize)]
struct VersionMeta {
    version: u32,
    digest: String,
    file_count: u64,
    size_bytes: u64,
    created_at: DateTime<Utc>,
}

/// Content digest of a directory tree.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TreeDigest {
    /// Lowercase hex SHA-256.
    pub digest: String,
    pub file_count: u64,
    pub size_bytes: u64,
}

/// Filesystem-backed dataset and volume store rooted at one directory.
pub struct LocalArtifactStore {
    root: PathBuf,
    /// Serializes commits and tag moves per dataset name.
    locks: DashMap<String, Arc<Mutex<()>>>,
}

impl LocalArtifactStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            locks: DashMap::new(),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn datasets_dir(&self) -> PathBuf {
        self.root.join("datasets")
    }

    fn dataset_dir(&self, name: &str) -> PathBuf {
        self.datasets_dir().join(name)
    }

    fn version_dir(&self, name: &str, version: u32) -> PathBuf {
        self.dataset_dir(name).join(format!("v{version}"))
    }

    fn run_dir(&self, run_id: Uuid) -> PathBuf {
        self.root.join("runs").join(run_id.to_string())
    }

    fn lock_for(&self, name: &str) -> Arc<Mutex<()>> {
        Arc::clone(
            self.locks
                .entry(name.to_string())
                .or_insert_with(|| Arc::new(Mutex::new(())))
                .value(),
        )
    }

    /// Create `dir` fresh, removing anything a previous attempt left behind.
    async fn fresh_dir(dir: PathBuf) -> Result<PathBuf, ArtifactError> {
        match tokio::fs::remove_dir_all(&dir).await {
            Ok(()) => {}
            Err(e) if e.kind() == io::ErrorKind::NotFound => {}
            Err(e) => return Err(e.into()),
        }
        tokio::fs::create_dir_all(&dir).await?;
        Ok(dir)
    }

    async fn read_latest(&self, name: &str) -> Result<Option<u32>, ArtifactError> {
        let path = self.dataset_dir(name).join(LATEST_FILE);
        match tokio::fs::read_to_string(&path).await {
            Ok(s) => s
                .trim()
                .parse::<u32>()
                .map(Some)
                .map_err(|_| ArtifactError::Metadata(format!("{}: not a version", path.display()))),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    async fn read_tags(&self, name: &str) -> Result<BTreeMap<String, u32>, ArtifactError> {
        let path = self.dataset_dir(name).join(TAGS_FILE);
        match tokio::fs::read(&path).await {
            Ok(bytes) => serde_json::from_slice(&bytes)
                .map_err(|e| ArtifactError::Metadata(format!("{}: {e}", path.display()))),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(BTreeMap::new()),
            Err(e) => Err(e.into()),
        }
    }

    async fn read_meta(&self, name: &str, version: u32) -> Result<Option<VersionMeta>, ArtifactError> {
        let path = self.version_dir(name, version).join(META_FILE);
        match tokio::fs::read(&path).await {
            Ok(bytes) => serde_json::from_slice(&bytes)
                .map(Some)
                .map_err(|e| ArtifactError::Metadata(format!("{}: {e}", path.display()))),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    /// Load version `version` of `name` with its tags attached.
    async fn load_version(&self, name: &str, version: u32) -> Result<DatasetVersion, ArtifactError> {
        let meta = self
            .read_meta(name, version)
            .await?
            .ok_or_else(|| ArtifactError::VersionNotFound {
                name: name.to_string(),
                version,
            })?;
        let tags = self
            .read_tags(name)
            .await?
            .into_iter()
            .filter(|(_, v)| *v == version)
            .map(|(t, _)| t)
            .collect();
        Ok(DatasetVersion {
            name: name.to_string(),
            version,
            digest: meta.digest,
            path: self.version_dir(name, version).join(DATA_DIR),
            tags,
            file_count: meta.file_count,
            size_bytes: meta.size_bytes,
            created_at: meta.created_at,
        })
    }

    /// Committed version numbers of `name`, ascending.
    async fn version_numbers(&self, name: &str) -> Result<Vec<u32>, ArtifactError> {
        let mut entries = match tokio::fs::read_dir(self.dataset_dir(name)).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                return Err(ArtifactError::DatasetNotFound(name.to_string()));
            }
            Err(e) => return Err(e.into()),
        };
        let mut versions = Vec::new();
        while let Some(entry) = entries.next_entry().await? {
            let file_name = entry.file_name();
            let Some(version) = file_name
                .to_str()
                .and_then(|s| s.strip_prefix('v'))
                .and_then(|d| d.parse::<u32>().ok())
            else {
                continue;
            };
            // A version without meta.json is an interrupted commit.
            if entry.path().join(META_FILE).exists() {
                versions.push(version);
            }
        }
        versions.sort_unstable();
        Ok(versions)
    }

    fn check_name(name: &str) -> Result<(), ArtifactError> {
        if is_valid_dataset_name(name) {
            Ok(())
        } else {
            Err(ArtifactError::InvalidRef(name.to_string()))
        }
    }
}

/// Write `contents` to `path` via a temporary sibling and a rename.
async fn write_atomic(path: &Path, contents: &[u8]) -> Result<(), ArtifactError> {
    let tmp = path.with_extension("tmp");
    tokio::fs::write(&tmp, contents).await?;
    tokio::fs::rename(&tmp, path).await?;
    Ok(())
}

/// Tag names share the dataset-name alphabet but must not read as a selector.
fn check_tag(tag: &str) -> Result<(), ArtifactError> {
    let looks_like_version = tag
        .strip_prefix('v')
        .is_some_and(|d| !d.is_empty() && d.chars().all(|c| c.is_ascii_digit()));
    if !is_valid_dataset_name(tag) || tag == "latest" || looks_like_version {
        return Err(ArtifactError::InvalidRef(format!("invalid tag '{tag}'")));
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Content digest
// ---------------------------------------------------------------------------

/// Hash a directory tree: every regular file's relative path (with `/`
/// separators), its length, then its bytes, in sorted path order.
///
/// Renaming a file changes the digest; file timestamps and permissions do not.
pub fn digest_tree(dir: &Path) -> io::Result<TreeDigest> {
    let mut files = Vec::new();
    collect_files(dir, dir, &mut files)?;
    files.sort();

    let mut hasher = Sha256::new();
    let mut size_bytes = 0u64;
    for relative in &files {
        let path = dir.join(relative);
        let len = std::fs::metadata(&path)?.len();
        hasher.update(relative.as_bytes());
        hasher.update([0u8]);
        hasher.update(len.to_le_bytes());
        let mut file = std::fs::File::open(&path)?;
        io::copy(&mut file, &mut hasher)?;
        size_bytes += len;
    }

    Ok(TreeDigest {
        digest: format!("{:x}", hasher.finalize()),
        file_count: files.len() as u64,
        size_bytes,
    })
}

fn collect_files(root: &Path, dir: &Path, out: &mut Vec<String>) -> io::Result<()> {
    for entry in std::fs::read_dir(dir)? {
        let entry = entry?;
        let file_type = entry.file_type()?;
        let path = entry.path();
        if file_type.is_dir() {
            collect_files(root, &path, out)?;
        } else if file_type.is_file() {
            let relative = path
                .strip_prefix(root)
                .map_err(io::Error::other)?
                .components()
                .map(|c| c.as_os_str().to_string_lossy())
                .collect::<Vec<_>>()
                .join("/");
            out.push(relative);
        }
        // Symlinks and special files are not part of a dataset's content.
    }
    Ok(())
}

async fn digest_tree_blocking(dir: PathBuf) -> Result<TreeDigest, ArtifactError> {
    tokio::task::spawn_blocking(move || digest_tree(&dir))
        .await
        .map_err(io::Error::other)?
        .map_err(ArtifactError::from)
}

// ---------------------------------------------------------------------------
// ArtifactStore impl
// ---------------------------------------------------------------------------

impl ArtifactStore for LocalArtifactStore {
    async fn resolve_dataset(&self, reference: &DatasetRef) -> Result<DatasetVersion, ArtifactError> {
        let name = reference.name.as_str();
        Self::check_name(name)?;
        let latest = self
            .read_latest(name)
            .await?
            .ok_or_else(|| ArtifactError::DatasetNotFound(name.to_string()))?;

        let version = match &reference.selector {
            VersionSelector::Latest => latest,
            VersionSelector::Version(v) => *v,
            VersionSelector::Tag(tag) => *self.read_tags(name).await?.get(tag).ok_or_else(|| {
                ArtifactError::TagNotFound {
                    name: name.to_string(),
                    tag: tag.clone(),
                }
            })?,
        };
        self.load_version(name, version).await
    }

    async fn create_volume(&self, run_id: Uuid, job: &str, output: &str) -> Result<PathBuf, ArtifactError> {
        Self::fresh_dir(self.run_dir(run_id).join("volumes").join(job).join(output)).await
    }

    async fn stage_dataset_output(
        &self,
        run_id: Uuid,
        job: &str,
        output: &str,
    ) -> Result<PathBuf, ArtifactError> {
        Self::fresh_dir(self.run_dir(run_id).join("staging").join(job).join(output)).await
    }

    async fn commit_dataset(&self, name: &str, staging: &Path) -> Result<DatasetVersion, ArtifactError> {
        Self::check_name(name)?;
        let lock = self.lock_for(name);
        let _guard = lock.lock().await;

        let tree = digest_tree_blocking(staging.to_path_buf()).await?;

        if let Some(latest) = self.read_latest(name).await? {
            let current = self.load_version(name, latest).await?;
            if current.digest == tree.digest {
                tracing::info!(dataset = name, version = latest, "content unchanged, reusing latest version");
                tokio::fs::remove_dir_all(staging).await?;
                return Ok(current);
            }
        }

        let dataset_dir = self.dataset_dir(name);
        tokio::fs::create_dir_all(&dataset_dir).await?;
        let next = match self.version_numbers(name).await?.last() {
            Some(v) => v + 1,
            None => 1,
        };

        let version_dir = Self::fresh_dir(self.version_dir(name, next)).await?;
        tokio::fs::rename(staging, version_dir.join(DATA_DIR)).await?;

        let meta = VersionMeta {
            version: next,
            digest: tree.digest,
            file_count: tree.file_count,
            size_bytes: tree.size_bytes,
            created_at: Utc::now(),
        };
        let meta_json = serde_json::to_vec_pretty(&meta)
            .map_err(|e| ArtifactError::Metadata(e.to_string()))?;
        write_atomic(&version_dir.join(META_FILE), &meta_json).await?;
        write_atomic(&dataset_dir.join(LATEST_FILE), next.to_string().as_bytes()).await?;

        tracing::info!(
            dataset = name,
            version = next,
            files = meta.file_count,
            bytes = meta.size_bytes,
            "committed dataset version"
        );
        self.load_version(name, next).await
    }

    async fn tag_version(&self, name: &str, version: u32, tag: &str) -> Result<DatasetVersion, ArtifactError> {
        Self::check_name(name)?;
        check_tag(tag)?;
        let lock = self.lock_for(name);
        let _guard = lock.lock().await;

        if self.read_latest(name).await?.is_none() {
            return Err(ArtifactError::DatasetNotFound(name.to_string()));
        }
        if self.read_meta(name, version).await?.is_none() {
            return Err(ArtifactError::VersionNotFound {
                name: name.to_string(),
                version,
            });
        }

        let mut tags = self.read_tags(name).await?;
        if let Some(previous) = tags.insert(tag.to_string(), version).filter(|p| *p != version) {
            tracing::info!(dataset = name, tag, from = previous, to = version, "moved dataset tag");
        }
        let json = serde_json::to_vec_pretty(&tags).map_err(|e| ArtifactError::Metadata(e.to_string()))?;
        write_atomic(&self.dataset_dir(name).join(TAGS_FILE), &json).await?;

        self.load_version(name, version).await
    }

    async fn list_datasets(&self) -> Result<Vec<DatasetSummary>, ArtifactError> {
        let mut entries = match tokio::fs::read_dir(self.datasets_dir()).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };

        let mut summaries = Vec::new();
        while let Some(entry) = entries.next_entry().await? {
            let Some(name) = entry.file_name().to_str().map(str::to_string) else {
                continue;
            };
            if !is_valid_dataset_name(&name) {
                continue;
            }
            let Some(latest) = self.read_latest(&name).await? else {
                continue;
            };
            let latest_version = self.load_version(&name, latest).await?;
            let version_count = self.version_numbers(&name).await?.len() as u32;
            summaries.push(DatasetSummary {
                name,
                latest_version: latest,
                version_count,
                updated_at: latest_version.created_at,
            });
        }
        summaries.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(summaries)
    }

    async fn list_versions(&self, name: &str) -> Result<Vec<DatasetVersion>, ArtifactError> {
        Self::check_name(name)?;
        let mut versions = Vec::new();
        for v in self.version_numbers(name).await? {
            versions.push(self.load_version(name, v).await?);
        }
        Ok(versions)
    }

    async fn release_run(&self, run_id: Uuid) -> Result<(), ArtifactError> {
        match tokio::fs::remove_dir_all(self.run_dir(run_id)).await {
            Ok(()) => {
                tracing::debug!(run_id = %run_id, "released run volumes");
                Ok(())
            }
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn store() -> (LocalArtifactStore, TempDir) {
        let dir = TempDir::new().unwrap();
        (LocalArtifactStore::new(dir.path()), dir)
    }

    async fn stage(store: &LocalArtifactStore, files: &[(&str, &str)]) -> PathBuf {
        let staging = store
            .stage_dataset_output(Uuid::now_v7(), "extractImages", "extracted-images")
            .await
            .unwrap();
        for (rel, content) in files {
            let path = staging.join(rel);
            tokio::fs::create_dir_all(path.parent().unwrap()).await.unwrap();
            tokio::fs::write(path, content).await.unwrap();
        }
        staging
    }

    fn latest(name: &str) -> DatasetRef {
        DatasetRef::latest(name)
    }

    #[tokio::test]
    async fn commit_creates_first_version() {
        let (store, _dir) = store();
        let staging = stage(&store, &[("cat-0001.png", "a"), ("sub/cat-0002.png", "bb")]).await;

        let v = store.commit_dataset("cats", &staging).await.unwrap();
        assert_eq!(v.version, 1);
        assert_eq!(v.file_count, 2);
        assert_eq!(v.size_bytes, 3);
        assert!(v.path.join("sub/cat-0002.png").exists());
        assert!(!staging.exists());

        let resolved = store.resolve_dataset(&latest("cats")).await.unwrap();
        assert_eq!(resolved.version, 1);
        assert_eq!(resolved.digest, v.digest);
    }

    #[tokio::test]
    async fn identical_content_reuses_latest() {
        let (store, _dir) = store();
        let first = stage(&store, &[("a.txt", "same")]).await;
        let v1 = store.commit_dataset("cats", &first).await.unwrap();

        let second = stage(&store, &[("a.txt", "same")]).await;
        let again = store.commit_dataset("cats", &second).await.unwrap();
        assert_eq!(again.version, v1.version);
        assert_eq!(store.list_versions("cats").await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn changed_content_creates_next_version() {
        let (store, _dir) = store();
        let v1 = store
            .commit_dataset("cats", &stage(&store, &[("a.txt", "one")]).await)
            .await
            .unwrap();
        let v2 = store
            .commit_dataset("cats", &stage(&store, &[("a.txt", "two")]).await)
            .await
            .unwrap();
        assert_eq!(v2.version, 2);
        assert_ne!(v1.digest, v2.digest);

        // Old versions stay addressable and unchanged.
        let pinned = store.resolve_dataset(&"cats:v1".parse().unwrap()).await.unwrap();
        assert_eq!(pinned.digest, v1.digest);
        let content = tokio::fs::read_to_string(pinned.path.join("a.txt")).await.unwrap();
        assert_eq!(content, "one");

        assert_eq!(store.resolve_dataset(&latest("cats")).await.unwrap().version, 2);
    }

    #[tokio::test]
    async fn tags_resolve_and_move() {
        let (store, _dir) = store();
        store
            .commit_dataset("cats", &stage(&store, &[("a", "1")]).await)
            .await
            .unwrap();
        store
            .commit_dataset("cats", &stage(&store, &[("a", "2")]).await)
            .await
            .unwrap();

        let tagged = store.tag_version("cats", 1, "golden").await.unwrap();
        assert_eq!(tagged.tags, vec!["golden"]);
        let r = store.resolve_dataset(&"cats:golden".parse().unwrap()).await.unwrap();
        assert_eq!(r.version, 1);

        store.tag_version("cats", 2, "golden").await.unwrap();
        let r = store.resolve_dataset(&"cats:golden".parse().unwrap()).await.unwrap();
        assert_eq!(r.version, 2);
        let versions = store.list_versions("cats").await.unwrap();
        assert!(versions[0].tags.is_empty());
        assert_eq!(versions[1].tags, vec!["golden"]);
    }

    #[tokio::test]
    async fn tag_errors() {
        let (store, _dir) = store();
        assert!(matches!(
            store.tag_version("ghost", 1, "x").await,
            Err(ArtifactError::DatasetNotFound(_))
        ));
        store
            .commit_dataset("cats", &stage(&store, &[("a", "1")]).await)
            .await
            .unwrap();
        assert!(matches!(
            store.tag_version("cats", 9, "x").await,
            Err(ArtifactError::VersionNotFound { version: 9, .. })
        ));
        for bad in ["latest", "v3", "has space", ""] {
            assert!(matches!(
                store.tag_version("cats", 1, bad).await,
                Err(ArtifactError::InvalidRef(_))
            ));
        }
    }

    #[tokio::test]
    async fn resolve_errors() {
        let (store, _dir) = store();
        assert!(matches!(
            store.resolve_dataset(&latest("gradient-lsun-cat")).await,
            Err(ArtifactError::DatasetNotFound(_))
        ));
        store
            .commit_dataset("cats", &stage(&store, &[("a", "1")]).await)
            .await
            .unwrap();
        assert!(matches!(
            store.resolve_dataset(&"cats:v2".parse().unwrap()).await,
            Err(ArtifactError::VersionNotFound { version: 2, .. })
        ));
        assert!(matches!(
            store.resolve_dataset(&"cats:golden".parse().unwrap()).await,
            Err(ArtifactError::TagNotFound { .. })
        ));
    }

    #[tokio::test]
    async fn list_datasets_sorted() {
        let (store, _dir) = store();
        assert!(store.list_datasets().await.unwrap().is_empty());
        for (name, content) in [("zebras", "z"), ("cats", "1"), ("cats", "2")] {
            store
                .commit_dataset(name, &stage(&store, &[("f", content)]).await)
                .await
                .unwrap();
        }
        let summaries = store.list_datasets().await.unwrap();
        let names: Vec<&str> = summaries.iter().map(|s| s.name.as_str()).collect();
        assert_eq!(names, vec!["cats", "zebras"]);
        assert_eq!(summaries[0].latest_version, 2);
        assert_eq!(summaries[0].version_count, 2);
    }

    #[tokio::test]
    async fn concurrent_commits_get_distinct_versions() {
        let (store, _dir) = store();
        let store = Arc::new(store);
        let a = stage(&store, &[("f", "a")]).await;
        let b = stage(&store, &[("f", "b")]).await;

        let (sa, sb) = (Arc::clone(&store), Arc::clone(&store));
        let ha = tokio::spawn(async move { sa.commit_dataset("cats", &a).await.unwrap().version });
        let hb = tokio::spawn(async move { sb.commit_dataset("cats", &b).await.unwrap().version });
        let mut versions = vec![ha.await.unwrap(), hb.await.unwrap()];
        versions.sort_unstable();
        assert_eq!(versions, vec![1, 2]);
    }

    #[tokio::test]
    async fn volumes_are_fresh_and_released() {
        let (store, _dir) = store();
        let run = Uuid::now_v7();
        let vol = store.create_volume(run, "cloneStyleGAN2Repo", "repo").await.unwrap();
        tokio::fs::write(vol.join("README.md"), "x").await.unwrap();

        let again = store.create_volume(run, "cloneStyleGAN2Repo", "repo").await.unwrap();
        assert_eq!(again, vol);
        assert!(!vol.join("README.md").exists());

        store.release_run(run).await.unwrap();
        assert!(!vol.exists());
        // Releasing twice is fine.
        store.release_run(run).await.unwrap();
    }

    #[test]
    fn digest_depends_on_paths_and_bytes_only() {
        let a = TempDir::new().unwrap();
        let b = TempDir::new().unwrap();
        std::fs::create_dir_all(a.path().join("d")).unwrap();
        std::fs::create_dir_all(b.path().join("d")).unwrap();
        // Written in different orders.
        std::fs::write(a.path().join("x"), "1").unwrap();
        std::fs::write(a.path().join("d/y"), "2").unwrap();
        std::fs::write(b.path().join("d/y"), "2").unwrap();
        std::fs::write(b.path().join("x"), "1").unwrap();
        assert_eq!(digest_tree(a.path()).unwrap(), digest_tree(b.path()).unwrap());

        std::fs::rename(b.path().join("x"), b.path().join("z")).unwrap();
        assert_ne!(
            digest_tree(a.path()).unwrap().digest,
            digest_tree(b.path()).unwrap().digest
        );
    }

    #[test]
    fn empty_tree_digest() {
        let dir = TempDir::new().unwrap();
        let d = digest_tree(dir.path()).unwrap();
        // SHA-256 of the empty input.
        assert_eq!(
            d.digest,
            "e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855"
        );
        assert_eq!(d.file_count, 0);
    }
}

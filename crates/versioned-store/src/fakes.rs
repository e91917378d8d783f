//! In-memory fake for `VersionedStorage` (testing only)
//!
//! `MemoryVersionedStorage` tracks a real directory on disk but keeps its
//! history in memory: every commit snapshots the full file tree into a
//! `BTreeMap<relative path, bytes>`. It satisfies the same contract as the
//! git backend without requiring `git` on the test machine.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, MutexGuard};

use async_trait::async_trait;
use chrono::Utc;
use sha2::{Digest, Sha256};
use tracing::debug;

use crate::error::StorageError;
use crate::storage_traits::*;

type Snapshot = BTreeMap<PathBuf, Vec<u8>>;

#[derive(Debug)]
struct StoredVersion {
    info: VersionInfo,
    snapshot: Snapshot,
}

/// Directory-backed storage with in-memory history.
#[derive(Debug)]
pub struct MemoryVersionedStorage {
    root: PathBuf,
    versions: Mutex<Vec<StoredVersion>>,
    fail_next_checkout: AtomicBool,
}

impl MemoryVersionedStorage {
    /// Track `root`. The directory is created on first write if missing.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            versions: Mutex::new(Vec::new()),
            fail_next_checkout: AtomicBool::new(false),
        }
    }

    /// Make the next `checkout` fail with an IO error before touching the tree.
    pub fn fail_next_checkout(&self) {
        self.fail_next_checkout.store(true, Ordering::SeqCst);
    }

    /// Number of recorded versions.
    pub fn version_count(&self) -> usize {
        self.versions().map(|v| v.len()).unwrap_or(0)
    }

    fn versions(&self) -> StorageResult<MutexGuard<'_, Vec<StoredVersion>>> {
        self.versions
            .lock()
            .map_err(|_| StorageError::Backend("version history lock poisoned".to_string()))
    }
}

#[async_trait]
impl VersionedStorage for MemoryVersionedStorage {
    fn root(&self) -> &Path {
        &self.root
    }

    async fn is_clean(&self) -> StorageResult<bool> {
        let current = read_tree(&self.root)?;
        let versions = self.versions()?;
        let clean = match versions.last() {
            Some(head) => head.snapshot == current,
            None => current.is_empty(),
        };
        Ok(clean)
    }

    async fn head(&self) -> StorageResult<Option<VersionId>> {
        Ok(self.versions()?.last().map(|v| v.info.id.clone()))
    }

    async fn commit(&self, message: &str) -> StorageResult<VersionId> {
        let snapshot = read_tree(&self.root)?;
        let mut versions = self.versions()?;

        let unchanged = match versions.last() {
            Some(head) => head.snapshot == snapshot,
            None => snapshot.is_empty(),
        };
        if unchanged {
            return Err(StorageError::NothingToCommit);
        }

        let parent = versions.last().map(|v| v.info.id.clone());
        let id = VersionId::new(version_digest(
            parent.as_ref(),
            versions.len(),
            message,
            &snapshot,
        ));
        debug!(version = %id.short(), files = snapshot.len(), "recorded version");

        versions.push(StoredVersion {
            info: VersionInfo {
                id: id.clone(),
                message: message.to_string(),
                created_at: Utc::now(),
            },
            snapshot,
        });
        Ok(id)
    }

    async fn checkout(&self, version: &VersionId) -> StorageResult<()> {
        let snapshot = {
            let versions = self.versions()?;
            versions
                .iter()
                .find(|v| &v.info.id == version)
                .map(|v| v.snapshot.clone())
                .ok_or_else(|| StorageError::UnknownVersion {
                    reference: version.to_string(),
                })?
        };

        if self.fail_next_checkout.swap(false, Ordering::SeqCst) {
            return Err(StorageError::Io(std::io::Error::other(
                "injected checkout failure",
            )));
        }

        write_tree(&self.root, &snapshot)
    }

    async fn log_range(
        &self,
        from: Option<&VersionId>,
        to: &VersionId,
    ) -> StorageResult<Vec<VersionId>> {
        let versions = self.versions()?;
        let to_idx = position(&versions, to)?;
        let start = match from {
            Some(from) => position(&versions, from)? + 1,
            None => 0,
        };
        if start > to_idx {
            return Ok(Vec::new());
        }
        Ok(versions[start..=to_idx]
            .iter()
            .map(|v| v.info.id.clone())
            .collect())
    }

    async fn resolve(&self, reference: &str) -> StorageResult<VersionId> {
        let versions = self.versions()?;
        if let Some(exact) = versions.iter().find(|v| v.info.id.as_str() == reference) {
            return Ok(exact.info.id.clone());
        }

        let matches: Vec<&StoredVersion> = versions
            .iter()
            .filter(|v| !reference.is_empty() && v.info.id.as_str().starts_with(reference))
            .collect();
        match matches.as_slice() {
            [] => Err(StorageError::UnknownVersion {
                reference: reference.to_string(),
            }),
            [only] => Ok(only.info.id.clone()),
            many => Err(StorageError::AmbiguousVersion {
                reference: reference.to_string(),
                matches: many.iter().map(|v| v.info.id.to_string()).collect(),
            }),
        }
    }

    async fn describe(&self, version: &VersionId) -> StorageResult<VersionInfo> {
        let versions = self.versions()?;
        let idx = position(&versions, version)?;
        Ok(versions[idx].info.clone())
    }
}

fn position(versions: &[StoredVersion], id: &VersionId) -> StorageResult<usize> {
    versions
        .iter()
        .position(|v| &v.info.id == id)
        .ok_or_else(|| StorageError::UnknownVersion {
            reference: id.to_string(),
        })
}

fn version_digest(
    parent: Option<&VersionId>,
    seq: usize,
    message: &str,
    snapshot: &Snapshot,
) -> String {
    let mut hasher = Sha256::new();
    if let Some(parent) = parent {
        hasher.update(parent.as_str().as_bytes());
    }
    hasher.update(b"\0");
    hasher.update(seq.to_le_bytes());
    hasher.update(message.as_bytes());
    hasher.update(b"\0");
    for (path, content) in snapshot {
        hasher.update(path.to_string_lossy().as_bytes());
        hasher.update(b"\0");
        hasher.update(content);
        hasher.update(b"\0");
    }
    hex::encode(hasher.finalize())
}

fn is_ignored(name: &str) -> bool {
    name.starts_with(".git")
}

/// Read every file under `root` keyed by path relative to `root`.
fn read_tree(root: &Path) -> StorageResult<Snapshot> {
    let mut snapshot = Snapshot::new();
    if root.is_dir() {
        read_tree_recursive(root, root, &mut snapshot)?;
    }
    Ok(snapshot)
}

fn read_tree_recursive(root: &Path, dir: &Path, snapshot: &mut Snapshot) -> StorageResult<()> {
    for entry in fs::read_dir(dir)? {
        let entry = entry?;
        let path = entry.path();
        if is_ignored(&entry.file_name().to_string_lossy()) {
            continue;
        }
        if path.is_dir() {
            read_tree_recursive(root, &path, snapshot)?;
        } else {
            let relative = path
                .strip_prefix(root)
                .map_err(|e| StorageError::Backend(e.to_string()))?
                .to_path_buf();
            snapshot.insert(relative, fs::read(&path)?);
        }
    }
    Ok(())
}

/// Make the tree under `root` match `snapshot` exactly.
fn write_tree(root: &Path, snapshot: &Snapshot) -> StorageResult<()> {
    let current = read_tree(root)?;
    for stale in current.keys().filter(|p| !snapshot.contains_key(*p)) {
        fs::remove_file(root.join(stale))?;
    }
    for (relative, content) in snapshot {
        let path = root.join(relative);
        if current.get(relative) == Some(content) {
            continue;
        }
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(&path, content)?;
    }
    if root.is_dir() {
        prune_empty_dirs(root, root)?;
    }
    Ok(())
}

fn prune_empty_dirs(root: &Path, dir: &Path) -> StorageResult<()> {
    for entry in fs::read_dir(dir)? {
        let entry = entry?;
        let path = entry.path();
        if path.is_dir() && !is_ignored(&entry.file_name().to_string_lossy()) {
            prune_empty_dirs(root, &path)?;
        }
    }
    if dir != root && fs::read_dir(dir)?.next().is_none() {
        fs::remove_dir(dir)?;
    }
    Ok(())
}

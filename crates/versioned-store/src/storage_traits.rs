//! Storage trait definitions for graphenv
//!
//! `VersionedStorage` is the capability the environment engine uses to ask
//! "is the tracked directory clean", to record commits and to restore prior
//! versions. The engine never interprets a `VersionId`; it only passes ids
//! back to the backend that produced them.
//!
//! Backends:
//! - `GitStorage` (`git` module): shells out to `git` in the tracked directory.
//! - `MemoryVersionedStorage` (`fakes` module): snapshots the directory into
//!   memory, for deterministic tests without a VCS installed.

use std::path::Path;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::StorageError;

/// Result type for storage operations
pub type StorageResult<T> = std::result::Result<T, StorageError>;

/// Opaque version identifier supplied by a storage backend.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct VersionId(String);

impl VersionId {
    pub fn new(id: impl Into<String>) -> Self {
        VersionId(id.into())
    }

    /// Return the full identifier.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Short form (first 12 chars).
    pub fn short(&self) -> &str {
        let end = self
            .0
            .char_indices()
            .nth(12)
            .map(|(i, _)| i)
            .unwrap_or(self.0.len());
        &self.0[..end]
    }
}

impl std::fmt::Display for VersionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Descriptive metadata for one recorded version
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VersionInfo {
    pub id: VersionId,
    /// Commit message
    pub message: String,
    /// When the version was recorded
    pub created_at: DateTime<Utc>,
}

/// Versioned storage for a tracked directory.
///
/// Guarantees:
/// - `is_clean` and the read-only queries never touch the working tree.
/// - `commit` records the full tree and fails with `NothingToCommit` when the
///   tree matches head.
/// - `checkout` validates `version` before mutating anything; an unknown
///   version leaves the tree untouched.
/// - `checkout` rewrites tree content only. History is append-only and the
///   head pointer does not move, so the tree reads as modified until the
///   next `commit`.
#[async_trait]
pub trait VersionedStorage: Send + Sync {
    /// Root of the tracked directory.
    fn root(&self) -> &Path;

    /// Whether the tracked tree has no uncommitted changes relative to head.
    async fn is_clean(&self) -> StorageResult<bool>;

    /// Current head, or `None` before the first commit.
    async fn head(&self) -> StorageResult<Option<VersionId>>;

    /// Record the current tree as a new version.
    async fn commit(&self, message: &str) -> StorageResult<VersionId>;

    /// Restore the tracked tree to the content of `version`.
    async fn checkout(&self, version: &VersionId) -> StorageResult<()>;

    /// Versions after `from` (exclusive, or from the first version when
    /// `None`) up to and including `to`, oldest first.
    async fn log_range(
        &self,
        from: Option<&VersionId>,
        to: &VersionId,
    ) -> StorageResult<Vec<VersionId>>;

    /// Resolve a full id or unique prefix to a known version.
    async fn resolve(&self, reference: &str) -> StorageResult<VersionId>;

    /// Metadata for a known version.
    async fn describe(&self, version: &VersionId) -> StorageResult<VersionInfo>;
}

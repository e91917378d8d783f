//! Git-backed `VersionedStorage`.
//!
//! Every operation shells out to the `git` binary inside the tracked
//! directory. Version ids are full commit SHAs.

use std::path::{Path, PathBuf};
use std::process::Command;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tracing::{debug, info};

use crate::error::StorageError;
use crate::storage_traits::*;

const FALLBACK_USER_NAME: &str = "graphenv";
const FALLBACK_USER_EMAIL: &str = "graphenv@localhost";

/// Tracked directory managed by a git repository.
#[derive(Debug, Clone)]
pub struct GitStorage {
    root: PathBuf,
}

impl GitStorage {
    /// Open an existing git work tree rooted at `root`.
    pub fn open(root: impl Into<PathBuf>) -> StorageResult<Self> {
        let root = root.into();
        if !is_git_repo(&root) {
            return Err(StorageError::NotRepository {
                path: root.display().to_string(),
            });
        }
        Ok(Self { root })
    }

    /// Initialise a repository at `root` (creating the directory) or open the
    /// existing one.
    ///
    /// A local committer identity is configured when none is visible, so
    /// commits succeed on fresh machines and CI runners.
    pub fn init(root: impl Into<PathBuf>) -> StorageResult<Self> {
        let root = root.into();
        std::fs::create_dir_all(&root)?;
        if !is_git_repo(&root) {
            run_git(&root, &["init", "--quiet"])?;
            info!(path = %root.display(), "initialised git repository");
        }

        let storage = Self { root };
        if storage.git(&["config", "user.name"]).is_err() {
            storage.git(&["config", "user.name", FALLBACK_USER_NAME])?;
        }
        if storage.git(&["config", "user.email"]).is_err() {
            storage.git(&["config", "user.email", FALLBACK_USER_EMAIL])?;
        }
        Ok(storage)
    }

    fn git(&self, args: &[&str]) -> StorageResult<String> {
        run_git(&self.root, args)
    }

    /// `git rev-parse --verify` a reference down to a commit SHA.
    fn rev_parse_commit(&self, reference: &str) -> StorageResult<VersionId> {
        let spec = format!("{reference}^{{commit}}");
        self.git(&["rev-parse", "--verify", "--quiet", &spec])
            .map(VersionId::new)
            .map_err(|_| StorageError::UnknownVersion {
                reference: reference.to_string(),
            })
    }

    /// Every commit whose id starts with `prefix`.
    ///
    /// Only hex prefixes long enough for git to disambiguate are searched.
    fn commits_with_prefix(&self, prefix: &str) -> Vec<String> {
        if prefix.len() < 4 || !prefix.bytes().all(|b| b.is_ascii_hexdigit()) {
            return Vec::new();
        }
        let Ok(output) = self.git(&["rev-parse", &format!("--disambiguate={prefix}")]) else {
            return Vec::new();
        };
        output
            .lines()
            .filter(|oid| {
                self.git(&["cat-file", "-t", oid])
                    .is_ok_and(|kind| kind == "commit")
            })
            .map(str::to_string)
            .collect()
    }
}

#[async_trait]
impl VersionedStorage for GitStorage {
    fn root(&self) -> &Path {
        &self.root
    }

    async fn is_clean(&self) -> StorageResult<bool> {
        let status = self.git(&["status", "--porcelain", "--untracked-files=all"])?;
        Ok(status.is_empty())
    }

    async fn head(&self) -> StorageResult<Option<VersionId>> {
        Ok(self
            .git(&["rev-parse", "--verify", "--quiet", "HEAD"])
            .ok()
            .map(VersionId::new))
    }

    async fn commit(&self, message: &str) -> StorageResult<VersionId> {
        if self.is_clean().await? {
            return Err(StorageError::NothingToCommit);
        }
        self.git(&["add", "--all"])?;
        self.git(&["commit", "--quiet", "--no-verify", "-m", message])?;

        let id = self.rev_parse_commit("HEAD")?;
        debug!(version = %id.short(), "git commit recorded");
        Ok(id)
    }

    async fn checkout(&self, version: &VersionId) -> StorageResult<()> {
        let target = self.rev_parse_commit(version.as_str())?;
        let source = format!("--source={}", target.as_str());

        // No-overlay restore removes tracked files absent from the target;
        // clean removes untracked ones.
        self.git(&["restore", &source, "--staged", "--worktree", "--", ":/"])?;
        self.git(&["clean", "-fdq"])?;
        Ok(())
    }

    async fn log_range(
        &self,
        from: Option<&VersionId>,
        to: &VersionId,
    ) -> StorageResult<Vec<VersionId>> {
        let to = self.rev_parse_commit(to.as_str())?;
        let range = match from {
            Some(from) => {
                let from = self.rev_parse_commit(from.as_str())?;
                format!("{}..{}", from.as_str(), to.as_str())
            }
            None => to.as_str().to_string(),
        };
        let output = self.git(&["rev-list", "--reverse", &range])?;
        Ok(output.lines().map(VersionId::new).collect())
    }

    async fn resolve(&self, reference: &str) -> StorageResult<VersionId> {
        self.rev_parse_commit(reference).map_err(|err| {
            let matches = self.commits_with_prefix(reference);
            if matches.len() > 1 {
                StorageError::AmbiguousVersion {
                    reference: reference.to_string(),
                    matches,
                }
            } else {
                err
            }
        })
    }

    async fn describe(&self, version: &VersionId) -> StorageResult<VersionInfo> {
        let output = self.git(&["show", "-s", "--format=%H%x00%cI%x00%s", version.as_str()])?;
        let mut parts = output.splitn(3, '\0');
        let (Some(id), Some(date), Some(message)) = (parts.next(), parts.next(), parts.next())
        else {
            return Err(StorageError::Backend(format!(
                "unexpected git show output for {version}"
            )));
        };
        let created_at = DateTime::parse_from_rfc3339(date)
            .map_err(|e| StorageError::Backend(format!("invalid commit date {date}: {e}")))?
            .with_timezone(&Utc);
        Ok(VersionInfo {
            id: VersionId::new(id),
            message: message.to_string(),
            created_at,
        })
    }
}

/// Run git in `dir`, returning trimmed stdout.
fn run_git(dir: &Path, args: &[&str]) -> StorageResult<String> {
    let output = Command::new("git")
        .args(args)
        .current_dir(dir)
        .output()
        .map_err(|e| StorageError::Command {
            command: format!("git {}", args.join(" ")),
            stderr: format!("failed to run git: {e}"),
        })?;

    if !output.status.success() {
        return Err(StorageError::Command {
            command: format!("git {}", args.join(" ")),
            stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
        });
    }

    Ok(String::from_utf8_lossy(&output.stdout).trim().to_string())
}

/// Check whether a directory is the top level of a git work tree.
///
/// A directory nested inside some other repository does not count.
pub fn is_git_repo(dir: &Path) -> bool {
    let Ok(top) = run_git(dir, &["rev-parse", "--show-toplevel"]) else {
        return false;
    };
    match (Path::new(&top).canonicalize(), dir.canonicalize()) {
        (Ok(top), Ok(dir)) => top == dir,
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    fn make_storage() -> (tempfile::TempDir, GitStorage) {
        let dir = tempfile::tempdir().unwrap();
        let storage = GitStorage::init(dir.path()).unwrap();
        (dir, storage)
    }

    #[test]
    fn open_fails_outside_repo() {
        let dir = tempfile::tempdir().unwrap();
        let result = GitStorage::open(dir.path());
        assert!(matches!(result, Err(StorageError::NotRepository { .. })));
    }

    #[test]
    fn init_is_reentrant() {
        let (dir, _storage) = make_storage();
        assert!(GitStorage::init(dir.path()).is_ok());
        assert!(GitStorage::open(dir.path()).is_ok());
    }

    #[test]
    fn nested_directory_gets_its_own_repo() {
        let (dir, _storage) = make_storage();
        let nested = dir.path().join("project");
        fs::create_dir_all(&nested).unwrap();
        assert!(!is_git_repo(&nested));

        GitStorage::init(&nested).unwrap();
        assert!(is_git_repo(&nested));
    }

    #[tokio::test]
    async fn commit_returns_full_sha() {
        let (dir, storage) = make_storage();
        fs::write(dir.path().join("a.json"), "{}").unwrap();
        let id = storage.commit("first").await.unwrap();
        assert_eq!(id.as_str().len(), 40, "SHA should be 40 hex chars, got: {id}");
        assert_eq!(storage.head().await.unwrap(), Some(id));
    }

    #[tokio::test]
    async fn commit_on_clean_tree_is_rejected() {
        let (dir, storage) = make_storage();
        fs::write(dir.path().join("a.json"), "{}").unwrap();
        storage.commit("first").await.unwrap();
        assert!(matches!(
            storage.commit("again").await,
            Err(StorageError::NothingToCommit)
        ));
    }

    #[tokio::test]
    async fn untracked_file_makes_tree_dirty() {
        let (dir, storage) = make_storage();
        fs::write(dir.path().join("a.json"), "{}").unwrap();
        storage.commit("first").await.unwrap();
        assert!(storage.is_clean().await.unwrap());

        fs::write(dir.path().join("b.json"), "{}").unwrap();
        assert!(!storage.is_clean().await.unwrap());
    }

    #[tokio::test]
    async fn checkout_restores_content_and_keeps_history() {
        let (dir, storage) = make_storage();
        fs::write(dir.path().join("a.json"), "v1").unwrap();
        let v1 = storage.commit("v1").await.unwrap();
        fs::write(dir.path().join("a.json"), "v2").unwrap();
        fs::write(dir.path().join("b.json"), "v2 only").unwrap();
        let v2 = storage.commit("v2").await.unwrap();
        fs::write(dir.path().join("scratch.txt"), "uncommitted").unwrap();

        storage.checkout(&v1).await.unwrap();

        assert_eq!(fs::read_to_string(dir.path().join("a.json")).unwrap(), "v1");
        assert!(!dir.path().join("b.json").exists());
        assert!(!dir.path().join("scratch.txt").exists());
        assert_eq!(storage.head().await.unwrap(), Some(v2));
    }

    #[tokio::test]
    async fn checkout_unknown_version_fails() {
        let (dir, storage) = make_storage();
        fs::write(dir.path().join("a.json"), "v1").unwrap();
        storage.commit("v1").await.unwrap();
        let bogus = VersionId::new("0000000000000000000000000000000000000000");
        assert!(matches!(
            storage.checkout(&bogus).await,
            Err(StorageError::UnknownVersion { .. })
        ));
    }

    #[tokio::test]
    async fn log_range_and_describe() {
        let (dir, storage) = make_storage();
        fs::write(dir.path().join("a.json"), "1").unwrap();
        let v1 = storage.commit("one").await.unwrap();
        fs::write(dir.path().join("a.json"), "2").unwrap();
        let v2 = storage.commit("two").await.unwrap();
        fs::write(dir.path().join("a.json"), "3").unwrap();
        let v3 = storage.commit("three").await.unwrap();

        let all = storage.log_range(None, &v3).await.unwrap();
        assert_eq!(all, vec![v1.clone(), v2.clone(), v3.clone()]);

        let tail = storage.log_range(Some(&v1), &v3).await.unwrap();
        assert_eq!(tail, vec![v2.clone(), v3.clone()]);

        let info = storage.describe(&v2).await.unwrap();
        assert_eq!(info.id, v2);
        assert_eq!(info.message, "two");

        let short = storage.resolve(&v3.as_str()[..10]).await.unwrap();
        assert_eq!(short, v3);
    }

    #[tokio::test]
    async fn shared_short_prefix_is_ambiguous() {
        let (dir, storage) = make_storage();
        fs::write(dir.path().join("a.json"), "1").unwrap();
        storage.commit("one").await.unwrap();
        let tree = storage.git(&["rev-parse", "HEAD^{tree}"]).unwrap();

        // Dangling commits until two share a four-character prefix.
        let mut seen = std::collections::HashMap::new();
        let mut shared = None;
        for i in 0..4000 {
            let message = format!("c{i}");
            let oid = storage
                .git(&["commit-tree", &tree, "-p", "HEAD", "-m", &message])
                .unwrap();
            let prefix = oid[..4].to_string();
            if seen.insert(prefix.clone(), oid).is_some() {
                shared = Some(prefix);
                break;
            }
        }
        let prefix = shared.expect("no shared prefix within 4000 commits");

        match storage.resolve(&prefix).await {
            Err(StorageError::AmbiguousVersion { reference, matches }) => {
                assert_eq!(reference, prefix);
                assert!(matches.len() >= 2);
                assert!(matches.iter().all(|m| m.starts_with(&prefix)));
            }
            other => panic!("expected AmbiguousVersion, got {other:?}"),
        }

        assert!(matches!(
            storage.resolve("no-such-ref").await,
            Err(StorageError::UnknownVersion { .. })
        ));
    }
}

//! Safe rollback of an environment to a committed version.
//!
//! ```text
//! Idle -> CheckingCleanliness -> Rejected
//!                             -> Restoring -> Done
//!                                          -> Failed
//! ```
//!
//! Work is "uncommitted" when the tracked directory differs from head or a
//! live workflow differs semantically from its tracked copy. Without `force`
//! such a rollback is rejected before anything is written. With `force` the
//! changes are discarded.
//!
//! Restoring rewrites the tracked tree to the target, records that as a new
//! version ("Rollback to <id>") so history stays append-only, then copies
//! the tracked workflows back into the live directory. A failure in either
//! half is fatal and names the half that failed.

use std::fmt;
use std::sync::Arc;

use serde::Serialize;
use versioned_store::{StorageError, VersionId, VersionedStorage};

use crate::domain::{EnvError, RestoreSide, Result};
use crate::obs;
use crate::workflow_manager::{WorkflowManager, WorkflowSyncReport};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RollbackState {
    Idle,
    CheckingCleanliness,
    /// Refused before any mutation
    Rejected,
    Restoring,
    Done,
    /// Restore failed part way
    Failed,
}

impl RollbackState {
    pub fn as_str(&self) -> &'static str {
        match self {
            RollbackState::Idle => "idle",
            RollbackState::CheckingCleanliness => "checking_cleanliness",
            RollbackState::Rejected => "rejected",
            RollbackState::Restoring => "restoring",
            RollbackState::Done => "done",
            RollbackState::Failed => "failed",
        }
    }
}

impl fmt::Display for RollbackState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// What a successful rollback did.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RollbackOutcome {
    pub target: VersionId,
    /// Uncommitted work existed and was discarded under `force`
    pub discarded_uncommitted: bool,
    /// Version recording the rollback, `None` when head already matched
    pub recorded: Option<VersionId>,
    /// Live directory changes
    pub sync: WorkflowSyncReport,
}

/// Runs rollbacks for one environment.
///
/// `rollback` takes `&mut self`: the cleanliness check and the restore form
/// one critical section with respect to anything else driving this
/// controller.
pub struct RollbackController {
    storage: Arc<dyn VersionedStorage>,
    workflows: WorkflowManager,
    state: RollbackState,
}

impl RollbackController {
    pub fn new(storage: Arc<dyn VersionedStorage>, workflows: WorkflowManager) -> Self {
        Self {
            storage,
            workflows,
            state: RollbackState::Idle,
        }
    }

    /// State reached by the last rollback (or `Idle`).
    pub fn state(&self) -> RollbackState {
        self.state
    }

    /// Roll the environment back to `target` (full id or unique prefix).
    pub async fn rollback(&mut self, target: &str, force: bool) -> Result<RollbackOutcome> {
        self.state = RollbackState::Idle;
        self.transition(RollbackState::CheckingCleanliness, target);

        let target_id = match self.storage.resolve(target).await {
            Ok(id) => id,
            Err(e) => return Err(self.reject(target, e.into())),
        };

        let tracked_dirty = match self.storage.is_clean().await {
            Ok(clean) => !clean,
            Err(e) => return Err(self.reject(target, e.into())),
        };
        let workflows = match self.workflows.changed_workflows() {
            Ok(names) => names,
            Err(e) => return Err(self.reject(target, e)),
        };
        let dirty = tracked_dirty || !workflows.is_empty();

        if dirty && !force {
            let err = EnvError::UncommittedChanges {
                tracked_dirty,
                workflows,
            };
            return Err(self.reject(target, err));
        }

        self.transition(RollbackState::Restoring, target);

        if let Err(e) = self.storage.checkout(&target_id).await {
            return Err(self.fail(target, RestoreSide::RepositoryCheckout, e));
        }
        let recorded = match self.record(&target_id).await {
            Ok(recorded) => recorded,
            Err(e) => return Err(self.fail(target, RestoreSide::RepositoryCheckout, e)),
        };
        let sync = match self.workflows.restore_all_workflows() {
            Ok(sync) => sync,
            Err(e) => return Err(self.fail(target, RestoreSide::LiveDirectorySync, e)),
        };

        self.transition(RollbackState::Done, target);
        Ok(RollbackOutcome {
            target: target_id,
            discarded_uncommitted: dirty,
            recorded,
            sync,
        })
    }

    /// Commit the restored tree unless it already matches head.
    async fn record(&self, target: &VersionId) -> std::result::Result<Option<VersionId>, StorageError> {
        if self.storage.is_clean().await? {
            return Ok(None);
        }
        let message = format!("Rollback to {}", target.short());
        match self.storage.commit(&message).await {
            Ok(version) => {
                obs::emit_commit_recorded(version.as_str(), &message);
                Ok(Some(version))
            }
            Err(StorageError::NothingToCommit) => Ok(None),
            Err(e) => Err(e),
        }
    }

    fn transition(&mut self, to: RollbackState, target: &str) {
        obs::emit_rollback_transition(self.state.as_str(), to.as_str(), target);
        self.state = to;
    }

    fn reject(&mut self, target: &str, err: EnvError) -> EnvError {
        obs::emit_rollback_rejected(target, &err);
        self.transition(RollbackState::Rejected, target);
        err
    }

    fn fail<E>(&mut self, target: &str, side: RestoreSide, source: E) -> EnvError
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        obs::emit_restore_failed(target, &side.to_string(), &source);
        self.transition(RollbackState::Failed, target);
        EnvError::restore(side, source)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use std::path::Path;
    use tempfile::TempDir;
    use versioned_store::fakes::MemoryVersionedStorage;

    struct Fixture {
        _dir: TempDir,
        storage: Arc<MemoryVersionedStorage>,
        workflows: WorkflowManager,
    }

    fn fixture() -> Fixture {
        let dir = tempfile::tempdir().unwrap();
        let tracked = dir.path().join("tracked");
        let live = dir.path().join("live");
        fs::create_dir_all(&tracked).unwrap();
        fs::create_dir_all(&live).unwrap();
        Fixture {
            storage: Arc::new(MemoryVersionedStorage::new(&tracked)),
            workflows: WorkflowManager::new(&live, tracked.join("workflows")),
            _dir: dir,
        }
    }

    fn save(root: &Path, name: &str, body: &str) {
        fs::create_dir_all(root).unwrap();
        fs::write(root.join(format!("{name}.json")), body).unwrap();
    }

    async fn commit(f: &Fixture, message: &str) -> VersionId {
        f.workflows.copy_all_workflows().unwrap();
        f.storage.commit(message).await.unwrap()
    }

    #[tokio::test]
    async fn test_unknown_target_is_rejected_without_mutation() {
        let f = fixture();
        save(f.workflows.live_dir(), "a", r#"{"nodes": []}"#);
        commit(&f, "v1").await;

        let mut controller = RollbackController::new(f.storage.clone(), f.workflows.clone());
        let err = controller.rollback("ffffffff", false).await.unwrap_err();
        assert!(matches!(err, EnvError::Storage(StorageError::UnknownVersion { .. })));
        assert_eq!(controller.state(), RollbackState::Rejected);
        assert_eq!(f.storage.version_count(), 1);
    }

    #[tokio::test]
    async fn test_live_only_edit_counts_as_uncommitted() {
        let f = fixture();
        save(f.workflows.live_dir(), "a", r#"{"nodes": []}"#);
        let v1 = commit(&f, "v1").await;
        save(f.workflows.live_dir(), "a", r#"{"nodes": [], "extra": {"note": 1}}"#);

        let mut controller = RollbackController::new(f.storage.clone(), f.workflows.clone());
        let err = controller.rollback(v1.as_str(), false).await.unwrap_err();
        match err {
            EnvError::UncommittedChanges {
                tracked_dirty,
                workflows,
            } => {
                assert!(!tracked_dirty);
                assert_eq!(workflows, vec!["a"]);
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[tokio::test]
    async fn test_checkout_failure_names_repository_side() {
        let f = fixture();
        save(f.workflows.live_dir(), "a", r#"{"nodes": []}"#);
        let v1 = commit(&f, "v1").await;

        f.storage.fail_next_checkout();
        let mut controller = RollbackController::new(f.storage.clone(), f.workflows.clone());
        let err = controller.rollback(v1.as_str(), false).await.unwrap_err();
        assert!(matches!(
            err,
            EnvError::RestoreIo {
                side: RestoreSide::RepositoryCheckout,
                ..
            }
        ));
        assert_eq!(controller.state(), RollbackState::Failed);
    }

    #[tokio::test]
    async fn test_live_sync_failure_names_live_side() {
        let f = fixture();
        save(f.workflows.live_dir(), "a", r#"{"nodes": []}"#);
        let v1 = commit(&f, "v1").await;

        // A plain file where the live directory should be.
        fs::remove_dir_all(f.workflows.live_dir()).unwrap();
        fs::write(f.workflows.live_dir(), "not a directory").unwrap();

        let mut controller = RollbackController::new(f.storage.clone(), f.workflows.clone());
        let err = controller.rollback(v1.as_str(), true).await.unwrap_err();
        assert!(matches!(
            err,
            EnvError::RestoreIo {
                side: RestoreSide::LiveDirectorySync,
                ..
            }
        ));
        assert_eq!(controller.state(), RollbackState::Failed);
        assert!(f.workflows.live_dir().is_file());
    }

    #[tokio::test]
    async fn test_rollback_to_head_records_nothing() {
        let f = fixture();
        save(f.workflows.live_dir(), "a", r#"{"nodes": []}"#);
        let v1 = commit(&f, "v1").await;

        let mut controller = RollbackController::new(f.storage.clone(), f.workflows.clone());
        let outcome = controller.rollback(&v1.as_str()[..8], false).await.unwrap();
        assert_eq!(outcome.target, v1);
        assert_eq!(outcome.recorded, None);
        assert!(!outcome.discarded_uncommitted);
        assert!(!outcome.sync.changed());
        assert_eq!(controller.state(), RollbackState::Done);
    }
}

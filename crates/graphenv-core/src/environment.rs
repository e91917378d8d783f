//! One managed environment: a live application directory, a tracked
//! directory and the versioned storage behind it.

use std::fs;
use std::sync::Arc;

use node_registry::{GlobalMappingTable, ModelLookup};
use serde::Serialize;
use tracing::info;
use versioned_store::{GitStorage, StorageError, VersionId, VersionInfo, VersionedStorage};

use crate::config::EnvConfig;
use crate::domain::Result;
use crate::obs;
use crate::rollback::{RollbackController, RollbackOutcome, RollbackState};
use crate::workflow_manager::{
    BatchResolution, WorkflowManager, WorkflowState, WorkflowStatus, WorkflowSyncReport,
};

/// Snapshot of what would be committed.
#[derive(Debug, Clone, Serialize)]
pub struct EnvironmentStatus {
    pub head: Option<VersionId>,
    /// Tracked directory has changes relative to head
    pub tracked_dirty: bool,
    pub workflows: Vec<WorkflowState>,
}

impl EnvironmentStatus {
    pub fn is_clean(&self) -> bool {
        !self.tracked_dirty
            && self
                .workflows
                .iter()
                .all(|w| w.status == WorkflowStatus::Synced)
    }
}

/// Result of [`Environment::commit`].
#[derive(Debug, Clone, Serialize)]
pub struct CommitOutcome {
    /// `None` when nothing changed since head
    pub version: Option<VersionId>,
    pub sync: WorkflowSyncReport,
}

pub struct Environment {
    config: EnvConfig,
    storage: Arc<dyn VersionedStorage>,
    workflows: WorkflowManager,
    rollback: RollbackController,
}

impl Environment {
    /// Environment over an explicit storage backend.
    pub fn new(config: EnvConfig, storage: Arc<dyn VersionedStorage>) -> Self {
        let workflows = WorkflowManager::from_config(&config);
        let rollback = RollbackController::new(storage.clone(), workflows.clone());
        Self {
            config,
            storage,
            workflows,
            rollback,
        }
    }

    /// Open an existing git-tracked environment.
    pub fn open(config: EnvConfig) -> Result<Self> {
        let storage = GitStorage::open(config.tracked_dir.clone())?;
        Ok(Self::new(config, Arc::new(storage)))
    }

    /// Create the tracked directory as a git repository (idempotent).
    pub fn init(config: EnvConfig) -> Result<Self> {
        fs::create_dir_all(config.tracked_workflows_dir())?;
        let storage = GitStorage::init(config.tracked_dir.clone())?;
        info!(tracked = %config.tracked_dir.display(), "initialized environment");
        Ok(Self::new(config, Arc::new(storage)))
    }

    pub fn config(&self) -> &EnvConfig {
        &self.config
    }

    pub fn storage(&self) -> &Arc<dyn VersionedStorage> {
        &self.storage
    }

    pub fn workflows(&self) -> &WorkflowManager {
        &self.workflows
    }

    pub fn rollback_state(&self) -> RollbackState {
        self.rollback.state()
    }

    pub async fn status(&self) -> Result<EnvironmentStatus> {
        Ok(EnvironmentStatus {
            head: self.storage.head().await?,
            tracked_dirty: !self.storage.is_clean().await?,
            workflows: self.workflows.workflow_status()?,
        })
    }

    /// Copy live workflows into the tracked directory and record a version.
    pub async fn commit(&mut self, message: &str) -> Result<CommitOutcome> {
        let sync = self.workflows.copy_all_workflows()?;
        let version = match self.storage.commit(message).await {
            Ok(version) => {
                obs::emit_commit_recorded(version.as_str(), message);
                Some(version)
            }
            Err(StorageError::NothingToCommit) => None,
            Err(e) => return Err(e.into()),
        };
        Ok(CommitOutcome { version, sync })
    }

    /// See [`RollbackController::rollback`].
    pub async fn rollback(&mut self, target: &str, force: bool) -> Result<RollbackOutcome> {
        self.rollback.rollback(target, force).await
    }

    /// Versions newest first, at most `limit` of them.
    pub async fn history(&self, limit: Option<usize>) -> Result<Vec<VersionInfo>> {
        let Some(head) = self.storage.head().await? else {
            return Ok(Vec::new());
        };
        let ids = self.storage.log_range(None, &head).await?;
        let limit = limit.unwrap_or(usize::MAX);

        let mut history = Vec::new();
        for id in ids.iter().rev().take(limit) {
            history.push(self.storage.describe(id).await?);
        }
        Ok(history)
    }

    /// Resolve every live workflow against one registry snapshot.
    pub async fn resolve_all(
        &self,
        mapping: &GlobalMappingTable,
        lookup: &dyn ModelLookup,
    ) -> Result<BatchResolution> {
        self.workflows.resolve_all(mapping, lookup).await
    }
}

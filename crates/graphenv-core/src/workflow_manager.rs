//! Workflow analysis, resolution and live/tracked synchronization.
//!
//! Workflows are JSON files under two roots:
//! - the live directory the application reads and writes
//! - the tracked directory under version control
//!
//! A workflow's name is its path relative to the root, with `/` separators
//! and without the `.json` extension.

use std::collections::{BTreeSet, HashSet};
use std::fs;
use std::io::{self, Write};
use std::path::{Component, Path, PathBuf};

use node_registry::{GlobalMappingTable, ModelLookup};
use serde::Serialize;
use serde_json::Value;
use tempfile::NamedTempFile;
use tracing::{debug, warn, Instrument};

use crate::config::EnvConfig;
use crate::domain::{Dependencies, EnvError, ResolutionResult, Result};
use crate::extract::extract_dependencies;
use crate::model_resolver::ModelResolver;
use crate::node_resolver::GlobalNodeResolver;
use crate::normalize::workflows_differ;
use crate::obs::{self, WorkflowSpan};

const WORKFLOW_SUFFIX: &str = ".json";

/// Names touched by a sync, each list sorted.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct WorkflowSyncReport {
    pub copied: Vec<String>,
    pub unchanged: Vec<String>,
    pub removed: Vec<String>,
}

impl WorkflowSyncReport {
    /// Whether the sync wrote or deleted anything.
    pub fn changed(&self) -> bool {
        !self.copied.is_empty() || !self.removed.is_empty()
    }
}

/// Live workflow compared with its tracked copy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkflowStatus {
    /// Only in the live directory
    New,
    /// Differs semantically from the tracked copy
    Modified,
    /// Only in the tracked directory
    Deleted,
    Synced,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct WorkflowState {
    pub name: String,
    pub status: WorkflowStatus,
}

/// A workflow that could not be processed in a batch.
#[derive(Debug)]
pub struct WorkflowFailure {
    pub name: String,
    pub error: EnvError,
}

#[derive(Debug, Default)]
pub struct BatchAnalysis {
    pub workflows: Vec<(String, Dependencies)>,
    pub failures: Vec<WorkflowFailure>,
}

#[derive(Debug, Default)]
pub struct BatchResolution {
    pub workflows: Vec<(String, ResolutionResult)>,
    pub failures: Vec<WorkflowFailure>,
}

impl BatchResolution {
    /// All successfully resolved workflows merged in name order. Failed
    /// workflows are not part of the aggregate.
    pub fn aggregate(&self) -> ResolutionResult {
        let mut total = ResolutionResult::default();
        for (_, result) in &self.workflows {
            total.merge(result.clone());
        }
        total
    }

    pub fn has_issues(&self) -> bool {
        self.workflows.iter().any(|(_, r)| r.has_issues())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SyncMode {
    /// Skip targets that only differ in volatile content
    Semantic,
    /// Make the target byte-identical
    Exact,
}

/// Analysis, resolution and change detection for an environment's workflows.
#[derive(Debug, Clone)]
pub struct WorkflowManager {
    live_dir: PathBuf,
    tracked_dir: PathBuf,
}

impl WorkflowManager {
    /// Manager over the given workflow directories.
    pub fn new(live_dir: impl Into<PathBuf>, tracked_dir: impl Into<PathBuf>) -> Self {
        Self {
            live_dir: live_dir.into(),
            tracked_dir: tracked_dir.into(),
        }
    }

    pub fn from_config(config: &EnvConfig) -> Self {
        Self::new(config.live_workflows_dir(), config.tracked_workflows_dir())
    }

    pub fn live_dir(&self) -> &Path {
        &self.live_dir
    }

    pub fn tracked_dir(&self) -> &Path {
        &self.tracked_dir
    }

    /// Names of the live workflows, sorted.
    pub fn list_workflows(&self) -> Result<Vec<String>> {
        list_workflows(&self.live_dir)
    }

    /// Parse `<live>/<name>.json`.
    pub fn load_workflow(&self, name: &str) -> Result<Value> {
        let path = workflow_path(&self.live_dir, name)?;
        let bytes = fs::read(&path).map_err(|e| match e.kind() {
            io::ErrorKind::NotFound => EnvError::WorkflowNotFound(name.to_string()),
            _ => EnvError::Io(e),
        })?;
        serde_json::from_slice(&bytes).map_err(|e| EnvError::parse(name, e))
    }

    /// Extract the dependencies of one live workflow.
    pub fn analyze_workflow(&self, name: &str) -> Result<Dependencies> {
        let _span = WorkflowSpan::enter(name);
        let workflow = self.load_workflow(name)?;
        let deps = extract_dependencies(name, &workflow)?;
        obs::emit_workflow_analyzed(
            name,
            deps.nodes.len(),
            deps.builtin_nodes.len(),
            deps.models.len(),
        );
        Ok(deps)
    }

    /// Resolve extracted dependencies against one registry snapshot.
    pub async fn resolve_workflow(
        &self,
        deps: &Dependencies,
        mapping: &GlobalMappingTable,
        lookup: &dyn ModelLookup,
    ) -> ResolutionResult {
        let nodes = GlobalNodeResolver::new(mapping).resolve(&deps.nodes);
        let models = ModelResolver::new(lookup).resolve(&deps.models).await;
        ResolutionResult::from_resolutions(nodes, models)
    }

    /// Analyze every live workflow. Unreadable workflows are reported, not
    /// fatal.
    pub fn analyze_all(&self) -> Result<BatchAnalysis> {
        let mut batch = BatchAnalysis::default();
        for name in self.list_workflows()? {
            match self.analyze_workflow(&name) {
                Ok(deps) => batch.workflows.push((name, deps)),
                Err(error) => {
                    warn!(workflow = %name, error = %error, "skipping workflow");
                    batch.failures.push(WorkflowFailure { name, error });
                }
            }
        }
        Ok(batch)
    }

    /// Analyze and resolve every live workflow against one registry snapshot.
    pub async fn resolve_all(
        &self,
        mapping: &GlobalMappingTable,
        lookup: &dyn ModelLookup,
    ) -> Result<BatchResolution> {
        let analysis = self.analyze_all()?;
        let mut batch = BatchResolution {
            workflows: Vec::with_capacity(analysis.workflows.len()),
            failures: analysis.failures,
        };

        for (name, deps) in analysis.workflows {
            let span = tracing::info_span!("graphenv.workflow", workflow = %name);
            let result = self
                .resolve_workflow(&deps, mapping, lookup)
                .instrument(span)
                .await;
            obs::emit_resolution_finished(
                &name,
                result.nodes_resolved.len() + result.models_resolved.len(),
                result.issue_count(),
            );
            batch.workflows.push((name, result));
        }
        Ok(batch)
    }

    /// Copy live workflows into the tracked directory.
    ///
    /// Tracked copies that match semantically are left alone, so a save that
    /// only bumped the revision counter produces no diff. Tracked workflows
    /// without a live counterpart are removed.
    pub fn copy_all_workflows(&self) -> Result<WorkflowSyncReport> {
        let report = sync_dir(&self.live_dir, &self.tracked_dir, SyncMode::Semantic)?;
        obs::emit_workflows_synced(
            "live_to_tracked",
            report.copied.len(),
            report.unchanged.len(),
            report.removed.len(),
        );
        Ok(report)
    }

    /// Make the live workflows byte-identical to the tracked ones.
    pub fn restore_all_workflows(&self) -> Result<WorkflowSyncReport> {
        let report = sync_dir(&self.tracked_dir, &self.live_dir, SyncMode::Exact)?;
        obs::emit_workflows_synced(
            "tracked_to_live",
            report.copied.len(),
            report.unchanged.len(),
            report.removed.len(),
        );
        Ok(report)
    }

    /// Classify every workflow present on either side, sorted by name.
    pub fn workflow_status(&self) -> Result<Vec<WorkflowState>> {
        let live: BTreeSet<String> = list_workflows(&self.live_dir)?.into_iter().collect();
        let tracked: BTreeSet<String> = list_workflows(&self.tracked_dir)?.into_iter().collect();

        let mut states = Vec::new();
        for name in live.union(&tracked) {
            let status = match (live.contains(name), tracked.contains(name)) {
                (true, false) => WorkflowStatus::New,
                (false, _) => WorkflowStatus::Deleted,
                (true, true) => {
                    let a = fs::read(workflow_path(&self.live_dir, name)?)?;
                    let b = fs::read(workflow_path(&self.tracked_dir, name)?)?;
                    if equivalent(&a, &b, SyncMode::Semantic) {
                        WorkflowStatus::Synced
                    } else {
                        WorkflowStatus::Modified
                    }
                }
            };
            states.push(WorkflowState {
                name: name.clone(),
                status,
            });
        }
        Ok(states)
    }

    /// Names of workflows whose live state is not yet tracked.
    pub fn changed_workflows(&self) -> Result<Vec<String>> {
        Ok(self
            .workflow_status()?
            .into_iter()
            .filter(|s| s.status != WorkflowStatus::Synced)
            .map(|s| s.name)
            .collect())
    }
}

/// `<root>/<name>.json`, refusing names that escape `root`.
fn workflow_path(root: &Path, name: &str) -> Result<PathBuf> {
    let relative = Path::new(name);
    let valid = !name.is_empty()
        && relative
            .components()
            .all(|c| matches!(c, Component::Normal(_)));
    if !valid {
        return Err(EnvError::WorkflowNotFound(name.to_string()));
    }
    Ok(root.join(format!("{name}{WORKFLOW_SUFFIX}")))
}

/// Workflow names under `root`, sorted. A missing root has none.
fn list_workflows(root: &Path) -> Result<Vec<String>> {
    let mut names = Vec::new();
    if root.is_dir() {
        collect_workflows(root, root, &mut names)?;
    }
    names.sort();
    Ok(names)
}

fn collect_workflows(root: &Path, dir: &Path, names: &mut Vec<String>) -> Result<()> {
    for entry in fs::read_dir(dir)? {
        let path = entry?.path();
        let Some(file_name) = path.file_name().map(|n| n.to_string_lossy().into_owned()) else {
            continue;
        };
        if file_name.starts_with('.') {
            continue;
        }
        if path.is_dir() {
            collect_workflows(root, &path, names)?;
            continue;
        }
        if !file_name.ends_with(WORKFLOW_SUFFIX) {
            continue;
        }

        let relative = path.strip_prefix(root).unwrap_or(&path);
        let name = relative
            .components()
            .map(|c| c.as_os_str().to_string_lossy().into_owned())
            .collect::<Vec<_>>()
            .join("/");
        if let Some(stem) = name.strip_suffix(WORKFLOW_SUFFIX) {
            names.push(stem.to_string());
        }
    }
    Ok(())
}

fn equivalent(a: &[u8], b: &[u8], mode: SyncMode) -> bool {
    if a == b {
        return true;
    }
    match mode {
        SyncMode::Exact => false,
        SyncMode::Semantic => match (
            serde_json::from_slice::<Value>(a),
            serde_json::from_slice::<Value>(b),
        ) {
            (Ok(a), Ok(b)) => !workflows_differ(&a, &b),
            _ => false,
        },
    }
}

fn sync_dir(from: &Path, to: &Path, mode: SyncMode) -> Result<WorkflowSyncReport> {
    let sources = list_workflows(from)?;
    let mut report = WorkflowSyncReport::default();
    fs::create_dir_all(to)?;

    for name in &sources {
        let bytes = fs::read(workflow_path(from, name)?)?;
        let target = workflow_path(to, name)?;
        if target.is_file() && equivalent(&bytes, &fs::read(&target)?, mode) {
            report.unchanged.push(name.clone());
            continue;
        }
        write_atomic(&target, &bytes)?;
        debug!(workflow = %name, to = %to.display(), "copied workflow");
        report.copied.push(name.clone());
    }

    let keep: HashSet<&String> = sources.iter().collect();
    for name in list_workflows(to)? {
        if !keep.contains(&name) {
            fs::remove_file(workflow_path(to, &name)?)?;
            debug!(workflow = %name, from = %to.display(), "removed workflow");
            report.removed.push(name);
        }
    }

    Ok(report)
}

/// Write via a temp file in the same directory, then rename.
fn write_atomic(path: &Path, bytes: &[u8]) -> Result<()> {
    let dir = path.parent().ok_or_else(|| {
        io::Error::new(io::ErrorKind::InvalidInput, "workflow path has no parent")
    })?;
    fs::create_dir_all(dir)?;
    let mut tmp = NamedTempFile::new_in(dir)?;
    tmp.write_all(bytes)?;
    tmp.persist(path).map_err(|e| e.error)?;
    Ok(())
}

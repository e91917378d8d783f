//! Environment configuration
//!
//! Values default from `GRAPHENV_*` environment variables; builder methods
//! override them.

use std::path::{Path, PathBuf};

use node_registry::RegistryConfig;
use serde::{Deserialize, Serialize};

/// Default location of the live application directory.
pub const DEFAULT_LIVE_DIR: &str = "ComfyUI";

/// Default location of the tracked (version-controlled) directory.
pub const DEFAULT_TRACKED_DIR: &str = ".graphenv";

/// Where the application keeps saved workflows, relative to its root.
pub const DEFAULT_WORKFLOWS_SUBDIR: &str = "user/default/workflows";

/// Workflow directory inside the tracked directory.
pub const TRACKED_WORKFLOWS_DIR: &str = "workflows";

/// Paths and registries for one environment.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EnvConfig {
    /// Root of the live application install
    pub live_dir: PathBuf,
    /// Directory under version control
    pub tracked_dir: PathBuf,
    /// Saved-workflow directory relative to `live_dir`
    pub workflows_subdir: PathBuf,
    pub registry: RegistryConfig,
}

impl Default for EnvConfig {
    fn default() -> Self {
        EnvConfig {
            live_dir: std::env::var("GRAPHENV_LIVE_DIR")
                .map(PathBuf::from)
                .unwrap_or_else(|_| PathBuf::from(DEFAULT_LIVE_DIR)),
            tracked_dir: std::env::var("GRAPHENV_TRACKED_DIR")
                .map(PathBuf::from)
                .unwrap_or_else(|_| PathBuf::from(DEFAULT_TRACKED_DIR)),
            workflows_subdir: PathBuf::from(DEFAULT_WORKFLOWS_SUBDIR),
            registry: RegistryConfig::from_env(),
        }
    }
}

impl EnvConfig {
    /// Create a new config from environment variables
    pub fn from_env() -> Self {
        Self::default()
    }

    /// Config rooted at explicit directories, ignoring the environment.
    pub fn new(live_dir: impl Into<PathBuf>, tracked_dir: impl Into<PathBuf>) -> Self {
        EnvConfig {
            live_dir: live_dir.into(),
            tracked_dir: tracked_dir.into(),
            workflows_subdir: PathBuf::from(DEFAULT_WORKFLOWS_SUBDIR),
            registry: RegistryConfig::empty(),
        }
    }

    pub fn with_live_dir(mut self, path: impl Into<PathBuf>) -> Self {
        self.live_dir = path.into();
        self
    }

    pub fn with_tracked_dir(mut self, path: impl Into<PathBuf>) -> Self {
        self.tracked_dir = path.into();
        self
    }

    pub fn with_workflows_subdir(mut self, path: impl Into<PathBuf>) -> Self {
        self.workflows_subdir = path.into();
        self
    }

    pub fn with_registry(mut self, registry: RegistryConfig) -> Self {
        self.registry = registry;
        self
    }

    /// Saved workflows in the live application directory
    pub fn live_workflows_dir(&self) -> PathBuf {
        self.live_dir.join(&self.workflows_subdir)
    }

    /// Tracked copies of the workflows
    pub fn tracked_workflows_dir(&self) -> PathBuf {
        self.tracked_dir.join(TRACKED_WORKFLOWS_DIR)
    }

    pub fn tracked_dir(&self) -> &Path {
        &self.tracked_dir
    }
}

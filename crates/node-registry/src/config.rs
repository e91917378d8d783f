//! Registry configuration
//!
//! Values default from `GRAPHENV_*` environment variables; builder methods
//! override them.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// Where mapping tables and model metadata come from.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegistryConfig {
    /// Remote extension-node-map document
    pub mapping_url: Option<String>,
    /// Local extension-node-map document (takes precedence over the URL)
    pub mapping_file: Option<PathBuf>,
    /// Base URL of a remote model registry
    pub model_registry_url: Option<String>,
    /// Local model index document (takes precedence over the registry URL)
    pub model_index: Option<PathBuf>,
    /// Bearer token for remote registries
    pub token: Option<String>,
    /// User agent sent with every request
    pub user_agent: String,
}

impl Default for RegistryConfig {
    fn default() -> Self {
        RegistryConfig {
            mapping_url: std::env::var("GRAPHENV_MAPPING_URL").ok(),
            mapping_file: std::env::var("GRAPHENV_MAPPING_FILE").ok().map(PathBuf::from),
            model_registry_url: std::env::var("GRAPHENV_MODEL_REGISTRY_URL").ok(),
            model_index: std::env::var("GRAPHENV_MODEL_INDEX").ok().map(PathBuf::from),
            token: std::env::var("GRAPHENV_REGISTRY_TOKEN").ok(),
            user_agent: format!("graphenv-node-registry/{}", env!("CARGO_PKG_VERSION")),
        }
    }
}

impl RegistryConfig {
    /// Create a new config from environment variables
    pub fn from_env() -> Self {
        Self::default()
    }

    /// Config with every source unset
    pub fn empty() -> Self {
        RegistryConfig {
            mapping_url: None,
            mapping_file: None,
            model_registry_url: None,
            model_index: None,
            token: None,
            user_agent: format!("graphenv-node-registry/{}", env!("CARGO_PKG_VERSION")),
        }
    }

    pub fn with_mapping_file(mut self, path: impl Into<PathBuf>) -> Self {
        self.mapping_file = Some(path.into());
        self
    }

    pub fn with_mapping_url(mut self, url: &str) -> Self {
        self.mapping_url = Some(url.to_string());
        self
    }

    pub fn with_model_index(mut self, path: impl Into<PathBuf>) -> Self {
        self.model_index = Some(path.into());
        self
    }

    pub fn with_model_registry_url(mut self, url: &str) -> Self {
        self.model_registry_url = Some(url.to_string());
        self
    }

    /// Set authentication token
    pub fn with_token(mut self, token: &str) -> Self {
        self.token = Some(token.to_string());
        self
    }
}

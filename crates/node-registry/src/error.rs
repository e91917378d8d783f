//! Error types for node-registry

use thiserror::Error;

/// Errors that can occur while loading or querying registries
#[derive(Error, Debug)]
pub enum RegistryError {
    /// Mapping table document has an unexpected shape
    #[error("Invalid mapping table: {0}")]
    InvalidMappingTable(String),

    /// Model index document has an unexpected shape
    #[error("Invalid model index: {0}")]
    InvalidModelIndex(String),

    /// No source configured for the requested registry
    #[error("Registry not configured: {0}")]
    NotConfigured(String),

    /// Registry answered with a non-success status
    #[error("Registry request to {url} failed with status {status}")]
    Status { url: String, status: u16 },

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON parsing error
    #[error("JSON parsing error: {0}")]
    Json(#[from] serde_json::Error),

    /// HTTP transport error
    #[error("HTTP error: {0}")]
    Http(String),
}

impl From<reqwest::Error> for RegistryError {
    fn from(err: reqwest::Error) -> Self {
        RegistryError::Http(err.to_string())
    }
}

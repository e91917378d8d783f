//! Node-Registry: custom-node mapping tables and model lookups for graphenv
//!
//! This crate provides the registry layer for graphenv. It loads the global
//! node mapping table (which package provides which node type) and answers
//! model lookups by content hash or filename.
//!
//! ## Layer 1 - Registries
//!
//! Focus: point-in-time snapshots. Nothing here caches or retries; callers
//! hand the results to the resolvers in `graphenv-core`.

pub mod config;
pub mod error;
pub mod hashing;
mod http;
pub mod mapping;
pub mod models;

pub use config::RegistryConfig;
pub use error::RegistryError;
pub use hashing::{hash_model_file, is_model_file, is_model_filename, MODEL_EXTENSIONS};
pub use mapping::{
    mapping_source, FileMappingSource, GlobalMappingTable, HttpMappingSource, MappingTableSource,
    PackageEntry,
};
pub use models::{model_lookup, HttpModelRegistry, ModelCandidate, ModelIndex, ModelLookup};

/// Result type for registry operations
pub type Result<T> = std::result::Result<T, RegistryError>;

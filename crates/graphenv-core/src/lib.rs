//! graphenv Core Library
//!
//! Dependency resolution and environment versioning for node-graph
//! workflows.
//!
//! ## Layer 2 - Engine
//!
//! - `identity`: canonical repository identities
//! - `node_resolver` / `model_resolver`: classify references as resolved,
//!   unresolved or ambiguous
//! - `normalize`: comparison-stable workflow projection
//! - `workflow_manager`: analysis, resolution and live/tracked sync
//! - `rollback`: safe rollback state machine
//! - `environment`: ties the above to one versioned-storage backend

pub mod config;
pub mod domain;
pub mod environment;
pub mod extract;
pub mod identity;
pub mod model_resolver;
pub mod node_resolver;
pub mod normalize;
pub mod obs;
pub mod rollback;
pub mod session;
pub mod telemetry;
pub mod workflow_manager;

pub use config::EnvConfig;

pub use domain::{
    Ambiguous, Dependencies, EnvError, MatchKind, ModelReference, ModelResolution, NodeReference,
    NodeResolution, Provenance, ResolutionEntry, ResolutionResult, Resolved, ResolvedModel,
    ResolvedNode, RestoreSide, Result,
};

pub use environment::{CommitOutcome, Environment, EnvironmentStatus};
pub use extract::extract_dependencies;
pub use identity::normalize;
pub use model_resolver::{resolve_models, ModelResolver};
pub use node_resolver::{resolve_nodes, GlobalNodeResolver};
pub use normalize::{normalize_for_comparison, workflows_differ};
pub use rollback::{RollbackController, RollbackOutcome, RollbackState};
pub use session::SessionContext;
pub use workflow_manager::{
    BatchAnalysis, BatchResolution, WorkflowFailure, WorkflowManager, WorkflowState,
    WorkflowStatus, WorkflowSyncReport,
};

pub use node_registry::{
    GlobalMappingTable, ModelCandidate, ModelIndex, ModelLookup, PackageEntry, RegistryConfig,
};
pub use versioned_store::{VersionId, VersionInfo, VersionedStorage};

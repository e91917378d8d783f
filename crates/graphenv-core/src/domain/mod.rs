//! Domain models for graphenv.
//!
//! Canonical definitions for the core entities:
//! - `NodeReference` / `ModelReference`: dependencies extracted from a workflow
//! - `ResolutionEntry`: outcome of resolving one reference
//! - `ResolutionResult`: aggregate outcome of a resolution pass

pub mod error;
pub mod references;
pub mod resolution;

pub use error::{EnvError, RestoreSide, Result};
pub use references::{Dependencies, ModelReference, NodeReference, Provenance};
pub use resolution::{
    Ambiguous, MatchKind, ModelResolution, NodeResolution, ResolutionEntry, ResolutionResult,
    Resolved, ResolvedModel, ResolvedNode,
};

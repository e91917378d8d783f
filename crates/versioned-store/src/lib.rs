//! Versioned-Store: storage backends for graphenv tracked directories
//!
//! This crate provides the persistence layer for graphenv environments.
//! The engine asks it whether the tracked directory is clean, records
//! commits and restores prior versions; it never interprets version ids.
//!
//! ## Layer 0 - Data/Persistence
//!
//! Focus: never mutate the tracked tree except through `commit`/`checkout`.
//!
//! ## Key Components
//!
//! - `VersionedStorage`: the capability trait the engine consumes
//! - `GitStorage`: production backend shelling out to `git`
//! - `MemoryVersionedStorage`: directory-backed fake with in-memory history

mod error;
pub mod fakes;
pub mod git;
pub mod storage_traits;

pub use error::StorageError;
pub use git::{is_git_repo, GitStorage};
pub use storage_traits::{StorageResult, VersionId, VersionInfo, VersionedStorage};

//! Error types for versioned-store

use thiserror::Error;

/// Errors that can occur in a versioned-storage backend
#[derive(Error, Debug)]
pub enum StorageError {
    /// The tracked tree matches head; there is nothing to record
    #[error("nothing to commit: tracked directory matches head")]
    NothingToCommit,

    /// A version reference did not resolve to a known version
    #[error("unknown version: {reference}")]
    UnknownVersion { reference: String },

    /// A short version prefix matched more than one version
    #[error("ambiguous version reference {reference}: matches {matches:?}")]
    AmbiguousVersion {
        reference: String,
        matches: Vec<String>,
    },

    /// Directory is not managed by this backend
    #[error("not a versioned directory: {path}")]
    NotRepository { path: String },

    /// Backend command exited unsuccessfully
    #[error("command `{command}` failed: {stderr}")]
    Command { command: String, stderr: String },

    /// Backend state could not be read or interpreted
    #[error("storage backend error: {0}")]
    Backend(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unknown_version_displays_reference() {
        let err = StorageError::UnknownVersion {
            reference: "v9".to_string(),
        };
        assert!(err.to_string().contains("v9"));
    }

    #[test]
    fn test_command_error_displays_stderr() {
        let err = StorageError::Command {
            command: "git status".to_string(),
            stderr: "fatal: not a git repository".to_string(),
        };
        let msg = err.to_string();
        assert!(msg.contains("git status"));
        assert!(msg.contains("not a git repository"));
    }
}

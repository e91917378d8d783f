//! Domain-level error taxonomy for graphenv.

use std::fmt;

use versioned_store::StorageError;

/// Which half of a rollback restore failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RestoreSide {
    /// Rewriting the tracked directory to the target version
    RepositoryCheckout,
    /// Copying tracked workflows back into the live application directory
    LiveDirectorySync,
}

impl fmt::Display for RestoreSide {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RestoreSide::RepositoryCheckout => write!(f, "repository checkout"),
            RestoreSide::LiveDirectorySync => write!(f, "live directory sync"),
        }
    }
}

/// graphenv domain errors.
#[derive(Debug, thiserror::Error)]
pub enum EnvError {
    #[error("workflow {workflow} could not be parsed: {reason}")]
    Parse { workflow: String, reason: String },

    #[error("workflow not found: {0}")]
    WorkflowNotFound(String),

    #[error("lookup for {reference} failed: {source}")]
    ResolutionLookup {
        reference: String,
        #[source]
        source: node_registry::RegistryError,
    },

    #[error("uncommitted changes would be discarded ({}); commit them or pass --force", describe_dirty(.tracked_dirty, .workflows))]
    UncommittedChanges {
        tracked_dirty: bool,
        workflows: Vec<String>,
    },

    #[error("restore failed during {side}: {source}")]
    RestoreIo {
        side: RestoreSide,
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    #[error("storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("registry error: {0}")]
    Registry(#[from] node_registry::RegistryError),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

fn describe_dirty(tracked_dirty: &bool, workflows: &[String]) -> String {
    match (*tracked_dirty, workflows.is_empty()) {
        (true, true) => "tracked directory modified".to_string(),
        (false, _) => format!("live workflows modified: {}", workflows.join(", ")),
        (true, false) => format!(
            "tracked directory modified; live workflows modified: {}",
            workflows.join(", ")
        ),
    }
}

impl EnvError {
    pub fn parse(workflow: impl Into<String>, reason: impl fmt::Display) -> Self {
        EnvError::Parse {
            workflow: workflow.into(),
            reason: reason.to_string(),
        }
    }

    pub fn restore(
        side: RestoreSide,
        source: impl Into<Box<dyn std::error::Error + Send + Sync>>,
    ) -> Self {
        EnvError::RestoreIo {
            side,
            source: source.into(),
        }
    }
}

/// Result type for graphenv domain operations.
pub type Result<T> = std::result::Result<T, EnvError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_error_names_workflow() {
        let err = EnvError::parse("portrait", "expected an object");
        assert_eq!(
            err.to_string(),
            "workflow portrait could not be parsed: expected an object"
        );
    }

    #[test]
    fn test_uncommitted_changes_lists_workflows() {
        let err = EnvError::UncommittedChanges {
            tracked_dirty: false,
            workflows: vec!["a".to_string(), "b".to_string()],
        };
        let msg = err.to_string();
        assert!(msg.contains("live workflows modified: a, b"));
        assert!(msg.contains("--force"));

        let err = EnvError::UncommittedChanges {
            tracked_dirty: true,
            workflows: vec![],
        };
        assert!(err.to_string().contains("tracked directory modified"));
    }

    #[test]
    fn test_restore_error_names_side() {
        let io = std::io::Error::new(std::io::ErrorKind::PermissionDenied, "read-only");
        let err = EnvError::restore(RestoreSide::LiveDirectorySync, io);
        assert!(err.to_string().contains("live directory sync"));
        assert!(matches!(
            err,
            EnvError::RestoreIo {
                side: RestoreSide::LiveDirectorySync,
                ..
            }
        ));
    }
}

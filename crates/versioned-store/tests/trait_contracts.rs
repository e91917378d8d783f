//! Trait contract tests for VersionedStorage.
//!
//! Every conforming backend must pass these. Each contract runs against the
//! in-memory fake and the git backend.

use std::fs;
use std::path::Path;

use versioned_store::fakes::MemoryVersionedStorage;
use versioned_store::{GitStorage, StorageError, VersionedStorage};

fn memory(dir: &Path) -> Box<dyn VersionedStorage> {
    Box::new(MemoryVersionedStorage::new(dir))
}

fn git(dir: &Path) -> Box<dyn VersionedStorage> {
    Box::new(GitStorage::init(dir).unwrap())
}

type Factory = fn(&Path) -> Box<dyn VersionedStorage>;

const BACKENDS: [(&str, Factory); 2] = [("memory", memory), ("git", git)];

// ===========================================================================
// Cleanliness
// ===========================================================================

#[tokio::test]
async fn clean_after_commit_dirty_after_edit() {
    for (name, make) in BACKENDS {
        let dir = tempfile::tempdir().unwrap();
        let storage = make(dir.path());

        fs::write(dir.path().join("w.json"), "{\"a\":1}").unwrap();
        storage.commit("initial").await.unwrap();
        assert!(storage.is_clean().await.unwrap(), "{name}: clean after commit");

        fs::write(dir.path().join("w.json"), "{\"a\":2}").unwrap();
        assert!(!storage.is_clean().await.unwrap(), "{name}: dirty after edit");
    }
}

#[tokio::test]
async fn is_clean_never_mutates_tree() {
    for (name, make) in BACKENDS {
        let dir = tempfile::tempdir().unwrap();
        let storage = make(dir.path());
        fs::write(dir.path().join("w.json"), "v1").unwrap();
        storage.commit("initial").await.unwrap();
        fs::write(dir.path().join("w.json"), "edited").unwrap();

        let _ = storage.is_clean().await.unwrap();
        assert_eq!(
            fs::read_to_string(dir.path().join("w.json")).unwrap(),
            "edited",
            "{name}"
        );
    }
}

// ===========================================================================
// Commit / checkout
// ===========================================================================

#[tokio::test]
async fn commit_nothing_is_rejected() {
    for (name, make) in BACKENDS {
        let dir = tempfile::tempdir().unwrap();
        let storage = make(dir.path());
        fs::write(dir.path().join("w.json"), "v1").unwrap();
        storage.commit("initial").await.unwrap();

        let err = storage.commit("empty").await.unwrap_err();
        assert!(matches!(err, StorageError::NothingToCommit), "{name}: {err}");
    }
}

#[tokio::test]
async fn checkout_restores_exact_tree() {
    for (name, make) in BACKENDS {
        let dir = tempfile::tempdir().unwrap();
        let storage = make(dir.path());

        fs::write(dir.path().join("w.json"), "v1").unwrap();
        let v1 = storage.commit("v1").await.unwrap();

        fs::write(dir.path().join("w.json"), "v2").unwrap();
        fs::write(dir.path().join("extra.json"), "v2").unwrap();
        storage.commit("v2").await.unwrap();

        storage.checkout(&v1).await.unwrap();
        assert_eq!(
            fs::read_to_string(dir.path().join("w.json")).unwrap(),
            "v1",
            "{name}"
        );
        assert!(!dir.path().join("extra.json").exists(), "{name}");
        // Head does not move; the restored tree differs from it.
        assert!(!storage.is_clean().await.unwrap(), "{name}");
    }
}

#[tokio::test]
async fn checkout_then_commit_appends_history() {
    for (name, make) in BACKENDS {
        let dir = tempfile::tempdir().unwrap();
        let storage = make(dir.path());

        fs::write(dir.path().join("w.json"), "v1").unwrap();
        let v1 = storage.commit("v1").await.unwrap();
        fs::write(dir.path().join("w.json"), "v2").unwrap();
        let v2 = storage.commit("v2").await.unwrap();

        storage.checkout(&v1).await.unwrap();
        let v3 = storage.commit("rollback to v1").await.unwrap();

        let history = storage.log_range(None, &v3).await.unwrap();
        assert_eq!(history, vec![v1, v2, v3], "{name}");
    }
}

#[tokio::test]
async fn resolve_unknown_reference_fails() {
    for (name, make) in BACKENDS {
        let dir = tempfile::tempdir().unwrap();
        let storage = make(dir.path());
        fs::write(dir.path().join("w.json"), "v1").unwrap();
        storage.commit("v1").await.unwrap();

        let err = storage.resolve("ffffffffffff").await.unwrap_err();
        assert!(
            matches!(err, StorageError::UnknownVersion { .. }),
            "{name}: {err}"
        );
    }
}

#[tokio::test]
async fn describe_returns_message() {
    for (name, make) in BACKENDS {
        let dir = tempfile::tempdir().unwrap();
        let storage = make(dir.path());
        fs::write(dir.path().join("w.json"), "v1").unwrap();
        let v1 = storage.commit("add workflow").await.unwrap();

        let info = storage.describe(&v1).await.unwrap();
        assert_eq!(info.message, "add workflow", "{name}");
        assert_eq!(info.id, v1, "{name}");
    }
}

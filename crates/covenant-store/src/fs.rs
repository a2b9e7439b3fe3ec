//! Filesystem artifact store.
//!
//! Artifacts live under a root directory at their opaque storage keys
//! (`{user}/{document}/{kind}.docx`). Local writes are read-after-write
//! consistent, which the lifecycle relies on when it fetches a redline it
//! just stored.

use std::path::{Component, Path, PathBuf};

use async_trait::async_trait;
use tokio::fs;
use tracing::debug;

use covenant_core::{ArtifactStore, PortError};

/// Artifact store rooted at a local directory.
pub struct FsArtifactStore {
    root: PathBuf,
}

impl FsArtifactStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Resolve a storage key below the root, rejecting traversal.
    fn resolve(&self, key: &str) -> Result<PathBuf, PortError> {
        let relative = Path::new(key);
        let traversal = relative
            .components()
            .any(|c| !matches!(c, Component::Normal(_)));
        if traversal || key.is_empty() {
            return Err(PortError::fatal(format!("invalid artifact key {key:?}")));
        }
        Ok(self.root.join(relative))
    }
}

fn io_err(what: &str, key: &str, e: std::io::Error) -> PortError {
    if e.kind() == std::io::ErrorKind::NotFound {
        PortError::fatal(format!("{what} {key}: not found"))
    } else {
        // Other local IO failures (busy volume, interrupted call) are
        // worth one more attempt.
        PortError::transient(format!("{what} {key}: {e}"))
    }
}

#[async_trait]
impl ArtifactStore for FsArtifactStore {
    async fn put(&self, path: &str, bytes: &[u8], _content_type: &str) -> Result<(), PortError> {
        let target = self.resolve(path)?;
        if let Some(parent) = target.parent() {
            fs::create_dir_all(parent)
                .await
                .map_err(|e| io_err("create", path, e))?;
        }
        fs::write(&target, bytes)
            .await
            .map_err(|e| io_err("write", path, e))?;
        debug!(key = path, bytes = bytes.len(), "artifact stored");
        Ok(())
    }

    async fn get(&self, path: &str) -> Result<Vec<u8>, PortError> {
        let target = self.resolve(path)?;
        fs::read(&target).await.map_err(|e| io_err("read", path, e))
    }

    async fn delete(&self, path: &str) -> Result<(), PortError> {
        let target = self.resolve(path)?;
        match fs::remove_file(&target).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(io_err("delete", path, e)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn put_then_get_round_trips() {
        let tmp = tempfile::TempDir::new().unwrap();
        let store = FsArtifactStore::new(tmp.path());

        store
            .put("user_1/doc/original.docx", b"original bytes", "application/test")
            .await
            .unwrap();
        let bytes = store.get("user_1/doc/original.docx").await.unwrap();
        assert_eq!(bytes, b"original bytes");
    }

    #[tokio::test]
    async fn put_overwrites_same_key() {
        let tmp = tempfile::TempDir::new().unwrap();
        let store = FsArtifactStore::new(tmp.path());

        store.put("u/d/redline.docx", b"v1", "t").await.unwrap();
        store.put("u/d/redline.docx", b"v2", "t").await.unwrap();
        assert_eq!(store.get("u/d/redline.docx").await.unwrap(), b"v2");
    }

    #[tokio::test]
    async fn missing_key_is_fatal_not_transient() {
        let tmp = tempfile::TempDir::new().unwrap();
        let store = FsArtifactStore::new(tmp.path());
        let err = store.get("u/d/absent.docx").await.unwrap_err();
        assert!(!err.is_transient());
    }

    #[tokio::test]
    async fn delete_is_idempotent() {
        let tmp = tempfile::TempDir::new().unwrap();
        let store = FsArtifactStore::new(tmp.path());
        store.put("u/d/clean.docx", b"x", "t").await.unwrap();
        store.delete("u/d/clean.docx").await.unwrap();
        store.delete("u/d/clean.docx").await.unwrap();
        assert!(store.get("u/d/clean.docx").await.is_err());
    }

    #[tokio::test]
    async fn rejects_traversal_keys() {
        let tmp = tempfile::TempDir::new().unwrap();
        let store = FsArtifactStore::new(tmp.path());
        assert!(store.get("../outside").await.is_err());
        assert!(store.put("/etc/passwd", b"x", "t").await.is_err());
    }
}

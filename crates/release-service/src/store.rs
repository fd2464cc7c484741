//! Abstract file store and its implementations.
//!
//! All build artifacts live under keys in a [`FileStore`]; the store is the
//! sole source of truth for what exists. Keys are `/`-separated paths
//! relative to the store root. [`LocalFileStore`] maps keys onto a local
//! directory tree; [`MemoryFileStore`] keeps objects in memory for tests and
//! demo runs without touching disk.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use dashmap::DashMap;
use thiserror::Error;

/// Error raised by store operations.
#[derive(Error, Debug)]
pub enum StoreError {
    /// The requested key does not exist.
    #[error("object not found: {key}")]
    NotFound {
        /// The key that was requested.
        key: String,
    },
    /// An underlying I/O failure.
    #[error(transparent)]
    Io(#[from] std::io::Error),
    /// A background upload task failed to complete.
    #[error("upload task failed: {0}")]
    Upload(String),
}

/// Asynchronous key-value file store.
#[async_trait]
pub trait FileStore: Send + Sync {
    /// Reads the object at `key`.
    async fn get(&self, key: &str) -> Result<Vec<u8>, StoreError>;

    /// Writes `bytes` to `key`, replacing any existing object.
    async fn put(&self, key: &str, bytes: Vec<u8>) -> Result<(), StoreError>;

    /// Lists all keys under `prefix`, sorted.
    async fn list(&self, prefix: &str) -> Result<Vec<String>, StoreError>;

    /// Deletes the object at `key`. Deleting a missing key is not an error.
    async fn delete(&self, key: &str) -> Result<(), StoreError>;

    /// Copies the object at `from` to `to`.
    async fn copy(&self, from: &str, to: &str) -> Result<(), StoreError>;

    /// Returns true if an object exists at `key`.
    async fn exists(&self, key: &str) -> Result<bool, StoreError>;

    /// Moves the object at `from` to `to`.
    async fn rename(&self, from: &str, to: &str) -> Result<(), StoreError> {
        self.copy(from, to).await?;
        self.delete(from).await
    }
}

/// File store over a local directory tree.
pub struct LocalFileStore {
    root: PathBuf,
}

impl LocalFileStore {
    /// Creates a store rooted at `root`. The directory is created on first
    /// write, not here.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        LocalFileStore { root: root.into() }
    }

    fn path_for(&self, key: &str) -> PathBuf {
        let mut path = self.root.clone();
        for segment in key.split('/').filter(|s| !s.is_empty()) {
            path.push(segment);
        }
        path
    }

    fn key_for(&self, path: &Path) -> String {
        path.strip_prefix(&self.root)
            .unwrap_or(path)
            .components()
            .map(|c| c.as_os_str().to_string_lossy())
            .collect::<Vec<_>>()
            .join("/")
    }
}

#[async_trait]
impl FileStore for LocalFileStore {
    async fn get(&self, key: &str) -> Result<Vec<u8>, StoreError> {
        let path = self.path_for(key);
        match tokio::fs::read(&path).await {
            Ok(bytes) => Ok(bytes),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Err(StoreError::NotFound {
                key: key.to_string(),
            }),
            Err(e) => Err(e.into()),
        }
    }

    async fn put(&self, key: &str, bytes: Vec<u8>) -> Result<(), StoreError> {
        let path = self.path_for(key);
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::write(&path, bytes).await?;
        Ok(())
    }

    async fn list(&self, prefix: &str) -> Result<Vec<String>, StoreError> {
        let start = self.path_for(prefix);
        if !start.exists() {
            return Ok(Vec::new());
        }
        let mut keys = Vec::new();
        let mut pending = vec![start];
        while let Some(dir) = pending.pop() {
            let mut entries = tokio::fs::read_dir(&dir).await?;
            while let Some(entry) = entries.next_entry().await? {
                let path = entry.path();
                if path.is_dir() {
                    pending.push(path);
                } else {
                    keys.push(self.key_for(&path));
                }
            }
        }
        keys.sort();
        Ok(keys)
    }

    async fn delete(&self, key: &str) -> Result<(), StoreError> {
        match tokio::fs::remove_file(self.path_for(key)).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    async fn copy(&self, from: &str, to: &str) -> Result<(), StoreError> {
        let bytes = self.get(from).await?;
        self.put(to, bytes).await
    }

    async fn exists(&self, key: &str) -> Result<bool, StoreError> {
        Ok(self.path_for(key).is_file())
    }
}

/// In-memory file store for tests and demo runs.
#[derive(Default)]
pub struct MemoryFileStore {
    objects: DashMap<String, Arc<Vec<u8>>>,
}

impl MemoryFileStore {
    /// Creates an empty store.
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl FileStore for MemoryFileStore {
    async fn get(&self, key: &str) -> Result<Vec<u8>, StoreError> {
        self.objects
            .get(key)
            .map(|bytes| bytes.as_ref().clone())
            .ok_or_else(|| StoreError::NotFound {
                key: key.to_string(),
            })
    }

    async fn put(&self, key: &str, bytes: Vec<u8>) -> Result<(), StoreError> {
        self.objects.insert(key.to_string(), Arc::new(bytes));
        Ok(())
    }

    async fn list(&self, prefix: &str) -> Result<Vec<String>, StoreError> {
        let mut keys: Vec<String> = self
            .objects
            .iter()
            .map(|entry| entry.key().clone())
            .filter(|key| key.starts_with(prefix))
            .collect();
        keys.sort();
        Ok(keys)
    }

    async fn delete(&self, key: &str) -> Result<(), StoreError> {
        self.objects.remove(key);
        Ok(())
    }

    async fn copy(&self, from: &str, to: &str) -> Result<(), StoreError> {
        let bytes = self
            .objects
            .get(from)
            .map(|b| b.clone())
            .ok_or_else(|| StoreError::NotFound {
                key: from.to_string(),
            })?;
        self.objects.insert(to.to_string(), bytes);
        Ok(())
    }

    async fn exists(&self, key: &str) -> Result<bool, StoreError> {
        Ok(self.objects.contains_key(key))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_local_store_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let store = LocalFileStore::new(dir.path());

        store
            .put("center/product/input/file.txt", b"content".to_vec())
            .await
            .unwrap();
        assert!(store.exists("center/product/input/file.txt").await.unwrap());
        assert_eq!(
            store.get("center/product/input/file.txt").await.unwrap(),
            b"content"
        );

        let keys = store.list("center/product").await.unwrap();
        assert_eq!(keys, vec!["center/product/input/file.txt"]);

        store.delete("center/product/input/file.txt").await.unwrap();
        assert!(!store.exists("center/product/input/file.txt").await.unwrap());
    }

    #[tokio::test]
    async fn test_local_store_missing_key() {
        let dir = tempfile::tempdir().unwrap();
        let store = LocalFileStore::new(dir.path());

        let err = store.get("nope.txt").await.unwrap_err();
        assert!(matches!(err, StoreError::NotFound { .. }));
        assert_eq!(store.list("nope").await.unwrap(), Vec::<String>::new());
        // Deleting a missing key is fine.
        store.delete("nope.txt").await.unwrap();
    }

    #[tokio::test]
    async fn test_memory_store_copy_and_rename() {
        let store = MemoryFileStore::new();
        store.put("a.txt", b"x".to_vec()).await.unwrap();

        store.copy("a.txt", "b.txt").await.unwrap();
        assert!(store.exists("a.txt").await.unwrap());
        assert!(store.exists("b.txt").await.unwrap());

        store.rename("b.txt", "c.txt").await.unwrap();
        assert!(!store.exists("b.txt").await.unwrap());
        assert_eq!(store.get("c.txt").await.unwrap(), b"x");
    }
}

//! Local manga storage
//!
//! Downloaded pages, covers and per-manga `index.json` files are written
//! through the `object_store` crate: a local filesystem root in production,
//! an in-memory store in tests.

use futures_util::TryStreamExt;
use object_store::{ObjectStore, local::LocalFileSystem, path::Path as StoragePath};
use std::path::Path;
use std::sync::Arc;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("Upload failed: {0}")]
    UploadFailed(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Object store error: {0}")]
    ObjectStoreError(#[from] object_store::Error),
}

/// Storage result type
pub type Result<T> = std::result::Result<T, StorageError>;

/// Metadata returned after upload
#[derive(Debug, Clone)]
pub struct UploadMetadata {
    pub key: String,
    pub size: usize,
}

/// Key prefix holding everything stored for one manga
pub fn manga_prefix(manga_id: i64) -> String {
    format!("manga/{}", manga_id)
}

/// Storage client wrapping object_store
#[derive(Clone)]
pub struct StorageClient {
    store: Arc<dyn ObjectStore>,
    root: String,
}

impl StorageClient {
    /// Create a storage client over any object_store backend
    pub fn new(store: Arc<dyn ObjectStore>, root: impl Into<String>) -> Self {
        Self {
            store,
            root: root.into(),
        }
    }

    /// Filesystem storage rooted at `path`; the directory is created if missing
    pub fn local(path: &Path) -> Result<Self> {
        std::fs::create_dir_all(path)?;
        let store = LocalFileSystem::new_with_prefix(path)?;
        Ok(Self::new(Arc::new(store), path.display().to_string()))
    }

    /// Create in-memory storage for testing
    pub fn in_memory() -> Self {
        Self::new(Arc::new(object_store::memory::InMemory::new()), "memory")
    }

    /// Human-readable location of the storage root
    pub fn root(&self) -> &str {
        &self.root
    }

    /// Upload bytes to storage
    pub async fn upload(&self, key: &str, data: Vec<u8>) -> Result<UploadMetadata> {
        let path = StoragePath::parse(key).map_err(|e| StorageError::UploadFailed(e.to_string()))?;
        let size = data.len();

        self.store.put(&path, data.into()).await?;

        tracing::debug!(key, size, "Stored object");

        Ok(UploadMetadata {
            key: key.to_string(),
            size,
        })
    }

    /// Read an object back
    pub async fn download(&self, key: &str) -> Result<Vec<u8>> {
        let path = StoragePath::from(key);

        let result = match self.store.get(&path).await {
            Ok(result) => result,
            Err(object_store::Error::NotFound { .. }) => {
                return Err(StorageError::NotFound(key.to_string()));
            }
            Err(e) => return Err(e.into()),
        };

        Ok(result.bytes().await?.to_vec())
    }

    /// Check if key exists
    pub async fn exists(&self, key: &str) -> Result<bool> {
        let path = StoragePath::from(key);

        match self.store.head(&path).await {
            Ok(_) => Ok(true),
            Err(object_store::Error::NotFound { .. }) => Ok(false),
            Err(e) => Err(e.into()),
        }
    }

    /// Keys under `prefix`, sorted
    pub async fn list(&self, prefix: &str) -> Result<Vec<String>> {
        let prefix = StoragePath::from(prefix);
        let mut keys: Vec<String> = self
            .store
            .list(Some(&prefix))
            .map_ok(|meta| meta.location.to_string())
            .try_collect()
            .await?;
        keys.sort();
        Ok(keys)
    }

    /// Delete the given keys, ignoring ones that are already gone.
    /// Returns how many were removed.
    pub async fn delete_all(&self, keys: &[String]) -> Result<usize> {
        let mut removed = 0;
        for key in keys {
            match self.store.delete(&StoragePath::from(key.as_str())).await {
                Ok(()) => removed += 1,
                Err(object_store::Error::NotFound { .. }) => {}
                Err(e) => return Err(e.into()),
            }
        }
        Ok(removed)
    }
}

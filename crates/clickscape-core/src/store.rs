//! Blob storage for derived artifacts
//!
//! Keys are flat file names, `<uuid-hex><ext>`, served under `/uploads/`.
//! Keys are validated on every call so a stored path can never walk out of
//! the uploads directory.

use async_trait::async_trait;
use clickscape_artifact::FileExt;
use dashmap::DashMap;
use std::fmt::Debug;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::debug;
use uuid::Uuid;

/// Public path prefix of stored blobs
pub const UPLOADS_PREFIX: &str = "/uploads/";

/// Blob store errors
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// Key is empty or could escape the store
    #[error("invalid blob key: {0:?}")]
    InvalidKey(String),

    /// No blob under this key
    #[error("blob not found: {0}")]
    NotFound(String),

    /// Filesystem failure
    #[error("i/o error on {key}: {source}")]
    Io {
        key: String,
        #[source]
        source: std::io::Error,
    },
}

/// Storage backend for artifact bytes
#[async_trait]
pub trait BlobStore: Send + Sync + Debug {
    /// Write `bytes` under `key`, replacing any previous blob
    async fn put(&self, key: &str, bytes: Arc<[u8]>) -> Result<(), StoreError>;

    async fn get(&self, key: &str) -> Result<Arc<[u8]>, StoreError>;

    /// Remove a blob; removing a missing key is not an error
    async fn delete(&self, key: &str) -> Result<(), StoreError>;
}

/// Fresh key for a blob with extension `ext`
#[must_use]
pub fn new_key(ext: &FileExt) -> String {
    format!("{}{}", Uuid::new_v4().simple(), ext)
}

/// Public path of a key
#[must_use]
pub fn public_url(key: &str) -> String {
    format!("{UPLOADS_PREFIX}{key}")
}

/// Reject keys that are empty, hidden, or contain separators or `..`
///
/// # Errors
/// [`StoreError::InvalidKey`]
pub fn validate_key(key: &str) -> Result<(), StoreError> {
    let bad = key.is_empty()
        || key.starts_with('.')
        || key.contains(['/', '\\', '\0'])
        || key.contains("..");
    if bad {
        return Err(StoreError::InvalidKey(key.to_string()));
    }
    Ok(())
}

/// Blobs as files in one directory
#[derive(Debug, Clone)]
pub struct FsBlobStore {
    root: PathBuf,
}

impl FsBlobStore {
    #[must_use]
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Open the store, creating the directory if needed
    ///
    /// # Errors
    /// Returns error if the directory cannot be created
    pub async fn open(root: impl Into<PathBuf>) -> Result<Self, StoreError> {
        let store = Self::new(root);
        tokio::fs::create_dir_all(&store.root)
            .await
            .map_err(|source| StoreError::Io {
                key: store.root.display().to_string(),
                source,
            })?;
        Ok(store)
    }

    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    fn path_of(&self, key: &str) -> Result<PathBuf, StoreError> {
        validate_key(key)?;
        Ok(self.root.join(key))
    }
}

fn io_error(key: &str, source: std::io::Error) -> StoreError {
    if source.kind() == ErrorKind::NotFound {
        StoreError::NotFound(key.to_string())
    } else {
        StoreError::Io {
            key: key.to_string(),
            source,
        }
    }
}

#[async_trait]
impl BlobStore for FsBlobStore {
    async fn put(&self, key: &str, bytes: Arc<[u8]>) -> Result<(), StoreError> {
        let path = self.path_of(key)?;
        // Write beside the target, then rename, so readers never see half a file.
        let tmp = self.root.join(format!(".{key}.partial"));
        tokio::fs::write(&tmp, &bytes[..])
            .await
            .map_err(|e| io_error(key, e))?;
        if let Err(e) = tokio::fs::rename(&tmp, &path).await {
            let _ = tokio::fs::remove_file(&tmp).await;
            return Err(io_error(key, e));
        }
        debug!(key, bytes = bytes.len(), "stored blob");
        Ok(())
    }

    async fn get(&self, key: &str) -> Result<Arc<[u8]>, StoreError> {
        let path = self.path_of(key)?;
        let bytes = tokio::fs::read(&path).await.map_err(|e| io_error(key, e))?;
        Ok(bytes.into())
    }

    async fn delete(&self, key: &str) -> Result<(), StoreError> {
        let path = self.path_of(key)?;
        match tokio::fs::remove_file(&path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(io_error(key, e)),
        }
    }
}

/// Blobs in memory
#[derive(Debug, Default)]
pub struct MemoryBlobStore {
    blobs: DashMap<String, Arc<[u8]>>,
}

impl MemoryBlobStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.blobs.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.blobs.is_empty()
    }

    #[must_use]
    pub fn contains(&self, key: &str) -> bool {
        self.blobs.contains_key(key)
    }
}

#[async_trait]
impl BlobStore for MemoryBlobStore {
    async fn put(&self, key: &str, bytes: Arc<[u8]>) -> Result<(), StoreError> {
        validate_key(key)?;
        self.blobs.insert(key.to_string(), bytes);
        Ok(())
    }

    async fn get(&self, key: &str) -> Result<Arc<[u8]>, StoreError> {
        validate_key(key)?;
        self.blobs
            .get(key)
            .map(|b| Arc::clone(b.value()))
            .ok_or_else(|| StoreError::NotFound(key.to_string()))
    }

    async fn delete(&self, key: &str) -> Result<(), StoreError> {
        validate_key(key)?;
        self.blobs.remove(key);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn keys_are_flat_names() {
        let key = new_key(&FileExt::parse("jpg"));
        assert_eq!(key.len(), 32 + 4);
        assert!(key.ends_with(".jpg"));
        assert!(validate_key(&key).is_ok());
        assert_eq!(public_url("abc.png"), "/uploads/abc.png");

        for bad in ["", "../etc/passwd", "a/b.jpg", "a\\b.jpg", ".hidden", "x..y"] {
            assert!(validate_key(bad).is_err(), "{bad:?} should be rejected");
        }
    }

    #[tokio::test]
    async fn fs_store_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let store = FsBlobStore::open(dir.path().join("uploads")).await.unwrap();

        store.put("a.jpg", Arc::from(&b"jpeg bytes"[..])).await.unwrap();
        assert_eq!(&store.get("a.jpg").await.unwrap()[..], b"jpeg bytes");
        assert!(!dir.path().join("uploads/.a.jpg.partial").exists());

        store.delete("a.jpg").await.unwrap();
        assert!(matches!(store.get("a.jpg").await, Err(StoreError::NotFound(_))));
        store.delete("a.jpg").await.unwrap();
    }

    #[tokio::test]
    async fn fs_store_refuses_escaping_keys() {
        let dir = tempfile::tempdir().unwrap();
        let store = FsBlobStore::open(dir.path()).await.unwrap();
        let result = store.put("../escape.jpg", Arc::from(&b"x"[..])).await;
        assert!(matches!(result, Err(StoreError::InvalidKey(_))));
    }

    #[tokio::test]
    async fn memory_store_round_trip() {
        let store = MemoryBlobStore::new();
        store.put("k.png", Arc::from(&b"png"[..])).await.unwrap();
        assert!(store.contains("k.png"));
        assert_eq!(&store.get("k.png").await.unwrap()[..], b"png");
        store.delete("k.png").await.unwrap();
        assert!(store.is_empty());
    }
}

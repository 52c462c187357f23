/// Key-value blob stores backing the local storage adapter
///
/// A blob store holds opaque text values under string keys, the same contract a
/// browser's local storage offers. [`LocalStore`](super::local::LocalStore) keeps one
/// serialized JSON array per bucket key in a blob store.
///
/// # Implementations
///
/// - [`FileBlobStore`]: one `<key>.json` file per key inside a directory
/// - [`MemoryBlobStore`]: process memory only, lost on exit (tests, demos)

use async_trait::async_trait;
use std::collections::HashMap;
use std::io;
use std::path::{Path, PathBuf};
use tokio::sync::RwLock;
use tracing::debug;

/// Text blobs addressed by key
#[async_trait]
pub trait BlobStore: Send + Sync {
    /// Reads the blob stored under `key`, `None` if it was never written
    async fn read(&self, key: &str) -> io::Result<Option<String>>;

    /// Replaces the blob stored under `key`
    async fn write(&self, key: &str, contents: String) -> io::Result<()>;
}

/// Directory-backed blob store
///
/// Writes go to a temporary sibling file which is then renamed over the target,
/// so a crash mid-write never leaves a truncated bucket behind.
#[derive(Debug, Clone)]
pub struct FileBlobStore {
    dir: PathBuf,
}

impl FileBlobStore {
    /// Creates a store rooted at `dir` (created lazily on first write)
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// Root directory of the store
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn path_for(&self, key: &str) -> io::Result<PathBuf> {
        let valid = !key.is_empty()
            && key
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-');

        if !valid {
            return Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                format!("invalid blob key: {:?}", key),
            ));
        }

        Ok(self.dir.join(format!("{}.json", key)))
    }
}

#[async_trait]
impl BlobStore for FileBlobStore {
    async fn read(&self, key: &str) -> io::Result<Option<String>> {
        let path = self.path_for(key)?;

        match tokio::fs::read_to_string(&path).await {
            Ok(contents) => Ok(Some(contents)),
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                debug!(path = %path.display(), "Blob not found, treating as empty");
                Ok(None)
            }
            Err(e) => Err(e),
        }
    }

    async fn write(&self, key: &str, contents: String) -> io::Result<()> {
        let path = self.path_for(key)?;
        tokio::fs::create_dir_all(&self.dir).await?;

        let tmp = path.with_extension("json.tmp");
        tokio::fs::write(&tmp, contents).await?;
        tokio::fs::rename(&tmp, &path).await?;

        Ok(())
    }
}

/// In-memory blob store
#[derive(Debug, Default)]
pub struct MemoryBlobStore {
    blobs: RwLock<HashMap<String, String>>,
}

impl MemoryBlobStore {
    /// Creates an empty store
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl BlobStore for MemoryBlobStore {
    async fn read(&self, key: &str) -> io::Result<Option<String>> {
        let blobs = self.blobs.read().await;
        Ok(blobs.get(key).cloned())
    }

    async fn write(&self, key: &str, contents: String) -> io::Result<()> {
        let mut blobs = self.blobs.write().await;
        blobs.insert(key.to_string(), contents);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_memory_blob_store() {
        let store = MemoryBlobStore::new();
        assert_eq!(store.read("tasks").await.unwrap(), None);

        store.write("tasks", "[]".to_string()).await.unwrap();
        assert_eq!(store.read("tasks").await.unwrap().as_deref(), Some("[]"));
    }

    #[tokio::test]
    async fn test_file_blob_store_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileBlobStore::new(dir.path().join("data"));

        assert_eq!(store.read("task_app_tasks").await.unwrap(), None);

        store
            .write("task_app_tasks", r#"[{"id":"a"}]"#.to_string())
            .await
            .unwrap();

        let contents = store.read("task_app_tasks").await.unwrap();
        assert_eq!(contents.as_deref(), Some(r#"[{"id":"a"}]"#));
        assert!(dir.path().join("data/task_app_tasks.json").exists());
        assert!(!dir.path().join("data/task_app_tasks.json.tmp").exists());
    }

    #[tokio::test]
    async fn test_file_blob_store_rejects_path_keys() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileBlobStore::new(dir.path());

        let err = store.read("../escape").await.unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::InvalidInput);

        let err = store.write("", String::new()).await.unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::InvalidInput);
    }
}

/// Local storage adapter over a key-value blob store
///
/// Every collection lives in one bucket: a JSON array of records serialized as text.
/// Each mutation reads the whole array, modifies it and writes it back. Within one
/// process the read-modify-write cycles are serialized by a mutex; across processes
/// the last writer wins.
///
/// # Example
///
/// ```no_run
/// use tasktimer_shared::storage::blob::FileBlobStore;
/// use tasktimer_shared::storage::local::{BucketKeys, LocalStore};
///
/// let store = LocalStore::new(FileBlobStore::new("./data"), BucketKeys::default());
/// ```

use super::blob::{BlobStore, MemoryBlobStore};
use super::{
    compare_records, Collection, Filter, Record, Sort, StorageAdapter, StorageError,
    StorageResult,
};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::sync::Mutex;
use tracing::debug;

const BACKEND: &str = "local";

/// Bucket key for each collection
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BucketKeys {
    /// Bucket holding tasks
    pub tasks: String,

    /// Bucket holding subtasks
    pub subtasks: String,

    /// Bucket holding interruptions
    pub interruptions: String,
}

impl Default for BucketKeys {
    fn default() -> Self {
        Self {
            tasks: "task_app_tasks".to_string(),
            subtasks: "task_app_subtasks".to_string(),
            interruptions: "task_app_interruptions".to_string(),
        }
    }
}

impl BucketKeys {
    /// Bucket key of a collection
    pub fn key_for(&self, collection: Collection) -> &str {
        match collection {
            Collection::Tasks => &self.tasks,
            Collection::Subtasks => &self.subtasks,
            Collection::Interruptions => &self.interruptions,
        }
    }
}

/// Blob-backed storage adapter
pub struct LocalStore<B> {
    blobs: B,
    keys: BucketKeys,
    write_lock: Mutex<()>,
}

impl LocalStore<MemoryBlobStore> {
    /// Creates a store that lives in process memory only
    pub fn in_memory() -> Self {
        Self::new(MemoryBlobStore::new(), BucketKeys::default())
    }
}

impl<B: BlobStore> LocalStore<B> {
    /// Creates a store over the given blob store
    pub fn new(blobs: B, keys: BucketKeys) -> Self {
        Self {
            blobs,
            keys,
            write_lock: Mutex::new(()),
        }
    }

    /// Bucket keys in use
    pub fn keys(&self) -> &BucketKeys {
        &self.keys
    }

    async fn load(&self, collection: Collection) -> StorageResult<Vec<Record>> {
        let key = self.keys.key_for(collection);

        let contents = self
            .blobs
            .read(key)
            .await
            .map_err(|e| StorageError::failure(BACKEND, collection, "read", e))?;

        let Some(contents) = contents else {
            return Ok(Vec::new());
        };

        if contents.trim().is_empty() {
            return Ok(Vec::new());
        }

        let values: Vec<Value> = serde_json::from_str(&contents)
            .map_err(|e| StorageError::failure(BACKEND, collection, "parse", e))?;

        values
            .into_iter()
            .map(|value| match value {
                Value::Object(record) => Ok(record),
                other => Err(StorageError::failure(
                    BACKEND,
                    collection,
                    "parse",
                    format!("expected an object, found {}", other),
                )),
            })
            .collect()
    }

    async fn save(&self, collection: Collection, records: Vec<Record>) -> StorageResult<()> {
        let key = self.keys.key_for(collection);
        let count = records.len();

        let contents = serde_json::to_string(&records)
            .map_err(|e| StorageError::failure(BACKEND, collection, "serialize", e))?;

        self.blobs
            .write(key, contents)
            .await
            .map_err(|e| StorageError::failure(BACKEND, collection, "write", e))?;

        debug!(bucket = %key, records = count, "Bucket written");
        Ok(())
    }
}

fn record_id(record: &Record) -> Option<&str> {
    record.get("id").and_then(Value::as_str)
}

#[async_trait]
impl<B: BlobStore> StorageAdapter for LocalStore<B> {
    fn backend_name(&self) -> &'static str {
        BACKEND
    }

    async fn query(
        &self,
        collection: Collection,
        filters: &[Filter],
        sorts: &[Sort],
    ) -> StorageResult<Vec<Record>> {
        let mut records: Vec<Record> = self
            .load(collection)
            .await?
            .into_iter()
            .filter(|record| filters.iter().all(|f| f.matches(record)))
            .collect();

        if !sorts.is_empty() {
            records.sort_by(|a, b| compare_records(a, b, sorts));
        }

        Ok(records)
    }

    async fn get_one(&self, collection: Collection, id: &str) -> StorageResult<Option<Record>> {
        let records = self.load(collection).await?;
        Ok(records.into_iter().find(|r| record_id(r) == Some(id)))
    }

    async fn insert(&self, collection: Collection, record: Record) -> StorageResult<Record> {
        let _guard = self.write_lock.lock().await;

        let id = record_id(&record).ok_or_else(|| {
            StorageError::failure(BACKEND, collection, "insert", "record has no string id")
        })?;

        let mut records = self.load(collection).await?;
        if records.iter().any(|r| record_id(r) == Some(id)) {
            return Err(StorageError::failure(
                BACKEND,
                collection,
                "insert",
                format!("duplicate id {}", id),
            ));
        }

        records.push(record.clone());
        self.save(collection, records).await?;

        Ok(record)
    }

    async fn update(&self, collection: Collection, id: &str, patch: Record) -> StorageResult<Record> {
        let _guard = self.write_lock.lock().await;

        let mut records = self.load(collection).await?;
        let existing = records
            .iter_mut()
            .find(|r| record_id(r) == Some(id))
            .ok_or_else(|| StorageError::not_found(BACKEND, collection, id))?;

        for (field, value) in patch {
            if field != "id" {
                existing.insert(field, value);
            }
        }

        let updated = existing.clone();
        self.save(collection, records).await?;

        Ok(updated)
    }

    async fn remove(&self, collection: Collection, id: &str) -> StorageResult<bool> {
        let _guard = self.write_lock.lock().await;

        let mut records = self.load(collection).await?;
        let before = records.len();
        records.retain(|r| record_id(r) != Some(id));

        if records.len() == before {
            return Ok(false);
        }

        self.save(collection, records).await?;
        Ok(true)
    }

    async fn remove_matching(&self, collection: Collection, filters: &[Filter]) -> StorageResult<usize> {
        let _guard = self.write_lock.lock().await;

        let mut records = self.load(collection).await?;
        let before = records.len();
        records.retain(|r| !filters.iter().all(|f| f.matches(r)));

        let removed = before - records.len();
        if removed > 0 {
            self.save(collection, records).await?;
        }

        Ok(removed)
    }

    async fn health_check(&self) -> bool {
        self.blobs
            .read(self.keys.key_for(Collection::Tasks))
            .await
            .is_ok()
    }
}

/// Storage adapter with injectable failures
///
/// Wraps an in-memory [`LocalStore`] and fails chosen `query` and `update` calls,
/// so repository code can be exercised on its degrade-and-continue paths. Queries
/// scoped to a chosen user can also be held until released.

use super::blob::MemoryBlobStore;
use super::local::LocalStore;
use super::{Collection, Filter, Record, Sort, StorageAdapter, StorageError, StorageResult};
use async_trait::async_trait;
use serde_json::Value;
use std::sync::{Arc, Mutex};
use tokio::sync::Notify;

const BACKEND: &str = "flaky";

#[derive(Default)]
struct Faults {
    queries: Vec<Collection>,
    updates: Vec<(Collection, Option<String>)>,
    stalls: Vec<(String, Arc<Notify>)>,
}

/// In-memory store that fails on demand
pub(crate) struct FlakyStore {
    inner: LocalStore<MemoryBlobStore>,
    faults: Mutex<Faults>,
}

impl FlakyStore {
    pub(crate) fn new() -> Self {
        Self {
            inner: LocalStore::in_memory(),
            faults: Mutex::new(Faults::default()),
        }
    }

    /// Fails every later `query` on `collection`
    pub(crate) fn fail_queries(&self, collection: Collection) {
        self.faults.lock().unwrap().queries.push(collection);
    }

    /// Fails later `update` calls on `collection`, for one id or all of them
    pub(crate) fn fail_updates(&self, collection: Collection, id: Option<&str>) {
        self.faults
            .lock()
            .unwrap()
            .updates
            .push((collection, id.map(str::to_string)));
    }

    /// Holds every later query filtered to `user_id` until the returned handle is notified
    pub(crate) fn stall_queries_for(&self, user_id: &str) -> Arc<Notify> {
        let release = Arc::new(Notify::new());
        self.faults
            .lock()
            .unwrap()
            .stalls
            .push((user_id.to_string(), release.clone()));
        release
    }

    fn injected(collection: Collection, operation: &'static str) -> StorageError {
        StorageError::failure(BACKEND, collection, operation, "injected failure")
    }
}

#[async_trait]
impl StorageAdapter for FlakyStore {
    fn backend_name(&self) -> &'static str {
        BACKEND
    }

    async fn query(
        &self,
        collection: Collection,
        filters: &[Filter],
        sorts: &[Sort],
    ) -> StorageResult<Vec<Record>> {
        let (fails, stall) = {
            let faults = self.faults.lock().unwrap();
            let stall = faults
                .stalls
                .iter()
                .find(|(user_id, _)| {
                    filters
                        .iter()
                        .any(|f| f.field == "user_id" && f.value == Value::String(user_id.clone()))
                })
                .map(|(_, release)| release.clone());
            (faults.queries.contains(&collection), stall)
        };

        if let Some(release) = stall {
            release.notified().await;
        }
        if fails {
            return Err(Self::injected(collection, "query"));
        }
        self.inner.query(collection, filters, sorts).await
    }

    async fn get_one(&self, collection: Collection, id: &str) -> StorageResult<Option<Record>> {
        self.inner.get_one(collection, id).await
    }

    async fn insert(&self, collection: Collection, record: Record) -> StorageResult<Record> {
        self.inner.insert(collection, record).await
    }

    async fn update(&self, collection: Collection, id: &str, patch: Record) -> StorageResult<Record> {
        let fails = {
            let faults = self.faults.lock().unwrap();
            faults
                .updates
                .iter()
                .any(|(c, target)| *c == collection && target.as_deref().map_or(true, |t| t == id))
        };

        if fails {
            return Err(Self::injected(collection, "update"));
        }
        self.inner.update(collection, id, patch).await
    }

    async fn remove(&self, collection: Collection, id: &str) -> StorageResult<bool> {
        self.inner.remove(collection, id).await
    }

    async fn health_check(&self) -> bool {
        true
    }
}

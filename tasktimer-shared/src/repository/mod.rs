/// Repositories over the storage adapter
///
/// Each repository owns validation and invariants for one entity and talks to
/// storage only through [`StorageAdapter`]. Repositories hold an
/// `Arc<dyn StorageAdapter>` and are cheap to clone.
///
/// # Example
///
/// ```no_run
/// use std::sync::Arc;
/// use tasktimer_shared::models::task::CreateTask;
/// use tasktimer_shared::repository::TaskRepository;
/// use tasktimer_shared::storage::local::LocalStore;
///
/// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let tasks = TaskRepository::new(Arc::new(LocalStore::in_memory()));
///
/// let task = tasks.create_task("anonymous", CreateTask::titled("Write report")).await?;
/// tasks.set_current_task(&task.id, "anonymous").await?;
/// # Ok(())
/// # }
/// ```

mod interruptions;
mod subtasks;
mod tasks;

pub use interruptions::InterruptionRepository;
pub use subtasks::SubtaskRepository;
pub use tasks::TaskRepository;

use crate::error::{TrackerError, TrackerResult};
use crate::storage::{Collection, Record, Sort, StorageAdapter, StorageError};
use chrono::{SecondsFormat, Utc};
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;

/// Default ordering for manually ordered lists
pub(crate) fn position_order() -> [Sort; 2] {
    [Sort::asc("position"), Sort::asc("created_at")]
}

/// Rejects blank required text
pub(crate) fn require_text(field: &'static str, value: &str) -> TrackerResult<()> {
    if value.trim().is_empty() {
        return Err(TrackerError::validation(field, "must not be empty"));
    }
    Ok(())
}

/// Serializes an entity or patch into a record
pub(crate) fn encode<T: Serialize>(
    store: &dyn StorageAdapter,
    collection: Collection,
    value: &T,
) -> TrackerResult<Record> {
    match serde_json::to_value(value) {
        Ok(Value::Object(record)) => Ok(record),
        Ok(other) => Err(StorageError::failure(
            store.backend_name(),
            collection,
            "serialize",
            format!("expected an object, found {}", other),
        )
        .into()),
        Err(e) => Err(StorageError::failure(store.backend_name(), collection, "serialize", e).into()),
    }
}

/// Serializes a patch and stamps `updated_at`
pub(crate) fn encode_patch<T: Serialize>(
    store: &dyn StorageAdapter,
    collection: Collection,
    patch: &T,
) -> TrackerResult<Record> {
    let mut record = encode(store, collection, patch)?;
    record.insert("updated_at".to_string(), Value::String(Utc::now().to_rfc3339_opts(SecondsFormat::AutoSi, true)));
    Ok(record)
}

/// Deserializes a stored record
pub(crate) fn decode<T: DeserializeOwned>(
    store: &dyn StorageAdapter,
    collection: Collection,
    record: Record,
) -> TrackerResult<T> {
    serde_json::from_value(Value::Object(record))
        .map_err(|e| StorageError::failure(store.backend_name(), collection, "decode", e).into())
}

/// Deserializes a list of stored records
pub(crate) fn decode_all<T: DeserializeOwned>(
    store: &dyn StorageAdapter,
    collection: Collection,
    records: Vec<Record>,
) -> TrackerResult<Vec<T>> {
    records
        .into_iter()
        .map(|record| decode(store, collection, record))
        .collect()
}

/// Maps a storage not-found onto the entity-level error
pub(crate) fn not_found_as<'a>(entity: &'static str, id: &'a str) -> impl FnOnce(StorageError) -> TrackerError + 'a {
    move |err| {
        if err.is_not_found() {
            TrackerError::not_found(entity, id)
        } else {
            err.into()
        }
    }
}

/// Next position after the largest existing one, 0 for an empty list
pub(crate) fn next_position(records: &[Record]) -> i64 {
    records
        .iter()
        .filter_map(|r| r.get("position").and_then(Value::as_i64))
        .max()
        .map_or(0, |max| max.saturating_add(1))
}

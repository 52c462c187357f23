/// Storage backend adapters
///
/// Repositories never talk to a database or a blob store directly. They go through
/// the [`StorageAdapter`] trait, which exposes the same five record operations over
/// every backend:
///
/// - `query(collection, filters, sorts)`
/// - `get_one(collection, id)`
/// - `insert(collection, record)`
/// - `update(collection, id, patch)`
/// - `remove(collection, id)`
///
/// # Backends
///
/// - [`postgres::PostgresStore`]: remote relational store. Filters and sorts are
///   pushed down as SQL.
/// - [`local::LocalStore`]: key-value JSON blob store. Each collection is one JSON
///   array, rewritten in full on every mutation.
///
/// The backend is chosen once at start-up and injected as `Arc<dyn StorageAdapter>`.
///
/// # Records
///
/// A [`Record`] is a JSON object using the wire field names of the entity
/// (`id`, `user_id`, `created_at`, ...). Both backends store exactly these shapes.
///
/// # Example
///
/// ```no_run
/// use std::sync::Arc;
/// use tasktimer_shared::storage::{Collection, Filter, Sort, StorageAdapter};
/// use tasktimer_shared::storage::blob::MemoryBlobStore;
/// use tasktimer_shared::storage::local::LocalStore;
///
/// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let store: Arc<dyn StorageAdapter> = Arc::new(LocalStore::in_memory());
///
/// let rows = store
///     .query(
///         Collection::Tasks,
///         &[Filter::eq("user_id", "anonymous")],
///         &[Sort::asc("position"), Sort::asc("created_at")],
///     )
///     .await?;
/// println!("{} tasks", rows.len());
/// # Ok(())
/// # }
/// ```

pub mod blob;
pub mod local;
pub mod postgres;

#[cfg(test)]
pub(crate) mod testing;

use async_trait::async_trait;
use chrono::{DateTime, FixedOffset};
use serde::Serialize;
use serde_json::{Map, Value};
use std::cmp::Ordering;
use std::fmt;

/// A stored entity as a JSON object
pub type Record = Map<String, Value>;

/// Storage result type alias
pub type StorageResult<T> = Result<T, StorageError>;

/// Named collection of records
///
/// Each collection maps to one table on the remote backend and one bucket on the
/// local backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Collection {
    /// Main task list
    Tasks,

    /// Subtasks owned by a task
    Subtasks,

    /// Interruption scratch-list
    Interruptions,
}

const TASK_COLUMNS: &[(&str, &str)] = &[
    ("id", "text"),
    ("title", "text"),
    ("notes", "text"),
    ("elapsed_time", "bigint"),
    ("status", "text"),
    ("is_current", "boolean"),
    ("position", "bigint"),
    ("created_at", "timestamptz"),
    ("updated_at", "timestamptz"),
    ("user_id", "text"),
];

const SUBTASK_COLUMNS: &[(&str, &str)] = &[
    ("id", "text"),
    ("task_id", "text"),
    ("text", "text"),
    ("notes", "text"),
    ("position", "bigint"),
    ("completed", "boolean"),
    ("created_at", "timestamptz"),
    ("updated_at", "timestamptz"),
];

const INTERRUPTION_COLUMNS: &[(&str, &str)] = &[
    ("id", "text"),
    ("title", "text"),
    ("notes", "text"),
    ("added_to_main", "boolean"),
    ("created_at", "timestamptz"),
    ("updated_at", "timestamptz"),
    ("user_id", "text"),
];

impl Collection {
    /// Table name on the remote backend
    pub fn table_name(&self) -> &'static str {
        match self {
            Collection::Tasks => "tasks",
            Collection::Subtasks => "subtasks",
            Collection::Interruptions => "interruption_tasks",
        }
    }

    /// Known fields with their SQL types
    pub fn columns(&self) -> &'static [(&'static str, &'static str)] {
        match self {
            Collection::Tasks => TASK_COLUMNS,
            Collection::Subtasks => SUBTASK_COLUMNS,
            Collection::Interruptions => INTERRUPTION_COLUMNS,
        }
    }

    /// SQL type of a field, or `None` if the collection has no such field
    pub fn column_type(&self, field: &str) -> Option<&'static str> {
        self.columns()
            .iter()
            .find(|(name, _)| *name == field)
            .map(|(_, ty)| *ty)
    }
}

impl fmt::Display for Collection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.table_name())
    }
}

/// Equality filter on one field
///
/// A `null` value matches records where the field is null or absent.
#[derive(Debug, Clone, PartialEq)]
pub struct Filter {
    /// Field name
    pub field: String,

    /// Value the field must equal
    pub value: Value,
}

impl Filter {
    /// Creates an equality filter
    pub fn eq(field: impl Into<String>, value: impl Into<Value>) -> Self {
        Self {
            field: field.into(),
            value: value.into(),
        }
    }

    /// Checks whether a record satisfies this filter
    pub fn matches(&self, record: &Record) -> bool {
        match (record.get(&self.field), &self.value) {
            (None, Value::Null) | (Some(Value::Null), Value::Null) => true,
            (Some(actual), expected) => values_equal(actual, expected),
            (None, _) => false,
        }
    }
}

fn values_equal(a: &Value, b: &Value) -> bool {
    match (a, b) {
        (Value::Number(x), Value::Number(y)) => x.as_f64() == y.as_f64(),
        _ => a == b,
    }
}

/// Sort direction
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SortDirection {
    /// Smallest first
    Asc,

    /// Largest first
    Desc,
}

/// Sort key
///
/// Null or absent values always sort last, whatever the direction.
#[derive(Debug, Clone, PartialEq)]
pub struct Sort {
    /// Field name
    pub field: String,

    /// Direction
    pub direction: SortDirection,
}

impl Sort {
    /// Ascending sort on a field
    pub fn asc(field: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            direction: SortDirection::Asc,
        }
    }

    /// Descending sort on a field
    pub fn desc(field: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            direction: SortDirection::Desc,
        }
    }
}

/// Compares two records by a list of sort keys
///
/// Used by backends that sort in process. Keys are applied in order; equal records
/// keep their relative order when used with a stable sort.
pub fn compare_records(a: &Record, b: &Record, sorts: &[Sort]) -> Ordering {
    for sort in sorts {
        let left = a.get(&sort.field).filter(|v| !v.is_null());
        let right = b.get(&sort.field).filter(|v| !v.is_null());

        let ordering = match (left, right) {
            (None, None) => Ordering::Equal,
            (None, Some(_)) => Ordering::Greater,
            (Some(_), None) => Ordering::Less,
            (Some(x), Some(y)) => {
                let ordering = compare_values(x, y);
                match sort.direction {
                    SortDirection::Asc => ordering,
                    SortDirection::Desc => ordering.reverse(),
                }
            }
        };

        if ordering != Ordering::Equal {
            return ordering;
        }
    }

    Ordering::Equal
}

fn compare_values(a: &Value, b: &Value) -> Ordering {
    match (a, b) {
        (Value::Number(x), Value::Number(y)) => x
            .as_f64()
            .partial_cmp(&y.as_f64())
            .unwrap_or(Ordering::Equal),
        (Value::String(x), Value::String(y)) => {
            // Timestamps must compare chronologically: fractional seconds vary in width.
            match (
                DateTime::<FixedOffset>::parse_from_rfc3339(x),
                DateTime::<FixedOffset>::parse_from_rfc3339(y),
            ) {
                (Ok(x), Ok(y)) => x.cmp(&y),
                _ => x.cmp(y),
            }
        }
        (Value::Bool(x), Value::Bool(y)) => x.cmp(y),
        _ => Ordering::Equal,
    }
}

/// Error type for storage operations
///
/// Every failure carries the backend name and the collection so that callers can
/// surface the message verbatim.
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    /// The record addressed by id does not exist
    #[error("{backend}: no {collection} record with id {id}")]
    NotFound {
        backend: &'static str,
        collection: Collection,
        id: String,
    },

    /// Transport, query or (de)serialization failure
    #[error("{backend} storage failed to {operation} {collection}: {message}")]
    Failure {
        backend: &'static str,
        collection: Collection,
        operation: &'static str,
        message: String,
    },
}

impl StorageError {
    /// Wraps an underlying error with backend context
    pub fn failure(
        backend: &'static str,
        collection: Collection,
        operation: &'static str,
        err: impl fmt::Display,
    ) -> Self {
        StorageError::Failure {
            backend,
            collection,
            operation,
            message: err.to_string(),
        }
    }

    /// Builds a not-found error
    pub fn not_found(backend: &'static str, collection: Collection, id: impl Into<String>) -> Self {
        StorageError::NotFound {
            backend,
            collection,
            id: id.into(),
        }
    }

    /// Checks if this is a not-found error
    pub fn is_not_found(&self) -> bool {
        matches!(self, StorageError::NotFound { .. })
    }
}

/// Uniform record store over interchangeable backends
///
/// Implementations must be safe to share between tasks. No operation is atomic
/// across more than one record.
#[async_trait]
pub trait StorageAdapter: Send + Sync {
    /// Short backend name used in logs and errors (e.g. "postgres", "local")
    fn backend_name(&self) -> &'static str;

    /// Returns all records matching every filter, ordered by `sorts`
    async fn query(
        &self,
        collection: Collection,
        filters: &[Filter],
        sorts: &[Sort],
    ) -> StorageResult<Vec<Record>>;

    /// Fetches a single record by id
    async fn get_one(&self, collection: Collection, id: &str) -> StorageResult<Option<Record>>;

    /// Stores a new record and returns it as persisted
    async fn insert(&self, collection: Collection, record: Record) -> StorageResult<Record>;

    /// Merges `patch` into the record with the given id
    ///
    /// # Errors
    ///
    /// Returns `StorageError::NotFound` if no record has that id.
    async fn update(&self, collection: Collection, id: &str, patch: Record) -> StorageResult<Record>;

    /// Deletes a record, returning whether anything was removed
    async fn remove(&self, collection: Collection, id: &str) -> StorageResult<bool>;

    /// Deletes every record matching all filters, returning the count removed
    async fn remove_matching(&self, collection: Collection, filters: &[Filter]) -> StorageResult<usize> {
        let records = self.query(collection, filters, &[]).await?;
        let mut removed = 0;

        for record in records {
            if let Some(id) = record.get("id").and_then(Value::as_str) {
                if self.remove(collection, id).await? {
                    removed += 1;
                }
            }
        }

        Ok(removed)
    }

    /// Checks if the backend is reachable
    async fn health_check(&self) -> bool;
}

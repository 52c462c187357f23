/// Entity types shared by both storage backends
///
/// Field names are the wire and storage contract: a record written by the local
/// backend and a row returned by PostgreSQL serialize to the same JSON object.
///
/// # Models
///
/// - `task`: main task list entries with timer and ordering state
/// - `subtask`: checklist items owned by a task
/// - `interruption`: scratch-list entries that can be promoted into tasks
///
/// # Example
///
/// ```
/// use tasktimer_shared::models::task::{Task, TaskStatus};
///
/// let task: Task = serde_json::from_str(r#"{
///     "id": "0b8e9f9c-6f8e-4a53-9a5c-2d3f4b1c7a10",
///     "title": "Write report",
///     "created_at": "2025-01-01T09:00:00Z",
///     "updated_at": "2025-01-01T09:00:00Z",
///     "user_id": "anonymous"
/// }"#).unwrap();
///
/// assert_eq!(task.status, TaskStatus::Active);
/// assert_eq!(task.elapsed_time, 0);
/// ```

pub mod interruption;
pub mod subtask;
pub mod task;

use serde::{Deserialize, Deserializer};

/// Deserializes a field that distinguishes "absent" from "explicitly null"
///
/// Use with `#[serde(default)]`: absent → `None`, `null` → `Some(None)`.
pub(crate) fn double_option<'de, T, D>(deserializer: D) -> Result<Option<Option<T>>, D::Error>
where
    T: Deserialize<'de>,
    D: Deserializer<'de>,
{
    Option::<T>::deserialize(deserializer).map(Some)
}

/// Trims free text, mapping blank input to `None`
pub(crate) fn normalize_notes(notes: Option<String>) -> Option<String> {
    notes
        .map(|n| n.trim().to_string())
        .filter(|n| !n.is_empty())
}

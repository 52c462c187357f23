/// Task model
///
/// A task is an entry of a user's main list. It carries the accumulated timer value
/// (`elapsed_time`, whole seconds), a manual ordering `position` and the
/// `is_current` flag marking the task that receives timer updates.
///
/// # Schema
///
/// ```sql
/// CREATE TABLE tasks (
///     id TEXT PRIMARY KEY,
///     title TEXT NOT NULL,
///     notes TEXT,
///     elapsed_time BIGINT NOT NULL DEFAULT 0,
///     status TEXT NOT NULL DEFAULT 'active',
///     is_current BOOLEAN NOT NULL DEFAULT FALSE,
///     position BIGINT,
///     created_at TIMESTAMPTZ NOT NULL,
///     updated_at TIMESTAMPTZ NOT NULL,
///     user_id TEXT NOT NULL
/// );
/// ```
///
/// # Invariants
///
/// - At most one task per `user_id` has `is_current = true`
/// - `elapsed_time` is never negative
/// - Deleting a task deletes its subtasks

use super::subtask::Subtask;
use super::{double_option, normalize_notes};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Task lifecycle status
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskStatus {
    /// Still being worked on
    #[default]
    Active,

    /// Done
    Completed,
}

impl TaskStatus {
    /// Converts status to its stored string
    pub fn as_str(&self) -> &'static str {
        match self {
            TaskStatus::Active => "active",
            TaskStatus::Completed => "completed",
        }
    }
}

impl fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TaskStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "active" => Ok(TaskStatus::Active),
            "completed" => Ok(TaskStatus::Completed),
            other => Err(format!("unknown task status: {}", other)),
        }
    }
}

/// Main list task
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Task {
    /// Unique task ID (UUID v4 text)
    pub id: String,

    /// Non-empty title
    pub title: String,

    /// Free-form notes
    #[serde(default)]
    pub notes: Option<String>,

    /// Accumulated timer value in whole seconds
    #[serde(default)]
    pub elapsed_time: i64,

    /// Lifecycle status
    #[serde(default)]
    pub status: TaskStatus,

    /// Whether this is the user's current task
    #[serde(default)]
    pub is_current: bool,

    /// Manual ordering key (absent sorts last)
    #[serde(default)]
    pub position: Option<i64>,

    /// When the task was created
    pub created_at: DateTime<Utc>,

    /// When the task was last updated
    pub updated_at: DateTime<Utc>,

    /// Owner
    pub user_id: String,
}

impl Task {
    /// Builds a fresh task for `user_id` at `position`
    pub fn new(user_id: &str, data: CreateTask, position: i64) -> Self {
        let now = Utc::now();

        Self {
            id: uuid::Uuid::new_v4().to_string(),
            title: data.title.trim().to_string(),
            notes: normalize_notes(data.notes),
            elapsed_time: 0,
            status: TaskStatus::Active,
            is_current: false,
            position: Some(position),
            created_at: now,
            updated_at: now,
            user_id: user_id.to_string(),
        }
    }

    /// Checks if the task is completed
    pub fn is_completed(&self) -> bool {
        self.status == TaskStatus::Completed
    }
}

/// Input for creating a new task
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CreateTask {
    /// Title (required, trimmed)
    pub title: String,

    /// Optional notes (blank becomes `None`)
    #[serde(default)]
    pub notes: Option<String>,
}

impl CreateTask {
    /// Creates input with a title and no notes
    pub fn titled(title: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            notes: None,
        }
    }
}

/// Input for updating a task
///
/// All fields are optional. Only `Some` fields are written. Identity and ownership
/// fields (`id`, `user_id`, `created_at`) are not part of the patch, so payloads
/// carrying them have those keys dropped on deserialization.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct UpdateTask {
    /// New title
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,

    /// New notes (use Some(None) to clear)
    #[serde(
        default,
        deserialize_with = "double_option",
        skip_serializing_if = "Option::is_none"
    )]
    pub notes: Option<Option<String>>,

    /// New elapsed time in seconds
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub elapsed_time: Option<i64>,

    /// New status
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<TaskStatus>,

    /// Set or clear the current flag
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub is_current: Option<bool>,

    /// New position (use Some(None) to clear)
    #[serde(
        default,
        deserialize_with = "double_option",
        skip_serializing_if = "Option::is_none"
    )]
    pub position: Option<Option<i64>>,
}

impl UpdateTask {
    /// Checks if the patch changes nothing
    pub fn is_empty(&self) -> bool {
        *self == UpdateTask::default()
    }
}

/// Task together with its subtasks
///
/// Serializes as the task's own fields plus a `subtasks` array.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskWithSubtasks {
    /// The task
    #[serde(flatten)]
    pub task: Task,

    /// Its subtasks in position order
    #[serde(default)]
    pub subtasks: Vec<Subtask>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_task_status_serialization() {
        assert_eq!(serde_json::to_value(TaskStatus::Completed).unwrap(), json!("completed"));
        assert_eq!("active".parse::<TaskStatus>().unwrap(), TaskStatus::Active);
        assert!("done".parse::<TaskStatus>().is_err());
    }

    #[test]
    fn test_new_task_defaults() {
        let task = Task::new(
            "u1",
            CreateTask {
                title: "  Write report ".to_string(),
                notes: Some(String::new()),
            },
            3,
        );

        assert_eq!(task.title, "Write report");
        assert_eq!(task.notes, None);
        assert_eq!(task.elapsed_time, 0);
        assert_eq!(task.status, TaskStatus::Active);
        assert!(!task.is_current);
        assert_eq!(task.position, Some(3));
        assert_eq!(task.created_at, task.updated_at);
        assert!(uuid::Uuid::parse_str(&task.id).is_ok());
    }

    #[test]
    fn test_update_task_distinguishes_null_from_absent() {
        let patch: UpdateTask = serde_json::from_value(json!({"notes": null})).unwrap();
        assert_eq!(patch.notes, Some(None));
        assert_eq!(patch.position, None);

        let patch: UpdateTask = serde_json::from_value(json!({"position": 4})).unwrap();
        assert_eq!(patch.position, Some(Some(4)));
        assert_eq!(patch.notes, None);
    }

    #[test]
    fn test_update_task_drops_identity_fields() {
        let patch: UpdateTask = serde_json::from_value(json!({
            "id": "other",
            "user_id": "mallory",
            "created_at": "2020-01-01T00:00:00Z",
            "title": "Renamed"
        }))
        .unwrap();

        let value = serde_json::to_value(&patch).unwrap();
        assert_eq!(value, json!({"title": "Renamed"}));
    }

    #[test]
    fn test_task_with_subtasks_is_flat() {
        let task = Task::new("u1", CreateTask::titled("A"), 0);
        let value = serde_json::to_value(TaskWithSubtasks {
            task: task.clone(),
            subtasks: vec![],
        })
        .unwrap();

        assert_eq!(value["id"], json!(task.id));
        assert_eq!(value["title"], json!("A"));
        assert_eq!(value["subtasks"], json!([]));
    }
}

/// Subtask model
///
/// Subtasks are ordered checklist items of a task. They have no owner field of
/// their own: access is granted through the parent task.
///
/// # Schema
///
/// ```sql
/// CREATE TABLE subtasks (
///     id TEXT PRIMARY KEY,
///     task_id TEXT NOT NULL REFERENCES tasks (id) ON DELETE CASCADE,
///     text TEXT NOT NULL,
///     notes TEXT,
///     position BIGINT,
///     completed BOOLEAN NOT NULL DEFAULT FALSE,
///     created_at TIMESTAMPTZ NOT NULL,
///     updated_at TIMESTAMPTZ NOT NULL
/// );
/// ```

use super::{double_option, normalize_notes};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Checklist item of a task
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Subtask {
    /// Unique subtask ID
    pub id: String,

    /// Parent task
    pub task_id: String,

    /// Non-empty text
    pub text: String,

    /// Free-form notes
    #[serde(default)]
    pub notes: Option<String>,

    /// Zero-based position among siblings; rows without one sort last
    #[serde(default)]
    pub position: Option<i64>,

    /// Whether the item is checked off
    #[serde(default)]
    pub completed: bool,

    /// When the subtask was created
    pub created_at: DateTime<Utc>,

    /// When the subtask was last updated
    pub updated_at: DateTime<Utc>,
}

impl Subtask {
    /// Builds a fresh, unchecked subtask of `task_id` at `position`
    pub fn new(task_id: &str, data: CreateSubtask, position: i64) -> Self {
        let now = Utc::now();

        Self {
            id: uuid::Uuid::new_v4().to_string(),
            task_id: task_id.to_string(),
            text: data.text.trim().to_string(),
            notes: normalize_notes(data.notes),
            position: Some(position),
            completed: false,
            created_at: now,
            updated_at: now,
        }
    }
}

/// Input for creating a subtask
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CreateSubtask {
    /// Text (required, trimmed)
    pub text: String,

    /// Optional notes
    #[serde(default)]
    pub notes: Option<String>,
}

impl CreateSubtask {
    /// Creates input with text and no notes
    pub fn with_text(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            notes: None,
        }
    }
}

/// Input for updating a subtask
///
/// `id`, `task_id` and `created_at` cannot be changed and are dropped from payloads.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct UpdateSubtask {
    /// New text
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,

    /// New notes (use Some(None) to clear)
    #[serde(
        default,
        deserialize_with = "double_option",
        skip_serializing_if = "Option::is_none"
    )]
    pub notes: Option<Option<String>>,

    /// New position
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub position: Option<i64>,

    /// Check or uncheck
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completed: Option<bool>,
}

/// Direction of a single-step move
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MoveDirection {
    /// Towards position 0
    Up,

    /// Towards the end of the list
    Down,
}

impl MoveDirection {
    /// Target index for a move from `index`, `None` if it would leave `0..len`
    pub fn target(&self, index: usize, len: usize) -> Option<usize> {
        match self {
            MoveDirection::Up => index.checked_sub(1),
            MoveDirection::Down => Some(index + 1).filter(|&t| t < len),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_move_direction_target() {
        assert_eq!(MoveDirection::Up.target(0, 3), None);
        assert_eq!(MoveDirection::Up.target(2, 3), Some(1));
        assert_eq!(MoveDirection::Down.target(2, 3), None);
        assert_eq!(MoveDirection::Down.target(0, 3), Some(1));
    }

    #[test]
    fn test_update_subtask_drops_parent_change() {
        let patch: UpdateSubtask =
            serde_json::from_value(json!({"task_id": "elsewhere", "completed": true})).unwrap();

        assert_eq!(serde_json::to_value(&patch).unwrap(), json!({"completed": true}));
    }

    #[test]
    fn test_new_subtask() {
        let subtask = Subtask::new("t1", CreateSubtask::with_text(" step "), 2);
        assert_eq!(subtask.task_id, "t1");
        assert_eq!(subtask.text, "step");
        assert_eq!(subtask.position, Some(2));
        assert!(!subtask.completed);
    }

    #[test]
    fn test_position_may_be_null_or_absent() {
        let base = json!({
            "id": "s1",
            "task_id": "t1",
            "text": "a",
            "created_at": "2025-01-01T00:00:00Z",
            "updated_at": "2025-01-01T00:00:00Z"
        });

        let absent: Subtask = serde_json::from_value(base.clone()).unwrap();
        assert_eq!(absent.position, None);

        let mut with_null = base;
        with_null["position"] = json!(null);
        let null: Subtask = serde_json::from_value(with_null).unwrap();
        assert_eq!(null.position, None);
    }
}

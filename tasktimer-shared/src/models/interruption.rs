/// Interruption model
///
/// Interruptions are quick notes captured while working on something else. They
/// can later be promoted into a main task; `added_to_main` latches once that
/// happened and is never reset.

use super::{double_option, normalize_notes};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Interruption scratch-list entry
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Interruption {
    /// Unique interruption ID
    pub id: String,

    /// Non-empty title
    pub title: String,

    /// Free-form notes
    #[serde(default)]
    pub notes: Option<String>,

    /// Whether it has been promoted to a main task
    #[serde(default)]
    pub added_to_main: bool,

    /// When the interruption was created
    pub created_at: DateTime<Utc>,

    /// When the interruption was last updated
    pub updated_at: DateTime<Utc>,

    /// Owner
    pub user_id: String,
}

impl Interruption {
    /// Builds a fresh, unpromoted interruption
    pub fn new(user_id: &str, data: CreateInterruption) -> Self {
        let now = Utc::now();

        Self {
            id: uuid::Uuid::new_v4().to_string(),
            title: data.title.trim().to_string(),
            notes: normalize_notes(data.notes),
            added_to_main: false,
            created_at: now,
            updated_at: now,
            user_id: user_id.to_string(),
        }
    }
}

/// Input for creating an interruption
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CreateInterruption {
    /// Title (required, trimmed)
    pub title: String,

    /// Optional notes
    #[serde(default)]
    pub notes: Option<String>,
}

/// Input for updating an interruption
///
/// `added_to_main` is not patchable.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct UpdateInterruption {
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
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_added_to_main_is_not_patchable() {
        let patch: UpdateInterruption =
            serde_json::from_value(json!({"added_to_main": false, "title": "x"})).unwrap();
        assert_eq!(serde_json::to_value(&patch).unwrap(), json!({"title": "x"}));
    }

    #[test]
    fn test_new_interruption() {
        let item = Interruption::new(
            "u1",
            CreateInterruption {
                title: "Call back".to_string(),
                notes: Some("re: invoice".to_string()),
            },
        );
        assert!(!item.added_to_main);
        assert_eq!(item.notes.as_deref(), Some("re: invoice"));
        assert_eq!(item.user_id, "u1");
    }
}

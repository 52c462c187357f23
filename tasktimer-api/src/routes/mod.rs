/// API route handlers
///
/// This module contains all route handlers organized by resource:
///
/// - `health`: Health check endpoint
/// - `auth`: Sign-up and sign-in
/// - `tasks`: Tasks, current task, export and ordering
/// - `subtasks`: Subtasks of a task
/// - `interruptions`: Interruptions and promotion to tasks
/// - `timer`: Timer session of the caller

pub mod auth;
pub mod health;
pub mod interruptions;
pub mod subtasks;
pub mod tasks;
pub mod timer;

use serde::{Deserialize, Serialize};
use validator::Validate;

/// New order of sibling entities
#[derive(Debug, Deserialize, Validate)]
pub struct ReorderRequest {
    /// IDs in their new order
    #[validate(length(min = 1, message = "At least one ID is required"))]
    pub ids: Vec<String>,
}

/// Outcome of a reorder
#[derive(Debug, Serialize, Deserialize)]
pub struct ReorderResponse {
    pub reordered: bool,
}

/// Outcome of a delete
#[derive(Debug, Serialize, Deserialize)]
pub struct DeleteResponse {
    pub deleted: bool,
}

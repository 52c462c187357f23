/// Error types for tracker operations
///
/// Repository operations fail in exactly three ways: bad input, a missing (or not
/// owned) entity, or a backend failure. Outcomes that are not errors, such as moving
/// the first subtask up or promoting an interruption twice, are reported through
/// `false` / `None` return values instead.

use crate::storage::StorageError;

/// Tracker operation error
#[derive(Debug, thiserror::Error)]
pub enum TrackerError {
    /// Missing or empty required field
    #[error("{field}: {message}")]
    Validation {
        field: &'static str,
        message: String,
    },

    /// Referenced entity absent or not owned by the caller
    #[error("{entity} not found: {id}")]
    NotFound { entity: &'static str, id: String },

    /// Backend transport or parse failure
    #[error(transparent)]
    Storage(#[from] StorageError),
}

impl TrackerError {
    /// Builds a validation error
    pub fn validation(field: &'static str, message: impl Into<String>) -> Self {
        TrackerError::Validation {
            field,
            message: message.into(),
        }
    }

    /// Builds a not-found error
    pub fn not_found(entity: &'static str, id: impl Into<String>) -> Self {
        TrackerError::NotFound {
            entity,
            id: id.into(),
        }
    }

    /// Checks if this is a not-found error
    pub fn is_not_found(&self) -> bool {
        matches!(self, TrackerError::NotFound { .. })
    }

    /// Checks if this is a validation error
    pub fn is_validation(&self) -> bool {
        matches!(self, TrackerError::Validation { .. })
    }
}

/// Result type for tracker operations
pub type TrackerResult<T> = Result<T, TrackerError>;

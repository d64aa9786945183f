//! Error types surfaced at the engine boundary
//!
//! Repositories and providers work with `anyhow::Result` internally. The
//! engines translate those into [`CoreError`] so callers can tell a
//! permission problem from a lookup miss or a concurrent-update race.

use crate::access::Role;
use crate::embedding::EmbedError;
use thiserror::Error;

/// Errors returned by the public engine operations
#[derive(Debug, Error)]
pub enum CoreError {
    /// A write-class operation was attempted below the editor role
    #[error("permission denied: {action} requires editor or admin, caller is {role}")]
    PermissionDenied { action: &'static str, role: Role },

    /// Lookup miss on a write path (reads return empty results instead)
    #[error("{entity} not found: {id}")]
    NotFound { entity: &'static str, id: String },

    /// Two reindexes raced on the same document and the retry also lost
    #[error("concurrent update on {file_path}: expected version {expected}, found {actual}")]
    ConsistencyConflict {
        file_path: String,
        expected: i64,
        actual: i64,
    },

    /// Caller supplied something the engine cannot work with
    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// The query embedding could not be produced
    #[error("embedding failed: {0}")]
    Embedding(#[from] EmbedError),

    /// Underlying repository failure
    #[error(transparent)]
    Storage(#[from] anyhow::Error),
}

/// Result alias for engine operations
pub type CoreResult<T> = std::result::Result<T, CoreError>;

impl CoreError {
    /// Whether the caller may reasonably retry the same call
    pub fn is_retryable(&self) -> bool {
        matches!(self, CoreError::ConsistencyConflict { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_messages() {
        let err = CoreError::PermissionDenied {
            action: "sync",
            role: Role::Viewer,
        };
        assert_eq!(
            err.to_string(),
            "permission denied: sync requires editor or admin, caller is viewer"
        );

        let err = CoreError::ConsistencyConflict {
            file_path: "docs/a.md".to_string(),
            expected: 2,
            actual: 3,
        };
        assert!(err.is_retryable());
        assert!(err.to_string().contains("docs/a.md"));
    }
}

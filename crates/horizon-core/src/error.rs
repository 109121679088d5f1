//! Error types shared by every stage of the notification pipeline.
//!
//! Storage failures are wrapped once here so that the consumer, delivery
//! workers and cleaner can decide between retrying and skipping without
//! inspecting driver-specific errors.

use thiserror::Error;

/// Result type alias using `CoreError`.
pub type Result<T> = std::result::Result<T, CoreError>;

/// Core error type for storage and lookup operations.
#[derive(Debug, Clone, Error)]
pub enum CoreError {
    /// Store I/O failed.
    #[error("store error: {0}")]
    Store(String),

    /// Entity not found.
    #[error("not found: {0}")]
    NotFound(String),

    /// Constraint violation.
    #[error("constraint violation: {0}")]
    ConstraintViolation(String),

    /// Invalid input.
    #[error("invalid input: {0}")]
    InvalidInput(String),
}

impl CoreError {
    /// Creates a not-found error for an entity kind and id.
    pub fn not_found(kind: &str, id: impl std::fmt::Display) -> Self {
        Self::NotFound(format!("{kind} {id}"))
    }

    /// Returns whether this error reports a missing entity.
    pub const fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound(_))
    }
}

impl From<sqlx::Error> for CoreError {
    fn from(err: sqlx::Error) -> Self {
        match err {
            sqlx::Error::RowNotFound => Self::NotFound("requested row not found".to_string()),
            sqlx::Error::Database(db_err) if db_err.is_unique_violation() => {
                Self::ConstraintViolation(format!("unique constraint violation: {db_err}"))
            },
            sqlx::Error::Database(db_err) if db_err.is_foreign_key_violation() => {
                Self::ConstraintViolation(format!("foreign key constraint violation: {db_err}"))
            },
            _ => Self::Store(err.to_string()),
        }
    }
}

impl From<serde_json::Error> for CoreError {
    fn from(err: serde_json::Error) -> Self {
        Self::InvalidInput(format!("invalid json: {err}"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn row_not_found_maps_to_not_found() {
        let err = CoreError::from(sqlx::Error::RowNotFound);
        assert!(err.is_not_found());
    }

    #[test]
    fn pool_errors_map_to_store() {
        let err = CoreError::from(sqlx::Error::PoolTimedOut);
        assert!(matches!(err, CoreError::Store(_)));
        assert!(!err.is_not_found());
    }

    #[test]
    fn not_found_message_names_entity() {
        let err = CoreError::not_found("webhook", 42);
        assert_eq!(err.to_string(), "not found: webhook 42");
    }
}

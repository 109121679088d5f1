//! Error types for retention cleanup.

use horizon_core::CoreError;
use thiserror::Error;

/// Result type alias for cleaner operations.
pub type Result<T> = std::result::Result<T, CleanerError>;

/// Errors raised by the retention cleaner.
#[derive(Debug, Clone, Error)]
pub enum CleanerError {
    /// Underlying store operation failed.
    #[error(transparent)]
    Store(#[from] CoreError),

    /// The cron expression could not be parsed.
    #[error("invalid cleaner schedule {expression:?}: {message}")]
    InvalidSchedule {
        /// Offending expression.
        expression: String,
        /// Parser error description.
        message: String,
    },

    /// The timezone name is unknown.
    #[error("invalid cleaner timezone: {name}")]
    InvalidTimezone {
        /// Offending timezone name.
        name: String,
    },
}

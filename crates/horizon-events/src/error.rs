//! Error types for the event store, consumer and leader election.

use horizon_core::CoreError;
use thiserror::Error;

/// Result type alias for event operations.
pub type Result<T> = std::result::Result<T, EventError>;

/// Errors raised by the event subsystem.
#[derive(Debug, Clone, Error)]
pub enum EventError {
    /// Underlying store operation failed.
    #[error(transparent)]
    Store(#[from] CoreError),

    /// A handler with the same name is already registered.
    #[error("event handler already registered: {name}")]
    DuplicateHandler {
        /// Name that collided.
        name: String,
    },

    /// Leader election could not make progress.
    #[error("leader election failed: {message}")]
    Leadership {
        /// Description of the failure.
        message: String,
    },
}

impl EventError {
    /// Creates a duplicate handler error.
    pub fn duplicate_handler(name: impl Into<String>) -> Self {
        Self::DuplicateHandler { name: name.into() }
    }

    /// Creates a leadership error.
    pub fn leadership(message: impl Into<String>) -> Self {
        Self::Leadership { message: message.into() }
    }

    /// Returns whether the error reports a missing entity.
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::Store(err) if err.is_not_found())
    }
}

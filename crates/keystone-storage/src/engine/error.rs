//! Storage error types.

use thiserror::Error;

/// Errors that can occur in backend operations.
#[derive(Debug, Error)]
pub enum StorageError {
    /// The backend could not be opened.
    #[error("failed to open backend: {0}")]
    Open(String),

    /// The named database does not exist.
    #[error("database not found: {0}")]
    DatabaseNotFound(String),

    /// The database name is not acceptable.
    #[error("invalid database name: {0:?}")]
    InvalidDatabaseName(String),

    /// The write-set conflicts with a concurrent commit.
    #[error("commit conflict: {0}")]
    Conflict(String),

    /// The backend cannot serve requests right now.
    #[error("backend unavailable: {0}")]
    Unavailable(String),

    /// An I/O error occurred.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The backend's own transaction machinery failed.
    #[error("transaction error: {0}")]
    Transaction(String),

    /// An unexpected internal failure.
    #[error("internal storage error: {0}")]
    Internal(String),
}

impl StorageError {
    /// Returns `true` for [`StorageError::Conflict`].
    #[must_use]
    pub const fn is_conflict(&self) -> bool {
        matches!(self, Self::Conflict(_))
    }

    /// Returns `true` if the client may reasonably retry the whole transaction.
    ///
    /// Conflicts are retried immediately; unavailability after a backoff.
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        matches!(self, Self::Conflict(_) | Self::Unavailable(_))
    }
}

/// Result type alias for backend operations.
pub type StorageResult<T> = Result<T, StorageError>;

//! Error types for the core crate.

use thiserror::Error;

/// Errors that can occur in the core crate.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum CoreError {
    /// A session identifier did not have the expected shape.
    #[error("invalid session id: {0:?}")]
    InvalidSessionId(String),

    /// A permission name could not be parsed.
    #[error("unknown permission: {0}")]
    UnknownPermission(String),
}

//! Error types for Keystone.
//!
//! This module provides the [`enum@Error`] type returned by every service
//! operation, and [`ErrorKind`], the coarse grouping front-ends map to their
//! own status codes.

use std::fmt;

use keystone_core::{SessionId, TxHandle};
use keystone_storage::StorageError;
use keystone_wire::WireError;
use thiserror::Error;

/// Errors that can occur when serving a client.
#[derive(Debug, Error)]
pub enum Error {
    /// The peer broke the wire framing rules.
    #[error(transparent)]
    Wire(#[from] WireError),

    /// Authentication is switched off, so sessions cannot exist.
    #[error("authentication is disabled")]
    AuthDisabled,

    /// Unknown user or wrong password.
    #[error("invalid user name or password")]
    InvalidCredentials,

    /// Credentials are valid but the account is disabled.
    #[error("user is not active")]
    UserInactive,

    /// The user holds no grant on the requested database.
    #[error("user does not have permission on database {database}")]
    PermissionDenied {
        /// Requested database.
        database: String,
    },

    /// The requested database does not exist.
    #[error("database {database} does not exist")]
    UnknownDatabase {
        /// Requested database.
        database: String,
    },

    /// A freshly generated session id collided with a live session.
    #[error("session {session} is already present")]
    SessionAlreadyPresent {
        /// The colliding identifier.
        session: SessionId,
    },

    /// The call carried no session, or one that is not open.
    #[error("no session found{}", describe_session(.session))]
    NoSessionFound {
        /// The identifier the caller supplied, if any.
        session: Option<SessionId>,
    },

    /// The session already has an open transaction.
    #[error("transaction {handle} is already open in this session")]
    TransactionAlreadyOpen {
        /// Handle of the transaction that is still open.
        handle: TxHandle,
    },

    /// The transaction has already committed or aborted.
    #[error("transaction {handle} is already closed")]
    TransactionAlreadyClosed {
        /// The finished transaction.
        handle: TxHandle,
    },

    /// A write was attempted in a read-only transaction.
    #[error("transaction {handle} is read-only")]
    ReadOnlyViolation {
        /// The read-only transaction.
        handle: TxHandle,
    },

    /// No transaction with this handle is known.
    #[error("no transaction found for {handle}")]
    NoTransactionFound {
        /// The unknown handle.
        handle: TxHandle,
    },

    /// The transaction belongs to a different session.
    #[error("transaction {handle} is not owned by this session")]
    TransactionNotOwned {
        /// The foreign transaction.
        handle: TxHandle,
    },

    /// The backend failed a read or commit.
    #[error("backend error in session {session}{}: {source}", describe_key(.key))]
    Backend {
        /// Session that issued the call.
        session: SessionId,
        /// Key being read, or `None` for a commit.
        key: Option<Vec<u8>>,
        /// The underlying failure.
        #[source]
        source: StorageError,
    },

    /// The caller cancelled the operation.
    #[error("operation cancelled")]
    Cancelled,

    /// The caller's deadline passed.
    #[error("deadline exceeded")]
    DeadlineExceeded,

    /// The identity store failed.
    #[error("identity store error: {0}")]
    IdentityStore(String),

    /// An unexpected internal failure.
    #[error("internal error: {0}")]
    Internal(String),
}

fn describe_session(session: &Option<SessionId>) -> String {
    session.as_ref().map(|s| format!(": {s}")).unwrap_or_default()
}

fn describe_key(key: &Option<Vec<u8>>) -> String {
    key.as_ref().map(|k| format!(" (key {})", String::from_utf8_lossy(k))).unwrap_or_default()
}

/// Coarse classification of an [`enum@Error`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// Malformed traffic; the connection is torn down.
    ProtocolViolation,
    /// Authentication is switched off.
    AuthDisabled,
    /// The client may correct its credentials or database.
    AuthFailure,
    /// Session lifecycle misuse.
    Session,
    /// Transaction lifecycle misuse.
    Transaction,
    /// The backend failed.
    Backend,
    /// Cancelled or timed out by the caller.
    Cancelled,
    /// A bug or a failing collaborator.
    Internal,
}

impl ErrorKind {
    /// Stable name used in error payloads.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::ProtocolViolation => "ProtocolViolation",
            Self::AuthDisabled => "AuthDisabled",
            Self::AuthFailure => "AuthFailure",
            Self::Session => "Session",
            Self::Transaction => "Transaction",
            Self::Backend => "Backend",
            Self::Cancelled => "Cancelled",
            Self::Internal => "Internal",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Error {
    /// The group this error belongs to.
    #[must_use]
    pub const fn kind(&self) -> ErrorKind {
        match self {
            Self::Wire(_) => ErrorKind::ProtocolViolation,
            Self::AuthDisabled => ErrorKind::AuthDisabled,
            Self::InvalidCredentials
            | Self::UserInactive
            | Self::PermissionDenied { .. }
            | Self::UnknownDatabase { .. } => ErrorKind::AuthFailure,
            Self::SessionAlreadyPresent { .. } | Self::NoSessionFound { .. } => ErrorKind::Session,
            Self::TransactionAlreadyOpen { .. }
            | Self::TransactionAlreadyClosed { .. }
            | Self::ReadOnlyViolation { .. }
            | Self::NoTransactionFound { .. }
            | Self::TransactionNotOwned { .. } => ErrorKind::Transaction,
            Self::Backend { .. } => ErrorKind::Backend,
            Self::Cancelled | Self::DeadlineExceeded => ErrorKind::Cancelled,
            Self::IdentityStore(_) | Self::Internal(_) => ErrorKind::Internal,
        }
    }

    /// Name of the variant, used as the error code in front-end payloads.
    #[must_use]
    pub const fn code(&self) -> &'static str {
        match self {
            Self::Wire(_) => "ProtocolViolation",
            Self::AuthDisabled => "AuthDisabled",
            Self::InvalidCredentials => "InvalidCredentials",
            Self::UserInactive => "UserInactive",
            Self::PermissionDenied { .. } => "PermissionDenied",
            Self::UnknownDatabase { .. } => "UnknownDatabase",
            Self::SessionAlreadyPresent { .. } => "SessionAlreadyPresent",
            Self::NoSessionFound { .. } => "NoSessionFound",
            Self::TransactionAlreadyOpen { .. } => "TransactionAlreadyOpen",
            Self::TransactionAlreadyClosed { .. } => "TransactionAlreadyClosed",
            Self::ReadOnlyViolation { .. } => "ReadOnlyViolation",
            Self::NoTransactionFound { .. } => "NoTransactionFound",
            Self::TransactionNotOwned { .. } => "TransactionNotOwned",
            Self::Backend { .. } => "Backend",
            Self::Cancelled => "Cancelled",
            Self::DeadlineExceeded => "DeadlineExceeded",
            Self::IdentityStore(_) => "IdentityStore",
            Self::Internal(_) => "Internal",
        }
    }

    /// Returns `true` if retrying the whole transaction may succeed.
    ///
    /// Only backend conflicts and unavailability qualify.
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        match self {
            Self::Backend { source, .. } => source.is_retryable(),
            _ => false,
        }
    }

    /// Returns `true` if the backend rejected a commit because of a conflict.
    #[must_use]
    pub const fn is_conflict(&self) -> bool {
        matches!(self, Self::Backend { source, .. } if source.is_conflict())
    }

    /// Create an internal error.
    #[must_use]
    pub fn internal(msg: impl Into<String>) -> Self {
        Self::Internal(msg.into())
    }
}

/// Result type alias for Keystone operations.
pub type Result<T> = std::result::Result<T, Error>;

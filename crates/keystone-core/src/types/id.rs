//! Identifiers for sessions, transactions and commits.

use std::fmt;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::CoreError;

/// Longest session identifier accepted from a client.
const MAX_SESSION_ID_LEN: usize = 128;

/// Opaque identifier of a live session.
///
/// Identifiers are drawn from a 122-bit random space, so collisions are not
/// expected in practice; the session table still checks for them on insert.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SessionId(String);

impl SessionId {
    /// Generate a fresh random session identifier.
    #[must_use]
    pub fn generate() -> Self {
        Self(Uuid::new_v4().simple().to_string())
    }

    /// Parse a client-supplied session identifier.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::InvalidSessionId`] if the value is empty, too long,
    /// or contains characters other than ASCII alphanumerics, `-` and `_`.
    pub fn parse(raw: &str) -> Result<Self, CoreError> {
        let valid = !raw.is_empty()
            && raw.len() <= MAX_SESSION_ID_LEN
            && raw.bytes().all(|b| b.is_ascii_alphanumeric() || b == b'-' || b == b'_');
        if valid {
            Ok(Self(raw.to_string()))
        } else {
            Err(CoreError::InvalidSessionId(raw.to_string()))
        }
    }

    /// Get the identifier as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Handle of a transaction, unique for the lifetime of the server process.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TxHandle(u64);

impl TxHandle {
    /// Create a new `TxHandle` from a raw u64 value.
    #[must_use]
    pub const fn new(id: u64) -> Self {
        Self(id)
    }

    /// Get the raw u64 value.
    #[must_use]
    pub const fn as_u64(self) -> u64 {
        self.0
    }
}

impl From<u64> for TxHandle {
    fn from(id: u64) -> Self {
        Self::new(id)
    }
}

impl fmt::Display for TxHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "tx-{}", self.0)
    }
}

/// Proof that a write-set was durably applied by the backend.
///
/// Backends number their commits from 1; the token with id 0 is returned for
/// a commit that had nothing to write and never reached the backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CommitToken {
    /// Backend commit sequence number.
    pub id: u64,
    /// Number of key-value pairs applied.
    pub entries: usize,
}

impl CommitToken {
    /// Token for a commit with an empty write-set.
    pub const NOOP: Self = Self { id: 0, entries: 0 };

    /// Create a new commit token.
    #[must_use]
    pub const fn new(id: u64, entries: usize) -> Self {
        Self { id, entries }
    }

    /// Returns `true` if no backend call was made for this commit.
    #[must_use]
    pub const fn is_noop(&self) -> bool {
        self.id == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn generated_session_ids_parse_back() {
        let id = SessionId::generate();
        assert_eq!(SessionId::parse(id.as_str()), Ok(id));
    }

    #[test]
    fn generated_session_ids_differ() {
        assert_ne!(SessionId::generate(), SessionId::generate());
    }

    #[test]
    fn session_id_rejects_bad_input() {
        assert!(SessionId::parse("").is_err());
        assert!(SessionId::parse("has space").is_err());
        assert!(SessionId::parse(&"a".repeat(MAX_SESSION_ID_LEN + 1)).is_err());
        assert!(SessionId::parse("abc-123_x").is_ok());
    }

    #[test]
    fn noop_token() {
        assert!(CommitToken::NOOP.is_noop());
        assert!(!CommitToken::new(7, 2).is_noop());
    }

    #[test]
    fn tx_handle_serializes_as_number() {
        let json = serde_json::to_string(&TxHandle::new(9)).expect("serialize");
        assert_eq!(json, "9");
    }
}

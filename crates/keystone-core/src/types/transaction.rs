//! Transaction modes and lifecycle states.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Whether a transaction may buffer writes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TxMode {
    /// Only `get` is allowed.
    ReadOnly,
    /// Both `get` and `set` are allowed.
    ReadWrite,
}

impl TxMode {
    /// Map the wire-level `readWrite` flag to a mode.
    #[must_use]
    pub const fn from_read_write(read_write: bool) -> Self {
        if read_write {
            Self::ReadWrite
        } else {
            Self::ReadOnly
        }
    }

    /// Returns `true` for [`TxMode::ReadOnly`].
    #[must_use]
    pub const fn is_read_only(self) -> bool {
        matches!(self, Self::ReadOnly)
    }
}

/// Lifecycle state of a transaction.
///
/// `Open` moves to exactly one of the two terminal states and never back.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TxStatus {
    /// Accepting operations.
    Open,
    /// Write-set applied by the backend.
    Committed,
    /// Write-set discarded.
    Aborted,
}

impl TxStatus {
    /// Returns `true` for `Committed` and `Aborted`.
    #[must_use]
    pub const fn is_terminal(self) -> bool {
        !matches!(self, Self::Open)
    }
}

impl fmt::Display for TxStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Open => "open",
            Self::Committed => "committed",
            Self::Aborted => "aborted",
        };
        f.write_str(name)
    }
}

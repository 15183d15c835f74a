//! An open transaction owned by a session.

use std::time::Instant;

use keystone_core::{SessionId, TxHandle, TxMode, TxStatus};

use super::write_set::WriteSet;
use crate::error::{Error, Result};

/// A transaction while it is open.
///
/// The value lives in its session's transaction slot. Finishing it consumes
/// it, so an open `Transaction` is always in [`TxStatus::Open`].
#[derive(Debug)]
pub struct Transaction {
    handle: TxHandle,
    owner: SessionId,
    mode: TxMode,
    write_set: WriteSet,
    started_at: Instant,
}

impl Transaction {
    pub(crate) fn new(handle: TxHandle, owner: SessionId, mode: TxMode) -> Self {
        Self { handle, owner, mode, write_set: WriteSet::new(), started_at: Instant::now() }
    }

    /// The transaction's handle.
    pub const fn handle(&self) -> TxHandle {
        self.handle
    }

    /// The session that began the transaction.
    pub const fn owner(&self) -> &SessionId {
        &self.owner
    }

    /// Read-only or read-write.
    pub const fn mode(&self) -> TxMode {
        self.mode
    }

    /// Always [`TxStatus::Open`].
    pub const fn status(&self) -> TxStatus {
        TxStatus::Open
    }

    /// When the transaction began.
    pub const fn started_at(&self) -> Instant {
        self.started_at
    }

    /// Pending writes.
    pub const fn write_set(&self) -> &WriteSet {
        &self.write_set
    }

    /// Buffer a write.
    ///
    /// # Errors
    ///
    /// Returns [`Error::ReadOnlyViolation`] for a read-only transaction.
    pub fn set(&mut self, key: Vec<u8>, value: Vec<u8>) -> Result<()> {
        if self.mode.is_read_only() {
            return Err(Error::ReadOnlyViolation { handle: self.handle });
        }
        self.write_set.put(key, value);
        Ok(())
    }

    /// Discard the transaction, returning its pending writes.
    pub(crate) fn into_write_set(self) -> WriteSet {
        self.write_set
    }
}

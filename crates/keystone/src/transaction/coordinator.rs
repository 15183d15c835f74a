//! Transaction coordinator implementation.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use keystone_core::{CommitToken, SessionId, TxHandle, TxMode, TxStatus};
use keystone_storage::KvBackend;
use parking_lot::Mutex;
use tracing::{debug, warn};

use super::handle::Transaction;
use crate::context::CallContext;
use crate::error::{Error, Result};
use crate::metrics::ServiceMetrics;
use crate::session::{Session, SessionState};

/// Drives every session's transaction through `open → committed | aborted`.
///
/// Writes are buffered in the session's transaction and reach the backend
/// only on commit, as one atomic write-set. Reads consult the write-set
/// first and fall back to the backend's last committed value.
///
/// # Thread Safety
///
/// `TransactionCoordinator` is `Send + Sync`. All per-transaction state sits
/// behind the owning session's mutex; the coordinator only keeps the handle
/// counter and a map from open handles to their owners.
///
/// # Example
///
/// ```ignore
/// let tx = coordinator.begin(&session, TxMode::ReadWrite).await?;
/// coordinator.set(&session, tx, b"key".to_vec(), b"value".to_vec()).await?;
/// let token = coordinator.commit(&ctx, &session, tx).await?;
/// ```
pub struct TransactionCoordinator {
    backend: Arc<dyn KvBackend>,
    next_tx_id: AtomicU64,
    open: Arc<Mutex<HashMap<TxHandle, SessionId>>>,
    metrics: Arc<ServiceMetrics>,
}

impl TransactionCoordinator {
    /// Create a coordinator over a backend.
    pub fn new(backend: Arc<dyn KvBackend>, metrics: Arc<ServiceMetrics>) -> Self {
        Self {
            backend,
            next_tx_id: AtomicU64::new(1),
            open: Arc::new(Mutex::new(HashMap::new())),
            metrics,
        }
    }

    /// The backend commits go to.
    pub fn backend(&self) -> &Arc<dyn KvBackend> {
        &self.backend
    }

    /// Number of transactions currently open across all sessions.
    pub fn open_count(&self) -> usize {
        self.open.lock().len()
    }

    /// Start a transaction in a session.
    ///
    /// # Errors
    ///
    /// - [`Error::TransactionAlreadyOpen`] if the session has one open
    /// - [`Error::PermissionDenied`] for a read-write transaction when the
    ///   session's identity may only read its database
    /// - [`Error::NoSessionFound`] if the session closed meanwhile
    pub async fn begin(&self, session: &Session, mode: TxMode) -> Result<TxHandle> {
        if !mode.is_read_only() && !session.identity().can_write(session.database()) {
            return Err(Error::PermissionDenied { database: session.database().to_string() });
        }

        let mut state = session.lock().await?;
        if let Some(tx) = &state.transaction {
            return Err(Error::TransactionAlreadyOpen { handle: tx.handle() });
        }

        let handle = TxHandle::new(self.next_tx_id.fetch_add(1, Ordering::Relaxed));
        state.transaction = Some(Transaction::new(handle, session.id().clone(), mode));
        self.open.lock().insert(handle, session.id().clone());
        self.metrics.record_begin();

        debug!(session = %session.id(), tx = %handle, ?mode, "transaction begun");
        Ok(handle)
    }

    /// Buffer a write.
    ///
    /// # Errors
    ///
    /// - [`Error::ReadOnlyViolation`] for a read-only transaction
    /// - [`Error::TransactionAlreadyClosed`], [`Error::NoTransactionFound`]
    ///   or [`Error::TransactionNotOwned`] if `handle` is not this session's
    ///   open transaction
    pub async fn set(
        &self,
        session: &Session,
        handle: TxHandle,
        key: Vec<u8>,
        value: Vec<u8>,
    ) -> Result<()> {
        let mut state = session.lock().await?;
        let tx = self.resolve(session, &mut state, handle)?;
        tx.set(key, value)
    }

    /// Read a key: the transaction's own pending write if there is one,
    /// otherwise the last committed value.
    ///
    /// The backend read can be abandoned through `ctx`; the transaction stays
    /// open either way.
    ///
    /// # Errors
    ///
    /// Handle errors as for [`set`](Self::set), [`Error::Backend`] if the
    /// read fails, and [`Error::Cancelled`] or [`Error::DeadlineExceeded`].
    pub async fn get(
        &self,
        ctx: &CallContext,
        session: &Session,
        handle: TxHandle,
        key: Vec<u8>,
    ) -> Result<Option<Vec<u8>>> {
        let mut state = ctx.run(session.lock()).await?;
        let tx = self.resolve(session, &mut state, handle)?;
        if let Some(value) = tx.write_set().get(&key) {
            return Ok(Some(value.to_vec()));
        }

        let backend = Arc::clone(&self.backend);
        let database = session.database().to_string();
        let session_id = session.id().clone();
        let read = async move {
            let lookup = key.clone();
            let result = tokio::task::spawn_blocking(move || backend.read(&database, &lookup))
                .await
                .map_err(|e| Error::internal(format!("read task failed: {e}")))?;
            result.map_err(|source| Error::Backend { session: session_id, key: Some(key), source })
        };

        // The session lock is held so a concurrent close waits for the read.
        let value = ctx.run(read).await;
        drop(state);
        value
    }

    /// Commit the transaction's write-set.
    ///
    /// An empty write-set commits without a backend call and yields
    /// [`CommitToken::NOOP`]. If `ctx` is already cancelled or past its
    /// deadline when the commit starts, the transaction is rolled back
    /// instead. Once the write-set is handed to the backend the commit runs
    /// to completion even if the caller goes away, and its outcome is
    /// recorded in the session.
    ///
    /// Either way the transaction is finished afterwards.
    ///
    /// # Errors
    ///
    /// Handle errors as for [`set`](Self::set), [`Error::Cancelled`] or
    /// [`Error::DeadlineExceeded`] for a commit that never started, and
    /// [`Error::Backend`] if the backend refused the write-set.
    pub async fn commit(
        &self,
        ctx: &CallContext,
        session: &Arc<Session>,
        handle: TxHandle,
    ) -> Result<CommitToken> {
        let mut state = session.lock().await?;
        self.resolve(session, &mut state, handle)?;
        let tx = state.transaction.take().ok_or(Error::NoTransactionFound { handle })?;
        self.open.lock().remove(&handle);

        if let Err(e) = ctx.check() {
            state.record_finished(handle, TxStatus::Aborted);
            self.metrics.record_rollback();
            debug!(session = %session.id(), tx = %handle, "commit cancelled before apply");
            return Err(e);
        }

        let started = tx.started_at();
        let writes = tx.into_write_set();
        if writes.is_empty() {
            state.record_finished(handle, TxStatus::Committed);
            self.metrics.record_commit(started.elapsed());
            debug!(session = %session.id(), tx = %handle, "empty commit");
            return Ok(CommitToken::NOOP);
        }

        // Finish on a detached task so the outcome is recorded even if this
        // future is dropped while the backend works.
        let backend = Arc::clone(&self.backend);
        let metrics = Arc::clone(&self.metrics);
        let session = Arc::clone(session);
        let entries = writes.into_entries();
        let task = tokio::spawn(async move {
            let mut state = state;
            let database = session.database().to_string();
            let outcome = tokio::task::spawn_blocking(move || backend.apply(&database, &entries))
                .await
                .map_err(|e| Error::internal(format!("commit task failed: {e}")))
                .and_then(|r| {
                    r.map_err(|source| Error::Backend {
                        session: session.id().clone(),
                        key: None,
                        source,
                    })
                });

            match &outcome {
                Ok(token) => {
                    state.record_finished(handle, TxStatus::Committed);
                    metrics.record_commit(started.elapsed());
                    debug!(session = %session.id(), tx = %handle, commit = token.id, entries = token.entries, "committed");
                }
                Err(e) => {
                    state.record_finished(handle, TxStatus::Aborted);
                    metrics.record_failed_commit();
                    warn!(session = %session.id(), tx = %handle, error = %e, "commit failed");
                }
            }
            outcome
        });

        task.await.map_err(|e| Error::internal(format!("commit task failed: {e}")))?
    }

    /// Abort the transaction and discard its write-set.
    ///
    /// Rolling back a transaction that already finished succeeds and does
    /// nothing.
    ///
    /// # Errors
    ///
    /// [`Error::NoTransactionFound`] or [`Error::TransactionNotOwned`] if the
    /// handle was never this session's.
    pub async fn rollback(&self, session: &Session, handle: TxHandle) -> Result<()> {
        let mut state = session.lock().await?;

        if state.finished_status(handle).is_some() {
            return Ok(());
        }
        self.resolve(session, &mut state, handle)?;

        state.transaction = None;
        state.record_finished(handle, TxStatus::Aborted);
        self.open.lock().remove(&handle);
        self.metrics.record_rollback();

        debug!(session = %session.id(), tx = %handle, "rolled back");
        Ok(())
    }

    /// Forget a transaction that was rolled back by closing its session.
    pub(crate) fn release(&self, handle: TxHandle) {
        if self.open.lock().remove(&handle).is_some() {
            self.metrics.record_rollback();
        }
    }

    fn resolve<'s>(
        &self,
        session: &Session,
        state: &'s mut SessionState,
        handle: TxHandle,
    ) -> Result<&'s mut Transaction> {
        let is_current = state.transaction.as_ref().is_some_and(|tx| tx.handle() == handle);
        if !is_current {
            return Err(self.unknown_handle(session, state, handle));
        }

        state.transaction.as_mut().ok_or(Error::NoTransactionFound { handle })
    }

    fn unknown_handle(&self, session: &Session, state: &SessionState, handle: TxHandle) -> Error {
        if state.finished_status(handle).is_some() {
            return Error::TransactionAlreadyClosed { handle };
        }
        match self.open.lock().get(&handle) {
            Some(owner) if owner != session.id() => Error::TransactionNotOwned { handle },
            _ => Error::NoTransactionFound { handle },
        }
    }
}

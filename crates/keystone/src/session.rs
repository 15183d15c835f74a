//! The session table.
//!
//! A session binds an authenticated [`Identity`] to one database and holds
//! at most one open transaction. The table itself is a single `RwLock`ed map
//! taken only to insert, remove and look up entries; everything that touches
//! a session's transaction goes through that session's own async mutex, so
//! slow backend calls in one session never block another.
//!
//! # Closing
//!
//! [`SessionTable::close`] removes the entry first, then waits for the
//! session mutex. Operations already holding the mutex finish normally;
//! operations queued behind the close find the session marked closed and
//! fail with [`Error::NoSessionFound`].

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use keystone_core::{Identity, SessionId, TxHandle, TxStatus};
use parking_lot::{Mutex, RwLock};
use tokio::sync::OwnedMutexGuard;
use tracing::debug;

use crate::error::{Error, Result};
use crate::transaction::Transaction;

type IdGenerator = Box<dyn Fn() -> SessionId + Send + Sync>;

/// A live session.
pub struct Session {
    id: SessionId,
    identity: Identity,
    database: String,
    last_activity: Mutex<Instant>,
    state: Arc<tokio::sync::Mutex<SessionState>>,
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("id", &self.id)
            .field("username", &self.identity.username)
            .field("database", &self.database)
            .finish_non_exhaustive()
    }
}

impl Session {
    fn new(id: SessionId, identity: Identity, database: String) -> Self {
        Self {
            id,
            identity,
            database,
            last_activity: Mutex::new(Instant::now()),
            state: Arc::new(tokio::sync::Mutex::new(SessionState::default())),
        }
    }

    /// The session identifier.
    pub fn id(&self) -> &SessionId {
        &self.id
    }

    /// The identity snapshot taken when the session opened.
    pub fn identity(&self) -> &Identity {
        &self.identity
    }

    /// The database the session is bound to.
    pub fn database(&self) -> &str {
        &self.database
    }

    /// Time since the session was last looked up.
    pub fn idle_for(&self) -> Duration {
        self.last_activity.lock().elapsed()
    }

    fn touch(&self) {
        *self.last_activity.lock() = Instant::now();
    }

    /// Lock the session's transaction slot.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NoSessionFound`] if the session was closed while
    /// this call waited.
    pub(crate) async fn lock(&self) -> Result<OwnedMutexGuard<SessionState>> {
        let state = Arc::clone(&self.state).lock_owned().await;
        if state.closed {
            return Err(Error::NoSessionFound { session: Some(self.id.clone()) });
        }
        Ok(state)
    }

}

/// Mutable state behind a session's mutex.
#[derive(Debug, Default)]
pub(crate) struct SessionState {
    pub(crate) closed: bool,
    pub(crate) transaction: Option<Transaction>,
    /// Every transaction the session finished, sorted by handle.
    finished: Vec<(TxHandle, TxStatus)>,
}

impl SessionState {
    /// Remember how a transaction ended for the rest of the session's life.
    pub(crate) fn record_finished(&mut self, handle: TxHandle, status: TxStatus) {
        match self.finished.binary_search_by_key(&handle.as_u64(), |(h, _)| h.as_u64()) {
            Ok(pos) => self.finished[pos].1 = status,
            Err(pos) => self.finished.insert(pos, (handle, status)),
        }
    }

    /// How a finished transaction ended.
    pub(crate) fn finished_status(&self, handle: TxHandle) -> Option<TxStatus> {
        self.finished
            .binary_search_by_key(&handle.as_u64(), |(h, _)| h.as_u64())
            .ok()
            .map(|pos| self.finished[pos].1)
    }
}

/// Concurrent registry of live sessions.
pub struct SessionTable {
    sessions: RwLock<HashMap<SessionId, Arc<Session>>>,
    id_generator: IdGenerator,
}

impl Default for SessionTable {
    fn default() -> Self {
        Self::new()
    }
}

impl SessionTable {
    /// Create an empty table.
    pub fn new() -> Self {
        Self { sessions: RwLock::new(HashMap::new()), id_generator: Box::new(SessionId::generate) }
    }

    /// Replace the identifier generator.
    #[must_use]
    pub fn with_id_generator(
        mut self,
        generator: impl Fn() -> SessionId + Send + Sync + 'static,
    ) -> Self {
        self.id_generator = Box::new(generator);
        self
    }

    /// Register a new session.
    ///
    /// # Errors
    ///
    /// Returns [`Error::SessionAlreadyPresent`] if the generated identifier
    /// is already live. The existing session is left untouched.
    pub fn open(&self, identity: Identity, database: &str) -> Result<SessionId> {
        let id = (self.id_generator)();

        let mut sessions = self.sessions.write();
        if sessions.contains_key(&id) {
            return Err(Error::SessionAlreadyPresent { session: id });
        }
        let session = Session::new(id.clone(), identity, database.to_string());
        sessions.insert(id.clone(), Arc::new(session));
        drop(sessions);

        debug!(session = %id, database, "session opened");
        Ok(id)
    }

    /// Find a live session and mark it active.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NoSessionFound`] if there is no such session.
    pub fn lookup(&self, id: &SessionId) -> Result<Arc<Session>> {
        // Touched under the map lock so idle expiry sees the activity.
        let sessions = self.sessions.read();
        let session = sessions
            .get(id)
            .cloned()
            .ok_or_else(|| Error::NoSessionFound { session: Some(id.clone()) })?;
        session.touch();
        Ok(session)
    }

    /// Remove a session, waiting for in-flight operations on it, and roll
    /// back its open transaction if there is one.
    ///
    /// Returns the handle of the transaction that was rolled back.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NoSessionFound`] if there is no such session.
    pub async fn close(&self, id: &SessionId) -> Result<Option<TxHandle>> {
        let session = self
            .sessions
            .write()
            .remove(id)
            .ok_or_else(|| Error::NoSessionFound { session: Some(id.clone()) })?;

        let mut state = session.state.lock().await;
        let aborted = Self::mark_closed(&mut state);

        debug!(session = %id, rolled_back = ?aborted, "session closed");
        Ok(aborted)
    }

    /// Close every session idle for longer than `timeout`.
    ///
    /// Sessions with an operation in flight are skipped; they are not idle.
    /// Idleness is checked again under the table's write lock, so a session
    /// looked up after it was picked survives.
    /// Returns the closed sessions with the transactions that were rolled back.
    pub fn expire_idle(&self, timeout: Duration) -> Vec<(SessionId, Option<TxHandle>)> {
        let candidates: Vec<Arc<Session>> = self
            .sessions
            .read()
            .values()
            .filter(|s| s.idle_for() > timeout)
            .cloned()
            .collect();

        candidates
            .into_iter()
            .filter_map(|session| {
                let aborted = self.expire_if_idle(&session, timeout)?;
                Some((session.id.clone(), aborted))
            })
            .collect()
    }

    /// Close one expiry candidate if it is still idle and not busy.
    ///
    /// Returns `None` if the session was spared, otherwise the handle of the
    /// transaction that was rolled back.
    fn expire_if_idle(&self, session: &Arc<Session>, timeout: Duration) -> Option<Option<TxHandle>> {
        let mut state = session.state.try_lock().ok()?;

        let mut sessions = self.sessions.write();
        let live = sessions.get(&session.id).is_some_and(|s| Arc::ptr_eq(s, session));
        if !live || session.idle_for() <= timeout {
            return None;
        }
        sessions.remove(&session.id);
        drop(sessions);

        let aborted = Self::mark_closed(&mut state);
        debug!(session = %session.id, rolled_back = ?aborted, "idle session closed");
        Some(aborted)
    }

    /// Mark a removed session closed and roll back its open transaction.
    fn mark_closed(state: &mut SessionState) -> Option<TxHandle> {
        state.closed = true;
        // Never commit on close; the write-set is dropped with the transaction.
        let aborted = state.transaction.take().map(|tx| tx.handle());
        if let Some(handle) = aborted {
            state.record_finished(handle, TxStatus::Aborted);
        }
        aborted
    }

    /// Number of live sessions.
    pub fn len(&self) -> usize {
        self.sessions.read().len()
    }

    /// Returns `true` if no session is live.
    pub fn is_empty(&self) -> bool {
        self.sessions.read().is_empty()
    }
}

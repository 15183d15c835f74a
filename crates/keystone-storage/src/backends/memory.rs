//! In-memory backend with fault injection.
//!
//! Nothing is persisted. The backend can be told to fail upcoming commits
//! or to stall inside `apply`, which lets callers exercise their conflict,
//! unavailability and cancellation paths without a real store.

use std::collections::{BTreeMap, HashMap, VecDeque};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use keystone_core::CommitToken;
use parking_lot::{Mutex, RwLock};

use crate::engine::{
    validate_database_name, DatabaseCatalog, KeyValue, KvBackend, StorageError, StorageResult,
};

/// A failure to inject into a future `apply`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Fault {
    /// Fail with [`StorageError::Conflict`].
    Conflict,
    /// Fail with [`StorageError::Unavailable`].
    Unavailable,
}

impl Fault {
    fn into_error(self, database: &str) -> StorageError {
        match self {
            Self::Conflict => {
                StorageError::Conflict(format!("concurrent commit in database {database}"))
            }
            Self::Unavailable => StorageError::Unavailable("backend is not accepting commits".into()),
        }
    }
}

#[derive(Default)]
struct State {
    databases: BTreeMap<String, HashMap<Vec<u8>, Vec<u8>>>,
    last_commit: u64,
}

/// A backend that keeps everything in a map.
#[derive(Default)]
pub struct MemoryBackend {
    state: RwLock<State>,
    faults: Mutex<VecDeque<Fault>>,
    apply_delay: Mutex<Option<Duration>>,
    applies: AtomicU64,
}

impl MemoryBackend {
    /// Create an empty backend with no databases.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a backend with the given databases already present.
    pub fn with_databases<I, S>(names: I) -> StorageResult<Self>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let backend = Self::new();
        for name in names {
            backend.create_database(name.as_ref())?;
        }
        Ok(backend)
    }

    /// Make the next `apply` fail with `fault`. Faults queue up in order.
    pub fn fail_next_apply(&self, fault: Fault) {
        self.faults.lock().push_back(fault);
    }

    /// Block every subsequent `apply` for `delay` before it takes effect.
    pub fn set_apply_delay(&self, delay: Option<Duration>) {
        *self.apply_delay.lock() = delay;
    }

    /// Number of `apply` calls that reached the backend, successful or not.
    pub fn apply_count(&self) -> u64 {
        self.applies.load(Ordering::Relaxed)
    }
}

impl DatabaseCatalog for MemoryBackend {
    fn database_exists(&self, name: &str) -> StorageResult<bool> {
        Ok(self.state.read().databases.contains_key(name))
    }

    fn create_database(&self, name: &str) -> StorageResult<bool> {
        validate_database_name(name)?;

        let mut state = self.state.write();
        if state.databases.contains_key(name) {
            return Ok(false);
        }
        state.databases.insert(name.to_string(), HashMap::new());
        Ok(true)
    }

    fn list_databases(&self) -> StorageResult<Vec<String>> {
        Ok(self.state.read().databases.keys().cloned().collect())
    }
}

impl KvBackend for MemoryBackend {
    fn read(&self, database: &str, key: &[u8]) -> StorageResult<Option<Vec<u8>>> {
        let state = self.state.read();
        let data = state
            .databases
            .get(database)
            .ok_or_else(|| StorageError::DatabaseNotFound(database.to_string()))?;
        Ok(data.get(key).cloned())
    }

    fn apply(&self, database: &str, writes: &[KeyValue]) -> StorageResult<CommitToken> {
        self.applies.fetch_add(1, Ordering::Relaxed);

        let delay = *self.apply_delay.lock();
        if let Some(delay) = delay {
            std::thread::sleep(delay);
        }

        if let Some(fault) = self.faults.lock().pop_front() {
            return Err(fault.into_error(database));
        }

        let mut state = self.state.write();
        let data = state
            .databases
            .get_mut(database)
            .ok_or_else(|| StorageError::DatabaseNotFound(database.to_string()))?;
        for (key, value) in writes {
            data.insert(key.clone(), value.clone());
        }
        state.last_commit += 1;
        Ok(CommitToken::new(state.last_commit, writes.len()))
    }

    fn last_commit(&self) -> StorageResult<u64> {
        Ok(self.state.read().last_commit)
    }
}

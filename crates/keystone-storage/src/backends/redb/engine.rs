//! Redb backend implementation.

use std::path::Path;

use keystone_core::CommitToken;
use redb::{Database, ReadableTable};
use tracing::debug;

use crate::engine::{
    validate_database_name, DatabaseCatalog, KeyValue, KvBackend, StorageError, StorageResult,
};

use super::tables::{encode_key, DATABASES_TABLE, DATA_TABLE, LAST_COMMIT_KEY, META_TABLE};

/// Configuration options for the Redb backend.
#[derive(Debug, Clone, Copy, Default)]
pub struct RedbConfig {
    /// Cache size in bytes.
    /// If not set, uses Redb's default.
    pub cache_size: Option<usize>,
}

impl RedbConfig {
    /// Create a new configuration with default values.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the cache size.
    #[must_use]
    pub const fn cache_size(mut self, size: usize) -> Self {
        self.cache_size = Some(size);
        self
    }
}

/// A backend stored in a single Redb file.
///
/// Every `apply` is one Redb write transaction, so a write-set is durable
/// and atomic once it returns. Redb serializes writers, which means two
/// write-sets never interleave and no conflict is ever reported.
pub struct RedbBackend {
    db: Database,
}

impl RedbBackend {
    /// Open or create a backend at the given path with default configuration.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::Open`] if the file cannot be opened or created.
    pub fn open(path: impl AsRef<Path>) -> StorageResult<Self> {
        Self::open_with_config(path, RedbConfig::default())
    }

    /// Open or create a backend at the given path with custom configuration.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::Open`] if the file cannot be opened or created.
    pub fn open_with_config(path: impl AsRef<Path>, config: RedbConfig) -> StorageResult<Self> {
        let mut builder = Database::builder();
        if let Some(cache_size) = config.cache_size {
            builder.set_cache_size(cache_size);
        }

        let db = builder.create(path.as_ref()).map_err(|e| StorageError::Open(e.to_string()))?;
        debug!(path = %path.as_ref().display(), "opened redb backend");
        Self::init(db)
    }

    /// Create an in-memory backend for testing.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::Open`] if the database cannot be created.
    pub fn in_memory() -> StorageResult<Self> {
        let db = Database::builder()
            .create_with_backend(redb::backends::InMemoryBackend::new())
            .map_err(|e| StorageError::Open(e.to_string()))?;
        Self::init(db)
    }

    // Create the physical tables so read transactions always find them.
    fn init(db: Database) -> StorageResult<Self> {
        let tx = db.begin_write().map_err(|e| StorageError::Open(e.to_string()))?;
        {
            tx.open_table(DATA_TABLE).map_err(|e| StorageError::Open(e.to_string()))?;
            tx.open_table(DATABASES_TABLE).map_err(|e| StorageError::Open(e.to_string()))?;
            tx.open_table(META_TABLE).map_err(|e| StorageError::Open(e.to_string()))?;
        }
        tx.commit().map_err(|e| StorageError::Open(e.to_string()))?;
        Ok(Self { db })
    }

    fn ensure_database(&self, tx: &redb::ReadTransaction, name: &str) -> StorageResult<()> {
        let table = tx.open_table(DATABASES_TABLE).map_err(internal)?;
        if table.get(name).map_err(internal)?.is_some() {
            Ok(())
        } else {
            Err(StorageError::DatabaseNotFound(name.to_string()))
        }
    }
}

fn internal(err: impl std::fmt::Display) -> StorageError {
    StorageError::Internal(err.to_string())
}

fn transaction(err: impl std::fmt::Display) -> StorageError {
    StorageError::Transaction(err.to_string())
}

impl DatabaseCatalog for RedbBackend {
    fn database_exists(&self, name: &str) -> StorageResult<bool> {
        let tx = self.db.begin_read().map_err(transaction)?;
        match self.ensure_database(&tx, name) {
            Ok(()) => Ok(true),
            Err(StorageError::DatabaseNotFound(_)) => Ok(false),
            Err(e) => Err(e),
        }
    }

    fn create_database(&self, name: &str) -> StorageResult<bool> {
        validate_database_name(name)?;

        let tx = self.db.begin_write().map_err(transaction)?;
        let created = {
            let mut databases = tx.open_table(DATABASES_TABLE).map_err(internal)?;
            let meta = tx.open_table(META_TABLE).map_err(internal)?;
            let exists = databases.get(name).map_err(internal)?.is_some();
            if !exists {
                let seq = meta.get(LAST_COMMIT_KEY).map_err(internal)?.map_or(0, |v| v.value());
                databases.insert(name, seq).map_err(internal)?;
            }
            !exists
        };
        tx.commit().map_err(transaction)?;

        if created {
            debug!(database = name, "created database");
        }
        Ok(created)
    }

    fn list_databases(&self) -> StorageResult<Vec<String>> {
        let tx = self.db.begin_read().map_err(transaction)?;
        let table = tx.open_table(DATABASES_TABLE).map_err(internal)?;

        let mut names = Vec::new();
        for entry in table.iter().map_err(internal)? {
            let (name, _) = entry.map_err(internal)?;
            names.push(name.value().to_string());
        }
        Ok(names)
    }
}

impl KvBackend for RedbBackend {
    fn read(&self, database: &str, key: &[u8]) -> StorageResult<Option<Vec<u8>>> {
        let tx = self.db.begin_read().map_err(transaction)?;
        self.ensure_database(&tx, database)?;

        let table = tx.open_table(DATA_TABLE).map_err(internal)?;
        let encoded_key = encode_key(database, key);
        let value = table.get(encoded_key.as_slice()).map_err(internal)?;
        Ok(value.map(|v| v.value().to_vec()))
    }

    fn apply(&self, database: &str, writes: &[KeyValue]) -> StorageResult<CommitToken> {
        let tx = self.db.begin_write().map_err(transaction)?;

        let seq = {
            let databases = tx.open_table(DATABASES_TABLE).map_err(internal)?;
            if databases.get(database).map_err(internal)?.is_none() {
                drop(databases);
                tx.abort().map_err(transaction)?;
                return Err(StorageError::DatabaseNotFound(database.to_string()));
            }

            let mut meta = tx.open_table(META_TABLE).map_err(internal)?;
            let seq = meta.get(LAST_COMMIT_KEY).map_err(internal)?.map_or(0, |v| v.value()) + 1;
            meta.insert(LAST_COMMIT_KEY, seq).map_err(internal)?;

            let mut data = tx.open_table(DATA_TABLE).map_err(internal)?;
            for (key, value) in writes {
                let encoded_key = encode_key(database, key);
                data.insert(encoded_key.as_slice(), value.as_slice()).map_err(internal)?;
            }
            seq
        };

        tx.commit().map_err(transaction)?;
        debug!(database, seq, entries = writes.len(), "applied write-set");
        Ok(CommitToken::new(seq, writes.len()))
    }

    fn last_commit(&self) -> StorageResult<u64> {
        let tx = self.db.begin_read().map_err(transaction)?;
        let meta = tx.open_table(META_TABLE).map_err(internal)?;
        let seq = meta.get(LAST_COMMIT_KEY).map_err(internal)?.map_or(0, |v| v.value());
        Ok(seq)
    }
}

//! Core backend traits.
//!
//! Both traits are object safe: the coordinator holds its backend as
//! `Arc<dyn KvBackend>` so the binary can choose one at start-up.

use keystone_core::CommitToken;

use super::StorageResult;

/// A key-value pair as stored in a write-set.
pub type KeyValue = (Vec<u8>, Vec<u8>);

/// The set of databases a backend knows about.
pub trait DatabaseCatalog: Send + Sync {
    /// Returns `true` if the database exists.
    ///
    /// # Errors
    ///
    /// Returns an error if the catalog cannot be read.
    fn database_exists(&self, name: &str) -> StorageResult<bool>;

    /// Create a database. Returns `false` if it already existed.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::InvalidDatabaseName`] for unusable names, or an
    /// error if the catalog cannot be written.
    ///
    /// [`StorageError::InvalidDatabaseName`]: super::StorageError::InvalidDatabaseName
    fn create_database(&self, name: &str) -> StorageResult<bool>;

    /// Names of all databases, sorted.
    ///
    /// # Errors
    ///
    /// Returns an error if the catalog cannot be read.
    fn list_databases(&self) -> StorageResult<Vec<String>>;
}

/// A transactional key-value store that commits whole write-sets.
///
/// # Example
///
/// ```ignore
/// fn transfer<B: KvBackend>(backend: &B) -> StorageResult<CommitToken> {
///     let writes = vec![
///         (b"alice".to_vec(), b"90".to_vec()),
///         (b"bob".to_vec(), b"110".to_vec()),
///     ];
///     // Either both keys change or neither does.
///     backend.apply("bank", &writes)
/// }
/// ```
pub trait KvBackend: DatabaseCatalog {
    /// Read the last committed value of a key.
    ///
    /// Returns `Ok(None)` if the key has never been written.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::DatabaseNotFound`] if the database does not exist.
    ///
    /// [`StorageError::DatabaseNotFound`]: super::StorageError::DatabaseNotFound
    fn read(&self, database: &str, key: &[u8]) -> StorageResult<Option<Vec<u8>>>;

    /// Apply a write-set atomically: every pair becomes visible, or none does.
    ///
    /// Keys in `writes` are unique. An empty write-set is still a commit.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::Conflict`] if the backend rejects the write-set
    /// because of a concurrent commit, [`StorageError::Unavailable`] if it
    /// cannot accept commits, or [`StorageError::DatabaseNotFound`].
    ///
    /// [`StorageError::Conflict`]: super::StorageError::Conflict
    /// [`StorageError::Unavailable`]: super::StorageError::Unavailable
    /// [`StorageError::DatabaseNotFound`]: super::StorageError::DatabaseNotFound
    fn apply(&self, database: &str, writes: &[KeyValue]) -> StorageResult<CommitToken>;

    /// Sequence number of the most recent commit, 0 if none.
    ///
    /// # Errors
    ///
    /// Returns an error if the backend metadata cannot be read.
    fn last_commit(&self) -> StorageResult<u64>;
}

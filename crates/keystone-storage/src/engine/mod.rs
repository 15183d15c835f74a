//! Backend traits and abstractions.
//!
//! This module defines the traits that storage backends must implement:
//!
//! - [`KvBackend`] - Point reads and atomic application of write-sets
//! - [`DatabaseCatalog`] - Creation and existence checks for databases
//!
//! # Error Handling
//!
//! All operations return [`StorageResult<T>`] which is an alias for
//! `Result<T, StorageError>`. See [`StorageError`] for the possible error variants.

mod error;
mod traits;

pub use error::{StorageError, StorageResult};
pub use traits::{DatabaseCatalog, KeyValue, KvBackend};

/// Longest database name accepted by the backends.
pub const MAX_DATABASE_NAME_LEN: usize = 64;

/// Check that a database name is usable as a key prefix.
///
/// Names are 1 to 64 bytes of ASCII alphanumerics, `_` or `-`.
///
/// # Errors
///
/// Returns [`StorageError::InvalidDatabaseName`] otherwise.
pub fn validate_database_name(name: &str) -> StorageResult<()> {
    let valid = !name.is_empty()
        && name.len() <= MAX_DATABASE_NAME_LEN
        && name.bytes().all(|b| b.is_ascii_alphanumeric() || b == b'_' || b == b'-');
    if valid {
        Ok(())
    } else {
        Err(StorageError::InvalidDatabaseName(name.to_string()))
    }
}

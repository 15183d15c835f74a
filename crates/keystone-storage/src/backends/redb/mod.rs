//! Redb storage backend.
//!
//! A [`KvBackend`](crate::KvBackend) that keeps every database in one Redb
//! file. Each database is a key prefix inside a shared data table, and the
//! commit counter lives in a metadata table updated in the same write
//! transaction as the data.
//!
//! # Example
//!
//! ```ignore
//! use keystone_storage::backends::redb::{RedbBackend, RedbConfig};
//!
//! let config = RedbConfig::new().cache_size(100 * 1024 * 1024);
//! let backend = RedbBackend::open_with_config("keystone.redb", config)?;
//! ```
//!
//! For tests, [`RedbBackend::in_memory`] creates a backend that does not persist.

mod engine;
pub mod tables;

pub use engine::{RedbBackend, RedbConfig};

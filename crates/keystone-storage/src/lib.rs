//! Keystone Storage
//!
//! This crate provides the backend abstraction the transaction coordinator
//! commits into, and the concrete backends that implement it.
//!
//! # Overview
//!
//! A backend is a transactional key-value store partitioned into named
//! databases. It answers point reads against its last committed state and
//! applies a whole write-set atomically, returning a [`CommitToken`] that
//! identifies the commit. Conflict detection, if any, is the backend's job.
//!
//! # Core Traits
//!
//! - [`KvBackend`] - Point reads and atomic write-set application
//! - [`DatabaseCatalog`] - Which databases exist
//!
//! # Example
//!
//! ```ignore
//! use keystone_storage::backends::RedbBackend;
//! use keystone_storage::{DatabaseCatalog, KvBackend};
//!
//! let backend = RedbBackend::open("keystone.redb")?;
//! backend.create_database("defaultdb")?;
//!
//! let token = backend.apply("defaultdb", &[(b"key".to_vec(), b"val".to_vec())])?;
//! assert_eq!(backend.read("defaultdb", b"key")?, Some(b"val".to_vec()));
//! ```
//!
//! # Modules
//!
//! - [`engine`] - Backend traits and errors
//! - [`backends`] - Concrete backend implementations
//!
//! [`CommitToken`]: keystone_core::CommitToken

#![deny(clippy::unwrap_used)]

pub mod backends;
pub mod engine;

pub use engine::{
    validate_database_name, DatabaseCatalog, KeyValue, KvBackend, StorageError, StorageResult,
};

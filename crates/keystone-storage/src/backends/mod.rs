//! Concrete backend implementations.
//!
//! - [`redb`] - Durable backend on a single Redb file
//! - [`memory`] - Volatile backend with fault injection, for tests

pub mod memory;
pub mod redb;

pub use self::memory::{Fault, MemoryBackend};
pub use self::redb::{RedbBackend, RedbConfig};

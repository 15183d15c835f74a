//! Core data types for Keystone.
//!
//! This module defines the identifiers that tie requests to sessions and
//! transactions, and the identity snapshot a session carries once its owner
//! has been authenticated.

mod id;
mod identity;
mod transaction;

pub use id::{CommitToken, SessionId, TxHandle};
pub use identity::{Identity, Permission};
pub use transaction::{TxMode, TxStatus};

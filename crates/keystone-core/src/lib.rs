//! Keystone Core
//!
//! This crate provides the fundamental types shared by every Keystone crate:
//! session and transaction identifiers, transaction modes and states, commit
//! tokens, and resolved identities with their per-database grants.
//!
//! # Modules
//!
//! - [`types`] - Identifiers, transaction and identity types
//! - [`error`] - Error types

#![deny(clippy::unwrap_used)]

pub mod error;
pub mod types;

pub use error::CoreError;
pub use types::{CommitToken, Identity, Permission, SessionId, TxHandle, TxMode, TxStatus};

//! Keystone Wire
//!
//! Framing for the PostgreSQL-compatible front-end: the typed
//! `[type][length][payload]` frames exchanged after startup, the untyped
//! startup packets, and the handful of server messages needed to
//! authenticate a client and report errors.
//!
//! # Example
//!
//! ```ignore
//! use keystone_wire::{write_message, BackendMessage, MessageReader, TransactionStatus};
//!
//! let reader = MessageReader::new();
//! let msg = reader.read_raw_message(&mut socket).await?;
//! write_message(&mut socket, &BackendMessage::ReadyForQuery(TransactionStatus::Idle).encode()).await?;
//! ```
//!
//! The reader never interprets payloads beyond their length; what a message
//! means is up to the connection handler.

#![deny(clippy::unwrap_used)]

pub mod backend;
pub mod codec;
pub mod error;
pub mod message;
pub mod startup;

pub use backend::{sqlstate, BackendMessage, TransactionStatus};
pub use codec::{write_message, MessageReader, DEFAULT_MAX_FRAME_LEN};
pub use error::{WireError, WireResult};
pub use message::{frame, MessageType, RawMessage};
pub use startup::{read_startup, StartupMessage, StartupPacket};

//! Keystone
//!
//! Session and transaction coordination for a multi-database key-value
//! server. Clients authenticate into a session bound to one database, run
//! transactions with buffered writes, and commit each write-set atomically
//! into a [`KvBackend`](keystone_storage::KvBackend).
//!
//! # Quick Start
//!
//! ```ignore
//! use std::sync::Arc;
//! use keystone::protocol::{BeginTxRequest, CommitRequest, OpenSessionRequest, SetRequest};
//! use keystone::{CallContext, Config, MemoryIdentityStore, Service};
//! use keystone_storage::backends::MemoryBackend;
//!
//! let users = Arc::new(MemoryIdentityStore::new());
//! users.create_sysadmin("immudb", "immudb")?;
//! let service = Service::new(Config::default(), Arc::new(MemoryBackend::new()), users)?;
//!
//! let open = service
//!     .open_session(&CallContext::new(), OpenSessionRequest {
//!         username: "immudb".into(),
//!         password: "immudb".into(),
//!         database_name: "defaultdb".into(),
//!     })
//!     .await?;
//! let ctx = CallContext::new().with_session(open.session_id);
//!
//! let tx = service.begin_tx(&ctx, BeginTxRequest { read_write: true }).await?.tx_handle;
//! service.set(&ctx, SetRequest { tx_handle: tx, key: b"k".to_vec(), value: b"v".to_vec() }).await?;
//! service.commit(&ctx, CommitRequest { tx_handle: tx }).await?;
//! service.close_session(&ctx).await?;
//! ```
//!
//! # Modules
//!
//! - [`gate`] - Credential checks and database permissions
//! - [`session`] - The live session registry
//! - [`transaction`] - Transactions and the commit coordinator
//! - [`service`] - The operations front-ends call
//! - [`protocol`] - Request and response messages
//! - [`context`] - Per-call session, cancellation and deadline
//! - [`metrics`] - Session and transaction counters

#![deny(clippy::unwrap_used)]

pub mod config;
pub mod context;
pub mod error;
pub mod gate;
pub mod metrics;
pub mod protocol;
pub mod service;
pub mod session;
pub mod transaction;

pub use config::Config;
pub use context::CallContext;
pub use error::{Error, ErrorKind, Result};
pub use gate::{IdentityGate, IdentityStore, MemoryIdentityStore};
pub use metrics::{MetricsSnapshot, ServiceMetrics};
pub use service::Service;
pub use session::{Session, SessionTable};
pub use transaction::{Transaction, TransactionCoordinator, WriteSet};

pub use keystone_core::{CommitToken, Identity, Permission, SessionId, TxHandle, TxMode, TxStatus};

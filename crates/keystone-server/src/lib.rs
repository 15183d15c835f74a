//! Keystone server.
//!
//! This crate puts the Keystone service on the network through two
//! front-ends sharing one [`Service`](keystone::Service):
//!
//! - [`http`] - HTTP/JSON API for sessions and transactions
//! - [`wire`] - PostgreSQL-style wire protocol for session login
//! - [`server`] - Backend setup and listener lifecycle

#![deny(clippy::unwrap_used)]

pub mod http;
pub mod server;
pub mod wire;

pub use server::{build_service, run, ServerOptions};

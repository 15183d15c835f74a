//! Keystone Server
//!
//! Session and transaction server over a redb database.

use std::path::PathBuf;
use std::time::Duration;

use anyhow::Result;
use clap::Parser;
use keystone::Config;
use keystone_server::ServerOptions;
use keystone_wire::{MessageReader, DEFAULT_MAX_FRAME_LEN};

#[derive(Parser)]
#[command(name = "keystone-server")]
#[command(about = "Session and transaction server for Keystone")]
struct Args {
    /// Path to the database file
    #[arg(long, env = "KEYSTONE_DATA", default_value = "keystone.redb")]
    data: PathBuf,

    /// Keep all data in memory instead of a file
    #[arg(long)]
    in_memory: bool,

    /// Address of the HTTP API
    #[arg(long, env = "KEYSTONE_HTTP_ADDR", default_value = "127.0.0.1:3322")]
    http_addr: String,

    /// Address of the wire-protocol listener
    #[arg(long, env = "KEYSTONE_WIRE_ADDR", default_value = "127.0.0.1:5432")]
    wire_addr: String,

    /// Disable authentication; no session can be opened
    #[arg(long)]
    no_auth: bool,

    /// Close sessions idle for longer than this many seconds
    #[arg(long, env = "KEYSTONE_IDLE_TIMEOUT_SECS")]
    idle_timeout_secs: Option<u64>,

    /// Name of the built-in sysadmin account
    #[arg(long, default_value = "immudb")]
    sysadmin_user: String,

    /// Password of the built-in sysadmin account
    #[arg(long, env = "KEYSTONE_SYSADMIN_PASSWORD", default_value = "immudb", hide_env_values = true)]
    sysadmin_password: String,

    /// Extra database to create at start (repeatable)
    #[arg(long = "database", value_name = "NAME")]
    databases: Vec<String>,

    /// Largest wire frame accepted, in bytes
    #[arg(long, default_value_t = DEFAULT_MAX_FRAME_LEN)]
    max_frame_len: usize,
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("keystone=info".parse()?)
                .add_directive("keystone_server=info".parse()?),
        )
        .init();

    let args = Args::parse();
    let config = Config::default()
        .auth_enabled(!args.no_auth)
        .sysadmin_username(args.sysadmin_user)
        .session_idle_timeout(args.idle_timeout_secs.map(Duration::from_secs));

    let options = ServerOptions {
        data_path: (!args.in_memory).then_some(args.data),
        http_addr: args.http_addr,
        wire_addr: args.wire_addr,
        config,
        sysadmin_password: args.sysadmin_password,
        databases: args.databases,
        wire_reader: MessageReader::new().max_frame_len(args.max_frame_len),
    };
    keystone_server::run(options).await
}

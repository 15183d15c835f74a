//! Server assembly: backend, identity store, service and listeners.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use keystone::{Config, MemoryIdentityStore, Service};
use keystone_storage::backends::RedbBackend;
use keystone_storage::{DatabaseCatalog, KvBackend};
use keystone_wire::MessageReader;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tracing::info;

use crate::{http, wire};

/// Everything needed to start a server.
#[derive(Debug, Clone)]
pub struct ServerOptions {
    /// Database file, or `None` to keep everything in memory.
    pub data_path: Option<PathBuf>,
    /// Address of the HTTP/JSON front-end.
    pub http_addr: String,
    /// Address of the wire-protocol front-end.
    pub wire_addr: String,
    /// Core service configuration.
    pub config: Config,
    /// Password of the built-in sysadmin account.
    pub sysadmin_password: String,
    /// Databases to create at start besides the system and default ones.
    pub databases: Vec<String>,
    /// Frame size cap for the wire front-end.
    pub wire_reader: MessageReader,
}

/// Open the backend and build the service.
///
/// # Errors
///
/// Fails if the backend cannot be opened or a database cannot be created.
pub fn build_service(options: &ServerOptions) -> Result<Arc<Service>> {
    match &options.data_path {
        Some(path) => {
            let backend = RedbBackend::open(path)
                .with_context(|| format!("failed to open database at {}", path.display()))?;
            info!(path = %path.display(), "opened database");
            create_service(options, Arc::new(backend))
        }
        None => {
            info!("using in-memory database");
            create_service(options, Arc::new(RedbBackend::in_memory()?))
        }
    }
}

fn create_service<B>(options: &ServerOptions, backend: Arc<B>) -> Result<Arc<Service>>
where
    B: KvBackend + 'static,
{
    for database in &options.databases {
        if backend.create_database(database)? {
            info!(database = %database, "created database");
        }
    }

    let users = Arc::new(MemoryIdentityStore::new());
    users.create_sysadmin(&options.config.sysadmin_username, &options.sysadmin_password)?;

    let service = Service::new(options.config.clone(), backend, users)?;
    Ok(Arc::new(service))
}

/// Run both front-ends until Ctrl-C.
///
/// # Errors
///
/// Fails if the service cannot be built or a listener cannot be bound.
pub async fn run(options: ServerOptions) -> Result<()> {
    let service = build_service(&options)?;
    let shutdown = CancellationToken::new();

    let reaper = service.spawn_reaper(shutdown.clone());

    let wire_listener = TcpListener::bind(&options.wire_addr)
        .await
        .with_context(|| format!("failed to bind wire listener on {}", options.wire_addr))?;
    info!(addr = %options.wire_addr, "wire protocol listening");
    let wire_task = tokio::spawn(wire::serve(
        wire_listener,
        Arc::clone(&service),
        options.wire_reader,
        shutdown.clone(),
    ));

    let http_listener = TcpListener::bind(&options.http_addr)
        .await
        .with_context(|| format!("failed to bind HTTP listener on {}", options.http_addr))?;
    info!(addr = %options.http_addr, server_id = %service.server_id(), "HTTP API listening");

    {
        let shutdown = shutdown.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                info!("shutting down");
            }
            shutdown.cancel();
        });
    }

    axum::serve(http_listener, http::router(Arc::clone(&service)))
        .with_graceful_shutdown({
            let shutdown = shutdown.clone();
            async move { shutdown.cancelled().await }
        })
        .await?;

    shutdown.cancel();
    wire_task.await??;
    if let Some(reaper) = reaper {
        reaper.await?;
    }
    Ok(())
}

//! The protocol-agnostic service.
//!
//! [`Service`] is the single entry point the front-ends call. Each operation
//! takes a [`CallContext`] carrying the caller's session id, cancellation
//! token and deadline, plus one request message from [`crate::protocol`].

use std::sync::Arc;
use std::time::Duration;

use keystone_core::{SessionId, TxMode};
use keystone_storage::{DatabaseCatalog, KvBackend};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};
use uuid::Uuid;

use crate::config::Config;
use crate::context::CallContext;
use crate::error::{Error, Result};
use crate::gate::{IdentityGate, IdentityStore};
use crate::metrics::ServiceMetrics;
use crate::protocol::{
    BeginTxRequest, BeginTxResponse, CommitRequest, CommitResponse, GetRequest, GetResponse,
    OpenSessionRequest, OpenSessionResponse, RollbackRequest, SetRequest,
};
use crate::session::{Session, SessionTable};
use crate::transaction::TransactionCoordinator;

/// Sessions and transactions over one storage backend.
///
/// # Example
///
/// ```ignore
/// let backend = Arc::new(MemoryBackend::new());
/// let users = Arc::new(MemoryIdentityStore::new());
/// users.create_sysadmin("immudb", "immudb")?;
/// let service = Service::new(Config::default(), backend, users)?;
///
/// let open = service
///     .open_session(&CallContext::new(), OpenSessionRequest {
///         username: "immudb".into(),
///         password: "immudb".into(),
///         database_name: "defaultdb".into(),
///     })
///     .await?;
/// let ctx = CallContext::new().with_session(open.session_id);
/// let tx = service.begin_tx(&ctx, BeginTxRequest { read_write: true }).await?;
/// ```
pub struct Service {
    config: Config,
    server_id: Uuid,
    gate: IdentityGate,
    sessions: Arc<SessionTable>,
    coordinator: TransactionCoordinator,
    metrics: Arc<ServiceMetrics>,
}

impl Service {
    /// Create a service, making sure the system and default databases exist.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Internal`] if the databases cannot be created.
    pub fn new<B>(config: Config, backend: Arc<B>, identities: Arc<dyn IdentityStore>) -> Result<Self>
    where
        B: KvBackend + 'static,
    {
        for database in [&config.system_database, &config.default_database] {
            if backend
                .create_database(database)
                .map_err(|e| Error::internal(format!("create database {database}: {e}")))?
            {
                info!(database = %database, "created database");
            }
        }

        let catalog: Arc<dyn DatabaseCatalog> = backend.clone();
        let gate = IdentityGate::new(
            identities,
            catalog,
            config.auth_enabled,
            config.system_database.clone(),
        )
        .with_sysadmin_username(config.sysadmin_username.clone());

        let metrics = Arc::new(ServiceMetrics::new());
        let coordinator = TransactionCoordinator::new(backend, Arc::clone(&metrics));
        let sessions = Arc::new(SessionTable::new());

        Ok(Self { config, server_id: Uuid::new_v4(), gate, sessions, coordinator, metrics })
    }

    /// The configuration the service was built with.
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Identifier of this server instance, fixed for the process lifetime.
    pub fn server_id(&self) -> Uuid {
        self.server_id
    }

    /// The live session registry.
    pub fn sessions(&self) -> &SessionTable {
        &self.sessions
    }

    /// The transaction coordinator.
    pub fn coordinator(&self) -> &TransactionCoordinator {
        &self.coordinator
    }

    /// Session and transaction counters.
    pub fn metrics(&self) -> &ServiceMetrics {
        &self.metrics
    }

    /// Authenticate and open a session.
    ///
    /// # Errors
    ///
    /// [`Error::AuthDisabled`], [`Error::InvalidCredentials`],
    /// [`Error::UserInactive`], [`Error::UnknownDatabase`],
    /// [`Error::PermissionDenied`] or [`Error::SessionAlreadyPresent`].
    pub async fn open_session(
        &self,
        ctx: &CallContext,
        request: OpenSessionRequest,
    ) -> Result<OpenSessionResponse> {
        let database = if request.database_name.is_empty() {
            self.config.default_database.clone()
        } else {
            request.database_name
        };

        let identity =
            ctx.run(self.gate.authenticate(&request.username, &request.password, &database)).await?;
        let session_id = self.sessions.open(identity, &database)?;
        self.metrics.record_session_opened();

        info!(session = %session_id, username = %request.username, database = %database, "session opened");
        Ok(OpenSessionResponse { server_instance_id: self.server_id.to_string(), session_id })
    }

    /// Close the caller's session, rolling back any open transaction.
    ///
    /// # Errors
    ///
    /// [`Error::AuthDisabled`] or [`Error::NoSessionFound`].
    pub async fn close_session(&self, ctx: &CallContext) -> Result<()> {
        self.ensure_auth()?;
        let id = ctx.require_session()?;
        self.close(id).await?;
        self.metrics.record_session_closed();

        info!(session = %id, "session closed");
        Ok(())
    }

    /// Start a transaction in the caller's session.
    ///
    /// # Errors
    ///
    /// Session errors, [`Error::TransactionAlreadyOpen`] or
    /// [`Error::PermissionDenied`] for a read-write transaction without a
    /// write grant.
    pub async fn begin_tx(&self, ctx: &CallContext, request: BeginTxRequest) -> Result<BeginTxResponse> {
        let session = self.session(ctx)?;
        let mode = TxMode::from_read_write(request.read_write);
        let tx_handle = ctx.run(self.coordinator.begin(&session, mode)).await?;
        Ok(BeginTxResponse { tx_handle })
    }

    /// Buffer a write.
    ///
    /// # Errors
    ///
    /// Session errors, [`Error::ReadOnlyViolation`] or a handle error.
    pub async fn set(&self, ctx: &CallContext, request: SetRequest) -> Result<()> {
        let session = self.session(ctx)?;
        ctx.run(self.coordinator.set(&session, request.tx_handle, request.key, request.value)).await
    }

    /// Read a key. Returns `None` if the key has no value.
    ///
    /// # Errors
    ///
    /// Session errors, handle errors or [`Error::Backend`].
    pub async fn get(&self, ctx: &CallContext, request: GetRequest) -> Result<Option<GetResponse>> {
        let session = self.session(ctx)?;
        let key = request.key.clone();
        let value = self.coordinator.get(ctx, &session, request.tx_handle, request.key).await?;
        Ok(value.map(|value| GetResponse { key, value }))
    }

    /// Commit the transaction.
    ///
    /// # Errors
    ///
    /// Session errors, handle errors, [`Error::Cancelled`] or
    /// [`Error::DeadlineExceeded`] if the commit never started, or
    /// [`Error::Backend`].
    pub async fn commit(&self, ctx: &CallContext, request: CommitRequest) -> Result<CommitResponse> {
        let session = self.session(ctx)?;
        let commit_token = self.coordinator.commit(ctx, &session, request.tx_handle).await?;
        Ok(CommitResponse { commit_token })
    }

    /// Roll back the transaction. Succeeds for a transaction that already
    /// finished.
    ///
    /// # Errors
    ///
    /// Session errors, [`Error::NoTransactionFound`] or
    /// [`Error::TransactionNotOwned`].
    pub async fn rollback(&self, ctx: &CallContext, request: RollbackRequest) -> Result<()> {
        let session = self.session(ctx)?;
        self.coordinator.rollback(&session, request.tx_handle).await
    }

    /// Close every session idle longer than the configured timeout.
    ///
    /// Returns the number of sessions closed. Does nothing when no timeout is
    /// configured.
    pub fn expire_idle_sessions(&self) -> usize {
        let Some(timeout) = self.config.session_idle_timeout else {
            return 0;
        };

        let expired = self.sessions.expire_idle(timeout);
        for (id, aborted) in &expired {
            if let Some(handle) = aborted {
                self.coordinator.release(*handle);
            }
            self.metrics.record_session_expired();
            info!(session = %id, rolled_back = ?aborted, "idle session expired");
        }
        expired.len()
    }

    /// Start the idle session reaper.
    ///
    /// Returns `None` when idle expiry is disabled. The task stops when
    /// `shutdown` is cancelled.
    pub fn spawn_reaper(self: &Arc<Self>, shutdown: CancellationToken) -> Option<JoinHandle<()>> {
        let timeout = self.config.session_idle_timeout?;
        let period = self.config.reaper_interval.max(Duration::from_millis(10));
        let service = Arc::clone(self);

        info!(?timeout, ?period, "starting idle session reaper");
        Some(tokio::spawn(async move {
            let mut interval = tokio::time::interval(period);
            interval.set_missed_tick_behavior(MissedTickBehavior::Skip);

            loop {
                tokio::select! {
                    biased;
                    () = shutdown.cancelled() => {
                        debug!("idle session reaper stopped");
                        break;
                    }
                    _ = interval.tick() => {
                        service.expire_idle_sessions();
                    }
                }
            }
        }))
    }

    async fn close(&self, id: &SessionId) -> Result<()> {
        if let Some(handle) = self.sessions.close(id).await? {
            self.coordinator.release(handle);
        }
        Ok(())
    }

    fn session(&self, ctx: &CallContext) -> Result<Arc<Session>> {
        self.ensure_auth()?;
        let id = ctx.require_session()?;
        self.sessions.lookup(id)
    }

    fn ensure_auth(&self) -> Result<()> {
        if self.gate.auth_enabled() {
            Ok(())
        } else {
            Err(Error::AuthDisabled)
        }
    }
}

impl std::fmt::Debug for Service {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Service")
            .field("server_id", &self.server_id)
            .field("sessions", &self.sessions.len())
            .finish_non_exhaustive()
    }
}

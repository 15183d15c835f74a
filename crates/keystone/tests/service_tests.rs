//! Session lifecycle and end-to-end integration tests.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use keystone::protocol::{
    BeginTxRequest, CommitRequest, GetRequest, OpenSessionRequest, OpenSessionResponse, SetRequest,
};
use keystone::{CallContext, Config, Error, ErrorKind, Identity, MemoryIdentityStore, Permission, Service};
use keystone_storage::backends::{MemoryBackend, RedbBackend};
use keystone_storage::{DatabaseCatalog, KvBackend};
use tempfile::tempdir;
use tokio_util::sync::CancellationToken;

const TEST_COST: u32 = 4;

fn create_users() -> Arc<MemoryIdentityStore> {
    let users = Arc::new(MemoryIdentityStore::with_cost(TEST_COST));
    users.create_sysadmin("immudb", "immudb").expect("create sysadmin");
    users
        .create_user(Identity::new("alice").with_grant("sales", Permission::ReadWrite), "alice-pw")
        .expect("create alice");
    users
}

fn create_service(config: Config) -> (Arc<MemoryBackend>, Arc<MemoryIdentityStore>, Arc<Service>) {
    let users = create_users();
    let backend = Arc::new(MemoryBackend::with_databases(["sales", "hr"]).expect("backend"));
    let service = Service::new(config, Arc::clone(&backend), users.clone()).expect("service");
    (backend, users, Arc::new(service))
}

fn login(username: &str, password: &str, database: &str) -> OpenSessionRequest {
    OpenSessionRequest {
        username: username.into(),
        password: password.into(),
        database_name: database.into(),
    }
}

async fn open(service: &Service, request: OpenSessionRequest) -> keystone::Result<OpenSessionResponse> {
    service.open_session(&CallContext::new(), request).await
}

// ============================================================================
// End-to-end
// ============================================================================

/// The default sysadmin logs in, writes, reads back, commits and closes
#[tokio::test]
async fn test_end_to_end_scenario() {
    let (backend, _, service) = create_service(Config::default());

    let opened = open(&service, login("immudb", "immudb", "defaultdb")).await.expect("open");
    assert_eq!(opened.server_instance_id, service.server_id().to_string());
    let ctx = CallContext::new().with_session(opened.session_id.clone());

    let tx = service.begin_tx(&ctx, BeginTxRequest { read_write: true }).await.expect("begin").tx_handle;
    service
        .set(&ctx, SetRequest { tx_handle: tx, key: b"k1".to_vec(), value: b"v1".to_vec() })
        .await
        .expect("set");

    let got = service
        .get(&ctx, GetRequest { tx_handle: tx, key: b"k1".to_vec() })
        .await
        .expect("get")
        .expect("value present");
    assert_eq!(got.key, b"k1");
    assert_eq!(got.value, b"v1");

    let commit = service.commit(&ctx, CommitRequest { tx_handle: tx }).await.expect("commit");
    assert_eq!(commit.commit_token.entries, 1);

    service.close_session(&ctx).await.expect("close");
    assert!(service.sessions().is_empty());
    assert_eq!(backend.read("defaultdb", b"k1").expect("read"), Some(b"v1".to_vec()));

    let snapshot = service.metrics().snapshot();
    assert_eq!(snapshot.sessions_opened, 1);
    assert_eq!(snapshot.sessions_closed, 1);
    assert_eq!(snapshot.sessions_active, 0);
    assert_eq!(snapshot.transactions_committed, 1);
}

/// Commits land in the durable backend and survive a restart
#[tokio::test]
async fn test_end_to_end_on_redb() {
    let dir = tempdir().expect("tempdir");
    let path = dir.path().join("keystone.redb");

    {
        let backend = Arc::new(RedbBackend::open(&path).expect("open redb"));
        let service = Service::new(Config::default(), backend, create_users()).expect("service");

        let opened = open(&service, login("immudb", "immudb", "defaultdb")).await.expect("open");
        let ctx = CallContext::new().with_session(opened.session_id);
        let tx = service.begin_tx(&ctx, BeginTxRequest { read_write: true }).await.expect("begin").tx_handle;
        service
            .set(&ctx, SetRequest { tx_handle: tx, key: b"durable".to_vec(), value: b"yes".to_vec() })
            .await
            .expect("set");
        service.commit(&ctx, CommitRequest { tx_handle: tx }).await.expect("commit");
        service.close_session(&ctx).await.expect("close");
    }

    let backend = RedbBackend::open(&path).expect("reopen redb");
    assert!(backend.database_exists("systemdb").expect("catalog"));
    assert_eq!(backend.read("defaultdb", b"durable").expect("read"), Some(b"yes".to_vec()));
}

// ============================================================================
// Session open
// ============================================================================

/// Every open fails with AuthDisabled when authentication is off
#[tokio::test]
async fn test_auth_disabled() {
    let (_, _, service) = create_service(Config::default().auth_enabled(false));

    for request in [login("immudb", "immudb", "defaultdb"), login("ghost", "", "nope")] {
        let err = open(&service, request).await.unwrap_err();
        assert!(matches!(err, Error::AuthDisabled));
        assert_eq!(err.kind(), ErrorKind::AuthDisabled);
    }

    let ctx = CallContext::new();
    let err = service.begin_tx(&ctx, BeginTxRequest { read_write: true }).await.unwrap_err();
    assert!(matches!(err, Error::AuthDisabled));
    assert!(matches!(service.close_session(&ctx).await.unwrap_err(), Error::AuthDisabled));
}

/// Login failures are reported in check order
#[tokio::test]
async fn test_open_session_failures() {
    let (_, users, service) = create_service(Config::default());

    let err = open(&service, login("alice", "wrong", "sales")).await.unwrap_err();
    assert!(matches!(err, Error::InvalidCredentials));

    let err = open(&service, login("alice", "alice-pw", "missing")).await.unwrap_err();
    assert!(matches!(err, Error::UnknownDatabase { ref database } if database == "missing"));

    let err = open(&service, login("alice", "alice-pw", "hr")).await.unwrap_err();
    assert!(matches!(err, Error::PermissionDenied { ref database } if database == "hr"));

    users.set_active("alice", false).expect("deactivate");
    let err = open(&service, login("alice", "alice-pw", "sales")).await.unwrap_err();
    assert!(matches!(err, Error::UserInactive));

    assert!(service.sessions().is_empty());
    assert_eq!(service.metrics().snapshot().sessions_opened, 0);
}

/// An empty database name selects the default database
#[tokio::test]
async fn test_default_database() {
    let (_, _, service) = create_service(Config::default());

    let opened = open(&service, login("immudb", "immudb", "")).await.expect("open");
    let session = service.sessions().lookup(&opened.session_id).expect("lookup");
    assert_eq!(session.database(), "defaultdb");
}

/// The system database is reachable even though only sysadmins hold it
#[tokio::test]
async fn test_system_database() {
    let (_, _, service) = create_service(Config::default());

    open(&service, login("immudb", "immudb", "systemdb")).await.expect("sysadmin");
    let err = open(&service, login("alice", "alice-pw", "systemdb")).await.unwrap_err();
    assert!(matches!(err, Error::PermissionDenied { .. }));
}

/// Concurrent opens yield distinct sessions
#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_opens_are_distinct() {
    let (_, _, service) = create_service(Config::default());

    let tasks: Vec<_> = (0..16)
        .map(|_| {
            let service = Arc::clone(&service);
            tokio::spawn(async move {
                open(&service, login("alice", "alice-pw", "sales")).await.expect("open").session_id
            })
        })
        .collect();

    let mut ids = HashSet::new();
    for task in tasks {
        ids.insert(task.await.expect("join"));
    }
    assert_eq!(ids.len(), 16);
    assert_eq!(service.sessions().len(), 16);
}

// ============================================================================
// Session close
// ============================================================================

/// Closing with an open transaction rolls it back and writes nothing
#[tokio::test]
async fn test_close_with_open_transaction_leaves_backend_unchanged() {
    let (backend, _, service) = create_service(Config::default());

    let opened = open(&service, login("alice", "alice-pw", "sales")).await.expect("open");
    let ctx = CallContext::new().with_session(opened.session_id);
    let tx = service.begin_tx(&ctx, BeginTxRequest { read_write: true }).await.expect("begin").tx_handle;
    service
        .set(&ctx, SetRequest { tx_handle: tx, key: b"k".to_vec(), value: b"v".to_vec() })
        .await
        .expect("set");

    service.close_session(&ctx).await.expect("close");

    assert_eq!(backend.apply_count(), 0);
    assert_eq!(backend.read("sales", b"k").expect("read"), None);
    assert_eq!(service.coordinator().open_count(), 0);
    assert_eq!(service.metrics().snapshot().transactions_rolled_back, 1);
}

/// Calls on a closed or missing session fail with NoSessionFound
#[tokio::test]
async fn test_no_session_found() {
    let (_, _, service) = create_service(Config::default());

    let err = service.begin_tx(&CallContext::new(), BeginTxRequest::default()).await.unwrap_err();
    assert!(matches!(err, Error::NoSessionFound { session: None }));

    let opened = open(&service, login("immudb", "immudb", "defaultdb")).await.expect("open");
    let ctx = CallContext::new().with_session(opened.session_id.clone());
    service.close_session(&ctx).await.expect("close");

    let err = service.begin_tx(&ctx, BeginTxRequest::default()).await.unwrap_err();
    assert!(matches!(err, Error::NoSessionFound { session: Some(ref s) } if *s == opened.session_id));
    assert!(matches!(service.close_session(&ctx).await.unwrap_err(), Error::NoSessionFound { .. }));
}

// ============================================================================
// Idle expiry
// ============================================================================

/// Idle expiry is off unless configured
#[tokio::test]
async fn test_reaper_disabled_by_default() {
    let (_, _, service) = create_service(Config::default());
    open(&service, login("immudb", "immudb", "defaultdb")).await.expect("open");

    assert!(service.spawn_reaper(CancellationToken::new()).is_none());
    assert_eq!(service.expire_idle_sessions(), 0);
    assert_eq!(service.sessions().len(), 1);
}

/// The reaper closes idle sessions and rolls back their transactions
#[tokio::test]
async fn test_reaper_expires_idle_sessions() {
    let config = Config::default()
        .session_idle_timeout(Some(Duration::from_millis(50)))
        .reaper_interval(Duration::from_millis(10));
    let (backend, _, service) = create_service(config);

    let opened = open(&service, login("immudb", "immudb", "defaultdb")).await.expect("open");
    let ctx = CallContext::new().with_session(opened.session_id);
    let tx = service.begin_tx(&ctx, BeginTxRequest { read_write: true }).await.expect("begin").tx_handle;
    service
        .set(&ctx, SetRequest { tx_handle: tx, key: b"k".to_vec(), value: b"v".to_vec() })
        .await
        .expect("set");

    let shutdown = CancellationToken::new();
    let reaper = service.spawn_reaper(shutdown.clone()).expect("reaper enabled");

    tokio::time::sleep(Duration::from_millis(200)).await;
    assert!(service.sessions().is_empty());
    assert_eq!(backend.apply_count(), 0);

    let snapshot = service.metrics().snapshot();
    assert_eq!(snapshot.sessions_expired, 1);
    assert_eq!(snapshot.sessions_active, 0);

    let err = service.commit(&ctx, CommitRequest { tx_handle: tx }).await.unwrap_err();
    assert!(matches!(err, Error::NoSessionFound { .. }));

    shutdown.cancel();
    reaper.await.expect("reaper stops");
}

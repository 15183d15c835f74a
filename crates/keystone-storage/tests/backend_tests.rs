//! Tests for the backend traits.
//!
//! These tests validate the trait contracts and can be run against
//! any backend implementation.

use keystone_storage::{DatabaseCatalog, KvBackend, StorageError, StorageResult};

/// A test harness trait for testing backend implementations.
pub trait TestHarness {
    /// The backend type being tested.
    type Backend: KvBackend;

    /// Create a new backend with no databases.
    fn create_backend() -> StorageResult<Self::Backend>;
}

/// Run the standard test suite against a backend.
///
/// # Example
///
/// ```ignore
/// struct RedbHarness;
///
/// impl TestHarness for RedbHarness {
///     type Backend = RedbBackend;
///
///     fn create_backend() -> StorageResult<Self::Backend> {
///         RedbBackend::in_memory()
///     }
/// }
///
/// #[test]
/// fn test_redb_compliance() {
///     run_test_suite::<RedbHarness>();
/// }
/// ```
pub fn run_test_suite<H: TestHarness>() {
    test_catalog::<H>();
    test_apply_and_read::<H>();
    test_database_isolation::<H>();
    test_unknown_database::<H>();
    test_commit_sequence::<H>();
}

fn create<H: TestHarness>() -> H::Backend {
    let backend = H::create_backend().expect("failed to create backend");
    backend.create_database("defaultdb").expect("failed to create database");
    backend
}

/// Databases are created once and listed in order.
fn test_catalog<H: TestHarness>() {
    let backend = H::create_backend().expect("failed to create backend");

    assert!(!backend.database_exists("zeta").expect("exists"));
    assert!(backend.create_database("zeta").expect("create"));
    assert!(backend.create_database("alpha").expect("create"));
    assert!(!backend.create_database("zeta").expect("create again"));

    assert_eq!(backend.list_databases().expect("list"), vec!["alpha", "zeta"]);

    let err = backend.create_database("no spaces").unwrap_err();
    assert!(matches!(err, StorageError::InvalidDatabaseName(_)));
}

/// A write-set becomes visible as a whole and later writes overwrite.
fn test_apply_and_read<H: TestHarness>() {
    let backend = create::<H>();

    assert_eq!(backend.read("defaultdb", b"key1").expect("read"), None);

    let writes = vec![
        (b"key1".to_vec(), b"value1".to_vec()),
        (b"key2".to_vec(), b"value2".to_vec()),
    ];
    let token = backend.apply("defaultdb", &writes).expect("apply");
    assert_eq!(token.entries, 2);
    assert!(!token.is_noop());

    assert_eq!(backend.read("defaultdb", b"key1").expect("read"), Some(b"value1".to_vec()));
    assert_eq!(backend.read("defaultdb", b"key2").expect("read"), Some(b"value2".to_vec()));

    backend.apply("defaultdb", &[(b"key1".to_vec(), b"updated".to_vec())]).expect("apply");
    assert_eq!(backend.read("defaultdb", b"key1").expect("read"), Some(b"updated".to_vec()));
    assert_eq!(backend.read("defaultdb", b"key2").expect("read"), Some(b"value2".to_vec()));
}

/// The same key in two databases holds two values.
fn test_database_isolation<H: TestHarness>() {
    let backend = create::<H>();
    backend.create_database("other").expect("create");

    backend.apply("defaultdb", &[(b"k".to_vec(), b"default".to_vec())]).expect("apply");
    backend.apply("other", &[(b"k".to_vec(), b"other".to_vec())]).expect("apply");

    assert_eq!(backend.read("defaultdb", b"k").expect("read"), Some(b"default".to_vec()));
    assert_eq!(backend.read("other", b"k").expect("read"), Some(b"other".to_vec()));
}

/// Reads and writes against a missing database fail without side effects.
fn test_unknown_database<H: TestHarness>() {
    let backend = create::<H>();
    let before = backend.last_commit().expect("last commit");

    let err = backend.read("missing", b"k").unwrap_err();
    assert!(matches!(err, StorageError::DatabaseNotFound(ref name) if name == "missing"));

    let err = backend.apply("missing", &[(b"k".to_vec(), b"v".to_vec())]).unwrap_err();
    assert!(matches!(err, StorageError::DatabaseNotFound(_)));
    assert_eq!(backend.last_commit().expect("last commit"), before);
}

/// Every commit gets a strictly larger sequence number.
fn test_commit_sequence<H: TestHarness>() {
    let backend = create::<H>();
    assert_eq!(backend.last_commit().expect("last commit"), 0);

    let mut previous = 0;
    for i in 0..5u8 {
        let token = backend.apply("defaultdb", &[(vec![i], vec![i])]).expect("apply");
        assert!(token.id > previous);
        previous = token.id;
    }
    assert_eq!(backend.last_commit().expect("last commit"), previous);
}

// ============================================================================
// Object safety
// ============================================================================

#[test]
fn test_backend_object_safety() {
    fn _assert_object_safe(_: &dyn KvBackend) {}
}

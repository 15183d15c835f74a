//! Tests for the Redb backend.
//!
//! Runs the standard backend compliance tests against Redb, plus
//! Redb-specific tests.

mod backend_tests;

use std::sync::Arc;
use std::thread;

use keystone_storage::backends::RedbBackend;
use keystone_storage::{DatabaseCatalog, KvBackend, StorageResult};

use backend_tests::{run_test_suite, TestHarness};

/// Test harness for the Redb in-memory backend.
struct RedbHarness;

impl TestHarness for RedbHarness {
    type Backend = RedbBackend;

    fn create_backend() -> StorageResult<Self::Backend> {
        RedbBackend::in_memory()
    }
}

#[test]
fn test_redb_compliance() {
    run_test_suite::<RedbHarness>();
}

#[test]
fn test_catalog_survives_reopen() {
    let dir = tempfile::tempdir().expect("failed to create temp dir");
    let path = dir.path().join("catalog.redb");

    {
        let backend = RedbBackend::open(&path).expect("failed to open");
        backend.create_database("systemdb").expect("create");
        backend.create_database("defaultdb").expect("create");
    }

    let backend = RedbBackend::open(&path).expect("failed to reopen");
    assert_eq!(backend.list_databases().expect("list"), vec!["defaultdb", "systemdb"]);
}

#[test]
fn test_large_values() {
    let backend = RedbBackend::in_memory().expect("failed to create backend");
    backend.create_database("defaultdb").expect("create");

    let large = vec![0xAB; 1024 * 1024];
    backend.apply("defaultdb", &[(b"blob".to_vec(), large.clone())]).expect("apply");

    assert_eq!(backend.read("defaultdb", b"blob").expect("read"), Some(large));
}

#[test]
fn test_concurrent_writers_get_distinct_sequences() {
    let backend = Arc::new(RedbBackend::in_memory().expect("failed to create backend"));
    backend.create_database("defaultdb").expect("create");

    let handles: Vec<_> = (0..8u8)
        .map(|i| {
            let backend = Arc::clone(&backend);
            thread::spawn(move || {
                backend.apply("defaultdb", &[(vec![i], vec![i])]).expect("apply").id
            })
        })
        .collect();

    let mut ids: Vec<u64> = handles.into_iter().map(|h| h.join().expect("join")).collect();
    ids.sort_unstable();
    ids.dedup();
    assert_eq!(ids.len(), 8);
    assert_eq!(backend.last_commit().expect("last commit"), 8);
}

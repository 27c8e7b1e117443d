#![allow(clippy::expect_used, clippy::panic)]
//! Integration tests for fail-point injection in the identity crate.
//!
//! These tests require the `failpoints` feature:
//! ```bash
//! cargo test -p tessera-identity --features failpoints --test failpoint_tests
//! ```

use std::{sync::Arc, time::Duration};

use tessera_identity::{ErrorKind, IdentityConfig, IdentityError, IdentityService};
use tessera_storage::{
    MemoryUserDirectory,
    auth::{MemorySignatureSetStore, SignatureSetStore, audit::NoopAuditLogger},
    testutil::app_id,
};

async fn setup() -> (IdentityService, MemorySignatureSetStore) {
    let sets = MemorySignatureSetStore::new();
    let service = IdentityService::builder()
        .config(IdentityConfig::builder().identity_application("identity-v1").build())
        .users(Arc::new(MemoryUserDirectory::new()))
        .signature_sets(Arc::new(sets.clone()))
        .audit_logger(Arc::new(NoopAuditLogger))
        .build()
        .expect("valid service");
    service.register_application(&app_id("office")).await.expect("register");
    (service, sets)
}

#[tokio::test]
async fn failure_between_generation_and_insert_stores_nothing() {
    let scenario = fail::FailScenario::setup();
    let (service, sets) = setup().await;
    let office = app_id("office");

    fail::cfg("registry-before-insert", "return").expect("failed to configure fail point");
    let err = service.create_signature_set(&office).await.expect_err("insert must not happen");
    assert_eq!(err.kind(), ErrorKind::Fatal);
    assert!(sets.list_signature_sets(&office).await.expect("list").is_empty());
    assert!(sets.latest_signature_set(&office).await.expect("latest").is_none());

    fail::remove("registry-before-insert");
    let view = service.create_signature_set(&office).await.expect("create after recovery");
    assert_eq!(service.get_all_signature_sets(&office).await.expect("list"), vec![view.timestamp]);

    scenario.teardown();
}

#[tokio::test]
async fn entropy_failure_is_fatal_and_not_retried() {
    let scenario = fail::FailScenario::setup();
    let (service, sets) = setup().await;
    let office = app_id("office");

    fail::cfg("key-generation-entropy", "return").expect("failed to configure fail point");
    let err = service.create_signature_set(&office).await.expect_err("no entropy");
    assert!(matches!(err, IdentityError::Auth(_)), "unexpected error: {err}");
    assert_eq!(err.kind(), ErrorKind::Fatal);
    assert!(!err.is_retryable());
    assert!(sets.list_signature_sets(&office).await.expect("list").is_empty());

    fail::remove("key-generation-entropy");
    service.create_signature_set(&office).await.expect("create after recovery");

    scenario.teardown();
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn reads_stay_prompt_while_create_is_held_before_insert() {
    let scenario = fail::FailScenario::setup();
    let (service, _sets) = setup().await;
    let service = Arc::new(service);
    let office = app_id("office");
    let existing = service.create_signature_set(&office).await.expect("create").timestamp;

    fail::cfg("registry-before-insert", "sleep(600)").expect("failed to configure fail point");
    let create = tokio::spawn({
        let service = Arc::clone(&service);
        let office = office.clone();
        async move { service.create_signature_set(&office).await }
    });
    tokio::time::sleep(Duration::from_millis(100)).await;

    let listed = tokio::time::timeout(Duration::from_millis(100), service.get_all_signature_sets(&office))
        .await
        .expect("list must not block behind the held create")
        .expect("list");
    assert_eq!(listed, vec![existing]);
    tokio::time::timeout(Duration::from_millis(100), service.get_signature_set(&office, existing))
        .await
        .expect("get must not block behind the held create")
        .expect("get");
    assert!(!create.is_finished(), "create should still be held");

    fail::remove("registry-before-insert");
    let created = create.await.expect("task panicked").expect("create resumes");
    assert!(created.timestamp > existing);

    scenario.teardown();
}

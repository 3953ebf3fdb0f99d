//! RUN-scoped resources: one instance per identity for the whole run.

mod common;

use common::{declaration, fixture, scripts};
use errors::LifecycleError;
use hb_core::{MigrationPolicy, MigrationScope, ResourceDeclaration, Scope};
use std::sync::Arc;

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_classes_share_one_instance() {
    let fx = fixture();
    let provider = fx.provider.clone();

    let mut tasks = Vec::new();
    for i in 0..8 {
        let coordinator = Arc::clone(&fx.coordinator);
        let class = fx.run.class(format!("ParallelTest{}", i));
        tasks.push(tokio::spawn(async move {
            coordinator.declare(&class, declaration(Scope::Run, MigrationPolicy::none()));
            coordinator.before_all(&class).await.unwrap();
            let id = coordinator.resolve_handle(&class).await.unwrap().id();
            coordinator.after_all(&class).await.unwrap();
            id
        }));
    }

    let mut ids = Vec::new();
    for task in tasks {
        ids.push(task.await.unwrap());
    }
    ids.sort_unstable();
    ids.dedup();
    assert_eq!(ids.len(), 1);
    assert_eq!(provider.created(), 1);
    assert_eq!(provider.running(), 1);

    let report = fx.run.finish().await;
    assert_eq!(report.stopped, 1);
    assert_eq!(provider.running(), 0);
}

#[tokio::test]
async fn test_same_identity_different_network_gets_own_instance() {
    let fx = fixture();
    let plain = fx.run.class("PlainTest");
    let networked = fx.run.class("NetworkedTest");
    fx.coordinator
        .declare(&plain, declaration(Scope::Run, MigrationPolicy::none()));
    fx.coordinator.declare(
        &networked,
        ResourceDeclaration::new(common::IMAGE, Scope::Run).with_shared_network(Some("db".to_string()))
    );

    let a = fx.coordinator.resolve_handle(&plain).await.unwrap();
    let b = fx.coordinator.resolve_handle(&networked).await.unwrap();
    assert_ne!(a.id(), b.id());
    assert_eq!(b.key().network_alias(), Some("db"));

    fx.run.finish().await;
    assert_eq!(fx.provider.stopped(), 2);
}

#[tokio::test]
async fn test_class_migrations_apply_and_drop_around_each_class() {
    let fx = fixture();
    let policy = scripts("schema", MigrationScope::PerClass, MigrationScope::PerClass);

    let first = fx.run.class("FirstRun");
    fx.coordinator.declare(&first, declaration(Scope::Run, policy.clone()));
    fx.coordinator.before_all(&first).await.unwrap();
    let method = first.method("inserts");
    let conn = fx.coordinator.resolve_connection(&method).await.unwrap();
    conn.database()
        .execute("INSERT INTO users VALUES (1, 'ada')")
        .unwrap();
    assert_eq!(conn.count("users").unwrap(), 1);
    fx.coordinator.after_each(&method).await.unwrap();
    fx.coordinator.after_all(&first).await.unwrap();
    assert!(!conn.has_table("users"));

    let second = fx.run.class("SecondRun");
    fx.coordinator.declare(&second, declaration(Scope::Run, policy));
    fx.coordinator.before_all(&second).await.unwrap();
    let conn = fx.coordinator.resolve_connection(&second).await.unwrap();
    assert_eq!(conn.count("users").unwrap(), 0);
    fx.coordinator.after_all(&second).await.unwrap();

    assert_eq!(fx.provider.created(), 1);
    fx.run.finish().await;
}

#[tokio::test]
async fn test_class_migrations_without_drop_apply_once() {
    let fx = fixture();
    let policy = scripts("schema", MigrationScope::PerClass, MigrationScope::None);

    for name in ["FirstTest", "SecondTest", "ThirdTest"] {
        let class = fx.run.class(name);
        fx.coordinator.declare(&class, declaration(Scope::Run, policy.clone()));
        fx.coordinator.before_all(&class).await.unwrap();
        fx.coordinator.after_all(&class).await.unwrap();
    }

    let probe = fx.run.class("Probe");
    fx.coordinator.declare(&probe, declaration(Scope::Run, MigrationPolicy::none()));
    let conn = fx.coordinator.resolve_connection(&probe).await.unwrap();
    assert!(conn.has_table("users"));
    fx.run.finish().await;
}

#[tokio::test]
async fn test_failed_creation_is_retried_by_next_class() {
    let fx = fixture();
    fx.provider.fail_starts(true);

    let first = fx.run.class("FirstTest");
    fx.coordinator.declare(&first, declaration(Scope::Run, MigrationPolicy::none()));
    let err = fx.coordinator.before_all(&first).await.unwrap_err();
    assert!(matches!(err, LifecycleError::ResourceStartError { .. }), "{}", err);
    assert!(fx.run.registry().is_empty());

    fx.provider.fail_starts(false);
    let second = fx.run.class("SecondTest");
    fx.coordinator.declare(&second, declaration(Scope::Run, MigrationPolicy::none()));
    fx.coordinator.before_all(&second).await.unwrap();
    assert_eq!(fx.run.registry().len(), 1);
    assert_eq!(fx.provider.running(), 1);

    fx.run.finish().await;
    assert_eq!(fx.provider.running(), 0);
}

#[tokio::test]
async fn test_overlapping_classes_keep_schema_until_last_finishes() {
    let fx = fixture();
    let policy = scripts("schema", MigrationScope::PerClass, MigrationScope::PerClass);

    let a = fx.run.class("OverlapA");
    let b = fx.run.class("OverlapB");
    fx.coordinator.declare(&a, declaration(Scope::Run, policy.clone()));
    fx.coordinator.declare(&b, declaration(Scope::Run, policy.clone()));

    fx.coordinator.before_all(&a).await.unwrap();
    fx.coordinator.before_all(&b).await.unwrap();
    fx.coordinator.after_all(&a).await.unwrap();

    let method = b.method("still_running");
    let conn = fx.coordinator.resolve_connection(&method).await.unwrap();
    assert!(conn.has_table("users"));
    conn.database().execute("INSERT INTO users VALUES (1, 'ada')").unwrap();
    fx.coordinator.after_each(&method).await.unwrap();

    fx.coordinator.after_all(&b).await.unwrap();
    assert!(!conn.has_table("users"));

    let c = fx.run.class("OverlapC");
    fx.coordinator.declare(&c, declaration(Scope::Run, policy));
    let conn = fx.coordinator.resolve_connection(&c).await.unwrap();
    assert_eq!(conn.count("users").unwrap(), 0);
    fx.coordinator.after_all(&c).await.unwrap();

    assert_eq!(fx.provider.created(), 1);
    fx.run.finish().await;
}

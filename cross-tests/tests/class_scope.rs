//! CLASS-scoped resources: one instance per test class.

mod common;

use common::{declaration, fixture, scripts};
use hb_core::{MigrationPolicy, MigrationScope, Scope};

#[tokio::test]
async fn test_classes_are_isolated() {
    let fx = fixture();
    let policy = scripts("schema", MigrationScope::PerClass, MigrationScope::None);

    let first = fx.run.class("FirstTest");
    let second = fx.run.class("SecondTest");
    fx.coordinator.declare(&first, declaration(Scope::Class, policy.clone()));
    fx.coordinator.declare(&second, declaration(Scope::Class, policy));

    fx.coordinator.before_all(&first).await.unwrap();
    fx.coordinator.before_all(&second).await.unwrap();

    let a = fx.coordinator.resolve_connection(&first.method("m")).await.unwrap();
    let b = fx.coordinator.resolve_connection(&second.method("m")).await.unwrap();
    a.database().execute("INSERT INTO users VALUES (1, 'ada')").unwrap();

    assert_eq!(a.count("users").unwrap(), 1);
    assert_eq!(b.count("users").unwrap(), 0);
    assert_eq!(fx.provider.running(), 2);

    fx.coordinator.after_all(&first).await.unwrap();
    fx.coordinator.after_all(&second).await.unwrap();
    assert_eq!(fx.provider.running(), 0);
}

#[tokio::test]
async fn test_methods_of_a_class_share_its_instance() {
    let fx = fixture();
    let class = fx.run.class("SharedTest");
    fx.coordinator
        .declare(&class, declaration(Scope::Class, MigrationPolicy::none()));

    fx.coordinator.before_all(&class).await.unwrap();
    let mut ids = Vec::new();
    for name in ["a", "b", "c"] {
        let method = class.method(name);
        fx.coordinator.before_each(&method).await.unwrap();
        ids.push(fx.coordinator.resolve_handle(&method).await.unwrap().id());
        fx.coordinator.after_each(&method).await.unwrap();
    }
    ids.dedup();
    assert_eq!(ids.len(), 1);

    fx.coordinator.after_all(&class).await.unwrap();
    assert_eq!(fx.provider.created(), 1);
    assert_eq!(fx.provider.stopped(), 1);
}

#[tokio::test]
async fn test_method_migrations_leave_no_data_behind() {
    let fx = fixture();
    let class = fx.run.class("CleanSlateTest");
    fx.coordinator.declare(
        &class,
        declaration(
            Scope::Class,
            scripts("schema", MigrationScope::PerMethod, MigrationScope::PerMethod)
        )
    );
    fx.coordinator.before_all(&class).await.unwrap();

    for (i, name) in ["first", "second"].into_iter().enumerate() {
        let method = class.method(name);
        fx.coordinator.before_each(&method).await.unwrap();
        let conn = fx.coordinator.resolve_connection(&method).await.unwrap();
        assert_eq!(conn.count("users").unwrap(), 0, "method {}", i);
        conn.database()
            .execute("INSERT INTO users VALUES (1, 'ada'), (2, 'grace')")
            .unwrap();
        assert_eq!(conn.count("users").unwrap(), 2);
        fx.coordinator.after_each(&method).await.unwrap();
        assert!(!conn.has_table("users"));
    }

    fx.coordinator.after_all(&class).await.unwrap();
    assert_eq!(fx.provider.created(), 1);
}

#[tokio::test]
async fn test_repeated_apply_without_drop_needs_idempotent_scripts() {
    let fx = fixture();
    let class = fx.run.class("AccumulatingTest");
    fx.coordinator.declare(
        &class,
        declaration(
            Scope::Class,
            scripts("idempotent", MigrationScope::PerMethod, MigrationScope::None)
        )
    );

    for (expected, name) in [(1, "first"), (2, "second")] {
        let method = class.method(name);
        let conn = fx.coordinator.resolve_connection(&method).await.unwrap();
        conn.database().execute("INSERT INTO users VALUES (1, 'ada')").unwrap();
        assert_eq!(conn.count("users").unwrap(), expected);
        fx.coordinator.after_each(&method).await.unwrap();
    }

    fx.coordinator.after_all(&class).await.unwrap();
}

#[tokio::test]
async fn test_rows_survive_between_methods_of_one_class_only() {
    let fx = fixture();
    let policy = scripts("schema", MigrationScope::PerClass, MigrationScope::PerClass);

    let class = fx.run.class("OrderTest");
    fx.coordinator.declare(&class, declaration(Scope::Class, policy.clone()));
    fx.coordinator.before_all(&class).await.unwrap();

    let first_run = class.method("first_run");
    let conn = fx.coordinator.resolve_connection(&first_run).await.unwrap();
    conn.database().execute("INSERT INTO users VALUES (1, 'ada')").unwrap();
    fx.coordinator.after_each(&first_run).await.unwrap();

    let second_run = class.method("second_run");
    let conn = fx.coordinator.resolve_connection(&second_run).await.unwrap();
    assert_eq!(conn.count("users").unwrap(), 1);
    fx.coordinator.after_each(&second_run).await.unwrap();

    let other = fx.run.class("OtherOrderTest");
    fx.coordinator.declare(&other, declaration(Scope::Class, policy));
    let other_conn = fx.coordinator.resolve_connection(&other).await.unwrap();
    assert_eq!(other_conn.count("users").unwrap(), 0);

    fx.coordinator.after_all(&class).await.unwrap();
    fx.coordinator.after_all(&other).await.unwrap();
    assert_eq!(fx.provider.running(), 0);
}

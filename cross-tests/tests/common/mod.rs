#![allow(dead_code)]

use hb_core::{MigrationEngine, MigrationPolicy, MigrationScope, ResourceDeclaration, Scope};
use lifecycle::{ExternalOverrideResolver, LifecycleCoordinator, SharedRegistry, TestRun};
use std::path::Path;
use std::sync::Arc;
use tempfile::TempDir;
use testing::MemoryProvider;

pub const IMAGE: &str = "harbor/memory:1";

pub struct Fixture {
    pub run: TestRun,
    pub provider: MemoryProvider,
    pub coordinator: Arc<LifecycleCoordinator<MemoryProvider>>,
    pub migrations: TempDir
}

/// Isolated run with its own registry and a migration root holding:
/// - `schema/`: creates `users`, with a `drop_*` script
/// - `idempotent/`: creates `users` only if missing
/// - `broken/`: a valid statement followed by an invalid one
pub fn fixture() -> Fixture {
    fixture_with(ExternalOverrideResolver::disabled())
}

pub fn fixture_with(external: ExternalOverrideResolver) -> Fixture {
    lifecycle::telemetry::init_test_tracing();

    let migrations = tempfile::tempdir().unwrap();
    write(migrations.path(), "schema/001_users.sql", "CREATE TABLE users(id INT, name TEXT);");
    write(migrations.path(), "schema/drop_users.sql", "DROP TABLE IF EXISTS users;");
    write(
        migrations.path(),
        "idempotent/001_users.sql",
        "CREATE TABLE IF NOT EXISTS users(id INT, name TEXT);"
    );
    write(
        migrations.path(),
        "broken/001_users.sql",
        "CREATE TABLE users(id INT);\nCREAT TABLE oops(id INT);"
    );

    let run = TestRun::with_registry("cross", Arc::new(SharedRegistry::new()));
    let provider = MemoryProvider::new();
    let coordinator = LifecycleCoordinator::new(provider.clone())
        .with_registry(run.registry())
        .with_external(external)
        .with_migration_root(migrations.path());

    Fixture {
        run,
        provider,
        coordinator: Arc::new(coordinator),
        migrations
    }
}

pub fn write(root: &Path, relative: &str, contents: &str) {
    let path = root.join(relative);
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).unwrap();
    }
    std::fs::write(path, contents).unwrap();
}

pub fn scripts(location: &str, apply: MigrationScope, drop: MigrationScope) -> MigrationPolicy {
    MigrationPolicy::new(MigrationEngine::Scripts, [location])
        .with_apply(apply)
        .with_drop(drop)
}

pub fn declaration(mode: Scope, migration: MigrationPolicy) -> ResourceDeclaration {
    ResourceDeclaration::new(IMAGE, mode).with_migration(migration)
}

//! # Harbor Lifecycle
//!
//! Scope-aware provisioning of containerized test resources.
//!
//! A test run is modelled as a tree of [`ScopeNode`]s (run, class, method).
//! The harness calls the [`LifecycleCoordinator`] hooks at each boundary;
//! the coordinator starts, shares, migrates and stops backend instances
//! according to the [`ResourceDeclaration`](hb_core::ResourceDeclaration)
//! found for the node.
//!
//! ```no_run
//! use hb_core::{MigrationEngine, MigrationPolicy, MigrationScope, ResourceDeclaration, Scope};
//! use lifecycle::{LifecycleCoordinator, TestRun};
//! use testing::PostgresProvider;
//!
//! # async fn demo() -> errors::LifecycleResult<()> {
//! let run = TestRun::new("it");
//! let postgres = LifecycleCoordinator::new(PostgresProvider::default());
//!
//! let class = run.class("UserRepositoryTest");
//! postgres.declare(
//!     &class,
//!     ResourceDeclaration::new("postgres:16-alpine", Scope::Run).with_migration(
//!         MigrationPolicy::new(MigrationEngine::Scripts, ["migrations"])
//!             .with_apply(MigrationScope::PerClass)
//!             .with_drop(MigrationScope::PerClass)
//!     )
//! );
//!
//! postgres.before_all(&class).await?;
//! let method = class.method("inserts_user");
//! let conn = postgres.resolve_connection(&method).await?;
//! conn.assert_count_equals(0, "users").await;
//! postgres.after_each(&method).await?;
//! postgres.after_all(&class).await?;
//! run.finish().await;
//! # Ok(())
//! # }
//! ```

pub mod coordinator;
pub mod external;
pub mod handle;
pub mod registry;
pub mod store;
pub mod telemetry;

pub use coordinator::{ContainerOverride, LifecycleCoordinator};
pub use external::ExternalOverrideResolver;
pub use handle::{Origin, ResourceHandle};
pub use registry::{SharedRegistry, ShutdownReport};
pub use store::{ScopeNode, StoreKey, TestRun};

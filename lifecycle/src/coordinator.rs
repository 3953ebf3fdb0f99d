//! # Lifecycle Coordinator
//!
//! Reacts to the host harness's scope boundaries for one backend:
//!
//! | Hook          | RUN                          | CLASS               | METHOD              |
//! |---------------|------------------------------|---------------------|---------------------|
//! | `before_all`  | get-or-create shared handle  | create + start      | -                   |
//! | `before_each` | -                            | -                   | create + start      |
//! | `after_each`  | -                            | -                   | stop                |
//! | `after_all`   | -                            | stop                | -                   |
//! | `finish`      | stop every shared handle     | -                   | -                   |
//!
//! Migrations apply and drop at the boundaries their policy names. When an
//! external instance is configured it replaces every container for the
//! backend and is never stopped.
//!
//! Hooks are idempotent per node: resolving a connection before the hook ran
//! triggers the hook lazily, and the explicit call afterwards is a no-op.
//! Once a node's after-hook ran, the node and everything below it are
//! closed and resolving from them is an `InjectionError`.

use config::{HarborConfig, HarborSettings, load_settings_from_env, needs_idempotent_migrations, resolve_image, validate_declaration};
use errors::{ContainerError, LifecycleError, LifecycleResult};
use hb_core::{
    Connection, ConnectionParams, Container, MigrationPolicy, MigrationScope, ResourceDeclaration, ResourceKey,
    ResourceProvider, Scope
};
use migration::MigrationRunner;
use parking_lot::Mutex;
use std::collections::HashSet;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{debug, info, instrument, warn};

use crate::external::ExternalOverrideResolver;
use crate::handle::{ResourceHandle, migration_set};
use crate::registry::SharedRegistry;
use crate::store::ScopeNode;

type ContainerFactory =
    dyn Fn(&ResourceKey) -> Result<Box<dyn Container>, ContainerError> + Send + Sync;

/// User-supplied container used instead of the provider's default for
/// CLASS and METHOD instances, and for the first RUN instance of a key.
pub struct ContainerOverride {
    factory: Box<ContainerFactory>
}

impl ContainerOverride {
    pub fn new<F>(factory: F) -> Self
    where
        F: Fn(&ResourceKey) -> Result<Box<dyn Container>, ContainerError> + Send + Sync + 'static,
    {
        Self {
            factory: Box::new(factory)
        }
    }

    pub fn create(&self, key: &ResourceKey) -> Result<Box<dyn Container>, ContainerError> {
        (self.factory)(key)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Ownership {
    /// Created for this node; stopped at its teardown.
    Owned,
    /// Registry or external instance; migrations are applied once.
    Shared,
    /// A method's view of its class's instance.
    Borrowed
}

/// What a scope node holds for one backend.
struct Binding<C: Connection> {
    handle: Arc<ResourceHandle<C>>,
    ownership: Ownership
}

/// Left on a node by its after-hook.
struct Closed;

pub struct LifecycleCoordinator<P: ResourceProvider> {
    provider: Arc<P>,
    registry: Arc<SharedRegistry>,
    external: ExternalOverrideResolver,
    migrations: MigrationRunner,
    warned: Mutex<HashSet<ResourceKey>>
}

impl<P: ResourceProvider> LifecycleCoordinator<P> {
    /// Coordinator on the process-global registry, with settings and
    /// external overrides taken from the environment.
    pub fn new(provider: P) -> Self {
        Self::with_settings(provider, HarborSettings::default())
    }

    /// Like [`new`](Self::new), starting from `settings` (e.g. the
    /// `[settings]` table of a declaration file); `HARBOR_*` variables still
    /// win.
    pub fn with_settings(provider: P, settings: HarborSettings) -> Self {
        let settings = load_settings_from_env(settings);
        Self {
            provider: Arc::new(provider),
            registry: SharedRegistry::global(),
            external: ExternalOverrideResolver::from_env(),
            migrations: MigrationRunner::new(settings.migration_root),
            warned: Mutex::new(HashSet::new())
        }
    }

    pub fn with_registry(mut self, registry: Arc<SharedRegistry>) -> Self {
        self.registry = registry;
        self
    }

    pub fn with_external(mut self, external: ExternalOverrideResolver) -> Self {
        self.external = external;
        self
    }

    pub fn with_migration_root(mut self, root: impl Into<PathBuf>) -> Self {
        self.migrations = MigrationRunner::new(root);
        self
    }

    pub fn provider(&self) -> &P {
        &self.provider
    }

    pub fn backend(&self) -> &'static str {
        self.provider.backend()
    }

    pub fn registry(&self) -> &Arc<SharedRegistry> {
        &self.registry
    }

    /// Registers `decl` on `node`; it applies to the node and everything
    /// below it.
    pub fn declare(&self, node: &ScopeNode, decl: ResourceDeclaration) {
        node.put(self.backend(), Arc::new(decl));
    }

    /// Registers the declaration `config` holds for this backend on `node`.
    pub fn declare_from(&self, node: &ScopeNode, config: &HarborConfig) -> LifecycleResult<()> {
        let decl = config.declaration(self.backend()).ok_or_else(|| {
            LifecycleError::configuration(format!("declaration file has no {} resource", self.backend()))
        })?;
        validate_declaration(decl)?;
        self.declare(node, decl.clone());
        Ok(())
    }

    pub fn override_container<F>(&self, node: &ScopeNode, factory: F)
    where
        F: Fn(&ResourceKey) -> Result<Box<dyn Container>, ContainerError> + Send + Sync + 'static,
    {
        node.put(self.backend(), Arc::new(ContainerOverride::new(factory)));
    }

    #[instrument(skip_all, fields(backend = self.backend(), node = %class.path()))]
    pub async fn before_all(&self, class: &Arc<ScopeNode>) -> LifecycleResult<()> {
        expect_kind(class, Scope::Class, "before_all")?;
        self.ensure_open(class)?;
        let ns = self.backend();
        let _init = class.init_lock().lock().await;
        if class.get_local::<Binding<P::Connection>>(ns).is_some() {
            return Ok(());
        }

        let decl = self.declaration(class)?;
        if decl.mode == Scope::Method {
            debug!("Method-scoped resource; provisioning deferred to each method");
            return Ok(());
        }
        validate_declaration(&decl)?;

        let (handle, ownership) = match self.external_handle().await? {
            Some(handle) => (handle, Ownership::Shared),
            None => {
                let key = self.key_for(&decl)?;
                if decl.mode == Scope::Run {
                    let (handle, _) = self
                        .registry
                        .get_or_create(ns, &key, || self.provision(class, key.clone()))
                        .await?;
                    (handle, Ownership::Shared)
                } else {
                    (self.provision(class, key).await?, Ownership::Owned)
                }
            }
        };

        if decl.migration.applies_at(MigrationScope::PerClass) {
            let applied = if ownership == Ownership::Shared {
                self.acquire_migrations(&handle, &decl.migration).await
            } else {
                self.apply_migrations(&handle, &decl.migration).await
            };
            if let Err(e) = applied {
                if ownership == Ownership::Owned {
                    stop_handle(&handle).await;
                }
                return Err(e);
            }
        }

        class.put(ns, Arc::new(Binding { handle, ownership }));
        Ok(())
    }

    #[instrument(skip_all, fields(backend = self.backend(), node = %method.path()))]
    pub async fn before_each(&self, method: &Arc<ScopeNode>) -> LifecycleResult<()> {
        expect_kind(method, Scope::Method, "before_each")?;
        self.ensure_open(method)?;
        let ns = self.backend();
        let _init = method.init_lock().lock().await;
        if method.get_local::<Binding<P::Connection>>(ns).is_some() {
            return Ok(());
        }

        let decl = self.declaration(method)?;
        validate_declaration(&decl)?;

        let binding = if decl.mode == Scope::Method {
            match self.external_handle().await? {
                Some(handle) => Binding {
                    handle,
                    ownership: Ownership::Shared
                },
                None => Binding {
                    handle: self.provision(method, self.key_for(&decl)?).await?,
                    ownership: Ownership::Owned
                }
            }
        } else {
            let class = method.ancestor(Scope::Class).ok_or_else(|| {
                LifecycleError::configuration(format!("method {} has no enclosing class", method.path()))
            })?;
            self.before_all(&class).await?;
            let outer = class.get_local::<Binding<P::Connection>>(ns).ok_or_else(|| {
                LifecycleError::configuration(format!("class {} holds no {} resource", class.path(), ns))
            })?;
            Binding {
                handle: Arc::clone(&outer.handle),
                ownership: Ownership::Borrowed
            }
        };

        if needs_idempotent_migrations(&decl) && self.warned.lock().insert(binding.handle.key().clone()) {
            warn!(
                key = %binding.handle.key(),
                "Migrations apply before every method on a shared instance without a matching drop; they must be idempotent"
            );
        }

        if decl.migration.applies_at(MigrationScope::PerMethod) {
            if let Err(e) = self.apply_migrations(&binding.handle, &decl.migration).await {
                if binding.ownership == Ownership::Owned {
                    stop_handle(&binding.handle).await;
                }
                return Err(e);
            }
        }

        method.put(ns, Arc::new(binding));
        Ok(())
    }

    #[instrument(skip_all, fields(backend = self.backend(), node = %method.path()))]
    pub async fn after_each(&self, method: &Arc<ScopeNode>) -> LifecycleResult<()> {
        method.put(self.backend(), Arc::new(Closed));
        let Some(binding) = method.remove::<Binding<P::Connection>>(self.backend()) else {
            return Ok(());
        };
        let decl = self.declaration(method)?;

        let dropped = if decl.migration.drops_at(MigrationScope::PerMethod) {
            self.drop_migrations(&binding.handle, &decl.migration).await
        } else {
            Ok(())
        };
        if binding.ownership == Ownership::Owned {
            stop_handle(&binding.handle).await;
        }
        dropped
    }

    #[instrument(skip_all, fields(backend = self.backend(), node = %class.path()))]
    pub async fn after_all(&self, class: &Arc<ScopeNode>) -> LifecycleResult<()> {
        class.put(self.backend(), Arc::new(Closed));
        let Some(binding) = class.remove::<Binding<P::Connection>>(self.backend()) else {
            return Ok(());
        };
        let decl = self.declaration(class)?;

        let dropped = if decl.migration.drops_at(MigrationScope::PerClass) {
            if binding.ownership == Ownership::Shared {
                self.release_migrations(&binding.handle, &decl.migration).await
            } else {
                self.drop_migrations(&binding.handle, &decl.migration).await
            }
        } else {
            Ok(())
        };
        if binding.ownership == Ownership::Owned {
            stop_handle(&binding.handle).await;
        }
        dropped
    }

    /// Handle visible from `node`, provisioning it first if the matching
    /// before-hook has not run yet.
    pub async fn resolve_handle(
        &self,
        node: &Arc<ScopeNode>
    ) -> LifecycleResult<Arc<ResourceHandle<P::Connection>>> {
        let requested = std::any::type_name::<P::Connection>();
        match node.kind() {
            Scope::Method => self.before_each(node).await?,
            Scope::Class => {
                if self.declaration(node)?.mode == Scope::Method {
                    return Err(LifecycleError::injection(
                        requested,
                        format!(
                            "{} resource is METHOD scoped; request it from a test method, not class {}",
                            self.backend(),
                            node.path()
                        )
                    ));
                }
                self.before_all(node).await?;
            }
            Scope::Run => {
                return Err(LifecycleError::injection(
                    requested,
                    "connections are resolved within a class or a method"
                ));
            }
        }

        let binding = node
            .get_local::<Binding<P::Connection>>(self.backend())
            .ok_or_else(|| LifecycleError::injection(requested, format!("no live resource at {}", node.path())))?;
        if binding.handle.is_stopped() {
            return Err(LifecycleError::injection(
                requested,
                format!("resource at {} was already stopped", node.path())
            ));
        }
        Ok(Arc::clone(&binding.handle))
    }

    pub async fn resolve_connection(&self, node: &Arc<ScopeNode>) -> LifecycleResult<Arc<P::Connection>> {
        Ok(self.resolve_handle(node).await?.connection())
    }

    pub async fn resolve_params(&self, node: &Arc<ScopeNode>) -> LifecycleResult<ConnectionParams> {
        let conn = self.resolve_connection(node).await?;
        Ok(conn.params().clone())
    }

    fn ensure_open(&self, node: &ScopeNode) -> LifecycleResult<()> {
        if node.find::<Closed>(self.backend()).is_some() {
            return Err(LifecycleError::injection(
                std::any::type_name::<P::Connection>(),
                format!("{} already finished; no {} resource is available there", node.path(), self.backend())
            ));
        }
        Ok(())
    }

    /// Identity for `decl`; a blank image means the provider's default.
    fn key_for(&self, decl: &ResourceDeclaration) -> LifecycleResult<ResourceKey> {
        if decl.image.trim().is_empty() {
            return Ok(decl.key_for(self.provider.default_image()));
        }
        Ok(decl.key_for(resolve_image(&decl.image)?))
    }

    fn declaration(&self, node: &ScopeNode) -> LifecycleResult<Arc<ResourceDeclaration>> {
        node.find::<ResourceDeclaration>(self.backend()).ok_or_else(|| {
            LifecycleError::configuration(format!(
                "no {} resource declared for {}",
                self.backend(),
                node.path()
            ))
        })
    }

    async fn external_handle(&self) -> LifecycleResult<Option<Arc<ResourceHandle<P::Connection>>>> {
        let Some(params) = self.external.resolve(self.backend(), self.provider.scheme())? else {
            return Ok(None);
        };
        let key = ResourceKey::new(format!("external:{}", params), false, None);
        let (handle, created) = self
            .registry
            .get_or_create(self.backend(), &key, || async {
                let conn = self
                    .provider
                    .connect_external(&params)
                    .await
                    .map_err(|e| LifecycleError::resource_start(params.to_string(), e))?;
                Ok(Arc::new(ResourceHandle::external(key.clone(), conn)))
            })
            .await?;
        if created {
            info!(backend = self.backend(), instance = %params, "Using external instance");
        }
        Ok(Some(handle))
    }

    /// Creates and starts a container and derives its connection. A failure
    /// at any step leaves nothing running.
    async fn provision(
        &self,
        node: &ScopeNode,
        key: ResourceKey
    ) -> LifecycleResult<Arc<ResourceHandle<P::Connection>>> {
        let start_error = |e: ContainerError| LifecycleError::resource_start(key.image(), e);

        let mut container = match node.find::<ContainerOverride>(self.backend()) {
            Some(custom) => {
                debug!(%key, "Using container override");
                custom.create(&key)
            }
            None => self.provider.create_container(&key)
        }
        .map_err(start_error)?;

        info!(backend = self.backend(), %key, scope = %node.kind(), "Starting container");
        if let Err(e) = container.start().await {
            discard(container.as_mut()).await;
            return Err(start_error(e));
        }

        match self.provider.connect(container.as_ref()).await {
            Ok(conn) => Ok(Arc::new(ResourceHandle::from_container(key.clone(), container, conn))),
            Err(e) => {
                discard(container.as_mut()).await;
                Err(start_error(e))
            }
        }
    }

    async fn apply_migrations(&self, handle: &ResourceHandle<P::Connection>, policy: &MigrationPolicy) -> LifecycleResult<()> {
        let conn = handle.connection();
        self.migrations.apply(&*conn, policy).await
    }

    async fn drop_migrations(&self, handle: &ResourceHandle<P::Connection>, policy: &MigrationPolicy) -> LifecycleResult<()> {
        let conn = handle.connection();
        self.migrations.drop(&*conn, policy).await
    }

    /// Applies `policy` to a shared instance unless another class already
    /// did and still holds it.
    async fn acquire_migrations(
        &self,
        handle: &ResourceHandle<P::Connection>,
        policy: &MigrationPolicy
    ) -> LifecycleResult<()> {
        let mut applied = handle.applied_migrations().await;
        let set = migration_set(policy);
        if let Some(holders) = applied.get_mut(&set) {
            *holders += 1;
            debug!(key = %handle.key(), engine = %policy.engine, holders = *holders, "Migrations already applied");
            return Ok(());
        }
        self.apply_migrations(handle, policy).await?;
        applied.insert(set, 1);
        Ok(())
    }

    /// Drops `policy` from a shared instance once the last class holding it
    /// lets go.
    async fn release_migrations(
        &self,
        handle: &ResourceHandle<P::Connection>,
        policy: &MigrationPolicy
    ) -> LifecycleResult<()> {
        let mut applied = handle.applied_migrations().await;
        let set = migration_set(policy);
        if let Some(holders) = applied.get_mut(&set) {
            *holders = holders.saturating_sub(1);
            if *holders > 0 {
                debug!(key = %handle.key(), engine = %policy.engine, holders = *holders, "Schema still in use; drop deferred");
                return Ok(());
            }
        }
        applied.remove(&set);
        self.drop_migrations(handle, policy).await
    }
}

fn expect_kind(node: &ScopeNode, kind: Scope, hook: &str) -> LifecycleResult<()> {
    if node.kind() == kind {
        Ok(())
    } else {
        Err(LifecycleError::configuration(format!(
            "{} expects a {} node, got {} ({})",
            hook,
            kind,
            node.kind(),
            node.path()
        )))
    }
}

async fn stop_handle<C: Connection>(handle: &ResourceHandle<C>) {
    if let Err(e) = handle.stop().await {
        warn!(key = %handle.key(), error = %e, "Failed to stop resource");
    }
}

async fn discard(container: &mut dyn Container) {
    if let Err(e) = container.stop().await {
        warn!(image = container.image(), error = %e, "Failed to stop container after a failed start");
    }
}

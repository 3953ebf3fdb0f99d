//! # Shared Registry
//!
//! Process-global map from resource identity to the one live handle shared
//! by every RUN-scoped declaration with that identity.
//!
//! Creation is serialized per key: concurrent first requests for the same
//! key wait on a per-key async lock while requests for other keys proceed.
//! A factory failure leaves the slot empty so a later request retries.
//! Entries are torn down only by [`SharedRegistry::shutdown_all`].

use async_trait::async_trait;
use dashmap::DashMap;
use errors::{ContainerError, LifecycleError, LifecycleResult};
use hb_core::{Connection, ResourceKey};
use parking_lot::RwLock;
use std::any::Any;
use std::future::Future;
use std::sync::{Arc, LazyLock};
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::handle::ResourceHandle;

/// Object-safe view of a [`ResourceHandle`] of any connection type.
#[async_trait]
trait ErasedHandle: Send + Sync {
    fn key(&self) -> &ResourceKey;

    fn is_stopped(&self) -> bool;

    async fn stop(&self) -> Result<(), ContainerError>;

    fn into_any(self: Arc<Self>) -> Arc<dyn Any + Send + Sync>;
}

#[async_trait]
impl<C: Connection> ErasedHandle for ResourceHandle<C> {
    fn key(&self) -> &ResourceKey {
        ResourceHandle::key(self)
    }

    fn is_stopped(&self) -> bool {
        ResourceHandle::is_stopped(self)
    }

    async fn stop(&self) -> Result<(), ContainerError> {
        ResourceHandle::stop(self).await
    }

    fn into_any(self: Arc<Self>) -> Arc<dyn Any + Send + Sync> {
        self
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct RegistryKey {
    backend: &'static str,
    key: ResourceKey
}

#[derive(Default)]
struct Slot {
    handle: RwLock<Option<Arc<dyn ErasedHandle>>>,
    create: Mutex<()>
}

impl Slot {
    fn live(&self) -> Option<Arc<dyn ErasedHandle>> {
        self.handle
            .read()
            .as_ref()
            .filter(|h| !h.is_stopped())
            .cloned()
    }
}

/// Outcome of [`SharedRegistry::shutdown_all`].
#[derive(Debug, Default)]
pub struct ShutdownReport {
    pub stopped: usize,
    pub failures: Vec<(ResourceKey, ContainerError)>
}

impl ShutdownReport {
    pub fn is_clean(&self) -> bool {
        self.failures.is_empty()
    }
}

static GLOBAL: LazyLock<Arc<SharedRegistry>> = LazyLock::new(|| Arc::new(SharedRegistry::new()));

#[derive(Default)]
pub struct SharedRegistry {
    slots: DashMap<RegistryKey, Arc<Slot>>
}

impl SharedRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// The registry shared by every coordinator in this process.
    pub fn global() -> Arc<SharedRegistry> {
        Arc::clone(&GLOBAL)
    }

    /// Returns the live handle for `key`, creating it with `factory` when
    /// absent or stopped. The boolean is `true` when this call created it.
    pub async fn get_or_create<C, F, Fut>(
        &self,
        backend: &'static str,
        key: &ResourceKey,
        factory: F
    ) -> LifecycleResult<(Arc<ResourceHandle<C>>, bool)>
    where
        C: Connection,
        F: FnOnce() -> Fut,
        Fut: Future<Output = LifecycleResult<Arc<ResourceHandle<C>>>>,
    {
        let slot = self.slot(backend, key);

        if let Some(existing) = slot.live() {
            return Ok((downcast(backend, existing)?, false));
        }

        let _creating = slot.create.lock().await;
        if let Some(existing) = slot.live() {
            debug!(backend, %key, "Resource created by a concurrent request");
            return Ok((downcast(backend, existing)?, false));
        }

        let handle = factory().await?;
        *slot.handle.write() = Some(Arc::clone(&handle) as Arc<dyn ErasedHandle>);
        info!(backend, %key, "Registered shared resource");
        Ok((handle, true))
    }

    /// Live handle for `key`, if one was created and not stopped.
    pub fn get<C: Connection>(
        &self,
        backend: &'static str,
        key: &ResourceKey
    ) -> LifecycleResult<Option<Arc<ResourceHandle<C>>>> {
        let registry_key = RegistryKey {
            backend,
            key: key.clone()
        };
        let Some(slot) = self.slots.get(&registry_key).map(|s| Arc::clone(s.value())) else {
            return Ok(None);
        };
        slot.live().map(|h| downcast(backend, h)).transpose()
    }

    pub fn len(&self) -> usize {
        self.slots
            .iter()
            .filter(|entry| entry.value().live().is_some())
            .count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Stops every registered handle exactly once and empties the registry.
    ///
    /// Stop failures are collected rather than aborting the sweep.
    pub async fn shutdown_all(&self) -> ShutdownReport {
        let slots: Vec<Arc<Slot>> = self.slots.iter().map(|e| Arc::clone(e.value())).collect();
        self.slots.clear();

        let mut report = ShutdownReport::default();
        for slot in slots {
            let _creating = slot.create.lock().await;
            let Some(handle) = slot.handle.write().take() else {
                continue;
            };
            if handle.is_stopped() {
                continue;
            }
            match handle.stop().await {
                Ok(()) => report.stopped += 1,
                Err(e) => {
                    warn!(key = %handle.key(), error = %e, "Failed to stop shared resource");
                    report.failures.push((handle.key().clone(), e));
                }
            }
        }
        info!(stopped = report.stopped, failed = report.failures.len(), "Shared registry shut down");
        report
    }

    /// [`shutdown_all`](Self::shutdown_all) for callers outside an async
    /// context, such as process-exit hooks.
    pub fn blocking_shutdown_all(&self) -> std::io::Result<ShutdownReport> {
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()?;
        Ok(runtime.block_on(self.shutdown_all()))
    }

    fn slot(&self, backend: &'static str, key: &ResourceKey) -> Arc<Slot> {
        let registry_key = RegistryKey {
            backend,
            key: key.clone()
        };
        Arc::clone(self.slots.entry(registry_key).or_default().value())
    }
}

fn downcast<C: Connection>(
    backend: &'static str,
    handle: Arc<dyn ErasedHandle>
) -> LifecycleResult<Arc<ResourceHandle<C>>> {
    handle.into_any().downcast::<ResourceHandle<C>>().map_err(|_| {
        LifecycleError::injection(
            std::any::type_name::<C>(),
            format!("shared {} resource was registered with a different connection type", backend)
        )
    })
}

//! Live resource handles.
//!
//! A [`ResourceHandle`] owns one running container (or wraps one external
//! instance) together with the connection derived from it. Stopping is
//! idempotent and never touches an external instance.

use errors::ContainerError;
use hb_core::{Connection, Container, MigrationEngine, MigrationPolicy, ResourceKey};
use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use tokio::sync::Mutex;
use tracing::{debug, info};

static HANDLE_COUNTER: AtomicU64 = AtomicU64::new(0);

/// Where the instance behind a handle came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Origin {
    /// Started by the container runtime; stopped with the handle.
    Container,
    /// Supplied through the `EXTERNAL_TEST_<BACKEND>_*` variables; never
    /// stopped.
    External
}

/// Migration sets applied to a shared instance, keyed by engine and
/// locations, with the number of classes currently relying on each.
pub(crate) type AppliedSet = HashMap<(MigrationEngine, Vec<String>), usize>;

pub struct ResourceHandle<C: Connection> {
    id: u64,
    key: ResourceKey,
    origin: Origin,
    connection: Arc<C>,
    container: Mutex<Option<Box<dyn Container>>>,
    stopped: AtomicBool,
    applied: Mutex<AppliedSet>
}

impl<C: Connection> ResourceHandle<C> {
    pub fn from_container(key: ResourceKey, container: Box<dyn Container>, connection: C) -> Self {
        Self::build(key, Origin::Container, Some(container), connection)
    }

    pub fn external(key: ResourceKey, connection: C) -> Self {
        Self::build(key, Origin::External, None, connection)
    }

    fn build(
        key: ResourceKey,
        origin: Origin,
        container: Option<Box<dyn Container>>,
        connection: C
    ) -> Self {
        Self {
            id: HANDLE_COUNTER.fetch_add(1, Ordering::SeqCst),
            key,
            origin,
            connection: Arc::new(connection),
            container: Mutex::new(container),
            stopped: AtomicBool::new(false),
            applied: Mutex::new(AppliedSet::new())
        }
    }

    /// Process-unique identity; two handles are the same instance iff their
    /// ids match.
    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn key(&self) -> &ResourceKey {
        &self.key
    }

    pub fn origin(&self) -> Origin {
        self.origin
    }

    pub fn connection(&self) -> Arc<C> {
        Arc::clone(&self.connection)
    }

    pub fn is_stopped(&self) -> bool {
        self.stopped.load(Ordering::SeqCst)
    }

    /// Closes the connection and stops the container. Only the first call
    /// does anything.
    pub async fn stop(&self) -> Result<(), ContainerError> {
        if self.stopped.swap(true, Ordering::SeqCst) {
            debug!(key = %self.key, "Handle already stopped");
            return Ok(());
        }

        self.connection.close().await;

        if self.origin == Origin::External {
            info!(key = %self.key, "Released external instance (left running)");
            return Ok(());
        }

        let container = self.container.lock().await.take();
        match container {
            Some(mut container) => {
                info!(key = %self.key, "Stopping container");
                container.stop().await
            }
            None => Ok(())
        }
    }

    pub(crate) async fn applied_migrations(&self) -> tokio::sync::MutexGuard<'_, AppliedSet> {
        self.applied.lock().await
    }
}

pub(crate) fn migration_set(policy: &MigrationPolicy) -> (MigrationEngine, Vec<String>) {
    (policy.engine, policy.locations.clone())
}

impl<C: Connection> std::fmt::Debug for ResourceHandle<C> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResourceHandle")
            .field("id", &self.id)
            .field("key", &self.key)
            .field("origin", &self.origin)
            .field("stopped", &self.is_stopped())
            .finish_non_exhaustive()
    }
}

//! Hierarchical per-scope storage.
//!
//! A test run is a tree of [`ScopeNode`]s: one run root, one child per test
//! class, one grandchild per test method. Each node carries a typed
//! key/value store. Lookups through [`ScopeNode::find`] walk outward to the
//! root so a method sees what its class (or the run) stored; writes stay on
//! the node they were made on.

use hb_core::Scope;
use parking_lot::RwLock;
use std::any::{Any, TypeId};
use std::collections::HashMap;
use std::sync::Arc;

use crate::registry::{SharedRegistry, ShutdownReport};

/// Store key: a namespace (the backend name) plus the stored type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct StoreKey {
    namespace: &'static str,
    type_id: TypeId
}

impl StoreKey {
    pub fn of<T: Any>(namespace: &'static str) -> Self {
        Self {
            namespace,
            type_id: TypeId::of::<T>()
        }
    }
}

pub struct ScopeNode {
    kind: Scope,
    name: String,
    parent: Option<Arc<ScopeNode>>,
    values: RwLock<HashMap<StoreKey, Arc<dyn Any + Send + Sync>>>,
    init: tokio::sync::Mutex<()>
}

impl ScopeNode {
    fn new(kind: Scope, name: impl Into<String>, parent: Option<Arc<ScopeNode>>) -> Arc<Self> {
        Arc::new(Self {
            kind,
            name: name.into(),
            parent,
            values: RwLock::new(HashMap::new()),
            init: tokio::sync::Mutex::new(())
        })
    }

    pub fn root(name: impl Into<String>) -> Arc<Self> {
        Self::new(Scope::Run, name, None)
    }

    pub fn class(self: &Arc<Self>, name: impl Into<String>) -> Arc<Self> {
        Self::new(Scope::Class, name, Some(Arc::clone(self)))
    }

    pub fn method(self: &Arc<Self>, name: impl Into<String>) -> Arc<Self> {
        Self::new(Scope::Method, name, Some(Arc::clone(self)))
    }

    pub fn kind(&self) -> Scope {
        self.kind
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn parent(&self) -> Option<&Arc<ScopeNode>> {
        self.parent.as_ref()
    }

    /// Slash-separated names from the root, e.g. `run/UserRepoTest/inserts`.
    pub fn path(&self) -> String {
        match &self.parent {
            Some(parent) => format!("{}/{}", parent.path(), self.name),
            None => self.name.clone()
        }
    }

    /// This node or its nearest ancestor of the given kind.
    pub fn ancestor(self: &Arc<Self>, kind: Scope) -> Option<Arc<ScopeNode>> {
        let mut node = Some(Arc::clone(self));
        while let Some(current) = node {
            if current.kind == kind {
                return Some(current);
            }
            node = current.parent.clone();
        }
        None
    }

    pub fn put<T: Any + Send + Sync>(&self, namespace: &'static str, value: Arc<T>) {
        self.values.write().insert(StoreKey::of::<T>(namespace), value);
    }

    /// Value stored on this node only.
    pub fn get_local<T: Any + Send + Sync>(&self, namespace: &'static str) -> Option<Arc<T>> {
        let value = self.values.read().get(&StoreKey::of::<T>(namespace)).cloned()?;
        value.downcast::<T>().ok()
    }

    /// Value stored on this node or the nearest ancestor that has one.
    pub fn find<T: Any + Send + Sync>(&self, namespace: &'static str) -> Option<Arc<T>> {
        self.get_local::<T>(namespace)
            .or_else(|| self.parent.as_ref().and_then(|p| p.find::<T>(namespace)))
    }

    pub fn remove<T: Any + Send + Sync>(&self, namespace: &'static str) -> Option<Arc<T>> {
        let value = self.values.write().remove(&StoreKey::of::<T>(namespace))?;
        value.downcast::<T>().ok()
    }

    pub fn clear(&self) {
        self.values.write().clear();
    }

    pub fn len(&self) -> usize {
        self.values.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Serializes lazy initialization of this node.
    pub(crate) fn init_lock(&self) -> &tokio::sync::Mutex<()> {
        &self.init
    }
}

impl std::fmt::Debug for ScopeNode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ScopeNode")
            .field("kind", &self.kind)
            .field("path", &self.path())
            .field("entries", &self.len())
            .finish()
    }
}

/// Root of one test execution.
///
/// Owns the run-level node and the registry whose shared resources are torn
/// down when the run finishes.
pub struct TestRun {
    root: Arc<ScopeNode>,
    registry: Arc<SharedRegistry>
}

impl TestRun {
    /// A run backed by the process-global registry.
    pub fn new(name: impl Into<String>) -> Self {
        Self::with_registry(name, SharedRegistry::global())
    }

    pub fn with_registry(name: impl Into<String>, registry: Arc<SharedRegistry>) -> Self {
        Self {
            root: ScopeNode::root(name),
            registry
        }
    }

    pub fn root(&self) -> &Arc<ScopeNode> {
        &self.root
    }

    pub fn registry(&self) -> Arc<SharedRegistry> {
        Arc::clone(&self.registry)
    }

    pub fn class(&self, name: impl Into<String>) -> Arc<ScopeNode> {
        self.root.class(name)
    }

    /// End-of-run notification: stops every shared resource.
    pub async fn finish(&self) -> ShutdownReport {
        let report = self.registry.shutdown_all().await;
        self.root.clear();
        report
    }
}

//! Collaborator contracts: container runtime, connections and backend
//! providers.

use async_trait::async_trait;
use errors::{ContainerError, StatementError};

use crate::types::{ConnectionParams, ResourceKey};

/// One container managed by the container runtime.
///
/// The core only orchestrates these calls; implementations own the actual
/// runtime interaction.
#[async_trait]
pub trait Container: Send + Sync {
    fn image(&self) -> &str;

    async fn start(&mut self) -> Result<(), ContainerError>;

    async fn stop(&mut self) -> Result<(), ContainerError>;

    fn is_running(&self) -> bool;

    async fn host(&self) -> Result<String, ContainerError>;

    async fn mapped_port(&self, internal_port: u16) -> Result<u16, ContainerError>;

    fn network_aliases(&self) -> Vec<String>;
}

/// Connection-shaped object handed to test code.
#[async_trait]
pub trait Connection: Send + Sync + 'static {
    fn params(&self) -> &ConnectionParams;

    /// Executes one raw statement (SQL, CQL or a backend command line).
    async fn execute(&self, statement: &str) -> Result<(), StatementError>;

    /// Releases client-side resources. Called once, when the owning handle
    /// stops.
    async fn close(&self) {}
}

/// Per-backend container factory.
///
/// A provider knows its backend's default image, how to build a container
/// for a [`ResourceKey`], and how to derive a connection from a running
/// container or from externally supplied parameters.
#[async_trait]
pub trait ResourceProvider: Send + Sync + 'static {
    type Connection: Connection;

    /// Upper-case backend name, used for store namespaces and the
    /// `EXTERNAL_TEST_<BACKEND>_*` variables.
    fn backend(&self) -> &'static str;

    /// URL scheme used for external-override addresses given as host/port.
    fn scheme(&self) -> &'static str;

    fn default_image(&self) -> &'static str;

    fn create_container(&self, key: &ResourceKey) -> Result<Box<dyn Container>, ContainerError>;

    async fn connect(&self, container: &dyn Container) -> Result<Self::Connection, ContainerError>;

    async fn connect_external(
        &self,
        params: &ConnectionParams
    ) -> Result<Self::Connection, ContainerError>;
}

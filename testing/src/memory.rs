//! In-process backend.
//!
//! Models a database server per container: a table model that understands a
//! handful of statements and rejects everything else. Start/stop counters on
//! the provider let tests assert how many instances the lifecycle core
//! created and tore down without a container runtime.

use async_trait::async_trait;
use dashmap::DashMap;
use errors::{ContainerError, StatementError};
use hb_core::{Connection, ConnectionParams, Container, ResourceKey, ResourceProvider};
use parking_lot::Mutex;
use regex::Regex;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, LazyLock};
use std::time::Duration;
use tracing::debug;

pub const MEMORY_PORT: u16 = 7070;
const FIRST_MAPPED_PORT: u16 = 20_000;

static CREATE_TABLE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?is)^\s*CREATE\s+TABLE\s+(IF\s+NOT\s+EXISTS\s+)?([A-Za-z_][\w.]*)").unwrap()
});
static DROP_TABLE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?is)^\s*DROP\s+TABLE\s+(IF\s+EXISTS\s+)?([A-Za-z_][\w.]*)").unwrap());
static INSERT: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?is)^\s*INSERT\s+INTO\s+([A-Za-z_][\w.]*)[^;]*?\bVALUES\b(.*)$").unwrap()
});
static DELETE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?is)^\s*DELETE\s+FROM\s+([A-Za-z_][\w.]*)").unwrap());
static TRUNCATE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?is)^\s*TRUNCATE\s+(TABLE\s+)?([A-Za-z_][\w.]*)").unwrap());

/// Table name to row count.
#[derive(Debug, Default)]
pub struct MemoryDatabase {
    tables: Mutex<BTreeMap<String, usize>>,
    executed: AtomicUsize
}

impl MemoryDatabase {
    pub fn execute(&self, statement: &str) -> Result<(), StatementError> {
        let reject = |reason: &str| StatementError::new(statement, reason);
        let mut tables = self.tables.lock();

        if let Some(caps) = CREATE_TABLE.captures(statement) {
            let name = caps[2].to_ascii_lowercase();
            if tables.contains_key(&name) {
                if caps.get(1).is_none() {
                    return Err(reject("relation already exists"));
                }
            } else {
                tables.insert(name, 0);
            }
        } else if let Some(caps) = DROP_TABLE.captures(statement) {
            let name = caps[2].to_ascii_lowercase();
            if tables.remove(&name).is_none() && caps.get(1).is_none() {
                return Err(reject("relation does not exist"));
            }
        } else if let Some(caps) = INSERT.captures(statement) {
            let rows = caps[2].matches("),").count() + 1;
            let count = tables
                .get_mut(&caps[1].to_ascii_lowercase())
                .ok_or_else(|| reject("relation does not exist"))?;
            *count += rows;
        } else if let Some(caps) = DELETE.captures(statement) {
            *tables
                .get_mut(&caps[1].to_ascii_lowercase())
                .ok_or_else(|| reject("relation does not exist"))? = 0;
        } else if let Some(caps) = TRUNCATE.captures(statement) {
            *tables
                .get_mut(&caps[2].to_ascii_lowercase())
                .ok_or_else(|| reject("relation does not exist"))? = 0;
        } else {
            return Err(reject("unsupported statement"));
        }

        self.executed.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    pub fn count(&self, table: &str) -> Option<usize> {
        self.tables.lock().get(&table.to_ascii_lowercase()).copied()
    }

    pub fn tables(&self) -> Vec<String> {
        self.tables.lock().keys().cloned().collect()
    }

    /// Statements accepted so far.
    pub fn executed(&self) -> usize {
        self.executed.load(Ordering::SeqCst)
    }
}

pub struct MemoryContainer {
    image: String,
    port: u16,
    aliases: Vec<String>,
    running: bool,
    database: Arc<MemoryDatabase>,
    counters: Arc<Counters>
}

#[async_trait]
impl Container for MemoryContainer {
    fn image(&self) -> &str {
        &self.image
    }

    async fn start(&mut self) -> Result<(), ContainerError> {
        if self.counters.fail_start.load(Ordering::SeqCst) {
            return Err(ContainerError::new("start", "wait strategy timed out"));
        }
        let delay = *self.counters.start_delay.lock();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        self.running = true;
        self.counters.started.fetch_add(1, Ordering::SeqCst);
        debug!(image = %self.image, port = self.port, "Memory container started");
        Ok(())
    }

    async fn stop(&mut self) -> Result<(), ContainerError> {
        if self.running {
            self.running = false;
            self.counters.stopped.fetch_add(1, Ordering::SeqCst);
        }
        Ok(())
    }

    fn is_running(&self) -> bool {
        self.running
    }

    async fn host(&self) -> Result<String, ContainerError> {
        Ok("localhost".to_string())
    }

    async fn mapped_port(&self, internal_port: u16) -> Result<u16, ContainerError> {
        if !self.running {
            return Err(ContainerError::new("mapped_port", "container is not running"));
        }
        if internal_port != MEMORY_PORT {
            return Err(ContainerError::new(
                "mapped_port",
                format!("port {} is not exposed", internal_port)
            ));
        }
        Ok(self.port)
    }

    fn network_aliases(&self) -> Vec<String> {
        self.aliases.clone()
    }
}

#[derive(Debug)]
pub struct MemoryConnection {
    params: ConnectionParams,
    database: Arc<MemoryDatabase>,
    closed: AtomicBool
}

impl MemoryConnection {
    pub fn count(&self, table: &str) -> Result<usize, StatementError> {
        self.database
            .count(table)
            .ok_or_else(|| StatementError::new(format!("SELECT count(*) FROM {}", table), "relation does not exist"))
    }

    pub fn has_table(&self, table: &str) -> bool {
        self.database.count(table).is_some()
    }

    pub fn database(&self) -> &Arc<MemoryDatabase> {
        &self.database
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Connection for MemoryConnection {
    fn params(&self) -> &ConnectionParams {
        &self.params
    }

    async fn execute(&self, statement: &str) -> Result<(), StatementError> {
        if self.is_closed() {
            return Err(StatementError::new(statement, "connection is closed"));
        }
        self.database.execute(statement)
    }

    async fn close(&self) {
        self.closed.store(true, Ordering::SeqCst);
    }
}

#[derive(Debug, Default)]
struct Counters {
    created: AtomicUsize,
    started: AtomicUsize,
    stopped: AtomicUsize,
    fail_start: AtomicBool,
    start_delay: Mutex<Option<Duration>>
}

#[derive(Default)]
struct Server {
    counters: Arc<Counters>,
    next_port: AtomicUsize,
    databases: DashMap<u16, Arc<MemoryDatabase>>,
    external: DashMap<u16, Arc<MemoryDatabase>>
}

/// Provider for the `MEMORY` backend.
///
/// Clones share counters and databases, so a test can keep one clone for
/// assertions and hand another to the coordinator.
#[derive(Clone, Default)]
pub struct MemoryProvider {
    server: Arc<Server>
}

impl MemoryProvider {
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes every later container start fail.
    pub fn fail_starts(&self, fail: bool) {
        self.server.counters.fail_start.store(fail, Ordering::SeqCst);
    }

    /// Slows container start down, widening race windows in concurrency
    /// tests.
    pub fn with_start_delay(self, delay: Duration) -> Self {
        *self.server.counters.start_delay.lock() = Some(delay);
        self
    }

    pub fn created(&self) -> usize {
        self.server.counters.created.load(Ordering::SeqCst)
    }

    pub fn started(&self) -> usize {
        self.server.counters.started.load(Ordering::SeqCst)
    }

    pub fn stopped(&self) -> usize {
        self.server.counters.stopped.load(Ordering::SeqCst)
    }

    /// Started and not yet stopped.
    pub fn running(&self) -> usize {
        self.started() - self.stopped()
    }

    /// The database standing in for an external server on `port`.
    pub fn external_database(&self, port: u16) -> Arc<MemoryDatabase> {
        Arc::clone(self.server.external.entry(port).or_default().value())
    }

    /// Builds a container outside the provider's own factory, e.g. for a
    /// container override. It shares this provider's counters.
    ///
    /// Fails once every mapped port above 20000 has been handed out.
    pub fn container(
        &self,
        image: impl Into<String>,
        aliases: Vec<String>
    ) -> Result<MemoryContainer, ContainerError> {
        let offset = self.server.next_port.fetch_add(1, Ordering::SeqCst);
        let port = u16::try_from(offset)
            .ok()
            .and_then(|offset| FIRST_MAPPED_PORT.checked_add(offset))
            .ok_or_else(|| ContainerError::new("create", "mapped port range exhausted"))?;

        self.server.counters.created.fetch_add(1, Ordering::SeqCst);
        let database = Arc::new(MemoryDatabase::default());
        self.server.databases.insert(port, Arc::clone(&database));
        Ok(MemoryContainer {
            image: image.into(),
            port,
            aliases,
            running: false,
            database,
            counters: Arc::clone(&self.server.counters)
        })
    }

    fn connection(&self, params: ConnectionParams, database: Arc<MemoryDatabase>) -> MemoryConnection {
        MemoryConnection {
            params,
            database,
            closed: AtomicBool::new(false)
        }
    }
}

#[async_trait]
impl ResourceProvider for MemoryProvider {
    type Connection = MemoryConnection;

    fn backend(&self) -> &'static str {
        "MEMORY"
    }

    fn scheme(&self) -> &'static str {
        "memory"
    }

    fn default_image(&self) -> &'static str {
        "harbor/memory:latest"
    }

    fn create_container(&self, key: &ResourceKey) -> Result<Box<dyn Container>, ContainerError> {
        let aliases = key.network_alias().map(str::to_string).into_iter().collect();
        Ok(Box::new(self.container(key.image(), aliases)?))
    }

    async fn connect(&self, container: &dyn Container) -> Result<MemoryConnection, ContainerError> {
        let host = container.host().await?;
        let port = container.mapped_port(MEMORY_PORT).await?;
        let database = self
            .server
            .databases
            .get(&port)
            .map(|db| Arc::clone(db.value()))
            .ok_or_else(|| ContainerError::new("connect", format!("nothing listens on port {}", port)))?;
        Ok(self.connection(ConnectionParams::new("memory", host, port), database))
    }

    async fn connect_external(&self, params: &ConnectionParams) -> Result<MemoryConnection, ContainerError> {
        Ok(self.connection(params.clone(), self.external_database(params.port)))
    }
}

//! Redis backend: testcontainers `redis` module plus a redis-rs
//! connection manager.

use async_trait::async_trait;
use config::{HarborSettings, load_settings_from_env};
use errors::{ContainerError, StatementError};
use hb_core::{Connection, ConnectionParams, Container, ResourceKey, ResourceProvider};
use redis::AsyncCommands;
use redis::aio::ConnectionManager;
use testcontainers_modules::redis::Redis;
use tracing::debug;

use crate::container::TestcontainersContainer;

pub const REDIS_PORT: u16 = 6379;

#[derive(Debug, Clone)]
pub struct RedisProvider {
    network: String
}

impl RedisProvider {
    pub fn new(network: impl Into<String>) -> Self {
        Self {
            network: network.into()
        }
    }

    /// Joins the network named in `settings`; `HARBOR_NETWORK` still wins.
    pub fn from_settings(settings: &HarborSettings) -> Self {
        Self::new(load_settings_from_env(settings.clone()).network)
    }
}

impl Default for RedisProvider {
    fn default() -> Self {
        Self::from_settings(&HarborSettings::default())
    }
}

#[async_trait]
impl ResourceProvider for RedisProvider {
    type Connection = RedisConnection;

    fn backend(&self) -> &'static str {
        "REDIS"
    }

    fn scheme(&self) -> &'static str {
        "redis"
    }

    fn default_image(&self) -> &'static str {
        "redis:7-alpine"
    }

    fn create_container(&self, key: &ResourceKey) -> Result<Box<dyn Container>, ContainerError> {
        Ok(Box::new(TestcontainersContainer::new(Redis::default(), key, &self.network)))
    }

    async fn connect(&self, container: &dyn Container) -> Result<RedisConnection, ContainerError> {
        let params = ConnectionParams::new(
            self.scheme(),
            container.host().await?,
            container.mapped_port(REDIS_PORT).await?
        );
        RedisConnection::connect(params).await
    }

    async fn connect_external(&self, params: &ConnectionParams) -> Result<RedisConnection, ContainerError> {
        RedisConnection::connect(params.clone()).await
    }
}

pub struct RedisConnection {
    params: ConnectionParams,
    manager: ConnectionManager
}

impl RedisConnection {
    pub async fn connect(params: ConnectionParams) -> Result<Self, ContainerError> {
        let client = redis::Client::open(params.url()).map_err(|e| ContainerError::new("connect", e))?;
        let manager = client
            .get_connection_manager()
            .await
            .map_err(|e| ContainerError::new("connect", e))?;
        debug!(instance = %params, "Connected to Redis");
        Ok(Self { params, manager })
    }

    /// Cloned manager; clones share one multiplexed connection.
    pub fn manager(&self) -> ConnectionManager {
        self.manager.clone()
    }

    pub async fn count_keys(&self, pattern: &str) -> Result<usize, StatementError> {
        let mut conn = self.manager.clone();
        let keys: Vec<String> = conn
            .keys(pattern)
            .await
            .map_err(|e| StatementError::new(format!("KEYS {}", pattern), e))?;
        Ok(keys.len())
    }

    pub async fn flush(&self) -> Result<(), StatementError> {
        self.execute("FLUSHDB").await
    }
}

#[async_trait]
impl Connection for RedisConnection {
    fn params(&self) -> &ConnectionParams {
        &self.params
    }

    /// Runs one whitespace-separated command line, e.g. `SET user:1 alice`.
    async fn execute(&self, statement: &str) -> Result<(), StatementError> {
        let mut parts = statement.split_whitespace();
        let Some(name) = parts.next() else {
            return Err(StatementError::new(statement, "empty command"));
        };
        let mut cmd = redis::cmd(name);
        for arg in parts {
            cmd.arg(arg);
        }
        let mut conn = self.manager.clone();
        cmd.query_async::<redis::Value>(&mut conn)
            .await
            .map_err(|e| StatementError::new(statement, e))?;
        Ok(())
    }
}

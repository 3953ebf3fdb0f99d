//! PostgreSQL backend: testcontainers `postgres` module plus an sqlx pool.

use async_trait::async_trait;
use config::{HarborSettings, load_settings_from_env};
use errors::{ContainerError, StatementError};
use hb_core::{Connection, ConnectionParams, Container, ResourceKey, ResourceProvider};
use sqlx::postgres::PgPoolOptions;
use sqlx::{AssertSqlSafe, PgPool, Row};
use std::path::Path;
use testcontainers_modules::postgres::Postgres;
use tracing::debug;

use crate::container::TestcontainersContainer;

pub const POSTGRES_PORT: u16 = 5432;

#[derive(Debug, Clone)]
pub struct PostgresProvider {
    network: String,
    username: String,
    password: String,
    database: String
}

impl PostgresProvider {
    pub fn new(network: impl Into<String>) -> Self {
        Self {
            network: network.into(),
            username: "test".to_string(),
            password: "test".to_string(),
            database: "test".to_string()
        }
    }

    /// Joins the network named in `settings`; `HARBOR_NETWORK` still wins.
    pub fn from_settings(settings: &HarborSettings) -> Self {
        Self::new(load_settings_from_env(settings.clone()).network)
    }

    pub fn with_credentials(mut self, username: impl Into<String>, password: impl Into<String>) -> Self {
        self.username = username.into();
        self.password = password.into();
        self
    }

    pub fn with_database(mut self, database: impl Into<String>) -> Self {
        self.database = database.into();
        self
    }
}

impl Default for PostgresProvider {
    fn default() -> Self {
        Self::from_settings(&HarborSettings::default())
    }
}

#[async_trait]
impl ResourceProvider for PostgresProvider {
    type Connection = PostgresConnection;

    fn backend(&self) -> &'static str {
        "POSTGRES"
    }

    fn scheme(&self) -> &'static str {
        "postgres"
    }

    fn default_image(&self) -> &'static str {
        "postgres:16-alpine"
    }

    fn create_container(&self, key: &ResourceKey) -> Result<Box<dyn Container>, ContainerError> {
        let image = Postgres::default()
            .with_db_name(&self.database)
            .with_user(&self.username)
            .with_password(&self.password);
        Ok(Box::new(TestcontainersContainer::new(image, key, &self.network)))
    }

    async fn connect(&self, container: &dyn Container) -> Result<PostgresConnection, ContainerError> {
        let params = ConnectionParams::new(
            self.scheme(),
            container.host().await?,
            container.mapped_port(POSTGRES_PORT).await?
        )
        .with_credentials(&self.username, &self.password)
        .with_database(&self.database);
        PostgresConnection::connect(params).await
    }

    async fn connect_external(&self, params: &ConnectionParams) -> Result<PostgresConnection, ContainerError> {
        PostgresConnection::connect(params.clone()).await
    }
}

pub struct PostgresConnection {
    params: ConnectionParams,
    pool: PgPool
}

impl PostgresConnection {
    pub async fn connect(params: ConnectionParams) -> Result<Self, ContainerError> {
        let pool = PgPoolOptions::new()
            .max_connections(5)
            .connect(&params.url())
            .await
            .map_err(|e| ContainerError::new("connect", e))?;
        debug!(instance = %params, "Connected to PostgreSQL");
        Ok(Self { params, pool })
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Runs every statement of a SQL file in order.
    pub async fn execute_file(&self, path: impl AsRef<Path>) -> Result<(), StatementError> {
        let path = path.as_ref();
        let script = std::fs::read_to_string(path)
            .map_err(|e| StatementError::new(path.display().to_string(), e))?;
        for statement in migration::statements::split_statements(&script) {
            self.execute(&statement).await?;
        }
        Ok(())
    }

    pub async fn query_one_i64(&self, sql: &str) -> Result<i64, StatementError> {
        let row = sqlx::query(AssertSqlSafe(sql))
            .fetch_one(&self.pool)
            .await
            .map_err(|e| StatementError::new(sql, e))?;
        row.try_get::<i64, _>(0).map_err(|e| StatementError::new(sql, e))
    }

    pub async fn count(&self, table: &str) -> Result<i64, StatementError> {
        self.query_one_i64(&format!("SELECT count(*) FROM {}", table))
            .await
    }

    /// Panics unless `table` holds exactly `expected` rows.
    pub async fn assert_count_equals(&self, expected: i64, table: &str) {
        match self.count(table).await {
            Ok(actual) => assert_eq!(actual, expected, "row count of {}", table),
            Err(e) => panic!("counting rows of {} failed: {}", table, e)
        }
    }
}

#[async_trait]
impl Connection for PostgresConnection {
    fn params(&self) -> &ConnectionParams {
        &self.params
    }

    async fn execute(&self, statement: &str) -> Result<(), StatementError> {
        sqlx::query(AssertSqlSafe(statement))
            .execute(&self.pool)
            .await
            .map_err(|e| StatementError::new(statement, e))?;
        Ok(())
    }

    async fn close(&self) {
        self.pool.close().await;
    }
}

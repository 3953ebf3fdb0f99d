//! # Migration Dispatch
//!
//! Routes apply/drop requests to one of a closed set of engines:
//!
//! - `SCRIPTS`: plain script files, forward-only; drop re-executes
//!   `drop*` scripts found at the same locations
//! - `FLYWAY`: versioned `V<version>__<desc>.sql` files with `U<version>__`
//!   undo scripts
//! - `LIQUIBASE`: YAML changelogs of change sets with rollbacks
//! - `COGNITOR`: versioned CQL files
//!
//! Every call is awaited in-line and either completes or fails with
//! `LifecycleError::MigrationError`. Drop is never assumed to be the exact
//! inverse of apply.

mod cognitor;
mod flyway;
mod liquibase;
pub mod locations;
mod scripts;
pub mod statements;

use errors::{LifecycleError, LifecycleResult};
use hb_core::{Connection, MigrationEngine, MigrationPolicy};
use std::path::{Path, PathBuf};
use tracing::{debug, info, instrument};

use crate::locations::MigrationFile;

/// Applies and drops migrations relative to a fixed root directory.
#[derive(Debug, Clone)]
pub struct MigrationRunner {
    root: PathBuf
}

impl MigrationRunner {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    #[instrument(skip(self, conn, policy), fields(engine = %policy.engine))]
    pub async fn apply(&self, conn: &dyn Connection, policy: &MigrationPolicy) -> LifecycleResult<()> {
        apply(policy.engine, conn, &self.root, &policy.locations).await
    }

    #[instrument(skip(self, conn, policy), fields(engine = %policy.engine))]
    pub async fn drop(&self, conn: &dyn Connection, policy: &MigrationPolicy) -> LifecycleResult<()> {
        drop(policy.engine, conn, &self.root, &policy.locations).await
    }
}

pub async fn apply(
    engine: MigrationEngine,
    conn: &dyn Connection,
    root: &Path,
    locations: &[String]
) -> LifecycleResult<()> {
    info!(%engine, ?locations, "Applying migrations");
    match engine {
        MigrationEngine::None => Ok(()),
        MigrationEngine::Scripts => scripts::apply(conn, root, locations).await,
        MigrationEngine::Flyway => flyway::apply(conn, root, locations).await,
        MigrationEngine::Liquibase => liquibase::apply(conn, root, locations).await,
        MigrationEngine::Cognitor => cognitor::apply(conn, root, locations).await
    }
}

pub async fn drop(
    engine: MigrationEngine,
    conn: &dyn Connection,
    root: &Path,
    locations: &[String]
) -> LifecycleResult<()> {
    info!(%engine, ?locations, "Dropping migrations");
    match engine {
        MigrationEngine::None => Ok(()),
        MigrationEngine::Scripts => scripts::drop(conn, root, locations).await,
        MigrationEngine::Flyway => flyway::drop(conn, root, locations).await,
        MigrationEngine::Liquibase => liquibase::drop(conn, root, locations).await,
        MigrationEngine::Cognitor => cognitor::drop(conn, root, locations).await
    }
}

/// Executes statements one by one; the first failure aborts the script.
async fn execute_all<S: AsRef<str>>(
    engine: MigrationEngine,
    conn: &dyn Connection,
    origin: &str,
    statements: &[S]
) -> LifecycleResult<()> {
    for statement in statements {
        conn.execute(statement.as_ref())
            .await
            .map_err(|e| LifecycleError::migration(engine, origin, e))?;
    }
    debug!(%engine, origin, count = statements.len(), "Executed statements");
    Ok(())
}

async fn execute_file(
    engine: MigrationEngine,
    conn: &dyn Connection,
    file: &MigrationFile
) -> LifecycleResult<Vec<String>> {
    let script = file.read(engine)?;
    let statements = statements::split_statements(&script);
    execute_all(engine, conn, &file.path.display().to_string(), &statements).await?;
    Ok(statements)
}

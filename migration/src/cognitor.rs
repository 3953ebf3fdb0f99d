//! Versioned CQL engine in the Cognitor naming convention.
//!
//! Files are named `<version>_<name>.cql` and apply in numeric version
//! order. CQL has no transactional DDL, so drop removes every table the
//! scripts create, newest first.

use errors::{LifecycleError, LifecycleResult};
use hb_core::{Connection, MigrationEngine};
use std::path::Path;
use tracing::debug;

use crate::locations::{MigrationFile, collect_files};
use crate::statements::{created_tables, split_statements};
use crate::{execute_all, execute_file};

const ENGINE: MigrationEngine = MigrationEngine::Cognitor;
const EXTENSIONS: [&str; 1] = ["cql"];

fn versioned(files: &[MigrationFile]) -> LifecycleResult<Vec<(u64, &MigrationFile)>> {
    let mut scripts: Vec<(u64, &MigrationFile)> = files
        .iter()
        .filter_map(|file| {
            let version = file
                .stem()
                .split_once('_')
                .and_then(|(version, _)| version.parse::<u64>().ok());
            if version.is_none() {
                debug!(file = %file.name, "Ignoring unversioned CQL file");
            }
            version.map(|v| (v, file))
        })
        .collect();
    scripts.sort_by_key(|(version, _)| *version);

    if let Some(pair) = scripts.windows(2).find(|pair| pair[0].0 == pair[1].0) {
        return Err(LifecycleError::migration(
            ENGINE,
            pair[1].1.path.display().to_string(),
            format!("duplicate version {} also used by {}", pair[0].0, pair[0].1.name)
        ));
    }
    Ok(scripts)
}

pub(crate) async fn apply(conn: &dyn Connection, root: &Path, locations: &[String]) -> LifecycleResult<()> {
    let files = collect_files(ENGINE, root, locations, &EXTENSIONS)?;
    for (_, file) in versioned(&files)? {
        execute_file(ENGINE, conn, file).await?;
    }
    Ok(())
}

pub(crate) async fn drop(conn: &dyn Connection, root: &Path, locations: &[String]) -> LifecycleResult<()> {
    let files = collect_files(ENGINE, root, locations, &EXTENSIONS)?;
    let mut statements = Vec::new();
    for (_, file) in versioned(&files)? {
        statements.extend(split_statements(&file.read(ENGINE)?));
    }

    let drops: Vec<String> = created_tables(&statements)
        .into_iter()
        .rev()
        .map(|table| format!("DROP TABLE IF EXISTS {}", table))
        .collect();
    execute_all(ENGINE, conn, &locations.join(","), &drops).await
}

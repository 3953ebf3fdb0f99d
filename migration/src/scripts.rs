//! Plain script engine.
//!
//! Forward-only: apply runs every script that is not a drop script; drop
//! re-executes the `drop*` scripts found at the same locations.

use errors::LifecycleResult;
use hb_core::{Connection, MigrationEngine};
use std::path::Path;
use tracing::warn;

use crate::execute_file;
use crate::locations::{MigrationFile, collect_files};

const ENGINE: MigrationEngine = MigrationEngine::Scripts;
const EXTENSIONS: [&str; 2] = ["sql", "cql"];

fn is_drop_script(file: &MigrationFile) -> bool {
    file.stem().to_ascii_lowercase().starts_with("drop")
}

pub(crate) async fn apply(conn: &dyn Connection, root: &Path, locations: &[String]) -> LifecycleResult<()> {
    let files = collect_files(ENGINE, root, locations, &EXTENSIONS)?;
    for file in files.iter().filter(|f| !is_drop_script(f)) {
        execute_file(ENGINE, conn, file).await?;
    }
    Ok(())
}

pub(crate) async fn drop(conn: &dyn Connection, root: &Path, locations: &[String]) -> LifecycleResult<()> {
    let files = collect_files(ENGINE, root, locations, &EXTENSIONS)?;
    let drops: Vec<_> = files.iter().filter(|f| is_drop_script(f)).collect();
    if drops.is_empty() {
        warn!(?locations, "No drop scripts found; nothing to drop");
        return Ok(());
    }
    for file in drops {
        execute_file(ENGINE, conn, file).await?;
    }
    Ok(())
}

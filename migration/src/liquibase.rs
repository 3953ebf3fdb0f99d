//! Changelog engine in the Liquibase YAML format.
//!
//! ```yaml
//! databaseChangeLog:
//!   - changeSet:
//!       id: 1
//!       author: harbor
//!       sql: CREATE TABLE users(id INT)
//!       rollback: DROP TABLE users
//!   - changeSet:
//!       id: 2
//!       author: harbor
//!       sqlFile: 002_seed.sql
//!   - include:
//!       file: more/changelog.yaml
//! ```
//!
//! Apply runs change sets in order; drop runs their rollbacks in reverse
//! order. `sqlFile` and `include` paths are relative to the changelog.

use errors::{LifecycleError, LifecycleResult};
use hb_core::{Connection, MigrationEngine};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use tracing::debug;

use crate::execute_all;
use crate::locations::{collect_files, resolve};
use crate::statements::split_statements;

const ENGINE: MigrationEngine = MigrationEngine::Liquibase;
const EXTENSIONS: [&str; 2] = ["yaml", "yml"];
const MAX_INCLUDE_DEPTH: usize = 16;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ChangeLog {
    #[serde(default)]
    database_change_log: Vec<Entry>
}

/// One list item: either `changeSet:` or `include:`.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Entry {
    #[serde(default)]
    change_set: Option<ChangeSetSpec>,
    #[serde(default)]
    include: Option<Include>
}

#[derive(Debug, Deserialize)]
struct Include {
    file: String
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum ChangeSetId {
    Number(i64),
    Text(String)
}

impl std::fmt::Display for ChangeSetId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Number(n) => write!(f, "{}", n),
            Self::Text(s) => write!(f, "{}", s)
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ChangeSetSpec {
    id: ChangeSetId,
    #[serde(default)]
    author: Option<String>,
    #[serde(default)]
    sql: Option<String>,
    #[serde(default)]
    sql_file: Option<String>,
    #[serde(default)]
    rollback: Option<String>
}

/// A change set with its SQL already loaded.
#[derive(Debug)]
struct ChangeSet {
    origin: String,
    statements: Vec<String>,
    rollback: Vec<String>
}

fn load_changelog(path: &Path, depth: usize, out: &mut Vec<ChangeSet>) -> LifecycleResult<()> {
    let location = path.display().to_string();
    if depth > MAX_INCLUDE_DEPTH {
        return Err(LifecycleError::migration(
            ENGINE,
            location,
            "include depth exceeded; check for include cycles"
        ));
    }

    let contents = std::fs::read_to_string(path)
        .map_err(|e| LifecycleError::migration(ENGINE, location.clone(), e))?;
    let changelog: ChangeLog = serde_yaml::from_str(&contents)
        .map_err(|e| LifecycleError::migration(ENGINE, location.clone(), e))?;
    let base = path.parent().map(Path::to_path_buf).unwrap_or_default();

    for entry in changelog.database_change_log {
        match (entry.change_set, entry.include) {
            (None, Some(include)) => {
                load_changelog(&resolve(&base, &include.file), depth + 1, out)?;
            }
            (None, None) | (Some(_), Some(_)) => {
                return Err(LifecycleError::migration(
                    ENGINE,
                    location,
                    "each changelog entry needs exactly one of changeSet or include"
                ));
            }
            (Some(spec), None) => {
                let origin = format!(
                    "{}#{}:{}",
                    location,
                    spec.id,
                    spec.author.as_deref().unwrap_or("unknown")
                );
                let mut statements = Vec::new();
                if let Some(sql) = &spec.sql {
                    statements.extend(split_statements(sql));
                }
                if let Some(file) = &spec.sql_file {
                    let sql_path: PathBuf = resolve(&base, file);
                    let sql = std::fs::read_to_string(&sql_path).map_err(|e| {
                        LifecycleError::migration(ENGINE, sql_path.display().to_string(), e)
                    })?;
                    statements.extend(split_statements(&sql));
                }
                if statements.is_empty() {
                    return Err(LifecycleError::migration(
                        ENGINE,
                        origin,
                        "change set has neither sql nor sqlFile"
                    ));
                }
                let rollback = spec
                    .rollback
                    .as_deref()
                    .map(split_statements)
                    .unwrap_or_default();
                out.push(ChangeSet {
                    origin,
                    statements,
                    rollback
                });
            }
        }
    }
    Ok(())
}

fn change_sets(root: &Path, locations: &[String]) -> LifecycleResult<Vec<ChangeSet>> {
    let mut sets = Vec::new();
    for changelog in collect_files(ENGINE, root, locations, &EXTENSIONS)? {
        load_changelog(&changelog.path, 0, &mut sets)?;
    }
    Ok(sets)
}

pub(crate) async fn apply(conn: &dyn Connection, root: &Path, locations: &[String]) -> LifecycleResult<()> {
    for set in change_sets(root, locations)? {
        execute_all(ENGINE, conn, &set.origin, &set.statements).await?;
    }
    Ok(())
}

pub(crate) async fn drop(conn: &dyn Connection, root: &Path, locations: &[String]) -> LifecycleResult<()> {
    for set in change_sets(root, locations)?.iter().rev() {
        if set.rollback.is_empty() {
            debug!(change_set = %set.origin, "No rollback declared; skipping");
            continue;
        }
        execute_all(ENGINE, conn, &set.origin, &set.rollback).await?;
    }
    Ok(())
}

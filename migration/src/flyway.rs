//! Versioned script engine in the Flyway naming convention.
//!
//! `V<version>__<description>.sql` files apply in ascending version order.
//! Drop runs `U<version>__<description>.sql` undo files in descending order;
//! without undo files it drops the tables the versioned scripts create, in
//! reverse creation order.

use errors::{LifecycleError, LifecycleResult};
use hb_core::{Connection, MigrationEngine};
use std::cmp::Ordering;
use std::path::Path;
use tracing::debug;

use crate::locations::{MigrationFile, collect_files};
use crate::statements::{created_tables, split_statements};
use crate::{execute_all, execute_file};

const ENGINE: MigrationEngine = MigrationEngine::Flyway;
const EXTENSIONS: [&str; 1] = ["sql"];

/// Dotted or underscored version, compared segment-wise (`1.10 > 1.9`).
#[derive(Debug, Clone)]
struct Version(Vec<u64>);

impl PartialEq for Version {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for Version {}

impl Ord for Version {
    fn cmp(&self, other: &Self) -> Ordering {
        let len = self.0.len().max(other.0.len());
        for i in 0..len {
            let a = self.0.get(i).copied().unwrap_or(0);
            let b = other.0.get(i).copied().unwrap_or(0);
            match a.cmp(&b) {
                Ordering::Equal => continue,
                non_eq => return non_eq
            }
        }
        Ordering::Equal
    }
}

impl PartialOrd for Version {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Kind {
    Versioned,
    Undo
}

struct Script<'a> {
    kind: Kind,
    version: Version,
    file: &'a MigrationFile
}

fn parse(file: &MigrationFile) -> Option<Script<'_>> {
    let stem = file.stem();
    let (kind, rest) = match stem.chars().next()? {
        'V' | 'v' => (Kind::Versioned, &stem[1..]),
        'U' | 'u' => (Kind::Undo, &stem[1..]),
        _ => return None
    };
    let (raw_version, _description) = rest.split_once("__")?;
    let version = raw_version
        .split(['.', '_'])
        .map(str::parse::<u64>)
        .collect::<Result<Vec<_>, _>>()
        .ok()?;
    Some(Script {
        kind,
        version: Version(version),
        file
    })
}

fn scripts<'a>(files: &'a [MigrationFile], kind: Kind) -> LifecycleResult<Vec<Script<'a>>> {
    let mut scripts: Vec<Script<'a>> = files
        .iter()
        .filter_map(|file| {
            let parsed = parse(file);
            if parsed.is_none() {
                debug!(file = %file.name, "Ignoring file outside the versioned naming scheme");
            }
            parsed
        })
        .filter(|s| s.kind == kind)
        .collect();
    scripts.sort_by(|a, b| a.version.cmp(&b.version));

    for pair in scripts.windows(2) {
        if pair[0].version == pair[1].version {
            return Err(LifecycleError::migration(
                ENGINE,
                pair[1].file.path.display().to_string(),
                format!("duplicate version also used by {}", pair[0].file.name)
            ));
        }
    }
    Ok(scripts)
}

pub(crate) async fn apply(conn: &dyn Connection, root: &Path, locations: &[String]) -> LifecycleResult<()> {
    let files = collect_files(ENGINE, root, locations, &EXTENSIONS)?;
    for script in scripts(&files, Kind::Versioned)? {
        execute_file(ENGINE, conn, script.file).await?;
    }
    Ok(())
}

pub(crate) async fn drop(conn: &dyn Connection, root: &Path, locations: &[String]) -> LifecycleResult<()> {
    let files = collect_files(ENGINE, root, locations, &EXTENSIONS)?;
    let undo = scripts(&files, Kind::Undo)?;

    if !undo.is_empty() {
        for script in undo.iter().rev() {
            execute_file(ENGINE, conn, script.file).await?;
        }
        return Ok(());
    }

    let mut statements = Vec::new();
    for script in scripts(&files, Kind::Versioned)? {
        statements.extend(split_statements(&script.file.read(ENGINE)?));
    }
    let drops: Vec<String> = created_tables(&statements)
        .into_iter()
        .rev()
        .map(|table| format!("DROP TABLE IF EXISTS {}", table))
        .collect();
    execute_all(ENGINE, conn, &locations.join(","), &drops).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::RecordingConnection;

    #[test]
    fn test_version_ordering() {
        assert!(Version(vec![1, 10]) > Version(vec![1, 9]));
        assert_eq!(Version(vec![2]), Version(vec![2]));
        assert_eq!(Version(vec![2, 0]), Version(vec![2]));
    }

    #[tokio::test]
    async fn test_applies_in_version_order() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("V1.10__late.sql"), "CREATE TABLE c(id INT);").unwrap();
        std::fs::write(dir.path().join("V1.2__second.sql"), "CREATE TABLE b(id INT);").unwrap();
        std::fs::write(dir.path().join("V1__first.sql"), "CREATE TABLE a(id INT);").unwrap();
        std::fs::write(dir.path().join("notes.sql"), "SELECT 1;").unwrap();

        let conn = RecordingConnection::new();
        apply(&conn, dir.path(), &[".".to_string()]).await.unwrap();

        assert_eq!(
            conn.statements(),
            vec!["CREATE TABLE a(id INT)", "CREATE TABLE b(id INT)", "CREATE TABLE c(id INT)"]
        );
    }

    #[tokio::test]
    async fn test_drop_prefers_undo_scripts() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("V1__a.sql"), "CREATE TABLE a(id INT);").unwrap();
        std::fs::write(dir.path().join("V2__b.sql"), "CREATE TABLE b(id INT);").unwrap();
        std::fs::write(dir.path().join("U1__a.sql"), "DROP TABLE a;").unwrap();
        std::fs::write(dir.path().join("U2__b.sql"), "DROP TABLE b;").unwrap();

        let conn = RecordingConnection::new();
        drop(&conn, dir.path(), &[".".to_string()]).await.unwrap();

        assert_eq!(conn.statements(), vec!["DROP TABLE b", "DROP TABLE a"]);
    }

    #[tokio::test]
    async fn test_drop_falls_back_to_created_tables() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("V1__a.sql"), "CREATE TABLE a(id INT);").unwrap();
        std::fs::write(
            dir.path().join("V2__b.sql"),
            "CREATE TABLE IF NOT EXISTS b(id INT); INSERT INTO b VALUES (1);"
        )
        .unwrap();

        let conn = RecordingConnection::new();
        drop(&conn, dir.path(), &[".".to_string()]).await.unwrap();

        assert_eq!(
            conn.statements(),
            vec!["DROP TABLE IF EXISTS b", "DROP TABLE IF EXISTS a"]
        );
    }

    #[tokio::test]
    async fn test_duplicate_versions_rejected() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("V1__a.sql"), "CREATE TABLE a(id INT);").unwrap();
        std::fs::write(dir.path().join("V1.0__b.sql"), "CREATE TABLE b(id INT);").unwrap();

        let conn = RecordingConnection::new();
        let err = apply(&conn, dir.path(), &[".".to_string()]).await.unwrap_err();
        assert!(err.to_string().contains("duplicate version"));
        assert!(conn.statements().is_empty());
    }
}

//! Location resolution.
//!
//! A location is a file or a directory, absolute or relative to the
//! migration root. Directories are walked recursively; files come back
//! sorted by file name so numbered scripts run in order.

use errors::{LifecycleError, LifecycleResult};
use hb_core::MigrationEngine;
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MigrationFile {
    pub path: PathBuf,
    pub name: String
}

impl MigrationFile {
    pub fn stem(&self) -> &str {
        self.name
            .rsplit_once('.')
            .map_or(self.name.as_str(), |(stem, _)| stem)
    }

    pub fn extension(&self) -> Option<&str> {
        self.name.rsplit_once('.').map(|(_, ext)| ext)
    }

    pub fn read(&self, engine: MigrationEngine) -> LifecycleResult<String> {
        std::fs::read_to_string(&self.path)
            .map_err(|e| LifecycleError::migration(engine, self.path.display().to_string(), e))
    }
}

pub fn resolve(root: &Path, location: &str) -> PathBuf {
    let path = Path::new(location);
    if path.is_absolute() {
        path.to_path_buf()
    } else {
        root.join(path)
    }
}

/// Collects files under every location whose extension is in `extensions`.
///
/// A location that does not exist is a migration error.
pub fn collect_files(
    engine: MigrationEngine,
    root: &Path,
    locations: &[String],
    extensions: &[&str]
) -> LifecycleResult<Vec<MigrationFile>> {
    let mut files = Vec::new();

    for location in locations {
        let path = resolve(root, location);
        if !path.exists() {
            return Err(LifecycleError::migration(
                engine,
                path.display().to_string(),
                "location does not exist"
            ));
        }

        let mut found: Vec<MigrationFile> = WalkDir::new(&path)
            .follow_links(true)
            .into_iter()
            .filter_map(Result::ok)
            .filter(|entry| entry.file_type().is_file())
            .filter_map(|entry| {
                let name = entry.file_name().to_str()?.to_string();
                let file = MigrationFile {
                    path: entry.into_path(),
                    name
                };
                let matches = file
                    .extension()
                    .is_some_and(|ext| extensions.iter().any(|e| e.eq_ignore_ascii_case(ext)));
                matches.then_some(file)
            })
            .collect();

        found.sort_by(|a, b| a.name.cmp(&b.name));
        files.extend(found);
    }

    Ok(files)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_collects_sorted_files_with_matching_extension() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("02_data.sql"), "").unwrap();
        std::fs::write(dir.path().join("01_schema.SQL"), "").unwrap();
        std::fs::write(dir.path().join("README.md"), "").unwrap();

        let files = collect_files(
            MigrationEngine::Scripts,
            dir.path(),
            &[".".to_string()],
            &["sql"]
        )
        .unwrap();

        let names: Vec<_> = files.iter().map(|f| f.name.as_str()).collect();
        assert_eq!(names, vec!["01_schema.SQL", "02_data.sql"]);
        assert_eq!(files[0].stem(), "01_schema");
    }

    #[test]
    fn test_single_file_location() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("init.sql"), "").unwrap();

        let files = collect_files(
            MigrationEngine::Scripts,
            dir.path(),
            &["init.sql".to_string()],
            &["sql"]
        )
        .unwrap();
        assert_eq!(files.len(), 1);
    }

    #[test]
    fn test_missing_location_fails() {
        let dir = tempfile::tempdir().unwrap();
        let err = collect_files(
            MigrationEngine::Flyway,
            dir.path(),
            &["nope".to_string()],
            &["sql"]
        )
        .unwrap_err();
        assert!(err.to_string().contains("FLYWAY"));
    }
}

//! # Configuration Structures
//!
//! Process-level settings and the declaration file format.
//!
//! All configuration structures:
//! - Use `serde` for serialization/deserialization
//! - Use `validator` for input validation

use hb_core::ResourceDeclaration;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::PathBuf;
use validator::Validate;

/// Top-level declaration file.
///
/// ## Usage
/// ```toml
/// [resources.POSTGRES]
/// image = "${PG_IMAGE|postgres:16-alpine}"
/// mode = "RUN"
///
/// [resources.POSTGRES.migration]
/// engine = "SCRIPTS"
/// apply = "PER_CLASS"
/// drop = "PER_CLASS"
/// locations = ["migrations"]
/// ```
///
/// ## Validation
/// An omitted image falls back to the backend's default image; an enabled
/// migration engine needs at least one location.
#[derive(Debug, Clone, Serialize, Deserialize, Validate, Default, PartialEq)]
pub struct HarborConfig {
    /// Process-level settings; environment variables win over these.
    #[serde(default)]
    #[validate(nested)]
    pub settings: HarborSettings,

    /// Declarations keyed by upper-case backend name.
    #[serde(default)]
    #[validate(custom(function = "crate::validation::validate_resources"))]
    pub resources: BTreeMap<String, ResourceDeclaration>
}

impl HarborConfig {
    pub fn declaration(&self, backend: &str) -> Option<&ResourceDeclaration> {
        self.resources.get(&backend.to_ascii_uppercase())
    }
}

/// Process-level settings.
///
/// ## Fields
/// - `migration_root`: base directory for relative migration locations
///   (default: current directory)
/// - `network`: docker network joined by shared-network resources
///   (default: "harbor")
/// - `log_filter`: tracing filter directive (default: "info")
#[derive(Debug, Clone, Serialize, Deserialize, Validate, PartialEq)]
pub struct HarborSettings {
    /// Base directory for relative migration locations
    #[serde(default = "default_migration_root")]
    pub migration_root: PathBuf,

    /// Docker network for shared-network resources
    #[serde(default = "default_network")]
    #[validate(length(min = 1, max = 255))]
    pub network: String,

    /// Tracing filter directive
    #[serde(default = "default_log_filter")]
    #[validate(length(min = 1))]
    pub log_filter: String
}

fn default_migration_root() -> PathBuf {
    PathBuf::from(".")
}

fn default_network() -> String {
    "harbor".to_string()
}

fn default_log_filter() -> String {
    "info".to_string()
}

impl Default for HarborSettings {
    fn default() -> Self {
        Self {
            migration_root: default_migration_root(),
            network: default_network(),
            log_filter: default_log_filter()
        }
    }
}

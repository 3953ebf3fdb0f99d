//! # Declaration File Loading
//!
//! Loads resource declarations from TOML or YAML files.
//!
//! Supports automatic format detection based on file extension.

use crate::config::HarborConfig;
use std::path::Path;
use validator::Validate;

/// Declaration file loading error.
#[derive(Debug, thiserror::Error)]
pub enum ConfigFileError {
    #[error("File not found: {0}")]
    FileNotFound(String),

    #[error("Failed to parse TOML: {0}")]
    TomlParse(String),

    #[error("Failed to parse YAML: {0}")]
    YamlParse(String),

    #[error("Config file has no extension")]
    NoExtension,

    #[error("Unsupported config file format: {0}")]
    UnsupportedFormat(String),

    #[error("Invalid declarations: {0}")]
    Invalid(#[from] validator::ValidationErrors)
}

impl From<ConfigFileError> for errors::LifecycleError {
    fn from(err: ConfigFileError) -> Self {
        errors::LifecycleError::configuration(err.to_string())
    }
}

/// Load declarations from a TOML file.
///
/// ## Error Handling
/// Returns `ConfigFileError` for:
/// - File not found
/// - Invalid TOML syntax
/// - Declarations failing validation
pub fn load_from_toml(path: &Path) -> Result<HarborConfig, ConfigFileError> {
    let contents = std::fs::read_to_string(path)
        .map_err(|_e| ConfigFileError::FileNotFound(path.display().to_string()))?;

    let config: HarborConfig =
        toml::from_str(&contents).map_err(|e| ConfigFileError::TomlParse(e.to_string()))?;

    config.validate()?;
    Ok(config)
}

/// Load declarations from a YAML file.
///
/// ## Error Handling
/// Returns `ConfigFileError` for:
/// - File not found
/// - Invalid YAML syntax
/// - Declarations failing validation
pub fn load_from_yaml(path: &Path) -> Result<HarborConfig, ConfigFileError> {
    let contents = std::fs::read_to_string(path)
        .map_err(|_e| ConfigFileError::FileNotFound(path.display().to_string()))?;

    let config: HarborConfig =
        serde_yaml::from_str(&contents).map_err(|e| ConfigFileError::YamlParse(e.to_string()))?;

    config.validate()?;
    Ok(config)
}

/// Load declarations from file, detecting format from the extension
/// (`.toml`, `.yaml`, `.yml`).
pub fn load_from_file(path: &Path) -> Result<HarborConfig, ConfigFileError> {
    let extension = path
        .extension()
        .and_then(|s| s.to_str())
        .ok_or(ConfigFileError::NoExtension)?;

    match extension.to_lowercase().as_str() {
        "toml" => load_from_toml(path),
        "yaml" | "yml" => load_from_yaml(path),
        other => Err(ConfigFileError::UnsupportedFormat(other.to_string()))
    }
}

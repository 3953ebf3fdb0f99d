//! # Configuration System
//!
//! Configuration for the Harbor test-resource lifecycle core.
//!
//! This crate provides:
//! - Process settings (migration root, docker network, log filter)
//! - External-instance overrides read from `EXTERNAL_TEST_<BACKEND>_*`
//! - Declaration file loading (TOML/YAML)
//! - `${ENV|default}` image placeholders
//! - Scope and migration-policy validation
//!
//! # Best Practices
//!
//! - Uses `validator` crate for input validation
//! - Environment variables take precedence over file values

pub mod config;
pub mod file_loader;
pub mod image;
pub mod loader;
pub mod validation;

pub use config::{HarborConfig, HarborSettings};
pub use file_loader::{ConfigFileError, load_from_file, load_from_toml, load_from_yaml};
pub use image::{resolve_image, split_image};
pub use loader::{external_var, load_external, load_settings_from_env};
pub use validation::{needs_idempotent_migrations, validate, validate_declaration};
pub use validator::Validate;

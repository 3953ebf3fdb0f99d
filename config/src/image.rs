//! # Image Reference Resolution
//!
//! Image references may defer to the environment with a placeholder:
//! `${ENV_NAME|default-image}`. The variable wins when it is set and not
//! blank; otherwise the default after `|` is used.

use errors::{LifecycleError, LifecycleResult};
use std::env;

/// Resolve an image reference, expanding a `${ENV|default}` placeholder.
///
/// ## Usage
/// ```rust,no_run
/// use config::resolve_image;
///
/// let image = resolve_image("${PG_IMAGE|postgres:16-alpine}").unwrap();
/// println!("using {}", image);
/// ```
pub fn resolve_image(reference: &str) -> LifecycleResult<String> {
    let trimmed = reference.trim();
    let Some(inner) = trimmed
        .strip_prefix("${")
        .and_then(|rest| rest.strip_suffix('}'))
    else {
        if trimmed.is_empty() {
            return Err(LifecycleError::configuration("image must not be empty"));
        }
        return Ok(trimmed.to_string());
    };

    let (name, default) = match inner.split_once('|') {
        Some((name, default)) => (name.trim(), default.trim()),
        None => (inner.trim(), "")
    };

    if let Ok(value) = env::var(name) {
        if !value.trim().is_empty() {
            return Ok(value.trim().to_string());
        }
    }

    if default.is_empty() {
        return Err(LifecycleError::configuration(format!(
            "image placeholder {} has no value and no default",
            trimmed
        )));
    }
    Ok(default.to_string())
}

/// Split `name[:tag]` into its parts; the tag defaults to `latest`.
///
/// A colon inside a registry host (`localhost:5000/pg`) is not a tag.
pub fn split_image(image: &str) -> (&str, &str) {
    let last_slash = image.rfind('/').map_or(0, |i| i + 1);
    match image[last_slash..].rfind(':') {
        Some(colon) => {
            let at = last_slash + colon;
            (&image[..at], &image[at + 1..])
        }
        None => (image, "latest")
    }
}

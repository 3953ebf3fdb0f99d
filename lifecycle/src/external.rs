//! External-instance override.
//!
//! When `EXTERNAL_TEST_<BACKEND>_JDBC_URL` (or `_HOST` plus `_PORT`) is set,
//! every scope of that backend resolves to the one externally managed
//! instance instead of a container.

use errors::LifecycleResult;
use hb_core::ConnectionParams;
use std::collections::HashMap;

#[derive(Debug, Clone, Default)]
enum Source {
    #[default]
    Environment,
    Fixed(HashMap<String, ConnectionParams>),
    Disabled
}

/// Decides per backend whether an external instance replaces containers.
#[derive(Debug, Clone, Default)]
pub struct ExternalOverrideResolver {
    source: Source
}

impl ExternalOverrideResolver {
    /// Reads `EXTERNAL_TEST_<BACKEND>_*` on every lookup.
    pub fn from_env() -> Self {
        Self {
            source: Source::Environment
        }
    }

    /// Never overrides; every scope provisions containers.
    pub fn disabled() -> Self {
        Self {
            source: Source::Disabled
        }
    }

    /// Fixed overrides keyed by backend name, independent of the process
    /// environment.
    pub fn fixed<I>(overrides: I) -> Self
    where
        I: IntoIterator<Item = (String, ConnectionParams)>,
    {
        Self {
            source: Source::Fixed(
                overrides
                    .into_iter()
                    .map(|(backend, params)| (backend.to_ascii_uppercase(), params))
                    .collect()
            )
        }
    }

    pub fn resolve(&self, backend: &str, default_scheme: &str) -> LifecycleResult<Option<ConnectionParams>> {
        match &self.source {
            Source::Environment => config::load_external(backend, default_scheme),
            Source::Fixed(map) => Ok(map.get(&backend.to_ascii_uppercase()).cloned()),
            Source::Disabled => Ok(None)
        }
    }
}

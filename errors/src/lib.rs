//! # Harbor Errors
//!
//! Error taxonomy for the test-resource lifecycle core.
//!
//! Follows Microsoft Pragmatic Rust Guidelines:
//! - Uses `thiserror` for structured error definitions
//! - Provides `Display` and `Error` trait implementations
//! - Includes error context for debugging
//!
//! Every variant of [`LifecycleError`] is fatal to the test unit (or group)
//! whose hook raised it. Nothing in the core retries.

use thiserror::Error;

/// Errors surfaced by lifecycle hooks and connection resolution.
#[derive(Debug, Error)]
pub enum LifecycleError {
    /// Declared scope/policy combination is invalid, or no declaration is
    /// discoverable for a requested connection.
    #[error("Configuration error: {message}")]
    ConfigurationError { message: String },

    /// Container (or external instance) never reached a ready state.
    #[error("Resource {image} failed to start: {reason}")]
    ResourceStartError { image: String, reason: String },

    /// Migration apply or drop failed.
    #[error("Migration via {engine} failed at {location}: {reason}")]
    MigrationError {
        engine: String,
        location: String,
        reason: String
    },

    /// Requested connection type or scope does not match what is registered.
    #[error("Cannot inject {requested}: {reason}")]
    InjectionError { requested: String, reason: String }
}

impl LifecycleError {
    pub fn configuration(message: impl Into<String>) -> Self {
        Self::ConfigurationError {
            message: message.into()
        }
    }

    pub fn resource_start(image: impl Into<String>, reason: impl ToString) -> Self {
        Self::ResourceStartError {
            image: image.into(),
            reason: reason.to_string()
        }
    }

    pub fn migration(
        engine: impl ToString,
        location: impl Into<String>,
        reason: impl ToString
    ) -> Self {
        Self::MigrationError {
            engine: engine.to_string(),
            location: location.into(),
            reason: reason.to_string()
        }
    }

    pub fn injection(requested: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InjectionError {
            requested: requested.into(),
            reason: reason.into()
        }
    }

    pub fn is_configuration(&self) -> bool {
        matches!(self, Self::ConfigurationError { .. })
    }
}

pub type LifecycleResult<T> = Result<T, LifecycleError>;

/// Container runtime errors
#[derive(Debug, Error)]
#[error("Container {operation} failed: {reason}")]
pub struct ContainerError {
    pub operation: String,
    pub reason: String
}

impl ContainerError {
    pub fn new(operation: impl Into<String>, reason: impl ToString) -> Self {
        Self {
            operation: operation.into(),
            reason: reason.to_string()
        }
    }
}

/// Raw statement execution errors raised by connections
#[derive(Debug, Error)]
#[error("Statement `{statement}` failed: {reason}")]
pub struct StatementError {
    pub statement: String,
    pub reason: String
}

impl StatementError {
    pub fn new(statement: impl Into<String>, reason: impl ToString) -> Self {
        Self {
            statement: statement.into(),
            reason: reason.to_string()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_names_the_failing_piece() {
        let err = LifecycleError::migration("SCRIPTS", "db/init.sql", "syntax error");
        assert_eq!(
            err.to_string(),
            "Migration via SCRIPTS failed at db/init.sql: syntax error"
        );

        let err = LifecycleError::resource_start("postgres:16", "port never opened");
        assert!(err.to_string().contains("postgres:16"));
    }

    #[test]
    fn test_is_configuration() {
        assert!(LifecycleError::configuration("missing").is_configuration());
        assert!(!LifecycleError::injection("PostgresConnection", "wrong scope").is_configuration());
    }

    #[test]
    fn test_statement_error_keeps_statement() {
        let err = StatementError::new("CREATE TABLEX t", "unsupported statement");
        assert_eq!(err.statement, "CREATE TABLEX t");
        assert!(err.to_string().contains("unsupported statement"));
    }
}

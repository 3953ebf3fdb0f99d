//! # Declaration Validation
//!
//! Structural checks run through the `validator` crate, plus the scope and
//! migration-policy compatibility rules every lifecycle hook enforces.

use crate::config::HarborConfig;
use errors::{LifecycleError, LifecycleResult};
use hb_core::{MigrationScope, ResourceDeclaration, Scope};
use std::borrow::Cow;
use std::collections::BTreeMap;
use validator::{Validate, ValidationError};

/// Validate a whole declaration file.
pub fn validate(config: &HarborConfig) -> Result<(), validator::ValidationErrors> {
    config.validate()
}

pub(crate) fn validate_resources(
    resources: &BTreeMap<String, ResourceDeclaration>
) -> Result<(), ValidationError> {
    for (backend, decl) in resources {
        if let Err(err) = validate_declaration(decl) {
            let mut error = ValidationError::new("invalid_declaration");
            error.message = Some(Cow::Owned(format!("{}: {}", backend, err)));
            return Err(error);
        }
    }
    Ok(())
}

/// Scope/policy compatibility rules.
///
/// ## Rules
/// - a blank `image` is allowed and means the backend's default image
/// - an enabled engine needs at least one location
/// - apply/drop scopes require an enabled engine
/// - a METHOD-scoped resource cannot carry PER_CLASS apply or drop
/// - when both apply and drop are set they must fire at the same boundary
pub fn validate_declaration(decl: &ResourceDeclaration) -> LifecycleResult<()> {
    let policy = &decl.migration;
    if policy.is_enabled() && policy.locations.is_empty() {
        return Err(LifecycleError::configuration(format!(
            "migration engine {} requires at least one location",
            policy.engine
        )));
    }

    if !policy.is_enabled() && (policy.apply.is_set() || policy.drop.is_set()) {
        return Err(LifecycleError::configuration(format!(
            "migration apply={} drop={} declared without an engine",
            policy.apply, policy.drop
        )));
    }

    if decl.mode == Scope::Method {
        for (what, boundary) in [("apply", policy.apply), ("drop", policy.drop)] {
            if boundary == MigrationScope::PerClass {
                return Err(LifecycleError::configuration(format!(
                    "migration {} {} is not allowed for a {} scoped resource",
                    what, boundary, decl.mode
                )));
            }
        }
    }

    if policy.apply.is_set() && policy.drop.is_set() && policy.apply != policy.drop {
        return Err(LifecycleError::configuration(format!(
            "migration drop {} does not match apply {}",
            policy.drop, policy.apply
        )));
    }

    Ok(())
}

/// True when migrations re-run against a live schema at every method: apply
/// PER_METHOD on a resource that outlives the method, without a matching
/// drop. Such migrations must be idempotent.
pub fn needs_idempotent_migrations(decl: &ResourceDeclaration) -> bool {
    let policy = &decl.migration;
    policy.is_enabled()
        && policy.apply == MigrationScope::PerMethod
        && policy.drop != MigrationScope::PerMethod
        && decl.mode.outlives(Scope::Method)
}

#[cfg(test)]
mod tests {
    use super::*;
    use hb_core::{MigrationEngine, MigrationPolicy};

    fn scripts(apply: MigrationScope, drop: MigrationScope) -> MigrationPolicy {
        MigrationPolicy::new(MigrationEngine::Scripts, ["migrations"])
            .with_apply(apply)
            .with_drop(drop)
    }

    #[test]
    fn test_valid_class_declaration() {
        let decl = ResourceDeclaration::new("postgres:16", Scope::Class)
            .with_migration(scripts(MigrationScope::PerClass, MigrationScope::PerClass));
        assert!(validate_declaration(&decl).is_ok());
    }

    #[test]
    fn test_method_scope_rejects_per_class_apply() {
        let decl = ResourceDeclaration::new("postgres:16", Scope::Method)
            .with_migration(scripts(MigrationScope::PerClass, MigrationScope::None));
        let err = validate_declaration(&decl).unwrap_err();
        assert!(err.is_configuration());
    }

    #[test]
    fn test_method_scope_rejects_per_class_drop() {
        let decl = ResourceDeclaration::new("postgres:16", Scope::Method)
            .with_migration(scripts(MigrationScope::None, MigrationScope::PerClass));
        assert!(validate_declaration(&decl).is_err());
    }

    #[test]
    fn test_mismatched_apply_and_drop_rejected() {
        let decl = ResourceDeclaration::new("postgres:16", Scope::Run)
            .with_migration(scripts(MigrationScope::PerMethod, MigrationScope::PerClass));
        assert!(validate_declaration(&decl).is_err());

        let decl = ResourceDeclaration::new("postgres:16", Scope::Run)
            .with_migration(scripts(MigrationScope::PerClass, MigrationScope::PerMethod));
        assert!(validate_declaration(&decl).is_err());
    }

    #[test]
    fn test_engine_without_locations_rejected() {
        let decl = ResourceDeclaration::new("postgres:16", Scope::Class).with_migration(
            MigrationPolicy::new(MigrationEngine::Flyway, Vec::<String>::new())
                .with_apply(MigrationScope::PerClass)
        );
        assert!(validate_declaration(&decl).is_err());
    }

    #[test]
    fn test_scopes_without_engine_rejected() {
        let decl = ResourceDeclaration::new("postgres:16", Scope::Class)
            .with_migration(MigrationPolicy::none().with_apply(MigrationScope::PerClass));
        assert!(validate_declaration(&decl).is_err());
    }

    #[test]
    fn test_blank_image_defers_to_backend_default() {
        let decl = ResourceDeclaration::new("  ", Scope::Class);
        assert!(validate_declaration(&decl).is_ok());
    }

    #[test]
    fn test_idempotency_requirement() {
        let shared = ResourceDeclaration::new("postgres:16", Scope::Run)
            .with_migration(scripts(MigrationScope::PerMethod, MigrationScope::None));
        assert!(validate_declaration(&shared).is_ok());
        assert!(needs_idempotent_migrations(&shared));

        let dropped = ResourceDeclaration::new("postgres:16", Scope::Run)
            .with_migration(scripts(MigrationScope::PerMethod, MigrationScope::PerMethod));
        assert!(!needs_idempotent_migrations(&dropped));

        let per_method = ResourceDeclaration::new("postgres:16", Scope::Method)
            .with_migration(scripts(MigrationScope::PerMethod, MigrationScope::None));
        assert!(!needs_idempotent_migrations(&per_method));
    }

    #[test]
    fn test_validate_file_reports_backend() {
        let mut config = HarborConfig::default();
        config.resources.insert(
            "POSTGRES".to_string(),
            ResourceDeclaration::new("postgres:16", Scope::Method)
                .with_migration(scripts(MigrationScope::PerClass, MigrationScope::PerClass))
        );
        let errors = validate(&config).unwrap_err();
        assert!(errors.errors().contains_key("resources"));
    }
}

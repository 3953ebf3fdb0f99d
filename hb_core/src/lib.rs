//! # Harbor Core
//!
//! Shared types and traits for the Harbor test-resource lifecycle core.
//!
//! This crate provides:
//! - Scope and migration policy definitions
//! - Resource identity ([`ResourceKey`]) and declarations
//! - Contracts for the container runtime, connections and backend providers
//!
//! # Best Practices
//!
//! - Uses Rust Edition 2024
//! - Collaborator failures are typed via the `errors` crate

pub mod traits;
pub mod types;

// Re-export commonly used types for convenience
pub use traits::{Connection, Container, ResourceProvider};
pub use types::{
    ConnectionParams, MigrationEngine, MigrationPolicy, MigrationScope, NetworkSettings,
    ResourceDeclaration, ResourceKey, Scope
};

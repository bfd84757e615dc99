// Entity Store - data access layer for typed, owned, contained entities

// Entity framework - registry, factory, queries, lifecycle and permissions
pub mod ent_framework;

// Infrastructure - database, caching, access control and request plumbing
pub mod infrastructure;

// HTTP surface
pub mod app_state;
pub mod entity_interface;

// Common utilities
pub mod config;
pub mod error;

// Re-exports for convenience
pub use error::{AppError, AppResult};

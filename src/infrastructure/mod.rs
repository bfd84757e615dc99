// Core infrastructure modules
pub mod database;              // Storage trait and row types
pub mod sqlite_database;       // SQLite implementation of the storage trait
pub mod cache;                 // LRU-backed caches
pub mod viewer;                // Viewer context
pub mod access;                // Read-side access control
pub mod collaborators;         // Metadata, annotation and activity collaborators
pub mod middleware;            // Axum viewer context middleware

// Re-export core infrastructure components
pub use access::{AccessControl, DefaultAccessControl, ACCESS_LOGGED_IN, ACCESS_PRIVATE, ACCESS_PUBLIC};
pub use cache::{Cache, EntityCache};
pub use collaborators::{ActivityIndex, AttachmentStore, NullActivityIndex, NullAttachmentStore};
pub use database::{EntityDatabase, EntityRow, Guid, NewEntityRow, SubtypeRow, Timestamp};
pub use sqlite_database::SqliteDatabase;
pub use viewer::ViewerContext;

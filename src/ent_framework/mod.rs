// Ent Framework - Entity model, registries, query builder and lifecycle operations

pub mod entity;
pub mod ent_builder;
pub mod subtype_registry;
pub mod ent_factory;
pub mod ent_query;
pub mod ent_hooks;
pub mod ent_privacy;
pub mod ent_store;
pub mod ent_permissions;
pub mod ent_lifecycle;
pub mod registered_types;

// Re-export the types callers work with
pub use ent_builder::NewEntity;
pub use ent_factory::EntityClass;
pub use ent_hooks::{AuditLogHook, EntHook, EntityEvent, HookContext, HookRegistry};
pub use ent_lifecycle::DISABLE_REASON;
pub use ent_privacy::{
    CascadeScope, CascadeToken, PermissionCheck, PermissionContext, PrivacyRegistry, PrivacyResult,
    PrivacyRule,
};
pub use ent_query::{EntityQuery, IntValue, PrivateSettingFilter, QueryOutcome, SubtypeFilter, TypeSubtypePair};
pub use ent_store::{EntityStore, EntityStoreBuilder, MEMBER_RELATIONSHIP};
pub use entity::{Entity, EntityType};
pub use registered_types::RegisteredTypes;
pub use subtype_registry::{SubtypeRegistry, NO_SUBTYPE};

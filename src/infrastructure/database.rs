// Database Interface - Low-level storage operations for entities
// This layer owns the SQL that touches the entity, subtype, setting and relationship tables

use async_trait::async_trait;
use std::collections::BTreeMap;

use crate::ent_framework::entity::EntityType;
use crate::error::AppResult;

/// Entity identifier
pub type Guid = i64;

/// Seconds since the Unix epoch
pub type Timestamp = i64;

/// Raw row of the `entities` table
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EntityRow {
    pub guid: Guid,
    /// Stored type string; validated when the row is materialized
    pub entity_type: String,
    /// Subtype registry id, 0 when the entity has no subtype
    pub subtype_id: i64,
    pub owner_guid: Guid,
    pub site_guid: Guid,
    pub container_guid: Guid,
    pub access_id: i64,
    pub time_created: Timestamp,
    pub time_updated: Timestamp,
    pub last_action: Timestamp,
    pub enabled: bool,
}

/// Values written when a new entity is inserted
#[derive(Debug, Clone)]
pub struct NewEntityRow {
    pub entity_type: EntityType,
    pub subtype_id: i64,
    pub owner_guid: Guid,
    pub site_guid: Guid,
    pub container_guid: Guid,
    pub access_id: i64,
    pub time: Timestamp,
    /// JSON document stored in the type's extension table
    pub attributes: String,
}

/// Row of the `entity_subtypes` table
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubtypeRow {
    pub id: i64,
    pub entity_type: String,
    pub subtype: String,
    pub class: String,
}

/// Storage collaborator for the entity store.
///
/// Everything that reaches the relational engine goes through this trait; SQL
/// text handed to the `query_*` methods has already been sanitised by the
/// query builder.
#[async_trait]
pub trait EntityDatabase: Send + Sync {
    // Subtype registrations
    async fn get_subtype(&self, entity_type: &str, subtype: &str) -> AppResult<Option<SubtypeRow>>;
    async fn get_subtype_by_id(&self, id: i64) -> AppResult<Option<SubtypeRow>>;
    async fn insert_subtype(&self, entity_type: &str, subtype: &str, class: &str) -> AppResult<i64>;
    async fn update_subtype(&self, id: i64, entity_type: &str, subtype: &str, class: &str) -> AppResult<bool>;
    async fn delete_subtype(&self, entity_type: &str, subtype: &str) -> AppResult<bool>;

    // Entities
    /// Inserts the base row and the extension row together; returns the new guid
    async fn insert_entity(&self, row: NewEntityRow) -> AppResult<Guid>;
    /// Fetches one base row, restricted by an access predicate over alias `e`
    async fn get_entity_row(&self, guid: Guid, access_sql: &str) -> AppResult<Option<EntityRow>>;
    async fn get_extension_attributes(&self, entity_type: EntityType, guid: Guid) -> AppResult<Option<String>>;
    async fn update_entity(
        &self,
        guid: Guid,
        owner_guid: Guid,
        access_id: i64,
        container_guid: Guid,
        time_updated: Timestamp,
    ) -> AppResult<u64>;
    async fn set_enabled(&self, guid: Guid, enabled: bool) -> AppResult<u64>;
    async fn update_last_action(&self, guid: Guid, posted: Timestamp) -> AppResult<u64>;
    async fn delete_entity_row(&self, guid: Guid) -> AppResult<bool>;
    async fn delete_extension_row(&self, entity_type: EntityType, guid: Guid) -> AppResult<bool>;
    /// Every row whose container or owner is `guid`, plus the rows sited on it
    /// when `entity_type` is a site. Excludes `guid` itself and is not filtered
    /// by access or enabled state.
    async fn get_sub_entity_rows(&self, guid: Guid, entity_type: EntityType) -> AppResult<Vec<EntityRow>>;
    /// Removes extension rows left behind without a base row
    async fn delete_orphaned_extension_rows(&self) -> AppResult<u64>;

    // Assembled queries
    async fn query_entity_rows(&self, sql: &str) -> AppResult<Vec<EntityRow>>;
    async fn query_count(&self, sql: &str) -> AppResult<i64>;
    /// Returns the first column of every row as text
    async fn query_strings(&self, sql: &str) -> AppResult<Vec<String>>;

    // Private settings
    async fn get_private_setting(&self, guid: Guid, name: &str) -> AppResult<Option<String>>;
    async fn get_all_private_settings(&self, guid: Guid) -> AppResult<BTreeMap<String, String>>;
    async fn set_private_setting(&self, guid: Guid, name: &str, value: &str) -> AppResult<bool>;
    async fn remove_private_setting(&self, guid: Guid, name: &str) -> AppResult<bool>;
    async fn remove_all_private_settings(&self, guid: Guid) -> AppResult<u64>;

    // Relationships
    async fn add_relationship(&self, guid_one: Guid, relationship: &str, guid_two: Guid) -> AppResult<bool>;
    async fn check_relationship(&self, guid_one: Guid, relationship: &str, guid_two: Guid) -> AppResult<bool>;
    async fn remove_relationship(&self, guid_one: Guid, relationship: &str, guid_two: Guid) -> AppResult<bool>;
    /// Drops every relationship where `guid` is on either side
    async fn clear_relationships(&self, guid: Guid) -> AppResult<u64>;
}

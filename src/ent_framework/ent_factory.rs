// Entity Factory - Turns storage rows into typed entities and keeps the entity cache

use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{debug, warn};

use crate::ent_framework::entity::{Entity, EntityType};
use crate::ent_framework::subtype_registry::SubtypeRegistry;
use crate::error::{AppError, AppResult};
use crate::infrastructure::cache::EntityCache;
use crate::infrastructure::database::{EntityDatabase, EntityRow, Guid};

/// A named class that entities of one (type, subtype) pair are materialized through
pub trait EntityClass: Send + Sync {
    fn class_name(&self) -> &str;

    fn entity_type(&self) -> EntityType;

    fn subtype(&self) -> &str;

    /// Adjusts a freshly loaded entity, e.g. filling attribute defaults
    fn hydrate(&self, entity: Entity) -> AppResult<Entity> {
        Ok(entity)
    }
}

pub struct EntityFactory {
    db: Arc<dyn EntityDatabase>,
    registry: Arc<SubtypeRegistry>,
    classes: RwLock<HashMap<String, Arc<dyn EntityClass>>>,
    cache: EntityCache,
}

impl EntityFactory {
    pub fn new(db: Arc<dyn EntityDatabase>, registry: Arc<SubtypeRegistry>, cache: EntityCache) -> Self {
        Self {
            db,
            registry,
            classes: RwLock::new(HashMap::new()),
            cache,
        }
    }

    pub fn cache(&self) -> &EntityCache {
        &self.cache
    }

    pub fn registry(&self) -> &Arc<SubtypeRegistry> {
        &self.registry
    }

    /// Registers the class under its (type, subtype) pair and keeps the constructor
    /// for later materialization. Returns the subtype id.
    pub async fn register_class(&self, class: Arc<dyn EntityClass>) -> AppResult<i64> {
        let name = class.class_name().to_string();
        if name.is_empty() {
            return Err(AppError::ConfigurationError(
                "Entity class name cannot be empty".to_string(),
            ));
        }
        if class.subtype().is_empty() {
            return Err(AppError::ConfigurationError(format!(
                "Entity class {} must declare a subtype",
                name
            )));
        }

        let entity_type = class.entity_type();
        let subtype = class.subtype().to_string();
        let id = self
            .registry
            .register_subtype(entity_type, &subtype, &name)
            .await?;

        let stored = self.registry.resolve_class(id).await?;
        if stored.as_deref() != Some(name.as_str()) {
            self.registry
                .update_subtype(entity_type, &subtype, &name)
                .await?;
        }

        self.classes.write().await.insert(name.clone(), class);
        debug!("Registered entity class {} for {}:{}", name, entity_type, subtype);
        Ok(id)
    }

    pub async fn is_class_registered(&self, name: &str) -> bool {
        self.classes.read().await.contains_key(name)
    }

    /// Builds the entity for a base row and caches it.
    ///
    /// Returns `Ok(None)` when the extension row is missing. Unknown types and
    /// classes registered for another type are hard errors.
    pub async fn materialize(&self, row: EntityRow) -> AppResult<Option<Entity>> {
        let entity_type = EntityType::from_name(&row.entity_type).ok_or_else(|| {
            AppError::UnsupportedType(format!("{} (entity {})", row.entity_type, row.guid))
        })?;

        let Some(raw_attributes) = self.db.get_extension_attributes(entity_type, row.guid).await? else {
            warn!(
                "Entity {} has no {} row, treating it as an incomplete stub",
                row.guid,
                entity_type.extension_table()
            );
            return Ok(None);
        };

        let attributes = serde_json::from_str(&raw_attributes).map_err(|e| {
            AppError::DeserializationError(format!("Bad attributes for entity {}: {}", row.guid, e))
        })?;

        let mut entity = Entity {
            guid: row.guid,
            entity_type,
            subtype_id: row.subtype_id,
            subtype: self.registry.resolve_subtype(row.subtype_id).await?,
            class: None,
            owner_guid: row.owner_guid,
            container_guid: row.container_guid,
            site_guid: row.site_guid,
            access_id: row.access_id,
            time_created: row.time_created,
            time_updated: row.time_updated,
            last_action: row.last_action,
            enabled: row.enabled,
            attributes,
        };

        if let Some(class_name) = self.registry.resolve_class(row.subtype_id).await? {
            let class = self.classes.read().await.get(&class_name).cloned();
            match class {
                Some(class) => {
                    if class.entity_type() != entity_type {
                        return Err(AppError::ConfigurationError(format!(
                            "Class {} builds {} entities but entity {} is a {}",
                            class_name,
                            class.entity_type(),
                            row.guid,
                            entity_type
                        )));
                    }
                    entity.class = Some(class_name);
                    entity = class.hydrate(entity)?;
                }
                None => {
                    warn!(
                        "Class {} is not registered, loading entity {} as a plain {}",
                        class_name, row.guid, entity_type
                    );
                }
            }
        }

        self.cache.put(entity.clone()).await;
        Ok(Some(entity))
    }

    pub async fn invalidate(&self, guid: Guid) {
        self.cache.invalidate(guid).await;
    }
}

// Subtype Registry - Maps (type, subtype) pairs to stable integer ids and class names

use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::debug;

use crate::ent_framework::entity::EntityType;
use crate::error::AppResult;
use crate::infrastructure::database::{EntityDatabase, SubtypeRow};

/// Id used for entities without a subtype. Never stored.
pub const NO_SUBTYPE: i64 = 0;

#[derive(Default)]
struct SubtypeCache {
    by_id: HashMap<i64, SubtypeRow>,
    by_name: HashMap<(EntityType, String), i64>,
}

impl SubtypeCache {
    fn insert(&mut self, entity_type: EntityType, row: SubtypeRow) {
        self.by_name
            .insert((entity_type, row.subtype.clone()), row.id);
        self.by_id.insert(row.id, row);
    }

    fn forget(&mut self, entity_type: EntityType, subtype: &str) {
        if let Some(id) = self.by_name.remove(&(entity_type, subtype.to_string())) {
            self.by_id.remove(&id);
        }
    }
}

/// Registry of subtypes backed by the `entity_subtypes` table.
///
/// Lookups hit the in-memory cache first and fall back to a single-row query
/// that populates it. Updates and removals evict the affected entry.
pub struct SubtypeRegistry {
    db: Arc<dyn EntityDatabase>,
    cache: Mutex<SubtypeCache>,
}

impl SubtypeRegistry {
    pub fn new(db: Arc<dyn EntityDatabase>) -> Self {
        Self {
            db,
            cache: Mutex::new(SubtypeCache::default()),
        }
    }

    /// Returns the id for the pair, inserting it when it does not exist yet.
    /// An empty subtype maps to [`NO_SUBTYPE`] and stores nothing.
    pub async fn register_subtype(
        &self,
        entity_type: EntityType,
        subtype: &str,
        class: &str,
    ) -> AppResult<i64> {
        if subtype.is_empty() {
            return Ok(NO_SUBTYPE);
        }

        if let Some(id) = self.resolve_id(entity_type, subtype).await? {
            return Ok(id);
        }

        let id = self
            .db
            .insert_subtype(entity_type.as_str(), subtype, class)
            .await?;
        debug!("Registered subtype {}:{} as {}", entity_type, subtype, id);

        self.cache.lock().await.insert(
            entity_type,
            SubtypeRow {
                id,
                entity_type: entity_type.as_str().to_string(),
                subtype: subtype.to_string(),
                class: class.to_string(),
            },
        );
        Ok(id)
    }

    pub async fn resolve_id(&self, entity_type: EntityType, subtype: &str) -> AppResult<Option<i64>> {
        Ok(self.row_by_name(entity_type, subtype).await?.map(|row| row.id))
    }

    /// Subtype name for an id; `None` for [`NO_SUBTYPE`] or an unknown id
    pub async fn resolve_subtype(&self, id: i64) -> AppResult<Option<String>> {
        Ok(self.row_by_id(id).await?.map(|row| row.subtype))
    }

    /// Class registered for an id; `None` when no class name was stored
    pub async fn resolve_class(&self, id: i64) -> AppResult<Option<String>> {
        Ok(self
            .row_by_id(id)
            .await?
            .map(|row| row.class)
            .filter(|class| !class.is_empty()))
    }

    pub async fn resolve_class_by_name(
        &self,
        entity_type: EntityType,
        subtype: &str,
    ) -> AppResult<Option<String>> {
        Ok(self
            .row_by_name(entity_type, subtype)
            .await?
            .map(|row| row.class)
            .filter(|class| !class.is_empty()))
    }

    /// Changes the class of an existing registration; false when the pair is unknown
    pub async fn update_subtype(
        &self,
        entity_type: EntityType,
        subtype: &str,
        class: &str,
    ) -> AppResult<bool> {
        let Some(row) = self.row_by_name(entity_type, subtype).await? else {
            return Ok(false);
        };

        let updated = self
            .db
            .update_subtype(row.id, entity_type.as_str(), subtype, class)
            .await?;
        self.cache.lock().await.forget(entity_type, subtype);
        Ok(updated)
    }

    pub async fn remove_subtype(&self, entity_type: EntityType, subtype: &str) -> AppResult<bool> {
        let removed = self.db.delete_subtype(entity_type.as_str(), subtype).await?;
        self.cache.lock().await.forget(entity_type, subtype);
        Ok(removed)
    }

    async fn row_by_name(&self, entity_type: EntityType, subtype: &str) -> AppResult<Option<SubtypeRow>> {
        if subtype.is_empty() {
            return Ok(None);
        }

        {
            let cache = self.cache.lock().await;
            if let Some(id) = cache.by_name.get(&(entity_type, subtype.to_string())) {
                return Ok(cache.by_id.get(id).cloned());
            }
        }

        let row = self.db.get_subtype(entity_type.as_str(), subtype).await?;
        if let Some(row) = &row {
            self.cache.lock().await.insert(entity_type, row.clone());
        }
        Ok(row)
    }

    async fn row_by_id(&self, id: i64) -> AppResult<Option<SubtypeRow>> {
        if id == NO_SUBTYPE {
            return Ok(None);
        }

        if let Some(row) = self.cache.lock().await.by_id.get(&id) {
            return Ok(Some(row.clone()));
        }

        let row = self.db.get_subtype_by_id(id).await?;
        if let Some(row) = &row {
            if let Some(entity_type) = EntityType::from_name(&row.entity_type) {
                self.cache.lock().await.insert(entity_type, row.clone());
            }
        }
        Ok(row)
    }
}

// Entity Store - Service object owning the caches, registries and collaborators
// Lifecycle operations live in ent_lifecycle.rs, permission checks in ent_permissions.rs

use std::collections::BTreeMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::debug;

use crate::config::StoreConfig;
use crate::ent_framework::ent_factory::{EntityClass, EntityFactory};
use crate::ent_framework::ent_hooks::{EntHook, EntityEvent, HookContext, HookRegistry};
use crate::ent_framework::ent_privacy::{PrivacyRegistry, PrivacyRule};
use crate::ent_framework::ent_query::{EntityQuery, EntityQueryBuilder, QueryOutcome};
use crate::ent_framework::entity::{Entity, EntityType};
use crate::ent_framework::registered_types::RegisteredTypes;
use crate::ent_framework::subtype_registry::SubtypeRegistry;
use crate::error::AppResult;
use crate::infrastructure::access::{AccessControl, DefaultAccessControl};
use crate::infrastructure::cache::EntityCache;
use crate::infrastructure::collaborators::{
    ActivityIndex, AttachmentStore, NullActivityIndex, NullAttachmentStore,
};
use crate::infrastructure::database::{EntityDatabase, Guid};
use crate::infrastructure::sqlite_database::SqliteDatabase;
use crate::infrastructure::viewer::ViewerContext;

/// Relationship name linking a user (guid_one) to a group (guid_two)
pub const MEMBER_RELATIONSHIP: &str = "member";

pub(crate) struct StoreInner {
    pub(crate) db: Arc<dyn EntityDatabase>,
    pub(crate) registry: Arc<SubtypeRegistry>,
    pub(crate) factory: EntityFactory,
    pub(crate) access: Arc<dyn AccessControl>,
    pub(crate) metadata: Arc<dyn AttachmentStore>,
    pub(crate) annotations: Arc<dyn AttachmentStore>,
    pub(crate) activity: Arc<dyn ActivityIndex>,
    pub(crate) hooks: RwLock<HookRegistry>,
    pub(crate) privacy: RwLock<PrivacyRegistry>,
    pub(crate) registered_types: RwLock<RegisteredTypes>,
    pub(crate) settings: StoreConfig,
}

/// Entry point of the entity data-access layer. Cheap to clone and shared
/// across tasks.
#[derive(Clone)]
pub struct EntityStore {
    pub(crate) inner: Arc<StoreInner>,
}

pub struct EntityStoreBuilder {
    db: Arc<dyn EntityDatabase>,
    access: Arc<dyn AccessControl>,
    metadata: Arc<dyn AttachmentStore>,
    annotations: Arc<dyn AttachmentStore>,
    activity: Arc<dyn ActivityIndex>,
    settings: StoreConfig,
    cache_capacity: usize,
    hooks: HookRegistry,
    privacy: PrivacyRegistry,
}

impl EntityStoreBuilder {
    pub fn access_control(mut self, access: Arc<dyn AccessControl>) -> Self {
        self.access = access;
        self
    }

    pub fn metadata(mut self, metadata: Arc<dyn AttachmentStore>) -> Self {
        self.metadata = metadata;
        self
    }

    pub fn annotations(mut self, annotations: Arc<dyn AttachmentStore>) -> Self {
        self.annotations = annotations;
        self
    }

    pub fn activity(mut self, activity: Arc<dyn ActivityIndex>) -> Self {
        self.activity = activity;
        self
    }

    pub fn settings(mut self, settings: StoreConfig) -> Self {
        self.settings = settings;
        self
    }

    pub fn cache_capacity(mut self, capacity: usize) -> Self {
        self.cache_capacity = capacity;
        self
    }

    pub fn hooks(mut self, hooks: HookRegistry) -> Self {
        self.hooks = hooks;
        self
    }

    pub fn privacy(mut self, privacy: PrivacyRegistry) -> Self {
        self.privacy = privacy;
        self
    }

    pub fn build(self) -> EntityStore {
        let registry = Arc::new(SubtypeRegistry::new(self.db.clone()));
        let factory = EntityFactory::new(
            self.db.clone(),
            registry.clone(),
            EntityCache::new(self.cache_capacity),
        );

        EntityStore {
            inner: Arc::new(StoreInner {
                db: self.db,
                registry,
                factory,
                access: self.access,
                metadata: self.metadata,
                annotations: self.annotations,
                activity: self.activity,
                hooks: RwLock::new(self.hooks),
                privacy: RwLock::new(self.privacy),
                registered_types: RwLock::new(RegisteredTypes::new()),
                settings: self.settings,
            }),
        }
    }
}

impl EntityStore {
    pub fn builder(db: Arc<dyn EntityDatabase>) -> EntityStoreBuilder {
        EntityStoreBuilder {
            db,
            access: Arc::new(DefaultAccessControl),
            metadata: Arc::new(NullAttachmentStore::metadata()),
            annotations: Arc::new(NullAttachmentStore::annotations()),
            activity: Arc::new(NullActivityIndex),
            settings: StoreConfig::default(),
            cache_capacity: 0,
            hooks: HookRegistry::with_defaults(),
            privacy: PrivacyRegistry::with_defaults(),
        }
    }

    /// Store over a fresh in-memory SQLite database with default collaborators
    pub async fn new_in_memory() -> AppResult<Self> {
        let db = SqliteDatabase::new_in_memory().await?;
        Ok(Self::builder(Arc::new(db)).build())
    }

    pub fn db(&self) -> &Arc<dyn EntityDatabase> {
        &self.inner.db
    }

    pub fn subtypes(&self) -> &SubtypeRegistry {
        &self.inner.registry
    }

    pub fn cache(&self) -> &EntityCache {
        self.inner.factory.cache()
    }

    pub fn settings(&self) -> &StoreConfig {
        &self.inner.settings
    }

    pub async fn register_hook(&self, scope: Option<EntityType>, hook: Arc<dyn EntHook>) {
        self.inner.hooks.write().await.register_hook(scope, hook);
    }

    pub async fn register_rule(&self, scope: Option<EntityType>, rule: Arc<dyn PrivacyRule>) {
        self.inner.privacy.write().await.register_rule(scope, rule);
    }

    pub async fn register_class(&self, class: Arc<dyn EntityClass>) -> AppResult<i64> {
        self.inner.factory.register_class(class).await
    }

    /// Adds a type (and optionally a subtype) to the searchable set
    pub async fn register_searchable_type(&self, entity_type: &str, subtype: &str) -> bool {
        match EntityType::from_name(entity_type) {
            Some(entity_type) => {
                self.inner
                    .registered_types
                    .write()
                    .await
                    .register(entity_type, subtype);
                true
            }
            None => false,
        }
    }

    pub async fn registered_types(&self) -> RegisteredTypes {
        self.inner.registered_types.read().await.clone()
    }

    /// Loads one entity as seen by `viewer`; cached entities are still access checked
    pub async fn load(&self, viewer: &ViewerContext, guid: Guid) -> AppResult<Option<Entity>> {
        if guid <= 0 {
            return Ok(None);
        }

        if let Some(entity) = self.cache().get(guid).await {
            return Ok(self
                .inner
                .access
                .is_visible(viewer, &entity)
                .then_some(entity));
        }

        let access_sql = self.inner.access.sql_predicate(viewer, "e");
        match self.inner.db.get_entity_row(guid, &access_sql).await? {
            Some(row) => self.inner.factory.materialize(row).await,
            None => Ok(None),
        }
    }

    fn query_builder(&self) -> EntityQueryBuilder<'_> {
        EntityQueryBuilder::new(
            &self.inner.registry,
            self.inner.access.as_ref(),
            self.inner.settings.default_query_limit,
        )
    }

    /// Runs a query, returning a page of entities or a count depending on `query.count`
    pub async fn get_entities(&self, viewer: &ViewerContext, query: &EntityQuery) -> AppResult<QueryOutcome> {
        let sql = self.query_builder().build(viewer, query).await?;
        debug!(sql = %sql, "entity query");

        if query.count {
            return Ok(QueryOutcome::Count(self.inner.db.query_count(&sql).await?));
        }

        let rows = self.inner.db.query_entity_rows(&sql).await?;
        let mut entities = Vec::with_capacity(rows.len());
        for row in rows {
            if let Some(entity) = self.inner.factory.materialize(row).await? {
                entities.push(entity);
            }
        }
        Ok(QueryOutcome::Entities(entities))
    }

    pub async fn list_entities(&self, viewer: &ViewerContext, query: &EntityQuery) -> AppResult<Vec<Entity>> {
        let query = EntityQuery {
            count: false,
            ..query.clone()
        };
        match self.get_entities(viewer, &query).await? {
            QueryOutcome::Entities(entities) => Ok(entities),
            QueryOutcome::Count(_) => Ok(Vec::new()),
        }
    }

    pub async fn count_entities(&self, viewer: &ViewerContext, query: &EntityQuery) -> AppResult<i64> {
        let query = EntityQuery {
            count: true,
            ..query.clone()
        };
        match self.get_entities(viewer, &query).await? {
            QueryOutcome::Count(total) => Ok(total),
            QueryOutcome::Entities(entities) => Ok(entities.len() as i64),
        }
    }

    /// Months (`YYYYMM`) in which entities matching `query` were created
    pub async fn entity_dates(&self, viewer: &ViewerContext, query: &EntityQuery) -> AppResult<Vec<String>> {
        let sql = self.query_builder().build_dates(viewer, query).await?;
        self.inner.db.query_strings(&sql).await
    }

    /// Fires `event` for `entity`; false when a handler vetoed
    pub(crate) async fn fire_event(
        &self,
        viewer: &ViewerContext,
        event: EntityEvent,
        entity: &Entity,
    ) -> AppResult<bool> {
        let hooks = self
            .inner
            .hooks
            .read()
            .await
            .matching(event, entity.entity_type);
        let ctx = HookContext {
            event,
            entity,
            user_id: viewer.user_id,
        };
        HookRegistry::run(&hooks, &ctx).await
    }

    // Private settings

    pub async fn get_private_setting(&self, guid: Guid, name: &str) -> AppResult<Option<String>> {
        self.inner.db.get_private_setting(guid, name).await
    }

    pub async fn get_all_private_settings(&self, guid: Guid) -> AppResult<BTreeMap<String, String>> {
        self.inner.db.get_all_private_settings(guid).await
    }

    pub async fn set_private_setting(&self, guid: Guid, name: &str, value: &str) -> AppResult<bool> {
        self.inner.db.set_private_setting(guid, name, value).await
    }

    pub async fn remove_private_setting(&self, guid: Guid, name: &str) -> AppResult<bool> {
        self.inner.db.remove_private_setting(guid, name).await
    }

    pub async fn remove_all_private_settings(&self, guid: Guid) -> AppResult<u64> {
        self.inner.db.remove_all_private_settings(guid).await
    }

    // Relationships

    pub async fn add_relationship(&self, guid_one: Guid, relationship: &str, guid_two: Guid) -> AppResult<bool> {
        self.inner.db.add_relationship(guid_one, relationship, guid_two).await
    }

    pub async fn check_relationship(&self, guid_one: Guid, relationship: &str, guid_two: Guid) -> AppResult<bool> {
        self.inner.db.check_relationship(guid_one, relationship, guid_two).await
    }

    pub async fn remove_relationship(&self, guid_one: Guid, relationship: &str, guid_two: Guid) -> AppResult<bool> {
        self.inner.db.remove_relationship(guid_one, relationship, guid_two).await
    }

    pub async fn join_group(&self, group_guid: Guid, user_guid: Guid) -> AppResult<bool> {
        self.add_relationship(user_guid, MEMBER_RELATIONSHIP, group_guid).await
    }

    pub async fn leave_group(&self, group_guid: Guid, user_guid: Guid) -> AppResult<bool> {
        self.remove_relationship(user_guid, MEMBER_RELATIONSHIP, group_guid).await
    }

    pub async fn is_group_member(&self, group_guid: Guid, user_guid: Guid) -> AppResult<bool> {
        self.check_relationship(user_guid, MEMBER_RELATIONSHIP, group_guid).await
    }
}

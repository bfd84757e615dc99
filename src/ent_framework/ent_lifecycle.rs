// Entity Lifecycle - Create, update, enable/disable and delete with recursive cascade

use futures::future::{BoxFuture, FutureExt};
use tracing::{debug, info, instrument, warn};

use crate::ent_framework::ent_builder::NewEntity;
use crate::ent_framework::ent_hooks::EntityEvent;
use crate::ent_framework::ent_privacy::CascadeScope;
use crate::ent_framework::ent_store::EntityStore;
use crate::ent_framework::entity::{Entity, EntityType};
use crate::error::{AppError, AppResult};
use crate::infrastructure::access::UNRESTRICTED_SQL;
use crate::infrastructure::database::{Guid, NewEntityRow, Timestamp};
use crate::infrastructure::viewer::ViewerContext;

/// Private setting holding the reason given when an entity was disabled
pub const DISABLE_REASON: &str = "disable_reason";

#[derive(Debug, Clone, Copy)]
enum CascadeAction<'a> {
    Disable { reason: &'a str },
    Delete,
}

fn now() -> Timestamp {
    chrono::Utc::now().timestamp()
}

impl EntityStore {
    /// Creates an entity and returns its guid, or `None` when the viewer may not
    /// write to the owner or container, or a create handler vetoed.
    #[instrument(skip(self, viewer, new), fields(user_id = viewer.user_id, entity_type = %new.entity_type))]
    pub async fn create(&self, viewer: &ViewerContext, new: NewEntity) -> AppResult<Option<Guid>> {
        if new.entity_type.is_empty() {
            return Err(AppError::InvalidParameter("Entity type must be set".to_string()));
        }
        let entity_type = EntityType::from_name(&new.entity_type).ok_or_else(|| {
            AppError::InvalidParameter(format!("Unknown entity type {}", new.entity_type))
        })?;

        let container_guid = if new.container_guid == 0 {
            new.owner_guid
        } else {
            new.container_guid
        };
        let site_guid = if new.site_guid == 0 {
            self.default_site().await?
        } else {
            new.site_guid
        };

        if !self
            .can_write_to_container(viewer, new.owner_guid, Some(entity_type))
            .await?
        {
            info!("Viewer may not create entities owned by {}", new.owner_guid);
            return Ok(None);
        }
        if container_guid != new.owner_guid
            && !self
                .can_write_to_container(viewer, container_guid, Some(entity_type))
                .await?
        {
            info!("Viewer may not write to container {}", container_guid);
            return Ok(None);
        }

        let subtype_id = self
            .inner
            .registry
            .register_subtype(entity_type, &new.subtype, "")
            .await?;
        let attributes = serde_json::to_string(&new.attributes).map_err(|e| {
            AppError::SerializationError(format!("Failed to serialize attributes: {}", e))
        })?;

        let guid = self
            .inner
            .db
            .insert_entity(NewEntityRow {
                entity_type,
                subtype_id,
                owner_guid: new.owner_guid,
                site_guid,
                container_guid,
                access_id: new.access_id,
                time: now(),
                attributes,
            })
            .await?;

        let row = self
            .inner
            .db
            .get_entity_row(guid, UNRESTRICTED_SQL)
            .await?
            .ok_or_else(|| AppError::Internal(format!("Entity {} vanished after insert", guid)))?;
        let entity = self
            .inner
            .factory
            .materialize(row)
            .await?
            .ok_or_else(|| AppError::Internal(format!("Entity {} was stored without its extension row", guid)))?;

        if !self.fire_event(viewer, EntityEvent::Create, &entity).await? {
            self.inner.db.delete_entity_row(guid).await?;
            self.inner.db.delete_extension_row(entity_type, guid).await?;
            self.inner.factory.invalidate(guid).await;
            return Ok(None);
        }

        info!(guid, "Created {} entity", entity_type);
        Ok(Some(guid))
    }

    /// Changes owner, access level and container. A missing container defaults to the owner.
    #[instrument(skip(self, viewer), fields(user_id = viewer.user_id))]
    pub async fn update(
        &self,
        viewer: &ViewerContext,
        guid: Guid,
        owner_guid: Guid,
        access_id: i64,
        container_guid: Option<Guid>,
    ) -> AppResult<bool> {
        let Some(entity) = self.load(viewer, guid).await? else {
            return Ok(false);
        };
        if !self.can_edit(viewer, &entity, None).await? {
            return Ok(false);
        }

        let time_updated = now();
        let updated = Entity {
            owner_guid,
            access_id,
            container_guid: container_guid.unwrap_or(owner_guid),
            time_updated,
            ..entity
        };
        if !self.fire_event(viewer, EntityEvent::Update, &updated).await? {
            return Ok(false);
        }

        let rows = self
            .inner
            .db
            .update_entity(guid, updated.owner_guid, access_id, updated.container_guid, time_updated)
            .await?;

        if updated.entity_type == EntityType::Object {
            self.inner
                .activity
                .update_access_by_object(guid, access_id)
                .await?;
        }

        self.inner.factory.invalidate(guid).await;
        Ok(rows > 0)
    }

    /// Soft-deletes an entity, and with `recursive` everything it contains, owns or hosts
    #[instrument(skip(self, viewer, reason), fields(user_id = viewer.user_id))]
    pub async fn disable(
        &self,
        viewer: &ViewerContext,
        guid: Guid,
        reason: &str,
        recursive: bool,
    ) -> AppResult<bool> {
        let Some(entity) = self.load(viewer, guid).await? else {
            return Ok(false);
        };
        self.disable_entity(viewer, entity, reason, recursive, None).await
    }

    fn disable_entity<'a>(
        &'a self,
        viewer: &'a ViewerContext,
        entity: Entity,
        reason: &'a str,
        recursive: bool,
        scope: Option<&'a CascadeScope>,
    ) -> BoxFuture<'a, AppResult<bool>> {
        async move {
            if !self.fire_event(viewer, EntityEvent::Disable, &entity).await? {
                return Ok(false);
            }
            if !self
                .can_edit(viewer, &entity, scope.map(CascadeScope::token))
                .await?
            {
                return Ok(false);
            }

            if !reason.is_empty() {
                self.inner
                    .db
                    .set_private_setting(entity.guid, DISABLE_REASON, reason)
                    .await?;
            }

            if recursive {
                let action = CascadeAction::Disable { reason };
                match scope {
                    Some(scope) => self.cascade(viewer, &entity, scope, action).await?,
                    None => {
                        let scope = CascadeScope::new(viewer.user_id, entity.guid);
                        self.cascade(viewer, &entity, &scope, action).await?
                    }
                }
            }

            let rows = self.inner.db.set_enabled(entity.guid, false).await?;
            self.inner.factory.invalidate(entity.guid).await;
            Ok(rows > 0)
        }
        .boxed()
    }

    /// Re-enables a disabled entity and clears its disable reason. Not recursive.
    #[instrument(skip(self, viewer), fields(user_id = viewer.user_id))]
    pub async fn enable(&self, viewer: &ViewerContext, guid: Guid) -> AppResult<bool> {
        let hidden = viewer.with_hidden(true);
        let Some(entity) = self.load(&hidden, guid).await? else {
            return Ok(false);
        };

        if !self.fire_event(&hidden, EntityEvent::Enable, &entity).await? {
            return Ok(false);
        }
        if !self.can_edit(&hidden, &entity, None).await? {
            return Ok(false);
        }

        let rows = self.inner.db.set_enabled(guid, true).await?;
        self.inner.db.remove_private_setting(guid, DISABLE_REASON).await?;
        self.inner.factory.invalidate(guid).await;
        Ok(rows > 0)
    }

    /// Permanently removes an entity with everything attached to it. Returns
    /// whether the base row was deleted.
    #[instrument(skip(self, viewer), fields(user_id = viewer.user_id))]
    pub async fn delete(&self, viewer: &ViewerContext, guid: Guid, recursive: bool) -> AppResult<bool> {
        let Some(entity) = self.load(viewer, guid).await? else {
            return Ok(false);
        };
        self.delete_entity(viewer, entity, recursive, None).await
    }

    fn delete_entity<'a>(
        &'a self,
        viewer: &'a ViewerContext,
        entity: Entity,
        recursive: bool,
        scope: Option<&'a CascadeScope>,
    ) -> BoxFuture<'a, AppResult<bool>> {
        async move {
            let guid = entity.guid;
            if !self.fire_event(viewer, EntityEvent::Delete, &entity).await? {
                return Ok(false);
            }
            if !self
                .can_edit(viewer, &entity, scope.map(CascadeScope::token))
                .await?
            {
                return Ok(false);
            }

            self.inner.factory.invalidate(guid).await;

            if recursive {
                match scope {
                    Some(scope) => self.cascade(viewer, &entity, scope, CascadeAction::Delete).await?,
                    None => {
                        let scope = CascadeScope::new(viewer.user_id, guid);
                        self.cascade(viewer, &entity, &scope, CascadeAction::Delete).await?
                    }
                }
            }

            self.inner.metadata.clear_for_entity(guid).await?;
            self.inner.annotations.clear_for_entity(guid).await?;
            self.inner.db.clear_relationships(guid).await?;
            self.inner.activity.remove_by_subject(guid).await?;
            self.inner.activity.remove_by_object(guid).await?;
            self.inner.db.remove_all_private_settings(guid).await?;

            let deleted = self.inner.db.delete_entity_row(guid).await?;
            if deleted {
                self.inner
                    .db
                    .delete_extension_row(entity.entity_type, guid)
                    .await?;
            }
            self.inner.factory.invalidate(guid).await;
            Ok(deleted)
        }
        .boxed()
    }

    /// Applies `action` to every entity contained in, owned by or sited on
    /// `parent`, depth first. Refusals are skipped; errors abort.
    async fn cascade(
        &self,
        viewer: &ViewerContext,
        parent: &Entity,
        scope: &CascadeScope,
        action: CascadeAction<'_>,
    ) -> AppResult<()> {
        let cascade_id = scope.token().cascade_id();
        let rows = self
            .inner
            .db
            .get_sub_entity_rows(parent.guid, parent.entity_type)
            .await?;

        for row in rows {
            let child_guid = row.guid;
            if !scope.visit(child_guid) {
                continue;
            }

            let Some(child) = self.inner.factory.materialize(row).await? else {
                warn!(cascade_id, "Skipping incomplete entity {} under {}", child_guid, parent.guid);
                continue;
            };

            let done = match action {
                CascadeAction::Disable { reason } => {
                    self.disable_entity(viewer, child, reason, true, Some(scope)).await?
                }
                CascadeAction::Delete => self.delete_entity(viewer, child, true, Some(scope)).await?,
            };

            if !done {
                warn!(
                    cascade_id,
                    "Cascade {:?} from {} left entity {} in place",
                    action,
                    scope.root(),
                    child_guid
                );
            }
        }

        Ok(())
    }

    /// The configured default site, or 0 while no site entity holds that guid
    async fn default_site(&self) -> AppResult<Guid> {
        let guid = self.inner.settings.default_site_guid;
        let row = self.inner.db.get_entity_row(guid, UNRESTRICTED_SQL).await?;
        match row {
            Some(row) if row.entity_type == EntityType::Site.as_str() => Ok(guid),
            _ => {
                debug!("Default site {} is not a site entity; leaving site unset", guid);
                Ok(0)
            }
        }
    }

    /// Records activity on an entity. `posted` defaults to now; guid 0 is rejected.
    pub async fn update_last_action(&self, guid: Guid, posted: Option<Timestamp>) -> AppResult<bool> {
        if guid == 0 {
            return Ok(false);
        }
        let rows = self
            .inner
            .db
            .update_last_action(guid, posted.unwrap_or_else(now))
            .await?;
        self.inner.factory.invalidate(guid).await;
        Ok(rows > 0)
    }

    /// Removes extension rows whose base row no longer exists
    pub async fn collect_garbage(&self) -> AppResult<u64> {
        let removed = self.inner.db.delete_orphaned_extension_rows().await?;
        if removed > 0 {
            info!("Collected {} orphaned extension rows", removed);
        }
        Ok(removed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ent_framework::ent_hooks::{EntHook, HookContext};
    use crate::ent_framework::ent_query::EntityQuery;
    use crate::infrastructure::access::ACCESS_PUBLIC;
    use async_trait::async_trait;
    use std::sync::Arc;

    struct Veto(EntityEvent);

    #[async_trait]
    impl EntHook for Veto {
        async fn handle(&self, _ctx: &HookContext<'_>) -> AppResult<bool> {
            Ok(false)
        }

        fn name(&self) -> &str {
            "veto"
        }

        fn events(&self) -> Vec<EntityEvent> {
            vec![self.0]
        }
    }

    async fn create(store: &EntityStore, viewer: &ViewerContext, new: NewEntity) -> Guid {
        store
            .create(viewer, new.access(ACCESS_PUBLIC))
            .await
            .unwrap()
            .unwrap()
    }

    #[tokio::test]
    async fn test_create_requires_type() {
        let store = EntityStore::new_in_memory().await.unwrap();
        let viewer = ViewerContext::new(1);

        assert!(matches!(
            store.create(&viewer, NewEntity::new("")).await,
            Err(AppError::InvalidParameter(_))
        ));
        assert!(matches!(
            store.create(&viewer, NewEntity::new("widget")).await,
            Err(AppError::InvalidParameter(_))
        ));
    }

    #[tokio::test]
    async fn test_create_applies_defaults() {
        let store = EntityStore::new_in_memory().await.unwrap();
        let site = create(&store, &ViewerContext::admin(1), NewEntity::site()).await;
        assert_eq!(site, store.settings().default_site_guid);

        let viewer = ViewerContext::new(10);
        let guid = create(&store, &viewer, NewEntity::object().subtype("blogpost").owner(10)).await;

        let entity = store.load(&viewer, guid).await.unwrap().unwrap();
        assert_eq!(entity.container_guid, 10);
        assert_eq!(entity.site_guid, site);
        assert_eq!(entity.subtype.as_deref(), Some("blogpost"));
        assert_eq!(entity.time_created, entity.last_action);
        assert!(entity.enabled);
    }

    #[tokio::test]
    async fn test_default_site_must_be_a_site() {
        let store = EntityStore::new_in_memory().await.unwrap();
        let viewer = ViewerContext::new(10);
        let first = create(&store, &viewer, NewEntity::object().owner(10)).await;
        let second = create(&store, &viewer, NewEntity::object().owner(10)).await;

        assert_eq!(first, store.settings().default_site_guid);
        let entity = store.load(&viewer, second).await.unwrap().unwrap();
        assert_eq!(entity.site_guid, 0);
    }

    #[tokio::test]
    async fn test_recursive_delete_stays_inside_own_content() {
        let store = EntityStore::new_in_memory().await.unwrap();
        let alice = ViewerContext::new(10);
        let bob = ViewerContext::new(11);

        let post = create(&store, &alice, NewEntity::object().owner(10)).await;
        let other = create(&store, &bob, NewEntity::object().owner(11).on_site(post)).await;
        assert!(!store
            .can_edit(&alice, &store.load(&alice, other).await.unwrap().unwrap(), None)
            .await
            .unwrap());

        assert!(store.delete(&alice, post, true).await.unwrap());
        assert!(store.load(&bob, other).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_create_refused_for_foreign_owner() {
        let store = EntityStore::new_in_memory().await.unwrap();
        let owner = ViewerContext::new(10);
        let blog = create(&store, &owner, NewEntity::object().owner(10)).await;

        let stranger = ViewerContext::new(11);
        assert_eq!(
            store
                .create(&stranger, NewEntity::object().owner(11).container(blog))
                .await
                .unwrap(),
            None
        );
        assert_eq!(
            store
                .create(&stranger, NewEntity::object().owner(blog))
                .await
                .unwrap(),
            None
        );
    }

    #[tokio::test]
    async fn test_create_veto_removes_entity() {
        let store = EntityStore::new_in_memory().await.unwrap();
        store
            .register_hook(Some(EntityType::Object), Arc::new(Veto(EntityEvent::Create)))
            .await;
        let viewer = ViewerContext::new(10);

        assert_eq!(
            store
                .create(&viewer, NewEntity::object().owner(10))
                .await
                .unwrap(),
            None
        );
        let count = store
            .count_entities(&ViewerContext::admin(1).with_hidden(true), &EntityQuery::new())
            .await
            .unwrap();
        assert_eq!(count, 0);
        assert_eq!(store.collect_garbage().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_update_vetoed_leaves_entity() {
        let store = EntityStore::new_in_memory().await.unwrap();
        let viewer = ViewerContext::new(10);
        let guid = create(&store, &viewer, NewEntity::object().owner(10)).await;
        store
            .register_hook(None, Arc::new(Veto(EntityEvent::Update)))
            .await;

        assert!(!store.update(&viewer, guid, 12, 0, None).await.unwrap());
        let entity = store.load(&viewer, guid).await.unwrap().unwrap();
        assert_eq!(entity.owner_guid, 10);
    }

    #[tokio::test]
    async fn test_update_defaults_container_to_owner() {
        let store = EntityStore::new_in_memory().await.unwrap();
        let viewer = ViewerContext::new(10);
        let guid = create(&store, &viewer, NewEntity::object().owner(10)).await;

        assert!(store.update(&viewer, guid, 12, ACCESS_PUBLIC, None).await.unwrap());
        let entity = store.load(&viewer, guid).await.unwrap().unwrap();
        assert_eq!(entity.owner_guid, 12);
        assert_eq!(entity.container_guid, 12);

        assert!(!store.update(&viewer, guid, 10, ACCESS_PUBLIC, None).await.unwrap());
    }

    #[tokio::test]
    async fn test_disable_and_enable() {
        let store = EntityStore::new_in_memory().await.unwrap();
        let viewer = ViewerContext::new(10);
        let guid = create(&store, &viewer, NewEntity::object().owner(10)).await;

        assert!(store.disable(&viewer, guid, "spam", false).await.unwrap());
        assert!(store.load(&viewer, guid).await.unwrap().is_none());

        let hidden = viewer.with_hidden(true);
        let entity = store.load(&hidden, guid).await.unwrap().unwrap();
        assert!(!entity.enabled);
        assert_eq!(
            store.get_private_setting(guid, DISABLE_REASON).await.unwrap().as_deref(),
            Some("spam")
        );

        assert!(store.enable(&viewer, guid).await.unwrap());
        assert!(!viewer.show_hidden);
        assert!(store.load(&viewer, guid).await.unwrap().unwrap().enabled);
        assert_eq!(store.get_private_setting(guid, DISABLE_REASON).await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_cascade_handles_ownership_cycles() {
        let store = EntityStore::new_in_memory().await.unwrap();
        let viewer = ViewerContext::new(10);
        let a = create(&store, &viewer, NewEntity::object().owner(10)).await;
        let b = create(&store, &viewer, NewEntity::object().owner(10).container(a)).await;
        // a now lives inside b, so the sweep from b reaches a again
        assert!(store.update(&viewer, a, 10, ACCESS_PUBLIC, Some(b)).await.unwrap());

        assert!(store.delete(&viewer, a, true).await.unwrap());
        let admin = ViewerContext::admin(1).with_hidden(true);
        assert!(store.load(&admin, a).await.unwrap().is_none());
        assert!(store.load(&admin, b).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_cascade_skips_vetoed_children() {
        let store = EntityStore::new_in_memory().await.unwrap();
        let viewer = ViewerContext::new(10);
        let group = create(&store, &viewer, NewEntity::group().owner(10)).await;
        let post = create(&store, &viewer, NewEntity::object().owner(10).container(group)).await;
        store
            .register_hook(Some(EntityType::Object), Arc::new(Veto(EntityEvent::Delete)))
            .await;

        assert!(store.delete(&viewer, group, true).await.unwrap());
        assert!(store.load(&viewer, post).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_last_action() {
        let store = EntityStore::new_in_memory().await.unwrap();
        let viewer = ViewerContext::new(10);
        let guid = create(&store, &viewer, NewEntity::object().owner(10)).await;
        store.load(&viewer, guid).await.unwrap();

        assert!(!store.update_last_action(0, None).await.unwrap());
        assert!(store.update_last_action(guid, Some(42)).await.unwrap());
        assert!(!store.cache().contains(guid).await);
        assert_eq!(store.load(&viewer, guid).await.unwrap().unwrap().last_action, 42);
    }
}

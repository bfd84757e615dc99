// Permission Gate - Ownership checks composed with the permission rule chains

use futures::future::{BoxFuture, FutureExt};
use tracing::debug;

use crate::ent_framework::ent_privacy::{CascadeToken, PermissionCheck, PermissionContext, PrivacyRegistry};
use crate::ent_framework::ent_store::EntityStore;
use crate::ent_framework::entity::{Entity, EntityType};
use crate::error::AppResult;
use crate::infrastructure::database::Guid;
use crate::infrastructure::viewer::ViewerContext;

impl EntityStore {
    /// Whether `viewer` may edit `entity`.
    ///
    /// Owners, the container, the user entity itself and anyone who can edit the
    /// container start out allowed; the `Edit` rule chain then has the final say.
    pub async fn can_edit(
        &self,
        viewer: &ViewerContext,
        entity: &Entity,
        cascade: Option<&CascadeToken>,
    ) -> AppResult<bool> {
        let mut trail = Vec::new();
        self.can_edit_within(viewer, entity, cascade, &mut trail).await
    }

    fn can_edit_within<'a>(
        &'a self,
        viewer: &'a ViewerContext,
        entity: &'a Entity,
        cascade: Option<&'a CascadeToken>,
        trail: &'a mut Vec<Guid>,
    ) -> BoxFuture<'a, AppResult<bool>> {
        async move {
            let allowed = self.edits_by_ownership(viewer, entity, cascade, trail).await?;

            let rules = self
                .inner
                .privacy
                .read()
                .await
                .matching(PermissionCheck::Edit, Some(entity.entity_type));
            let ctx = PermissionContext {
                check: PermissionCheck::Edit,
                viewer,
                entity: Some(entity),
                entity_type: Some(entity.entity_type),
                cascade,
            };
            PrivacyRegistry::run(&rules, &ctx, allowed).await
        }
        .boxed()
    }

    async fn edits_by_ownership(
        &self,
        viewer: &ViewerContext,
        entity: &Entity,
        cascade: Option<&CascadeToken>,
        trail: &mut Vec<Guid>,
    ) -> AppResult<bool> {
        if !viewer.is_logged_in() {
            return Ok(false);
        }

        let user_guid = viewer.user_id;
        if entity.owner_guid == user_guid
            || entity.container_guid == user_guid
            || (entity.entity_type == EntityType::User && entity.guid == user_guid)
        {
            return Ok(true);
        }

        let container_guid = entity.container_guid;
        if container_guid == 0 || container_guid == entity.guid {
            return Ok(false);
        }

        trail.push(entity.guid);
        if trail.contains(&container_guid) || trail.len() > self.inner.settings.max_container_depth {
            debug!(
                "Stopping container walk at {} after {:?}",
                container_guid, trail
            );
            return Ok(false);
        }

        match self.load(viewer, container_guid).await? {
            Some(container) => self.can_edit_within(viewer, &container, cascade, trail).await,
            None => Ok(false),
        }
    }

    /// Whether `viewer` may create an entity of `entity_type` inside `container_guid`.
    ///
    /// Container 0 and the viewer's own guid are always writable. Otherwise the
    /// viewer needs edit permission on the container or, for groups, membership.
    /// The `WriteToContainer` rule chain then has the final say.
    pub async fn can_write_to_container(
        &self,
        viewer: &ViewerContext,
        container_guid: Guid,
        entity_type: Option<EntityType>,
    ) -> AppResult<bool> {
        let container = if container_guid == 0 {
            None
        } else {
            self.load(viewer, container_guid).await?
        };

        let mut allowed =
            container_guid == 0 || (viewer.is_logged_in() && container_guid == viewer.user_id);

        if !allowed {
            if let Some(container) = &container {
                allowed = self.can_edit(viewer, container, None).await?;
                if !allowed && container.entity_type == EntityType::Group && viewer.is_logged_in() {
                    allowed = self.is_group_member(container.guid, viewer.user_id).await?;
                }
            }
        }

        let rules = self
            .inner
            .privacy
            .read()
            .await
            .matching(PermissionCheck::WriteToContainer, entity_type);
        let ctx = PermissionContext {
            check: PermissionCheck::WriteToContainer,
            viewer,
            entity: container.as_ref(),
            entity_type,
            cascade: None,
        };
        PrivacyRegistry::run(&rules, &ctx, allowed).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ent_framework::ent_builder::NewEntity;
    use crate::ent_framework::ent_privacy::{PrivacyResult, PrivacyRule};
    use crate::infrastructure::access::ACCESS_PUBLIC;
    use async_trait::async_trait;
    use std::sync::Arc;

    struct DenyObjects;

    #[async_trait]
    impl PrivacyRule for DenyObjects {
        async fn evaluate(&self, _ctx: &PermissionContext<'_>, _current: bool) -> AppResult<PrivacyResult> {
            Ok(PrivacyResult::Deny)
        }

        fn name(&self) -> &str {
            "deny_objects"
        }

        fn checks(&self) -> Vec<PermissionCheck> {
            vec![PermissionCheck::Edit]
        }
    }

    async fn create(store: &EntityStore, viewer: &ViewerContext, new: NewEntity) -> Entity {
        let guid = store.create(viewer, new.access(ACCESS_PUBLIC)).await.unwrap().unwrap();
        store.load(viewer, guid).await.unwrap().unwrap()
    }

    #[tokio::test]
    async fn test_owner_and_container_can_edit() {
        let store = EntityStore::new_in_memory().await.unwrap();
        let owner = ViewerContext::new(10);
        let post = create(&store, &owner, NewEntity::object().owner(10)).await;

        assert!(store.can_edit(&owner, &post, None).await.unwrap());
        assert!(!store.can_edit(&ViewerContext::new(11), &post, None).await.unwrap());
        assert!(!store.can_edit(&ViewerContext::anonymous(), &post, None).await.unwrap());
        assert!(store.can_edit(&ViewerContext::admin(99), &post, None).await.unwrap());
    }

    #[tokio::test]
    async fn test_user_can_edit_self() {
        let store = EntityStore::new_in_memory().await.unwrap();
        let user = create(&store, &ViewerContext::anonymous(), NewEntity::user()).await;
        let me = ViewerContext::new(user.guid);

        assert!(store.can_edit(&me, &user, None).await.unwrap());
    }

    #[tokio::test]
    async fn test_editing_container_grants_edit_on_contents() {
        let store = EntityStore::new_in_memory().await.unwrap();
        let owner = ViewerContext::new(10);
        let folder = create(&store, &owner, NewEntity::object().owner(10)).await;
        let file = create(&store, &owner, NewEntity::object().owner(10).container(folder.guid)).await;

        // Hand the file to someone else; the folder owner keeps edit rights through the folder
        assert!(store
            .update(&owner, file.guid, 20, ACCESS_PUBLIC, Some(folder.guid))
            .await
            .unwrap());
        let file = store.load(&owner, file.guid).await.unwrap().unwrap();
        assert_eq!(file.owner_guid, 20);
        assert!(store.can_edit(&owner, &file, None).await.unwrap());
        assert!(store.can_edit(&ViewerContext::new(20), &file, None).await.unwrap());
    }

    #[tokio::test]
    async fn test_plugin_rule_can_revoke() {
        let store = EntityStore::new_in_memory().await.unwrap();
        let owner = ViewerContext::new(10);
        let post = create(&store, &owner, NewEntity::object().owner(10)).await;
        store
            .register_rule(Some(EntityType::Object), Arc::new(DenyObjects))
            .await;

        assert!(!store.can_edit(&owner, &post, None).await.unwrap());
        // Admin override still runs last
        assert!(store.can_edit(&ViewerContext::admin(1), &post, None).await.unwrap());
    }

    #[tokio::test]
    async fn test_write_to_group_requires_membership_or_edit() {
        let store = EntityStore::new_in_memory().await.unwrap();
        let founder = ViewerContext::new(10);
        let group = create(&store, &founder, NewEntity::group().owner(10)).await;
        let member = ViewerContext::new(30);

        assert!(store
            .can_write_to_container(&founder, group.guid, Some(EntityType::Object))
            .await
            .unwrap());
        assert!(!store
            .can_write_to_container(&member, group.guid, Some(EntityType::Object))
            .await
            .unwrap());

        store.join_group(group.guid, 30).await.unwrap();
        assert!(store
            .can_write_to_container(&member, group.guid, Some(EntityType::Object))
            .await
            .unwrap());
    }

    #[tokio::test]
    async fn test_write_to_missing_or_empty_container() {
        let store = EntityStore::new_in_memory().await.unwrap();
        let viewer = ViewerContext::new(10);

        assert!(store.can_write_to_container(&viewer, 0, None).await.unwrap());
        assert!(store.can_write_to_container(&viewer, 10, None).await.unwrap());
        assert!(!store.can_write_to_container(&viewer, 12345, None).await.unwrap());
    }
}

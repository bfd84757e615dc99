// Ent Hooks System - Event handlers fired around entity lifecycle operations
// Any handler can veto the operation by returning false

use async_trait::async_trait;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use tracing::{info, warn};

use crate::{
    ent_framework::entity::{Entity, EntityType},
    error::AppResult,
    infrastructure::database::Guid,
};

/// Lifecycle events handlers can subscribe to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EntityEvent {
    Create,
    Update,
    Disable,
    Enable,
    Delete,
}

impl EntityEvent {
    pub fn as_str(&self) -> &'static str {
        match self {
            EntityEvent::Create => "create",
            EntityEvent::Update => "update",
            EntityEvent::Disable => "disable",
            EntityEvent::Enable => "enable",
            EntityEvent::Delete => "delete",
        }
    }
}

impl fmt::Display for EntityEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// What a handler sees when it is fired
#[derive(Debug, Clone, Copy)]
pub struct HookContext<'a> {
    pub event: EntityEvent,
    pub entity: &'a Entity,
    /// Acting user, 0 when logged out
    pub user_id: Guid,
}

/// Trait for implementing entity event handlers
#[async_trait]
pub trait EntHook: Send + Sync {
    /// Returns `Ok(false)` to veto the operation
    async fn handle(&self, ctx: &HookContext<'_>) -> AppResult<bool>;

    /// Get hook name for debugging
    fn name(&self) -> &str;

    /// Events the hook subscribes to
    fn events(&self) -> Vec<EntityEvent>;
}

/// Hook registry for managing entity event handlers.
///
/// Handlers scoped to a type run before handlers registered for every type.
#[derive(Default, Clone)]
pub struct HookRegistry {
    typed: HashMap<EntityType, Vec<Arc<dyn EntHook>>>,
    global: Vec<Arc<dyn EntHook>>,
}

impl HookRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry with the audit log handler installed for every type
    pub fn with_defaults() -> Self {
        let mut registry = Self::new();
        registry.register_hook(None, Arc::new(AuditLogHook));
        registry
    }

    /// Register a hook for one entity type, or for all types with `None`
    pub fn register_hook(&mut self, scope: Option<EntityType>, hook: Arc<dyn EntHook>) {
        match scope {
            Some(entity_type) => self.typed.entry(entity_type).or_default().push(hook),
            None => self.global.push(hook),
        }
    }

    /// Handlers for an event on a type, in firing order
    pub fn matching(&self, event: EntityEvent, entity_type: EntityType) -> Vec<Arc<dyn EntHook>> {
        self.typed
            .get(&entity_type)
            .into_iter()
            .flatten()
            .chain(self.global.iter())
            .filter(|hook| hook.events().contains(&event))
            .cloned()
            .collect()
    }

    /// Fires `hooks` in order; the first veto stops the chain and is returned
    pub async fn run(hooks: &[Arc<dyn EntHook>], ctx: &HookContext<'_>) -> AppResult<bool> {
        for hook in hooks {
            let proceed = match hook.handle(ctx).await {
                Ok(proceed) => proceed,
                Err(e) => {
                    warn!(
                        "Hook '{}' failed on {} of entity {}: {}",
                        hook.name(),
                        ctx.event,
                        ctx.entity.guid,
                        e
                    );
                    return Err(e);
                }
            };
            if !proceed {
                warn!(
                    "Hook '{}' vetoed {} of entity {}",
                    hook.name(),
                    ctx.event,
                    ctx.entity.guid
                );
                return Ok(false);
            }
        }
        Ok(true)
    }
}

/// Audit log hook - logs every lifecycle event
pub struct AuditLogHook;

#[async_trait]
impl EntHook for AuditLogHook {
    async fn handle(&self, ctx: &HookContext<'_>) -> AppResult<bool> {
        info!(
            event = ctx.event.as_str(),
            entity_type = ctx.entity.entity_type.as_str(),
            guid = ctx.entity.guid,
            user_id = ctx.user_id,
            "entity event"
        );
        Ok(true)
    }

    fn name(&self) -> &str {
        "audit_log_hook"
    }

    fn events(&self) -> Vec<EntityEvent> {
        vec![
            EntityEvent::Create,
            EntityEvent::Update,
            EntityEvent::Disable,
            EntityEvent::Enable,
            EntityEvent::Delete,
        ]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::AppError;
    use serde_json::Map;
    use std::sync::Mutex;

    struct Recorder {
        name: &'static str,
        verdict: bool,
        seen: Arc<Mutex<Vec<&'static str>>>,
    }

    #[async_trait]
    impl EntHook for Recorder {
        async fn handle(&self, _ctx: &HookContext<'_>) -> AppResult<bool> {
            self.seen.lock().unwrap().push(self.name);
            Ok(self.verdict)
        }

        fn name(&self) -> &str {
            self.name
        }

        fn events(&self) -> Vec<EntityEvent> {
            vec![EntityEvent::Delete]
        }
    }

    fn group() -> Entity {
        Entity {
            guid: 9,
            entity_type: EntityType::Group,
            subtype_id: 0,
            subtype: None,
            class: None,
            owner_guid: 1,
            container_guid: 1,
            site_guid: 1,
            access_id: 2,
            time_created: 0,
            time_updated: 0,
            last_action: 0,
            enabled: true,
            attributes: Map::new(),
        }
    }

    #[tokio::test]
    async fn test_typed_hooks_run_first_and_veto_stops_chain() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let mut registry = HookRegistry::new();
        registry.register_hook(
            None,
            Arc::new(Recorder { name: "global", verdict: true, seen: seen.clone() }),
        );
        registry.register_hook(
            Some(EntityType::Group),
            Arc::new(Recorder { name: "typed", verdict: false, seen: seen.clone() }),
        );

        let entity = group();
        let ctx = HookContext { event: EntityEvent::Delete, entity: &entity, user_id: 1 };
        let hooks = registry.matching(EntityEvent::Delete, EntityType::Group);

        assert!(!HookRegistry::run(&hooks, &ctx).await.unwrap());
        assert_eq!(*seen.lock().unwrap(), vec!["typed"]);
    }

    struct Failing;

    #[async_trait]
    impl EntHook for Failing {
        async fn handle(&self, _ctx: &HookContext<'_>) -> AppResult<bool> {
            Err(AppError::DatabaseError("disk full".to_string()))
        }

        fn name(&self) -> &str {
            "failing"
        }

        fn events(&self) -> Vec<EntityEvent> {
            vec![EntityEvent::Delete]
        }
    }

    #[tokio::test]
    async fn test_handler_errors_keep_their_variant() {
        let mut registry = HookRegistry::new();
        registry.register_hook(None, Arc::new(Failing));

        let entity = group();
        let ctx = HookContext { event: EntityEvent::Delete, entity: &entity, user_id: 1 };
        let hooks = registry.matching(EntityEvent::Delete, EntityType::Group);

        assert!(matches!(
            HookRegistry::run(&hooks, &ctx).await,
            Err(AppError::DatabaseError(_))
        ));
    }

    #[tokio::test]
    async fn test_unsubscribed_events_are_skipped() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let mut registry = HookRegistry::with_defaults();
        registry.register_hook(
            None,
            Arc::new(Recorder { name: "deletes_only", verdict: false, seen: seen.clone() }),
        );

        let entity = group();
        let ctx = HookContext { event: EntityEvent::Update, entity: &entity, user_id: 0 };
        let hooks = registry.matching(EntityEvent::Update, EntityType::Group);

        assert_eq!(hooks.len(), 1);
        assert!(HookRegistry::run(&hooks, &ctx).await.unwrap());
        assert!(seen.lock().unwrap().is_empty());
    }
}

// Ent Privacy System - Permission rule chains for edit and write-to-container decisions
// Rules see the decision so far and may keep, grant or revoke it

use async_trait::async_trait;
use std::collections::HashSet;
use std::fmt;
use std::sync::{Arc, Mutex};
use tracing::debug;

use crate::{
    ent_framework::entity::{Entity, EntityType},
    error::AppResult,
    infrastructure::{database::Guid, viewer::ViewerContext},
};

pub const DEFAULT_RULE_PRIORITY: i32 = 500;

/// Decisions the permission chain is consulted for
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PermissionCheck {
    Edit,
    WriteToContainer,
}

/// Rule context for permission decisions
#[derive(Debug, Clone, Copy)]
pub struct PermissionContext<'a> {
    pub check: PermissionCheck,
    pub viewer: &'a ViewerContext,
    /// Entity being edited, or the target container for write checks
    pub entity: Option<&'a Entity>,
    /// Type being edited or written into the container
    pub entity_type: Option<EntityType>,
    /// Present while a cascade is running on behalf of its actor
    pub cascade: Option<&'a CascadeToken>,
}

/// Privacy rule result
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PrivacyResult {
    Allow,
    Deny,
    /// Keep the decision reached so far
    Skip,
}

/// Trait for implementing permission rules
#[async_trait]
pub trait PrivacyRule: Send + Sync {
    /// Evaluate the rule against the decision reached by the rules before it
    async fn evaluate(&self, ctx: &PermissionContext<'_>, current: bool) -> AppResult<PrivacyResult>;

    /// Get rule name for debugging
    fn name(&self) -> &str;

    /// Checks the rule takes part in
    fn checks(&self) -> Vec<PermissionCheck>;

    /// Rules run from lowest to highest priority, so the highest has the final say
    fn priority(&self) -> i32 {
        DEFAULT_RULE_PRIORITY
    }
}

struct RegisteredRule {
    scope: Option<EntityType>,
    rule: Arc<dyn PrivacyRule>,
}

/// Privacy rule registry
#[derive(Default, Clone)]
pub struct PrivacyRegistry {
    rules: Vec<Arc<RegisteredRule>>,
}

impl PrivacyRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry with the admin override and cascade rules installed
    pub fn with_defaults() -> Self {
        let mut registry = Self::new();
        registry.register_rule(None, Arc::new(AdminOverrideRule));
        registry.register_rule(None, Arc::new(RecursiveCascadeRule));
        registry
    }

    /// Register a rule for one entity type, or for all types with `None`
    pub fn register_rule(&mut self, scope: Option<EntityType>, rule: Arc<dyn PrivacyRule>) {
        self.rules.push(Arc::new(RegisteredRule { scope, rule }));
        // Stable sort keeps registration order among equal priorities
        self.rules.sort_by_key(|registered| registered.rule.priority());
    }

    /// Rules that apply to a check on a type, in evaluation order
    pub fn matching(&self, check: PermissionCheck, entity_type: Option<EntityType>) -> Vec<Arc<dyn PrivacyRule>> {
        self.rules
            .iter()
            .filter(|registered| match registered.scope {
                Some(scope) => Some(scope) == entity_type,
                None => true,
            })
            .filter(|registered| registered.rule.checks().contains(&check))
            .map(|registered| registered.rule.clone())
            .collect()
    }

    /// Threads `initial` through the rules and returns the final decision
    pub async fn run(
        rules: &[Arc<dyn PrivacyRule>],
        ctx: &PermissionContext<'_>,
        initial: bool,
    ) -> AppResult<bool> {
        let mut current = initial;
        for rule in rules {
            match rule.evaluate(ctx, current).await? {
                PrivacyResult::Allow => current = true,
                PrivacyResult::Deny => current = false,
                PrivacyResult::Skip => continue,
            }
            debug!("Rule '{}' set {:?} to {}", rule.name(), ctx.check, current);
        }
        Ok(current)
    }
}

/// Capability proving a cascade is running for `actor_guid`.
///
/// Only the lifecycle operations can issue one and it cannot be cloned, so it
/// never outlives the cascade that created it.
pub struct CascadeToken {
    actor_guid: Guid,
    cascade_id: u64,
}

impl CascadeToken {
    pub(crate) fn issue(actor_guid: Guid) -> Self {
        Self {
            actor_guid,
            cascade_id: rand::random(),
        }
    }

    pub fn actor_guid(&self) -> Guid {
        self.actor_guid
    }

    /// Random id for correlating the log lines of one cascade
    pub fn cascade_id(&self) -> u64 {
        self.cascade_id
    }
}

impl fmt::Debug for CascadeToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "CascadeToken(actor={}, cascade={:x})", self.actor_guid, self.cascade_id)
    }
}

/// State of one recursive disable or delete
#[derive(Debug)]
pub struct CascadeScope {
    token: CascadeToken,
    root: Guid,
    visited: Mutex<HashSet<Guid>>,
}

impl CascadeScope {
    pub(crate) fn new(actor_guid: Guid, root: Guid) -> Self {
        Self {
            token: CascadeToken::issue(actor_guid),
            root,
            visited: Mutex::new(HashSet::from([root])),
        }
    }

    pub fn token(&self) -> &CascadeToken {
        &self.token
    }

    pub fn root(&self) -> Guid {
        self.root
    }

    /// Records `guid`; false if the cascade already reached it
    pub fn visit(&self, guid: Guid) -> bool {
        self.visited
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .insert(guid)
    }
}

/// Built-in privacy rules

/// Admin override - admins may edit anything and write anywhere
pub struct AdminOverrideRule;

#[async_trait]
impl PrivacyRule for AdminOverrideRule {
    async fn evaluate(&self, ctx: &PermissionContext<'_>, _current: bool) -> AppResult<PrivacyResult> {
        if ctx.viewer.is_admin {
            Ok(PrivacyResult::Allow)
        } else {
            Ok(PrivacyResult::Skip)
        }
    }

    fn name(&self) -> &str {
        "admin_override"
    }

    fn checks(&self) -> Vec<PermissionCheck> {
        vec![PermissionCheck::Edit, PermissionCheck::WriteToContainer]
    }

    fn priority(&self) -> i32 {
        1000
    }
}

/// Grants edit permission to the actor of a running cascade
pub struct RecursiveCascadeRule;

#[async_trait]
impl PrivacyRule for RecursiveCascadeRule {
    async fn evaluate(&self, ctx: &PermissionContext<'_>, _current: bool) -> AppResult<PrivacyResult> {
        match ctx.cascade {
            Some(token) if token.actor_guid() == ctx.viewer.user_id => Ok(PrivacyResult::Allow),
            _ => Ok(PrivacyResult::Skip),
        }
    }

    fn name(&self) -> &str {
        "recursive_cascade"
    }

    fn checks(&self) -> Vec<PermissionCheck> {
        vec![PermissionCheck::Edit]
    }

    fn priority(&self) -> i32 {
        900
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Fixed {
        name: &'static str,
        result: PrivacyResult,
        priority: i32,
    }

    #[async_trait]
    impl PrivacyRule for Fixed {
        async fn evaluate(&self, _ctx: &PermissionContext<'_>, _current: bool) -> AppResult<PrivacyResult> {
            Ok(self.result)
        }

        fn name(&self) -> &str {
            self.name
        }

        fn checks(&self) -> Vec<PermissionCheck> {
            vec![PermissionCheck::Edit]
        }

        fn priority(&self) -> i32 {
            self.priority
        }
    }

    fn edit_ctx<'a>(viewer: &'a ViewerContext, cascade: Option<&'a CascadeToken>) -> PermissionContext<'a> {
        PermissionContext {
            check: PermissionCheck::Edit,
            viewer,
            entity: None,
            entity_type: Some(EntityType::Object),
            cascade,
        }
    }

    #[tokio::test]
    async fn test_highest_priority_has_final_say() {
        let mut registry = PrivacyRegistry::new();
        registry.register_rule(None, Arc::new(Fixed { name: "late", result: PrivacyResult::Deny, priority: 800 }));
        registry.register_rule(None, Arc::new(Fixed { name: "early", result: PrivacyResult::Allow, priority: 100 }));

        let viewer = ViewerContext::new(3);
        let rules = registry.matching(PermissionCheck::Edit, Some(EntityType::Object));
        assert_eq!(rules[0].name(), "early");
        assert!(!PrivacyRegistry::run(&rules, &edit_ctx(&viewer, None), true).await.unwrap());
    }

    #[tokio::test]
    async fn test_scoped_rules_only_apply_to_their_type() {
        let mut registry = PrivacyRegistry::new();
        registry.register_rule(
            Some(EntityType::Group),
            Arc::new(Fixed { name: "groups", result: PrivacyResult::Allow, priority: 10 }),
        );

        let viewer = ViewerContext::new(3);
        let rules = registry.matching(PermissionCheck::Edit, Some(EntityType::Object));
        assert!(rules.is_empty());
        assert!(!PrivacyRegistry::run(&rules, &edit_ctx(&viewer, None), false).await.unwrap());
    }

    #[tokio::test]
    async fn test_cascade_token_only_counts_for_its_actor() {
        let registry = PrivacyRegistry::with_defaults();
        let rules = registry.matching(PermissionCheck::Edit, Some(EntityType::Object));
        let scope = CascadeScope::new(7, 100);

        let actor = ViewerContext::new(7);
        assert!(PrivacyRegistry::run(&rules, &edit_ctx(&actor, Some(scope.token())), false)
            .await
            .unwrap());

        let other = ViewerContext::new(8);
        assert!(!PrivacyRegistry::run(&rules, &edit_ctx(&other, Some(scope.token())), false)
            .await
            .unwrap());
    }

    #[tokio::test]
    async fn test_admin_override() {
        let registry = PrivacyRegistry::with_defaults();
        let rules = registry.matching(PermissionCheck::WriteToContainer, None);
        let admin = ViewerContext::admin(1);
        let ctx = PermissionContext {
            check: PermissionCheck::WriteToContainer,
            viewer: &admin,
            entity: None,
            entity_type: None,
            cascade: None,
        };
        assert!(PrivacyRegistry::run(&rules, &ctx, false).await.unwrap());
    }

    #[test]
    fn test_scope_tracks_visited_guids() {
        let scope = CascadeScope::new(1, 10);
        assert_eq!(scope.root(), 10);
        assert!(!scope.visit(10));
        assert!(scope.visit(11));
        assert!(!scope.visit(11));
    }
}

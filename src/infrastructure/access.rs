use crate::ent_framework::entity::Entity;
use crate::infrastructure::viewer::ViewerContext;

pub const ACCESS_PRIVATE: i64 = 0;
pub const ACCESS_LOGGED_IN: i64 = 1;
pub const ACCESS_PUBLIC: i64 = 2;

/// Predicate that lets every row through, used for internal reads
pub const UNRESTRICTED_SQL: &str = "1 = 1";

/// Read-side access control consumed by loads and queries.
///
/// `sql_predicate` and `is_visible` must agree: a cached entity is shown to a
/// viewer only if the SQL fragment would have returned its row.
pub trait AccessControl: Send + Sync {
    /// Boolean SQL fragment over the entities table aliased as `alias`.
    /// Includes the enabled filter unless the viewer shows hidden entities.
    fn sql_predicate(&self, viewer: &ViewerContext, alias: &str) -> String;

    fn is_visible(&self, viewer: &ViewerContext, entity: &Entity) -> bool;
}

/// Public / logged-in / private levels, with owners always seeing their own
/// entities and admins seeing everything
#[derive(Debug, Default, Clone, Copy)]
pub struct DefaultAccessControl;

impl DefaultAccessControl {
    fn levels(viewer: &ViewerContext) -> Vec<i64> {
        if viewer.is_logged_in() {
            vec![ACCESS_PUBLIC, ACCESS_LOGGED_IN]
        } else {
            vec![ACCESS_PUBLIC]
        }
    }
}

impl AccessControl for DefaultAccessControl {
    fn sql_predicate(&self, viewer: &ViewerContext, alias: &str) -> String {
        let access = if viewer.is_admin {
            UNRESTRICTED_SQL.to_string()
        } else {
            let levels = Self::levels(viewer)
                .iter()
                .map(|level| level.to_string())
                .collect::<Vec<_>>()
                .join(", ");
            if viewer.is_logged_in() {
                format!(
                    "({alias}.access_id IN ({levels}) OR {alias}.owner_guid = {})",
                    viewer.user_id
                )
            } else {
                format!("({alias}.access_id IN ({levels}))")
            }
        };

        if viewer.show_hidden {
            access
        } else {
            format!("{access} AND {alias}.enabled = 'yes'")
        }
    }

    fn is_visible(&self, viewer: &ViewerContext, entity: &Entity) -> bool {
        if !entity.enabled && !viewer.show_hidden {
            return false;
        }
        viewer.is_admin
            || Self::levels(viewer).contains(&entity.access_id)
            || (viewer.is_logged_in() && entity.owner_guid == viewer.user_id)
    }
}

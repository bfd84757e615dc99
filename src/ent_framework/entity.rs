// Entity model - The four built-in entity kinds and their materialized form

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;

use crate::infrastructure::database::{Guid, Timestamp};

/// Fixed set of entity types. Every type has its own extension table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EntityType {
    Object,
    User,
    Group,
    Site,
}

impl EntityType {
    pub const ALL: [EntityType; 4] = [
        EntityType::Object,
        EntityType::User,
        EntityType::Group,
        EntityType::Site,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            EntityType::Object => "object",
            EntityType::User => "user",
            EntityType::Group => "group",
            EntityType::Site => "site",
        }
    }

    /// Parses a stored or user-supplied type name; anything outside the four kinds is `None`
    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "object" => Some(EntityType::Object),
            "user" => Some(EntityType::User),
            "group" => Some(EntityType::Group),
            "site" => Some(EntityType::Site),
            _ => None,
        }
    }

    pub fn extension_table(&self) -> &'static str {
        match self {
            EntityType::Object => "objects_entity",
            EntityType::User => "users_entity",
            EntityType::Group => "groups_entity",
            EntityType::Site => "sites_entity",
        }
    }
}

impl fmt::Display for EntityType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A fully materialized entity: base row, resolved subtype and extension attributes
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Entity {
    pub guid: Guid,
    #[serde(rename = "type")]
    pub entity_type: EntityType,
    /// Registry id of the subtype, 0 when there is none
    pub subtype_id: i64,
    pub subtype: Option<String>,
    /// Class the entity was materialized through, `None` for the built-in kind
    pub class: Option<String>,
    pub owner_guid: Guid,
    pub container_guid: Guid,
    pub site_guid: Guid,
    pub access_id: i64,
    pub time_created: Timestamp,
    pub time_updated: Timestamp,
    pub last_action: Timestamp,
    pub enabled: bool,
    #[serde(default)]
    pub attributes: Map<String, Value>,
}

impl Entity {
    pub fn subtype_name(&self) -> &str {
        self.subtype.as_deref().unwrap_or("")
    }

    pub fn attribute(&self, name: &str) -> Option<&Value> {
        self.attributes.get(name)
    }

    /// True when the entity matches the given type and, if given, subtype and class
    pub fn is_instance_of(
        &self,
        entity_type: EntityType,
        subtype: Option<&str>,
        class: Option<&str>,
    ) -> bool {
        if self.entity_type != entity_type {
            return false;
        }
        if let Some(subtype) = subtype {
            if self.subtype_name() != subtype {
                return false;
            }
        }
        if let Some(class) = class {
            if self.class.as_deref() != Some(class) {
                return false;
            }
        }
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn blog_post() -> Entity {
        Entity {
            guid: 42,
            entity_type: EntityType::Object,
            subtype_id: 3,
            subtype: Some("blogpost".to_string()),
            class: Some("BlogPost".to_string()),
            owner_guid: 10,
            container_guid: 10,
            site_guid: 1,
            access_id: 2,
            time_created: 0,
            time_updated: 0,
            last_action: 0,
            enabled: true,
            attributes: Map::new(),
        }
    }

    #[test]
    fn test_type_names_round_trip() {
        for entity_type in EntityType::ALL {
            assert_eq!(EntityType::from_name(entity_type.as_str()), Some(entity_type));
        }
        assert_eq!(EntityType::from_name("widget"), None);
        assert_eq!(EntityType::Group.extension_table(), "groups_entity");
    }

    #[test]
    fn test_is_instance_of() {
        let post = blog_post();
        assert!(post.is_instance_of(EntityType::Object, None, None));
        assert!(post.is_instance_of(EntityType::Object, Some("blogpost"), Some("BlogPost")));
        assert!(!post.is_instance_of(EntityType::Object, Some("page"), None));
        assert!(!post.is_instance_of(EntityType::User, None, None));
        assert!(!post.is_instance_of(EntityType::Object, None, Some("Page")));
    }

    #[test]
    fn test_serializes_type_in_lowercase() {
        let json = serde_json::to_value(blog_post()).unwrap();
        assert_eq!(json["type"], "object");
        assert_eq!(json["subtype"], "blogpost");
    }
}

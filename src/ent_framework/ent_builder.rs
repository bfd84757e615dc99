use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::ent_framework::entity::EntityType;
use crate::infrastructure::database::Guid;

/// Values for a new entity, assembled with chained setters and handed to
/// `EntityStore::create`.
///
/// The type is kept as text so that an empty or unknown type can be reported
/// by `create` itself. A container or site of 0 is replaced by the owner and
/// the configured default site respectively.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct NewEntity {
    #[serde(rename = "type")]
    pub entity_type: String,
    #[serde(default)]
    pub subtype: String,
    #[serde(default)]
    pub owner_guid: Guid,
    #[serde(default)]
    pub access_id: i64,
    #[serde(default)]
    pub site_guid: Guid,
    #[serde(default)]
    pub container_guid: Guid,
    #[serde(default)]
    pub attributes: Map<String, Value>,
}

impl NewEntity {
    pub fn new<S: Into<String>>(entity_type: S) -> Self {
        Self {
            entity_type: entity_type.into(),
            ..Self::default()
        }
    }

    pub fn object() -> Self {
        Self::of(EntityType::Object)
    }

    pub fn user() -> Self {
        Self::of(EntityType::User)
    }

    pub fn group() -> Self {
        Self::of(EntityType::Group)
    }

    pub fn site() -> Self {
        Self::of(EntityType::Site)
    }

    fn of(entity_type: EntityType) -> Self {
        Self::new(entity_type.as_str())
    }

    pub fn subtype<S: Into<String>>(mut self, subtype: S) -> Self {
        self.subtype = subtype.into();
        self
    }

    pub fn owner(mut self, owner_guid: Guid) -> Self {
        self.owner_guid = owner_guid;
        self
    }

    pub fn access(mut self, access_id: i64) -> Self {
        self.access_id = access_id;
        self
    }

    pub fn on_site(mut self, site_guid: Guid) -> Self {
        self.site_guid = site_guid;
        self
    }

    pub fn container(mut self, container_guid: Guid) -> Self {
        self.container_guid = container_guid;
        self
    }

    pub fn attribute<K: Into<String>, V: Into<Value>>(mut self, name: K, value: V) -> Self {
        self.attributes.insert(name.into(), value.into());
        self
    }
}

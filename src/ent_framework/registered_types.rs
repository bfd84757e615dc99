use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet};

use crate::ent_framework::ent_query::{SubtypeFilter, TypeSubtypePair};
use crate::ent_framework::entity::EntityType;

/// Types and subtypes that take part in site-wide listings and search.
/// A type registered without subtypes matches all of its entities.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RegisteredTypes {
    types: BTreeMap<EntityType, BTreeSet<String>>,
}

impl RegisteredTypes {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, entity_type: EntityType, subtype: &str) {
        let subtypes = self.types.entry(entity_type).or_default();
        if !subtype.is_empty() {
            subtypes.insert(subtype.to_string());
        }
    }

    pub fn unregister(&mut self, entity_type: EntityType, subtype: &str) -> bool {
        if subtype.is_empty() {
            return self.types.remove(&entity_type).is_some();
        }
        self.types
            .get_mut(&entity_type)
            .map_or(false, |subtypes| subtypes.remove(subtype))
    }

    pub fn is_registered(&self, entity_type: EntityType, subtype: &str) -> bool {
        match self.types.get(&entity_type) {
            Some(subtypes) => subtype.is_empty() || subtypes.is_empty() || subtypes.contains(subtype),
            None => false,
        }
    }

    pub fn subtypes(&self, entity_type: EntityType) -> Option<&BTreeSet<String>> {
        self.types.get(&entity_type)
    }

    pub fn is_empty(&self) -> bool {
        self.types.is_empty()
    }

    /// Query pairs matching exactly the registered entities
    pub fn to_pairs(&self) -> Vec<TypeSubtypePair> {
        self.types
            .iter()
            .map(|(entity_type, subtypes)| TypeSubtypePair {
                entity_type: entity_type.as_str().to_string(),
                subtypes: if subtypes.is_empty() {
                    None
                } else {
                    Some(subtypes.iter().cloned().map(SubtypeFilter::Named).collect())
                },
            })
            .collect()
    }
}

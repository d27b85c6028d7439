use crate::model::Id;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;

/// Relationship link stored on an entity. Targets are ids into the arena
/// rather than owned values, so cyclic graphs stage without special casing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RelLink {
    One(Option<Id>),
    Many(Vec<Id>),
}

impl RelLink {
    pub fn contains(&self, id: &str) -> bool {
        match self {
            RelLink::One(current) => current.as_deref() == Some(id),
            RelLink::Many(ids) => ids.iter().any(|i| i == id),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Entity {
    pub id: Id,
    #[serde(rename = "type")]
    pub entity_type: String,
    pub fields: HashMap<String, Value>,
    pub relationships: HashMap<String, RelLink>,
}

/// Arena of staged entities produced by one mutation resolution. The root
/// and every touched or created entity live here until the caller commits.
#[derive(Debug, Clone, Default, Serialize)]
pub struct EntityGraph {
    pub entities: HashMap<Id, Entity>,
    /// Ids of entities instantiated during this mutation, in creation order.
    pub created: Vec<Id>,
}

impl EntityGraph {
    pub fn get(&self, id: &str) -> Option<&Entity> {
        self.entities.get(id)
    }

    pub fn get_mut(&mut self, id: &str) -> Option<&mut Entity> {
        self.entities.get_mut(id)
    }

    pub fn contains(&self, id: &str) -> bool {
        self.entities.contains_key(id)
    }

    /// Stage an entity loaded from storage. Does nothing if that id is
    /// already staged, so later edits see earlier staged changes.
    pub fn stage(&mut self, entity: Entity) {
        self.entities.entry(entity.id.clone()).or_insert(entity);
    }

    /// Stage a freshly instantiated entity.
    pub fn stage_created(&mut self, entity: Entity) {
        self.created.push(entity.id.clone());
        self.entities.insert(entity.id.clone(), entity);
    }
}

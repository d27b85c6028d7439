use crate::model::{generate_id, DataType, Entity, RelLink};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Cardinality {
    ToOne,
    ToMany,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldDef {
    pub name: String,
    pub data_type: DataType,
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub primary_key: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RelationshipDef {
    pub name: String,
    /// Name of the target entity type.
    pub target: String,
    pub cardinality: Cardinality,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EntityDef {
    pub name: String,
    pub fields: Vec<FieldDef>,
    pub relationships: Vec<RelationshipDef>,
}

impl EntityDef {
    pub fn field(&self, name: &str) -> Option<&FieldDef> {
        self.fields.iter().find(|f| f.name == name)
    }

    pub fn relationship(&self, name: &str) -> Option<&RelationshipDef> {
        self.relationships.iter().find(|r| r.name == name)
    }

    pub fn primary_keys(&self) -> Vec<&FieldDef> {
        self.fields.iter().filter(|f| f.primary_key).collect()
    }
}

/// What a single path segment resolved to on an entity type.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Member<'a> {
    Field(&'a FieldDef),
    Relationship(&'a RelationshipDef),
}

/// Statically-declared descriptor table for every exposed entity type.
/// Built once per deployment and shared read-only across requests.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Schema {
    pub entities: Vec<EntityDef>,
}

impl Schema {
    pub fn entity(&self, name: &str) -> Option<&EntityDef> {
        self.entities.iter().find(|e| e.name == name)
    }

    /// Resolve one name on an entity type to a field or relationship
    /// descriptor. A pure lookup, no runtime introspection.
    pub fn resolve(&self, entity_type: &str, name: &str) -> Option<Member<'_>> {
        let def = self.entity(entity_type)?;
        if let Some(field) = def.field(name) {
            return Some(Member::Field(field));
        }
        def.relationship(name).map(Member::Relationship)
    }

    /// Coerce a raw textual value to a field's declared type.
    pub fn coerce_str(&self, field: &FieldDef, raw: &str) -> Result<Value, String> {
        match field.data_type {
            DataType::String => Ok(Value::String(raw.to_string())),
            DataType::Integer => raw
                .parse::<i64>()
                .map(Value::from)
                .map_err(|_| format!("`{}` is not a valid integer for `{}`", raw, field.name)),
            DataType::Float => raw
                .parse::<f64>()
                .map(Value::from)
                .map_err(|_| format!("`{}` is not a valid number for `{}`", raw, field.name)),
            DataType::Boolean => match raw {
                "true" | "True" | "1" => Ok(Value::Bool(true)),
                "false" | "False" | "0" => Ok(Value::Bool(false)),
                _ => Err(format!(
                    "`{}` is not a valid boolean for `{}`",
                    raw, field.name
                )),
            },
        }
    }

    /// Coerce a JSON value (from the complex query payload) to a field's
    /// declared type. Strings are re-parsed, matching the flat form.
    pub fn coerce_json(&self, field: &FieldDef, value: &Value) -> Result<Value, String> {
        match (field.data_type, value) {
            (DataType::String, Value::String(_)) => Ok(value.clone()),
            (DataType::Integer, Value::Number(n)) if n.is_i64() || n.is_u64() => Ok(value.clone()),
            (DataType::Float, Value::Number(_)) => Ok(value.clone()),
            (DataType::Boolean, Value::Bool(_)) => Ok(value.clone()),
            (_, Value::String(s)) => self.coerce_str(field, s),
            _ => Err(format!(
                "{:?} value can not be coerced for `{}`",
                value, field.name
            )),
        }
    }

    /// Instantiate a fresh entity of a type, with empty fields and
    /// relationship links shaped by their declared cardinality.
    pub fn instantiate(&self, entity_type: &str) -> Option<Entity> {
        let def = self.entity(entity_type)?;
        let relationships = def
            .relationships
            .iter()
            .map(|rel| {
                let link = match rel.cardinality {
                    Cardinality::ToOne => RelLink::One(None),
                    Cardinality::ToMany => RelLink::Many(Vec::new()),
                };
                (rel.name.clone(), link)
            })
            .collect();
        Some(Entity {
            id: generate_id(),
            entity_type: entity_type.to_string(),
            fields: HashMap::new(),
            relationships,
        })
    }
}

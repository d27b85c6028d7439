use crate::model::{
    generate_id, ComparisonOp, Entity, EntityGraph, Id, Predicate, RefSpec, RelLink, Schema,
    SelectPlan, SortDirection,
};
use crate::store::traits::{CommitReceipt, Store};
use anyhow::{anyhow, bail};
use chrono::Utc;
use itertools::Itertools;
use log::{debug, info};
use parking_lot::RwLock;
use serde_json::Value;
use std::cmp::Ordering;
use std::collections::HashMap;

/// Schema-aware store holding the whole entity arena in memory. Fine as
/// the system of record for tests and demos and as the staging target in
/// front of a real backend.
pub struct MemoryStore {
    schema: Schema,
    entities: RwLock<HashMap<Id, Entity>>,
    commits: RwLock<Vec<CommitReceipt>>,
}

impl MemoryStore {
    pub fn new(schema: Schema) -> Self {
        Self {
            schema,
            entities: RwLock::new(HashMap::new()),
            commits: RwLock::new(Vec::new()),
        }
    }

    /// Put an entity in directly, without commit bookkeeping. Seeding only.
    pub fn insert(&self, entity: Entity) {
        self.entities.write().insert(entity.id.clone(), entity);
    }

    pub fn get(&self, id: &str) -> Option<Entity> {
        self.entities.read().get(id).cloned()
    }

    pub fn len(&self) -> usize {
        self.entities.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entities.read().is_empty()
    }

    pub fn commit_log(&self) -> Vec<CommitReceipt> {
        self.commits.read().clone()
    }

    /// Entities reachable from `root` through the plan's join chain.
    /// `None` is the root itself; a to-many hop fans out.
    fn reachable<'a>(
        map: &'a HashMap<Id, Entity>,
        plan: &SelectPlan,
        join: Option<usize>,
        root: &'a Entity,
    ) -> Vec<&'a Entity> {
        let idx = match join {
            Some(idx) => idx,
            None => return vec![root],
        };
        let step = &plan.joins[idx];
        let mut out = Vec::new();
        for parent in Self::reachable(map, plan, step.parent, root) {
            let link = match parent.relationships.get(&step.relationship) {
                Some(link) => link,
                None => continue,
            };
            let ids: Vec<&Id> = match link {
                RelLink::One(Some(id)) => vec![id],
                RelLink::One(None) => Vec::new(),
                RelLink::Many(ids) => ids.iter().collect(),
            };
            out.extend(ids.into_iter().filter_map(|id| map.get(id)));
        }
        out
    }

    fn matches(
        map: &HashMap<Id, Entity>,
        plan: &SelectPlan,
        predicate: &Predicate,
        root: &Entity,
    ) -> bool {
        match predicate {
            Predicate::True => true,
            Predicate::And(children) => children
                .iter()
                .all(|c| Self::matches(map, plan, c, root)),
            Predicate::Or(children) => children
                .iter()
                .any(|c| Self::matches(map, plan, c, root)),
            Predicate::Cmp { target, op, value } => {
                Self::reachable(map, plan, target.join, root)
                    .iter()
                    .filter_map(|e| e.fields.get(&target.field))
                    .any(|actual| compare(*op, actual, value))
            }
        }
    }

    /// Value a sort key sees for one root. A to-many hop contributes its
    /// first linked entity.
    fn sort_value(
        map: &HashMap<Id, Entity>,
        plan: &SelectPlan,
        ordering: &crate::model::Ordering,
        root: &Entity,
    ) -> Option<Value> {
        Self::reachable(map, plan, ordering.target.join, root)
            .first()
            .and_then(|e| e.fields.get(&ordering.target.field))
            .cloned()
    }
}

impl Store for MemoryStore {
    fn lookup_by_key(&self, entity_type: &str, key: &RefSpec) -> anyhow::Result<Option<Entity>> {
        let def = self
            .schema
            .entity(entity_type)
            .ok_or_else(|| anyhow!("unknown entity type `{}`", entity_type))?;
        let mut wanted = Vec::with_capacity(key.keys.len());
        for (col, raw) in &key.keys {
            let field = def
                .field(col)
                .ok_or_else(|| anyhow!("`{}` is not a field on {}", col, entity_type))?;
            let value = self
                .schema
                .coerce_str(field, raw)
                .map_err(|e| anyhow!(e))?;
            wanted.push((col.clone(), value));
        }
        let map = self.entities.read();
        Ok(map
            .values()
            .find(|e| {
                e.entity_type == entity_type
                    && wanted
                        .iter()
                        .all(|(col, value)| e.fields.get(col) == Some(value))
            })
            .cloned())
    }

    fn execute(&self, plan: &SelectPlan) -> anyhow::Result<Vec<Entity>> {
        let map = self.entities.read();
        let mut rows: Vec<&Entity> = map
            .values()
            .filter(|e| e.entity_type == plan.entity_type)
            .filter(|e| Self::matches(&map, plan, &plan.predicate, e))
            .collect();
        if plan.order.is_empty() {
            // Deterministic output without an explicit ordering.
            rows = rows.into_iter().sorted_by_key(|e| e.id.clone()).collect();
        } else {
            rows.sort_by(|a, b| {
                for ordering in &plan.order {
                    let va = Self::sort_value(&map, plan, ordering, a);
                    let vb = Self::sort_value(&map, plan, ordering, b);
                    let mut cmp = order_values(va.as_ref(), vb.as_ref());
                    if ordering.direction == SortDirection::Desc {
                        cmp = cmp.reverse();
                    }
                    if cmp != Ordering::Equal {
                        return cmp;
                    }
                }
                a.id.cmp(&b.id)
            });
        }
        let offset = plan.page.offset.unwrap_or(0);
        let rows: Vec<Entity> = rows
            .into_iter()
            .skip(offset)
            .take(plan.page.limit.unwrap_or(usize::MAX))
            .cloned()
            .collect();
        debug!(
            "executed plan for `{}`: {} rows",
            plan.entity_type,
            rows.len()
        );
        Ok(rows)
    }

    fn commit(&self, graph: &EntityGraph) -> anyhow::Result<CommitReceipt> {
        let mut map = self.entities.write();
        for entity in graph.entities.values() {
            for (name, link) in &entity.relationships {
                let ids: Vec<&Id> = match link {
                    RelLink::One(Some(id)) => vec![id],
                    RelLink::One(None) => continue,
                    RelLink::Many(ids) => ids.iter().collect(),
                };
                for id in ids {
                    if !map.contains_key(id) && !graph.contains(id) {
                        bail!(
                            "`{}` on {} links the unknown entity `{}`",
                            name,
                            entity.entity_type,
                            id
                        );
                    }
                }
            }
        }
        for entity in graph.entities.values() {
            map.insert(entity.id.clone(), entity.clone());
        }
        let receipt = CommitReceipt {
            id: generate_id(),
            committed_at: Utc::now(),
            entity_count: graph.entities.len(),
        };
        self.commits.write().push(receipt.clone());
        info!(
            "committed {} entities ({} created) as {}",
            receipt.entity_count,
            graph.created.len(),
            receipt.id
        );
        Ok(receipt)
    }
}

fn compare(op: ComparisonOp, actual: &Value, expected: &Value) -> bool {
    if op == ComparisonOp::Like {
        return match (actual, expected) {
            (Value::String(s), Value::String(pattern)) => like_match(s, pattern),
            _ => false,
        };
    }
    let cmp = order_values(Some(actual), Some(expected));
    match op {
        ComparisonOp::Eq => actual == expected,
        ComparisonOp::Ne => actual != expected,
        ComparisonOp::Gt => cmp == Ordering::Greater,
        ComparisonOp::Gte => cmp != Ordering::Less,
        ComparisonOp::Lt => cmp == Ordering::Less,
        ComparisonOp::Lte => cmp != Ordering::Greater,
        ComparisonOp::Like => false,
    }
}

/// Total order over field values: numbers numerically, strings
/// lexicographically, booleans false-first, absent values first.
fn order_values(a: Option<&Value>, b: Option<&Value>) -> Ordering {
    match (a, b) {
        (None, None) => Ordering::Equal,
        (None, Some(_)) => Ordering::Less,
        (Some(_), None) => Ordering::Greater,
        (Some(a), Some(b)) => match (a, b) {
            (Value::Number(x), Value::Number(y)) => x
                .as_f64()
                .partial_cmp(&y.as_f64())
                .unwrap_or(Ordering::Equal),
            (Value::String(x), Value::String(y)) => x.cmp(y),
            (Value::Bool(x), Value::Bool(y)) => x.cmp(y),
            _ => Ordering::Equal,
        },
    }
}

/// SQL LIKE with `%` as the only wildcard.
fn like_match(s: &str, pattern: &str) -> bool {
    let parts: Vec<&str> = pattern.split('%').collect();
    if parts.len() == 1 {
        return s == pattern;
    }
    let mut rest = s;
    for (i, part) in parts.iter().enumerate() {
        if part.is_empty() {
            continue;
        }
        if i == 0 {
            match rest.strip_prefix(part) {
                Some(r) => rest = r,
                None => return false,
            }
        } else if i == parts.len() - 1 {
            return rest.ends_with(part);
        } else {
            match rest.find(part) {
                Some(pos) => rest = &rest[pos + part.len()..],
                None => return false,
            }
        }
    }
    true
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::logic::query_build::build;
    use crate::logic::query_parse::{parse_query, ParseOptions};
    use crate::seed;

    fn run(root: &str, pairs: &[(&str, &str)]) -> Vec<Entity> {
        let params: Vec<(String, String)> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        let query = parse_query(&params, &ParseOptions::default()).unwrap();
        let plan = build(root, &query, &seed::demo_schema(), &seed::demo_whitelist()).unwrap();
        seed::demo_store().execute(&plan).unwrap()
    }

    #[test]
    fn lookup_coerces_key_values() {
        let store = seed::demo_store();
        let track = store
            .lookup_by_key(
                "Track",
                &RefSpec {
                    keys: vec![("track_id".to_string(), "1".to_string())],
                },
            )
            .unwrap()
            .unwrap();
        assert_eq!(track.fields["track_id"], serde_json::json!(1));
    }

    #[test]
    fn lookup_miss_is_none_not_an_error() {
        let store = seed::demo_store();
        let missing = store
            .lookup_by_key(
                "Track",
                &RefSpec {
                    keys: vec![("track_id".to_string(), "999".to_string())],
                },
            )
            .unwrap();
        assert!(missing.is_none());
    }

    #[test]
    fn filters_compare_numerically() {
        let rows = run("Track", &[("milliseconds_lt", "300000")]);
        assert!(!rows.is_empty());
        assert!(rows
            .iter()
            .all(|e| e.fields["milliseconds"].as_i64().unwrap() < 300000));
    }

    #[test]
    fn filters_reach_across_joins() {
        let rows = run("Album", &[("artist.name", "Aerosmith")]);
        assert_eq!(rows.len(), 2);
    }

    #[test]
    fn to_many_joins_match_any_linked_entity() {
        let rows = run("Album", &[("tracks.genre", "Jazz")]);
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].fields["title"], serde_json::json!("Blue Train"));
    }

    #[test]
    fn like_uses_percent_wildcards() {
        let rows = run("Artist", &[("name_like", "%smith")]);
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].fields["name"], serde_json::json!("Aerosmith"));
    }

    #[test]
    fn sort_and_page_apply_in_order() {
        let rows = run(
            "Track",
            &[("order_by", "milliseconds-DESC"), ("limit", "2")],
        );
        assert_eq!(rows.len(), 2);
        let a = rows[0].fields["milliseconds"].as_i64().unwrap();
        let b = rows[1].fields["milliseconds"].as_i64().unwrap();
        assert!(a >= b);
    }

    #[test]
    fn offset_skips_rows() {
        let all = run("Track", &[("order_by", "track_id-ASC")]);
        let rest = run("Track", &[("order_by", "track_id-ASC"), ("offset", "1")]);
        assert_eq!(rest.len(), all.len() - 1);
        assert_eq!(rest[0], all[1]);
    }

    #[test]
    fn commit_rejects_dangling_links() {
        let store = seed::demo_store();
        let schema = seed::demo_schema();
        let mut entity = schema.instantiate("Album").unwrap();
        entity
            .relationships
            .insert("artist".to_string(), RelLink::One(Some("ghost".to_string())));
        let mut graph = EntityGraph::default();
        graph.stage_created(entity);
        assert!(store.commit(&graph).is_err());
    }

    #[test]
    fn commit_persists_and_logs() {
        let store = seed::demo_store();
        let schema = seed::demo_schema();
        let entity = schema.instantiate("Artist").unwrap();
        let id = entity.id.clone();
        let mut graph = EntityGraph::default();
        graph.stage_created(entity);
        let receipt = store.commit(&graph).unwrap();
        assert_eq!(receipt.entity_count, 1);
        assert!(store.get(&id).is_some());
        assert_eq!(store.commit_log().len(), 1);
    }

    #[test]
    fn like_matching() {
        assert!(like_match("Aerosmith", "Aero%"));
        assert!(like_match("Aerosmith", "%smith"));
        assert!(like_match("Aerosmith", "%ros%"));
        assert!(like_match("Aerosmith", "Aerosmith"));
        assert!(!like_match("Aerosmith", "aero%"));
        assert!(!like_match("Aerosmith", "%coltrane%"));
    }
}

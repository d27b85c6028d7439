use crate::logic::error_tree::ErrorTree;
use crate::logic::tokenize::ParseError;
use crate::logic::whitelist::{AccessOp, WhitelistSet};
use crate::model::{
    render_path, Cardinality, EditOp, EditTarget, Entity, EntityGraph, Id, Member, MutationNode,
    MutationTree, PathSegment, RefSpec, RelLink, RelationshipDef, Schema,
};
use crate::store::Store;
use log::debug;
use serde::Serialize;
use thiserror::Error;

/// What the mutation is applied to: an entity loaded by the caller, or a
/// fresh one of the named type.
#[derive(Debug, Clone)]
pub enum ApplyTarget {
    Existing(Entity),
    Create(String),
}

/// Result of resolving a mutation tree: the staged entity graph, the root
/// entity's id, and every recoverable failure keyed by the parameter path
/// that caused it. The caller inspects `errors` before committing.
#[derive(Debug, Serialize)]
pub struct MutationOutcome {
    pub graph: EntityGraph,
    pub root: Id,
    pub errors: ErrorTree,
}

#[derive(Debug, Error)]
pub enum MutationError {
    #[error(transparent)]
    Parse(#[from] ParseError),
    #[error(transparent)]
    Store(#[from] anyhow::Error),
}

/// Resolve a parsed mutation tree against the schema, whitelist, and
/// store. Structural violations fail the whole request; everything else
/// (bad values, missed references, denied writes) lands in the outcome's
/// error tree while the rest of the request still applies.
pub fn apply(
    target: ApplyTarget,
    tree: &MutationTree,
    schema: &Schema,
    whitelist: &WhitelistSet,
    store: &dyn Store,
) -> Result<MutationOutcome, MutationError> {
    let (root, root_type) = match target {
        ApplyTarget::Existing(entity) => (entity, None),
        ApplyTarget::Create(entity_type) => {
            let entity = schema
                .instantiate(&entity_type)
                .ok_or_else(|| anyhow::anyhow!("unknown entity type `{}`", entity_type))?;
            (entity, Some(entity_type))
        }
    };
    validate_structure(tree, &root.entity_type, schema, &mut Vec::new())?;

    let mut resolver = Resolver {
        schema,
        whitelist,
        store,
        graph: EntityGraph::default(),
        errors: ErrorTree::new(),
    };
    let root_id = root.id.clone();
    let entity_type = root.entity_type.clone();
    if root_type.is_some() {
        resolver.graph.stage_created(root);
    } else {
        resolver.graph.stage(root);
    }
    resolver.apply_tree(&root_id, &entity_type, tree, &[])?;
    debug!(
        "resolved mutation: {} staged, {} created, {} errors",
        resolver.graph.entities.len(),
        resolver.graph.created.len(),
        resolver.errors.len()
    );
    Ok(MutationOutcome {
        graph: resolver.graph,
        root: root_id,
        errors: resolver.errors,
    })
}

/// Fail-fast pass over the tree shape: every edit must address a declared
/// relationship, and `$set` is only meaningful on to-one edges.
fn validate_structure(
    tree: &MutationTree,
    entity_type: &str,
    schema: &Schema,
    prefix: &mut Vec<PathSegment>,
) -> Result<(), ParseError> {
    for node in &tree.nodes {
        let edit = match node {
            MutationNode::Edit(edit) => edit,
            MutationNode::Leaf { .. } => continue,
        };
        prefix.push(PathSegment::Field(edit.relationship.clone()));
        let rel = match schema.resolve(entity_type, &edit.relationship) {
            Some(Member::Relationship(rel)) => rel,
            _ => {
                return Err(ParseError::NotARelationship {
                    path: render_path(prefix),
                })
            }
        };
        if edit.op == Some(EditOp::Set) && rel.cardinality == Cardinality::ToMany {
            return Err(ParseError::SetOnToMany {
                path: render_path(prefix),
            });
        }
        match &edit.target {
            Some(EditTarget::Existing(spec)) => prefix.push(PathSegment::Ref(spec.clone())),
            Some(EditTarget::New(label)) => prefix.push(PathSegment::New(label.clone())),
            None => {}
        }
        validate_structure(&edit.nested, &rel.target, schema, prefix)?;
        if edit.target.is_some() {
            prefix.pop();
        }
        prefix.pop();
    }
    Ok(())
}

struct Resolver<'a> {
    schema: &'a Schema,
    whitelist: &'a WhitelistSet,
    store: &'a dyn Store,
    graph: EntityGraph,
    errors: ErrorTree,
}

impl Resolver<'_> {
    fn apply_tree(
        &mut self,
        entity_id: &str,
        entity_type: &str,
        tree: &MutationTree,
        prefix: &[PathSegment],
    ) -> Result<(), MutationError> {
        for node in &tree.nodes {
            match node {
                MutationNode::Leaf { path, raw } => {
                    self.apply_leaf(entity_id, entity_type, path, raw, prefix);
                }
                MutationNode::Edit(edit) => {
                    self.apply_edit(entity_id, entity_type, edit, prefix)?;
                }
            }
        }
        Ok(())
    }

    fn apply_leaf(
        &mut self,
        entity_id: &str,
        entity_type: &str,
        path: &[String],
        raw: &str,
        prefix: &[PathSegment],
    ) {
        let mut key = prefix.to_vec();
        key.extend(path.iter().map(|p| PathSegment::Field(p.clone())));
        let rendered = render_path(&key);
        if path.len() != 1 {
            self.errors.push(
                rendered,
                "editing through a relationship needs a `$id` or `$new` segment",
            );
            return;
        }
        let name = &path[0];
        if !self.whitelist.is_allowed(&key, AccessOp::Write) {
            self.errors.push(rendered, "not whitelisted for writing");
            return;
        }
        match self.schema.resolve(entity_type, name) {
            Some(Member::Field(field)) => match self.schema.coerce_str(field, raw) {
                Ok(value) => {
                    if let Some(entity) = self.graph.get_mut(entity_id) {
                        entity.fields.insert(name.clone(), value);
                    }
                }
                Err(message) => self.errors.push(rendered, message),
            },
            Some(Member::Relationship(_)) => self.errors.push(
                rendered,
                "editing through a relationship needs a `$id` or `$new` segment",
            ),
            None => self.errors.push(
                rendered,
                format!("`{}` is not a field on {}", name, entity_type),
            ),
        }
    }

    fn apply_edit(
        &mut self,
        entity_id: &str,
        entity_type: &str,
        edit: &crate::model::RelationshipEdit,
        prefix: &[PathSegment],
    ) -> Result<(), MutationError> {
        // Guaranteed to resolve by the structural pass.
        let rel = match self.schema.resolve(entity_type, &edit.relationship) {
            Some(Member::Relationship(rel)) => rel.clone(),
            _ => return Ok(()),
        };
        let mut rel_key = prefix.to_vec();
        rel_key.push(PathSegment::Field(edit.relationship.clone()));

        match &edit.target {
            None => {
                self.errors.push(
                    render_path(&rel_key),
                    "a relationship directive needs a `$id` or `$new` target",
                );
                Ok(())
            }
            Some(EditTarget::New(label)) => {
                let mut key = rel_key.clone();
                key.push(PathSegment::New(label.clone()));
                self.apply_new(entity_id, &rel, edit, rel_key, key)
            }
            Some(EditTarget::Existing(spec)) => {
                let mut key = rel_key.clone();
                key.push(PathSegment::Ref(spec.clone()));
                self.apply_existing(entity_id, &rel, spec, edit, rel_key, key)
            }
        }
    }

    fn apply_new(
        &mut self,
        parent_id: &str,
        rel: &RelationshipDef,
        edit: &crate::model::RelationshipEdit,
        rel_key: Vec<PathSegment>,
        key: Vec<PathSegment>,
    ) -> Result<(), MutationError> {
        // Operation grants live at the relationship path; the `$new`
        // segment only matters for the new entity's own fields.
        if !self.whitelist.is_allowed(&rel_key, AccessOp::Create) {
            self.errors
                .push(render_path(&key), "not whitelisted for creating");
            return Ok(());
        }
        let entity = match self.schema.instantiate(&rel.target) {
            Some(entity) => entity,
            None => {
                return Err(
                    anyhow::anyhow!("schema names unknown entity type `{}`", rel.target).into(),
                )
            }
        };
        let target_id = entity.id.clone();
        self.graph.stage_created(entity);
        self.apply_tree(&target_id, &rel.target, &edit.nested, &key)?;
        // `$add` or `$set`, enforced at parse time.
        let op = edit.op.unwrap_or(EditOp::Add);
        self.attach(parent_id, rel, op, &target_id, &rel_key, &key);
        Ok(())
    }

    fn apply_existing(
        &mut self,
        parent_id: &str,
        rel: &RelationshipDef,
        spec: &RefSpec,
        edit: &crate::model::RelationshipEdit,
        rel_key: Vec<PathSegment>,
        key: Vec<PathSegment>,
    ) -> Result<(), MutationError> {
        if let Some(message) = self.check_ref(&rel.target, spec) {
            self.errors.push(render_path(&key), message);
            return Ok(());
        }
        let found = self.store.lookup_by_key(&rel.target, spec)?;
        let target_id = match found {
            Some(entity) => {
                let id = entity.id.clone();
                // An already-staged copy wins, so earlier edits are kept.
                self.graph.stage(entity);
                id
            }
            None => {
                self.errors.push(
                    render_path(&key),
                    format!("no {} matches the reference", rel.target),
                );
                return Ok(());
            }
        };
        let in_relation = self
            .graph
            .get(parent_id)
            .and_then(|e| e.relationships.get(&rel.name))
            .map_or(false, |link| link.contains(&target_id));
        match edit.op {
            None => {
                if !in_relation {
                    self.errors.push(
                        render_path(&key),
                        format!(
                            "target is not in `{}`; did you forget `$add`?",
                            rel.name
                        ),
                    );
                    return Ok(());
                }
            }
            Some(op) => self.attach(parent_id, rel, op, &target_id, &rel_key, &key),
        }
        self.apply_tree(&target_id, &rel.target, &edit.nested, &key)
    }

    /// Check a `$id` reference against the target type's declared primary
    /// keys before asking the store.
    fn check_ref(&self, entity_type: &str, spec: &RefSpec) -> Option<String> {
        let def = self.schema.entity(entity_type)?;
        for (col, val) in &spec.keys {
            let field = match def.field(col) {
                Some(field) => field,
                None => return Some(format!("`{}` is not a field on {}", col, entity_type)),
            };
            if !field.primary_key {
                return Some(format!(
                    "`{}` is not a primary-key column on {}",
                    col, entity_type
                ));
            }
            if let Err(message) = self.schema.coerce_str(field, val) {
                return Some(message);
            }
        }
        None
    }

    fn attach(
        &mut self,
        parent_id: &str,
        rel: &RelationshipDef,
        op: EditOp,
        target_id: &str,
        rel_key: &[PathSegment],
        key: &[PathSegment],
    ) {
        let allowed = match op {
            EditOp::Add => self.whitelist.is_allowed(rel_key, AccessOp::Add),
            EditOp::Remove => self.whitelist.is_allowed(rel_key, AccessOp::Remove),
            // Replacing a to-one link is a detach plus an attach, so a
            // `$set` grant or the pair of `$add` and `$remove` both permit
            // it.
            EditOp::Set => {
                self.whitelist.is_allowed(rel_key, AccessOp::Set)
                    || (self.whitelist.is_allowed(rel_key, AccessOp::Add)
                        && self.whitelist.is_allowed(rel_key, AccessOp::Remove))
            }
        };
        if !allowed {
            self.errors.push(
                render_path(key),
                format!("not whitelisted for `{}`", directive_name(op)),
            );
            return;
        }
        let entity = match self.graph.get_mut(parent_id) {
            Some(entity) => entity,
            None => return,
        };
        let link = entity
            .relationships
            .entry(rel.name.clone())
            .or_insert_with(|| match rel.cardinality {
                Cardinality::ToOne => RelLink::One(None),
                Cardinality::ToMany => RelLink::Many(Vec::new()),
            });
        match (op, link) {
            (EditOp::Add, RelLink::Many(ids)) => {
                if !ids.iter().any(|i| i == target_id) {
                    ids.push(target_id.to_string());
                }
            }
            (EditOp::Add, RelLink::One(current)) => match current {
                None => *current = Some(target_id.to_string()),
                Some(existing) if existing == target_id => {}
                Some(_) => self.errors.push(
                    render_path(key),
                    format!("`{}` is already linked; use `$set` to replace it", rel.name),
                ),
            },
            (EditOp::Remove, RelLink::Many(ids)) => {
                let before = ids.len();
                ids.retain(|i| i != target_id);
                if ids.len() == before {
                    self.errors.push(
                        render_path(key),
                        format!("target is not in `{}`", rel.name),
                    );
                }
            }
            (EditOp::Remove, RelLink::One(current)) => {
                if current.as_deref() == Some(target_id) {
                    *current = None;
                } else {
                    self.errors.push(
                        render_path(key),
                        format!("target is not in `{}`", rel.name),
                    );
                }
            }
            (EditOp::Set, RelLink::One(current)) => {
                *current = Some(target_id.to_string());
            }
            // Ruled out by the structural pass.
            (EditOp::Set, RelLink::Many(_)) => {}
        }
    }
}

fn directive_name(op: EditOp) -> &'static str {
    match op {
        EditOp::Add => "$add",
        EditOp::Remove => "$remove",
        EditOp::Set => "$set",
    }
}

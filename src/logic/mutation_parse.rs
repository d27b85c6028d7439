use crate::logic::tokenize::{tokenize, ParseError};
use crate::model::{
    render_path, EditOp, EditTarget, MutationNode, MutationTree, PathSegment, RelationshipEdit,
};
use log::debug;

/// Parse mutation parameters into a path-structured tree. Keys addressing
/// the same relationship target are grouped into one edit, so an `$add`
/// directive and the attribute values for its target may arrive as
/// separate parameters in any order. Structural problems fail the whole
/// request here; per-value problems are left for the resolver to collect.
pub fn parse_mutation(params: &[(String, String)]) -> Result<MutationTree, ParseError> {
    let mut root = MutationTree::default();
    for (key, value) in params {
        let path = tokenize(key)?;
        insert(&mut root, path.segments(), key, value)?;
    }
    let mut prefix = Vec::new();
    validate_attachments(&root, &mut prefix)?;
    debug!("parsed mutation with {} top-level nodes", root.nodes.len());
    Ok(root)
}

fn insert(
    root: &mut MutationTree,
    full: &[PathSegment],
    key: &str,
    raw: &str,
) -> Result<(), ParseError> {
    let mut tree = root;
    let mut i = 0;
    loop {
        let name = match full[i].field_name() {
            Some(name) => name.to_string(),
            None => {
                return Err(ParseError::ReservedPosition {
                    token: full[i].to_string(),
                    key: key.to_string(),
                })
            }
        };
        // A plain tail is a scalar attribute leaf. The tokenizer already
        // guarantees directives are terminal, but a `$id`/`$new` hiding
        // behind an unidentified relationship hop must be rejected here.
        if full
            .get(i + 1)
            .map_or(true, |s| s.field_name().is_some())
        {
            if let Some(bad) = full[i..].iter().find(|s| s.field_name().is_none()) {
                return Err(ParseError::ReservedPosition {
                    token: bad.to_string(),
                    key: key.to_string(),
                });
            }
            tree.nodes.push(MutationNode::Leaf {
                path: full[i..]
                    .iter()
                    .filter_map(|s| s.field_name())
                    .map(str::to_string)
                    .collect(),
                raw: raw.to_string(),
            });
            return Ok(());
        }
        let (target, after) = match &full[i + 1] {
            PathSegment::Ref(spec) => (Some(EditTarget::Existing(spec.clone())), i + 2),
            PathSegment::New(label) => (Some(EditTarget::New(label.clone())), i + 2),
            _ => (None, i + 1),
        };
        let this = tree;
        let edit = this.edit_mut(&name, target);
        match full.get(after) {
            None => return Ok(()),
            Some(seg) if seg.is_directive() => {
                return apply_directive(edit, seg, raw, &full[..after], key)
            }
            Some(_) => {
                tree = &mut edit.nested;
                i = after;
            }
        }
    }
}

fn apply_directive(
    edit: &mut RelationshipEdit,
    seg: &PathSegment,
    raw: &str,
    prefix: &[PathSegment],
    key: &str,
) -> Result<(), ParseError> {
    let op = match seg {
        PathSegment::Add => EditOp::Add,
        PathSegment::Remove => EditOp::Remove,
        PathSegment::Set => EditOp::Set,
        _ => {
            return Err(ParseError::CreateInMutation {
                key: key.to_string(),
            })
        }
    };
    // A falsy value disarms the directive without erasing one that
    // arrived under another key.
    if !truthy(raw) {
        return Ok(());
    }
    match edit.op {
        None => {
            edit.op = Some(op);
            Ok(())
        }
        Some(existing) if existing == op => Ok(()),
        Some(_) => Err(ParseError::ConflictingOps {
            path: render_path(prefix),
        }),
    }
}

fn truthy(raw: &str) -> bool {
    matches!(raw, "true" | "True" | "1")
}

/// Every `$new` target must carry an explicit `$add` or `$set`, and can
/// never be the target of `$remove`. Checked over the whole tree so the
/// directive may arrive under any key.
fn validate_attachments(
    tree: &MutationTree,
    prefix: &mut Vec<PathSegment>,
) -> Result<(), ParseError> {
    for node in &tree.nodes {
        let edit = match node {
            MutationNode::Edit(edit) => edit,
            MutationNode::Leaf { .. } => continue,
        };
        prefix.push(PathSegment::Field(edit.relationship.clone()));
        match &edit.target {
            Some(EditTarget::New(label)) => {
                prefix.push(PathSegment::New(label.clone()));
                match edit.op {
                    Some(EditOp::Add) | Some(EditOp::Set) => {}
                    Some(EditOp::Remove) => {
                        return Err(ParseError::RemoveOnNew {
                            path: render_path(prefix),
                        })
                    }
                    None => {
                        return Err(ParseError::UnattachedNew {
                            path: render_path(prefix),
                        })
                    }
                }
            }
            Some(EditTarget::Existing(spec)) => prefix.push(PathSegment::Ref(spec.clone())),
            None => {}
        }
        validate_attachments(&edit.nested, prefix)?;
        prefix.pop();
        if edit.target.is_some() {
            prefix.pop();
        }
    }
    Ok(())
}

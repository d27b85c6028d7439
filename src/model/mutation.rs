use crate::model::RefSpec;
use serde::{Deserialize, Serialize};

/// Relationship edit operation carried by a trailing `$add`/`$remove`/`$set`
/// directive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EditOp {
    Add,
    Remove,
    Set,
}

/// What a relationship edit points at.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum EditTarget {
    /// An existing entity addressed by `$id`.
    Existing(RefSpec),
    /// A to-be-created entity addressed by `$new<label>`.
    New(String),
}

/// One edit of a relationship: optionally an attach/detach operation, plus
/// a nested mutation applied to the target entity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RelationshipEdit {
    pub relationship: String,
    /// `None` when a directive like `rel.$add=true` arrived without any
    /// `$id`/`$new` target; the resolver reports that as an error.
    pub target: Option<EditTarget>,
    pub op: Option<EditOp>,
    pub nested: MutationTree,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum MutationNode {
    /// Set a scalar attribute. The path holds the raw dotted field names
    /// that remained after token parsing; anything longer than one name
    /// fails resolution (relationships need `$id`/`$new`).
    Leaf { path: Vec<String>, raw: String },
    Edit(RelationshipEdit),
}

/// Parsed, path-structured representation of a create/update request for
/// one entity level. Node order follows first appearance of the parameters.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct MutationTree {
    pub nodes: Vec<MutationNode>,
}

impl MutationTree {
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Find or create the edit addressed by (relationship, target).
    pub(crate) fn edit_mut(
        &mut self,
        relationship: &str,
        target: Option<EditTarget>,
    ) -> &mut RelationshipEdit {
        let pos = self.nodes.iter().position(|n| match n {
            MutationNode::Edit(e) => e.relationship == relationship && e.target == target,
            _ => false,
        });
        let idx = match pos {
            Some(idx) => idx,
            None => {
                self.nodes.push(MutationNode::Edit(RelationshipEdit {
                    relationship: relationship.to_string(),
                    target,
                    op: None,
                    nested: MutationTree::default(),
                }));
                self.nodes.len() - 1
            }
        };
        match &mut self.nodes[idx] {
            MutationNode::Edit(e) => e,
            _ => unreachable!(),
        }
    }
}

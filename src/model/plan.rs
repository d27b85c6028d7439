use crate::model::{ComparisonOp, Page, SortDirection};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// One relationship traversal needed by the plan. Joins form a tree via
/// `parent`; the builder deduplicates traversals of the same relationship.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Join {
    /// Index of the parent join, or `None` when joined off the root.
    pub parent: Option<usize>,
    pub relationship: String,
    pub target_type: String,
}

/// A resolved field: which join it hangs off (`None` = root entity) and the
/// field name on that entity type.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldRef {
    pub join: Option<usize>,
    pub field: String,
}

/// Backend-agnostic predicate, composed by the query builder and executed
/// by the storage collaborator. Values are already schema-coerced.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Predicate {
    True,
    And(Vec<Predicate>),
    Or(Vec<Predicate>),
    Cmp {
        target: FieldRef,
        op: ComparisonOp,
        value: Value,
    },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Ordering {
    pub target: FieldRef,
    pub direction: SortDirection,
}

/// Everything the storage layer needs to produce a result set.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SelectPlan {
    pub entity_type: String,
    pub joins: Vec<Join>,
    pub predicate: Predicate,
    pub order: Vec<Ordering>,
    pub page: Page,
}

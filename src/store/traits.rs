use crate::model::{Entity, EntityGraph, Id, RefSpec, SelectPlan};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Receipt for one committed mutation graph.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CommitReceipt {
    pub id: Id,
    pub committed_at: DateTime<Utc>,
    /// Entities written by the commit, created and updated alike.
    pub entity_count: usize,
}

/// Storage backend boundary. The parsing and resolution layers never touch
/// persisted data directly; they ask the store to look up referenced
/// entities, run built plans, and commit staged graphs.
pub trait Store: Send + Sync {
    /// Find the single entity of a type matching a `$id` reference.
    /// Returns `Ok(None)` on a miss; a miss is the caller's recoverable
    /// error, not the store's.
    fn lookup_by_key(&self, entity_type: &str, key: &RefSpec) -> anyhow::Result<Option<Entity>>;

    /// Run a select plan and return the matching root entities in plan
    /// order.
    fn execute(&self, plan: &SelectPlan) -> anyhow::Result<Vec<Entity>>;

    /// Atomically persist every entity in a staged graph.
    fn commit(&self, graph: &EntityGraph) -> anyhow::Result<CommitReceipt>;
}

use crate::model::{ComparisonOp, Path, SortDirection};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Structured filter expression built from flat parameters and/or the
/// complex query payload. Logical nodes preserve the nesting the caller
/// supplied; comparisons keep their raw value until the query builder
/// coerces it against the schema.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum FilterExpr {
    And(Vec<FilterExpr>),
    Or(Vec<FilterExpr>),
    Cmp {
        path: Path,
        op: ComparisonOp,
        value: Value,
    },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SortKey {
    pub path: Path,
    pub direction: SortDirection,
}

/// Pagination bounds. Absence means "unbounded" / "no offset", never a
/// default of zero.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Page {
    pub limit: Option<usize>,
    pub offset: Option<usize>,
}

/// The parser's output for a read request. Sort priority is the order of
/// appearance in `sorts`.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct ParsedQuery {
    pub filter: Option<FilterExpr>,
    pub sorts: Vec<SortKey>,
    pub page: Page,
}

pub mod error_tree;
pub mod mutation_parse;
pub mod query_build;
pub mod query_parse;
pub mod resolve;
pub mod tokenize;
pub mod whitelist;

pub use error_tree::ErrorTree;
pub use mutation_parse::parse_mutation;
pub use query_build::{build, QueryError};
pub use query_parse::{parse_query, ParseOptions};
pub use resolve::{apply, ApplyTarget, MutationError, MutationOutcome};
pub use tokenize::{tokenize, ParseError};
pub use whitelist::{AccessOp, WhitelistSet};

use crate::model::{Schema, SelectPlan};
use crate::store::Store;

/// Parse query parameters and build an executable select plan for
/// `root_type` in one call.
pub fn parse_and_build_query(
    root_type: &str,
    params: &[(String, String)],
    opts: &ParseOptions,
    schema: &Schema,
    whitelist: &WhitelistSet,
) -> Result<SelectPlan, QueryError> {
    let parsed = parse_query(params, opts)?;
    build(root_type, &parsed, schema, whitelist)
}

/// Parse mutation parameters and resolve them against the store in one
/// call. The returned outcome still has to be inspected for per-path
/// errors and committed by the caller.
pub fn parse_and_apply_mutation(
    target: ApplyTarget,
    params: &[(String, String)],
    schema: &Schema,
    whitelist: &WhitelistSet,
    store: &dyn Store,
) -> Result<MutationOutcome, MutationError> {
    let tree = parse_mutation(params)?;
    apply(target, &tree, schema, whitelist, store)
}

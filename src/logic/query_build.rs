use crate::logic::tokenize::ParseError;
use crate::logic::whitelist::{AccessOp, WhitelistSet};
use crate::model::{
    ComparisonOp, DataType, FieldRef, FilterExpr, Join, Member, Ordering, ParsedQuery, Path,
    Predicate, Schema, SelectPlan, SortKey,
};
use log::debug;
use serde_json::Value;
use thiserror::Error;

/// Failure while turning a parsed query into an executable plan. Any
/// single bad input fails the whole query.
#[derive(Debug, Error)]
pub enum QueryError {
    #[error(transparent)]
    Parse(#[from] ParseError),
    #[error("`{path}` is not whitelisted for reading")]
    Denied { path: String },
    #[error("`{path}` does not exist on this entity type")]
    UnknownPath { path: String },
    #[error("bad value for `{path}`: {message}")]
    Value { path: String, message: String },
}

/// Resolves filter and sort paths against the schema while building up a
/// deduplicated join list. A path like `album.artist.name` contributes the
/// joins `album` and `album.artist` once each, no matter how many
/// comparisons traverse them.
struct PlanBuilder<'a> {
    root_type: &'a str,
    schema: &'a Schema,
    whitelist: &'a WhitelistSet,
    joins: Vec<Join>,
}

impl<'a> PlanBuilder<'a> {
    fn new(root_type: &'a str, schema: &'a Schema, whitelist: &'a WhitelistSet) -> Self {
        Self {
            root_type,
            schema,
            whitelist,
            joins: Vec::new(),
        }
    }

    fn join_index(&mut self, parent: Option<usize>, relationship: &str, target_type: &str) -> usize {
        if let Some(idx) = self
            .joins
            .iter()
            .position(|j| j.parent == parent && j.relationship == relationship)
        {
            return idx;
        }
        self.joins.push(Join {
            parent,
            relationship: relationship.to_string(),
            target_type: target_type.to_string(),
        });
        self.joins.len() - 1
    }

    /// Walk a plain path down the relationship graph. Every segment but the
    /// last must be a relationship; the last must be a field.
    fn resolve(&mut self, path: &Path) -> Result<FieldRef, QueryError> {
        let names = path.field_names();
        let mut entity_type = self.root_type.to_string();
        let mut join: Option<usize> = None;
        for (pos, name) in names.iter().enumerate() {
            let last = pos == names.len() - 1;
            match self.schema.resolve(&entity_type, name) {
                Some(Member::Field(field)) if last => {
                    if !self.whitelist.is_allowed(path.segments(), AccessOp::Read) {
                        return Err(QueryError::Denied {
                            path: path.to_string(),
                        });
                    }
                    return Ok(FieldRef {
                        join,
                        field: field.name.clone(),
                    });
                }
                Some(Member::Relationship(rel)) if !last => {
                    join = Some(self.join_index(join, &rel.name, &rel.target));
                    entity_type = rel.target.clone();
                }
                _ => {
                    return Err(QueryError::UnknownPath {
                        path: path.to_string(),
                    });
                }
            }
        }
        Err(QueryError::UnknownPath {
            path: path.to_string(),
        })
    }

    fn coerce(
        &self,
        path: &Path,
        target: &FieldRef,
        op: ComparisonOp,
        value: &Value,
    ) -> Result<Value, QueryError> {
        let entity_type = match target.join {
            Some(idx) => self.joins[idx].target_type.as_str(),
            None => self.root_type,
        };
        let field = match self.schema.resolve(entity_type, &target.field) {
            Some(Member::Field(field)) => field,
            _ => {
                return Err(QueryError::UnknownPath {
                    path: path.to_string(),
                })
            }
        };
        if op == ComparisonOp::Like && field.data_type != DataType::String {
            return Err(QueryError::Value {
                path: path.to_string(),
                message: format!("`$like` needs a string field, `{}` is not one", field.name),
            });
        }
        self.schema
            .coerce_json(field, value)
            .map_err(|message| QueryError::Value {
                path: path.to_string(),
                message,
            })
    }

    fn predicate(&mut self, filter: &FilterExpr) -> Result<Predicate, QueryError> {
        match filter {
            FilterExpr::And(children) => Ok(Predicate::And(
                children
                    .iter()
                    .map(|c| self.predicate(c))
                    .collect::<Result<Vec<_>, _>>()?,
            )),
            FilterExpr::Or(children) => Ok(Predicate::Or(
                children
                    .iter()
                    .map(|c| self.predicate(c))
                    .collect::<Result<Vec<_>, _>>()?,
            )),
            FilterExpr::Cmp { path, op, value } => {
                let target = self.resolve(path)?;
                let value = self.coerce(path, &target, *op, value)?;
                Ok(Predicate::Cmp {
                    target,
                    op: *op,
                    value,
                })
            }
        }
    }

    fn ordering(&mut self, sort: &SortKey) -> Result<Ordering, QueryError> {
        let target = self.resolve(&sort.path)?;
        Ok(Ordering {
            target,
            direction: sort.direction,
        })
    }
}

/// Turn a parsed query into an executable plan for `root_type`, verifying
/// every touched path against the schema and the read whitelist.
pub fn build(
    root_type: &str,
    query: &ParsedQuery,
    schema: &Schema,
    whitelist: &WhitelistSet,
) -> Result<SelectPlan, QueryError> {
    let mut builder = PlanBuilder::new(root_type, schema, whitelist);
    let predicate = match &query.filter {
        Some(filter) => builder.predicate(filter)?,
        None => Predicate::True,
    };
    let order = query
        .sorts
        .iter()
        .map(|s| builder.ordering(s))
        .collect::<Result<Vec<_>, _>>()?;
    debug!(
        "built plan for `{}`: {} joins, {} orderings",
        root_type,
        builder.joins.len(),
        order.len()
    );
    Ok(SelectPlan {
        entity_type: root_type.to_string(),
        joins: builder.joins,
        predicate,
        order,
        page: query.page.clone(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::logic::query_parse::{parse_query, ParseOptions};
    use crate::seed;

    fn parse(pairs: &[(&str, &str)]) -> ParsedQuery {
        let params: Vec<(String, String)> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        parse_query(&params, &ParseOptions::default()).unwrap()
    }

    #[test]
    fn shared_path_prefixes_join_once() {
        let query = parse(&[
            ("artist.name", "Aerosmith"),
            ("artist.birth_year_gte", "1940"),
        ]);
        let plan = build("Album", &query, &seed::demo_schema(), &seed::demo_whitelist()).unwrap();
        assert_eq!(plan.joins.len(), 1);
        assert_eq!(plan.joins[0].relationship, "artist");
        assert_eq!(plan.joins[0].target_type, "Artist");
    }

    #[test]
    fn values_are_coerced_to_field_types() {
        let query = parse(&[("milliseconds_lte", "500")]);
        let plan = build("Track", &query, &seed::demo_schema(), &seed::demo_whitelist()).unwrap();
        match plan.predicate {
            Predicate::Cmp { value, .. } => assert_eq!(value, serde_json::json!(500)),
            other => panic!("expected a comparison, got {:?}", other),
        }
    }

    #[test]
    fn uncoercible_value_fails() {
        let query = parse(&[("milliseconds", "soon")]);
        assert!(matches!(
            build("Track", &query, &seed::demo_schema(), &seed::demo_whitelist()),
            Err(QueryError::Value { .. })
        ));
    }

    #[test]
    fn unknown_field_fails() {
        let query = parse(&[("colour", "blue")]);
        assert!(matches!(
            build("Track", &query, &seed::demo_schema(), &seed::demo_whitelist()),
            Err(QueryError::UnknownPath { .. })
        ));
    }

    #[test]
    fn path_through_a_field_fails() {
        let query = parse(&[("title.name", "x")]);
        assert!(matches!(
            build("Album", &query, &seed::demo_schema(), &seed::demo_whitelist()),
            Err(QueryError::UnknownPath { .. })
        ));
    }

    #[test]
    fn non_whitelisted_path_is_denied() {
        let whitelist = crate::logic::whitelist::WhitelistSet::compile(["title"]).unwrap();
        let query = parse(&[("artist.name", "x")]);
        assert!(matches!(
            build("Album", &query, &seed::demo_schema(), &whitelist),
            Err(QueryError::Denied { .. })
        ));
    }

    #[test]
    fn like_on_a_number_field_fails() {
        let query = parse(&[("milliseconds_like", "%5%")]);
        assert!(matches!(
            build("Track", &query, &seed::demo_schema(), &seed::demo_whitelist()),
            Err(QueryError::Value { .. })
        ));
    }

    #[test]
    fn sorts_resolve_through_joins() {
        let query = parse(&[("order_by", "title-ASC-artist.name-DESC")]);
        let plan = build("Album", &query, &seed::demo_schema(), &seed::demo_whitelist()).unwrap();
        assert_eq!(plan.order.len(), 2);
        assert_eq!(plan.order[0].target.join, None);
        assert_eq!(plan.order[1].target.join, Some(0));
    }

    #[test]
    fn empty_query_selects_everything() {
        let query = parse(&[]);
        let plan = build("Track", &query, &seed::demo_schema(), &seed::demo_whitelist()).unwrap();
        assert!(matches!(plan.predicate, Predicate::True));
        assert!(plan.joins.is_empty());
    }
}

use crate::logic::tokenize::{tokenize, ParseError};
use crate::model::{ComparisonOp, FilterExpr, Page, ParsedQuery, Path, SortDirection, SortKey};
use log::debug;
use serde_json::Value;

/// Reserved parameter names and parse limits, typically sourced from
/// `AppConfig`.
#[derive(Debug, Clone, PartialEq)]
pub struct ParseOptions {
    pub complex_param: String,
    pub order_by_param: String,
    pub offset_param: String,
    pub limit_param: String,
    /// Skip simple key=value filters, keeping only the complex query
    /// parameter. Used when the same flat keys are mutation instructions
    /// (bulk update via filter).
    pub only_complex: bool,
    /// Hard cap on the requested limit; exceeding it is an error.
    pub page_max_size: Option<usize>,
}

impl Default for ParseOptions {
    fn default() -> Self {
        Self {
            complex_param: "query".to_string(),
            order_by_param: "order_by".to_string(),
            offset_param: "offset".to_string(),
            limit_param: "limit".to_string(),
            only_complex: false,
            page_max_size: None,
        }
    }
}

// Longest suffixes first; each operator in its canonical `_$op` spelling
// and the URL-safe `_op` one.
const OP_SUFFIXES: [(&str, ComparisonOp); 14] = [
    ("_$like", ComparisonOp::Like),
    ("_like", ComparisonOp::Like),
    ("_$gte", ComparisonOp::Gte),
    ("_gte", ComparisonOp::Gte),
    ("_$lte", ComparisonOp::Lte),
    ("_lte", ComparisonOp::Lte),
    ("_$gt", ComparisonOp::Gt),
    ("_gt", ComparisonOp::Gt),
    ("_$lt", ComparisonOp::Lt),
    ("_lt", ComparisonOp::Lt),
    ("_$ne", ComparisonOp::Ne),
    ("_ne", ComparisonOp::Ne),
    ("_$eq", ComparisonOp::Eq),
    ("_eq", ComparisonOp::Eq),
];

/// Parse query parameters into a filter tree, ordered sort keys, and
/// pagination bounds. Parameter order is preserved: simple filters combine
/// under one top-level AND in order of appearance, with any complex query
/// trees appended alongside them.
pub fn parse_query(params: &[(String, String)], opts: &ParseOptions) -> Result<ParsedQuery, ParseError> {
    let mut nodes: Vec<FilterExpr> = Vec::new();
    let mut sorts: Vec<SortKey> = Vec::new();
    let mut page = Page::default();

    for (key, value) in params {
        if *key == opts.order_by_param {
            sorts.extend(parse_sorts(value)?);
        } else if *key == opts.offset_param {
            if !value.is_empty() {
                page.offset = Some(parse_bound(key, value)?);
            }
        } else if *key == opts.limit_param {
            if !value.is_empty() {
                page.limit = Some(parse_bound(key, value)?);
            }
        } else if *key == opts.complex_param {
            let json: Value = serde_json::from_str(value)
                .map_err(|e| ParseError::MalformedQuery(e.to_string()))?;
            nodes.push(filter_from_value(&json)?);
        } else if !opts.only_complex {
            let (path, op) = split_operator(key)?;
            nodes.push(FilterExpr::Cmp {
                path,
                op,
                value: Value::String(value.clone()),
            });
        }
    }

    if let (Some(limit), Some(max)) = (page.limit, opts.page_max_size) {
        if limit > max {
            return Err(ParseError::LimitTooLarge { limit, max });
        }
    }

    let filter = match nodes.len() {
        0 => None,
        1 => Some(nodes.into_iter().next().unwrap()),
        _ => Some(FilterExpr::And(nodes)),
    };
    debug!(
        "parsed query: filter={} sorts={} limit={:?} offset={:?}",
        filter.is_some(),
        sorts.len(),
        page.limit,
        page.offset
    );
    Ok(ParsedQuery { filter, sorts, page })
}

fn parse_bound(param: &str, value: &str) -> Result<usize, ParseError> {
    value.parse::<usize>().map_err(|_| ParseError::InvalidPagination {
        param: param.to_string(),
        value: value.to_string(),
    })
}

/// Split a filter key into its path and comparison operator by stripping a
/// trailing operator suffix; no suffix means equality.
fn split_operator(key: &str) -> Result<(Path, ComparisonOp), ParseError> {
    let (name, op) = OP_SUFFIXES
        .iter()
        .find_map(|(suffix, op)| key.strip_suffix(suffix).map(|n| (n, *op)))
        .unwrap_or((key, ComparisonOp::Eq));
    if name.is_empty() {
        return Err(ParseError::EmptySegment {
            key: key.to_string(),
        });
    }
    if op == ComparisonOp::Eq && key == name {
        // No suffix matched; a trailing `_$...` must then be a typo'd
        // operator rather than a field name.
        if let Some(pos) = key.rfind("_$") {
            return Err(ParseError::UnknownOperator {
                suffix: key[pos..].to_string(),
                key: key.to_string(),
            });
        }
    }
    let path = tokenize(name)?;
    if !path.is_plain() {
        return Err(ParseError::ReservedInFilter {
            key: key.to_string(),
        });
    }
    Ok((path, op))
}

/// Parse an `order_by` value: a dash-or-tilde-joined list of
/// `path~ASC|DESC` tokens. A bare `ASC`/`DESC` chunk binds to the path
/// chunk before it, so `name-ASC-album.title-DESC` and
/// `name~ASC-album.title~DESC` are equivalent. Left-to-right order is the
/// sort priority.
pub fn parse_sorts(value: &str) -> Result<Vec<SortKey>, ParseError> {
    let mut result = Vec::new();
    let chunks: Vec<&str> = value.split('-').collect();
    let mut i = 0;
    while i < chunks.len() {
        let chunk = chunks[i];
        if chunk.is_empty() {
            return Err(ParseError::MalformedSort {
                value: value.to_string(),
            });
        }
        let (name, direction) = if let Some((name, dir)) = chunk.rsplit_once('~') {
            (name, parse_direction(dir, value)?)
        } else if let Some(dir) = chunks.get(i + 1).and_then(|c| direction_of(c)) {
            i += 1;
            (chunk, dir)
        } else {
            (chunk, SortDirection::Asc)
        };
        let path = tokenize(name)?;
        if !path.is_plain() {
            return Err(ParseError::ReservedInFilter {
                key: name.to_string(),
            });
        }
        result.push(SortKey { path, direction });
        i += 1;
    }
    Ok(result)
}

fn direction_of(chunk: &str) -> Option<SortDirection> {
    if chunk.eq_ignore_ascii_case("asc") {
        Some(SortDirection::Asc)
    } else if chunk.eq_ignore_ascii_case("desc") {
        Some(SortDirection::Desc)
    } else {
        None
    }
}

fn parse_direction(dir: &str, value: &str) -> Result<SortDirection, ParseError> {
    direction_of(dir).ok_or_else(|| ParseError::MalformedSort {
        value: value.to_string(),
    })
}

/// Convert a complex query payload (MongoDB-style boolean tree) into a
/// filter expression. `$and`/`$or` take arrays; any other key is a dotted
/// path mapping to either a literal (equality) or a `{"$op": value}`
/// object. Multiple entries in one object combine under AND.
pub fn filter_from_value(value: &Value) -> Result<FilterExpr, ParseError> {
    let obj = value
        .as_object()
        .ok_or_else(|| ParseError::MalformedQuery("expected a json object".to_string()))?;
    let mut nodes = Vec::new();
    for (key, val) in obj {
        match key.as_str() {
            "$and" | "$or" => {
                let arr = val.as_array().ok_or_else(|| {
                    ParseError::MalformedQuery(format!("`{}` takes an array", key))
                })?;
                let children = arr
                    .iter()
                    .map(filter_from_value)
                    .collect::<Result<Vec<_>, _>>()?;
                nodes.push(if key == "$and" {
                    FilterExpr::And(children)
                } else {
                    FilterExpr::Or(children)
                });
            }
            k if k.starts_with('$') => {
                return Err(ParseError::MalformedQuery(format!(
                    "unknown connective `{}`",
                    k
                )));
            }
            k => {
                let path = tokenize(k)?;
                if !path.is_plain() {
                    return Err(ParseError::ReservedInFilter { key: k.to_string() });
                }
                match val {
                    Value::Object(ops) => {
                        for (op_key, op_val) in ops {
                            let op = ComparisonOp::from_keyword(op_key).ok_or_else(|| {
                                ParseError::MalformedQuery(format!(
                                    "unknown operator `{}` for `{}`",
                                    op_key, k
                                ))
                            })?;
                            nodes.push(FilterExpr::Cmp {
                                path: path.clone(),
                                op,
                                value: op_val.clone(),
                            });
                        }
                    }
                    literal => nodes.push(FilterExpr::Cmp {
                        path,
                        op: ComparisonOp::Eq,
                        value: literal.clone(),
                    }),
                }
            }
        }
    }
    Ok(match nodes.len() {
        1 => nodes.into_iter().next().unwrap(),
        _ => FilterExpr::And(nodes),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn params(pairs: &[(&str, &str)]) -> Vec<(String, String)> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn operator_suffix_round_trips() {
        let parsed = parse_query(&params(&[("milliseconds_lte", "500")]), &Default::default())
            .unwrap();
        match parsed.filter.unwrap() {
            FilterExpr::Cmp { path, op, value } => {
                assert_eq!(path.field_names(), vec!["milliseconds"]);
                assert_eq!(op, ComparisonOp::Lte);
                assert_eq!(value, Value::String("500".to_string()));
            }
            other => panic!("expected a comparison, got {:?}", other),
        }
    }

    #[test]
    fn canonical_and_url_safe_suffixes_agree() {
        let a = parse_query(&params(&[("milliseconds_$lte", "500")]), &Default::default())
            .unwrap();
        let b = parse_query(&params(&[("milliseconds_lte", "500")]), &Default::default())
            .unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn no_suffix_means_equality() {
        let parsed =
            parse_query(&params(&[("artist.name", "Aerosmith")]), &Default::default()).unwrap();
        match parsed.filter.unwrap() {
            FilterExpr::Cmp { path, op, .. } => {
                assert_eq!(path.field_names(), vec!["artist", "name"]);
                assert_eq!(op, ComparisonOp::Eq);
            }
            other => panic!("expected a comparison, got {:?}", other),
        }
    }

    #[test]
    fn unknown_canonical_operator_fails() {
        assert!(matches!(
            parse_query(&params(&[("name_$foo", "x")]), &Default::default()),
            Err(ParseError::UnknownOperator { .. })
        ));
    }

    #[test]
    fn repeated_keys_and_multiple_filters_combine_under_and() {
        let parsed = parse_query(
            &params(&[("year_gte", "1990"), ("year_lte", "1999"), ("title_like", "%a%")]),
            &Default::default(),
        )
        .unwrap();
        match parsed.filter.unwrap() {
            FilterExpr::And(children) => assert_eq!(children.len(), 3),
            other => panic!("expected AND, got {:?}", other),
        }
    }

    #[test]
    fn parsing_is_idempotent() {
        let p = params(&[("year_gte", "1990"), ("order_by", "title~ASC"), ("limit", "5")]);
        assert_eq!(
            parse_query(&p, &Default::default()).unwrap(),
            parse_query(&p, &Default::default()).unwrap()
        );
    }

    #[test]
    fn sort_priority_is_order_of_appearance() {
        let sorts = parse_sorts("name-ASC-album.title-DESC").unwrap();
        assert_eq!(sorts.len(), 2);
        assert_eq!(sorts[0].path.field_names(), vec!["name"]);
        assert_eq!(sorts[0].direction, SortDirection::Asc);
        assert_eq!(sorts[1].path.field_names(), vec!["album", "title"]);
        assert_eq!(sorts[1].direction, SortDirection::Desc);
    }

    #[test]
    fn tilde_and_dash_sort_forms_are_equivalent() {
        assert_eq!(
            parse_sorts("name~ASC-album.title~DESC").unwrap(),
            parse_sorts("name-ASC-album.title-DESC").unwrap()
        );
    }

    #[test]
    fn bare_sort_path_defaults_to_asc() {
        let sorts = parse_sorts("name").unwrap();
        assert_eq!(sorts[0].direction, SortDirection::Asc);
    }

    #[test]
    fn pagination_defaults_to_unbounded() {
        let parsed = parse_query(&params(&[("name", "Nick")]), &Default::default()).unwrap();
        assert_eq!(parsed.page, Page { limit: None, offset: None });
    }

    #[test]
    fn negative_or_textual_bounds_fail() {
        assert!(matches!(
            parse_query(&params(&[("limit", "-1")]), &Default::default()),
            Err(ParseError::InvalidPagination { .. })
        ));
        assert!(matches!(
            parse_query(&params(&[("offset", "abc")]), &Default::default()),
            Err(ParseError::InvalidPagination { .. })
        ));
    }

    #[test]
    fn limit_above_page_max_size_fails() {
        let opts = ParseOptions {
            page_max_size: Some(100),
            ..Default::default()
        };
        assert!(matches!(
            parse_query(&params(&[("limit", "500")]), &opts),
            Err(ParseError::LimitTooLarge { limit: 500, max: 100 })
        ));
    }

    #[test]
    fn complex_query_tree() {
        let parsed = parse_query(
            &params(&[(
                "query",
                r#"{"$or": [{"genre": "Rock"}, {"milliseconds": {"$gt": 300000}}]}"#,
            )]),
            &Default::default(),
        )
        .unwrap();
        match parsed.filter.unwrap() {
            FilterExpr::Or(children) => {
                assert_eq!(children.len(), 2);
                assert!(matches!(
                    &children[0],
                    FilterExpr::Cmp { op: ComparisonOp::Eq, .. }
                ));
                assert!(matches!(
                    &children[1],
                    FilterExpr::Cmp { op: ComparisonOp::Gt, .. }
                ));
            }
            other => panic!("expected OR, got {:?}", other),
        }
    }

    #[test]
    fn complex_query_combines_with_simple_filters() {
        let parsed = parse_query(
            &params(&[("genre", "Rock"), ("query", r#"{"milliseconds": {"$lt": 100}}"#)]),
            &Default::default(),
        )
        .unwrap();
        match parsed.filter.unwrap() {
            FilterExpr::And(children) => assert_eq!(children.len(), 2),
            other => panic!("expected AND, got {:?}", other),
        }
    }

    #[test]
    fn only_complex_skips_simple_filters() {
        let opts = ParseOptions {
            only_complex: true,
            ..Default::default()
        };
        let parsed = parse_query(
            &params(&[("genre", "Rock"), ("query", r#"{"title": "x"}"#)]),
            &opts,
        )
        .unwrap();
        match parsed.filter.unwrap() {
            FilterExpr::Cmp { path, .. } => assert_eq!(path.field_names(), vec!["title"]),
            other => panic!("expected single comparison, got {:?}", other),
        }
    }

    #[test]
    fn malformed_complex_payload_fails() {
        assert!(matches!(
            parse_query(&params(&[("query", "[1,2]")]), &Default::default()),
            Err(ParseError::MalformedQuery(_))
        ));
        assert!(matches!(
            parse_query(&params(&[("query", "{\"$nor\": []}")]), &Default::default()),
            Err(ParseError::MalformedQuery(_))
        ));
    }

    #[test]
    fn reserved_token_in_filter_path_fails() {
        assert!(matches!(
            parse_query(&params(&[("tracks.$new0.title", "x")]), &Default::default()),
            Err(ParseError::ReservedInFilter { .. })
        ));
    }
}

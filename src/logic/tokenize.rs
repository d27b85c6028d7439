use crate::model::{Path, PathSegment, RefSpec};
use thiserror::Error;

/// Structural failures that abort a whole request. Recoverable,
/// business-rule failures go through the error tree instead.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ParseError {
    #[error("empty path segment in `{key}`")]
    EmptySegment { key: String },
    #[error("unknown token `{token}` in `{key}`")]
    UnknownToken { token: String, key: String },
    #[error("`$id` reference in `{key}` has no key/value pairs")]
    EmptyReference { key: String },
    #[error("malformed `$id` reference `{segment}` in `{key}`")]
    MalformedReference { segment: String, key: String },
    #[error("token `{token}` is not allowed at that position in `{key}`")]
    ReservedPosition { token: String, key: String },
    #[error("unknown filter operator suffix `{suffix}` in `{key}`")]
    UnknownOperator { suffix: String, key: String },
    #[error("reserved token in filter path `{key}`")]
    ReservedInFilter { key: String },
    #[error("malformed complex query: {0}")]
    MalformedQuery(String),
    #[error("`{param}` must be a non-negative integer, got `{value}`")]
    InvalidPagination { param: String, value: String },
    #[error("limit {limit} is greater than the max page size {max}")]
    LimitTooLarge { limit: usize, max: usize },
    #[error("malformed sort value `{value}`")]
    MalformedSort { value: String },
    #[error("`$create` is a whitelist-only token, not valid in `{key}`")]
    CreateInMutation { key: String },
    #[error("conflicting relationship operations at `{path}`")]
    ConflictingOps { path: String },
    #[error("new entity at `{path}` has no `$add` or `$set` directive")]
    UnattachedNew { path: String },
    #[error("`$remove` can not target the new entity at `{path}`")]
    RemoveOnNew { path: String },
    #[error("whitelist rule `{rule}` is invalid: {reason}")]
    InvalidRule { rule: String, reason: String },
    #[error("`{path}` does not address a relationship")]
    NotARelationship { path: String },
    #[error("`$set` is not valid on the to-many relationship `{path}`")]
    SetOnToMany { path: String },
}

/// Split a raw parameter key into path segments, recognizing both the
/// canonical `$` tokens and their URL-safe aliases. Enforces the grammar:
/// a path opens with a field name, `$id`/`$new` directly follow a
/// relationship name, and `$add`/`$remove`/`$set`/`$create` close the path.
pub fn tokenize(raw: &str) -> Result<Path, ParseError> {
    let mut segments: Vec<PathSegment> = Vec::new();
    for part in raw.split('.') {
        if part.is_empty() {
            return Err(ParseError::EmptySegment {
                key: raw.to_string(),
            });
        }
        let segment = classify(part, raw)?;
        match segments.last() {
            None => {
                if !matches!(segment, PathSegment::Field(_)) {
                    return Err(ParseError::ReservedPosition {
                        token: part.to_string(),
                        key: raw.to_string(),
                    });
                }
            }
            Some(prev) => {
                // Nothing may follow a closing directive, and references or
                // $new placeholders only make sense right after a name.
                let follows_field = matches!(prev, PathSegment::Field(_));
                let valid = match segment {
                    PathSegment::Ref(_) | PathSegment::New(_) => follows_field,
                    _ => !prev.is_directive(),
                };
                if !valid {
                    return Err(ParseError::ReservedPosition {
                        token: part.to_string(),
                        key: raw.to_string(),
                    });
                }
            }
        }
        segments.push(segment);
    }
    Ok(Path(segments))
}

fn classify(part: &str, raw: &str) -> Result<PathSegment, ParseError> {
    match part {
        "$add" | "_add_" => return Ok(PathSegment::Add),
        "$remove" | "_remove_" => return Ok(PathSegment::Remove),
        "$set" | "_set_" => return Ok(PathSegment::Set),
        "$create" | "_create_" => return Ok(PathSegment::Create),
        _ => {}
    }
    if part == "$id" || part == "id-" {
        return Err(ParseError::EmptyReference {
            key: raw.to_string(),
        });
    }
    if let Some(body) = part.strip_prefix("$id:") {
        return parse_ref(body.split(':').collect(), part, raw);
    }
    if let Some(body) = part.strip_prefix("id-") {
        return parse_url_safe_ref(body, part, raw);
    }
    if let Some(label) = part.strip_prefix("$new") {
        return Ok(PathSegment::New(label.to_string()));
    }
    if let Some(label) = part.strip_prefix("_new_") {
        return Ok(PathSegment::New(label.to_string()));
    }
    if part.starts_with('$') || part.starts_with('~') {
        return Err(ParseError::UnknownToken {
            token: part.to_string(),
            key: raw.to_string(),
        });
    }
    Ok(PathSegment::Field(part.to_string()))
}

fn parse_ref(pairs: Vec<&str>, segment: &str, raw: &str) -> Result<PathSegment, ParseError> {
    let mut keys = Vec::new();
    for pair in pairs {
        let (col, val) = pair.split_once('=').ok_or(ParseError::MalformedReference {
            segment: segment.to_string(),
            key: raw.to_string(),
        })?;
        if col.is_empty() {
            return Err(ParseError::MalformedReference {
                segment: segment.to_string(),
                key: raw.to_string(),
            });
        }
        keys.push((col.to_string(), val.to_string()));
    }
    if keys.is_empty() {
        return Err(ParseError::EmptyReference {
            key: raw.to_string(),
        });
    }
    Ok(PathSegment::Ref(RefSpec { keys }))
}

/// `id-<col>-<val>[-<col>-<val>...]`, the alias form joined by dashes.
fn parse_url_safe_ref(body: &str, segment: &str, raw: &str) -> Result<PathSegment, ParseError> {
    let parts: Vec<&str> = body.split('-').collect();
    if parts.is_empty() || parts.len() % 2 != 0 || parts.iter().any(|p| p.is_empty()) {
        return Err(ParseError::MalformedReference {
            segment: segment.to_string(),
            key: raw.to_string(),
        });
    }
    let keys = parts
        .chunks(2)
        .map(|pair| (pair[0].to_string(), pair[1].to_string()))
        .collect();
    Ok(PathSegment::Ref(RefSpec { keys }))
}

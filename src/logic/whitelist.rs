use crate::logic::tokenize::{tokenize, ParseError};
use crate::model::PathSegment;

/// Operation being checked against the whitelist.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AccessOp {
    /// Filter or sort through a path.
    Read,
    /// Set a scalar attribute.
    Write,
    Add,
    Remove,
    Set,
    Create,
}

const ALL_OPS: [AccessOp; 6] = [
    AccessOp::Read,
    AccessOp::Write,
    AccessOp::Add,
    AccessOp::Remove,
    AccessOp::Set,
    AccessOp::Create,
];

#[derive(Debug, Clone, PartialEq)]
enum RuleSeg {
    Name(String),
    /// Matches any `$new<label>` path segment.
    AnyNew,
}

#[derive(Debug, Clone, PartialEq)]
struct CompiledRule {
    segments: Vec<RuleSeg>,
    ops: Vec<AccessOp>,
}

/// Compiled allow-list of (path, operation) pairs. Built once per resource
/// type and shared read-only across requests; no matching rule means denied.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct WhitelistSet {
    rules: Vec<CompiledRule>,
}

impl WhitelistSet {
    /// Compile rule strings. A bare path grants every operation at exactly
    /// that path; a trailing directive narrows the grant, with `$create`
    /// implying `$add` and `$set` implying `$add` + `$remove`.
    pub fn compile<I, S>(rules: I) -> Result<Self, ParseError>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut compiled = Vec::new();
        for rule in rules {
            let rule = rule.as_ref();
            let path = tokenize(rule)?;
            let mut segments = Vec::new();
            let mut ops: Vec<AccessOp> = ALL_OPS.to_vec();
            let last = path.len() - 1;
            for (i, seg) in path.segments().iter().enumerate() {
                match seg {
                    PathSegment::Field(name) => segments.push(RuleSeg::Name(name.clone())),
                    PathSegment::New(_) => segments.push(RuleSeg::AnyNew),
                    PathSegment::Ref(_) => {
                        return Err(ParseError::InvalidRule {
                            rule: rule.to_string(),
                            reason: "rules can not contain `$id` references".to_string(),
                        })
                    }
                    PathSegment::Add if i == last => ops = vec![AccessOp::Add],
                    PathSegment::Remove if i == last => ops = vec![AccessOp::Remove],
                    PathSegment::Set if i == last => {
                        ops = vec![AccessOp::Set, AccessOp::Add, AccessOp::Remove]
                    }
                    PathSegment::Create if i == last => {
                        ops = vec![AccessOp::Create, AccessOp::Add]
                    }
                    _ => {
                        return Err(ParseError::InvalidRule {
                            rule: rule.to_string(),
                            reason: "directive tokens may only close a rule".to_string(),
                        })
                    }
                }
            }
            if segments.is_empty() {
                return Err(ParseError::InvalidRule {
                    rule: rule.to_string(),
                    reason: "a rule needs at least one field name".to_string(),
                });
            }
            compiled.push(CompiledRule { segments, ops });
        }
        Ok(Self { rules: compiled })
    }

    /// Is `op` permitted at the exact depth of `path`? `$id` segments are
    /// elided before matching, `$new` segments match the wildcard, so the
    /// fields of a newly created sub-entity and of a pre-existing one carry
    /// independent permissions.
    pub fn is_allowed(&self, path: &[PathSegment], op: AccessOp) -> bool {
        let effective: Vec<&PathSegment> = path
            .iter()
            .filter(|s| !matches!(s, PathSegment::Ref(_)))
            .collect();
        self.rules.iter().any(|rule| {
            rule.segments.len() == effective.len()
                && rule.ops.contains(&op)
                && rule
                    .segments
                    .iter()
                    .zip(&effective)
                    .all(|(rs, ps)| match (rs, ps) {
                        (RuleSeg::Name(name), PathSegment::Field(f)) => name == f,
                        (RuleSeg::AnyNew, PathSegment::New(_)) => true,
                        _ => false,
                    })
        })
    }
}

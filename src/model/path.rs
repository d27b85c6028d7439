use serde::{Deserialize, Serialize};
use std::fmt;

/// Primary-key reference to an existing entity, the parsed form of a
/// `$id:<col>=<val>[:<col>=<val>...]` path segment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RefSpec {
    pub keys: Vec<(String, String)>,
}

impl fmt::Display for RefSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "$id")?;
        for (col, val) in &self.keys {
            write!(f, ":{}={}", col, val)?;
        }
        Ok(())
    }
}

/// One dotted component of a parameter key.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum PathSegment {
    /// Plain field or relationship name.
    Field(String),
    /// `$id:...` reference to an existing entity.
    Ref(RefSpec),
    /// `$new<label>` placeholder for a to-be-created entity. Distinct
    /// labels address distinct new entities within one request.
    New(String),
    Add,
    Remove,
    Set,
    Create,
}

impl PathSegment {
    pub fn is_directive(&self) -> bool {
        matches!(
            self,
            PathSegment::Add | PathSegment::Remove | PathSegment::Set | PathSegment::Create
        )
    }

    pub fn field_name(&self) -> Option<&str> {
        match self {
            PathSegment::Field(name) => Some(name),
            _ => None,
        }
    }
}

impl fmt::Display for PathSegment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PathSegment::Field(name) => write!(f, "{}", name),
            PathSegment::Ref(spec) => write!(f, "{}", spec),
            PathSegment::New(label) => write!(f, "$new{}", label),
            PathSegment::Add => write!(f, "$add"),
            PathSegment::Remove => write!(f, "$remove"),
            PathSegment::Set => write!(f, "$set"),
            PathSegment::Create => write!(f, "$create"),
        }
    }
}

/// An ordered sequence of path segments, produced by the tokenizer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Path(pub Vec<PathSegment>);

impl Path {
    pub fn segments(&self) -> &[PathSegment] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// True when the path is made of plain field names only, which is
    /// what filter and sort paths must be.
    pub fn is_plain(&self) -> bool {
        self.0.iter().all(|s| matches!(s, PathSegment::Field(_)))
    }

    /// Field names of a plain path.
    pub fn field_names(&self) -> Vec<&str> {
        self.0.iter().filter_map(|s| s.field_name()).collect()
    }
}

impl fmt::Display for Path {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, seg) in self.0.iter().enumerate() {
            if i > 0 {
                write!(f, ".")?;
            }
            write!(f, "{}", seg)?;
        }
        Ok(())
    }
}

/// Canonical rendering of a segment sequence, used as error-tree keys.
pub fn render_path(segments: &[PathSegment]) -> String {
    segments
        .iter()
        .map(|s| s.to_string())
        .collect::<Vec<_>>()
        .join(".")
}

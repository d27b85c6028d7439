use serde::{Deserialize, Serialize};
use uuid::Uuid;

pub type Id = String;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub enum DataType {
    String,
    Integer,
    Float,
    Boolean,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ComparisonOp {
    Eq,
    Ne,
    Gt,
    Gte,
    Lt,
    Lte,
    Like,
}

impl ComparisonOp {
    /// Keyword form used in complex query payloads, e.g. `$gte`.
    pub fn keyword(&self) -> &'static str {
        match self {
            ComparisonOp::Eq => "$eq",
            ComparisonOp::Ne => "$ne",
            ComparisonOp::Gt => "$gt",
            ComparisonOp::Gte => "$gte",
            ComparisonOp::Lt => "$lt",
            ComparisonOp::Lte => "$lte",
            ComparisonOp::Like => "$like",
        }
    }

    pub fn from_keyword(keyword: &str) -> Option<Self> {
        match keyword {
            "$eq" => Some(ComparisonOp::Eq),
            "$ne" => Some(ComparisonOp::Ne),
            "$gt" => Some(ComparisonOp::Gt),
            "$gte" => Some(ComparisonOp::Gte),
            "$lt" => Some(ComparisonOp::Lt),
            "$lte" => Some(ComparisonOp::Lte),
            "$like" => Some(ComparisonOp::Like),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SortDirection {
    Asc,
    Desc,
}

pub fn generate_id() -> Id {
    Uuid::new_v4().to_string()
}

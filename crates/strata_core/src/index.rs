use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::{Ident, ObjectId, StoreError, StoreResult};

/// Which id column of an index table an operation addresses.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IdColumn {
    Origin,
    Target,
}

impl IdColumn {
    pub fn column_name(self) -> &'static str {
        match self {
            IdColumn::Origin => "origin_id",
            IdColumn::Target => "target_id",
        }
    }
}

/// A target located by an exact or condition index, with the number of
/// matching rows as relevance.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub struct IndexHit {
    pub target_id: ObjectId,
    pub relevance: i64,
}

/// A target located by a full-text index, scored by the backend's ranking.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct RankedHit {
    pub target_id: ObjectId,
    pub relevance: f64,
}

#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub struct IndexEntry {
    pub id: ObjectId,
    pub search_term: String,
}

#[derive(Clone, Copy, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub struct ConditionMatch {
    pub origin_id: ObjectId,
    pub target_id: ObjectId,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "lowercase")]
pub enum IndexValue {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Text(String),
}

impl IndexValue {
    pub fn is_null(&self) -> bool {
        matches!(self, IndexValue::Null)
    }

    /// Textual rendering used when a pattern has to be built from the value.
    pub fn to_text(&self) -> Option<String> {
        match self {
            IndexValue::Null => None,
            IndexValue::Bool(value) => Some(value.to_string()),
            IndexValue::Int(value) => Some(value.to_string()),
            IndexValue::Float(value) => Some(value.to_string()),
            IndexValue::Text(value) => Some(value.clone()),
        }
    }
}

impl From<bool> for IndexValue {
    fn from(value: bool) -> Self {
        IndexValue::Bool(value)
    }
}

impl From<i32> for IndexValue {
    fn from(value: i32) -> Self {
        IndexValue::Int(i64::from(value))
    }
}

impl From<i64> for IndexValue {
    fn from(value: i64) -> Self {
        IndexValue::Int(value)
    }
}

impl From<f64> for IndexValue {
    fn from(value: f64) -> Self {
        IndexValue::Float(value)
    }
}

impl From<&str> for IndexValue {
    fn from(value: &str) -> Self {
        IndexValue::Text(value.to_string())
    }
}

impl From<String> for IndexValue {
    fn from(value: String) -> Self {
        IndexValue::Text(value)
    }
}

impl<T: Into<IndexValue>> From<Option<T>> for IndexValue {
    fn from(value: Option<T>) -> Self {
        value.map(Into::into).unwrap_or(IndexValue::Null)
    }
}

#[derive(Clone, Copy, Debug, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CompareOp {
    Eq,
    Ne,
    Lt,
    Lte,
    Gt,
    Gte,
    Like,
    ILike,
}

impl CompareOp {
    /// Pattern operators match on a prefix: the value gets a trailing `%`.
    pub fn is_pattern(self) -> bool {
        matches!(self, CompareOp::Like | CompareOp::ILike)
    }
}

impl FromStr for CompareOp {
    type Err = StoreError;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "=" | "==" => Ok(CompareOp::Eq),
            "!=" | "<>" => Ok(CompareOp::Ne),
            "<" => Ok(CompareOp::Lt),
            "<=" => Ok(CompareOp::Lte),
            ">" => Ok(CompareOp::Gt),
            ">=" => Ok(CompareOp::Gte),
            "like" => Ok(CompareOp::Like),
            "ilike" => Ok(CompareOp::ILike),
            other => Err(StoreError::invalid(format!("unsupported operator '{other}'"))),
        }
    }
}

impl fmt::Display for CompareOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let symbol = match self {
            CompareOp::Eq => "=",
            CompareOp::Ne => "<>",
            CompareOp::Lt => "<",
            CompareOp::Lte => "<=",
            CompareOp::Gt => ">",
            CompareOp::Gte => ">=",
            CompareOp::Like => "like",
            CompareOp::ILike => "ilike",
        };
        f.write_str(symbol)
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum Predicate {
    /// Equality, or `IS NULL` for a null value.
    Value(IndexValue),
    Compare { op: CompareOp, value: IndexValue },
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Condition {
    pub column: String,
    pub predicate: Predicate,
}

impl Condition {
    pub fn eq(column: impl Into<String>, value: impl Into<IndexValue>) -> Self {
        Self {
            column: column.into(),
            predicate: Predicate::Value(value.into()),
        }
    }

    pub fn is_null(column: impl Into<String>) -> Self {
        Self::eq(column, IndexValue::Null)
    }

    pub fn compare(column: impl Into<String>, op: CompareOp, value: impl Into<IndexValue>) -> Self {
        Self {
            column: column.into(),
            predicate: Predicate::Compare {
                op,
                value: value.into(),
            },
        }
    }
}

#[derive(Clone, Copy, Debug, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ColumnType {
    Integer,
    BigInt,
    Real,
    Text,
    Varchar(Option<u32>),
    Boolean,
}

impl FromStr for ColumnType {
    type Err = StoreError;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        let lowered = raw.trim().to_ascii_lowercase();
        if let Some(len) = lowered
            .strip_prefix("varchar(")
            .and_then(|rest| rest.strip_suffix(')'))
        {
            let len = len
                .trim()
                .parse::<u32>()
                .map_err(|_| StoreError::invalid(format!("invalid varchar length in '{raw}'")))?;
            return Ok(ColumnType::Varchar(Some(len)));
        }
        match lowered.as_str() {
            "integer" | "int" => Ok(ColumnType::Integer),
            "bigint" => Ok(ColumnType::BigInt),
            "real" | "float" | "double" => Ok(ColumnType::Real),
            "text" | "string" => Ok(ColumnType::Text),
            "varchar" => Ok(ColumnType::Varchar(None)),
            "boolean" | "bool" => Ok(ColumnType::Boolean),
            _ => Err(StoreError::invalid(format!("unsupported column type '{raw}'"))),
        }
    }
}

/// One caller-defined column of a condition index.
#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub struct IndexColumn {
    pub name: Ident,
    pub column_type: ColumnType,
}

impl IndexColumn {
    pub fn new(name: &str, column_type: &str) -> StoreResult<Self> {
        let name = Ident::new(name)?;
        if matches!(name.as_str(), "origin_id" | "target_id") {
            return Err(StoreError::invalid(format!(
                "column '{name}' is reserved for condition indexes"
            )));
        }
        Ok(Self {
            name,
            column_type: column_type.parse()?,
        })
    }
}

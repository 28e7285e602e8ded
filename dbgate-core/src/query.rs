//! Structured query descriptions and their validated form.
//!
//! [`QueryDescription`] is the untrusted input exactly as the caller sent it;
//! every field except the table name is kept as raw JSON so the guard can
//! tell a malformed shape apart from an unknown name. [`ValidatedQuery`] is
//! what the guard hands to the executor: every identifier has been checked
//! against live schema and every value is a typed bind parameter.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Default page size when the caller gives no limit.
pub const DEFAULT_LIMIT: u32 = 20;
/// Hard upper bound on the page size; larger requests are clamped.
pub const MAX_LIMIT: u32 = 100;

/// Untrusted query description for `select_query`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct QueryDescription {
    pub table: String,
    /// Column list; absent or `["*"]` selects every column
    #[serde(default)]
    pub select: Option<Value>,
    /// Predicates: `[column, value]` or `[column, operator, value]`
    #[serde(default, rename = "where")]
    pub filters: Option<Value>,
    /// Ordering: `[column]`, `[column, direction]` or `"column"`
    #[serde(default)]
    pub order_by: Option<Value>,
    #[serde(default)]
    pub limit: Option<Value>,
    #[serde(default)]
    pub offset: Option<Value>,
}

impl QueryDescription {
    pub fn new(table: impl Into<String>) -> Self {
        Self {
            table: table.into(),
            ..Default::default()
        }
    }

    pub fn with_select(mut self, select: Value) -> Self {
        self.select = Some(select);
        self
    }

    pub fn with_filters(mut self, filters: Value) -> Self {
        self.filters = Some(filters);
        self
    }

    pub fn with_order_by(mut self, order_by: Value) -> Self {
        self.order_by = Some(order_by);
        self
    }

    pub fn with_limit(mut self, limit: Value) -> Self {
        self.limit = Some(limit);
        self
    }

    pub fn with_offset(mut self, offset: Value) -> Self {
        self.offset = Some(offset);
        self
    }
}

/// Whitelisted comparison operators.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operator {
    Eq,
    NotEq,
    LtGt,
    Gt,
    Lt,
    Gte,
    Lte,
    Like,
    In,
    NotIn,
    IsNull,
    IsNotNull,
}

impl Operator {
    /// Every accepted operator spelling, echoed back on rejection.
    pub const ALLOWED: [&'static str; 12] = [
        "=",
        "!=",
        "<>",
        ">",
        "<",
        ">=",
        "<=",
        "like",
        "in",
        "not in",
        "is null",
        "is not null",
    ];

    /// Parses an operator case-insensitively; inner whitespace runs are
    /// collapsed so `"NOT  IN"` is accepted.
    pub fn parse(raw: &str) -> Option<Self> {
        let normalized = raw
            .split_whitespace()
            .collect::<Vec<_>>()
            .join(" ")
            .to_ascii_lowercase();
        let op = match normalized.as_str() {
            "=" => Self::Eq,
            "!=" => Self::NotEq,
            "<>" => Self::LtGt,
            ">" => Self::Gt,
            "<" => Self::Lt,
            ">=" => Self::Gte,
            "<=" => Self::Lte,
            "like" => Self::Like,
            "in" => Self::In,
            "not in" => Self::NotIn,
            "is null" => Self::IsNull,
            "is not null" => Self::IsNotNull,
            _ => return None,
        };
        Some(op)
    }

    /// SQL spelling of the operator.
    pub fn as_sql(self) -> &'static str {
        match self {
            Self::Eq => "=",
            Self::NotEq => "!=",
            Self::LtGt => "<>",
            Self::Gt => ">",
            Self::Lt => "<",
            Self::Gte => ">=",
            Self::Lte => "<=",
            Self::Like => "LIKE",
            Self::In => "IN",
            Self::NotIn => "NOT IN",
            Self::IsNull => "IS NULL",
            Self::IsNotNull => "IS NOT NULL",
        }
    }

    /// True for `in` / `not in`, which take an array value.
    pub fn takes_list(self) -> bool {
        matches!(self, Self::In | Self::NotIn)
    }

    /// True for `is null` / `is not null`, which ignore their value.
    pub fn takes_no_value(self) -> bool {
        matches!(self, Self::IsNull | Self::IsNotNull)
    }

    /// True for operators that may compare against a JSON null.
    pub fn accepts_null(self) -> bool {
        matches!(self, Self::Eq | Self::NotEq | Self::LtGt)
    }
}

impl std::fmt::Display for Operator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_sql())
    }
}

/// A typed bind parameter.
#[derive(Debug, Clone, PartialEq)]
pub enum BindValue {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Text(String),
}

impl BindValue {
    /// Converts a scalar JSON value; arrays and objects yield `None`.
    pub fn from_json(value: &Value) -> Option<Self> {
        match value {
            Value::Null => Some(Self::Null),
            Value::Bool(b) => Some(Self::Bool(*b)),
            Value::Number(n) => n
                .as_i64()
                .map(Self::Int)
                .or_else(|| n.as_f64().map(Self::Float)),
            Value::String(s) => Some(Self::Text(s.clone())),
            Value::Array(_) | Value::Object(_) => None,
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }
}

/// Right-hand side of a validated predicate.
#[derive(Debug, Clone, PartialEq)]
pub enum PredicateValue {
    /// `is null` / `is not null`
    None,
    Scalar(BindValue),
    /// `in` / `not in`; may be empty
    List(Vec<BindValue>),
}

/// One validated filter predicate.
#[derive(Debug, Clone, PartialEq)]
pub struct Predicate {
    pub column: String,
    /// Declared type from introspection; may be empty
    pub column_type: String,
    pub operator: Operator,
    pub value: PredicateValue,
}

/// Sort direction; anything other than `desc` sorts ascending.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SortDirection {
    #[default]
    Ascending,
    Descending,
}

impl SortDirection {
    pub fn parse(raw: &str) -> Self {
        if raw.trim().eq_ignore_ascii_case("desc") {
            Self::Descending
        } else {
            Self::Ascending
        }
    }

    pub fn as_sql(self) -> &'static str {
        match self {
            Self::Ascending => "ASC",
            Self::Descending => "DESC",
        }
    }
}

/// One validated ordering clause.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OrderClause {
    pub column: String,
    pub direction: SortDirection,
}

/// A query that passed every guard check.
///
/// Only the guard constructs this; the executor trusts every identifier in
/// it to exist in the table.
#[derive(Debug, Clone, PartialEq)]
pub struct ValidatedQuery {
    pub table: String,
    /// Explicit column list; a wildcard is expanded from live schema
    pub columns: Vec<String>,
    pub predicates: Vec<Predicate>,
    pub order_by: Vec<OrderClause>,
    /// Always within `1..=MAX_LIMIT`
    pub limit: u32,
    pub offset: u64,
    /// Set when the requested limit exceeded `MAX_LIMIT`
    pub limit_clamped: bool,
}

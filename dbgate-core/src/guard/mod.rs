//! Validation of untrusted query descriptions against live schema.
//!
//! The guard is the only producer of [`ValidatedQuery`]. Checks run in a
//! fixed order and stop at the first failure:
//!
//! 1. Table presence (against `list_tables`)
//! 2. Select columns
//! 3. Predicate shape, for every predicate, including value arity
//! 4. Predicate columns, then operators
//! 5. Order-by entries
//! 6. Limit (absent means 20, above 100 is clamped to 100)
//! 7. Offset
//!
//! Expected caller mistakes come back as a [`Rejection`]; only failures
//! to read the schema itself surface as [`crate::GateError`].

use crate::Result;
use crate::adapters::SchemaIntrospector;
use crate::models::SchemaSnapshot;
use crate::query::{
    BindValue, DEFAULT_LIMIT, MAX_LIMIT, Operator, OrderClause, Predicate, PredicateValue,
    QueryDescription, SortDirection, ValidatedQuery,
};
use serde_json::Value;
use thiserror::Error;

#[cfg(test)]
mod tests;

/// Typed reason a query description was refused.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum Rejection {
    #[error("Table '{table}' does not exist")]
    TableNotFound {
        table: String,
        available_tables: Vec<String>,
    },

    #[error("Column '{column}' does not exist in table '{table}'")]
    ColumnNotFound {
        table: String,
        column: String,
        available_columns: Vec<String>,
    },

    #[error("Operator '{operator}' is not allowed on column '{column}'")]
    InvalidOperator { column: String, operator: String },

    #[error("Limit must be a positive integer, got {value}")]
    InvalidLimit { value: String },

    #[error("{}", describe_position("Condition", .index, .reason))]
    MalformedCondition { index: Option<usize>, reason: String },

    #[error("{}", describe_position("Order entry", .index, .reason))]
    MalformedOrder { index: Option<usize>, reason: String },

    #[error("Offset must be a non-negative integer, got {value}")]
    InvalidOffset { value: String },

    #[error("Invalid select list: {reason}")]
    InvalidSelect { reason: String },
}

fn describe_position(what: &str, index: &Option<usize>, reason: &str) -> String {
    match index {
        Some(i) => format!("{} #{} is malformed: {}", what, i, reason),
        None => format!("{} is malformed: {}", what, reason),
    }
}

impl Rejection {
    /// Stable machine-readable kind.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::TableNotFound { .. } => "table_not_found",
            Self::ColumnNotFound { .. } => "column_not_found",
            Self::InvalidOperator { .. } => "invalid_operator",
            Self::InvalidLimit { .. } => "invalid_limit",
            Self::MalformedCondition { .. } => "malformed_condition",
            Self::MalformedOrder { .. } => "malformed_order",
            Self::InvalidOffset { .. } => "invalid_offset",
            Self::InvalidSelect { .. } => "invalid_select",
        }
    }
}

/// Outcome of validating one description.
pub type Validation = std::result::Result<ValidatedQuery, Rejection>;

/// Validates `description` against the live schema behind `introspector`.
///
/// The table listing and the table description are read fresh on every
/// call.
///
/// # Errors
/// Returns error only if the schema cannot be read; caller mistakes are
/// reported through the inner [`Rejection`].
pub async fn validate<I>(description: &QueryDescription, introspector: &I) -> Result<Validation>
where
    I: SchemaIntrospector + ?Sized,
{
    if let Err(rejection) = ensure_table_exists(&description.table, introspector).await? {
        return Ok(Err(rejection));
    }

    let snapshot = introspector.describe_table(&description.table).await?;
    Ok(check(description, &snapshot))
}

/// Confirms `table` appears in the live table listing.
///
/// # Errors
/// Returns error if the table listing cannot be read
pub async fn ensure_table_exists<I>(
    table: &str,
    introspector: &I,
) -> Result<std::result::Result<(), Rejection>>
where
    I: SchemaIntrospector + ?Sized,
{
    if table.is_empty() {
        return Ok(Err(Rejection::TableNotFound {
            table: String::new(),
            available_tables: table_names(introspector).await?,
        }));
    }

    let tables = table_names(introspector).await?;
    if tables.iter().any(|t| t == table) {
        Ok(Ok(()))
    } else {
        Ok(Err(Rejection::TableNotFound {
            table: table.to_string(),
            available_tables: tables,
        }))
    }
}

async fn table_names<I>(introspector: &I) -> Result<Vec<String>>
where
    I: SchemaIntrospector + ?Sized,
{
    Ok(introspector
        .list_tables()
        .await?
        .into_iter()
        .map(|t| t.name)
        .collect())
}

/// Checks a description against an already-read snapshot.
///
/// Runs every check after table presence.
pub fn check(description: &QueryDescription, snapshot: &SchemaSnapshot) -> Validation {
    let columns = parse_select(description.select.as_ref(), snapshot)?;
    let predicates = parse_predicates(description.filters.as_ref(), snapshot)?;
    let order_by = parse_order_by(description.order_by.as_ref(), snapshot)?;
    let (limit, limit_clamped) = parse_limit(description.limit.as_ref())?;
    let offset = parse_offset(description.offset.as_ref())?;

    if limit_clamped {
        tracing::warn!(
            "Requested limit on table '{}' exceeds {}, clamping",
            snapshot.table,
            MAX_LIMIT
        );
    }

    Ok(ValidatedQuery {
        table: snapshot.table.clone(),
        columns,
        predicates,
        order_by,
        limit,
        offset,
        limit_clamped,
    })
}

fn column_not_found(snapshot: &SchemaSnapshot, column: &str) -> Rejection {
    Rejection::ColumnNotFound {
        table: snapshot.table.clone(),
        column: column.to_string(),
        available_columns: snapshot.column_names(),
    }
}

fn require_column(snapshot: &SchemaSnapshot, column: &str) -> std::result::Result<(), Rejection> {
    if snapshot.has_column(column) {
        Ok(())
    } else {
        Err(column_not_found(snapshot, column))
    }
}

/// Resolves the select list; a wildcard expands to every column in order.
fn parse_select(
    select: Option<&Value>,
    snapshot: &SchemaSnapshot,
) -> std::result::Result<Vec<String>, Rejection> {
    let requested: Vec<String> = match select {
        None | Some(Value::Null) => Vec::new(),
        Some(Value::String(list)) => list
            .split(',')
            .map(str::trim)
            .filter(|c| !c.is_empty())
            .map(str::to_string)
            .collect(),
        Some(Value::Array(entries)) => {
            let mut names = Vec::with_capacity(entries.len());
            for (i, entry) in entries.iter().enumerate() {
                match entry {
                    Value::String(name) => names.push(name.clone()),
                    _ => {
                        return Err(Rejection::InvalidSelect {
                            reason: format!("entry #{} must be a column name string", i),
                        });
                    }
                }
            }
            names
        }
        Some(_) => {
            return Err(Rejection::InvalidSelect {
                reason: "select must be an array of column names".to_string(),
            });
        }
    };

    if requested.is_empty() || requested.iter().any(|c| c == "*") {
        return Ok(snapshot.column_names());
    }

    let mut columns: Vec<String> = Vec::with_capacity(requested.len());
    for column in requested {
        require_column(snapshot, &column)?;
        if !columns.contains(&column) {
            columns.push(column);
        }
    }
    Ok(columns)
}

fn malformed_condition(index: usize, reason: impl Into<String>) -> Rejection {
    Rejection::MalformedCondition {
        index: Some(index),
        reason: reason.into(),
    }
}

/// A condition whose shape has been checked but whose column and
/// operator have not.
struct ShapedCondition<'a> {
    column: &'a str,
    operator: &'a str,
    /// Present when the operator is on the whitelist.
    parsed: Option<(Operator, PredicateValue)>,
}

/// Checks every condition's shape before any column or operator.
fn parse_predicates(
    filters: Option<&Value>,
    snapshot: &SchemaSnapshot,
) -> std::result::Result<Vec<Predicate>, Rejection> {
    let entries = match filters {
        None | Some(Value::Null) => return Ok(Vec::new()),
        Some(Value::Array(entries)) => entries,
        Some(_) => {
            return Err(Rejection::MalformedCondition {
                index: None,
                reason: "where must be an array of conditions".to_string(),
            });
        }
    };

    let shaped = entries
        .iter()
        .enumerate()
        .map(|(i, entry)| shape_condition(i, entry))
        .collect::<std::result::Result<Vec<_>, _>>()?;

    shaped
        .into_iter()
        .map(|condition| resolve_condition(condition, snapshot))
        .collect()
}

fn shape_condition(
    index: usize,
    entry: &Value,
) -> std::result::Result<ShapedCondition<'_>, Rejection> {
    let Value::Array(parts) = entry else {
        return Err(malformed_condition(
            index,
            "expected [column, value] or [column, operator, value]",
        ));
    };

    let (column, operator, value) = match parts.as_slice() {
        [column, value] => (column, "=", value),
        [column, operator, value] => {
            let Value::String(operator) = operator else {
                return Err(malformed_condition(index, "operator must be a string"));
            };
            (column, operator.as_str(), value)
        }
        _ => {
            return Err(malformed_condition(
                index,
                format!("expected 2 or 3 elements, got {}", parts.len()),
            ));
        }
    };

    let Value::String(column) = column else {
        return Err(malformed_condition(index, "column must be a string"));
    };

    // Value arity can only be judged for a known operator
    let parsed = match Operator::parse(operator) {
        Some(op) => Some(predicate_value(index, op, value)?),
        None => None,
    };

    Ok(ShapedCondition {
        column: column.as_str(),
        operator,
        parsed,
    })
}

fn resolve_condition(
    condition: ShapedCondition<'_>,
    snapshot: &SchemaSnapshot,
) -> std::result::Result<Predicate, Rejection> {
    let column_type = snapshot
        .column(condition.column)
        .map(|c| c.data_type.clone())
        .ok_or_else(|| column_not_found(snapshot, condition.column))?;

    let Some((operator, value)) = condition.parsed else {
        return Err(Rejection::InvalidOperator {
            column: condition.column.to_string(),
            operator: condition.operator.to_string(),
        });
    };

    Ok(Predicate {
        column: condition.column.to_string(),
        column_type,
        operator,
        value,
    })
}

/// Checks the value against the operator's arity.
///
/// A null compared with `=` becomes `IS NULL`; with `!=` or `<>` it
/// becomes `IS NOT NULL`.
fn predicate_value(
    index: usize,
    operator: Operator,
    value: &Value,
) -> std::result::Result<(Operator, PredicateValue), Rejection> {
    if operator.takes_no_value() {
        return Ok((operator, PredicateValue::None));
    }

    if operator.takes_list() {
        let Value::Array(items) = value else {
            return Err(malformed_condition(
                index,
                format!("'{}' requires an array value", operator.as_sql().to_lowercase()),
            ));
        };
        let mut values = Vec::with_capacity(items.len());
        for item in items {
            match BindValue::from_json(item) {
                Some(v) if !v.is_null() => values.push(v),
                _ => {
                    return Err(malformed_condition(
                        index,
                        format!(
                            "'{}' values must be non-null scalars",
                            operator.as_sql().to_lowercase()
                        ),
                    ));
                }
            }
        }
        return Ok((operator, PredicateValue::List(values)));
    }

    match BindValue::from_json(value) {
        Some(BindValue::Null) => match operator {
            Operator::Eq => Ok((Operator::IsNull, PredicateValue::None)),
            op if op.accepts_null() => Ok((Operator::IsNotNull, PredicateValue::None)),
            op => Err(malformed_condition(
                index,
                format!("null cannot be compared with '{}'", op.as_sql().to_lowercase()),
            )),
        },
        Some(scalar) => Ok((operator, PredicateValue::Scalar(scalar))),
        None => Err(malformed_condition(
            index,
            format!(
                "'{}' requires a scalar value",
                operator.as_sql().to_lowercase()
            ),
        )),
    }
}

fn malformed_order(index: usize, reason: impl Into<String>) -> Rejection {
    Rejection::MalformedOrder {
        index: Some(index),
        reason: reason.into(),
    }
}

fn is_direction(value: &Value) -> bool {
    value
        .as_str()
        .is_some_and(|d| d.trim().eq_ignore_ascii_case("asc") || d.trim().eq_ignore_ascii_case("desc"))
}

fn parse_order_by(
    order_by: Option<&Value>,
    snapshot: &SchemaSnapshot,
) -> std::result::Result<Vec<OrderClause>, Rejection> {
    let Some(value) = order_by.filter(|v| !v.is_null()) else {
        return Ok(Vec::new());
    };

    let entries: Vec<&Value> = match value {
        Value::String(_) => vec![value],
        // A flat ["column", "desc"] pair is one clause, not two columns
        Value::Array(items)
            if items.len() == 2 && items[0].is_string() && is_direction(&items[1]) =>
        {
            vec![value]
        }
        Value::Array(items) => items.iter().collect(),
        _ => {
            return Err(Rejection::MalformedOrder {
                index: None,
                reason: "order_by must be an array".to_string(),
            });
        }
    };

    let mut clauses = Vec::with_capacity(entries.len());
    for (i, entry) in entries.into_iter().enumerate() {
        let (column, direction) = match entry {
            Value::String(column) => (column, SortDirection::Ascending),
            Value::Array(parts) => match parts.as_slice() {
                [Value::String(column)] => (column, SortDirection::Ascending),
                [Value::String(column), Value::String(direction)] => {
                    (column, SortDirection::parse(direction))
                }
                [Value::String(_), _] => {
                    return Err(malformed_order(i, "direction must be a string"));
                }
                [_] | [_, _] => return Err(malformed_order(i, "column must be a string")),
                _ => {
                    return Err(malformed_order(
                        i,
                        format!("expected [column] or [column, direction], got {} elements", parts.len()),
                    ));
                }
            },
            _ => {
                return Err(malformed_order(
                    i,
                    "expected a column name or [column, direction]",
                ));
            }
        };

        require_column(snapshot, column)?;
        clauses.push(OrderClause {
            column: column.clone(),
            direction,
        });
    }

    Ok(clauses)
}

/// Reads an integer from a JSON number or a numeric string.
fn integer_value(value: &Value) -> Option<i128> {
    match value {
        Value::Number(n) => n
            .as_i64()
            .map(i128::from)
            .or_else(|| n.as_u64().map(i128::from)),
        Value::String(s) => s.trim().parse::<i128>().ok(),
        _ => None,
    }
}

/// Returns the effective limit and whether it was clamped.
fn parse_limit(limit: Option<&Value>) -> std::result::Result<(u32, bool), Rejection> {
    let Some(value) = limit.filter(|v| !v.is_null()) else {
        return Ok((DEFAULT_LIMIT, false));
    };

    match integer_value(value) {
        Some(n) if n <= 0 => Err(Rejection::InvalidLimit {
            value: value.to_string(),
        }),
        Some(n) if n > i128::from(MAX_LIMIT) => Ok((MAX_LIMIT, true)),
        Some(n) => Ok((u32::try_from(n).unwrap_or(MAX_LIMIT), false)),
        None => Err(Rejection::InvalidLimit {
            value: value.to_string(),
        }),
    }
}

fn parse_offset(offset: Option<&Value>) -> std::result::Result<u64, Rejection> {
    let Some(value) = offset.filter(|v| !v.is_null()) else {
        return Ok(0);
    };

    // Bound by i64::MAX so every engine can bind it as a signed integer
    integer_value(value)
        .filter(|n| *n >= 0 && *n <= i128::from(i64::MAX))
        .and_then(|n| u64::try_from(n).ok())
        .ok_or_else(|| Rejection::InvalidOffset {
            value: value.to_string(),
        })
}

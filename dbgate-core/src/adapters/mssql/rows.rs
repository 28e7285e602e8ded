//! Page and count queries for SQL Server.

use super::SqlServerAdapter;
use crate::Result;
use crate::adapters::helpers::{encode_binary, float_to_json};
use crate::error::GateError;
use crate::query::{BindValue, ValidatedQuery};
use crate::sql::{SqlBuilder, SqlDialect};
use serde_json::Value as JsonValue;
use std::borrow::Cow;
use tiberius::{ColumnData, FromSql, Row, ToSql};

impl ToSql for BindValue {
    fn to_sql(&self) -> ColumnData<'_> {
        match self {
            Self::Null => ColumnData::String(None),
            Self::Bool(b) => ColumnData::Bit(Some(*b)),
            Self::Int(i) => ColumnData::I64(Some(*i)),
            Self::Float(f) => ColumnData::F64(Some(*f)),
            Self::Text(s) => ColumnData::String(Some(Cow::Borrowed(s.as_str()))),
        }
    }
}

/// Fetches one page of rows as JSON objects.
///
/// # Errors
/// Returns error if the query fails or times out
pub async fn fetch_rows(
    adapter: &SqlServerAdapter,
    query: &ValidatedQuery,
) -> Result<Vec<JsonValue>> {
    let built = SqlBuilder::new(SqlDialect::SqlServer)
        .with_schema(Some(adapter.schema()))
        .select(query)?;
    tracing::debug!(
        "Selecting from '{}.{}' with {} parameter(s): {}",
        adapter.schema(),
        query.table,
        built.params.len(),
        built.sql
    );

    let params: Vec<&dyn ToSql> = built.params.iter().map(|p| p as &dyn ToSql).collect();
    let rows = adapter.query_rows("select rows", &built.sql, &params).await?;

    Ok(rows.iter().map(row_to_json).collect())
}

/// Counts rows matching the query's predicates.
///
/// # Errors
/// Returns error if the query fails or times out
pub async fn fetch_count(adapter: &SqlServerAdapter, query: &ValidatedQuery) -> Result<u64> {
    let built = SqlBuilder::new(SqlDialect::SqlServer)
        .with_schema(Some(adapter.schema()))
        .count(query)?;

    let params: Vec<&dyn ToSql> = built.params.iter().map(|p| p as &dyn ToSql).collect();
    let rows = adapter.query_rows("count rows", &built.sql, &params).await?;

    let total = rows
        .first()
        .and_then(|row| row.try_get::<i64, _>("total").ok().flatten())
        .ok_or_else(|| {
            GateError::configuration(format!(
                "SQL Server returned no row count for table '{}'",
                query.table
            ))
        })?;

    Ok(u64::try_from(total).unwrap_or(0))
}

/// Convert a result row to a JSON object keyed by column name.
fn row_to_json(row: &Row) -> JsonValue {
    let mut map = serde_json::Map::new();
    for (column, data) in row.cells() {
        map.insert(column.name().to_string(), column_data_to_json(data));
    }
    JsonValue::Object(map)
}

/// Convert one cell to JSON.
///
/// Temporal values are rendered as ISO-8601 strings and decimals as
/// strings so no precision is lost.
fn column_data_to_json(data: &ColumnData<'static>) -> JsonValue {
    match data {
        ColumnData::U8(v) => v.map_or(JsonValue::Null, |n| JsonValue::from(n)),
        ColumnData::I16(v) => v.map_or(JsonValue::Null, |n| JsonValue::from(n)),
        ColumnData::I32(v) => v.map_or(JsonValue::Null, |n| JsonValue::from(n)),
        ColumnData::I64(v) => v.map_or(JsonValue::Null, |n| JsonValue::from(n)),
        ColumnData::F32(v) => v.map_or(JsonValue::Null, |n| float_to_json(f64::from(n))),
        ColumnData::F64(v) => v.map_or(JsonValue::Null, float_to_json),
        ColumnData::Bit(v) => v.map_or(JsonValue::Null, JsonValue::Bool),
        ColumnData::String(v) => v
            .as_ref()
            .map_or(JsonValue::Null, |s| JsonValue::String(s.to_string())),
        ColumnData::Guid(v) => v.map_or(JsonValue::Null, |g| JsonValue::String(g.to_string())),
        ColumnData::Binary(v) => v.as_ref().map_or(JsonValue::Null, |b| encode_binary(b)),
        ColumnData::Numeric(v) => v.map_or(JsonValue::Null, |n| JsonValue::String(n.to_string())),
        ColumnData::DateTime(_) | ColumnData::SmallDateTime(_) | ColumnData::DateTime2(_) => {
            temporal::<chrono::NaiveDateTime>(data, |dt| dt.format("%Y-%m-%dT%H:%M:%S%.f").to_string())
        }
        ColumnData::Date(_) => temporal::<chrono::NaiveDate>(data, |d| d.to_string()),
        ColumnData::Time(_) => temporal::<chrono::NaiveTime>(data, |t| t.to_string()),
        ColumnData::DateTimeOffset(_) => {
            temporal::<chrono::DateTime<chrono::FixedOffset>>(data, |dt| dt.to_rfc3339())
        }
        // XML columns are not rendered
        ColumnData::Xml(_) => JsonValue::Null,
    }
}

fn temporal<'a, T>(data: &'a ColumnData<'static>, render: impl FnOnce(T) -> String) -> JsonValue
where
    T: FromSql<'a>,
{
    match T::from_sql(data) {
        Ok(Some(value)) => JsonValue::String(render(value)),
        _ => JsonValue::Null,
    }
}

//! Page and count queries for SQLite.

use super::SqliteAdapter;
use crate::Result;
use crate::adapters::helpers::{bind_params, encode_binary, float_to_json, sqlx_error, with_timeout};
use crate::query::ValidatedQuery;
use crate::sql::{SqlBuilder, SqlDialect};
use serde_json::Value as JsonValue;
use sqlx::{Column, Row};

/// Fetches one page of rows as JSON objects.
///
/// # Errors
/// Returns error if the query fails or times out
pub async fn fetch_rows(adapter: &SqliteAdapter, query: &ValidatedQuery) -> Result<Vec<JsonValue>> {
    let built = SqlBuilder::new(SqlDialect::Sqlite).select(query)?;
    tracing::debug!(
        "Selecting from '{}' with {} parameter(s): {}",
        query.table,
        built.params.len(),
        built.sql
    );

    let rows = with_timeout(adapter.query_timeout(), "select rows", async {
        bind_params(sqlx::query(&built.sql), &built.params)
            .fetch_all(&adapter.pool)
            .await
            .map_err(sqlx_error(format!(
                "Failed to select rows from table '{}'",
                query.table
            )))
    })
    .await?;

    Ok(rows.iter().map(row_to_json).collect())
}

/// Counts rows matching the query's predicates.
///
/// # Errors
/// Returns error if the query fails or times out
pub async fn fetch_count(adapter: &SqliteAdapter, query: &ValidatedQuery) -> Result<u64> {
    let built = SqlBuilder::new(SqlDialect::Sqlite).count(query)?;

    let total: i64 = with_timeout(adapter.query_timeout(), "count rows", async {
        let row = bind_params(sqlx::query(&built.sql), &built.params)
            .fetch_one(&adapter.pool)
            .await
            .map_err(sqlx_error(format!(
                "Failed to count rows in table '{}'",
                query.table
            )))?;
        row.try_get::<i64, _>("total")
            .map_err(sqlx_error("Failed to read row count"))
    })
    .await?;

    Ok(u64::try_from(total).unwrap_or(0))
}

/// Convert a database row to a JSON object keyed by column name.
fn row_to_json(row: &sqlx::sqlite::SqliteRow) -> JsonValue {
    let mut map = serde_json::Map::new();
    for column in row.columns() {
        let name = column.name();
        map.insert(name.to_string(), extract_column_value(row, name));
    }
    JsonValue::Object(map)
}

/// Extract a column value as a JSON value.
fn extract_column_value(row: &sqlx::sqlite::SqliteRow, column_name: &str) -> JsonValue {
    // SQLite is dynamically typed, so we need to try multiple types
    if let Ok(v) = row.try_get::<Option<String>, _>(column_name) {
        return v.map(JsonValue::String).unwrap_or(JsonValue::Null);
    }
    if let Ok(v) = row.try_get::<Option<i64>, _>(column_name) {
        return v
            .map(|n| JsonValue::Number(n.into()))
            .unwrap_or(JsonValue::Null);
    }
    if let Ok(v) = row.try_get::<Option<f64>, _>(column_name) {
        return v.map(float_to_json).unwrap_or(JsonValue::Null);
    }
    if let Ok(v) = row.try_get::<Option<Vec<u8>>, _>(column_name) {
        return v.map(|bytes| encode_binary(&bytes)).unwrap_or(JsonValue::Null);
    }

    // Default to null for unsupported types
    JsonValue::Null
}

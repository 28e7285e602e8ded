//! Page and count queries for MySQL.
//!
//! Rows are materialized server-side with `JSON_OBJECT`, so every MySQL
//! type arrives already converted to its JSON form.

use super::MySqlAdapter;
use crate::Result;
use crate::adapters::helpers::{bind_params, sqlx_error, with_timeout};
use crate::error::GateError;
use crate::query::{BindValue, ValidatedQuery};
use crate::sql::{Projection, SqlBuilder, SqlDialect};
use serde_json::Value as JsonValue;
use sqlx::Row;

/// Builds `CAST(JSON_OBJECT(?, `a`, ?, `b`) AS CHAR)` with the keys bound.
fn json_projection(columns: &[String]) -> Result<Projection> {
    let mut pairs = Vec::with_capacity(columns.len());
    let mut params = Vec::with_capacity(columns.len());
    for column in columns {
        pairs.push(format!("?, {}", SqlDialect::MySql.quote_identifier(column)?));
        params.push(BindValue::Text(column.clone()));
    }

    Ok(Projection {
        sql: format!("CAST(JSON_OBJECT({}) AS CHAR) AS row_data", pairs.join(", ")),
        params,
    })
}

/// Fetches one page of rows as JSON objects.
///
/// # Errors
/// Returns error if the query fails or times out
pub async fn fetch_rows(adapter: &MySqlAdapter, query: &ValidatedQuery) -> Result<Vec<JsonValue>> {
    let built = SqlBuilder::new(SqlDialect::MySql)
        .select_projected(query, json_projection(&query.columns)?)?;
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

    let mut results = Vec::with_capacity(rows.len());
    for row in &rows {
        let raw: String = row
            .try_get("row_data")
            .map_err(sqlx_error("Failed to read row data"))?;
        let value = serde_json::from_str(&raw).map_err(|e| GateError::Serialization {
            context: format!("Invalid row JSON from table '{}'", query.table),
            source: e,
        })?;
        results.push(value);
    }

    Ok(results)
}

/// Counts rows matching the query's predicates.
///
/// # Errors
/// Returns error if the query fails or times out
pub async fn fetch_count(adapter: &MySqlAdapter, query: &ValidatedQuery) -> Result<u64> {
    let built = SqlBuilder::new(SqlDialect::MySql).count(query)?;

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

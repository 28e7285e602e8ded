//! Page and count queries for PostgreSQL.
//!
//! The page query is wrapped in `row_to_json`, so the server performs the
//! type conversion and column order is preserved.

use super::PostgresAdapter;
use crate::Result;
use crate::adapters::helpers::{bind_params, sqlx_error, with_timeout};
use crate::query::ValidatedQuery;
use crate::sql::{BuiltQuery, SqlBuilder, SqlDialect};
use serde_json::Value as JsonValue;
use sqlx::Row;

/// Wraps the page query so each row comes back as one JSON object.
fn row_json_query(schema: &str, query: &ValidatedQuery) -> Result<BuiltQuery> {
    let inner = SqlBuilder::new(SqlDialect::Postgres)
        .with_schema(Some(schema))
        .select(query)?;
    Ok(BuiltQuery {
        sql: format!("SELECT row_to_json(q) AS row_data FROM ({}) q", inner.sql),
        params: inner.params,
    })
}

/// Fetches one page of rows as JSON objects.
///
/// # Errors
/// Returns error if the query fails or times out
pub async fn fetch_rows(
    adapter: &PostgresAdapter,
    query: &ValidatedQuery,
) -> Result<Vec<JsonValue>> {
    let built = row_json_query(adapter.schema(), query)?;
    tracing::debug!(
        "Selecting from '{}.{}' with {} parameter(s): {}",
        adapter.schema(),
        query.table,
        built.params.len(),
        built.sql
    );

    let rows = with_timeout(adapter.query_timeout(), "select rows", async {
        bind_params(sqlx::query(&built.sql), &built.params)
            .fetch_all(&adapter.pool)
            .await
            .map_err(sqlx_error(format!(
                "Failed to select rows from table '{}.{}'",
                adapter.schema(),
                query.table
            )))
    })
    .await?;

    rows.iter()
        .map(|row| {
            row.try_get::<JsonValue, _>("row_data")
                .map_err(sqlx_error("Failed to read row data"))
        })
        .collect()
}

/// Counts rows matching the query's predicates.
///
/// # Errors
/// Returns error if the query fails or times out
pub async fn fetch_count(adapter: &PostgresAdapter, query: &ValidatedQuery) -> Result<u64> {
    let built = SqlBuilder::new(SqlDialect::Postgres)
        .with_schema(Some(adapter.schema()))
        .count(query)?;

    let total: i64 = with_timeout(adapter.query_timeout(), "count rows", async {
        let row = bind_params(sqlx::query(&built.sql), &built.params)
            .fetch_one(&adapter.pool)
            .await
            .map_err(sqlx_error(format!(
                "Failed to count rows in table '{}.{}'",
                adapter.schema(),
                query.table
            )))?;
        row.try_get::<i64, _>("total")
            .map_err(sqlx_error("Failed to read row count"))
    })
    .await?;

    Ok(u64::try_from(total).unwrap_or(0))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::query::{BindValue, Operator, Predicate, PredicateValue};

    #[test]
    fn test_row_json_query_wraps_page_query() {
        let query = ValidatedQuery {
            table: "events".to_string(),
            columns: vec!["id".to_string(), "kind".to_string()],
            predicates: vec![Predicate {
                column: "kind".to_string(),
                column_type: "text".to_string(),
                operator: Operator::Eq,
                value: PredicateValue::Scalar(BindValue::Text("login".to_string())),
            }],
            order_by: Vec::new(),
            limit: 20,
            offset: 0,
            limit_clamped: false,
        };

        let built = row_json_query("public", &query).unwrap();
        assert_eq!(
            built.sql,
            "SELECT row_to_json(q) AS row_data FROM (SELECT \"id\", \"kind\" FROM \"public\".\"events\" WHERE \"kind\" = $1::text LIMIT $2) q"
        );
        assert_eq!(built.params.len(), 2);
    }
}

//! PostgreSQL database adapter with connection pooling.
//!
//! # Module Structure
//! - `connection`: Pool creation with read-only session parameters
//! - `introspection`: `pg_catalog` metadata queries
//! - `rows`: Page and count queries, rows materialized with `row_to_json`
//!
//! # Security Guarantees
//! - `default_transaction_read_only` is set for every session
//! - `statement_timeout` bounds every statement server-side
//! - Connection strings are sanitized in error messages
//!
//! # Type Strictness
//! Filter values are bound with their JSON type (`text`, `int8`, `float8`,
//! `bool`). String values are cast to the column's declared type, so
//! dates, uuids and enums compare as written. A string that does not parse
//! as that type fails with a database error rather than matching.

pub mod connection;
pub mod introspection;
pub mod rows;

use super::DatabaseAdapter;
use super::helpers::with_timeout;
use crate::Result;
use crate::error::GateError;
use crate::query::ValidatedQuery;
use crate::sql::SqlDialect;
use async_trait::async_trait;
use sqlx::PgPool;
use std::time::Duration;

/// Schema used when a project does not name one.
pub const DEFAULT_SCHEMA: &str = "public";

/// PostgreSQL adapter bound to one project's database and schema.
pub struct PostgresAdapter {
    /// Connection pool for database operations
    pub pool: PgPool,
    project: String,
    schema: String,
    query_timeout: Duration,
}

impl std::fmt::Debug for PostgresAdapter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PostgresAdapter")
            .field("project", &self.project)
            .field("schema", &self.schema)
            .field("pool_size", &self.pool.size())
            .field("pool_idle", &self.pool.num_idle())
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl DatabaseAdapter for PostgresAdapter {
    async fn test_connection(&self) -> Result<()> {
        let result: i32 = with_timeout(self.query_timeout, "connection test", async {
            sqlx::query_scalar("SELECT 1")
                .fetch_one(&self.pool)
                .await
                .map_err(|e| {
                    GateError::connection_failed(
                        format!(
                            "Failed to connect to PostgreSQL for project '{}'",
                            self.project
                        ),
                        e,
                    )
                })
        })
        .await?;

        if result != 1 {
            return Err(GateError::configuration(
                "Basic connectivity test failed: unexpected result",
            ));
        }

        Ok(())
    }

    fn dialect(&self) -> SqlDialect {
        SqlDialect::Postgres
    }

    async fn fetch_rows(&self, query: &ValidatedQuery) -> Result<Vec<serde_json::Value>> {
        rows::fetch_rows(self, query).await
    }

    async fn fetch_count(&self, query: &ValidatedQuery) -> Result<u64> {
        rows::fetch_count(self, query).await
    }

    async fn close(&self) {
        self.pool.close().await;
    }
}

impl PostgresAdapter {
    pub(crate) fn query_timeout(&self) -> Duration {
        self.query_timeout
    }

    /// Schema whose tables this adapter exposes.
    pub fn schema(&self) -> &str {
        &self.schema
    }

    /// Name of the project this adapter serves.
    pub fn project(&self) -> &str {
        &self.project
    }
}

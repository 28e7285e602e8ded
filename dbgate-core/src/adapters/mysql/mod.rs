//! MySQL database adapter with connection pooling.
//!
//! # Module Structure
//! - `connection`: Pool creation with read-only session setup
//! - `introspection`: `INFORMATION_SCHEMA` metadata queries
//! - `rows`: Page and count queries, rows materialized with `JSON_OBJECT`
//!
//! # Security Guarantees
//! - Sessions run `SET SESSION TRANSACTION READ ONLY`
//! - `max_execution_time` bounds every statement server-side
//! - Connection strings are sanitized in error messages

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
use sqlx::MySqlPool;
use std::time::Duration;

/// MySQL adapter bound to one project's database.
pub struct MySqlAdapter {
    /// Connection pool for database operations
    pub pool: MySqlPool,
    project: String,
    query_timeout: Duration,
}

impl std::fmt::Debug for MySqlAdapter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MySqlAdapter")
            .field("project", &self.project)
            .field("pool_size", &self.pool.size())
            .field("pool_idle", &self.pool.num_idle())
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl DatabaseAdapter for MySqlAdapter {
    async fn test_connection(&self) -> Result<()> {
        let result: i64 = with_timeout(self.query_timeout, "connection test", async {
            sqlx::query_scalar("SELECT CAST(1 AS SIGNED)")
                .fetch_one(&self.pool)
                .await
                .map_err(|e| {
                    GateError::connection_failed(
                        format!("Failed to connect to MySQL for project '{}'", self.project),
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
        SqlDialect::MySql
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

impl MySqlAdapter {
    pub(crate) fn query_timeout(&self) -> Duration {
        self.query_timeout
    }

    /// Name of the project this adapter serves.
    pub fn project(&self) -> &str {
        &self.project
    }
}

//! SQLite database adapter.
//!
//! # Module Structure
//! - `connection`: Read-only pool creation from project configuration
//! - `introspection`: Table listing and `pragma_*` metadata queries
//! - `rows`: Page and count queries with dynamic value extraction
//!
//! # SQLite-Specific Features
//! - Uses `sqlite_master` for table listing
//! - Uses the `pragma_*` table-valued functions so table names are bound
//!   parameters, never spliced into SQL
//! - Databases are opened with `SQLITE_OPEN_READONLY`

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
use sqlx::SqlitePool;
use std::time::Duration;

/// SQLite adapter bound to one project's database file.
pub struct SqliteAdapter {
    /// Read-only connection pool
    pub pool: SqlitePool,
    project: String,
    query_timeout: Duration,
}

impl std::fmt::Debug for SqliteAdapter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SqliteAdapter")
            .field("project", &self.project)
            .field("pool_size", &self.pool.size())
            .field("query_timeout", &self.query_timeout)
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl DatabaseAdapter for SqliteAdapter {
    async fn test_connection(&self) -> Result<()> {
        let result: i64 = with_timeout(self.query_timeout, "connection test", async {
            sqlx::query_scalar("SELECT 1")
                .fetch_one(&self.pool)
                .await
                .map_err(|e| {
                    GateError::connection_failed(
                        format!(
                            "Failed to open SQLite database for project '{}'",
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
        SqlDialect::Sqlite
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

impl SqliteAdapter {
    pub(crate) fn query_timeout(&self) -> Duration {
        self.query_timeout
    }

    /// Name of the project this adapter serves.
    pub fn project(&self) -> &str {
        &self.project
    }
}

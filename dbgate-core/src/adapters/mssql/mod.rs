//! SQL Server database adapter built on tiberius.
//!
//! tiberius has no pool, so each round trip opens its own connection. A
//! semaphore sized by the project's `max_connections` caps how many are
//! open at once.
//!
//! # Module Structure
//! - `connection`: tiberius configuration, connect and error classification
//! - `introspection`: `sys` catalog metadata queries
//! - `rows`: Page and count queries, `ColumnData` to JSON conversion
//!
//! # Security Guarantees
//! - Connections declare `ApplicationIntent=ReadOnly`
//! - Only SELECT statements are ever generated
//! - Connection strings are sanitized in error messages

pub mod connection;
pub mod introspection;
pub mod rows;

use super::DatabaseAdapter;
use crate::Result;
use crate::query::ValidatedQuery;
use crate::sql::SqlDialect;
use async_trait::async_trait;
use std::time::Duration;
use tokio::sync::Semaphore;

/// Schema used when a project does not name one.
pub const DEFAULT_SCHEMA: &str = "dbo";

/// SQL Server adapter bound to one project's database and schema.
pub struct SqlServerAdapter {
    config: tiberius::Config,
    permits: Semaphore,
    project: String,
    schema: String,
    connect_timeout: Duration,
    query_timeout: Duration,
}

impl std::fmt::Debug for SqlServerAdapter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        // tiberius::Config carries the password, so it is left out
        f.debug_struct("SqlServerAdapter")
            .field("project", &self.project)
            .field("schema", &self.schema)
            .field("available_permits", &self.permits.available_permits())
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl DatabaseAdapter for SqlServerAdapter {
    async fn test_connection(&self) -> Result<()> {
        self.query_rows("connection test", "SELECT 1", &[]).await?;
        Ok(())
    }

    fn dialect(&self) -> SqlDialect {
        SqlDialect::SqlServer
    }

    async fn fetch_rows(&self, query: &ValidatedQuery) -> Result<Vec<serde_json::Value>> {
        rows::fetch_rows(self, query).await
    }

    async fn fetch_count(&self, query: &ValidatedQuery) -> Result<u64> {
        rows::fetch_count(self, query).await
    }

    async fn close(&self) {
        self.permits.close();
    }
}

impl SqlServerAdapter {
    /// Schema whose tables this adapter exposes.
    pub fn schema(&self) -> &str {
        &self.schema
    }

    /// Name of the project this adapter serves.
    pub fn project(&self) -> &str {
        &self.project
    }
}

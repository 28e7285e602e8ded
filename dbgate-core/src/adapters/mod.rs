//! Database adapter traits and factory for per-project database access.
//!
//! Every engine implements [`SchemaIntrospector`] (table listing and table
//! description in the normalized metadata shape) and [`DatabaseAdapter`]
//! (connectivity check plus execution of validated queries).
//!
//! # Module Structure
//! - `helpers`: Timeout and degradation helpers shared by all engines
//! - Database-specific modules (postgres, mysql, sqlite, mssql), each split
//!   into `connection`, `introspection` and `rows`
//!
//! # Security Guarantees
//! - Sessions are opened read-only wherever the engine supports it
//! - Only SELECT statements are ever generated
//! - Connection strings are sanitized in error messages
//! - Every round trip is bounded by the project's query timeout

use crate::Result;
use crate::config::ProjectConfig;
use crate::models::{
    assign_key_roles, ColumnInfo, DatabaseType, ForeignKeyInfo, IndexInfo, SchemaSnapshot, TableSummary,
};
use crate::query::ValidatedQuery;
use crate::sql::SqlDialect;
use async_trait::async_trait;
use std::sync::Arc;

// Shared helper utilities
pub mod helpers;

// Database-specific adapter modules
#[cfg(feature = "postgresql")]
pub mod postgres;

#[cfg(feature = "mysql")]
pub mod mysql;

#[cfg(feature = "sqlite")]
pub mod sqlite;

#[cfg(feature = "mssql")]
pub mod mssql;

/// Normalized schema metadata for one live connection.
///
/// Implementations bind every table name as a query parameter; where a name
/// must appear in SQL text it goes through [`SqlDialect::quote_identifier`].
#[async_trait]
pub trait SchemaIntrospector: Send + Sync {
    /// Returns the database type this introspector handles.
    fn database_type(&self) -> DatabaseType;

    /// Lists user tables in catalog order.
    ///
    /// # Errors
    /// Returns error if the catalog query fails or times out
    async fn list_tables(&self) -> Result<Vec<TableSummary>>;

    /// Ordered column metadata for `table`.
    async fn columns(&self, table: &str) -> Result<Vec<ColumnInfo>>;

    /// Indexes on `table`, grouped by index name.
    async fn indexes(&self, table: &str) -> Result<Vec<IndexInfo>>;

    /// Foreign keys declared on `table`.
    async fn foreign_keys(&self, table: &str) -> Result<Vec<ForeignKeyInfo>>;

    /// Table comment, when the engine stores one.
    async fn table_comment(&self, _table: &str) -> Result<Option<String>> {
        Ok(None)
    }

    /// Builds a fresh snapshot of `table`.
    ///
    /// Column failures propagate. Index, foreign-key and comment failures
    /// are logged and degrade to empty values. Column key roles the engine
    /// did not report are derived from the indexes.
    ///
    /// # Errors
    /// Returns error if columns cannot be read
    async fn describe_table(&self, table: &str) -> Result<SchemaSnapshot> {
        let mut columns = self.columns(table).await?;
        let indexes = helpers::degrade("indexes", table, self.indexes(table).await);
        assign_key_roles(&mut columns, &indexes);
        let foreign_keys =
            helpers::degrade("foreign keys", table, self.foreign_keys(table).await);
        let comment = helpers::degrade("table comment", table, self.table_comment(table).await);

        Ok(SchemaSnapshot {
            table: table.to_string(),
            comment,
            columns,
            indexes,
            foreign_keys,
        })
    }
}

/// A live, read-only handle bound to exactly one project.
///
/// # Object Safety
/// This trait is object-safe; the resolver hands out
/// `Arc<dyn DatabaseAdapter>`.
#[async_trait]
pub trait DatabaseAdapter: SchemaIntrospector {
    /// Tests the database connection.
    ///
    /// # Errors
    /// Returns error if connection fails or times out
    async fn test_connection(&self) -> Result<()>;

    /// SQL flavour used to render queries for this engine.
    fn dialect(&self) -> SqlDialect;

    /// Fetches one page of rows as JSON objects keyed by column name.
    ///
    /// # Errors
    /// Returns error if the query fails or times out
    async fn fetch_rows(&self, query: &ValidatedQuery) -> Result<Vec<serde_json::Value>>;

    /// Counts rows matching the query's predicates, ignoring paging.
    ///
    /// # Errors
    /// Returns error if the query fails or times out
    async fn fetch_count(&self, query: &ValidatedQuery) -> Result<u64>;

    /// Releases pooled connections.
    async fn close(&self) {}
}

/// Factory function to create the adapter for a project.
///
/// Pools connect lazily, so this does not touch the network; the first
/// query surfaces connection failures. Must be called inside a tokio
/// runtime.
///
/// # Errors
/// Returns error if:
/// - Connection parameters are invalid
/// - Credentials cannot be materialized (unset `password_env`)
/// - Required features are not compiled in
pub fn create_adapter(config: &ProjectConfig) -> Result<Arc<dyn DatabaseAdapter>> {
    match config.database_type() {
        #[cfg(feature = "postgresql")]
        DatabaseType::PostgreSQL => {
            let adapter = postgres::PostgresAdapter::new(config)?;
            Ok(Arc::new(adapter))
        }
        #[cfg(not(feature = "postgresql"))]
        DatabaseType::PostgreSQL => Err(crate::error::GateError::unsupported_feature(
            "PostgreSQL adapter",
            "Compile with --features postgresql to enable PostgreSQL support",
        )),
        #[cfg(feature = "mysql")]
        DatabaseType::MySQL => {
            let adapter = mysql::MySqlAdapter::new(config)?;
            Ok(Arc::new(adapter))
        }
        #[cfg(not(feature = "mysql"))]
        DatabaseType::MySQL => Err(crate::error::GateError::unsupported_feature(
            "MySQL adapter",
            "Compile with --features mysql to enable MySQL support",
        )),
        #[cfg(feature = "sqlite")]
        DatabaseType::SQLite => {
            let adapter = sqlite::SqliteAdapter::new(config)?;
            Ok(Arc::new(adapter))
        }
        #[cfg(not(feature = "sqlite"))]
        DatabaseType::SQLite => Err(crate::error::GateError::unsupported_feature(
            "SQLite adapter",
            "Compile with --features sqlite to enable SQLite support",
        )),
        #[cfg(feature = "mssql")]
        DatabaseType::SqlServer => {
            let adapter = mssql::SqlServerAdapter::new(config)?;
            Ok(Arc::new(adapter))
        }
        #[cfg(not(feature = "mssql"))]
        DatabaseType::SqlServer => Err(crate::error::GateError::unsupported_feature(
            "SQL Server adapter",
            "Compile with --features mssql to enable SQL Server support",
        )),
    }
}

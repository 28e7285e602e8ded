//! MySQL metadata queries against `INFORMATION_SCHEMA`.
//!
//! All lookups are scoped to the session's current database
//! (`DATABASE()`). Text columns are cast to `CHAR` because some server
//! versions report catalog columns as binary strings.

use super::MySqlAdapter;
use crate::Result;
use crate::adapters::SchemaIntrospector;
use crate::adapters::helpers::{sqlx_error, with_timeout};
use crate::models::{
    ColumnInfo, DatabaseType, ForeignKeyInfo, IndexInfo, TableSummary, group_index_rows,
};
use async_trait::async_trait;
use sqlx::Row;

/// Empty catalog comments mean "no comment".
fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|s| !s.trim().is_empty())
}

#[async_trait]
impl SchemaIntrospector for MySqlAdapter {
    fn database_type(&self) -> DatabaseType {
        DatabaseType::MySQL
    }

    async fn list_tables(&self) -> Result<Vec<TableSummary>> {
        let rows = with_timeout(self.query_timeout(), "list tables", async {
            sqlx::query(
                r#"
                SELECT
                    CAST(TABLE_NAME AS CHAR) as TABLE_NAME,
                    CAST(TABLE_COMMENT AS CHAR) as TABLE_COMMENT
                FROM INFORMATION_SCHEMA.TABLES
                WHERE TABLE_SCHEMA = DATABASE()
                AND TABLE_TYPE = 'BASE TABLE'
                ORDER BY TABLE_NAME
                "#,
            )
            .fetch_all(&self.pool)
            .await
            .map_err(sqlx_error("Failed to enumerate MySQL tables"))
        })
        .await?;

        let mut tables = Vec::with_capacity(rows.len());
        for row in &rows {
            let name: String = row
                .try_get("TABLE_NAME")
                .map_err(sqlx_error("Failed to parse table name"))?;
            let comment: Option<String> = row.try_get("TABLE_COMMENT").unwrap_or(None);
            tables.push(TableSummary::new(name, comment));
        }

        tracing::debug!(
            "Found {} tables for project '{}'",
            tables.len(),
            self.project()
        );
        Ok(tables)
    }

    async fn columns(&self, table: &str) -> Result<Vec<ColumnInfo>> {
        let rows = with_timeout(self.query_timeout(), "describe columns", async {
            sqlx::query(
                r#"
                SELECT
                    CAST(COLUMN_NAME AS CHAR) as COLUMN_NAME,
                    CAST(COLUMN_TYPE AS CHAR) as COLUMN_TYPE,
                    CAST(IS_NULLABLE AS CHAR) as IS_NULLABLE,
                    CAST(COLUMN_DEFAULT AS CHAR) as COLUMN_DEFAULT,
                    CAST(COLUMN_KEY AS CHAR) as COLUMN_KEY,
                    CAST(EXTRA AS CHAR) as EXTRA,
                    CAST(COLUMN_COMMENT AS CHAR) as COLUMN_COMMENT
                FROM INFORMATION_SCHEMA.COLUMNS
                WHERE TABLE_SCHEMA = DATABASE()
                AND TABLE_NAME = ?
                ORDER BY ORDINAL_POSITION
                "#,
            )
            .bind(table)
            .fetch_all(&self.pool)
            .await
            .map_err(sqlx_error(format!(
                "Failed to collect columns for table '{}'",
                table
            )))
        })
        .await?;

        let mut columns = Vec::with_capacity(rows.len());
        for row in &rows {
            let name: String = row
                .try_get("COLUMN_NAME")
                .map_err(sqlx_error("Failed to parse column name"))?;
            let data_type: String = row.try_get("COLUMN_TYPE").unwrap_or_default();
            let is_nullable: String = row.try_get("IS_NULLABLE").unwrap_or_default();

            columns.push(ColumnInfo {
                name,
                data_type,
                nullable: is_nullable.eq_ignore_ascii_case("YES"),
                default: row.try_get("COLUMN_DEFAULT").unwrap_or(None),
                key: row
                    .try_get::<Option<String>, _>("COLUMN_KEY")
                    .unwrap_or(None)
                    .unwrap_or_default(),
                extra: row
                    .try_get::<Option<String>, _>("EXTRA")
                    .unwrap_or(None)
                    .unwrap_or_default(),
                comment: non_empty(row.try_get("COLUMN_COMMENT").unwrap_or(None)),
            });
        }

        Ok(columns)
    }

    async fn indexes(&self, table: &str) -> Result<Vec<IndexInfo>> {
        let rows = with_timeout(self.query_timeout(), "describe indexes", async {
            sqlx::query(
                r#"
                SELECT
                    CAST(INDEX_NAME AS CHAR) as INDEX_NAME,
                    CAST(COLUMN_NAME AS CHAR) as COLUMN_NAME,
                    NON_UNIQUE,
                    CAST(INDEX_TYPE AS CHAR) as INDEX_TYPE
                FROM INFORMATION_SCHEMA.STATISTICS
                WHERE TABLE_SCHEMA = DATABASE()
                AND TABLE_NAME = ?
                ORDER BY INDEX_NAME = 'PRIMARY' DESC, INDEX_NAME, SEQ_IN_INDEX
                "#,
            )
            .bind(table)
            .fetch_all(&self.pool)
            .await
            .map_err(sqlx_error(format!(
                "Failed to collect indexes for table '{}'",
                table
            )))
        })
        .await?;

        let mut entries = Vec::with_capacity(rows.len());
        for row in &rows {
            let index_name: String = row
                .try_get("INDEX_NAME")
                .map_err(sqlx_error("Failed to parse index name"))?;
            // Functional key parts have no column name
            let Some(column): Option<String> = row.try_get("COLUMN_NAME").unwrap_or(None) else {
                continue;
            };
            // NON_UNIQUE is INT on MySQL 5.7 and BIGINT on 8.0
            let non_unique = row
                .try_get::<i64, _>("NON_UNIQUE")
                .or_else(|_| row.try_get::<i32, _>("NON_UNIQUE").map(i64::from))
                .unwrap_or(1);
            let index_type: Option<String> = row.try_get("INDEX_TYPE").unwrap_or(None);
            entries.push((index_name, column, non_unique == 0, index_type));
        }

        Ok(group_index_rows(entries))
    }

    async fn foreign_keys(&self, table: &str) -> Result<Vec<ForeignKeyInfo>> {
        let rows = with_timeout(self.query_timeout(), "describe foreign keys", async {
            sqlx::query(
                r#"
                SELECT
                    CAST(CONSTRAINT_NAME AS CHAR) as CONSTRAINT_NAME,
                    CAST(COLUMN_NAME AS CHAR) as COLUMN_NAME,
                    CAST(REFERENCED_TABLE_NAME AS CHAR) as REFERENCED_TABLE_NAME,
                    CAST(REFERENCED_COLUMN_NAME AS CHAR) as REFERENCED_COLUMN_NAME
                FROM INFORMATION_SCHEMA.KEY_COLUMN_USAGE
                WHERE TABLE_SCHEMA = DATABASE()
                AND TABLE_NAME = ?
                AND REFERENCED_TABLE_NAME IS NOT NULL
                ORDER BY CONSTRAINT_NAME, ORDINAL_POSITION
                "#,
            )
            .bind(table)
            .fetch_all(&self.pool)
            .await
            .map_err(sqlx_error(format!(
                "Failed to collect foreign keys for table '{}'",
                table
            )))
        })
        .await?;

        let mut foreign_keys = Vec::with_capacity(rows.len());
        for row in &rows {
            foreign_keys.push(ForeignKeyInfo {
                name: row.try_get("CONSTRAINT_NAME").unwrap_or(None),
                column: row
                    .try_get("COLUMN_NAME")
                    .map_err(sqlx_error("Failed to parse foreign key column"))?,
                referenced_table: row
                    .try_get("REFERENCED_TABLE_NAME")
                    .map_err(sqlx_error("Failed to parse referenced table"))?,
                referenced_column: row
                    .try_get::<Option<String>, _>("REFERENCED_COLUMN_NAME")
                    .unwrap_or(None)
                    .unwrap_or_default(),
            });
        }

        Ok(foreign_keys)
    }

    async fn table_comment(&self, table: &str) -> Result<Option<String>> {
        let comment: Option<Option<String>> =
            with_timeout(self.query_timeout(), "read table comment", async {
                sqlx::query_scalar(
                    r#"
                    SELECT CAST(TABLE_COMMENT AS CHAR)
                    FROM INFORMATION_SCHEMA.TABLES
                    WHERE TABLE_SCHEMA = DATABASE()
                    AND TABLE_NAME = ?
                    "#,
                )
                .bind(table)
                .fetch_optional(&self.pool)
                .await
                .map_err(sqlx_error(format!(
                    "Failed to read comment for table '{}'",
                    table
                )))
            })
            .await?;

        Ok(non_empty(comment.flatten()))
    }
}

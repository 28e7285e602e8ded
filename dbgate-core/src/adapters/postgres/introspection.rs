//! PostgreSQL metadata queries against `pg_catalog`.
//!
//! Lookups are scoped to the adapter's schema. Both the schema and the
//! table name are bound parameters.

use super::PostgresAdapter;
use crate::Result;
use crate::adapters::SchemaIntrospector;
use crate::adapters::helpers::{sqlx_error, with_timeout};
use crate::models::{
    ColumnInfo, DatabaseType, ForeignKeyInfo, IndexInfo, KEY_PRIMARY, TableSummary,
    group_index_rows,
};
use async_trait::async_trait;
use sqlx::Row;

/// Serial and identity columns are reported like MySQL's auto_increment.
fn column_extra(default: Option<&str>, identity: &str) -> String {
    let is_serial = default.is_some_and(|d| d.starts_with("nextval("));
    if is_serial || !identity.is_empty() {
        "auto_increment".to_string()
    } else {
        String::new()
    }
}

#[async_trait]
impl SchemaIntrospector for PostgresAdapter {
    fn database_type(&self) -> DatabaseType {
        DatabaseType::PostgreSQL
    }

    async fn list_tables(&self) -> Result<Vec<TableSummary>> {
        let rows = with_timeout(self.query_timeout(), "list tables", async {
            sqlx::query(
                r#"
                SELECT
                    c.relname AS table_name,
                    obj_description(c.oid, 'pg_class') AS table_comment
                FROM pg_catalog.pg_class c
                JOIN pg_catalog.pg_namespace n ON n.oid = c.relnamespace
                WHERE n.nspname = $1
                  AND c.relkind IN ('r', 'p')
                  AND NOT c.relispartition
                ORDER BY c.relname
                "#,
            )
            .bind(self.schema())
            .fetch_all(&self.pool)
            .await
            .map_err(sqlx_error(format!(
                "Failed to enumerate tables in schema '{}'",
                self.schema()
            )))
        })
        .await?;

        let mut tables = Vec::with_capacity(rows.len());
        for row in &rows {
            let name: String = row
                .try_get("table_name")
                .map_err(sqlx_error("Failed to parse table name"))?;
            let comment: Option<String> = row.try_get("table_comment").unwrap_or(None);
            tables.push(TableSummary::new(name, comment));
        }

        tracing::debug!(
            "Found {} tables in schema '{}' for project '{}'",
            tables.len(),
            self.schema(),
            self.project()
        );
        Ok(tables)
    }

    async fn columns(&self, table: &str) -> Result<Vec<ColumnInfo>> {
        let rows = with_timeout(self.query_timeout(), "describe columns", async {
            sqlx::query(
                r#"
                SELECT
                    a.attname AS column_name,
                    format_type(a.atttypid, a.atttypmod) AS data_type,
                    NOT a.attnotnull AS is_nullable,
                    pg_get_expr(d.adbin, d.adrelid) AS column_default,
                    a.attidentity::text AS identity,
                    col_description(c.oid, a.attnum) AS column_comment,
                    EXISTS (
                        SELECT 1 FROM pg_catalog.pg_index i
                        WHERE i.indrelid = c.oid
                          AND i.indisprimary
                          AND a.attnum = ANY(i.indkey)
                    ) AS is_primary
                FROM pg_catalog.pg_attribute a
                JOIN pg_catalog.pg_class c ON c.oid = a.attrelid
                JOIN pg_catalog.pg_namespace n ON n.oid = c.relnamespace
                LEFT JOIN pg_catalog.pg_attrdef d
                    ON d.adrelid = a.attrelid AND d.adnum = a.attnum
                WHERE n.nspname = $1
                  AND c.relname = $2
                  AND a.attnum > 0
                  AND NOT a.attisdropped
                ORDER BY a.attnum
                "#,
            )
            .bind(self.schema())
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
                .try_get("column_name")
                .map_err(sqlx_error("Failed to parse column name"))?;
            let default: Option<String> = row.try_get("column_default").unwrap_or(None);
            let identity: String = row
                .try_get::<Option<String>, _>("identity")
                .unwrap_or(None)
                .unwrap_or_default();
            let is_primary: bool = row.try_get("is_primary").unwrap_or(false);

            columns.push(ColumnInfo {
                extra: column_extra(default.as_deref(), &identity),
                name,
                data_type: row.try_get("data_type").unwrap_or_default(),
                nullable: row.try_get("is_nullable").unwrap_or(true),
                default,
                key: if is_primary {
                    KEY_PRIMARY.to_string()
                } else {
                    String::new()
                },
                comment: row.try_get("column_comment").unwrap_or(None),
            });
        }

        Ok(columns)
    }

    async fn indexes(&self, table: &str) -> Result<Vec<IndexInfo>> {
        let rows = with_timeout(self.query_timeout(), "describe indexes", async {
            sqlx::query(
                r#"
                SELECT
                    i.relname AS index_name,
                    a.attname AS column_name,
                    ix.indisunique AS is_unique,
                    upper(am.amname) AS index_type
                FROM pg_catalog.pg_index ix
                JOIN pg_catalog.pg_class t ON t.oid = ix.indrelid
                JOIN pg_catalog.pg_namespace n ON n.oid = t.relnamespace
                JOIN pg_catalog.pg_class i ON i.oid = ix.indexrelid
                JOIN pg_catalog.pg_am am ON am.oid = i.relam
                CROSS JOIN LATERAL unnest(ix.indkey) WITH ORDINALITY AS k(attnum, ord)
                JOIN pg_catalog.pg_attribute a
                    ON a.attrelid = t.oid AND a.attnum = k.attnum
                WHERE n.nspname = $1
                  AND t.relname = $2
                ORDER BY ix.indisprimary DESC, i.relname, k.ord
                "#,
            )
            .bind(self.schema())
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
                .try_get("index_name")
                .map_err(sqlx_error("Failed to parse index name"))?;
            let column: String = row
                .try_get("column_name")
                .map_err(sqlx_error("Failed to parse index column"))?;
            let unique: bool = row.try_get("is_unique").unwrap_or(false);
            let index_type: Option<String> = row.try_get("index_type").unwrap_or(None);
            entries.push((index_name, column, unique, index_type));
        }

        Ok(group_index_rows(entries))
    }

    async fn foreign_keys(&self, table: &str) -> Result<Vec<ForeignKeyInfo>> {
        let rows = with_timeout(self.query_timeout(), "describe foreign keys", async {
            sqlx::query(
                r#"
                SELECT
                    con.conname AS constraint_name,
                    a.attname AS column_name,
                    rt.relname AS referenced_table,
                    ra.attname AS referenced_column
                FROM pg_catalog.pg_constraint con
                JOIN pg_catalog.pg_class t ON t.oid = con.conrelid
                JOIN pg_catalog.pg_namespace n ON n.oid = t.relnamespace
                JOIN pg_catalog.pg_class rt ON rt.oid = con.confrelid
                CROSS JOIN LATERAL unnest(con.conkey, con.confkey)
                    WITH ORDINALITY AS k(attnum, ref_attnum, ord)
                JOIN pg_catalog.pg_attribute a
                    ON a.attrelid = con.conrelid AND a.attnum = k.attnum
                JOIN pg_catalog.pg_attribute ra
                    ON ra.attrelid = con.confrelid AND ra.attnum = k.ref_attnum
                WHERE con.contype = 'f'
                  AND n.nspname = $1
                  AND t.relname = $2
                ORDER BY con.conname, k.ord
                "#,
            )
            .bind(self.schema())
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
                name: row.try_get("constraint_name").unwrap_or(None),
                column: row
                    .try_get("column_name")
                    .map_err(sqlx_error("Failed to parse foreign key column"))?,
                referenced_table: row
                    .try_get("referenced_table")
                    .map_err(sqlx_error("Failed to parse referenced table"))?,
                referenced_column: row.try_get("referenced_column").unwrap_or_default(),
            });
        }

        Ok(foreign_keys)
    }

    async fn table_comment(&self, table: &str) -> Result<Option<String>> {
        let comment: Option<Option<String>> =
            with_timeout(self.query_timeout(), "read table comment", async {
                sqlx::query_scalar(
                    r#"
                    SELECT obj_description(c.oid, 'pg_class')
                    FROM pg_catalog.pg_class c
                    JOIN pg_catalog.pg_namespace n ON n.oid = c.relnamespace
                    WHERE n.nspname = $1 AND c.relname = $2
                    "#,
                )
                .bind(self.schema())
                .bind(table)
                .fetch_optional(&self.pool)
                .await
                .map_err(sqlx_error(format!(
                    "Failed to read comment for table '{}'",
                    table
                )))
            })
            .await?;

        Ok(comment.flatten().filter(|c| !c.trim().is_empty()))
    }
}

//! SQLite metadata queries.
//!
//! SQLite stores metadata in `sqlite_master` and exposes details through
//! pragmas. The table-valued pragma functions are used so the table name is
//! always a bound parameter:
//! - `pragma_table_info(?)`: column information
//! - `pragma_index_list(?)` / `pragma_index_info(...)`: indexes and members
//! - `pragma_foreign_key_list(?)`: foreign keys

use super::SqliteAdapter;
use crate::Result;
use crate::adapters::SchemaIntrospector;
use crate::adapters::helpers::{sqlx_error, with_timeout};
use crate::models::{
    ColumnInfo, DatabaseType, ForeignKeyInfo, IndexInfo, KEY_PRIMARY, TableSummary,
    group_index_rows,
};
use async_trait::async_trait;
use sqlx::Row;

#[async_trait]
impl SchemaIntrospector for SqliteAdapter {
    fn database_type(&self) -> DatabaseType {
        DatabaseType::SQLite
    }

    async fn list_tables(&self) -> Result<Vec<TableSummary>> {
        let rows = with_timeout(self.query_timeout(), "list tables", async {
            sqlx::query(
                r#"
                SELECT name
                FROM sqlite_master
                WHERE type = 'table' AND name NOT LIKE 'sqlite\_%' ESCAPE '\'
                ORDER BY name
                "#,
            )
            .fetch_all(&self.pool)
            .await
            .map_err(sqlx_error("Failed to list SQLite tables"))
        })
        .await?;

        let mut tables = Vec::with_capacity(rows.len());
        for row in &rows {
            let name: String = row
                .try_get("name")
                .map_err(sqlx_error("Failed to read table name"))?;
            tables.push(TableSummary::new(name, None));
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
                SELECT name, type, "notnull" AS not_null, dflt_value, pk
                FROM pragma_table_info(?)
                ORDER BY cid
                "#,
            )
            .bind(table)
            .fetch_all(&self.pool)
            .await
            .map_err(sqlx_error(format!(
                "Failed to read columns for table '{}'",
                table
            )))
        })
        .await?;

        let mut raw = Vec::with_capacity(rows.len());
        for row in &rows {
            let name: String = row
                .try_get("name")
                .map_err(sqlx_error("Failed to read column name"))?;
            let data_type: String = row.try_get("type").unwrap_or_default();
            let not_null: i64 = row.try_get("not_null").unwrap_or(0);
            let default: Option<String> = row.try_get("dflt_value").unwrap_or(None);
            let pk: i64 = row.try_get("pk").unwrap_or(0);
            raw.push((name, data_type, not_null, default, pk));
        }

        let pk_count = raw.iter().filter(|(_, _, _, _, pk)| *pk > 0).count();
        let columns = raw
            .into_iter()
            .map(|(name, data_type, not_null, default, pk)| {
                let is_pk = pk > 0;
                // A lone INTEGER PRIMARY KEY aliases the rowid
                let extra = if is_pk && pk_count == 1 && data_type.eq_ignore_ascii_case("INTEGER")
                {
                    "auto_increment".to_string()
                } else {
                    String::new()
                };

                ColumnInfo {
                    name,
                    data_type,
                    // Primary key columns are reported as NOT NULL
                    nullable: not_null == 0 && !is_pk,
                    default,
                    key: if is_pk {
                        KEY_PRIMARY.to_string()
                    } else {
                        String::new()
                    },
                    extra,
                    comment: None,
                }
            })
            .collect();

        Ok(columns)
    }

    async fn indexes(&self, table: &str) -> Result<Vec<IndexInfo>> {
        let rows = with_timeout(self.query_timeout(), "describe indexes", async {
            sqlx::query(
                r#"
                SELECT il.name AS index_name,
                       ii.name AS column_name,
                       il."unique" AS is_unique,
                       il.origin AS origin
                FROM pragma_index_list(?) AS il,
                     pragma_index_info(il.name) AS ii
                ORDER BY il.seq, ii.seqno
                "#,
            )
            .bind(table)
            .fetch_all(&self.pool)
            .await
            .map_err(sqlx_error(format!(
                "Failed to read indexes for table '{}'",
                table
            )))
        })
        .await?;

        let mut entries = Vec::with_capacity(rows.len());
        for row in &rows {
            let index_name: String = row
                .try_get("index_name")
                .map_err(sqlx_error("Failed to read index name"))?;
            // Expression index members have no column name
            let Some(column): Option<String> = row.try_get("column_name").unwrap_or(None) else {
                continue;
            };
            let unique: i64 = row.try_get("is_unique").unwrap_or(0);
            let origin: String = row.try_get("origin").unwrap_or_default();
            let kind = match origin.as_str() {
                "pk" => "PRIMARY",
                "u" => "UNIQUE",
                _ => "INDEX",
            };
            entries.push((index_name, column, unique != 0, Some(kind.to_string())));
        }

        Ok(group_index_rows(entries))
    }

    async fn foreign_keys(&self, table: &str) -> Result<Vec<ForeignKeyInfo>> {
        let rows = with_timeout(self.query_timeout(), "describe foreign keys", async {
            sqlx::query(
                r#"
                SELECT "from" AS from_column, "table" AS ref_table, "to" AS to_column
                FROM pragma_foreign_key_list(?)
                ORDER BY id, seq
                "#,
            )
            .bind(table)
            .fetch_all(&self.pool)
            .await
            .map_err(sqlx_error(format!(
                "Failed to read foreign keys for table '{}'",
                table
            )))
        })
        .await?;

        let mut foreign_keys = Vec::with_capacity(rows.len());
        for row in &rows {
            let column: String = row
                .try_get("from_column")
                .map_err(sqlx_error("Failed to read foreign key column"))?;
            let referenced_table: String = row
                .try_get("ref_table")
                .map_err(sqlx_error("Failed to read referenced table"))?;
            // NULL when the key targets the referenced table's primary key
            let referenced_column: Option<String> = row.try_get("to_column").unwrap_or(None);

            foreign_keys.push(ForeignKeyInfo {
                // SQLite does not keep constraint names outside the DDL text
                name: None,
                column,
                referenced_table,
                referenced_column: referenced_column.unwrap_or_default(),
            });
        }

        Ok(foreign_keys)
    }
}

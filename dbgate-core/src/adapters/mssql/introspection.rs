//! SQL Server metadata queries against the `sys` catalog views.
//!
//! Comments come from the `MS_Description` extended property. Schema and
//! table names are always bound as `@P1`/`@P2`.

use super::SqlServerAdapter;
use crate::Result;
use crate::adapters::SchemaIntrospector;
use crate::error::GateError;
use crate::models::{
    ColumnInfo, DatabaseType, ForeignKeyInfo, IndexInfo, KEY_PRIMARY, TableSummary,
    group_index_rows,
};
use async_trait::async_trait;
use tiberius::Row;

/// Reads a text cell, treating type mismatches as NULL.
fn text(row: &Row, column: &str) -> Option<String> {
    row.try_get::<&str, _>(column)
        .ok()
        .flatten()
        .map(str::to_string)
}

/// Reads a required text cell.
fn required_text(row: &Row, column: &str) -> Result<String> {
    text(row, column).ok_or_else(|| {
        GateError::configuration(format!("SQL Server catalog returned no value for {}", column))
    })
}

fn flag(row: &Row, column: &str) -> bool {
    row.try_get::<bool, _>(column).ok().flatten().unwrap_or(false)
}

/// Renders `sys.columns` type information the way `sp_help` shows it.
fn format_type(type_name: &str, max_length: i16, precision: u8, scale: u8) -> String {
    let lower = type_name.to_ascii_lowercase();
    match lower.as_str() {
        "varchar" | "char" | "varbinary" | "binary" => {
            if max_length == -1 {
                format!("{}(max)", lower)
            } else {
                format!("{}({})", lower, max_length)
            }
        }
        // Lengths of national types are reported in bytes
        "nvarchar" | "nchar" => {
            if max_length == -1 {
                format!("{}(max)", lower)
            } else {
                format!("{}({})", lower, max_length / 2)
            }
        }
        "decimal" | "numeric" => format!("{}({},{})", lower, precision, scale),
        "datetime2" | "time" | "datetimeoffset" => format!("{}({})", lower, scale),
        _ => lower,
    }
}

#[async_trait]
impl SchemaIntrospector for SqlServerAdapter {
    fn database_type(&self) -> DatabaseType {
        DatabaseType::SqlServer
    }

    async fn list_tables(&self) -> Result<Vec<TableSummary>> {
        let rows = self
            .query_rows(
                "list tables",
                "SELECT t.name AS table_name,
                        CAST(ep.value AS NVARCHAR(4000)) AS table_comment
                 FROM sys.tables t
                 JOIN sys.schemas s ON s.schema_id = t.schema_id
                 LEFT JOIN sys.extended_properties ep
                     ON ep.major_id = t.object_id AND ep.minor_id = 0
                     AND ep.class = 1 AND ep.name = 'MS_Description'
                 WHERE s.name = @P1 AND t.is_ms_shipped = 0
                 ORDER BY t.name",
                &[&self.schema()],
            )
            .await?;

        let mut tables = Vec::with_capacity(rows.len());
        for row in &rows {
            tables.push(TableSummary::new(
                required_text(row, "table_name")?,
                text(row, "table_comment"),
            ));
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
        let rows = self
            .query_rows(
                "describe columns",
                "SELECT c.name AS column_name,
                        TYPE_NAME(c.user_type_id) AS type_name,
                        c.max_length, c.precision, c.scale,
                        c.is_nullable, c.is_identity,
                        OBJECT_DEFINITION(c.default_object_id) AS column_default,
                        CAST(ep.value AS NVARCHAR(4000)) AS column_comment,
                        CAST(CASE WHEN EXISTS (
                            SELECT 1 FROM sys.index_columns ic
                            JOIN sys.indexes i
                                ON i.object_id = ic.object_id AND i.index_id = ic.index_id
                            WHERE i.is_primary_key = 1
                              AND ic.object_id = c.object_id
                              AND ic.column_id = c.column_id
                        ) THEN 1 ELSE 0 END AS BIT) AS is_primary
                 FROM sys.columns c
                 JOIN sys.tables t ON t.object_id = c.object_id
                 JOIN sys.schemas s ON s.schema_id = t.schema_id
                 LEFT JOIN sys.extended_properties ep
                     ON ep.major_id = c.object_id AND ep.minor_id = c.column_id
                     AND ep.class = 1 AND ep.name = 'MS_Description'
                 WHERE s.name = @P1 AND t.name = @P2
                 ORDER BY c.column_id",
                &[&self.schema(), &table],
            )
            .await?;

        let mut columns = Vec::with_capacity(rows.len());
        for row in &rows {
            let type_name = text(row, "type_name").unwrap_or_default();
            let max_length = row.try_get::<i16, _>("max_length").ok().flatten().unwrap_or(0);
            let precision = row.try_get::<u8, _>("precision").ok().flatten().unwrap_or(0);
            let scale = row.try_get::<u8, _>("scale").ok().flatten().unwrap_or(0);

            columns.push(ColumnInfo {
                name: required_text(row, "column_name")?,
                data_type: format_type(&type_name, max_length, precision, scale),
                nullable: flag(row, "is_nullable"),
                default: text(row, "column_default"),
                key: if flag(row, "is_primary") {
                    KEY_PRIMARY.to_string()
                } else {
                    String::new()
                },
                extra: if flag(row, "is_identity") {
                    "auto_increment".to_string()
                } else {
                    String::new()
                },
                comment: text(row, "column_comment"),
            });
        }

        Ok(columns)
    }

    async fn indexes(&self, table: &str) -> Result<Vec<IndexInfo>> {
        let rows = self
            .query_rows(
                "describe indexes",
                "SELECT i.name AS index_name,
                        c.name AS column_name,
                        i.is_unique,
                        i.type_desc
                 FROM sys.indexes i
                 JOIN sys.index_columns ic
                     ON ic.object_id = i.object_id AND ic.index_id = i.index_id
                 JOIN sys.columns c
                     ON c.object_id = ic.object_id AND c.column_id = ic.column_id
                 JOIN sys.tables t ON t.object_id = i.object_id
                 JOIN sys.schemas s ON s.schema_id = t.schema_id
                 WHERE s.name = @P1 AND t.name = @P2
                   AND i.name IS NOT NULL
                   AND ic.is_included_column = 0
                 ORDER BY i.is_primary_key DESC, i.name, ic.key_ordinal",
                &[&self.schema(), &table],
            )
            .await?;

        let mut entries = Vec::with_capacity(rows.len());
        for row in &rows {
            entries.push((
                required_text(row, "index_name")?,
                required_text(row, "column_name")?,
                flag(row, "is_unique"),
                text(row, "type_desc"),
            ));
        }

        Ok(group_index_rows(entries))
    }

    async fn foreign_keys(&self, table: &str) -> Result<Vec<ForeignKeyInfo>> {
        let rows = self
            .query_rows(
                "describe foreign keys",
                "SELECT fk.name AS constraint_name,
                        pc.name AS column_name,
                        rt.name AS referenced_table,
                        rc.name AS referenced_column
                 FROM sys.foreign_keys fk
                 JOIN sys.foreign_key_columns fkc
                     ON fkc.constraint_object_id = fk.object_id
                 JOIN sys.tables t ON t.object_id = fk.parent_object_id
                 JOIN sys.schemas s ON s.schema_id = t.schema_id
                 JOIN sys.columns pc
                     ON pc.object_id = fkc.parent_object_id
                     AND pc.column_id = fkc.parent_column_id
                 JOIN sys.tables rt ON rt.object_id = fkc.referenced_object_id
                 JOIN sys.columns rc
                     ON rc.object_id = fkc.referenced_object_id
                     AND rc.column_id = fkc.referenced_column_id
                 WHERE s.name = @P1 AND t.name = @P2
                 ORDER BY fk.name, fkc.constraint_column_id",
                &[&self.schema(), &table],
            )
            .await?;

        let mut foreign_keys = Vec::with_capacity(rows.len());
        for row in &rows {
            foreign_keys.push(ForeignKeyInfo {
                name: text(row, "constraint_name"),
                column: required_text(row, "column_name")?,
                referenced_table: required_text(row, "referenced_table")?,
                referenced_column: text(row, "referenced_column").unwrap_or_default(),
            });
        }

        Ok(foreign_keys)
    }

    async fn table_comment(&self, table: &str) -> Result<Option<String>> {
        let rows = self
            .query_rows(
                "read table comment",
                "SELECT CAST(ep.value AS NVARCHAR(4000)) AS table_comment
                 FROM sys.tables t
                 JOIN sys.schemas s ON s.schema_id = t.schema_id
                 JOIN sys.extended_properties ep
                     ON ep.major_id = t.object_id AND ep.minor_id = 0
                     AND ep.class = 1 AND ep.name = 'MS_Description'
                 WHERE s.name = @P1 AND t.name = @P2",
                &[&self.schema(), &table],
            )
            .await?;

        Ok(rows
            .first()
            .and_then(|row| text(row, "table_comment"))
            .filter(|c| !c.trim().is_empty()))
    }
}

//! Normalized schema metadata shared by every engine.
//!
//! Each introspector maps its catalog rows into these shapes so the guard
//! and the tool layer never see engine-specific metadata.

use serde::{Deserialize, Serialize};

/// Supported database engines
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DatabaseType {
    #[serde(alias = "pgsql", alias = "postgres")]
    PostgreSQL,
    #[serde(alias = "mariadb")]
    MySQL,
    SQLite,
    #[serde(alias = "sqlsrv", alias = "mssql")]
    SqlServer,
}

impl DatabaseType {
    /// Short driver name reported to callers.
    pub fn driver_name(self) -> &'static str {
        match self {
            DatabaseType::PostgreSQL => "pgsql",
            DatabaseType::MySQL => "mysql",
            DatabaseType::SQLite => "sqlite",
            DatabaseType::SqlServer => "sqlsrv",
        }
    }

    /// Parses a configured driver name.
    pub fn from_driver(driver: &str) -> Option<Self> {
        match driver.trim().to_ascii_lowercase().as_str() {
            "pgsql" | "postgres" | "postgresql" => Some(DatabaseType::PostgreSQL),
            "mysql" | "mariadb" => Some(DatabaseType::MySQL),
            "sqlite" | "sqlite3" => Some(DatabaseType::SQLite),
            "sqlsrv" | "mssql" | "sqlserver" => Some(DatabaseType::SqlServer),
            _ => None,
        }
    }

    /// Default TCP port for network engines.
    pub fn default_port(self) -> Option<u16> {
        match self {
            DatabaseType::PostgreSQL => Some(5432),
            DatabaseType::MySQL => Some(3306),
            DatabaseType::SqlServer => Some(1433),
            DatabaseType::SQLite => None,
        }
    }
}

impl std::fmt::Display for DatabaseType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DatabaseType::PostgreSQL => write!(f, "PostgreSQL"),
            DatabaseType::MySQL => write!(f, "MySQL"),
            DatabaseType::SQLite => write!(f, "SQLite"),
            DatabaseType::SqlServer => write!(f, "SQL Server"),
        }
    }
}

/// One entry of a table listing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TableSummary {
    pub name: String,
    pub comment: Option<String>,
}

impl TableSummary {
    pub fn new(name: impl Into<String>, comment: Option<String>) -> Self {
        Self {
            name: name.into(),
            // Engines report "no comment" as an empty string
            comment: comment.filter(|c| !c.is_empty()),
        }
    }
}

/// Column metadata in the caller-facing shape.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColumnInfo {
    pub name: String,
    /// Declared type as the engine reports it, e.g. `varchar(255)`
    #[serde(rename = "type")]
    pub data_type: String,
    pub nullable: bool,
    pub default: Option<String>,
    /// Key role: `PRI`, `UNI`, `MUL` or empty
    pub key: String,
    /// Extra flags such as `auto_increment`
    pub extra: String,
    pub comment: Option<String>,
}

impl ColumnInfo {
    pub fn is_primary_key(&self) -> bool {
        self.key == KEY_PRIMARY
    }
}

/// Key role markers, shared across engines.
pub const KEY_PRIMARY: &str = "PRI";
pub const KEY_UNIQUE: &str = "UNI";
pub const KEY_MULTIPLE: &str = "MUL";

/// Index metadata.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexInfo {
    pub name: String,
    pub columns: Vec<String>,
    pub unique: bool,
    /// Index method (`BTREE`, `btree`, `CLUSTERED`, ...)
    #[serde(rename = "type")]
    pub index_type: Option<String>,
}

/// Foreign key metadata, one entry per referencing column.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ForeignKeyInfo {
    pub name: Option<String>,
    pub column: String,
    pub referenced_table: String,
    pub referenced_column: String,
}

/// Fresh description of one table. Never cached.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SchemaSnapshot {
    pub table: String,
    pub comment: Option<String>,
    pub columns: Vec<ColumnInfo>,
    pub indexes: Vec<IndexInfo>,
    pub foreign_keys: Vec<ForeignKeyInfo>,
}

impl SchemaSnapshot {
    /// Looks up a column by exact name.
    pub fn column(&self, name: &str) -> Option<&ColumnInfo> {
        self.columns.iter().find(|c| c.name == name)
    }

    pub fn has_column(&self, name: &str) -> bool {
        self.column(name).is_some()
    }

    pub fn column_names(&self) -> Vec<String> {
        self.columns.iter().map(|c| c.name.clone()).collect()
    }
}

/// Folds grouped `(index name, column)` rows into ordered indexes.
///
/// Rows must arrive ordered by index name then column position; the first
/// occurrence of an index fixes its place in the output.
pub fn group_index_rows(
    rows: impl IntoIterator<Item = (String, String, bool, Option<String>)>,
) -> Vec<IndexInfo> {
    let mut indexes: Vec<IndexInfo> = Vec::new();
    for (name, column, unique, index_type) in rows {
        match indexes.iter_mut().find(|idx| idx.name == name) {
            Some(existing) => existing.columns.push(column),
            None => indexes.push(IndexInfo {
                name,
                columns: vec![column],
                unique,
                index_type,
            }),
        }
    }
    indexes
}

/// Fills empty column key roles from index membership.
///
/// Keys the engine already reported (e.g. `PRI`) are left alone. A column
/// that alone forms a unique index becomes `UNI`; the leading column of any
/// other index becomes `MUL`.
pub fn assign_key_roles(columns: &mut [ColumnInfo], indexes: &[IndexInfo]) {
    for column in columns.iter_mut().filter(|c| c.key.is_empty()) {
        let sole_unique = indexes
            .iter()
            .any(|idx| idx.unique && idx.columns.len() == 1 && idx.columns[0] == column.name);
        if sole_unique {
            column.key = KEY_UNIQUE.to_string();
        } else if indexes
            .iter()
            .any(|idx| idx.columns.first() == Some(&column.name))
        {
            column.key = KEY_MULTIPLE.to_string();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_driver_names_round_trip() {
        for db in [
            DatabaseType::PostgreSQL,
            DatabaseType::MySQL,
            DatabaseType::SQLite,
            DatabaseType::SqlServer,
        ] {
            assert_eq!(DatabaseType::from_driver(db.driver_name()), Some(db));
        }
        assert_eq!(
            DatabaseType::from_driver(" Postgres "),
            Some(DatabaseType::PostgreSQL)
        );
        assert_eq!(DatabaseType::from_driver("oracle"), None);
    }

    #[test]
    fn test_table_summary_drops_empty_comment() {
        assert_eq!(TableSummary::new("users", Some(String::new())).comment, None);
        assert_eq!(
            TableSummary::new("users", Some("Accounts".to_string())).comment,
            Some("Accounts".to_string())
        );
    }

    #[test]
    fn test_column_serializes_type_key() {
        let column = ColumnInfo {
            name: "id".to_string(),
            data_type: "int(11)".to_string(),
            nullable: false,
            default: None,
            key: KEY_PRIMARY.to_string(),
            extra: "auto_increment".to_string(),
            comment: None,
        };
        let json = serde_json::to_value(&column).unwrap();
        assert_eq!(json["type"], "int(11)");
        assert_eq!(json["nullable"], false);
        assert!(json["default"].is_null());
        assert!(column.is_primary_key());
    }

    #[test]
    fn test_assign_key_roles() {
        let column = |name: &str, key: &str| ColumnInfo {
            name: name.to_string(),
            data_type: "TEXT".to_string(),
            nullable: true,
            default: None,
            key: key.to_string(),
            extra: String::new(),
            comment: None,
        };
        let mut columns = vec![
            column("id", KEY_PRIMARY),
            column("email", ""),
            column("last", ""),
            column("first", ""),
        ];
        let indexes = vec![
            IndexInfo {
                name: "uq_email".to_string(),
                columns: vec!["email".to_string()],
                unique: true,
                index_type: None,
            },
            IndexInfo {
                name: "idx_name".to_string(),
                columns: vec!["last".to_string(), "first".to_string()],
                unique: false,
                index_type: None,
            },
        ];

        assign_key_roles(&mut columns, &indexes);
        assert_eq!(columns[0].key, KEY_PRIMARY);
        assert_eq!(columns[1].key, KEY_UNIQUE);
        assert_eq!(columns[2].key, KEY_MULTIPLE);
        assert_eq!(columns[3].key, "");
    }

    #[test]
    fn test_group_index_rows_preserves_order() {
        let rows = vec![
            ("PRIMARY".to_string(), "id".to_string(), true, Some("BTREE".to_string())),
            ("idx_name".to_string(), "last".to_string(), false, None),
            ("idx_name".to_string(), "first".to_string(), false, None),
        ];
        let indexes = group_index_rows(rows);
        assert_eq!(indexes.len(), 2);
        assert_eq!(indexes[0].name, "PRIMARY");
        assert!(indexes[0].unique);
        assert_eq!(indexes[1].columns, vec!["last", "first"]);
    }
}

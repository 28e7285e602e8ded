//! The tools exposed to clients and their dispatch.
//!
//! [`Gateway`] wires the resolver, guard, inspector and executor together.
//! Each typed method returns `Result<_, ToolError>`; [`Gateway::call_tool`]
//! is the untyped entry point used by the transport and always yields
//! either a JSON result or an [`ErrorPayload`].

use crate::adapters::SchemaIntrospector;
use crate::config::ProjectRegistry;
use crate::executor::select_rows;
use crate::guard;
use crate::models::{ColumnInfo, ForeignKeyInfo, IndexInfo, TableSummary};
use crate::payload::{ErrorPayload, ToolError};
use crate::query::QueryDescription;
use crate::resolver::{ConnectionResolver, ResolvedConnection};
use serde::Serialize;
use serde_json::{Map, Value, json};

pub const LIST_PROJECTS: &str = "list_projects";
pub const LIST_TABLES: &str = "list_tables";
pub const DESCRIBE_TABLE: &str = "describe_table";
pub const SELECT_QUERY: &str = "select_query";

/// Every tool name, in catalogue order.
pub const TOOL_NAMES: [&str; 4] = [LIST_PROJECTS, LIST_TABLES, DESCRIBE_TABLE, SELECT_QUERY];

/// Result of `list_projects`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ProjectList {
    pub projects: Vec<String>,
    pub count: usize,
}

/// Result of `list_tables`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TableListing {
    pub project: String,
    pub database: String,
    pub driver: String,
    pub tables: Vec<TableSummary>,
    pub count: usize,
}

/// Result of `describe_table`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TableDescription {
    pub project: String,
    pub table: String,
    pub columns: Vec<ColumnInfo>,
    pub indexes: Vec<IndexInfo>,
    pub foreign_keys: Vec<ForeignKeyInfo>,
}

/// Pagination metadata of `select_query`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SelectMeta {
    pub project: String,
    pub table: String,
    /// Rows in this page
    pub count: usize,
    pub limit: u32,
    pub offset: u64,
    pub total: u64,
    pub has_more: bool,
}

/// Result of `select_query`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SelectResponse {
    pub rows: Vec<Value>,
    pub meta: SelectMeta,
}

/// Catalogue entry describing one tool.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ToolDefinition {
    pub name: &'static str,
    pub description: &'static str,
    #[serde(rename = "inputSchema")]
    pub input_schema: Value,
}

fn project_property() -> Value {
    json!({
        "type": "string",
        "description": "Project identifier; call list_projects to see the configured ones"
    })
}

/// Name, description and JSON input schema of every tool.
pub fn tool_definitions() -> Vec<ToolDefinition> {
    vec![
        ToolDefinition {
            name: LIST_PROJECTS,
            description: "List the configured project identifiers.",
            input_schema: json!({"type": "object", "properties": {}}),
        },
        ToolDefinition {
            name: LIST_TABLES,
            description: "List the tables of a project's database with their comments.",
            input_schema: json!({
                "type": "object",
                "properties": {"project": project_property()},
                "required": ["project"]
            }),
        },
        ToolDefinition {
            name: DESCRIBE_TABLE,
            description: "Describe a table: columns, indexes and foreign keys.",
            input_schema: json!({
                "type": "object",
                "properties": {
                    "project": project_property(),
                    "table": {"type": "string", "description": "Table name"}
                },
                "required": ["project", "table"]
            }),
        },
        ToolDefinition {
            name: SELECT_QUERY,
            description: "Read rows from a table with optional filters, ordering and paging. \
                          At most 100 rows are returned per call.",
            input_schema: json!({
                "type": "object",
                "properties": {
                    "project": project_property(),
                    "table": {"type": "string", "description": "Table name"},
                    "select": {
                        "type": "array",
                        "items": {"type": "string"},
                        "description": "Columns to return; omit or [\"*\"] for all",
                        "default": ["*"]
                    },
                    "where": {
                        "type": "array",
                        "items": {"type": "array", "minItems": 2, "maxItems": 3},
                        "description": "Conditions combined with AND: [column, value] or \
                                        [column, operator, value]. Operators: =, !=, <>, >, <, \
                                        >=, <=, like, in, not in, is null, is not null",
                        "default": []
                    },
                    "order_by": {
                        "type": "array",
                        "items": {"type": "array", "minItems": 1, "maxItems": 2},
                        "description": "Ordering entries: [column] or [column, \"asc\" | \"desc\"]",
                        "default": []
                    },
                    "limit": {"type": "integer", "minimum": 1, "maximum": 100, "default": 20},
                    "offset": {"type": "integer", "minimum": 0, "default": 0}
                },
                "required": ["project", "table"]
            }),
        },
    ]
}

/// Reads an optional string argument; `null` counts as absent.
fn string_arg<'a>(
    arguments: &'a Map<String, Value>,
    tool: &str,
    name: &str,
) -> Result<Option<&'a str>, ToolError> {
    match arguments.get(name) {
        None | Some(Value::Null) => Ok(None),
        Some(Value::String(s)) => Ok(Some(s.as_str())),
        Some(_) => Err(ToolError::InvalidArgument {
            tool: tool.to_string(),
            parameter: name.to_string(),
            reason: "expected a string".to_string(),
        }),
    }
}

fn required_arg<'a>(
    arguments: &'a Map<String, Value>,
    tool: &str,
    name: &str,
) -> Result<&'a str, ToolError> {
    string_arg(arguments, tool, name)?
        .filter(|s| !s.is_empty())
        .ok_or_else(|| ToolError::MissingArgument {
            tool: tool.to_string(),
            parameter: name.to_string(),
        })
}

/// Serves tool calls against the configured projects.
#[derive(Debug)]
pub struct Gateway {
    resolver: ConnectionResolver,
}

impl Gateway {
    pub fn new(registry: ProjectRegistry) -> Self {
        Self::with_resolver(ConnectionResolver::new(registry))
    }

    pub fn with_resolver(resolver: ConnectionResolver) -> Self {
        Self { resolver }
    }

    pub fn resolver(&self) -> &ConnectionResolver {
        &self.resolver
    }

    /// `list_projects`: configured ids, sorted.
    pub fn list_projects(&self) -> ProjectList {
        let projects = self.resolver.list_available_projects();
        ProjectList {
            count: projects.len(),
            projects,
        }
    }

    /// `list_tables`.
    ///
    /// # Errors
    /// Returns error if the project cannot be resolved or the catalog query
    /// fails
    pub async fn list_tables(&self, project: Option<&str>) -> Result<TableListing, ToolError> {
        let resolved = self.resolver.resolve(project).await?;
        let id = resolved.project.id();

        let tables = resolved
            .adapter
            .list_tables()
            .await
            .map_err(|e| ToolError::infrastructure(id, e))?;

        Ok(TableListing {
            project: id.to_string(),
            database: resolved.project.database_label(),
            driver: resolved.project.database_type().driver_name().to_string(),
            count: tables.len(),
            tables,
        })
    }

    /// `describe_table`. The table must appear in the table listing.
    ///
    /// # Errors
    /// Returns error if the project or table is unknown, or introspection
    /// fails
    pub async fn describe_table(
        &self,
        project: Option<&str>,
        table: &str,
    ) -> Result<TableDescription, ToolError> {
        let resolved = self.resolver.resolve(project).await?;
        describe_resolved(&resolved, table).await
    }

    /// `select_query`: validates the description, then runs it.
    ///
    /// # Errors
    /// Returns error if the project is unknown, the guard rejects the query
    /// or the database fails
    pub async fn select_query(
        &self,
        project: Option<&str>,
        description: &QueryDescription,
    ) -> Result<SelectResponse, ToolError> {
        let resolved = self.resolver.resolve(project).await?;
        select_resolved(&resolved, description).await
    }

    /// Dispatches a call by tool name with raw JSON arguments.
    ///
    /// # Errors
    /// Every failure comes back as a normalized [`ErrorPayload`]
    pub async fn call_tool(&self, name: &str, arguments: &Value) -> Result<Value, ErrorPayload> {
        self.dispatch(name, arguments)
            .await
            .map_err(|e| e.to_payload())
    }

    async fn dispatch(&self, name: &str, arguments: &Value) -> Result<Value, ToolError> {
        let empty = Map::new();
        let arguments = match arguments {
            Value::Object(map) => map,
            Value::Null => &empty,
            _ => {
                return Err(ToolError::InvalidArgument {
                    tool: name.to_string(),
                    parameter: "arguments".to_string(),
                    reason: "expected an object".to_string(),
                });
            }
        };

        let value = match name {
            LIST_PROJECTS => to_value(&self.list_projects()),
            LIST_TABLES => {
                let project = string_arg(arguments, name, "project")?;
                to_value(&self.list_tables(project).await?)
            }
            // The project is resolved before any other argument is checked
            DESCRIBE_TABLE => {
                let project = string_arg(arguments, name, "project")?;
                let resolved = self.resolver.resolve(project).await?;
                let table = required_arg(arguments, name, "table")?;
                to_value(&describe_resolved(&resolved, table).await?)
            }
            SELECT_QUERY => {
                let project = string_arg(arguments, name, "project")?;
                let resolved = self.resolver.resolve(project).await?;
                let table = required_arg(arguments, name, "table")?;
                let description = QueryDescription {
                    table: table.to_string(),
                    select: arguments.get("select").cloned(),
                    filters: arguments.get("where").cloned(),
                    order_by: arguments.get("order_by").cloned(),
                    limit: arguments.get("limit").cloned(),
                    offset: arguments.get("offset").cloned(),
                };
                to_value(&select_resolved(&resolved, &description).await?)
            }
            _ => {
                return Err(ToolError::UnknownTool {
                    name: name.to_string(),
                });
            }
        };

        value.map_err(|e| {
            ToolError::infrastructure(
                string_arg(arguments, name, "project")
                    .ok()
                    .flatten()
                    .unwrap_or_default(),
                crate::error::GateError::Serialization {
                    context: format!("Failed to encode {} result", name),
                    source: e,
                },
            )
        })
    }
}

/// `describe_table` against an already resolved project.
async fn describe_resolved(
    resolved: &ResolvedConnection,
    table: &str,
) -> Result<TableDescription, ToolError> {
    let id = resolved.project.id();
    let adapter = resolved.adapter.as_ref();

    guard::ensure_table_exists(table, adapter)
        .await
        .map_err(|e| ToolError::infrastructure(id, e))?
        .map_err(|rejection| ToolError::Rejected {
            project: id.to_string(),
            rejection,
        })?;

    let snapshot = adapter
        .describe_table(table)
        .await
        .map_err(|e| ToolError::infrastructure(id, e))?;

    Ok(TableDescription {
        project: id.to_string(),
        table: snapshot.table,
        columns: snapshot.columns,
        indexes: snapshot.indexes,
        foreign_keys: snapshot.foreign_keys,
    })
}

async fn select_resolved(
    resolved: &ResolvedConnection,
    description: &QueryDescription,
) -> Result<SelectResponse, ToolError> {
    let id = resolved.project.id();
    let adapter = resolved.adapter.as_ref();

    let validated = guard::validate(description, adapter)
        .await
        .map_err(|e| ToolError::infrastructure(id, e))?
        .map_err(|rejection| ToolError::Rejected {
            project: id.to_string(),
            rejection,
        })?;

    let result = select_rows(&validated, adapter)
        .await
        .map_err(|e| ToolError::infrastructure(id, e))?;

    Ok(SelectResponse {
        meta: SelectMeta {
            project: id.to_string(),
            table: validated.table,
            count: result.rows.len(),
            limit: validated.limit,
            offset: validated.offset,
            total: result.total,
            has_more: result.has_more,
        },
        rows: result.rows,
    })
}

fn to_value<T: Serialize>(value: &T) -> serde_json::Result<Value> {
    serde_json::to_value(value)
}

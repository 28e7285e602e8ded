//! Caller-facing failures and the uniform error payload.
//!
//! Every failure a tool call can produce is a [`ToolError`]; the normalizer
//! ([`to_payload`]) turns it into the single [`ErrorPayload`] shape sent
//! back to clients. `details` is only filled for infrastructure faults and
//! always passes through credential redaction.

use crate::error::GateError;
use crate::guard::Rejection;
use crate::query::{MAX_LIMIT, Operator};
use crate::resolver::ResolveError;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value, json};
use thiserror::Error;

/// How many known columns a column error lists.
pub const MAX_LISTED_COLUMNS: usize = 10;

/// Error categories reported in `ErrorPayload::error`.
pub mod category {
    pub const MISSING_PARAMETER: &str = "Missing Parameter";
    pub const MISSING_REQUIRED_PARAMETER: &str = "Missing Required Parameter";
    pub const PROJECT_NOT_FOUND: &str = "Project Not Found";
    pub const TABLE_NOT_FOUND: &str = "Table Not Found";
    pub const COLUMN_NOT_FOUND: &str = "Column Not Found";
    pub const INVALID_OPERATOR: &str = "Invalid Operator";
    pub const LIMIT_EXCEEDED: &str = "Limit Exceeded";
    pub const INVALID_CONDITION: &str = "Invalid Condition";
    pub const INVALID_PARAMETER: &str = "Invalid Parameter";
    pub const UNKNOWN_TOOL: &str = "Unknown Tool";
    pub const INVALID_REQUEST: &str = "Invalid Request";
    pub const CONNECTION_FAILED: &str = "Database Connection Failed";
    pub const DATABASE_ERROR: &str = "Database Error";
}

/// The only error shape returned to callers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorPayload {
    /// Category, e.g. `Table Not Found`
    pub error: String,
    pub message: String,
    /// Structured context such as the offending identifier and alternatives
    #[serde(flatten)]
    pub context: Map<String, Value>,
    pub hint: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub details: Option<String>,
}

impl ErrorPayload {
    fn new(error: &str, message: impl Into<String>, hint: impl Into<String>) -> Self {
        Self {
            error: error.to_string(),
            message: message.into(),
            context: Map::new(),
            hint: hint.into(),
            details: None,
        }
    }

    /// Payload for a transport frame that could not be read as a request.
    pub fn invalid_request(reason: impl std::fmt::Display) -> Self {
        Self::new(
            category::INVALID_REQUEST,
            format!("Could not read request: {}", reason),
            "Send one JSON object per line: {\"id\": ..., \"tool\": \"...\", \"arguments\": {...}}",
        )
    }

    fn with(mut self, key: &str, value: impl Into<Value>) -> Self {
        self.context.insert(key.to_string(), value.into());
        self
    }

    fn with_details(mut self, error: &GateError) -> Self {
        self.details = Some(error.sanitized_details());
        self
    }
}

/// Any failure of a tool call.
#[derive(Debug, Error)]
pub enum ToolError {
    #[error("No project specified")]
    MissingProject { available_projects: Vec<String> },

    #[error("Project '{project}' is not configured")]
    ProjectNotFound {
        project: String,
        available_projects: Vec<String>,
    },

    #[error("'{parameter}' is required for {tool}")]
    MissingArgument { tool: String, parameter: String },

    #[error("Invalid '{parameter}' for {tool}: {reason}")]
    InvalidArgument {
        tool: String,
        parameter: String,
        reason: String,
    },

    #[error("Unknown tool '{name}'")]
    UnknownTool { name: String },

    /// The query guard refused the request
    #[error("{rejection}")]
    Rejected { project: String, rejection: Rejection },

    #[error("Could not connect to project '{project}'")]
    Connection {
        project: String,
        #[source]
        source: GateError,
    },

    #[error("Database error in project '{project}'")]
    Database {
        project: String,
        #[source]
        source: GateError,
    },
}

impl ToolError {
    /// Wraps an infrastructure fault raised while serving `project`.
    pub fn infrastructure(project: impl Into<String>, source: GateError) -> Self {
        let project = project.into();
        if source.is_connection_failure() {
            Self::Connection { project, source }
        } else {
            Self::Database { project, source }
        }
    }

    /// Normalizes into the caller-facing payload.
    pub fn to_payload(&self) -> ErrorPayload {
        to_payload(self)
    }
}

impl From<ResolveError> for ToolError {
    fn from(error: ResolveError) -> Self {
        match error {
            ResolveError::ProjectMissing { available_projects } => {
                Self::MissingProject { available_projects }
            }
            ResolveError::ProjectNotFound {
                project,
                available_projects,
            } => Self::ProjectNotFound {
                project,
                available_projects,
            },
            // Anything preventing the adapter from existing reads as a
            // connection failure to the caller
            ResolveError::Connection { project, source } => Self::Connection { project, source },
        }
    }
}

/// Maps a failure to its payload.
///
/// # Example
/// ```rust
/// use dbgate_core::payload::{ToolError, to_payload};
///
/// let payload = to_payload(&ToolError::ProjectNotFound {
///     project: "billing".to_string(),
///     available_projects: vec!["crm".to_string(), "shop".to_string()],
/// });
///
/// assert_eq!(payload.error, "Project Not Found");
/// assert_eq!(payload.context["available_projects"], serde_json::json!(["crm", "shop"]));
/// assert!(payload.details.is_none());
/// ```
pub fn to_payload(error: &ToolError) -> ErrorPayload {
    match error {
        ToolError::MissingProject { available_projects } => ErrorPayload::new(
            category::MISSING_PARAMETER,
            "The 'project' parameter is required",
            format!("Pass one of: {}", available_projects.join(", ")),
        )
        .with("parameter", "project")
        .with("available_projects", available_projects.clone()),

        ToolError::ProjectNotFound {
            project,
            available_projects,
        } => ErrorPayload::new(
            category::PROJECT_NOT_FOUND,
            format!("Project '{}' is not configured", project),
            format!("Use one of: {}", available_projects.join(", ")),
        )
        .with("project", project.as_str())
        .with("available_projects", available_projects.clone()),

        ToolError::MissingArgument { tool, parameter } => ErrorPayload::new(
            category::MISSING_REQUIRED_PARAMETER,
            format!("The '{}' parameter is required for {}", parameter, tool),
            format!("Provide '{}' and retry", parameter),
        )
        .with("tool", tool.as_str())
        .with("parameter", parameter.as_str()),

        ToolError::InvalidArgument {
            tool,
            parameter,
            reason,
        } => ErrorPayload::new(
            category::INVALID_PARAMETER,
            format!("Invalid '{}' for {}: {}", parameter, tool, reason),
            "Check the tool's input schema",
        )
        .with("tool", tool.as_str())
        .with("parameter", parameter.as_str()),

        ToolError::UnknownTool { name } => ErrorPayload::new(
            category::UNKNOWN_TOOL,
            format!("Tool '{}' does not exist", name),
            format!("Use one of: {}", crate::tools::TOOL_NAMES.join(", ")),
        )
        .with("tool", name.as_str())
        .with("available_tools", crate::tools::TOOL_NAMES.to_vec()),

        ToolError::Rejected { project, rejection } => rejection_payload(project, rejection),

        ToolError::Connection { project, source } => {
            tracing::error!("Connection failure for project '{}': {}", project, source);
            ErrorPayload::new(
                category::CONNECTION_FAILED,
                format!("Could not connect to the database for project '{}'", project),
                "Check the project's connection settings and that the database server is reachable",
            )
            .with("project", project.as_str())
            .with_details(source)
        }

        ToolError::Database { project, source } => {
            tracing::error!("Database failure for project '{}': {}", project, source);
            ErrorPayload::new(
                category::DATABASE_ERROR,
                format!("The database reported an error for project '{}'", project),
                "Retry later or simplify the request",
            )
            .with("project", project.as_str())
            .with_details(source)
        }
    }
}

fn rejection_payload(project: &str, rejection: &Rejection) -> ErrorPayload {
    let payload = match rejection {
        Rejection::TableNotFound {
            table,
            available_tables,
        } => ErrorPayload::new(
            category::TABLE_NOT_FOUND,
            format!("Table '{}' does not exist in project '{}'", table, project),
            "Call list_tables to see the available tables",
        )
        .with("table", table.as_str())
        .with("available_tables", available_tables.clone()),

        Rejection::ColumnNotFound {
            table,
            column,
            available_columns,
        } => {
            let listed: Vec<String> = available_columns
                .iter()
                .take(MAX_LISTED_COLUMNS)
                .cloned()
                .collect();
            ErrorPayload::new(
                category::COLUMN_NOT_FOUND,
                format!("Column '{}' does not exist in table '{}'", column, table),
                format!(
                    "Available columns include: {}. Call describe_table for the full list",
                    listed.join(", ")
                ),
            )
            .with("table", table.as_str())
            .with("column", column.as_str())
            .with("available_columns", listed)
        }

        Rejection::InvalidOperator { column, operator } => ErrorPayload::new(
            category::INVALID_OPERATOR,
            format!("Operator '{}' is not allowed", operator),
            format!("Use one of: {}", Operator::ALLOWED.join(", ")),
        )
        .with("column", column.as_str())
        .with("operator", operator.as_str())
        .with("allowed_operators", Operator::ALLOWED.to_vec()),

        Rejection::InvalidLimit { value } => ErrorPayload::new(
            category::LIMIT_EXCEEDED,
            format!("Limit must be a positive integer, got {}", value),
            format!(
                "Use a limit between 1 and {}; larger values are reduced to {}",
                MAX_LIMIT, MAX_LIMIT
            ),
        )
        .with("limit", value.as_str())
        .with("max_limit", MAX_LIMIT),

        Rejection::MalformedCondition { index, .. } => ErrorPayload::new(
            category::INVALID_CONDITION,
            rejection.to_string(),
            "Write conditions as [column, value] or [column, operator, value]",
        )
        .with("parameter", "where")
        .with("index", json!(index)),

        Rejection::MalformedOrder { index, .. } => ErrorPayload::new(
            category::INVALID_CONDITION,
            rejection.to_string(),
            "Write ordering as \"column\", [column] or [column, \"asc\" | \"desc\"]",
        )
        .with("parameter", "order_by")
        .with("index", json!(index)),

        Rejection::InvalidOffset { value } => ErrorPayload::new(
            category::INVALID_PARAMETER,
            rejection.to_string(),
            "Use an offset of 0 or more",
        )
        .with("parameter", "offset")
        .with("offset", value.as_str()),

        Rejection::InvalidSelect { .. } => ErrorPayload::new(
            category::INVALID_PARAMETER,
            rejection.to_string(),
            "Pass select as an array of column names, or [\"*\"]",
        )
        .with("parameter", "select"),
    };

    payload
        .with("project", project)
        .with("kind", rejection.kind())
}

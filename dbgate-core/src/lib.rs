//! Core of dbgate, a read-only, project-aware database gateway.
//!
//! A single process serves structured, read-only queries against several
//! independently configured databases ("projects"), selected per call by
//! an identifier.
//!
//! # Security Guarantees
//! - Only SELECT statements are generated, and sessions are opened
//!   read-only wherever the engine supports it
//! - Callers never supply SQL; identifiers are checked against live schema
//!   and quoted, values are always bound parameters
//! - Credentials are held in zeroizing containers and never logged
//!
//! # Architecture
//! - [`resolver`]: project id to a lazily created per-project adapter
//! - [`guard`]: validation of untrusted query descriptions
//! - [`adapters`]: schema introspection and row access per engine
//! - [`executor`]: page plus count execution
//! - [`payload`]: normalization of every failure into one payload shape
//! - [`tools`]: the tool surface tying the above together

pub mod adapters;
pub mod config;
pub mod error;
pub mod executor;
pub mod guard;
pub mod logging;
pub mod models;
pub mod payload;
pub mod query;
pub mod resolver;
pub mod security;
pub mod sql;
pub mod tools;

// Re-export commonly used types
pub use adapters::{DatabaseAdapter, SchemaIntrospector, create_adapter};
pub use config::{ProjectConfig, ProjectRegistry};
pub use error::{GateError, Result};
pub use guard::Rejection;
pub use logging::{LogFormat, init_logging};
pub use models::{ColumnInfo, DatabaseType, ForeignKeyInfo, IndexInfo, SchemaSnapshot, TableSummary};
pub use payload::{ErrorPayload, ToolError};
pub use query::{QueryDescription, ValidatedQuery};
pub use resolver::{ConnectionResolver, ResolveError, ResolvedConnection};
pub use tools::Gateway;

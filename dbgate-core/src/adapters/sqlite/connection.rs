//! SQLite pool creation.
//!
//! # Security Features
//! - Opens databases in read-only mode
//! - Never creates a missing database file
//! - No network access required

use super::SqliteAdapter;
use crate::Result;
use crate::config::ProjectConfig;
use crate::error::GateError;
use sqlx::SqlitePool;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use std::str::FromStr;
use std::time::Duration;

impl SqliteAdapter {
    /// Creates a lazily connecting, read-only adapter for a project.
    ///
    /// # Errors
    /// Returns error if the configured URL cannot be parsed
    pub fn new(config: &ProjectConfig) -> Result<Self> {
        let options = sqlite_connect_options(config)?;

        let pool = SqlitePoolOptions::new()
            .max_connections(config.pool.max_connections)
            .acquire_timeout(config.pool.connect_timeout())
            .idle_timeout(config.pool.idle_timeout())
            .connect_lazy_with(options);

        tracing::info!("Created SQLite pool for {}", config);

        Ok(Self::from_pool(config.id(), pool, config.pool.query_timeout()))
    }

    /// Wraps an existing pool.
    pub fn from_pool(project: impl Into<String>, pool: SqlitePool, query_timeout: Duration) -> Self {
        Self {
            pool,
            project: project.into(),
            query_timeout,
        }
    }
}

/// Builds read-only connect options from a path or `sqlite:` URL.
///
/// # Errors
/// Returns error if the URL form cannot be parsed
pub fn sqlite_connect_options(config: &ProjectConfig) -> Result<SqliteConnectOptions> {
    let options = match config.url() {
        Some(url) => SqliteConnectOptions::from_str(url).map_err(|e| {
            GateError::configuration(format!(
                "project '{}': invalid SQLite URL: {}",
                config.id(),
                e
            ))
        })?,
        None => {
            let path = config.database.as_deref().ok_or_else(|| {
                GateError::configuration(format!(
                    "project '{}': sqlite projects require a database path",
                    config.id()
                ))
            })?;
            SqliteConnectOptions::new().filename(path)
        }
    };

    Ok(options
        .read_only(true)
        .create_if_missing(false)
        .busy_timeout(config.pool.connect_timeout()))
}

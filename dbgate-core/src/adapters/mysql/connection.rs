//! MySQL connection pool management.
//!
//! # Security Features
//! - Enforces connection limits to prevent resource exhaustion
//! - Opens every session read-only
//! - Sets server-side statement timeouts

use super::MySqlAdapter;
use crate::Result;
use crate::config::ProjectConfig;
use crate::error::{GateError, redact_database_url};
use sqlx::MySqlPool;
use sqlx::mysql::{MySqlConnectOptions, MySqlPoolOptions};
use std::str::FromStr;
use std::time::Duration;

impl MySqlAdapter {
    /// Creates a lazily connecting MySQL adapter for a project.
    ///
    /// # Security
    /// - Credentials are read at this point and moved into the driver options
    /// - Sanitizes connection string in all error messages
    ///
    /// # Errors
    /// Returns error if the URL is invalid or credentials cannot be resolved
    pub fn new(config: &ProjectConfig) -> Result<Self> {
        let options = mysql_connect_options(config)?;
        let query_timeout = config.pool.query_timeout();
        let query_timeout_ms = query_timeout.as_millis();

        let pool = MySqlPoolOptions::new()
            .max_connections(config.pool.max_connections)
            .acquire_timeout(config.pool.connect_timeout())
            .idle_timeout(config.pool.idle_timeout())
            .test_before_acquire(true)
            .after_connect(move |conn, _meta| {
                Box::pin(async move {
                    use sqlx::Executor;

                    // Server-side statement timeout
                    conn.execute(format!("SET SESSION max_execution_time = {}", query_timeout_ms).as_str())
                        .await?;

                    // Every transaction in this session is read-only
                    conn.execute("SET SESSION TRANSACTION READ ONLY").await?;

                    // Set timezone to UTC for consistent timestamps
                    conn.execute("SET time_zone = '+00:00'").await?;

                    Ok(())
                })
            })
            .connect_lazy_with(options);

        tracing::info!("Created MySQL pool for {}", config);

        Ok(Self::from_pool(config.id(), pool, query_timeout))
    }

    /// Wraps an existing pool.
    pub fn from_pool(project: impl Into<String>, pool: MySqlPool, query_timeout: Duration) -> Self {
        Self {
            pool,
            project: project.into(),
            query_timeout,
        }
    }
}

/// Builds connect options from a URL or the individual fields.
///
/// # Errors
/// Returns error if the URL cannot be parsed or `password_env` is unset
pub fn mysql_connect_options(config: &ProjectConfig) -> Result<MySqlConnectOptions> {
    let credentials = config.resolve_credentials()?;

    let mut options = match config.url() {
        Some(url) => MySqlConnectOptions::from_str(url).map_err(|e| {
            GateError::configuration(format!(
                "project '{}': invalid MySQL URL {}: {}",
                config.id(),
                redact_database_url(url),
                e
            ))
        })?,
        None => {
            let mut options = MySqlConnectOptions::new()
                .host(config.host.as_deref().unwrap_or("localhost"))
                .port(config.port_or_default().unwrap_or(3306));
            if let Some(database) = &config.database {
                options = options.database(database);
            }
            options
        }
    };

    if !credentials.username().is_empty() {
        options = options.username(credentials.username());
    }
    if let Some(password) = credentials.password() {
        options = options.password(password);
    }
    if let Some(charset) = &config.charset {
        options = options.charset(charset);
    }

    Ok(options)
}

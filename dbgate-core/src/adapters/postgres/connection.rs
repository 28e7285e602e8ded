//! PostgreSQL connection pool management.
//!
//! # Security Features
//! - Enforces connection limits to prevent resource exhaustion
//! - Opens every session with `default_transaction_read_only`
//! - Sets `statement_timeout` from the project's query timeout

use super::{DEFAULT_SCHEMA, PostgresAdapter};
use crate::Result;
use crate::config::ProjectConfig;
use crate::error::{GateError, redact_database_url};
use sqlx::PgPool;
use sqlx::postgres::{PgConnectOptions, PgPoolOptions};
use std::str::FromStr;
use std::time::Duration;

impl PostgresAdapter {
    /// Creates a lazily connecting PostgreSQL adapter for a project.
    ///
    /// # Security
    /// - Enforces read-only mode for every session
    /// - Sets statement_timeout for query safety
    /// - Sanitizes connection string in all error messages
    ///
    /// # Errors
    /// Returns error if the URL is invalid or credentials cannot be resolved
    pub fn new(config: &ProjectConfig) -> Result<Self> {
        let options = pg_connect_options(config)?;

        let pool = PgPoolOptions::new()
            .max_connections(config.pool.max_connections)
            .acquire_timeout(config.pool.connect_timeout())
            .idle_timeout(config.pool.idle_timeout())
            .test_before_acquire(true)
            .connect_lazy_with(options);

        tracing::info!("Created PostgreSQL pool for {}", config);

        Ok(Self::from_pool(
            config.id(),
            pool,
            config.schema.as_deref().unwrap_or(DEFAULT_SCHEMA),
            config.pool.query_timeout(),
        ))
    }

    /// Wraps an existing pool.
    pub fn from_pool(
        project: impl Into<String>,
        pool: PgPool,
        schema: impl Into<String>,
        query_timeout: Duration,
    ) -> Self {
        Self {
            pool,
            project: project.into(),
            schema: schema.into(),
            query_timeout,
        }
    }
}

/// Builds connect options from a URL or the individual fields.
///
/// Session parameters make every transaction read-only and bound each
/// statement by the project's query timeout.
///
/// # Errors
/// Returns error if the URL cannot be parsed or `password_env` is unset
pub fn pg_connect_options(config: &ProjectConfig) -> Result<PgConnectOptions> {
    let credentials = config.resolve_credentials()?;

    let mut options = match config.url() {
        Some(url) => PgConnectOptions::from_str(url).map_err(|e| {
            GateError::configuration(format!(
                "project '{}': invalid PostgreSQL URL {}: {}",
                config.id(),
                redact_database_url(url),
                e
            ))
        })?,
        None => {
            let mut options = PgConnectOptions::new()
                .host(config.host.as_deref().unwrap_or("localhost"))
                .port(config.port_or_default().unwrap_or(5432));
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

    let statement_timeout_ms = config.pool.query_timeout().as_millis().to_string();
    Ok(options.application_name("dbgate").options([
        ("default_transaction_read_only", "on".to_string()),
        ("statement_timeout", statement_timeout_ms),
    ]))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::PoolSettings;
    use crate::models::DatabaseType;

    #[test]
    fn test_connect_options_from_fields() {
        let config = ProjectConfig::new("analytics", DatabaseType::PostgreSQL)
            .with_host("pg.internal")
            .with_port(6432)
            .with_database("warehouse")
            .with_credentials("reader", Some("secret".to_string()));

        let options = pg_connect_options(&config).unwrap();
        assert_eq!(options.get_host(), "pg.internal");
        assert_eq!(options.get_port(), 6432);
        assert_eq!(options.get_database(), Some("warehouse"));
        assert_eq!(options.get_username(), "reader");

        let session = options.get_options().unwrap_or_default();
        assert!(session.contains("default_transaction_read_only=on"));
        assert!(session.contains("statement_timeout=30000"));
    }

    #[test]
    fn test_connect_options_honor_query_timeout() {
        let pool = PoolSettings {
            query_timeout_secs: 5,
            ..PoolSettings::default()
        };
        let config = ProjectConfig::new("analytics", DatabaseType::PostgreSQL)
            .with_url("postgres://reader@pg.internal/warehouse")
            .with_pool(pool);

        let options = pg_connect_options(&config).unwrap();
        assert_eq!(options.get_host(), "pg.internal");
        assert!(
            options
                .get_options()
                .unwrap_or_default()
                .contains("statement_timeout=5000")
        );
    }

    #[tokio::test]
    async fn test_adapter_uses_configured_schema() {
        let config = ProjectConfig::new("analytics", DatabaseType::PostgreSQL)
            .with_host("127.0.0.1")
            .with_port(1)
            .with_schema("reporting");

        let adapter = PostgresAdapter::new(&config).unwrap();
        assert_eq!(adapter.schema(), "reporting");
        assert_eq!(adapter.project(), "analytics");
    }
}

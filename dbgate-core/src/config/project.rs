//! Per-project connection configuration.
//!
//! A project is one independently configured database. The on-disk entry
//! ([`ProjectEntry`]) is validated into an immutable [`ProjectConfig`] when
//! the registry loads; the password is only read from the environment when
//! the project's pool is first created.

use crate::error::{GateError, redact_database_url};
use crate::models::DatabaseType;
use crate::security::Credentials;
use crate::Result;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Pool and timeout settings for one project.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PoolSettings {
    /// Maximum number of pooled connections
    pub max_connections: u32,
    /// Seconds to wait when establishing or acquiring a connection
    pub connect_timeout_secs: u64,
    /// Upper bound for any single database round trip
    pub query_timeout_secs: u64,
    /// Idle connections are closed after this many seconds
    pub idle_timeout_secs: u64,
}

impl Default for PoolSettings {
    fn default() -> Self {
        Self {
            max_connections: 5,
            connect_timeout_secs: 10,
            query_timeout_secs: 30,
            idle_timeout_secs: 300,
        }
    }
}

impl PoolSettings {
    /// Validates pool settings.
    ///
    /// # Errors
    /// Returns error if values are zero or unreasonably large
    pub fn validate(&self) -> Result<()> {
        if self.max_connections == 0 {
            return Err(GateError::configuration(
                "max_connections must be greater than 0",
            ));
        }

        if self.max_connections > 100 {
            return Err(GateError::configuration(
                "max_connections should not exceed 100 for safety",
            ));
        }

        if self.connect_timeout_secs == 0 {
            return Err(GateError::configuration(
                "connect_timeout_secs must be greater than 0",
            ));
        }

        if self.query_timeout_secs == 0 {
            return Err(GateError::configuration(
                "query_timeout_secs must be greater than 0",
            ));
        }

        Ok(())
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs)
    }

    pub fn query_timeout(&self) -> Duration {
        Duration::from_secs(self.query_timeout_secs)
    }

    pub fn idle_timeout(&self) -> Duration {
        Duration::from_secs(self.idle_timeout_secs)
    }
}

/// One project as written in the configuration file.
#[derive(Clone, Default, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ProjectEntry {
    pub driver: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub host: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub port: Option<u16>,
    /// Database name, or file path for SQLite
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub database: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,
    #[serde(default, skip_serializing)]
    pub password: Option<String>,
    /// Environment variable holding the password; wins over `password`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub password_env: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub charset: Option<String>,
    /// Schema searched by Postgres and SQL Server introspection
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub schema: Option<String>,
    /// Full connection URL (ADO string for SQL Server); overrides the
    /// individual fields
    #[serde(default, skip_serializing)]
    pub url: Option<String>,
    #[serde(default)]
    pub pool: PoolSettings,
}

/// Immutable, validated configuration for one project.
///
/// # Security
/// `Display` never includes credentials or the raw URL. `Debug` redacts the
/// password, including one embedded in the URL.
///
/// # Example
/// ```rust
/// use dbgate_core::config::ProjectConfig;
/// use dbgate_core::models::DatabaseType;
///
/// let config = ProjectConfig::new("analytics", DatabaseType::PostgreSQL)
///     .with_host("db.internal")
///     .with_port(5432)
///     .with_database("warehouse")
///     .with_credentials("reader", Some("secret".to_string()));
///
/// assert!(config.validate().is_ok());
/// assert!(!config.to_string().contains("secret"));
/// ```
#[derive(Clone)]
pub struct ProjectConfig {
    id: String,
    database_type: DatabaseType,
    pub host: Option<String>,
    pub port: Option<u16>,
    pub database: Option<String>,
    credentials: Credentials,
    password_env: Option<String>,
    pub charset: Option<String>,
    pub schema: Option<String>,
    url: Option<String>,
    pub pool: PoolSettings,
}

impl ProjectConfig {
    /// Creates a project config with default pool settings.
    pub fn new(id: impl Into<String>, database_type: DatabaseType) -> Self {
        Self {
            id: id.into(),
            database_type,
            host: None,
            port: None,
            database: None,
            credentials: Credentials::default(),
            password_env: None,
            charset: None,
            schema: None,
            url: None,
            pool: PoolSettings::default(),
        }
    }

    /// Shorthand for a file-backed SQLite project.
    pub fn sqlite(id: impl Into<String>, path: impl Into<String>) -> Self {
        Self::new(id, DatabaseType::SQLite).with_database(path)
    }

    /// Builds a validated config from a file entry.
    ///
    /// # Errors
    /// Returns a configuration error naming the project when the driver is
    /// unknown or required fields are missing
    pub fn from_entry(id: &str, entry: ProjectEntry) -> Result<Self> {
        let database_type = DatabaseType::from_driver(&entry.driver).ok_or_else(|| {
            GateError::configuration(format!(
                "project '{}': unknown driver '{}' (expected mysql, pgsql, sqlite or sqlsrv)",
                id, entry.driver
            ))
        })?;

        let config = Self {
            id: id.to_string(),
            database_type,
            host: entry.host,
            port: entry.port,
            database: entry.database,
            credentials: Credentials::new(entry.username.unwrap_or_default(), entry.password),
            password_env: entry.password_env,
            charset: entry.charset,
            schema: entry.schema,
            url: entry.url,
            pool: entry.pool,
        };
        config.validate()?;
        Ok(config)
    }

    /// Validates connection parameters.
    ///
    /// # Errors
    /// Returns error if configuration values are invalid or unsafe
    pub fn validate(&self) -> Result<()> {
        let fail = |message: &str| {
            Err(GateError::configuration(format!(
                "project '{}': {}",
                self.id, message
            )))
        };

        if self.id.trim().is_empty() {
            return Err(GateError::configuration("project id cannot be empty"));
        }

        if let Some(url) = &self.url {
            if url.trim().is_empty() {
                return fail("url cannot be empty");
            }
        } else {
            match self.database_type {
                DatabaseType::SQLite => {
                    if self.database.as_deref().is_none_or(|d| d.trim().is_empty()) {
                        return fail("sqlite projects require a database path");
                    }
                }
                _ => {
                    if self.host.as_deref().is_none_or(|h| h.trim().is_empty()) {
                        return fail("host cannot be empty");
                    }
                }
            }
        }

        if self.port == Some(0) {
            return fail("port must be greater than 0");
        }

        self.pool
            .validate()
            .map_err(|e| GateError::configuration(format!("project '{}': {}", self.id, e)))
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn database_type(&self) -> DatabaseType {
        self.database_type
    }

    /// Full connection URL when one was configured.
    ///
    /// May contain a password; pass through [`crate::error::redact_database_url`]
    /// before logging.
    pub fn url(&self) -> Option<&str> {
        self.url.as_deref()
    }

    /// Port, falling back to the engine default.
    pub fn port_or_default(&self) -> Option<u16> {
        self.port.or_else(|| self.database_type.default_port())
    }

    /// Database name reported to callers.
    ///
    /// Falls back to the path component of a configured URL.
    pub fn database_label(&self) -> String {
        if let Some(database) = &self.database {
            return database.clone();
        }
        self.url
            .as_deref()
            .and_then(|u| url::Url::parse(u).ok())
            .map(|u| u.path().trim_start_matches('/').to_string())
            .unwrap_or_default()
    }

    /// Materializes credentials for connecting.
    ///
    /// `password_env` is read here, at pool creation time, so rotated
    /// secrets are picked up by the next process that connects.
    ///
    /// # Errors
    /// Returns a configuration error when `password_env` names an unset
    /// variable
    pub fn resolve_credentials(&self) -> Result<Credentials> {
        match &self.password_env {
            Some(var) => {
                let password = std::env::var(var).map_err(|_| {
                    GateError::configuration(format!(
                        "project '{}': environment variable '{}' is not set",
                        self.id, var
                    ))
                })?;
                Ok(self.credentials.clone().with_password(Some(password)))
            }
            None => Ok(self.credentials.clone()),
        }
    }

    /// Builder method to set host.
    pub fn with_host(mut self, host: impl Into<String>) -> Self {
        self.host = Some(host.into());
        self
    }

    /// Builder method to set port.
    pub fn with_port(mut self, port: u16) -> Self {
        self.port = Some(port);
        self
    }

    /// Builder method to set database name or SQLite path.
    pub fn with_database(mut self, database: impl Into<String>) -> Self {
        self.database = Some(database.into());
        self
    }

    /// Builder method to set username and inline password.
    pub fn with_credentials(mut self, username: impl Into<String>, password: Option<String>) -> Self {
        self.credentials = Credentials::new(username.into(), password);
        self
    }

    /// Builder method to read the password from an environment variable.
    pub fn with_password_env(mut self, var: impl Into<String>) -> Self {
        self.password_env = Some(var.into());
        self
    }

    /// Builder method to set the introspected schema.
    pub fn with_schema(mut self, schema: impl Into<String>) -> Self {
        self.schema = Some(schema.into());
        self
    }

    /// Builder method to connect through a full URL.
    pub fn with_url(mut self, url: impl Into<String>) -> Self {
        self.url = Some(url.into());
        self
    }

    /// Builder method to replace pool settings.
    pub fn with_pool(mut self, pool: PoolSettings) -> Self {
        self.pool = pool;
        self
    }
}

impl std::fmt::Debug for ProjectEntry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProjectEntry")
            .field("driver", &self.driver)
            .field("host", &self.host)
            .field("port", &self.port)
            .field("database", &self.database)
            .field("username", &self.username)
            .field("password", &self.password.as_ref().map(|_| "****"))
            .field("password_env", &self.password_env)
            .field("charset", &self.charset)
            .field("schema", &self.schema)
            .field("url", &self.url.as_deref().map(redact_database_url))
            .field("pool", &self.pool)
            .finish()
    }
}

impl std::fmt::Debug for ProjectConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProjectConfig")
            .field("id", &self.id)
            .field("database_type", &self.database_type)
            .field("host", &self.host)
            .field("port", &self.port)
            .field("database", &self.database)
            .field("credentials", &self.credentials)
            .field("password_env", &self.password_env)
            .field("charset", &self.charset)
            .field("schema", &self.schema)
            .field("url", &self.url.as_deref().map(redact_database_url))
            .field("pool", &self.pool)
            .finish()
    }
}

impl std::fmt::Display for ProjectConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        // Intentionally omit username, password and raw URL
        if self.url.is_some() {
            return write!(
                f,
                "{} ({}, url, db={})",
                self.id,
                self.database_type.driver_name(),
                self.database_label()
            );
        }
        match self.database_type {
            DatabaseType::SQLite => write!(
                f,
                "{} (sqlite, {})",
                self.id,
                self.database.as_deref().unwrap_or_default()
            ),
            _ => write!(
                f,
                "{} ({}, {}{}{})",
                self.id,
                self.database_type.driver_name(),
                self.host.as_deref().unwrap_or_default(),
                self.port_or_default()
                    .map_or_else(String::new, |p| format!(":{}", p)),
                self.database
                    .as_ref()
                    .map_or_else(String::new, |db| format!("/{}", db))
            ),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn mysql_entry() -> ProjectEntry {
        ProjectEntry {
            driver: "mysql".to_string(),
            host: Some("127.0.0.1".to_string()),
            database: Some("shop".to_string()),
            username: Some("reader".to_string()),
            password: Some("s3cret".to_string()),
            ..Default::default()
        }
    }

    #[test]
    fn test_pool_settings_default() {
        let pool = PoolSettings::default();
        assert_eq!(pool.max_connections, 5);
        assert_eq!(pool.query_timeout(), Duration::from_secs(30));
        assert!(pool.validate().is_ok());
    }

    #[test]
    fn test_pool_settings_validation() {
        let pool = PoolSettings {
            max_connections: 0,
            ..Default::default()
        };
        assert!(pool.validate().is_err());

        let pool = PoolSettings {
            max_connections: 101,
            ..Default::default()
        };
        assert!(pool.validate().is_err());

        let pool = PoolSettings {
            query_timeout_secs: 0,
            ..Default::default()
        };
        assert!(pool.validate().is_err());
    }

    #[test]
    fn test_from_entry_accepts_driver_aliases() {
        for driver in ["mysql", "pgsql", "postgres", "sqlsrv", "mssql"] {
            let entry = ProjectEntry {
                driver: driver.to_string(),
                ..mysql_entry()
            };
            assert!(ProjectConfig::from_entry("p1", entry).is_ok(), "{}", driver);
        }
    }

    #[test]
    fn test_from_entry_rejects_unknown_driver() {
        let entry = ProjectEntry {
            driver: "oracle".to_string(),
            ..mysql_entry()
        };
        let err = ProjectConfig::from_entry("legacy", entry).unwrap_err();
        assert!(err.to_string().contains("legacy"));
        assert!(err.to_string().contains("oracle"));
    }

    #[test]
    fn test_validation_requires_host_or_path() {
        let entry = ProjectEntry {
            host: None,
            ..mysql_entry()
        };
        assert!(ProjectConfig::from_entry("p1", entry).is_err());

        let entry = ProjectEntry {
            driver: "sqlite".to_string(),
            host: None,
            database: None,
            ..Default::default()
        };
        assert!(ProjectConfig::from_entry("p1", entry).is_err());

        // A URL replaces the individual fields
        let entry = ProjectEntry {
            host: None,
            url: Some("mysql://reader@db/shop".to_string()),
            ..mysql_entry()
        };
        assert!(ProjectConfig::from_entry("p1", entry).is_ok());
    }

    #[test]
    fn test_validation_rejects_zero_port() {
        let config = ProjectConfig::new("p1", DatabaseType::PostgreSQL)
            .with_host("localhost")
            .with_port(0);
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_display_omits_credentials() {
        let config = ProjectConfig::from_entry("shop", mysql_entry()).unwrap();
        let display = config.to_string();

        assert!(display.contains("127.0.0.1:3306"));
        assert!(display.contains("/shop"));
        assert!(!display.contains("reader"));
        assert!(!display.contains("s3cret"));

        let config = config.with_url("mysql://reader:s3cret@db/shop");
        let display = config.to_string();
        assert!(!display.contains("s3cret"));
        assert!(!format!("{:?}", config).contains("s3cret"));
    }

    #[test]
    fn test_debug_redacts_passwords() {
        let entry = ProjectEntry {
            url: Some("mysql://reader:s3cret@db/shop".to_string()),
            ..mysql_entry()
        };
        let debug = format!("{:?}", entry);
        assert!(!debug.contains("s3cret"));
        assert!(debug.contains("mysql://reader:****@db/shop"));

        let config = ProjectConfig::from_entry("shop", entry).unwrap();
        let debug = format!("{:?}", config);
        assert!(!debug.contains("s3cret"));
        assert!(debug.contains("mysql://reader:****@db/shop"));

        let config = ProjectConfig::new("legacy", DatabaseType::SqlServer)
            .with_url("server=tcp:erp,1433;user=reader;password=hunter2");
        assert!(!format!("{:?}", config).contains("hunter2"));
    }

    #[test]
    fn test_database_label_from_url() {
        let config = ProjectConfig::new("p1", DatabaseType::PostgreSQL)
            .with_url("postgres://reader@db:5432/warehouse");
        assert_eq!(config.database_label(), "warehouse");

        let config = ProjectConfig::sqlite("local", "/tmp/app.db");
        assert_eq!(config.database_label(), "/tmp/app.db");
    }

    #[test]
    fn test_resolve_credentials_reads_env() {
        let config = ProjectConfig::new("p1", DatabaseType::MySQL)
            .with_host("localhost")
            .with_credentials("reader", Some("inline".to_string()))
            .with_password_env("DBGATE_TEST_PROJECT_PASSWORD");

        temp_env::with_var("DBGATE_TEST_PROJECT_PASSWORD", Some("from-env"), || {
            let creds = config.resolve_credentials().unwrap();
            assert_eq!(creds.username(), "reader");
            assert_eq!(creds.password(), Some("from-env"));
        });

        temp_env::with_var_unset("DBGATE_TEST_PROJECT_PASSWORD", || {
            let err = config.resolve_credentials().unwrap_err();
            assert!(err.to_string().contains("DBGATE_TEST_PROJECT_PASSWORD"));
        });
    }
}

//! Static project registry loaded once at startup.

use super::project::{ProjectConfig, ProjectEntry};
use crate::error::GateError;
use crate::Result;
use serde::Deserialize;
use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Arc;

/// Environment variable naming the configuration file.
pub const CONFIG_ENV_VAR: &str = "DBGATE_CONFIG";

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct ConfigFile {
    projects: BTreeMap<String, ProjectEntry>,
}

/// Immutable map of project id to configuration.
///
/// Ids are kept sorted so every listing is deterministic.
///
/// # Example
/// ```rust
/// use dbgate_core::config::ProjectRegistry;
///
/// let registry = ProjectRegistry::from_json_str(r#"{
///     "projects": {
///         "shop": {"driver": "sqlite", "database": "/var/lib/shop.db"},
///         "crm": {"driver": "pgsql", "host": "db.internal", "database": "crm"}
///     }
/// }"#)?;
///
/// assert_eq!(registry.project_ids(), vec!["crm", "shop"]);
/// # Ok::<(), dbgate_core::GateError>(())
/// ```
#[derive(Debug, Clone, Default)]
pub struct ProjectRegistry {
    projects: BTreeMap<String, Arc<ProjectConfig>>,
}

impl ProjectRegistry {
    /// Builds a registry from already constructed configs.
    ///
    /// # Errors
    /// Returns error if the set is empty, an id repeats or a config is invalid
    pub fn new(configs: impl IntoIterator<Item = ProjectConfig>) -> Result<Self> {
        let mut projects = BTreeMap::new();
        for config in configs {
            config.validate()?;
            let id = config.id().to_string();
            if projects.insert(id.clone(), Arc::new(config)).is_some() {
                return Err(GateError::configuration(format!(
                    "duplicate project id '{}'",
                    id
                )));
            }
        }

        if projects.is_empty() {
            return Err(GateError::configuration("no projects configured"));
        }

        Ok(Self { projects })
    }

    /// Parses the JSON configuration format.
    ///
    /// # Errors
    /// Returns error on malformed JSON or invalid project entries
    pub fn from_json_str(json: &str) -> Result<Self> {
        let file: ConfigFile =
            serde_json::from_str(json).map_err(|e| GateError::Serialization {
                context: "Failed to parse project configuration".to_string(),
                source: e,
            })?;

        let mut configs = Vec::with_capacity(file.projects.len());
        for (id, entry) in file.projects {
            if id.trim().is_empty() {
                return Err(GateError::configuration("project id cannot be empty"));
            }
            configs.push(ProjectConfig::from_entry(&id, entry)?);
        }

        Self::new(configs)
    }

    /// Loads the configuration file at `path`.
    ///
    /// # Errors
    /// Returns error if the file cannot be read or is invalid
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path).map_err(|e| GateError::Io {
            context: format!("Failed to read configuration file {}", path.display()),
            source: e,
        })?;

        let registry = Self::from_json_str(&contents)?;
        tracing::info!(
            "Loaded {} project(s) from {}",
            registry.len(),
            path.display()
        );
        Ok(registry)
    }

    /// Loads the file named by `DBGATE_CONFIG`.
    ///
    /// # Errors
    /// Returns error if the variable is unset or the file is invalid
    pub fn from_env() -> Result<Self> {
        let path = std::env::var(CONFIG_ENV_VAR).map_err(|_| {
            GateError::configuration(format!(
                "no configuration file given: pass --config or set {}",
                CONFIG_ENV_VAR
            ))
        })?;
        Self::from_file(path)
    }

    /// Looks up a project by exact id.
    pub fn get(&self, id: &str) -> Option<Arc<ProjectConfig>> {
        self.projects.get(id).cloned()
    }

    pub fn contains(&self, id: &str) -> bool {
        self.projects.contains_key(id)
    }

    /// All configured ids in lexicographic order.
    pub fn project_ids(&self) -> Vec<String> {
        self.projects.keys().cloned().collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Arc<ProjectConfig>> {
        self.projects.values()
    }

    pub fn len(&self) -> usize {
        self.projects.len()
    }

    pub fn is_empty(&self) -> bool {
        self.projects.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::DatabaseType;

    #[test]
    fn test_ids_are_sorted() {
        let registry = ProjectRegistry::new([
            ProjectConfig::sqlite("zeta", "/tmp/z.db"),
            ProjectConfig::sqlite("alpha", "/tmp/a.db"),
            ProjectConfig::sqlite("mid", "/tmp/m.db"),
        ])
        .unwrap();

        assert_eq!(registry.project_ids(), vec!["alpha", "mid", "zeta"]);
        assert!(registry.contains("mid"));
        assert!(registry.get("missing").is_none());
    }

    #[test]
    fn test_rejects_empty_and_duplicate() {
        assert!(ProjectRegistry::new(Vec::new()).is_err());

        let err = ProjectRegistry::new([
            ProjectConfig::sqlite("dup", "/tmp/a.db"),
            ProjectConfig::sqlite("dup", "/tmp/b.db"),
        ])
        .unwrap_err();
        assert!(err.to_string().contains("duplicate"));
    }

    #[test]
    fn test_from_json_str() {
        let registry = ProjectRegistry::from_json_str(
            r#"{
                "projects": {
                    "shop": {
                        "driver": "mysql",
                        "host": "127.0.0.1",
                        "database": "shop",
                        "username": "reader",
                        "password_env": "SHOP_DB_PASSWORD",
                        "charset": "utf8mb4",
                        "pool": {"max_connections": 3}
                    },
                    "local": {"driver": "sqlite", "database": "/tmp/local.db"}
                }
            }"#,
        )
        .unwrap();

        let shop = registry.get("shop").unwrap();
        assert_eq!(shop.database_type(), DatabaseType::MySQL);
        assert_eq!(shop.charset.as_deref(), Some("utf8mb4"));
        assert_eq!(shop.pool.max_connections, 3);
        assert_eq!(shop.pool.query_timeout_secs, 30);
    }

    #[test]
    fn test_from_json_str_rejects_unknown_fields() {
        let result = ProjectRegistry::from_json_str(
            r#"{"projects": {"p": {"driver": "sqlite", "database": "x.db", "pasword": "typo"}}}"#,
        );
        assert!(matches!(result, Err(GateError::Serialization { .. })));
    }

    #[test]
    fn test_from_json_str_rejects_blank_id() {
        let result = ProjectRegistry::from_json_str(
            r#"{"projects": {"  ": {"driver": "sqlite", "database": "x.db"}}}"#,
        );
        assert!(result.is_err());
    }
}

//! Configuration file loading and its effect on the tool surface.

use dbgate_core::config::{CONFIG_ENV_VAR, ProjectRegistry};
use dbgate_core::models::DatabaseType;
use std::io::Write;
use tempfile::NamedTempFile;

const CONFIG: &str = r#"{
    "projects": {
        "shop": {"driver": "sqlite", "database": "/var/lib/dbgate/shop.db"},
        "crm": {
            "driver": "pgsql",
            "host": "db.internal",
            "database": "crm",
            "username": "reader",
            "password_env": "DBGATE_TEST_CRM_PASSWORD_UNSET",
            "schema": "sales",
            "pool": {"max_connections": 2, "query_timeout_secs": 5}
        },
        "legacy": {
            "driver": "sqlsrv",
            "url": "server=tcp:legacy.internal,1433;database=erp;user=reader;password=secret"
        }
    }
}"#;

fn write_config(contents: &str) -> NamedTempFile {
    let mut file = NamedTempFile::new().unwrap();
    file.write_all(contents.as_bytes()).unwrap();
    file
}

#[test]
fn test_load_from_file() {
    let file = write_config(CONFIG);
    let registry = ProjectRegistry::from_file(file.path()).unwrap();

    assert_eq!(registry.project_ids(), vec!["crm", "legacy", "shop"]);

    let crm = registry.get("crm").unwrap();
    assert_eq!(crm.database_type(), DatabaseType::PostgreSQL);
    assert_eq!(crm.schema.as_deref(), Some("sales"));
    assert_eq!(crm.pool.max_connections, 2);
    assert_eq!(crm.pool.query_timeout_secs, 5);
    // Unspecified pool fields keep their defaults
    assert_eq!(crm.pool.connect_timeout_secs, 10);
    assert_eq!(crm.port_or_default(), Some(5432));

    let legacy = registry.get("legacy").unwrap();
    assert_eq!(legacy.database_type(), DatabaseType::SqlServer);
    assert!(!legacy.to_string().contains("secret"));
}

#[test]
fn test_load_from_env() {
    let file = write_config(CONFIG);
    let path = file.path().to_string_lossy().to_string();

    let registry = temp_env::with_var(CONFIG_ENV_VAR, Some(&path), ProjectRegistry::from_env)
        .unwrap();
    assert_eq!(registry.len(), 3);

    let error = temp_env::with_var_unset(CONFIG_ENV_VAR, ProjectRegistry::from_env).unwrap_err();
    assert!(error.to_string().contains(CONFIG_ENV_VAR));
}

#[test]
fn test_missing_file_and_invalid_contents() {
    let error = ProjectRegistry::from_file("/nonexistent/dbgate/projects.json").unwrap_err();
    assert!(error.to_string().contains("I/O"));

    let file = write_config(r#"{"projects": {"shop": {"driver": "oracle", "host": "x"}}}"#);
    let error = ProjectRegistry::from_file(file.path()).unwrap_err();
    assert!(error.to_string().contains("shop"));
    assert!(error.to_string().contains("oracle"));

    let file = write_config(r#"{"projects": {}}"#);
    assert!(ProjectRegistry::from_file(file.path()).is_err());
}

/// An unset `password_env` only fails when the project is first used, and
/// only that project.
#[cfg(all(feature = "postgresql", feature = "sqlite"))]
#[tokio::test]
async fn test_unset_password_env_fails_at_first_use() {
    use dbgate_core::Gateway;
    use serde_json::json;

    let file = write_config(CONFIG);
    let gateway = Gateway::new(ProjectRegistry::from_file(file.path()).unwrap());

    let payload = gateway
        .call_tool("list_tables", &json!({"project": "crm"}))
        .await
        .unwrap_err();
    assert_eq!(payload.error, "Database Connection Failed");
    assert!(
        payload
            .details
            .as_deref()
            .is_some_and(|d| d.contains("DBGATE_TEST_CRM_PASSWORD_UNSET"))
    );

    let projects = gateway.call_tool("list_projects", &json!({})).await.unwrap();
    assert_eq!(projects["count"], json!(3));
    assert_eq!(gateway.resolver().open_projects(), 0);
}

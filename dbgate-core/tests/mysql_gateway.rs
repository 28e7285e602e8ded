//! MySQL gateway tests.
//!
//! Container-backed tests need Docker and are ignored by default.

#![cfg(feature = "mysql")]

use dbgate_core::adapters::mysql::MySqlAdapter;
use dbgate_core::config::PoolSettings;
use dbgate_core::models::DatabaseType;
use dbgate_core::{Gateway, ProjectConfig, ProjectRegistry};
use serde_json::{Value, json};
use sqlx::MySqlPool;
use std::time::Duration;
use testcontainers_modules::{mysql::Mysql, testcontainers::runners::AsyncRunner};

/// Wait for MySQL to be ready to accept connections
async fn wait_for_mysql_ready(database_url: &str, max_attempts: u32) -> MySqlPool {
    for _ in 0..max_attempts {
        if let Ok(pool) = MySqlPool::connect(database_url).await {
            if sqlx::query("SELECT 1").fetch_one(&pool).await.is_ok() {
                return pool;
            }
            pool.close().await;
        }
        tokio::time::sleep(Duration::from_millis(500)).await;
    }
    panic!("MySQL did not become ready after {} attempts", max_attempts);
}

async fn seed(pool: &MySqlPool) {
    for statement in [
        "CREATE TABLE users (
            id INT AUTO_INCREMENT PRIMARY KEY,
            email VARCHAR(255) NOT NULL UNIQUE COMMENT 'Login address',
            name VARCHAR(100),
            active TINYINT(1) NOT NULL DEFAULT 1,
            balance DECIMAL(10, 2)
        ) COMMENT = 'Registered customers'",
        "CREATE TABLE orders (
            id INT AUTO_INCREMENT PRIMARY KEY,
            user_id INT NOT NULL,
            total DECIMAL(10, 2) NOT NULL,
            INDEX idx_orders_user (user_id),
            CONSTRAINT fk_orders_user FOREIGN KEY (user_id) REFERENCES users(id)
        )",
        "CREATE VIEW active_users AS SELECT * FROM users WHERE active = 1",
    ] {
        sqlx::query(statement).execute(pool).await.unwrap();
    }

    for i in 1..=25_i64 {
        sqlx::query("INSERT INTO users (email, name, active, balance) VALUES (?, ?, ?, ?)")
            .bind(format!("user{}@example.com", i))
            .bind(format!("User {}", i))
            .bind(i <= 10)
            .bind(i as f64 * 1.25)
            .execute(pool)
            .await
            .unwrap();
    }
    sqlx::query("INSERT INTO orders (user_id, total) VALUES (1, 19.99), (1, 5.00), (2, 42.50)")
        .execute(pool)
        .await
        .unwrap();
}

fn project(port: u16) -> ProjectConfig {
    ProjectConfig::new("shop", DatabaseType::MySQL)
        .with_host("127.0.0.1")
        .with_port(port)
        .with_database("test")
        .with_credentials("root", None)
}

async fn call(gateway: &Gateway, tool: &str, arguments: Value) -> Result<Value, Value> {
    gateway
        .call_tool(tool, &arguments)
        .await
        .map_err(|payload| serde_json::to_value(payload).unwrap())
}

#[tokio::test]
#[ignore = "requires Docker"]
async fn test_mysql_gateway_end_to_end() {
    let mysql = Mysql::default().start().await.unwrap();
    let port = mysql.get_host_port_ipv4(3306).await.unwrap();
    let url = format!("mysql://root@127.0.0.1:{}/test", port);
    let pool = wait_for_mysql_ready(&url, 60).await;
    seed(&pool).await;
    pool.close().await;

    let gateway = Gateway::new(ProjectRegistry::new([project(port)]).unwrap());

    let listing = call(&gateway, "list_tables", json!({"project": "shop"}))
        .await
        .unwrap();
    assert_eq!(listing["driver"], json!("mysql"));
    assert_eq!(
        listing["tables"],
        json!([
            {"name": "orders", "comment": null},
            {"name": "users", "comment": "Registered customers"}
        ])
    );

    let users = call(
        &gateway,
        "describe_table",
        json!({"project": "shop", "table": "users"}),
    )
    .await
    .unwrap();
    let columns = users["columns"].as_array().unwrap();
    assert_eq!(columns[0]["key"], json!("PRI"));
    assert_eq!(columns[0]["extra"], json!("auto_increment"));
    assert_eq!(columns[1]["type"], json!("varchar(255)"));
    assert_eq!(columns[1]["key"], json!("UNI"));
    assert_eq!(columns[1]["comment"], json!("Login address"));
    assert_eq!(columns[3]["default"], json!("1"));

    let orders = call(
        &gateway,
        "describe_table",
        json!({"project": "shop", "table": "orders"}),
    )
    .await
    .unwrap();
    assert_eq!(
        orders["foreign_keys"],
        json!([{
            "name": "fk_orders_user",
            "column": "user_id",
            "referenced_table": "users",
            "referenced_column": "id"
        }])
    );

    let page = call(
        &gateway,
        "select_query",
        json!({
            "project": "shop",
            "table": "users",
            "select": ["id", "email", "balance"],
            "where": [["active", 1]],
            "order_by": [["id", "desc"]],
            "limit": 4,
            "offset": 1
        }),
    )
    .await
    .unwrap();
    assert_eq!(page["meta"]["total"], json!(10));
    assert_eq!(page["meta"]["count"], json!(4));
    assert_eq!(page["meta"]["has_more"], json!(true));
    let first = &page["rows"][0];
    assert_eq!(first["id"], json!(9));
    assert_eq!(first["email"], json!("user9@example.com"));
    assert_eq!(first.as_object().unwrap().len(), 3);

    let error = call(
        &gateway,
        "select_query",
        json!({"project": "shop", "table": "users", "select": ["missing_col"]}),
    )
    .await
    .unwrap_err();
    assert_eq!(error["error"], json!("Column Not Found"));

    let error = call(
        &gateway,
        "describe_table",
        json!({"project": "shop", "table": "active_users"}),
    )
    .await
    .unwrap_err();
    assert_eq!(error["error"], json!("Table Not Found"));

    gateway.resolver().close_all().await;
}

#[tokio::test]
#[ignore = "requires Docker"]
async fn test_mysql_sessions_are_read_only() {
    let mysql = Mysql::default().start().await.unwrap();
    let port = mysql.get_host_port_ipv4(3306).await.unwrap();
    let url = format!("mysql://root@127.0.0.1:{}/test", port);
    let pool = wait_for_mysql_ready(&url, 60).await;
    seed(&pool).await;
    pool.close().await;

    let adapter = MySqlAdapter::new(&project(port)).unwrap();
    let error = sqlx::query("DELETE FROM orders")
        .execute(&adapter.pool)
        .await
        .unwrap_err();
    // ER_CANT_EXECUTE_IN_READ_ONLY_TRANSACTION
    let code = error
        .as_database_error()
        .and_then(|e| e.code())
        .map(|c| c.to_string());
    assert_eq!(code.as_deref(), Some("25006"));
}

#[tokio::test]
async fn test_mysql_unreachable_server_reports_connection_failure() {
    let config = ProjectConfig::new("offline", DatabaseType::MySQL)
        .with_host("127.0.0.1")
        .with_port(1)
        .with_database("test")
        .with_credentials("root", None)
        .with_pool(PoolSettings {
            connect_timeout_secs: 1,
            ..PoolSettings::default()
        });
    let gateway = Gateway::new(ProjectRegistry::new([config]).unwrap());

    let error = call(&gateway, "list_tables", json!({"project": "offline"}))
        .await
        .unwrap_err();
    assert_eq!(error["error"], json!("Database Connection Failed"));
}

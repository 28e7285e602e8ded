use super::*;
use crate::error::GateError;
use crate::models::{ColumnInfo, DatabaseType, ForeignKeyInfo, IndexInfo, KEY_PRIMARY, TableSummary};
use async_trait::async_trait;
use serde_json::json;
use std::sync::atomic::{AtomicUsize, Ordering};

/// In-memory schema with a `users` and an `orders` table.
#[derive(Default)]
struct FakeSchema {
    describe_calls: AtomicUsize,
    fail_listing: bool,
}

fn column(name: &str, data_type: &str) -> ColumnInfo {
    ColumnInfo {
        name: name.to_string(),
        data_type: data_type.to_string(),
        nullable: true,
        default: None,
        key: String::new(),
        extra: String::new(),
        comment: None,
    }
}

#[async_trait]
impl SchemaIntrospector for FakeSchema {
    fn database_type(&self) -> DatabaseType {
        DatabaseType::SQLite
    }

    async fn list_tables(&self) -> Result<Vec<TableSummary>> {
        if self.fail_listing {
            return Err(GateError::configuration("catalog unavailable"));
        }
        Ok(vec![
            TableSummary::new("orders", None),
            TableSummary::new("users", Some("Accounts".to_string())),
        ])
    }

    async fn columns(&self, table: &str) -> Result<Vec<ColumnInfo>> {
        self.describe_calls.fetch_add(1, Ordering::SeqCst);
        let mut columns = match table {
            "users" => vec![
                column("id", "INTEGER"),
                column("name", "TEXT"),
                column("email", "TEXT"),
                column("status", "TEXT"),
                column("deleted_at", "TEXT"),
            ],
            "orders" => vec![column("id", "INTEGER"), column("user_id", "INTEGER")],
            _ => Vec::new(),
        };
        if let Some(first) = columns.first_mut() {
            first.key = KEY_PRIMARY.to_string();
        }
        Ok(columns)
    }

    async fn indexes(&self, _table: &str) -> Result<Vec<IndexInfo>> {
        Err(GateError::configuration("no index privilege"))
    }

    async fn foreign_keys(&self, _table: &str) -> Result<Vec<ForeignKeyInfo>> {
        Ok(Vec::new())
    }
}

async fn run(description: QueryDescription) -> Validation {
    validate(&description, &FakeSchema::default()).await.unwrap()
}

fn users() -> QueryDescription {
    QueryDescription::new("users")
}

#[tokio::test]
async fn test_minimal_query_uses_defaults() {
    let validated = run(users()).await.unwrap();

    assert_eq!(validated.table, "users");
    assert_eq!(
        validated.columns,
        vec!["id", "name", "email", "status", "deleted_at"]
    );
    assert!(validated.predicates.is_empty());
    assert!(validated.order_by.is_empty());
    assert_eq!(validated.limit, DEFAULT_LIMIT);
    assert_eq!(validated.offset, 0);
    assert!(!validated.limit_clamped);
}

#[tokio::test]
async fn test_unknown_table_lists_available_tables() {
    let rejection = run(QueryDescription::new("ghost")).await.unwrap_err();

    assert_eq!(rejection.kind(), "table_not_found");
    assert_eq!(
        rejection,
        Rejection::TableNotFound {
            table: "ghost".to_string(),
            available_tables: vec!["orders".to_string(), "users".to_string()],
        }
    );
}

#[tokio::test]
async fn test_table_match_is_exact() {
    let rejection = run(QueryDescription::new("USERS")).await.unwrap_err();
    assert_eq!(rejection.kind(), "table_not_found");

    let rejection = run(QueryDescription::new("")).await.unwrap_err();
    assert_eq!(rejection.kind(), "table_not_found");
}

#[tokio::test]
async fn test_unknown_table_never_describes() {
    let schema = FakeSchema::default();
    let outcome = validate(&QueryDescription::new("ghost"), &schema)
        .await
        .unwrap();

    assert!(outcome.is_err());
    assert_eq!(schema.describe_calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_listing_failure_is_an_infrastructure_error() {
    let schema = FakeSchema {
        fail_listing: true,
        ..FakeSchema::default()
    };
    let result = validate(&users(), &schema).await;
    assert!(matches!(result, Err(GateError::Configuration { .. })));
}

#[tokio::test]
async fn test_select_list_is_checked_and_deduplicated() {
    let validated = run(users().with_select(json!(["email", "id", "email"])))
        .await
        .unwrap();
    assert_eq!(validated.columns, vec!["email", "id"]);

    let validated = run(users().with_select(json!("name, status"))).await.unwrap();
    assert_eq!(validated.columns, vec!["name", "status"]);

    let validated = run(users().with_select(json!(["*"]))).await.unwrap();
    assert_eq!(validated.columns.len(), 5);
}

#[tokio::test]
async fn test_unknown_select_column() {
    let rejection = run(users().with_select(json!(["id", "password_hash"])))
        .await
        .unwrap_err();

    match rejection {
        Rejection::ColumnNotFound {
            table,
            column,
            available_columns,
        } => {
            assert_eq!(table, "users");
            assert_eq!(column, "password_hash");
            assert_eq!(available_columns[0], "id");
        }
        other => panic!("unexpected rejection: {:?}", other),
    }
}

#[tokio::test]
async fn test_non_string_select_entry() {
    let rejection = run(users().with_select(json!(["id", 3]))).await.unwrap_err();
    assert_eq!(rejection.kind(), "invalid_select");

    let rejection = run(users().with_select(json!({"id": true})))
        .await
        .unwrap_err();
    assert_eq!(rejection.kind(), "invalid_select");
}

#[tokio::test]
async fn test_two_and_three_element_predicates() {
    let validated = run(users().with_filters(json!([
        ["status", "active"],
        ["id", ">=", 10],
        ["name", "LIKE", "a%"]
    ])))
    .await
    .unwrap();

    assert_eq!(
        validated.predicates,
        vec![
            Predicate {
                column: "status".to_string(),
                column_type: "TEXT".to_string(),
                operator: Operator::Eq,
                value: PredicateValue::Scalar(BindValue::Text("active".to_string())),
            },
            Predicate {
                column: "id".to_string(),
                column_type: "INTEGER".to_string(),
                operator: Operator::Gte,
                value: PredicateValue::Scalar(BindValue::Int(10)),
            },
            Predicate {
                column: "name".to_string(),
                column_type: "TEXT".to_string(),
                operator: Operator::Like,
                value: PredicateValue::Scalar(BindValue::Text("a%".to_string())),
            },
        ]
    );
}

#[tokio::test]
async fn test_missing_predicate_column() {
    let rejection = run(users().with_filters(json!([["missing_col", "=", "x"]])))
        .await
        .unwrap_err();

    assert_eq!(rejection.kind(), "column_not_found");
    assert!(matches!(
        rejection,
        Rejection::ColumnNotFound { ref column, .. } if column == "missing_col"
    ));
}

#[tokio::test]
async fn test_operator_whitelist() {
    let rejection = run(users().with_filters(json!([["id", "; DROP TABLE users", 1]])))
        .await
        .unwrap_err();
    assert_eq!(
        rejection,
        Rejection::InvalidOperator {
            column: "id".to_string(),
            operator: "; DROP TABLE users".to_string(),
        }
    );

    let validated = run(users().with_filters(json!([["id", "Not   In", [1, 2]]])))
        .await
        .unwrap();
    assert_eq!(validated.predicates[0].operator, Operator::NotIn);
}

#[tokio::test]
async fn test_column_checked_before_operator() {
    let rejection = run(users().with_filters(json!([["nope", "~~", 1]])))
        .await
        .unwrap_err();
    assert_eq!(rejection.kind(), "column_not_found");
}

#[tokio::test]
async fn test_malformed_conditions() {
    let cases = [
        json!("status = 'active'"),
        json!([["status"]]),
        json!([["status", "=", "a", "b"]]),
        json!([[1, "=", "a"]]),
        json!([["status", 5, "a"]]),
        json!([["id", "in", 5]]),
        json!([["id", "in", [1, null]]]),
        json!([["id", "=", [1, 2]]]),
        json!([["id", "=", {"a": 1}]]),
        json!([["id", ">", null]]),
        json!(["status"]),
    ];

    for filters in cases {
        let rejection = run(users().with_filters(filters.clone())).await.unwrap_err();
        assert_eq!(
            rejection.kind(),
            "malformed_condition",
            "filters {} should be malformed",
            filters
        );
    }
}

#[tokio::test]
async fn test_every_condition_is_shaped_before_columns_and_operators() {
    let rejection = run(users().with_filters(json!([["nope", "=", "x"], ["status"]])))
        .await
        .unwrap_err();
    assert!(matches!(
        rejection,
        Rejection::MalformedCondition { index: Some(1), .. }
    ));

    let rejection = run(users().with_filters(json!([["id", "~", 1], ["status", "=", "a", "b"]])))
        .await
        .unwrap_err();
    assert_eq!(rejection.kind(), "malformed_condition");

    // Value arity counts as shape
    let rejection = run(users().with_filters(json!([["nope", "=", 1], ["id", "in", 5]])))
        .await
        .unwrap_err();
    assert_eq!(rejection.kind(), "malformed_condition");

    // Well-formed lists are then resolved condition by condition
    let rejection = run(users().with_filters(json!([["id", "~", 1], ["nope", "=", 1]])))
        .await
        .unwrap_err();
    assert_eq!(rejection.kind(), "invalid_operator");
}

#[tokio::test]
async fn test_malformed_condition_reports_position() {
    let rejection = run(users().with_filters(json!([["id", 1], ["status"]])))
        .await
        .unwrap_err();
    assert!(matches!(
        rejection,
        Rejection::MalformedCondition { index: Some(1), .. }
    ));
    assert!(rejection.to_string().contains("#1"));
}

#[tokio::test]
async fn test_null_comparisons_become_null_checks() {
    let validated = run(users().with_filters(json!([
        ["deleted_at", null],
        ["email", "!=", null],
        ["name", "is null", "ignored"]
    ])))
    .await
    .unwrap();

    let operators: Vec<Operator> = validated.predicates.iter().map(|p| p.operator).collect();
    assert_eq!(
        operators,
        vec![Operator::IsNull, Operator::IsNotNull, Operator::IsNull]
    );
    assert!(
        validated
            .predicates
            .iter()
            .all(|p| p.value == PredicateValue::None)
    );
}

#[tokio::test]
async fn test_empty_in_list_is_accepted() {
    let validated = run(users().with_filters(json!([["id", "in", []]])))
        .await
        .unwrap();
    assert_eq!(validated.predicates[0].value, PredicateValue::List(Vec::new()));
}

#[tokio::test]
async fn test_order_by_forms() {
    let validated = run(users().with_order_by(json!([["name", "DESC"], ["id"], "email"])))
        .await
        .unwrap();
    assert_eq!(
        validated.order_by,
        vec![
            OrderClause {
                column: "name".to_string(),
                direction: SortDirection::Descending,
            },
            OrderClause {
                column: "id".to_string(),
                direction: SortDirection::Ascending,
            },
            OrderClause {
                column: "email".to_string(),
                direction: SortDirection::Ascending,
            },
        ]
    );

    let validated = run(users().with_order_by(json!("name"))).await.unwrap();
    assert_eq!(validated.order_by.len(), 1);

    let validated = run(users().with_order_by(json!(["name", "desc"]))).await.unwrap();
    assert_eq!(
        validated.order_by,
        vec![OrderClause {
            column: "name".to_string(),
            direction: SortDirection::Descending,
        }]
    );

    // Unrecognized directions sort ascending
    let validated = run(users().with_order_by(json!([["name", "sideways"]])))
        .await
        .unwrap();
    assert_eq!(validated.order_by[0].direction, SortDirection::Ascending);
}

#[tokio::test]
async fn test_order_by_rejections() {
    let rejection = run(users().with_order_by(json!([["ghost_col", "asc"]])))
        .await
        .unwrap_err();
    assert_eq!(rejection.kind(), "column_not_found");

    for order_by in [
        json!([["name", "asc", "extra"]]),
        json!([[]]),
        json!([[1, "asc"]]),
        json!([["name", 1]]),
        json!([42]),
        json!({"name": "asc"}),
    ] {
        let rejection = run(users().with_order_by(order_by.clone())).await.unwrap_err();
        assert_eq!(
            rejection.kind(),
            "malformed_order",
            "order_by {} should be malformed",
            order_by
        );
    }
}

#[tokio::test]
async fn test_limit_rules() {
    let validated = run(users().with_limit(json!(5))).await.unwrap();
    assert_eq!((validated.limit, validated.limit_clamped), (5, false));

    let validated = run(users().with_limit(json!(100))).await.unwrap();
    assert_eq!((validated.limit, validated.limit_clamped), (100, false));

    let validated = run(users().with_limit(json!(101))).await.unwrap();
    assert_eq!((validated.limit, validated.limit_clamped), (MAX_LIMIT, true));

    let validated = run(users().with_limit(json!(u64::MAX))).await.unwrap();
    assert_eq!(validated.limit, MAX_LIMIT);

    let validated = run(users().with_limit(json!("15"))).await.unwrap();
    assert_eq!(validated.limit, 15);

    let validated = run(users().with_limit(serde_json::Value::Null))
        .await
        .unwrap();
    assert_eq!(validated.limit, DEFAULT_LIMIT);

    for limit in [json!(0), json!(-3), json!(2.5), json!("ten"), json!([10])] {
        let rejection = run(users().with_limit(limit.clone())).await.unwrap_err();
        assert_eq!(rejection.kind(), "invalid_limit", "limit {}", limit);
    }
}

#[tokio::test]
async fn test_offset_rules() {
    let validated = run(users().with_offset(json!(40))).await.unwrap();
    assert_eq!(validated.offset, 40);

    let validated = run(users().with_offset(json!("7"))).await.unwrap();
    assert_eq!(validated.offset, 7);

    let validated = run(users().with_offset(json!(1_000_000_000_000_i64)))
        .await
        .unwrap();
    assert_eq!(validated.offset, 1_000_000_000_000);

    for offset in [json!(-1), json!(1.5), json!(u64::MAX), json!(true)] {
        let rejection = run(users().with_offset(offset.clone())).await.unwrap_err();
        assert_eq!(rejection.kind(), "invalid_offset", "offset {}", offset);
    }
}

#[tokio::test]
async fn test_checks_run_in_order() {
    // Select is checked before predicates, predicates before limit
    let description = users()
        .with_select(json!(["nope"]))
        .with_filters(json!([["id", "~", 1]]))
        .with_limit(json!(0));
    assert_eq!(run(description).await.unwrap_err().kind(), "column_not_found");

    let description = users()
        .with_filters(json!([["id", "~", 1]]))
        .with_limit(json!(0));
    assert_eq!(run(description).await.unwrap_err().kind(), "invalid_operator");

    let description = users().with_limit(json!(0)).with_offset(json!(-1));
    assert_eq!(run(description).await.unwrap_err().kind(), "invalid_limit");
}

#[test]
fn test_check_against_snapshot() {
    let snapshot = SchemaSnapshot {
        table: "orders".to_string(),
        columns: vec![column("id", "INTEGER")],
        ..SchemaSnapshot::default()
    };

    let validated = check(&QueryDescription::new("orders"), &snapshot).unwrap();
    assert_eq!(validated.columns, vec!["id"]);
}

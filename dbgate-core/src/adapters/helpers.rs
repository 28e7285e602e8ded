//! Helper utilities for database adapter implementations.
//!
//! Provides the timeout wrapper every round trip goes through and the
//! degrade-to-empty policy for optional metadata.

use crate::Result;
use crate::error::GateError;
#[cfg(feature = "sqlx")]
use crate::query::BindValue;
use std::future::Future;
use std::time::Duration;

/// Runs one database round trip under the project's query timeout.
///
/// # Errors
/// Returns `GateError::Timeout` when the deadline passes, otherwise the
/// operation's own error.
///
/// # Example
/// ```rust,ignore
/// let tables = with_timeout(self.query_timeout, "list tables", async {
///     sqlx::query("SELECT name FROM sqlite_master")
///         .fetch_all(&self.pool)
///         .await
///         .map_err(sqlx_error("Failed to list tables"))
/// })
/// .await?;
/// ```
pub async fn with_timeout<T, F>(timeout: Duration, context: &str, operation: F) -> Result<T>
where
    F: Future<Output = Result<T>>,
{
    match tokio::time::timeout(timeout, operation).await {
        Ok(result) => result,
        Err(_) => {
            tracing::warn!("{} timed out after {}s", context, timeout.as_secs());
            Err(GateError::timeout(context, timeout))
        }
    }
}

/// Turns a failed optional lookup into an empty value.
///
/// Used for index, foreign-key and comment introspection, which must never
/// prevent a table description from being returned.
pub fn degrade<T: Default>(what: &str, table: &str, result: Result<T>) -> T {
    match result {
        Ok(value) => value,
        Err(e) => {
            tracing::warn!(
                "Failed to read {} for table '{}', returning empty: {}",
                what,
                table,
                e
            );
            T::default()
        }
    }
}

/// Maps a sqlx error for `context` into a classified gateway error.
#[cfg(feature = "sqlx")]
pub fn sqlx_error(context: impl Into<String>) -> impl FnOnce(sqlx::Error) -> GateError {
    let context = context.into();
    move |e| GateError::from_sqlx(context, e)
}

/// Renders binary data as a `base64:`-prefixed string.
pub fn encode_binary(bytes: &[u8]) -> serde_json::Value {
    use base64::Engine;
    let encoded = base64::engine::general_purpose::STANDARD.encode(bytes);
    serde_json::Value::String(format!("base64:{}", encoded))
}

/// Binds parameters in placeholder order.
#[cfg(feature = "sqlx")]
pub fn bind_params<'q, DB>(
    mut query: sqlx::query::Query<'q, DB, <DB as sqlx::Database>::Arguments<'q>>,
    params: &[BindValue],
) -> sqlx::query::Query<'q, DB, <DB as sqlx::Database>::Arguments<'q>>
where
    DB: sqlx::Database,
    Option<String>: sqlx::Encode<'q, DB> + sqlx::Type<DB>,
    bool: sqlx::Encode<'q, DB> + sqlx::Type<DB>,
    i64: sqlx::Encode<'q, DB> + sqlx::Type<DB>,
    f64: sqlx::Encode<'q, DB> + sqlx::Type<DB>,
    String: sqlx::Encode<'q, DB> + sqlx::Type<DB>,
{
    for param in params {
        query = match param {
            BindValue::Null => query.bind(None::<String>),
            BindValue::Bool(b) => query.bind(*b),
            BindValue::Int(i) => query.bind(*i),
            BindValue::Float(f) => query.bind(*f),
            BindValue::Text(s) => query.bind(s.clone()),
        };
    }
    query
}

/// Converts a float into JSON, mapping NaN and infinities to null.
pub fn float_to_json(value: f64) -> serde_json::Value {
    serde_json::Number::from_f64(value)
        .map(serde_json::Value::Number)
        .unwrap_or(serde_json::Value::Null)
}

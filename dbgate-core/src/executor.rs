//! Execution of validated queries.
//!
//! A page query and a matching COUNT run against the same adapter; no
//! cursor state survives the call.

use crate::Result;
use crate::adapters::DatabaseAdapter;
use crate::query::ValidatedQuery;
use serde_json::Value;

/// One page of rows plus the unpaged total.
#[derive(Debug, Clone, PartialEq)]
pub struct SelectResult {
    pub rows: Vec<Value>,
    pub total: u64,
    pub has_more: bool,
}

/// True when rows remain after this page.
pub fn has_more(offset: u64, returned: usize, total: u64) -> bool {
    offset.saturating_add(u64::try_from(returned).unwrap_or(u64::MAX)) < total
}

/// Runs the page query and the count concurrently.
///
/// # Errors
/// Returns error if either query fails or times out
pub async fn select_rows(
    query: &ValidatedQuery,
    adapter: &dyn DatabaseAdapter,
) -> Result<SelectResult> {
    tracing::debug!(
        "Executing select on '{}' (limit {}, offset {}, {} predicate(s))",
        query.table,
        query.limit,
        query.offset,
        query.predicates.len()
    );

    let (rows, total) = tokio::try_join!(adapter.fetch_rows(query), adapter.fetch_count(query))?;
    let has_more = has_more(query.offset, rows.len(), total);

    Ok(SelectResult {
        rows,
        total,
        has_more,
    })
}

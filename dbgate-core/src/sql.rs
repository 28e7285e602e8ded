//! SQL text generation for validated queries.
//!
//! Identifiers only ever reach SQL text through [`SqlDialect::quote_identifier`];
//! every caller-supplied value, including limit and offset, is a bound
//! parameter. Postgres casts name the column types read from the catalog,
//! never caller text.

use crate::error::GateError;
use crate::query::{BindValue, Operator, Predicate, PredicateValue, ValidatedQuery};
use crate::Result;

/// SQL flavour of an engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SqlDialect {
    MySql,
    Postgres,
    Sqlite,
    SqlServer,
}

impl SqlDialect {
    /// Quotes one identifier for embedding in SQL text.
    ///
    /// The closing quote character is doubled inside the name. Empty names
    /// and names containing NUL are rejected.
    ///
    /// # Example
    /// ```rust
    /// use dbgate_core::sql::SqlDialect;
    ///
    /// assert_eq!(SqlDialect::MySql.quote_identifier("order")?, "`order`");
    /// assert_eq!(SqlDialect::Postgres.quote_identifier("a\"b")?, "\"a\"\"b\"");
    /// assert_eq!(SqlDialect::SqlServer.quote_identifier("x]y")?, "[x]]y]");
    /// assert!(SqlDialect::Sqlite.quote_identifier("").is_err());
    /// # Ok::<(), dbgate_core::GateError>(())
    /// ```
    pub fn quote_identifier(self, identifier: &str) -> Result<String> {
        if identifier.is_empty() {
            return Err(GateError::invalid_identifier("identifier cannot be empty"));
        }
        if identifier.contains('\0') {
            return Err(GateError::invalid_identifier(
                "identifier cannot contain NUL bytes",
            ));
        }

        let (open, close) = match self {
            Self::MySql => ('`', '`'),
            Self::Postgres | Self::Sqlite => ('"', '"'),
            Self::SqlServer => ('[', ']'),
        };

        let mut quoted = String::with_capacity(identifier.len() + 2);
        quoted.push(open);
        for ch in identifier.chars() {
            if ch == close {
                quoted.push(close);
            }
            quoted.push(ch);
        }
        quoted.push(close);
        Ok(quoted)
    }

    /// Placeholder text for the `index`-th parameter (1-based).
    pub fn placeholder(self, index: usize) -> String {
        match self {
            Self::MySql | Self::Sqlite => "?".to_string(),
            Self::Postgres => format!("${}", index),
            Self::SqlServer => format!("@P{}", index),
        }
    }

    /// Row count expression; SQL Server needs `COUNT_BIG` for a bigint.
    fn count_expression(self) -> &'static str {
        match self {
            Self::SqlServer => "COUNT_BIG(*)",
            _ => "COUNT(*)",
        }
    }
}

/// SQL text plus its parameters in placeholder order.
#[derive(Debug, Clone, PartialEq)]
pub struct BuiltQuery {
    pub sql: String,
    pub params: Vec<BindValue>,
}

/// Select-list SQL with any parameters it binds.
///
/// Used by engines that materialize rows inside the query, e.g. MySQL's
/// `JSON_OBJECT(?, col, ...)`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Projection {
    pub sql: String,
    pub params: Vec<BindValue>,
}

/// Accumulates parameters and hands out dialect placeholders.
struct Params {
    dialect: SqlDialect,
    values: Vec<BindValue>,
}

impl Params {
    fn new(dialect: SqlDialect) -> Self {
        Self {
            dialect,
            values: Vec::new(),
        }
    }

    fn push(&mut self, value: BindValue) -> String {
        self.values.push(value);
        self.dialect.placeholder(self.values.len())
    }
}

/// Declared Postgres type (as `format_type` renders it) without its type
/// modifier, so casts never truncate or round the bound value.
///
/// Returns `None` for anything that is not a plain type name.
fn postgres_cast_type(declared: &str) -> Option<String> {
    let mut base = String::with_capacity(declared.len());
    let mut depth = 0_usize;
    for ch in declared.chars() {
        match ch {
            '(' => depth += 1,
            ')' => depth = depth.checked_sub(1)?,
            _ if depth > 0 => {}
            c if c.is_ascii_alphanumeric() || matches!(c, ' ' | '_' | '.' | '"' | '[' | ']') => {
                base.push(c);
            }
            _ => return None,
        }
    }

    let base = base.split_whitespace().collect::<Vec<_>>().join(" ");
    let balanced = depth == 0 && base.matches('"').count() % 2 == 0;
    (balanced && !base.is_empty()).then_some(base)
}

/// Builds SELECT and COUNT statements for one table.
#[derive(Debug, Clone, Copy)]
pub struct SqlBuilder<'a> {
    dialect: SqlDialect,
    schema: Option<&'a str>,
}

impl<'a> SqlBuilder<'a> {
    pub fn new(dialect: SqlDialect) -> Self {
        Self {
            dialect,
            schema: None,
        }
    }

    /// Qualifies the table with a schema (Postgres, SQL Server).
    pub fn with_schema(mut self, schema: Option<&'a str>) -> Self {
        self.schema = schema;
        self
    }

    pub fn dialect(&self) -> SqlDialect {
        self.dialect
    }

    /// Quoted, optionally schema-qualified table reference.
    pub fn table_reference(&self, table: &str) -> Result<String> {
        let table = self.dialect.quote_identifier(table)?;
        match self.schema {
            Some(schema) => Ok(format!(
                "{}.{}",
                self.dialect.quote_identifier(schema)?,
                table
            )),
            None => Ok(table),
        }
    }

    /// Comma-separated quoted column list.
    pub fn column_list(&self, columns: &[String]) -> Result<String> {
        let quoted = columns
            .iter()
            .map(|c| self.dialect.quote_identifier(c))
            .collect::<Result<Vec<_>>>()?;
        Ok(quoted.join(", "))
    }

    /// Page query selecting the validated columns.
    pub fn select(&self, query: &ValidatedQuery) -> Result<BuiltQuery> {
        let projection = Projection {
            sql: self.column_list(&query.columns)?,
            params: Vec::new(),
        };
        self.select_projected(query, projection)
    }

    /// Page query with a caller-rendered select list.
    pub fn select_projected(
        &self,
        query: &ValidatedQuery,
        projection: Projection,
    ) -> Result<BuiltQuery> {
        let mut params = Params::new(self.dialect);
        let limit = BindValue::Int(i64::from(query.limit));
        let offset = BindValue::Int(i64::try_from(query.offset).unwrap_or(i64::MAX));

        let mut sql = String::from("SELECT ");
        // TOP precedes the select list, so its placeholder is numbered first
        let use_top = self.dialect == SqlDialect::SqlServer && query.offset == 0;
        if use_top {
            sql.push_str(&format!("TOP ({}) ", params.push(limit.clone())));
        }

        for value in projection.params {
            // Projection parameters only exist for positional dialects
            params.push(value);
        }
        sql.push_str(&projection.sql);
        sql.push_str(" FROM ");
        sql.push_str(&self.table_reference(&query.table)?);
        sql.push_str(&self.where_clause(&query.predicates, &mut params)?);

        let order = self.order_clause(query)?;
        match self.dialect {
            SqlDialect::SqlServer => {
                if use_top {
                    sql.push_str(&order);
                } else {
                    if order.is_empty() {
                        sql.push_str(" ORDER BY (SELECT NULL)");
                    } else {
                        sql.push_str(&order);
                    }
                    let offset_ph = params.push(offset);
                    let limit_ph = params.push(limit);
                    sql.push_str(&format!(
                        " OFFSET {} ROWS FETCH NEXT {} ROWS ONLY",
                        offset_ph, limit_ph
                    ));
                }
            }
            _ => {
                sql.push_str(&order);
                sql.push_str(&format!(" LIMIT {}", params.push(limit)));
                if query.offset > 0 {
                    sql.push_str(&format!(" OFFSET {}", params.push(offset)));
                }
            }
        }

        Ok(BuiltQuery {
            sql,
            params: params.values,
        })
    }

    /// Total row count for the same table and predicates.
    pub fn count(&self, query: &ValidatedQuery) -> Result<BuiltQuery> {
        let mut params = Params::new(self.dialect);
        let mut sql = format!(
            "SELECT {} AS total FROM {}",
            self.dialect.count_expression(),
            self.table_reference(&query.table)?
        );
        sql.push_str(&self.where_clause(&query.predicates, &mut params)?);
        Ok(BuiltQuery {
            sql,
            params: params.values,
        })
    }

    fn where_clause(&self, predicates: &[Predicate], params: &mut Params) -> Result<String> {
        if predicates.is_empty() {
            return Ok(String::new());
        }

        let mut conditions = Vec::with_capacity(predicates.len());
        for predicate in predicates {
            conditions.push(self.condition(predicate, params)?);
        }
        Ok(format!(" WHERE {}", conditions.join(" AND ")))
    }

    fn condition(&self, predicate: &Predicate, params: &mut Params) -> Result<String> {
        let mut column = self.dialect.quote_identifier(&predicate.column)?;
        let op = predicate.operator;
        if self.dialect == SqlDialect::Postgres && op == Operator::Like {
            column.push_str("::text");
        }

        let condition = match &predicate.value {
            PredicateValue::None => format!("{} {}", column, op.as_sql()),
            PredicateValue::Scalar(value) => {
                let placeholder = self.bound(predicate, value, params);
                format!("{} {} {}", column, op.as_sql(), placeholder)
            }
            // An empty IN matches nothing, an empty NOT IN matches everything
            PredicateValue::List(values) if values.is_empty() => {
                if op == Operator::In {
                    "1 = 0".to_string()
                } else {
                    "1 = 1".to_string()
                }
            }
            PredicateValue::List(values) => {
                let placeholders = values
                    .iter()
                    .map(|v| self.bound(predicate, v, params))
                    .collect::<Vec<_>>();
                format!("{} {} ({})", column, op.as_sql(), placeholders.join(", "))
            }
        };
        Ok(condition)
    }

    /// Pushes one filter value and returns its placeholder.
    ///
    /// Postgres binds strings as `text` and will not coerce them, so there
    /// string values are cast to the column's declared type. Numbers and
    /// booleans already compare across types. `LIKE` compares as text.
    fn bound(&self, predicate: &Predicate, value: &BindValue, params: &mut Params) -> String {
        let placeholder = params.push(value.clone());
        if self.dialect != SqlDialect::Postgres {
            return placeholder;
        }
        if predicate.operator == Operator::Like {
            return format!("{}::text", placeholder);
        }
        if !matches!(value, BindValue::Text(_)) {
            return placeholder;
        }
        match postgres_cast_type(&predicate.column_type) {
            Some(cast) => format!("{}::{}", placeholder, cast),
            None => placeholder,
        }
    }

    fn order_clause(&self, query: &ValidatedQuery) -> Result<String> {
        if query.order_by.is_empty() {
            return Ok(String::new());
        }

        let clauses = query
            .order_by
            .iter()
            .map(|o| {
                Ok(format!(
                    "{} {}",
                    self.dialect.quote_identifier(&o.column)?,
                    o.direction.as_sql()
                ))
            })
            .collect::<Result<Vec<_>>>()?;
        Ok(format!(" ORDER BY {}", clauses.join(", ")))
    }
}

//! Parameterized query construction for the runtime-selected driver.
//!
//! Values always travel as bound parameters using `$N` placeholders, which
//! both SQLite and PostgreSQL understand. Column names and sort expressions are
//! only ever taken from fixed whitelists inside this crate.

use sqlx::any::{Any, AnyArguments};
use sqlx::query::Query;

/// A value bound to a `$N` placeholder.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SqlValue {
    Int(i64),
    Text(String),
}

impl From<i64> for SqlValue {
    fn from(v: i64) -> Self {
        SqlValue::Int(v)
    }
}

impl From<String> for SqlValue {
    fn from(v: String) -> Self {
        SqlValue::Text(v)
    }
}

impl From<&str> for SqlValue {
    fn from(v: &str) -> Self {
        SqlValue::Text(v.to_string())
    }
}

/// Builds a `SELECT` statement with chained conditions.
#[derive(Debug, Clone)]
pub struct SqlBuilder {
    select_cols: Vec<String>,
    from_table: String,
    joins: Vec<String>,
    where_clauses: Vec<String>,
    params: Vec<SqlValue>,
    order_by_cols: Vec<String>,
    limit_val: Option<u32>,
}

impl SqlBuilder {
    pub fn new(table: &str) -> Self {
        Self {
            select_cols: vec!["*".to_string()],
            from_table: table.to_string(),
            joins: Vec::new(),
            where_clauses: Vec::new(),
            params: Vec::new(),
            order_by_cols: Vec::new(),
            limit_val: None,
        }
    }

    pub fn select(&mut self, cols: &[&str]) -> &mut Self {
        self.select_cols = cols.iter().map(|c| c.to_string()).collect();
        self
    }

    /// Adds a full join expression, e.g. `"JOIN decks d ON d.id = r.deck_id"`.
    pub fn join(&mut self, clause: &str) -> &mut Self {
        self.joins.push(clause.to_string());
        self
    }

    fn push_param(&mut self, value: SqlValue) -> String {
        self.params.push(value);
        format!("${}", self.params.len())
    }

    fn push_comparison(&mut self, column: &str, op: &str, value: SqlValue) -> &mut Self {
        let placeholder = self.push_param(value);
        self.where_clauses
            .push(format!("{column} {op} {placeholder}"));
        self
    }

    pub fn where_eq(&mut self, column: &str, value: impl Into<SqlValue>) -> &mut Self {
        self.push_comparison(column, "=", value.into())
    }

    pub fn where_gte(&mut self, column: &str, value: impl Into<SqlValue>) -> &mut Self {
        self.push_comparison(column, ">=", value.into())
    }

    pub fn where_lte(&mut self, column: &str, value: impl Into<SqlValue>) -> &mut Self {
        self.push_comparison(column, "<=", value.into())
    }

    /// `{column} IN (...)`. An empty list matches nothing.
    pub fn where_in(&mut self, column: &str, values: &[i64]) -> &mut Self {
        if values.is_empty() {
            self.where_clauses.push("1 = 0".to_string());
            return self;
        }
        let placeholders: Vec<String> = values
            .iter()
            .map(|v| self.push_param(SqlValue::Int(*v)))
            .collect();
        self.where_clauses
            .push(format!("{column} IN ({})", placeholders.join(", ")));
        self
    }

    /// Case-insensitive substring match against any of `columns`.
    ///
    /// `%` and `_` in the needle are matched literally.
    pub fn where_contains_any(&mut self, columns: &[&str], needle: &str) -> &mut Self {
        if columns.is_empty() {
            return self;
        }
        let pattern = format!("%{}%", escape_like(&needle.to_lowercase()));
        let alternatives: Vec<String> = columns
            .iter()
            .map(|column| {
                let placeholder = self.push_param(SqlValue::Text(pattern.clone()));
                format!("LOWER({column}) LIKE {placeholder} ESCAPE '\\'")
            })
            .collect();
        self.where_clauses
            .push(format!("({})", alternatives.join(" OR ")));
        self
    }

    pub fn order_by(&mut self, cols: &[&str]) -> &mut Self {
        self.order_by_cols
            .extend(cols.iter().map(|c| c.to_string()));
        self
    }

    pub fn limit(&mut self, n: u32) -> &mut Self {
        self.limit_val = Some(n);
        self
    }

    fn push_where(&self, sql: &mut String) {
        if !self.where_clauses.is_empty() {
            sql.push_str(" WHERE ");
            sql.push_str(&self.where_clauses.join(" AND "));
        }
    }

    /// Returns the SQL text and its parameters in placeholder order.
    pub fn build(&self) -> (String, Vec<SqlValue>) {
        let mut sql = format!("SELECT {} FROM {}", self.select_cols.join(", "), self.from_table);
        for join in &self.joins {
            sql.push(' ');
            sql.push_str(join);
        }
        self.push_where(&mut sql);
        if !self.order_by_cols.is_empty() {
            sql.push_str(" ORDER BY ");
            sql.push_str(&self.order_by_cols.join(", "));
        }
        if let Some(n) = self.limit_val {
            sql.push_str(&format!(" LIMIT {n}"));
        }
        (sql, self.params.clone())
    }

    /// A `DELETE` over the same table and conditions. Joins, ordering and the
    /// limit are ignored.
    pub fn build_delete(&self) -> (String, Vec<SqlValue>) {
        let mut sql = format!("DELETE FROM {}", self.from_table);
        self.push_where(&mut sql);
        (sql, self.params.clone())
    }
}

fn escape_like(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    for c in raw.chars() {
        if matches!(c, '\\' | '%' | '_') {
            out.push('\\');
        }
        out.push(c);
    }
    out
}

/// Binds `params` to `query` in order.
pub fn bind_all<'q>(
    mut query: Query<'q, Any, AnyArguments<'q>>,
    params: Vec<SqlValue>,
) -> Query<'q, Any, AnyArguments<'q>> {
    for param in params {
        query = match param {
            SqlValue::Int(v) => query.bind(v),
            SqlValue::Text(v) => query.bind(v),
        };
    }
    query
}

//! # Query Filter Builder
//!
//! Composes optional WHERE criteria with running `$n` placeholder indices
//! for the runtime query API. This is the single place where filters are
//! assembled; repositories feed it typed values and interpolate only the
//! generated clause, never user input.
//!
//! ## Example
//! ```rust,ignore
//! let mut filter = QueryFilter::new();
//! filter.eq_text("user_id", user_id);
//! if let Some(status) = status {
//!     filter.eq_text("sales_status", status);
//! }
//! let sql = format!(
//!     "SELECT … FROM agents.order_records {} ORDER BY order_date DESC",
//!     filter.where_clause()
//! );
//! let rows = filter.bind_all(sqlx::query_as::<_, Order>(&sql)).fetch_all(pool).await?;
//! ```

use sqlx::postgres::PgArguments;
use sqlx::query::{Query, QueryAs};
use sqlx::Postgres;

/// A typed bind value captured by the filter.
#[derive(Debug, Clone)]
enum BindValue {
    Text(String),
    Int(i64),
    Num(f64),
    Bool(bool),
}

/// Accumulates WHERE clauses and their bind values.
#[derive(Debug, Default)]
pub struct QueryFilter {
    clauses: Vec<String>,
    binds: Vec<BindValue>,
}

impl QueryFilter {
    pub fn new() -> Self {
        QueryFilter::default()
    }

    /// Next placeholder index (`$1`-based).
    fn next_index(&self) -> usize {
        self.binds.len() + 1
    }

    /// `column = $n` on a text value.
    pub fn eq_text(&mut self, column: &str, value: impl Into<String>) -> &mut Self {
        let idx = self.next_index();
        self.clauses.push(format!("{column} = ${idx}"));
        self.binds.push(BindValue::Text(value.into()));
        self
    }

    /// `column ILIKE $n` with the pattern wrapped in `%`.
    pub fn contains(&mut self, column: &str, needle: &str) -> &mut Self {
        let idx = self.next_index();
        self.clauses.push(format!("{column} ILIKE ${idx}"));
        self.binds.push(BindValue::Text(format!("%{needle}%")));
        self
    }

    /// `column = $n` on an integer value.
    pub fn eq_int(&mut self, column: &str, value: i64) -> &mut Self {
        let idx = self.next_index();
        self.clauses.push(format!("{column} = ${idx}"));
        self.binds.push(BindValue::Int(value));
        self
    }

    /// `column >= $n` on an integer value.
    pub fn gte_int(&mut self, column: &str, value: i64) -> &mut Self {
        let idx = self.next_index();
        self.clauses.push(format!("{column} >= ${idx}"));
        self.binds.push(BindValue::Int(value));
        self
    }

    /// `column <= $n` on an integer value.
    pub fn lte_int(&mut self, column: &str, value: i64) -> &mut Self {
        let idx = self.next_index();
        self.clauses.push(format!("{column} <= ${idx}"));
        self.binds.push(BindValue::Int(value));
        self
    }

    /// `column = $n` on a numeric value.
    pub fn eq_num(&mut self, column: &str, value: f64) -> &mut Self {
        let idx = self.next_index();
        self.clauses.push(format!("{column} = ${idx}"));
        self.binds.push(BindValue::Num(value));
        self
    }

    /// `column = $n` on a boolean value.
    pub fn eq_bool(&mut self, column: &str, value: bool) -> &mut Self {
        let idx = self.next_index();
        self.clauses.push(format!("{column} = ${idx}"));
        self.binds.push(BindValue::Bool(value));
        self
    }

    /// `column IS NULL` (no bind).
    pub fn is_null(&mut self, column: &str) -> &mut Self {
        self.clauses.push(format!("{column} IS NULL"));
        self
    }

    /// `column IS NOT NULL` (no bind).
    pub fn is_not_null(&mut self, column: &str) -> &mut Self {
        self.clauses.push(format!("{column} IS NOT NULL"));
        self
    }

    /// The assembled `WHERE …` clause, or the empty string when no
    /// criteria were added.
    pub fn where_clause(&self) -> String {
        if self.clauses.is_empty() {
            String::new()
        } else {
            format!("WHERE {}", self.clauses.join(" AND "))
        }
    }

    /// Binds the captured values, in order, onto a `query_as` query.
    pub fn bind_all<'q, T>(
        &self,
        mut query: QueryAs<'q, Postgres, T, PgArguments>,
    ) -> QueryAs<'q, Postgres, T, PgArguments> {
        for bind in &self.binds {
            query = match bind {
                BindValue::Text(v) => query.bind(v.clone()),
                BindValue::Int(v) => query.bind(*v),
                BindValue::Num(v) => query.bind(*v),
                BindValue::Bool(v) => query.bind(*v),
            };
        }
        query
    }

    /// Binds the captured values, in order, onto a plain query.
    pub fn bind_all_query<'q>(
        &self,
        mut query: Query<'q, Postgres, PgArguments>,
    ) -> Query<'q, Postgres, PgArguments> {
        for bind in &self.binds {
            query = match bind {
                BindValue::Text(v) => query.bind(v.clone()),
                BindValue::Int(v) => query.bind(*v),
                BindValue::Num(v) => query.bind(*v),
                BindValue::Bool(v) => query.bind(*v),
            };
        }
        query
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_filter_yields_no_where() {
        let filter = QueryFilter::new();
        assert_eq!(filter.where_clause(), "");
    }

    #[test]
    fn placeholders_are_numbered_in_order() {
        let mut filter = QueryFilter::new();
        filter
            .eq_text("user_id", "U1")
            .contains("business_name", "rossi")
            .gte_int("last_sync", 100);

        assert_eq!(
            filter.where_clause(),
            "WHERE user_id = $1 AND business_name ILIKE $2 AND last_sync >= $3"
        );
    }

    #[test]
    fn null_checks_consume_no_placeholder() {
        let mut filter = QueryFilter::new();
        filter.is_null("deleted_at").eq_text("category", "drinks");

        assert_eq!(
            filter.where_clause(),
            "WHERE deleted_at IS NULL AND category = $1"
        );
    }

    #[test]
    fn contains_wraps_the_needle() {
        let mut filter = QueryFilter::new();
        filter.contains("name", "cola");
        // The pattern is carried as a bind, never interpolated.
        assert_eq!(filter.where_clause(), "WHERE name ILIKE $1");
    }
}

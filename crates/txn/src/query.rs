//! Structured queries
//!
//! A [`Query`] is the typed stand-in for a single-table `SELECT`:
//!
//! ```text
//! SELECT <projection> FROM <table>
//! WHERE <p1> AND <p2> ...
//! ORDER BY <c1> [DESC], ...
//! LIMIT <n>
//! ```
//!
//! Comparisons against NULL never match except `Eq(Null)`, which behaves
//! like `IS NULL`.

use crate::schema::{Row, TableSchema};
use std::cmp::Ordering;
use streamvault_core::{Error, Result, Value};

/// Comparison operator of a predicate
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompareOp {
    /// `=`
    Eq,
    /// `!=`
    Ne,
    /// `<`
    Lt,
    /// `<=`
    Le,
    /// `>`
    Gt,
    /// `>=`
    Ge,
    /// Array contains element, or string contains substring
    Contains,
    /// Column value is one of the elements of an array operand
    In,
}

/// `column <op> value`
#[derive(Debug, Clone, PartialEq)]
pub struct Predicate {
    /// Column name
    pub column: String,
    /// Operator
    pub op: CompareOp,
    /// Right-hand operand
    pub value: Value,
}

impl Predicate {
    /// Evaluate against a row
    pub fn matches(&self, row: &Row) -> bool {
        let lhs = row.get(&self.column).unwrap_or(&Value::Null);
        match self.op {
            CompareOp::Eq => lhs == &self.value,
            CompareOp::Ne => {
                !lhs.is_null() && !self.value.is_null() && lhs != &self.value
            }
            CompareOp::Lt => ordered(lhs, &self.value, |o| o == Ordering::Less),
            CompareOp::Le => ordered(lhs, &self.value, |o| o != Ordering::Greater),
            CompareOp::Gt => ordered(lhs, &self.value, |o| o == Ordering::Greater),
            CompareOp::Ge => ordered(lhs, &self.value, |o| o != Ordering::Less),
            CompareOp::Contains => match (lhs, &self.value) {
                (Value::Array(items), needle) => items.iter().any(|item| item == needle),
                (Value::String(haystack), Value::String(needle)) => haystack.contains(needle.as_str()),
                _ => false,
            },
            CompareOp::In => match &self.value {
                Value::Array(candidates) => !lhs.is_null() && candidates.iter().any(|c| c == lhs),
                _ => false,
            },
        }
    }
}

fn ordered(lhs: &Value, rhs: &Value, accept: impl Fn(Ordering) -> bool) -> bool {
    if lhs.is_null() || rhs.is_null() {
        return false;
    }
    lhs.compare(rhs).is_some_and(accept)
}

/// Sort direction
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortOrder {
    /// Smallest first
    Asc,
    /// Largest first
    Desc,
}

/// Single-table select
#[derive(Debug, Clone, PartialEq)]
pub struct Query {
    /// Table to read
    pub table: String,
    /// Conjunctive predicates
    pub predicates: Vec<Predicate>,
    /// Sort keys in priority order
    pub order_by: Vec<(String, SortOrder)>,
    /// Maximum rows returned
    pub limit: Option<usize>,
    /// Columns returned; `None` means every column
    pub projection: Option<Vec<String>>,
}

impl Query {
    /// `SELECT * FROM table`
    pub fn table(table: &str) -> Self {
        Self {
            table: table.to_string(),
            predicates: Vec::new(),
            order_by: Vec::new(),
            limit: None,
            projection: None,
        }
    }

    /// Add a predicate
    pub fn filter(mut self, column: &str, op: CompareOp, value: impl Into<Value>) -> Self {
        self.predicates.push(Predicate {
            column: column.to_string(),
            op,
            value: value.into(),
        });
        self
    }

    /// Shorthand for an `Eq` predicate
    pub fn where_eq(self, column: &str, value: impl Into<Value>) -> Self {
        self.filter(column, CompareOp::Eq, value)
    }

    /// Add a sort key
    pub fn order_by(mut self, column: &str, order: SortOrder) -> Self {
        self.order_by.push((column.to_string(), order));
        self
    }

    /// Limit the number of rows
    pub fn limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    /// Return only these columns
    pub fn select(mut self, columns: &[&str]) -> Self {
        self.projection = Some(columns.iter().map(|c| c.to_string()).collect());
        self
    }

    /// True if the row satisfies every predicate
    pub fn matches(&self, row: &Row) -> bool {
        self.predicates.iter().all(|p| p.matches(row))
    }

    /// Reject references to columns the table does not have
    pub fn validate(&self, schema: &TableSchema) -> Result<()> {
        let referenced = self
            .predicates
            .iter()
            .map(|p| &p.column)
            .chain(self.order_by.iter().map(|(c, _)| c))
            .chain(self.projection.iter().flatten());
        for column in referenced {
            if schema.column_def(column).is_none() {
                return Err(Error::invalid_input(format!(
                    "unknown column '{}' in query on {}",
                    column, self.table
                )));
            }
        }
        Ok(())
    }

    /// Filter, sort, limit and project an already materialized row set
    pub fn run<'a>(&self, rows: impl Iterator<Item = &'a Row>) -> Vec<Row> {
        let mut selected: Vec<&Row> = rows.filter(|r| self.matches(r)).collect();

        if !self.order_by.is_empty() {
            selected.sort_by(|a, b| self.compare_rows(a, b));
        }
        if let Some(limit) = self.limit {
            selected.truncate(limit);
        }

        selected
            .into_iter()
            .map(|row| match &self.projection {
                None => row.clone(),
                Some(columns) => columns
                    .iter()
                    .map(|c| (c.clone(), row.get(c).cloned().unwrap_or(Value::Null)))
                    .collect(),
            })
            .collect()
    }

    fn compare_rows(&self, a: &Row, b: &Row) -> Ordering {
        for (column, order) in &self.order_by {
            let lhs = a.get(column).unwrap_or(&Value::Null);
            let rhs = b.get(column).unwrap_or(&Value::Null);
            let ord = lhs.compare(rhs).unwrap_or(Ordering::Equal);
            let ord = match order {
                SortOrder::Asc => ord,
                SortOrder::Desc => ord.reverse(),
            };
            if ord != Ordering::Equal {
                return ord;
            }
        }
        Ordering::Equal
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn video(id: &str, category: &str, views: i64, tags: &[&str]) -> Row {
        let mut row = Row::new();
        row.insert("video_id".into(), Value::from(id));
        row.insert("category".into(), Value::from(category));
        row.insert("view_count".into(), Value::Int(views));
        row.insert(
            "tags".into(),
            Value::Array(tags.iter().map(|t| Value::from(*t)).collect()),
        );
        row
    }

    fn videos() -> Vec<Row> {
        vec![
            video("v1", "music", 10, &["live"]),
            video("v2", "music", 30, &["remix", "live"]),
            video("v3", "sports", 20, &[]),
            video("v4", "music", 20, &["cover"]),
        ]
    }

    fn ids(rows: &[Row]) -> Vec<&str> {
        rows.iter().map(|r| r["video_id"].as_str().unwrap()).collect()
    }

    #[test]
    fn test_eq_and_order_desc_with_limit() {
        let query = Query::table("Videos")
            .where_eq("category", "music")
            .order_by("view_count", SortOrder::Desc)
            .limit(2);
        let rows = videos();
        let result = query.run(rows.iter());
        assert_eq!(ids(&result), vec!["v2", "v4"]);
    }

    #[test]
    fn test_range_predicates() {
        let rows = videos();
        let result = Query::table("Videos")
            .filter("view_count", CompareOp::Ge, 20i64)
            .filter("view_count", CompareOp::Lt, 30i64)
            .order_by("video_id", SortOrder::Asc)
            .run(rows.iter());
        assert_eq!(ids(&result), vec!["v3", "v4"]);
    }

    #[test]
    fn test_contains_and_in() {
        let rows = videos();
        let live = Query::table("Videos")
            .filter("tags", CompareOp::Contains, "live")
            .order_by("video_id", SortOrder::Asc)
            .run(rows.iter());
        assert_eq!(ids(&live), vec!["v1", "v2"]);

        let picked = Query::table("Videos")
            .filter(
                "video_id",
                CompareOp::In,
                Value::Array(vec![Value::from("v3"), Value::from("v9")]),
            )
            .run(rows.iter());
        assert_eq!(ids(&picked), vec!["v3"]);
    }

    #[test]
    fn test_null_comparisons() {
        let mut row = Row::new();
        row.insert("video_id".into(), Value::from("v1"));
        row.insert("category".into(), Value::Null);
        let rows = vec![row];

        let is_null = Query::table("Videos").where_eq("category", Value::Null);
        assert_eq!(is_null.run(rows.iter()).len(), 1);
        let ne = Query::table("Videos").filter("category", CompareOp::Ne, "music");
        assert!(ne.run(rows.iter()).is_empty());
        let lt = Query::table("Videos").filter("category", CompareOp::Lt, "zzz");
        assert!(lt.run(rows.iter()).is_empty());
    }

    #[test]
    fn test_projection() {
        let rows = videos();
        let result = Query::table("Videos")
            .where_eq("video_id", "v1")
            .select(&["video_id", "view_count"])
            .run(rows.iter());
        assert_eq!(result.len(), 1);
        assert_eq!(result[0].len(), 2);
        assert!(!result[0].contains_key("category"));
    }
}

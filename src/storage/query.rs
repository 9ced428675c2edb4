use crate::core::{Row, Value};
use std::cmp::Ordering;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompareOp {
    Eq,
    NotEq,
    Lt,
    LtEq,
    Gt,
    GtEq,
}

/// `column <op> value` predicate. A missing column reads as NULL, and NULL
/// equals NULL.
#[derive(Debug, Clone, PartialEq)]
pub struct Filter {
    pub column: String,
    pub op: CompareOp,
    pub value: Value,
}

impl Filter {
    pub fn new(column: impl Into<String>, op: CompareOp, value: impl Into<Value>) -> Self {
        Self {
            column: column.into(),
            op,
            value: value.into(),
        }
    }

    pub fn eq(column: impl Into<String>, value: impl Into<Value>) -> Self {
        Self::new(column, CompareOp::Eq, value)
    }

    pub fn ne(column: impl Into<String>, value: impl Into<Value>) -> Self {
        Self::new(column, CompareOp::NotEq, value)
    }

    pub fn lt(column: impl Into<String>, value: impl Into<Value>) -> Self {
        Self::new(column, CompareOp::Lt, value)
    }

    pub fn gt(column: impl Into<String>, value: impl Into<Value>) -> Self {
        Self::new(column, CompareOp::Gt, value)
    }

    pub fn matches(&self, row: &Row) -> bool {
        let actual = row.get(&self.column).unwrap_or(&Value::Null);
        let ordering = || {
            if actual.is_null() || self.value.is_null() {
                None
            } else {
                actual.compare(&self.value)
            }
        };
        match self.op {
            CompareOp::Eq => actual == &self.value,
            CompareOp::NotEq => actual != &self.value,
            CompareOp::Lt => ordering() == Some(Ordering::Less),
            CompareOp::LtEq => matches!(ordering(), Some(Ordering::Less | Ordering::Equal)),
            CompareOp::Gt => ordering() == Some(Ordering::Greater),
            CompareOp::GtEq => matches!(ordering(), Some(Ordering::Greater | Ordering::Equal)),
        }
    }
}

pub fn matches_all(filters: &[Filter], row: &Row) -> bool {
    filters.iter().all(|filter| filter.matches(row))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortDirection {
    Asc,
    Desc,
}

/// A filtered, ordered, windowed read. Without an explicit ordering rows come
/// back in primary key order.
#[derive(Debug, Clone, Default)]
pub struct Query {
    pub filters: Vec<Filter>,
    pub order_by: Option<(String, SortDirection)>,
    pub offset: usize,
    pub limit: Option<usize>,
}

impl Query {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn filter(mut self, filter: Filter) -> Self {
        self.filters.push(filter);
        self
    }

    pub fn filters(mut self, filters: impl IntoIterator<Item = Filter>) -> Self {
        self.filters.extend(filters);
        self
    }

    pub fn order_by(mut self, column: impl Into<String>, direction: SortDirection) -> Self {
        self.order_by = Some((column.into(), direction));
        self
    }

    pub fn offset(mut self, offset: usize) -> Self {
        self.offset = offset;
        self
    }

    pub fn limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    /// Applies ordering and the offset/limit window to already filtered rows.
    pub fn window(&self, mut rows: Vec<Row>) -> Vec<Row> {
        if let Some((column, direction)) = &self.order_by {
            rows.sort_by(|a, b| {
                let left = a.get(column).unwrap_or(&Value::Null);
                let right = b.get(column).unwrap_or(&Value::Null);
                let ordering = left.compare(right).unwrap_or(Ordering::Equal);
                match direction {
                    SortDirection::Asc => ordering,
                    SortDirection::Desc => ordering.reverse(),
                }
            });
        }

        let rows = rows.into_iter().skip(self.offset);
        match self.limit {
            Some(limit) => rows.take(limit).collect(),
            None => rows.collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn row(id: &str, score: i64) -> Row {
        let mut row = Row::new();
        row.insert("id".into(), Value::from(id));
        row.insert("score".into(), Value::from(score));
        row
    }

    #[test]
    fn test_filter_comparisons() {
        let r = row("a", 5);
        assert!(Filter::eq("score", 5i64).matches(&r));
        assert!(Filter::gt("score", 4i64).matches(&r));
        assert!(!Filter::lt("score", 5i64).matches(&r));
        assert!(Filter::new("score", CompareOp::LtEq, 5i64).matches(&r));
        assert!(Filter::eq("missing", Value::Null).matches(&r));
        assert!(!Filter::gt("score", "text").matches(&r));
    }

    #[test]
    fn test_window_orders_and_slices() {
        let rows = vec![row("a", 3), row("b", 1), row("c", 2), row("d", 4)];
        let query = Query::new()
            .order_by("score", SortDirection::Desc)
            .offset(1)
            .limit(2);

        let ids: Vec<_> = query
            .window(rows)
            .iter()
            .map(|r| r["id"].as_str().unwrap_or_default().to_string())
            .collect();
        assert_eq!(ids, vec!["a", "c"]);
    }
}

//! Record filters - Equality and tuple `IN` conditions
//!
//! Filters are the only query shape the relation core asks of storage:
//! children are loaded by their link columns, and superseded children are
//! deleted by `link AND (key columns) IN (tuples)`.

use std::fmt;

use serde_json::Value;

use crate::key::values_equal;
use crate::record::Fields;

/// A single filter condition
#[derive(Debug, Clone, PartialEq)]
pub enum Condition {
    /// `column = value`
    Eq { column: String, value: Value },
    /// `(columns...) IN ((values...), ...)`
    In {
        columns: Vec<String>,
        tuples: Vec<Vec<Value>>,
    },
}

impl Condition {
    /// Evaluate this condition against a row; null never compares equal
    pub fn matches(&self, row: &Fields) -> bool {
        match self {
            Condition::Eq { column, value } => {
                let actual = row.get(column).unwrap_or(&Value::Null);
                !value.is_null() && values_equal(actual, value)
            }
            Condition::In { columns, tuples } => tuples.iter().any(|tuple| {
                tuple.len() == columns.len()
                    && columns.iter().zip(tuple).all(|(column, expected)| {
                        let actual = row.get(column).unwrap_or(&Value::Null);
                        !expected.is_null() && values_equal(actual, expected)
                    })
            }),
        }
    }
}

impl fmt::Display for Condition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Condition::Eq { column, value } => write!(f, "{} = {}", column, value),
            Condition::In { columns, tuples } => {
                let rendered: Vec<String> = tuples
                    .iter()
                    .map(|tuple| {
                        let values: Vec<String> = tuple.iter().map(Value::to_string).collect();
                        format!("({})", values.join(", "))
                    })
                    .collect();
                write!(f, "({}) IN ({})", columns.join(", "), rendered.join(", "))
            }
        }
    }
}

/// Conjunction of conditions; an empty filter matches every row
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Filter {
    conditions: Vec<Condition>,
}

impl Filter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add `column = value`
    pub fn where_eq<T: Into<Value>>(mut self, column: &str, value: T) -> Self {
        self.conditions.push(Condition::Eq {
            column: column.to_string(),
            value: value.into(),
        });
        self
    }

    /// Add `(columns) IN (tuples)`; an empty tuple list matches nothing
    pub fn where_in(mut self, columns: Vec<String>, tuples: Vec<Vec<Value>>) -> Self {
        self.conditions.push(Condition::In { columns, tuples });
        self
    }

    pub fn conditions(&self) -> &[Condition] {
        &self.conditions
    }

    pub fn is_empty(&self) -> bool {
        self.conditions.is_empty()
    }

    pub fn matches(&self, row: &Fields) -> bool {
        self.conditions.iter().all(|condition| condition.matches(row))
    }
}

impl fmt::Display for Filter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.conditions.is_empty() {
            return write!(f, "TRUE");
        }
        let rendered: Vec<String> = self.conditions.iter().map(ToString::to_string).collect();
        write!(f, "{}", rendered.join(" AND "))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn row(pairs: &[(&str, Value)]) -> Fields {
        pairs
            .iter()
            .map(|(name, value)| (name.to_string(), value.clone()))
            .collect()
    }

    #[test]
    fn test_eq_conditions() {
        let filter = Filter::new().where_eq("order_id", 1).where_eq("kind", "line");

        assert!(filter.matches(&row(&[("order_id", json!(1)), ("kind", json!("line"))])));
        assert!(filter.matches(&row(&[("order_id", json!("1")), ("kind", json!("line"))])));
        assert!(!filter.matches(&row(&[("order_id", json!(2)), ("kind", json!("line"))])));
        assert!(!filter.matches(&row(&[("kind", json!("line"))])));
    }

    #[test]
    fn test_tuple_in_condition() {
        let filter = Filter::new().where_eq("order_id", 1).where_in(
            vec!["line".to_string(), "variant".to_string()],
            vec![vec![json!(1), json!("a")], vec![json!(2), json!("b")]],
        );

        assert!(filter.matches(&row(&[("order_id", json!(1)), ("line", json!(2)), ("variant", json!("b"))])));
        assert!(!filter.matches(&row(&[("order_id", json!(1)), ("line", json!(2)), ("variant", json!("a"))])));
    }

    #[test]
    fn test_empty_in_matches_nothing() {
        let filter = Filter::new().where_in(vec!["id".to_string()], Vec::new());
        assert!(!filter.matches(&row(&[("id", json!(1))])));
        assert!(Filter::new().matches(&row(&[("id", json!(1))])));
    }

    #[test]
    fn test_null_never_matches() {
        let filter = Filter::new().where_eq("order_id", Value::Null);
        assert!(!filter.matches(&row(&[("order_id", Value::Null)])));
        assert!(!filter.matches(&row(&[])));
    }

    #[test]
    fn test_display() {
        let filter = Filter::new()
            .where_eq("order_id", 7)
            .where_in(vec!["id".to_string()], vec![vec![json!(1)], vec![json!(2)]]);
        assert_eq!(filter.to_string(), "order_id = 7 AND (id) IN ((1), (2))");
        assert_eq!(Filter::new().to_string(), "TRUE");
    }
}

//! Primary key values - Scalar and composite key tuples
//!
//! Keys are compared component by component. A key with a missing (null)
//! component never matches anything, so a payload entry without an id is
//! always treated as a new child.

use std::fmt;

use serde::Serialize;
use serde_json::Value;

use crate::record::{Fields, Record};

/// Primary key value of a record
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum KeyValue {
    /// Single-column key
    Scalar(Value),
    /// Multi-column key, components in primary key order
    Composite(Vec<(String, Value)>),
}

impl KeyValue {
    /// Key built from a field map
    pub fn from_fields(columns: &[String], fields: &Fields) -> Self {
        Self::collect(columns, |column| fields.get(column))
    }

    /// Key of a record instance
    pub fn of_record<R: Record + ?Sized>(columns: &[String], record: &R) -> Self {
        Self::collect(columns, |column| record.get(column))
    }

    fn collect<'a, F>(columns: &[String], mut lookup: F) -> Self
    where
        F: FnMut(&str) -> Option<&'a Value>,
    {
        if let [column] = columns {
            return KeyValue::Scalar(lookup(column.as_str()).cloned().unwrap_or(Value::Null));
        }
        KeyValue::Composite(
            columns
                .iter()
                .map(|column| {
                    let value = lookup(column.as_str()).cloned().unwrap_or(Value::Null);
                    (column.clone(), value)
                })
                .collect(),
        )
    }

    /// True when every component is present
    pub fn is_complete(&self) -> bool {
        match self {
            KeyValue::Scalar(value) => !value.is_null(),
            KeyValue::Composite(parts) => {
                !parts.is_empty() && parts.iter().all(|(_, value)| !value.is_null())
            }
        }
    }

    /// Exact tuple match; both keys must be complete
    pub fn matches(&self, other: &KeyValue) -> bool {
        if !self.is_complete() || !other.is_complete() {
            return false;
        }
        match (self, other) {
            (KeyValue::Scalar(left), KeyValue::Scalar(right)) => values_equal(left, right),
            (KeyValue::Composite(left), KeyValue::Composite(right)) => {
                left.len() == right.len()
                    && left.iter().zip(right).all(|((left_column, left_value), (right_column, right_value))| {
                        left_column == right_column && values_equal(left_value, right_value)
                    })
            }
            _ => false,
        }
    }

    /// Key components in column order
    pub fn values(&self) -> Vec<Value> {
        match self {
            KeyValue::Scalar(value) => vec![value.clone()],
            KeyValue::Composite(parts) => parts.iter().map(|(_, value)| value.clone()).collect(),
        }
    }
}

impl fmt::Display for KeyValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            KeyValue::Scalar(value) => write!(f, "{}", value),
            KeyValue::Composite(parts) => {
                let pairs: Vec<String> = parts
                    .iter()
                    .map(|(column, value)| format!("{}:{}", column, value))
                    .collect();
                write!(f, "{}", pairs.join(","))
            }
        }
    }
}

/// Field value equality used for key matching and filters.
///
/// Numbers compare equal to strings holding the same number, since form
/// payloads carry ids as strings while stored rows carry them as numbers.
pub fn values_equal(left: &Value, right: &Value) -> bool {
    match (left, right) {
        (Value::Number(number), Value::String(text)) | (Value::String(text), Value::Number(number)) => {
            number_equals_text(number, text)
        }
        (Value::Number(left), Value::Number(right)) => match (left.as_i64(), right.as_i64()) {
            (Some(left), Some(right)) => left == right,
            _ => left.as_f64() == right.as_f64(),
        },
        _ => left == right,
    }
}

fn number_equals_text(number: &serde_json::Number, text: &str) -> bool {
    let text = text.trim();
    if let (Some(number), Ok(parsed)) = (number.as_i64(), text.parse::<i64>()) {
        return number == parsed;
    }
    if let (Some(number), Ok(parsed)) = (number.as_u64(), text.parse::<u64>()) {
        return number == parsed;
    }
    match (number.as_f64(), text.parse::<f64>()) {
        (Some(number), Ok(parsed)) => number == parsed,
        _ => false,
    }
}

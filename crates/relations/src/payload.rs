//! Submitted relation data and scope selection

use serde_json::Value;

use crate::error::{RelationError, RelationResult};
use crate::record::Fields;
use crate::rows::{IndexedRows, RowIndex};

/// Where the relation payload sits inside submitted data
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum PayloadScope {
    /// Under the child entity's form name
    #[default]
    FormName,
    /// The submitted data is the payload itself
    Whole,
    /// Under an explicit key
    Key(String),
}

impl PayloadScope {
    pub fn key(key: &str) -> Self {
        PayloadScope::Key(key.to_string())
    }

    /// Select the payload from submitted data; `None` when the key is absent
    pub fn select<'a>(&self, data: &'a Value, form_name: &str) -> Option<&'a Value> {
        match self {
            PayloadScope::Whole => Some(data),
            PayloadScope::FormName => data.get(form_name),
            PayloadScope::Key(key) => data.get(key),
        }
    }
}

/// Payload for one relation
#[derive(Debug, Clone, PartialEq)]
pub enum Payload {
    /// Fields of the only child of a one-to-one relation
    Single(Fields),
    /// Per-child fields of a one-to-many relation, in submission order
    Many(IndexedRows<Fields>),
}

impl Payload {
    /// Interpret raw data as the payload of a relation.
    ///
    /// Null is an empty payload. Collections accept arrays (keyed by
    /// position) and objects (keyed by their keys, numeric keys becoming
    /// positions).
    pub fn from_value(value: &Value, multiple: bool, relation: &str) -> RelationResult<Self> {
        if !multiple {
            return match value {
                Value::Null => Ok(Payload::Single(Fields::new())),
                Value::Object(_) => Ok(Payload::Single(object_fields(value, relation)?)),
                other => Err(RelationError::invalid_payload(
                    relation,
                    format!("expected an object, got {}", type_name(other)),
                )),
            };
        }

        let mut rows = IndexedRows::new();
        match value {
            Value::Null => {}
            Value::Array(entries) => {
                for (position, entry) in entries.iter().enumerate() {
                    rows.insert(RowIndex::from(position), object_fields(entry, relation)?);
                }
            }
            Value::Object(entries) => {
                for (key, entry) in entries {
                    rows.insert(RowIndex::parse(key), object_fields(entry, relation)?);
                }
            }
            other => {
                return Err(RelationError::invalid_payload(
                    relation,
                    format!("expected an array or object of rows, got {}", type_name(other)),
                ))
            }
        }
        Ok(Payload::Many(rows))
    }

    pub fn len(&self) -> usize {
        match self {
            Payload::Single(_) => 1,
            Payload::Many(rows) => rows.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        matches!(self, Payload::Many(rows) if rows.is_empty())
    }
}

fn object_fields(value: &Value, relation: &str) -> RelationResult<Fields> {
    match value {
        Value::Object(map) => Ok(map.iter().map(|(k, v)| (k.clone(), v.clone())).collect()),
        other => Err(RelationError::invalid_payload(
            relation,
            format!("expected row fields as an object, got {}", type_name(other)),
        )),
    }
}

fn type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}

//! Ordered, index-keyed row collections
//!
//! Payloads for one-to-many relations arrive as an ordered mapping from an
//! index (a position or a string key) to the fields of each child. The same
//! shape is kept for reconciled children and for per-child errors so callers
//! can correlate all three by index.

use std::fmt;

use serde::ser::{Serialize, Serializer};
use serde::Deserialize;
use serde_json::Value;

/// Index of a row in a payload or a relation collection
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Deserialize)]
#[serde(untagged)]
pub enum RowIndex {
    /// Numeric position, as produced by arrays and numeric object keys
    Position(u64),
    /// Named key, as produced by `index_by` columns holding strings
    Key(String),
}

impl RowIndex {
    /// Parse a payload key; numeric keys become positions
    pub fn parse(key: &str) -> Self {
        key.parse::<u64>()
            .map(Self::Position)
            .unwrap_or_else(|_| Self::Key(key.to_string()))
    }

    /// Index derived from a column value, `None` for nulls and containers
    pub fn from_value(value: &Value) -> Option<Self> {
        match value {
            Value::Number(number) => Some(
                number
                    .as_u64()
                    .map(Self::Position)
                    .unwrap_or_else(|| Self::Key(number.to_string())),
            ),
            Value::String(key) => Some(Self::parse(key)),
            Value::Bool(flag) => Some(Self::Key(flag.to_string())),
            _ => None,
        }
    }
}

impl fmt::Display for RowIndex {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RowIndex::Position(position) => write!(f, "{}", position),
            RowIndex::Key(key) => write!(f, "{}", key),
        }
    }
}

impl From<usize> for RowIndex {
    fn from(position: usize) -> Self {
        RowIndex::Position(position as u64)
    }
}

impl From<&str> for RowIndex {
    fn from(key: &str) -> Self {
        RowIndex::parse(key)
    }
}

impl Serialize for RowIndex {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            RowIndex::Position(position) => serializer.serialize_u64(*position),
            RowIndex::Key(key) => serializer.serialize_str(key),
        }
    }
}

/// Rows in insertion order, each addressed by a unique [`RowIndex`]
#[derive(Debug, Clone, PartialEq)]
pub struct IndexedRows<T> {
    rows: Vec<(RowIndex, T)>,
}

impl<T> Default for IndexedRows<T> {
    fn default() -> Self {
        Self { rows: Vec::new() }
    }
}

impl<T> IndexedRows<T> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Insert a row; an existing row with the same index is replaced in place
    pub fn insert(&mut self, index: RowIndex, value: T) -> Option<T> {
        match self.rows.iter_mut().find(|(existing, _)| *existing == index) {
            Some((_, slot)) => Some(std::mem::replace(slot, value)),
            None => {
                self.rows.push((index, value));
                None
            }
        }
    }

    pub fn get(&self, index: &RowIndex) -> Option<&T> {
        self.rows
            .iter()
            .find(|(existing, _)| existing == index)
            .map(|(_, value)| value)
    }

    pub fn get_mut(&mut self, index: &RowIndex) -> Option<&mut T> {
        self.rows
            .iter_mut()
            .find(|(existing, _)| existing == index)
            .map(|(_, value)| value)
    }

    pub fn contains(&self, index: &RowIndex) -> bool {
        self.get(index).is_some()
    }

    /// Remove a row, keeping the order of the remaining rows
    pub fn remove(&mut self, index: &RowIndex) -> Option<T> {
        let position = self.rows.iter().position(|(existing, _)| existing == index)?;
        Some(self.rows.remove(position).1)
    }

    /// Remove and return the first row accepted by `predicate`
    pub fn take_first<F>(&mut self, mut predicate: F) -> Option<(RowIndex, T)>
    where
        F: FnMut(&T) -> bool,
    {
        let position = self.rows.iter().position(|(_, value)| predicate(value))?;
        Some(self.rows.remove(position))
    }

    pub fn iter(&self) -> impl Iterator<Item = (&RowIndex, &T)> {
        self.rows.iter().map(|(index, value)| (index, value))
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = (&RowIndex, &mut T)> {
        self.rows.iter_mut().map(|(index, value)| (&*index, value))
    }

    pub fn indices(&self) -> impl Iterator<Item = &RowIndex> {
        self.rows.iter().map(|(index, _)| index)
    }

    pub fn values(&self) -> impl Iterator<Item = &T> {
        self.rows.iter().map(|(_, value)| value)
    }

    pub fn into_values(self) -> impl Iterator<Item = T> {
        self.rows.into_iter().map(|(_, value)| value)
    }
}

impl<T> FromIterator<(RowIndex, T)> for IndexedRows<T> {
    fn from_iter<I: IntoIterator<Item = (RowIndex, T)>>(iter: I) -> Self {
        let mut rows = Self::new();
        for (index, value) in iter {
            rows.insert(index, value);
        }
        rows
    }
}

impl<T> IntoIterator for IndexedRows<T> {
    type Item = (RowIndex, T);
    type IntoIter = std::vec::IntoIter<(RowIndex, T)>;

    fn into_iter(self) -> Self::IntoIter {
        self.rows.into_iter()
    }
}

// Serialized as a map keyed by the displayed index, in row order
impl<T: Serialize> Serialize for IndexedRows<T> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_map(self.rows.iter().map(|(index, value)| (index.to_string(), value)))
    }
}

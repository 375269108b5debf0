//! Related error state - Per-relation validation errors of child records

use std::collections::BTreeMap;

use serde::Serialize;

use crate::rows::{IndexedRows, RowIndex};

/// First error message per field of one record
pub type FieldErrors = BTreeMap<String, String>;

/// Validation errors of one relation
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum RelationErrors {
    /// Errors of the child of a one-to-one relation
    Single(FieldErrors),
    /// Errors per submitted index; every validated index has an entry
    Multiple(IndexedRows<FieldErrors>),
}

impl RelationErrors {
    /// Empty error set matching a relation's multiplicity
    pub fn empty(multiple: bool) -> Self {
        if multiple {
            RelationErrors::Multiple(IndexedRows::new())
        } else {
            RelationErrors::Single(FieldErrors::new())
        }
    }

    /// True if any child has at least one field error
    pub fn has_errors(&self) -> bool {
        match self {
            RelationErrors::Single(fields) => !fields.is_empty(),
            RelationErrors::Multiple(rows) => rows.values().any(|fields| !fields.is_empty()),
        }
    }

    /// Errors of the child at an index (one-to-many only)
    pub fn for_index(&self, index: &RowIndex) -> Option<&FieldErrors> {
        match self {
            RelationErrors::Multiple(rows) => rows.get(index),
            RelationErrors::Single(_) => None,
        }
    }

    /// Errors of the single child (one-to-one only)
    pub fn fields(&self) -> Option<&FieldErrors> {
        match self {
            RelationErrors::Single(fields) => Some(fields),
            RelationErrors::Multiple(_) => None,
        }
    }

    /// Number of children with at least one error
    pub fn failed_count(&self) -> usize {
        match self {
            RelationErrors::Single(fields) => usize::from(!fields.is_empty()),
            RelationErrors::Multiple(rows) => rows.values().filter(|fields| !fields.is_empty()).count(),
        }
    }

    /// Merge newer errors into this set; a change of shape replaces it
    pub fn merge(&mut self, newer: RelationErrors) {
        match (self, newer) {
            (RelationErrors::Single(current), RelationErrors::Single(newer)) => current.extend(newer),
            (RelationErrors::Multiple(current), RelationErrors::Multiple(newer)) => {
                for (index, fields) in newer {
                    match current.get_mut(&index) {
                        Some(existing) => existing.extend(fields),
                        None => {
                            current.insert(index, fields);
                        }
                    }
                }
            }
            (current, newer) => *current = newer,
        }
    }
}

/// Validation errors of every relation processed by one orchestrator
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(transparent)]
pub struct RelatedErrors {
    relations: BTreeMap<String, RelationErrors>,
}

impl RelatedErrors {
    pub fn new() -> Self {
        Self::default()
    }

    /// Reset a relation's errors to an empty set
    pub fn clear(&mut self, relation: &str, multiple: bool) {
        self.relations
            .insert(relation.to_string(), RelationErrors::empty(multiple));
    }

    /// Record a validation pass, accumulating into existing errors
    pub fn record(&mut self, relation: &str, errors: RelationErrors) {
        match self.relations.get_mut(relation) {
            Some(existing) => existing.merge(errors),
            None => {
                self.relations.insert(relation.to_string(), errors);
            }
        }
    }

    /// Whether one relation, or any relation when `None`, has errors
    pub fn has_errors(&self, relation: Option<&str>) -> bool {
        match relation {
            Some(name) => self
                .relations
                .get(name)
                .map(RelationErrors::has_errors)
                .unwrap_or(false),
            None => self.relations.values().any(RelationErrors::has_errors),
        }
    }

    pub fn get(&self, relation: &str) -> Option<&RelationErrors> {
        self.relations.get(relation)
    }

    pub fn all(&self) -> &BTreeMap<String, RelationErrors> {
        &self.relations
    }

    pub fn is_empty(&self) -> bool {
        self.relations.is_empty()
    }

    /// Convert to a JSON value for API responses
    pub fn to_json(&self) -> serde_json::Value {
        serde_json::to_value(self).unwrap_or(serde_json::Value::Null)
    }
}

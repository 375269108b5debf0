//! Relation descriptors - Static metadata for a named parent/child relation

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{RelationError, RelationResult};
use crate::filter::Filter;
use crate::record::{Fields, ParentRecord, Record};

/// Multiplicity of a relation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum RelationKind {
    /// One-to-one relationship (hasOne)
    HasOne,
    /// One-to-many relationship (hasMany)
    HasMany,
}

impl RelationKind {
    /// Returns true if this relation holds a collection
    pub fn is_collection(self) -> bool {
        matches!(self, Self::HasMany)
    }
}

/// Metadata describing how children of one entity type belong to a parent
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RelationDescriptor {
    /// Name of the relation on the parent
    pub name: String,

    /// Entity type of the children
    pub target: String,

    pub kind: RelationKind,

    /// Ordered `(child column, parent field)` pairs tying a child to its parent
    pub link: Vec<(String, String)>,

    /// Child column whose value keys the attached children. When set, payload
    /// entries are matched to children by index instead of primary key.
    pub index_by: Option<String>,
}

impl RelationDescriptor {
    pub fn new(kind: RelationKind, name: &str, target: &str) -> Self {
        Self {
            name: name.to_string(),
            target: target.to_string(),
            kind,
            link: Vec::new(),
            index_by: None,
        }
    }

    pub fn has_many(name: &str, target: &str) -> Self {
        Self::new(RelationKind::HasMany, name, target)
    }

    pub fn has_one(name: &str, target: &str) -> Self {
        Self::new(RelationKind::HasOne, name, target)
    }

    /// Add a `child column = parent field` link pair
    pub fn link(mut self, child_column: &str, parent_field: &str) -> Self {
        self.link
            .push((child_column.to_string(), parent_field.to_string()));
        self
    }

    /// Match payload entries to children by the value of this column
    pub fn index_by(mut self, column: &str) -> Self {
        self.index_by = Some(column.to_string());
        self
    }

    pub fn is_multiple(&self) -> bool {
        self.kind.is_collection()
    }

    /// True when a child column is determined by the link
    pub fn is_link_column(&self, column: &str) -> bool {
        self.link.iter().any(|(child, _)| child == column)
    }

    /// Validate the descriptor for consistency
    pub fn validate(&self) -> RelationResult<()> {
        if self.name.is_empty() || self.target.is_empty() {
            return Err(RelationError::Configuration(
                "Relation name and target entity must not be empty".to_string(),
            ));
        }

        if self.link.is_empty() {
            return Err(RelationError::Configuration(format!(
                "Relation '{}' must link at least one column",
                self.name
            )));
        }

        for (position, (child, _)) in self.link.iter().enumerate() {
            if self.link[..position].iter().any(|(other, _)| other == child) {
                return Err(RelationError::Configuration(format!(
                    "Relation '{}' links column '{}' more than once",
                    self.name, child
                )));
            }
        }

        if self.index_by.is_some() && !self.is_multiple() {
            return Err(RelationError::Configuration(format!(
                "Relation '{}' is one-to-one and cannot be indexed",
                self.name
            )));
        }

        Ok(())
    }

    /// Current parent values for every link column, keyed by child column
    pub fn link_values<P: ParentRecord + ?Sized>(&self, parent: &P) -> Fields {
        self.link
            .iter()
            .map(|(child, parent_field)| {
                let value = parent.field(parent_field).unwrap_or(Value::Null);
                (child.clone(), value)
            })
            .collect()
    }

    /// Overwrite a child's link columns with the given parent values
    pub fn apply_link<R: Record + ?Sized>(&self, child: &mut R, links: &Fields) {
        for (column, _) in &self.link {
            let value = links.get(column).cloned().unwrap_or(Value::Null);
            child.set(column, value);
        }
    }

    /// Equality filter on the link columns, in link order
    pub fn link_filter(&self, links: &Fields) -> Filter {
        self.link.iter().fold(Filter::new(), |filter, (column, _)| {
            let value = links.get(column).cloned().unwrap_or(Value::Null);
            filter.where_eq(column, value)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_builder() {
        let relation = RelationDescriptor::has_many("items", "order_item")
            .link("order_id", "id")
            .index_by("line");

        assert!(relation.is_multiple());
        assert!(relation.is_link_column("order_id"));
        assert!(!relation.is_link_column("line"));
        assert_eq!(relation.index_by.as_deref(), Some("line"));
        assert!(relation.validate().is_ok());
    }

    #[test]
    fn test_validation_rejects_inconsistent_descriptors() {
        assert!(RelationDescriptor::has_many("items", "order_item").validate().is_err());

        let duplicated = RelationDescriptor::has_many("items", "order_item")
            .link("order_id", "id")
            .link("order_id", "number");
        assert!(duplicated.validate().is_err());

        let indexed_single = RelationDescriptor::has_one("invoice", "invoice")
            .link("order_id", "id")
            .index_by("id");
        assert!(indexed_single.validate().is_err());
    }

    #[test]
    fn test_link_filter_follows_link_order() {
        let relation = RelationDescriptor::has_many("items", "order_item")
            .link("order_id", "id")
            .link("tenant_id", "tenant_id");
        let mut links = Fields::new();
        links.insert("order_id".to_string(), json!(4));
        links.insert("tenant_id".to_string(), json!("acme"));

        assert_eq!(
            relation.link_filter(&links).to_string(),
            "order_id = 4 AND tenant_id = \"acme\""
        );
    }
}

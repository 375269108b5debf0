//! Storage capability - The record, storage and parent contracts the relation
//! core calls into.
//!
//! The relation core never talks to a database directly. Everything it needs
//! from the persistence layer is expressed by these three traits; see
//! [`crate::memory`] for an in-memory implementation.

use std::collections::HashMap;
use std::fmt::Debug;

use serde_json::Value;

use crate::error::{RelationError, RelationResult};
use crate::filter::Filter;
use crate::related::Related;
use crate::related_errors::FieldErrors;
use crate::relation::RelationDescriptor;

/// Field name to value map
pub type Fields = HashMap<String, Value>;

/// A record whose fields can be read and written by name
pub trait Record: Debug {
    /// Entity type name of this record
    fn entity(&self) -> &str;

    /// Current value of a field
    fn get(&self, field: &str) -> Option<&Value>;

    /// Assign a field
    fn set(&mut self, field: &str, value: Value);

    /// Assign every field in the map, bypassing mass-assignment filters
    fn load(&mut self, fields: &Fields) {
        for (field, value) in fields {
            self.set(field, value.clone());
        }
    }

    /// True until the record has been inserted
    fn is_new_record(&self) -> bool;

    /// Forget the persisted identity so the next save inserts the record
    fn mark_new(&mut self);

    /// Active validation scenario
    fn scenario(&self) -> &str;

    fn set_scenario(&mut self, scenario: &str);
}

/// Record persistence primitives for any entity type
pub trait Storage {
    type Record: Record;

    /// Ordered primary key column names of an entity type
    fn primary_key(&self, entity: &str) -> RelationResult<Vec<String>>;

    /// Key under which submitted data for this entity is nested
    fn form_name(&self, entity: &str) -> RelationResult<String> {
        Ok(entity.to_string())
    }

    /// Blank record of an entity type
    fn instantiate(&self, entity: &str) -> RelationResult<Self::Record>;

    /// Validate a record in its current scenario; an empty map means valid
    fn validate(&self, record: &Self::Record) -> RelationResult<FieldErrors>;

    /// Insert or update a record without re-running validation
    fn save(&mut self, record: &mut Self::Record) -> RelationResult<()>;

    fn delete(&mut self, record: &Self::Record) -> RelationResult<()>;

    /// Records of an entity type matching a filter, in storage order
    fn find(&self, entity: &str, filter: &Filter) -> RelationResult<Vec<Self::Record>>;
}

/// The owning record of a set of relations
pub trait ParentRecord {
    type Child: Record;

    /// Entity type name of the parent
    fn entity(&self) -> &str;

    /// Relation descriptor by name, `None` when the name is not a relation
    fn find_relation(&self, name: &str) -> Option<RelationDescriptor>;

    /// Relation descriptor by name, failing for unknown names
    fn relation(&self, name: &str) -> RelationResult<RelationDescriptor> {
        self.find_relation(name)
            .ok_or_else(|| RelationError::unknown_relation(self.entity(), name))
    }

    /// Current value of a parent field
    fn field(&self, name: &str) -> Option<Value>;

    /// Cached children of a relation, `None` when not populated yet
    fn related(&self, name: &str) -> Option<&Related<Self::Child>>;

    /// Remove and return the cached children of a relation
    fn take_related(&mut self, name: &str) -> Option<Related<Self::Child>>;

    /// Replace the cached children of a relation
    fn populate_relation(&mut self, name: &str, related: Related<Self::Child>);

    /// Attach an error message to a parent attribute
    fn add_error(&mut self, attribute: &str, message: &str);
}

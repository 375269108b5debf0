//! Relation Registry - Named relation descriptors per parent entity type

use std::collections::{BTreeMap, HashMap};

use tracing::debug;

use crate::error::RelationResult;
use super::relation::RelationDescriptor;

/// Registry of relation descriptors, keyed by parent entity and relation name.
///
/// Built once at startup and shared read-only (typically behind an `Arc`)
/// by every parent record of the registered entity types.
#[derive(Debug, Clone, Default)]
pub struct RelationRegistry {
    relations: HashMap<String, BTreeMap<String, RelationDescriptor>>,
}

impl RelationRegistry {
    /// Create a new empty relation registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a relation for a parent entity type
    pub fn register(&mut self, entity: &str, descriptor: RelationDescriptor) -> RelationResult<()> {
        descriptor.validate()?;

        debug!("Registering relation '{}' on '{}' -> '{}'", descriptor.name, entity, descriptor.target);
        self.relations
            .entry(entity.to_string())
            .or_default()
            .insert(descriptor.name.clone(), descriptor);
        Ok(())
    }

    /// Builder-style registration
    pub fn with(mut self, entity: &str, descriptor: RelationDescriptor) -> RelationResult<Self> {
        self.register(entity, descriptor)?;
        Ok(self)
    }

    /// Get a relation descriptor by entity and relation name
    pub fn get(&self, entity: &str, name: &str) -> Option<&RelationDescriptor> {
        self.relations.get(entity)?.get(name)
    }

    /// Check if a relation exists
    pub fn has_relation(&self, entity: &str, name: &str) -> bool {
        self.get(entity, name).is_some()
    }

    /// Get all relation names for an entity, sorted
    pub fn relation_names(&self, entity: &str) -> Vec<String> {
        self.relations
            .get(entity)
            .map(|relations| relations.keys().cloned().collect())
            .unwrap_or_default()
    }
}

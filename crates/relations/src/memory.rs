//! In-memory storage - A [`Storage`] and [`ParentRecord`] implementation
//! backed by plain collections.
//!
//! Entity schemas declare the primary key, an optional auto-increment column,
//! unique constraints and validation rules. Every write is recorded in a
//! journal so callers can inspect the exact order of writes.

use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::sync::Arc;

use serde_json::Value;

use crate::error::{RelationError, RelationResult};
use crate::filter::Filter;
use crate::key::KeyValue;
use crate::record::{Fields, ParentRecord, Record, Storage};
use crate::registry::RelationRegistry;
use crate::related::Related;
use crate::related_errors::FieldErrors;
use crate::relation::RelationDescriptor;

pub const DEFAULT_SCENARIO: &str = "default";

/// A record of any entity type held as a field map
#[derive(Debug, Clone, PartialEq)]
pub struct Entity {
    entity: String,
    fields: Fields,
    scenario: String,
    /// Key of the stored row this record was read from or written to
    stored_key: Option<KeyValue>,
}

impl Entity {
    pub fn new(entity: &str) -> Self {
        Self {
            entity: entity.to_string(),
            fields: Fields::new(),
            scenario: DEFAULT_SCENARIO.to_string(),
            stored_key: None,
        }
    }

    /// Builder-style field assignment
    pub fn with<T: Into<Value>>(mut self, field: &str, value: T) -> Self {
        self.fields.insert(field.to_string(), value.into());
        self
    }

    pub fn fields(&self) -> &Fields {
        &self.fields
    }
}

impl Record for Entity {
    fn entity(&self) -> &str {
        &self.entity
    }

    fn get(&self, field: &str) -> Option<&Value> {
        self.fields.get(field)
    }

    fn set(&mut self, field: &str, value: Value) {
        self.fields.insert(field.to_string(), value);
    }

    fn is_new_record(&self) -> bool {
        self.stored_key.is_none()
    }

    fn mark_new(&mut self) {
        self.stored_key = None;
    }

    fn scenario(&self) -> &str {
        &self.scenario
    }

    fn set_scenario(&mut self, scenario: &str) {
        self.scenario = scenario.to_string();
    }
}

type Check = Arc<dyn Fn(&Value) -> Option<String> + Send + Sync>;

#[derive(Clone)]
enum RuleKind {
    Required,
    MaxLength(usize),
    Integer,
    Custom(Check),
}

/// Field validation rule, optionally limited to some scenarios
#[derive(Clone)]
pub struct Rule {
    field: String,
    kind: RuleKind,
    scenarios: Vec<String>,
}

impl Rule {
    fn new(field: &str, kind: RuleKind) -> Self {
        Self {
            field: field.to_string(),
            kind,
            scenarios: Vec::new(),
        }
    }

    /// Field must be present, non-null and not an empty string
    pub fn required(field: &str) -> Self {
        Self::new(field, RuleKind::Required)
    }

    /// String field must not exceed `max` characters
    pub fn max_length(field: &str, max: usize) -> Self {
        Self::new(field, RuleKind::MaxLength(max))
    }

    /// Field must hold an integer or an integer string
    pub fn integer(field: &str) -> Self {
        Self::new(field, RuleKind::Integer)
    }

    /// Custom check returning an error message for invalid values
    pub fn custom<F>(field: &str, check: F) -> Self
    where
        F: Fn(&Value) -> Option<String> + Send + Sync + 'static,
    {
        Self::new(field, RuleKind::Custom(Arc::new(check)))
    }

    /// Apply only in this scenario (may be repeated)
    pub fn on(mut self, scenario: &str) -> Self {
        self.scenarios.push(scenario.to_string());
        self
    }

    fn applies_to(&self, scenario: &str) -> bool {
        self.scenarios.is_empty() || self.scenarios.iter().any(|s| s == scenario)
    }

    fn check(&self, value: Option<&Value>) -> Option<String> {
        let label = humanize(&self.field);
        let value = value.unwrap_or(&Value::Null);
        let blank = value.is_null() || value.as_str().is_some_and(|text| text.trim().is_empty());

        match &self.kind {
            RuleKind::Required if blank => Some(format!("{} cannot be blank.", label)),
            RuleKind::Required => None,
            // Remaining rules skip blank values
            _ if blank => None,
            RuleKind::MaxLength(max) => match value.as_str() {
                Some(text) if text.chars().count() > *max => Some(format!(
                    "{} should contain at most {} characters.",
                    label, max
                )),
                _ => None,
            },
            RuleKind::Integer => {
                let valid = value.as_i64().is_some()
                    || value.as_u64().is_some()
                    || value.as_str().is_some_and(|text| text.trim().parse::<i64>().is_ok());
                (!valid).then(|| format!("{} must be an integer.", label))
            }
            RuleKind::Custom(check) => check(value),
        }
    }
}

impl fmt::Debug for Rule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let kind = match &self.kind {
            RuleKind::Required => "required".to_string(),
            RuleKind::MaxLength(max) => format!("max_length({})", max),
            RuleKind::Integer => "integer".to_string(),
            RuleKind::Custom(_) => "custom".to_string(),
        };
        f.debug_struct("Rule")
            .field("field", &self.field)
            .field("kind", &kind)
            .field("scenarios", &self.scenarios)
            .finish()
    }
}

fn humanize(field: &str) -> String {
    let words = field.replace('_', " ");
    let mut chars = words.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

/// Storage schema of one entity type
#[derive(Debug, Clone)]
pub struct EntitySchema {
    name: String,
    primary_key: Vec<String>,
    auto_increment: Option<String>,
    form_name: Option<String>,
    unique: Vec<Vec<String>>,
    rules: Vec<Rule>,
}

impl EntitySchema {
    pub fn new(name: &str, primary_key: &[&str]) -> Self {
        Self {
            name: name.to_string(),
            primary_key: primary_key.iter().map(|column| column.to_string()).collect(),
            auto_increment: None,
            form_name: None,
            unique: Vec::new(),
            rules: Vec::new(),
        }
    }

    /// Column filled from a sequence when a new record leaves it null
    pub fn auto_increment(mut self, column: &str) -> Self {
        self.auto_increment = Some(column.to_string());
        self
    }

    /// Key under which submitted data for this entity is nested
    pub fn form_name(mut self, form_name: &str) -> Self {
        self.form_name = Some(form_name.to_string());
        self
    }

    /// Unique constraint over one or more columns
    pub fn unique(mut self, columns: &[&str]) -> Self {
        self.unique
            .push(columns.iter().map(|column| column.to_string()).collect());
        self
    }

    pub fn rule(mut self, rule: Rule) -> Self {
        self.rules.push(rule);
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }
}

/// A write recorded by [`MemoryStore`]
#[derive(Debug, Clone, PartialEq)]
pub enum StoreOperation {
    Insert { entity: String, key: KeyValue },
    Update { entity: String, key: KeyValue },
    Delete { entity: String, key: KeyValue },
}

impl StoreOperation {
    pub fn entity(&self) -> &str {
        match self {
            StoreOperation::Insert { entity, .. }
            | StoreOperation::Update { entity, .. }
            | StoreOperation::Delete { entity, .. } => entity,
        }
    }
}

impl fmt::Display for StoreOperation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StoreOperation::Insert { entity, key } => write!(f, "insert {} {}", entity, key),
            StoreOperation::Update { entity, key } => write!(f, "update {} {}", entity, key),
            StoreOperation::Delete { entity, key } => write!(f, "delete {} {}", entity, key),
        }
    }
}

/// In-memory storage collaborator
#[derive(Debug, Default)]
pub struct MemoryStore {
    schemas: HashMap<String, EntitySchema>,
    tables: HashMap<String, Vec<Fields>>,
    sequences: HashMap<String, i64>,
    journal: Vec<StoreOperation>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an entity schema
    pub fn define(&mut self, schema: EntitySchema) -> RelationResult<()> {
        if schema.primary_key.is_empty() {
            return Err(RelationError::Configuration(format!(
                "Entity '{}' must declare a primary key",
                schema.name
            )));
        }
        self.tables.entry(schema.name.clone()).or_default();
        self.schemas.insert(schema.name.clone(), schema);
        Ok(())
    }

    /// Builder-style schema registration
    pub fn with_schema(mut self, schema: EntitySchema) -> RelationResult<Self> {
        self.define(schema)?;
        Ok(self)
    }

    fn schema(&self, entity: &str) -> RelationResult<&EntitySchema> {
        self.schemas
            .get(entity)
            .ok_or_else(|| RelationError::UnknownEntity(entity.to_string()))
    }

    /// Insert a row directly, without validation
    pub fn seed(&mut self, record: Entity) -> RelationResult<Entity> {
        let mut record = record;
        record.mark_new();
        self.save(&mut record)?;
        Ok(record)
    }

    /// Stored rows of an entity type, in storage order
    pub fn rows(&self, entity: &str) -> &[Fields] {
        self.tables.get(entity).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Stored record of an entity type by primary key
    pub fn find_by_key(&self, entity: &str, key: &KeyValue) -> RelationResult<Option<Entity>> {
        let schema = self.schema(entity)?;
        Ok(self
            .rows(entity)
            .iter()
            .find(|row| KeyValue::from_fields(&schema.primary_key, row).matches(key))
            .map(|row| stored_entity(schema, row)))
    }

    /// Writes performed since creation or the last [`clear_journal`](Self::clear_journal)
    pub fn journal(&self) -> &[StoreOperation] {
        &self.journal
    }

    pub fn clear_journal(&mut self) {
        self.journal.clear();
    }

    // Sequence values are never reused, even after deletes
    fn next_sequence_value(&self, entity: &str, column: &str) -> i64 {
        let issued = self.sequences.get(entity).copied().unwrap_or(0);
        let stored = self
            .rows(entity)
            .iter()
            .filter_map(|row| row.get(column).and_then(Value::as_i64))
            .max()
            .unwrap_or(0);
        issued.max(stored) + 1
    }

    fn check_unique(
        &self,
        schema: &EntitySchema,
        fields: &Fields,
        skip: Option<usize>,
    ) -> RelationResult<()> {
        let rows = self.rows(&schema.name);
        let constraints = std::iter::once(&schema.primary_key).chain(schema.unique.iter());

        for columns in constraints {
            let key = KeyValue::from_fields(columns, fields);
            let conflict = rows
                .iter()
                .enumerate()
                .filter(|(position, _)| Some(*position) != skip)
                .any(|(_, row)| KeyValue::from_fields(columns, row).matches(&key));
            if conflict {
                return Err(RelationError::save_failed(
                    &schema.name,
                    format!("duplicate value for unique columns ({}): {}", columns.join(", "), key),
                ));
            }
        }
        Ok(())
    }
}

fn stored_entity(schema: &EntitySchema, row: &Fields) -> Entity {
    Entity {
        entity: schema.name.clone(),
        fields: row.clone(),
        scenario: DEFAULT_SCENARIO.to_string(),
        stored_key: Some(KeyValue::from_fields(&schema.primary_key, row)),
    }
}

impl Storage for MemoryStore {
    type Record = Entity;

    fn primary_key(&self, entity: &str) -> RelationResult<Vec<String>> {
        Ok(self.schema(entity)?.primary_key.clone())
    }

    fn form_name(&self, entity: &str) -> RelationResult<String> {
        let schema = self.schema(entity)?;
        Ok(schema.form_name.clone().unwrap_or_else(|| schema.name.clone()))
    }

    fn instantiate(&self, entity: &str) -> RelationResult<Entity> {
        self.schema(entity)?;
        Ok(Entity::new(entity))
    }

    fn validate(&self, record: &Entity) -> RelationResult<FieldErrors> {
        let schema = self.schema(&record.entity)?;
        let mut errors = FieldErrors::new();
        for rule in schema.rules.iter().filter(|rule| rule.applies_to(&record.scenario)) {
            if errors.contains_key(&rule.field) {
                continue;
            }
            if let Some(message) = rule.check(record.get(&rule.field)) {
                errors.insert(rule.field.clone(), message);
            }
        }
        Ok(errors)
    }

    fn save(&mut self, record: &mut Entity) -> RelationResult<()> {
        let schema = self.schema(&record.entity)?.clone();

        match record.stored_key.clone() {
            None => {
                if let Some(column) = schema.auto_increment.as_deref() {
                    if record.get(column).map_or(true, Value::is_null) {
                        let next = self.next_sequence_value(&schema.name, column);
                        record.set(column, Value::from(next));
                    }
                }

                let key = KeyValue::from_fields(&schema.primary_key, &record.fields);
                if !key.is_complete() {
                    return Err(RelationError::save_failed(
                        &schema.name,
                        format!("primary key ({}) is incomplete", schema.primary_key.join(", ")),
                    ));
                }
                self.check_unique(&schema, &record.fields, None)?;

                if let Some(column) = schema.auto_increment.as_deref() {
                    if let Some(value) = record.get(column).and_then(Value::as_i64) {
                        let issued = self.sequences.entry(schema.name.clone()).or_insert(0);
                        *issued = (*issued).max(value);
                    }
                }
                self.tables
                    .entry(schema.name.clone())
                    .or_default()
                    .push(record.fields.clone());
                record.stored_key = Some(key.clone());
                self.journal.push(StoreOperation::Insert {
                    entity: schema.name,
                    key,
                });
            }
            Some(stored_key) => {
                let position = self
                    .rows(&schema.name)
                    .iter()
                    .position(|row| KeyValue::from_fields(&schema.primary_key, row).matches(&stored_key))
                    .ok_or_else(|| {
                        RelationError::save_failed(&schema.name, format!("row {} no longer exists", stored_key))
                    })?;
                self.check_unique(&schema, &record.fields, Some(position))?;

                let key = KeyValue::from_fields(&schema.primary_key, &record.fields);
                if let Some(rows) = self.tables.get_mut(&schema.name) {
                    rows[position] = record.fields.clone();
                }
                record.stored_key = Some(key.clone());
                self.journal.push(StoreOperation::Update {
                    entity: schema.name,
                    key,
                });
            }
        }
        Ok(())
    }

    fn delete(&mut self, record: &Entity) -> RelationResult<()> {
        let schema = self.schema(&record.entity)?;
        let Some(stored_key) = record.stored_key.clone() else {
            return Err(RelationError::Storage(format!(
                "cannot delete a '{}' record that was never saved",
                record.entity
            )));
        };
        let primary_key = schema.primary_key.clone();

        if let Some(rows) = self.tables.get_mut(&record.entity) {
            let before = rows.len();
            rows.retain(|row| !KeyValue::from_fields(&primary_key, row).matches(&stored_key));
            if rows.len() < before {
                self.journal.push(StoreOperation::Delete {
                    entity: record.entity.clone(),
                    key: stored_key,
                });
            }
        }
        Ok(())
    }

    fn find(&self, entity: &str, filter: &Filter) -> RelationResult<Vec<Entity>> {
        let schema = self.schema(entity)?;
        Ok(self
            .rows(entity)
            .iter()
            .filter(|row| filter.matches(row))
            .map(|row| stored_entity(schema, row))
            .collect())
    }
}

/// Parent record backed by an [`Entity`] and a shared relation registry
#[derive(Debug, Clone)]
pub struct ParentModel {
    record: Entity,
    registry: Arc<RelationRegistry>,
    related: HashMap<String, Related<Entity>>,
    errors: BTreeMap<String, Vec<String>>,
}

impl ParentModel {
    pub fn new(record: Entity, registry: Arc<RelationRegistry>) -> Self {
        Self {
            record,
            registry,
            related: HashMap::new(),
            errors: BTreeMap::new(),
        }
    }

    pub fn record(&self) -> &Entity {
        &self.record
    }

    pub fn record_mut(&mut self) -> &mut Entity {
        &mut self.record
    }

    /// Errors attached to parent attributes
    pub fn errors(&self) -> &BTreeMap<String, Vec<String>> {
        &self.errors
    }

    pub fn has_errors(&self) -> bool {
        !self.errors.is_empty()
    }

    pub fn clear_errors(&mut self) {
        self.errors.clear();
    }

    /// Drop a cached relation so the next read loads it from storage
    pub fn unload_relation(&mut self, name: &str) {
        self.related.remove(name);
    }

    /// Validate the parent record itself, attaching failures as errors
    pub fn validate_with(&mut self, store: &MemoryStore) -> RelationResult<bool> {
        for (field, message) in store.validate(&self.record)? {
            self.add_error(&field, &message);
        }
        Ok(!self.has_errors())
    }

    /// Save the parent record itself
    pub fn save_with(&mut self, store: &mut MemoryStore) -> RelationResult<()> {
        store.save(&mut self.record)
    }
}

impl ParentRecord for ParentModel {
    type Child = Entity;

    fn entity(&self) -> &str {
        &self.record.entity
    }

    fn find_relation(&self, name: &str) -> Option<RelationDescriptor> {
        self.registry.get(&self.record.entity, name).cloned()
    }

    fn field(&self, name: &str) -> Option<Value> {
        self.record.get(name).cloned()
    }

    fn related(&self, name: &str) -> Option<&Related<Entity>> {
        self.related.get(name)
    }

    fn take_related(&mut self, name: &str) -> Option<Related<Entity>> {
        self.related.remove(name)
    }

    fn populate_relation(&mut self, name: &str, related: Related<Entity>) {
        self.related.insert(name.to_string(), related);
    }

    fn add_error(&mut self, attribute: &str, message: &str) {
        self.errors
            .entry(attribute.to_string())
            .or_default()
            .push(message.to_string());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn store() -> MemoryStore {
        MemoryStore::new()
            .with_schema(
                EntitySchema::new("order_item", &["id"])
                    .auto_increment("id")
                    .form_name("OrderItem")
                    .unique(&["order_id", "line"])
                    .rule(Rule::required("sku"))
                    .rule(Rule::max_length("sku", 8))
                    .rule(Rule::integer("qty"))
                    .rule(Rule::required("qty").on("strict")),
            )
            .unwrap()
    }

    #[test]
    fn test_define_requires_primary_key() {
        let result = MemoryStore::new().define(EntitySchema::new("log", &[]));
        assert!(matches!(result, Err(RelationError::Configuration(_))));
    }

    #[test]
    fn test_insert_assigns_sequence_and_journals() {
        let mut store = store();
        let first = store.seed(Entity::new("order_item").with("order_id", 1).with("line", 1).with("sku", "A")).unwrap();
        let second = store.seed(Entity::new("order_item").with("order_id", 1).with("line", 2).with("sku", "B")).unwrap();

        assert_eq!(first.get("id"), Some(&json!(1)));
        assert_eq!(second.get("id"), Some(&json!(2)));
        assert!(!second.is_new_record());
        assert_eq!(store.rows("order_item").len(), 2);
        assert_eq!(store.journal()[1].to_string(), "insert order_item 2");
    }

    #[test]
    fn test_unique_constraint_rejects_duplicates() {
        let mut store = store();
        store.seed(Entity::new("order_item").with("order_id", 1).with("line", 1)).unwrap();

        let mut duplicate = Entity::new("order_item").with("order_id", 1).with("line", 1);
        let err = store.save(&mut duplicate).unwrap_err();
        assert!(matches!(err, RelationError::SaveFailed { .. }));
        assert!(duplicate.is_new_record());
        assert_eq!(store.rows("order_item").len(), 1);
    }

    #[test]
    fn test_update_and_delete_by_stored_key() {
        let mut store = store();
        store.seed(Entity::new("order_item").with("order_id", 1).with("line", 1).with("sku", "A")).unwrap();

        let mut found = store.find("order_item", &Filter::new().where_eq("order_id", 1)).unwrap();
        let mut item = found.remove(0);
        item.set("sku", json!("Z"));
        store.save(&mut item).unwrap();
        let key = KeyValue::Scalar(json!(1));
        let stored = store.find_by_key("order_item", &key).unwrap().unwrap();
        assert_eq!(stored.get("sku"), Some(&json!("Z")));
        assert_eq!(store.journal()[1].entity(), "order_item");

        store.delete(&item).unwrap();
        assert!(store.rows("order_item").is_empty());
        assert!(store.find_by_key("order_item", &key).unwrap().is_none());
        assert!(matches!(store.journal().last(), Some(StoreOperation::Delete { .. })));

        let err = store.save(&mut item).unwrap_err();
        assert!(matches!(err, RelationError::SaveFailed { .. }));
    }

    #[test]
    fn test_validation_rules_and_scenarios() {
        let store = store();
        let mut item = Entity::new("order_item").with("sku", "TOO-LONG-SKU").with("qty", "x");

        let errors = store.validate(&item).unwrap();
        assert_eq!(errors.get("sku").unwrap(), "Sku should contain at most 8 characters.");
        assert_eq!(errors.get("qty").unwrap(), "Qty must be an integer.");

        item = Entity::new("order_item").with("sku", "A1");
        assert!(store.validate(&item).unwrap().is_empty());
        item.set_scenario("strict");
        assert_eq!(store.validate(&item).unwrap().get("qty").unwrap(), "Qty cannot be blank.");
    }

    #[test]
    fn test_unknown_entity() {
        let store = store();
        assert_eq!(
            store.instantiate("invoice").unwrap_err(),
            RelationError::UnknownEntity("invoice".to_string())
        );
        assert_eq!(store.form_name("order_item").unwrap(), "OrderItem");
    }

    #[test]
    fn test_parent_model_relations() {
        let registry = Arc::new(
            RelationRegistry::new()
                .with("order", RelationDescriptor::has_many("items", "order_item").link("order_id", "id"))
                .unwrap(),
        );
        let mut parent = ParentModel::new(Entity::new("order").with("id", 9), registry);

        assert!(parent.find_relation("items").is_some());
        assert!(matches!(
            parent.relation("payments"),
            Err(RelationError::UnknownRelation { .. })
        ));
        assert_eq!(parent.field("id"), Some(json!(9)));

        parent.populate_relation("items", Related::empty(true));
        assert!(parent.related("items").is_some());
        assert!(parent.take_related("items").is_some());
        assert!(parent.related("items").is_none());

        parent.add_error("items", "Related error");
        assert_eq!(parent.errors().get("items").unwrap(), &vec!["Related error".to_string()]);
        parent.clear_errors();
        assert!(!parent.has_errors());

        parent.populate_relation("items", Related::empty(true));
        parent.unload_relation("items");
        assert!(parent.related("items").is_none());
        assert_eq!(parent.record().get("id"), Some(&json!(9)));
    }
}

//! Shared fixture: orders with items, composite-key lines, one invoice and a
//! tag keyed by its order

#![allow(dead_code)]

use std::sync::Arc;

use elif_relations::memory::{Entity, EntitySchema, MemoryStore, ParentModel, Rule};
use elif_relations::{Fields, RelationDescriptor, RelationRegistry};
use serde_json::Value;

/// Install a test log subscriber once; `RUST_LOG=elif_relations=debug` shows
/// the orchestration logs
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

pub fn registry() -> Arc<RelationRegistry> {
    let registry = RelationRegistry::new()
        .with("order", RelationDescriptor::has_many("items", "order_item").link("order_id", "id"))
        .and_then(|registry| {
            registry.with("order", RelationDescriptor::has_many("lines", "order_line").link("order_id", "id"))
        })
        .and_then(|registry| {
            registry.with("order", RelationDescriptor::has_one("invoice", "invoice").link("order_id", "id"))
        })
        .and_then(|registry| {
            registry.with("order", RelationDescriptor::has_one("tag", "order_tag").link("order_id", "id"))
        })
        .expect("valid relations");
    Arc::new(registry)
}

pub fn store() -> MemoryStore {
    init_tracing();
    MemoryStore::new()
        .with_schema(EntitySchema::new("order", &["id"]).auto_increment("id"))
        .and_then(|store| {
            store.with_schema(
                EntitySchema::new("order_item", &["id"])
                    .auto_increment("id")
                    .form_name("OrderItem")
                    .unique(&["order_id", "sku"])
                    .rule(Rule::required("sku"))
                    .rule(Rule::max_length("sku", 12))
                    .rule(Rule::integer("qty"))
                    .rule(Rule::required("qty").on("strict")),
            )
        })
        .and_then(|store| {
            store.with_schema(
                EntitySchema::new("order_line", &["order_id", "line"])
                    .form_name("OrderLine")
                    .rule(Rule::required("line")),
            )
        })
        .and_then(|store| {
            store.with_schema(
                EntitySchema::new("invoice", &["id"])
                    .auto_increment("id")
                    .form_name("Invoice")
                    .unique(&["order_id"])
                    .rule(Rule::required("number")),
            )
        })
        .and_then(|store| store.with_schema(EntitySchema::new("order_tag", &["order_id"]).form_name("OrderTag")))
        .expect("valid schemas")
}

/// A stored order with the given items, returned as a parent model
pub fn order_with_items(store: &mut MemoryStore, skus: &[&str]) -> ParentModel {
    let order = store.seed(Entity::new("order")).expect("order stored");
    let order_id = order.fields().get("id").cloned().unwrap_or(Value::Null);
    for sku in skus {
        store
            .seed(Entity::new("order_item").with("order_id", order_id.clone()).with("sku", *sku))
            .expect("item stored");
    }
    ParentModel::new(order, registry())
}

/// A new, unsaved order
pub fn new_order() -> ParentModel {
    ParentModel::new(Entity::new("order"), registry())
}

/// Stored rows of an entity projected onto one column
pub fn column(store: &MemoryStore, entity: &str, name: &str) -> Vec<Value> {
    store
        .rows(entity)
        .iter()
        .map(|row: &Fields| row.get(name).cloned().unwrap_or(Value::Null))
        .collect()
}

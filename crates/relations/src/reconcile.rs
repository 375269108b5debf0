//! Reconciliation - Match submitted payload entries to attached children
//!
//! Each payload entry is merged (extra defaults, then the entry, then the
//! parent link values) and assigned to an attached child with the same
//! primary key, or the same index when the relation is indexed. Unmatched
//! entries get a fresh record. Attached children left unmatched are orphans.

use tracing::debug;

use crate::error::{RelationError, RelationResult};
use crate::key::KeyValue;
use crate::payload::Payload;
use crate::record::{Fields, Record, Storage};
use crate::related::Related;
use crate::relation::RelationDescriptor;
use crate::rows::IndexedRows;

/// Result of reconciling one relation
#[derive(Debug, Clone, PartialEq)]
pub struct Reconciliation<R> {
    /// Reconciled children, in payload order
    pub children: Related<R>,
    /// Previously attached children not matched by any payload entry
    pub orphans: Vec<R>,
}

/// Reconciler for one relation of one parent
#[derive(Debug, Clone)]
pub struct Reconciler<'a> {
    descriptor: &'a RelationDescriptor,
    primary_key: &'a [String],
    links: &'a Fields,
    extra: Option<&'a Fields>,
    scenario: Option<&'a str>,
}

impl<'a> Reconciler<'a> {
    pub fn new(descriptor: &'a RelationDescriptor, primary_key: &'a [String], links: &'a Fields) -> Self {
        Self {
            descriptor,
            primary_key,
            links,
            extra: None,
            scenario: None,
        }
    }

    /// Defaults merged underneath every payload entry
    pub fn with_extra(mut self, extra: Option<&'a Fields>) -> Self {
        self.extra = extra;
        self
    }

    /// Scenario assigned to every reconciled child
    pub fn with_scenario(mut self, scenario: Option<&'a str>) -> Self {
        self.scenario = scenario;
        self
    }

    /// Merge one payload entry; link values always win
    pub fn merge(&self, entry: &Fields) -> Fields {
        let mut merged = self.extra.cloned().unwrap_or_default();
        merged.extend(entry.iter().map(|(field, value)| (field.clone(), value.clone())));
        merged.extend(self.links.iter().map(|(field, value)| (field.clone(), value.clone())));
        merged
    }

    /// Reconcile a payload against the currently attached children.
    ///
    /// On success the attached children are moved into the result and
    /// `attached` is left empty. On failure `attached` still holds every
    /// child it held before, unmodified.
    pub fn reconcile<S: Storage>(
        &self,
        store: &S,
        attached: &mut Related<S::Record>,
        payload: Payload,
    ) -> RelationResult<Reconciliation<S::Record>> {
        let multiple = self.descriptor.is_multiple();
        match (multiple, payload) {
            (true, Payload::Many(entries)) => {
                let mut pool = std::mem::replace(attached, Related::empty(true)).into_rows();
                let result = self.reconcile_many(store, &mut pool, entries);
                if result.is_err() {
                    *attached = Related::Many(pool);
                }
                result
            }
            (false, Payload::Single(entry)) => {
                let current = std::mem::replace(attached, Related::empty(false)).into_one();
                self.reconcile_one(store, current, entry)
            }
            (true, Payload::Single(_)) => Err(RelationError::invalid_payload(
                &self.descriptor.name,
                "one-to-many relation received a single record",
            )),
            (false, Payload::Many(_)) => Err(RelationError::invalid_payload(
                &self.descriptor.name,
                "one-to-one relation received a list of records",
            )),
        }
    }

    /// Unmatched children left in `pool` become orphans. When a fresh record
    /// cannot be created, every matched child is put back into `pool`.
    fn reconcile_many<S: Storage>(
        &self,
        store: &S,
        pool: &mut IndexedRows<S::Record>,
        entries: IndexedRows<Fields>,
    ) -> RelationResult<Reconciliation<S::Record>> {
        let attached_count = pool.len();

        let mut planned = Vec::with_capacity(entries.len());
        for (index, entry) in entries {
            let merged = self.merge(&entry);
            let existing = if self.descriptor.index_by.is_some() {
                pool.remove(&index).map(|child| (index.clone(), child))
            } else {
                let key = KeyValue::from_fields(self.primary_key, &merged);
                pool.take_first(|child| KeyValue::of_record(self.primary_key, child).matches(&key))
            };
            planned.push((index, merged, existing));
        }

        // (payload index, merged fields, index the child was attached under, child)
        let mut resolved = Vec::with_capacity(planned.len());
        let mut steps = planned.into_iter();
        while let Some((index, merged, existing)) = steps.next() {
            let (original, child) = match existing {
                Some((original, child)) => (Some(original), child),
                None => match store.instantiate(&self.descriptor.target) {
                    Ok(child) => (None, child),
                    Err(error) => {
                        for (_, _, original, child) in resolved {
                            if let Some(original) = original {
                                pool.insert(original, child);
                            }
                        }
                        for (original, child) in steps.filter_map(|(_, _, existing)| existing) {
                            pool.insert(original, child);
                        }
                        return Err(error);
                    }
                },
            };
            resolved.push((index, merged, original, child));
        }

        let mut children = IndexedRows::new();
        let mut matched = 0;
        for (index, merged, original, mut child) in resolved {
            if original.is_some() {
                matched += 1;
            }
            self.prepare(&mut child, &merged);
            children.insert(index, child);
        }

        let orphans: Vec<_> = std::mem::take(pool).into_values().collect();
        debug!(
            "Reconciled relation '{}': {} attached, {} matched, {} new, {} orphaned",
            self.descriptor.name,
            attached_count,
            matched,
            children.len() - matched,
            orphans.len()
        );

        Ok(Reconciliation {
            children: Related::Many(children),
            orphans,
        })
    }

    fn reconcile_one<S: Storage>(
        &self,
        store: &S,
        attached: Option<S::Record>,
        entry: Fields,
    ) -> RelationResult<Reconciliation<S::Record>> {
        let reused = attached.is_some();
        let mut child = match attached {
            Some(child) => child,
            None => store.instantiate(&self.descriptor.target)?,
        };
        self.prepare(&mut child, &self.merge(&entry));
        debug!(
            "Reconciled relation '{}': {} child",
            self.descriptor.name,
            if reused { "reused attached" } else { "created new" }
        );

        Ok(Reconciliation {
            children: Related::One(Some(child)),
            orphans: Vec::new(),
        })
    }

    fn prepare<R: Record>(&self, child: &mut R, merged: &Fields) {
        if let Some(scenario) = self.scenario {
            child.set_scenario(scenario);
        }
        child.load(merged);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::{Entity, EntitySchema, MemoryStore};
    use crate::rows::RowIndex;
    use serde_json::{json, Value};

    fn store() -> MemoryStore {
        MemoryStore::new()
            .with_schema(EntitySchema::new("order_item", &["id"]))
            .unwrap()
            .with_schema(EntitySchema::new("order_line", &["order_id", "line"]))
            .unwrap()
    }

    fn fields(value: Value) -> Fields {
        serde_json::from_value(value).unwrap()
    }

    fn attached(store: &mut MemoryStore, records: Vec<Entity>) -> Related<Entity> {
        Related::Many(
            records
                .into_iter()
                .enumerate()
                .map(|(position, record)| (RowIndex::from(position), store.seed(record).unwrap()))
                .collect(),
        )
    }

    fn payload(value: Value) -> Payload {
        Payload::from_value(&value, true, "items").unwrap()
    }

    #[test]
    fn test_matches_by_primary_key_and_orphans_the_rest() {
        let mut store = store();
        let mut current = attached(
            &mut store,
            vec![
                Entity::new("order_item").with("id", 1).with("order_id", 7).with("name", "a"),
                Entity::new("order_item").with("id", 2).with("order_id", 7).with("name", "b"),
            ],
        );
        let descriptor = RelationDescriptor::has_many("items", "order_item").link("order_id", "id");
        let primary_key = vec!["id".to_string()];
        let links = fields(json!({"order_id": 7}));

        let result = Reconciler::new(&descriptor, &primary_key, &links)
            .reconcile(&store, &mut current, payload(json!({"0": {"id": "2", "name": "x"}})))
            .unwrap();

        let child = result.children.many().unwrap().get(&RowIndex::from(0)).unwrap();
        assert!(!child.is_new_record());
        assert_eq!(child.get("name"), Some(&json!("x")));
        assert_eq!(result.orphans.len(), 1);
        assert_eq!(result.orphans[0].get("id"), Some(&json!(1)));
    }

    #[test]
    fn test_links_win_over_payload_and_extra() {
        let store = store();
        let descriptor = RelationDescriptor::has_many("items", "order_item").link("order_id", "id");
        let primary_key = vec!["id".to_string()];
        let links = fields(json!({"order_id": 7}));
        let extra = fields(json!({"status": "draft", "order_id": 99}));

        let reconciler = Reconciler::new(&descriptor, &primary_key, &links).with_extra(Some(&extra));
        let merged = reconciler.merge(&fields(json!({"order_id": 42, "status": "paid"})));

        assert_eq!(merged.get("order_id"), Some(&json!(7)));
        assert_eq!(merged.get("status"), Some(&json!("paid")));

        let result = reconciler
            .with_scenario(Some("import"))
            .reconcile(&store, &mut Related::empty(true), payload(json!([{"order_id": 42}])))
            .unwrap();
        let children = result.children.records();
        let child = children[0];
        assert_eq!(child.get("order_id"), Some(&json!(7)));
        assert_eq!(child.get("status"), Some(&json!("draft")));
        assert_eq!(child.scenario(), "import");
    }

    #[test]
    fn test_empty_payload_orphans_everything() {
        let mut store = store();
        let mut current = attached(
            &mut store,
            vec![
                Entity::new("order_item").with("id", 1).with("order_id", 7),
                Entity::new("order_item").with("id", 2).with("order_id", 7),
            ],
        );
        let descriptor = RelationDescriptor::has_many("items", "order_item").link("order_id", "id");
        let primary_key = vec!["id".to_string()];
        let links = fields(json!({"order_id": 7}));

        let result = Reconciler::new(&descriptor, &primary_key, &links)
            .reconcile(&store, &mut current, payload(json!([])))
            .unwrap();

        assert!(result.children.is_empty());
        assert_eq!(result.orphans.len(), 2);
    }

    #[test]
    fn test_composite_key_requires_exact_match() {
        let mut store = store();
        let mut current = attached(
            &mut store,
            vec![Entity::new("order_line").with("order_id", 1).with("line", 2)],
        );
        let descriptor = RelationDescriptor::has_many("lines", "order_line").link("order_id", "id");
        let primary_key = vec!["order_id".to_string(), "line".to_string()];
        let links = fields(json!({"order_id": 1}));

        let result = Reconciler::new(&descriptor, &primary_key, &links)
            .reconcile(&store, &mut current, payload(json!([{"line": 3}, {"line": 2}])))
            .unwrap();

        let rows = result.children.many().unwrap();
        assert!(rows.get(&RowIndex::from(0)).unwrap().is_new_record());
        assert!(!rows.get(&RowIndex::from(1)).unwrap().is_new_record());
        assert!(result.orphans.is_empty());
    }

    #[test]
    fn test_index_by_matches_positionally() {
        let store = store();
        let descriptor = RelationDescriptor::has_many("items", "order_item")
            .link("order_id", "id")
            .index_by("code");
        let primary_key = vec!["id".to_string()];
        let links = fields(json!({"order_id": 7}));
        let mut current = Related::Many(
            vec![
                (RowIndex::from("a"), Entity::new("order_item").with("id", 1).with("code", "a")),
                (RowIndex::from("b"), Entity::new("order_item").with("id", 2).with("code", "b")),
            ]
            .into_iter()
            .collect(),
        );

        let result = Reconciler::new(&descriptor, &primary_key, &links)
            .reconcile(&store, &mut current, payload(json!({"b": {"id": 1, "qty": 3}})))
            .unwrap();

        let child = result.children.many().unwrap().get(&RowIndex::from("b")).unwrap();
        assert_eq!(child.get("code"), Some(&json!("b")));
        assert_eq!(child.get("qty"), Some(&json!(3)));
        assert_eq!(result.orphans.len(), 1);
        assert_eq!(result.orphans[0].get("code"), Some(&json!("a")));
    }

    #[test]
    fn test_failed_reconcile_keeps_attached_children() {
        let store = store();
        // Attached records of an entity the store cannot instantiate
        let descriptor = RelationDescriptor::has_many("notes", "order_note").link("order_id", "id");
        let primary_key = vec!["id".to_string()];
        let links = fields(json!({"order_id": 7}));
        let mut current = Related::Many(
            vec![
                (RowIndex::from(0), Entity::new("order_note").with("id", 1).with("text", "a")),
                (RowIndex::from(1), Entity::new("order_note").with("id", 2).with("text", "b")),
            ]
            .into_iter()
            .collect(),
        );

        let result = Reconciler::new(&descriptor, &primary_key, &links)
            .reconcile(&store, &mut current, payload(json!([{"id": 2, "text": "x"}, {"text": "new"}])));

        assert!(matches!(result, Err(RelationError::UnknownEntity(_))));
        let texts: Vec<_> = current.records().iter().filter_map(|note| note.get("text")).cloned().collect();
        assert_eq!(texts.len(), 2);
        assert!(texts.contains(&json!("a")) && texts.contains(&json!("b")));
    }

    #[test]
    fn test_single_relation_reuses_or_creates() {
        let store = store();
        let descriptor = RelationDescriptor::has_one("invoice", "order_item").link("order_id", "id");
        let primary_key = vec!["id".to_string()];
        let links = fields(json!({"order_id": 7}));
        let reconciler = Reconciler::new(&descriptor, &primary_key, &links);

        let mut existing = Related::One(Some(Entity::new("order_item").with("id", 5)));
        let reused = reconciler
            .reconcile(&store, &mut existing, Payload::Single(fields(json!({"name": "y"}))))
            .unwrap();
        let child = reused.children.one().unwrap();
        assert_eq!(child.get("id"), Some(&json!(5)));
        assert_eq!(child.get("name"), Some(&json!("y")));
        assert_eq!(child.get("order_id"), Some(&json!(7)));

        let created = reconciler
            .reconcile(&store, &mut Related::empty(false), Payload::Single(fields(json!({"name": "y"}))))
            .unwrap();
        assert!(created.children.one().unwrap().get("id").is_none());

        let mismatch = reconciler.reconcile(&store, &mut Related::empty(false), payload(json!([])));
        assert!(matches!(mismatch, Err(RelationError::InvalidPayload { .. })));
    }
}

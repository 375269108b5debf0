//! Relation behavior - Assign relation data onto a parent and let the parent's
//! own validate/save workflow drive validation and persistence.
//!
//! Assignment reconciles immediately and caches the new children on the
//! parent. Validation and persistence are deferred to explicit phase calls:
//! [`RelationBehavior::validate_all`] after the parent validated, and
//! [`RelationBehavior::persist_all`] after the parent was inserted or
//! updated. Children superseded by an assignment are tracked per relation and
//! deleted only in the persistence phase.

use std::collections::HashMap;

use serde_json::Value;
use tracing::{debug, info, warn};

use crate::config::RelationSettings;
use crate::error::RelationResult;
use crate::hooks::RelationHooks;
use crate::payload::Payload;
use crate::persist::{PersistOutcome, Persister};
use crate::reconcile::Reconciler;
use crate::record::{ParentRecord, Record, Storage};
use crate::related::{load_related, Related};
use crate::related_errors::{RelatedErrors, RelationErrors};
use crate::validation::validate_children;

/// Error message attached to the parent's relation attribute when any of
/// its children fail validation
pub const RELATED_ERROR: &str = "Related error";

/// Result of the phases run by [`RelationBehavior::save`]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LifecycleOutcome {
    /// Every pending relation validated
    pub relations_valid: bool,
    /// The parent's own save succeeded
    pub parent_saved: bool,
    /// Every pending relation was persisted
    pub relations_saved: bool,
}

impl LifecycleOutcome {
    pub fn is_success(&self) -> bool {
        self.relations_valid && self.parent_saved && self.relations_saved
    }
}

/// Lifecycle-hook relation orchestrator, one per parent record
#[derive(Debug)]
pub struct RelationBehavior<R> {
    settings: RelationSettings,
    hooks: RelationHooks<R>,
    superseded: HashMap<String, Vec<R>>,
    pending: Vec<String>,
    errors: RelatedErrors,
    outcomes: HashMap<String, PersistOutcome>,
}

impl<R: Record> RelationBehavior<R> {
    pub fn new() -> Self {
        Self::with_settings(RelationSettings::default())
    }

    pub fn with_settings(settings: RelationSettings) -> Self {
        Self {
            settings,
            hooks: RelationHooks::new(),
            superseded: HashMap::new(),
            pending: Vec::new(),
            errors: RelatedErrors::new(),
            outcomes: HashMap::new(),
        }
    }

    pub fn with_hooks(mut self, hooks: RelationHooks<R>) -> Self {
        self.hooks = hooks;
        self
    }

    pub fn settings(&self) -> &RelationSettings {
        &self.settings
    }

    /// Relations assigned since the last persistence pass, in assignment order
    pub fn pending(&self) -> &[String] {
        &self.pending
    }

    /// Stored children that will be deleted when the relation is persisted
    pub fn superseded(&self, relation: &str) -> &[R] {
        self.superseded
            .get(relation)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    /// Whether one relation, or any relation when `None`, has validation errors
    pub fn has_related_errors(&self, relation: Option<&str>) -> bool {
        self.errors.has_errors(relation)
    }

    pub fn related_errors(&self) -> &RelatedErrors {
        &self.errors
    }

    pub fn relation_errors(&self, relation: &str) -> Option<&RelationErrors> {
        self.errors.get(relation)
    }

    /// Outcome of the last persistence pass of a relation
    pub fn persist_outcome(&self, relation: &str) -> Option<&PersistOutcome> {
        self.outcomes.get(relation)
    }

    /// Assign relation data onto the parent.
    ///
    /// Returns `Ok(false)` when `name` is not a relation of the parent, so
    /// callers can fall through to ordinary attribute assignment. Otherwise
    /// the data is reconciled against the cached children (loaded from
    /// storage on first use) and the result replaces the cache.
    pub fn set_related<P, S>(
        &mut self,
        parent: &mut P,
        store: &S,
        name: &str,
        data: &Value,
    ) -> RelationResult<bool>
    where
        P: ParentRecord<Child = R>,
        S: Storage<Record = R>,
    {
        let Some(descriptor) = parent.find_relation(name) else {
            return Ok(false);
        };
        let links = descriptor.link_values(&*parent);
        let primary_key = store.primary_key(&descriptor.target)?;
        let payload = Payload::from_value(data, descriptor.is_multiple(), name)?;

        let mut attached = match parent.take_related(name) {
            Some(cached) => cached,
            None => load_related(store, &descriptor, &links)?,
        };
        let reconciliation = match Reconciler::new(&descriptor, &primary_key, &links)
            .with_extra(self.settings.extra_data.as_ref())
            .with_scenario(self.settings.scenario_for(name))
            .reconcile(store, &mut attached, payload)
        {
            Ok(reconciliation) => reconciliation,
            Err(error) => {
                // The cache keeps the children of the previous assignment
                parent.populate_relation(name, attached);
                return Err(error);
            }
        };

        let orphans: Vec<R> = reconciliation
            .orphans
            .into_iter()
            .filter(|orphan| !orphan.is_new_record())
            .collect();
        debug!(
            "Relation '{}' of '{}' assigned, {} stored child(ren) superseded",
            name,
            parent.entity(),
            orphans.len()
        );
        let tracked = self.superseded.entry(name.to_string()).or_default();
        if self.settings.clear_errors {
            *tracked = orphans;
        } else {
            tracked.extend(orphans);
        }

        if !self.pending.iter().any(|pending| pending == name) {
            self.pending.push(name.to_string());
        }
        parent.populate_relation(name, reconciliation.children);
        Ok(true)
    }

    /// Validate every pending relation.
    ///
    /// All relations and all children are validated. Each failing relation
    /// gets [`RELATED_ERROR`] on the parent attribute of the same name.
    pub fn validate_all<P, S>(&mut self, parent: &mut P, store: &S) -> RelationResult<bool>
    where
        P: ParentRecord<Child = R>,
        S: Storage<Record = R>,
    {
        let mut valid = true;
        for name in self.pending.clone() {
            let descriptor = parent.relation(&name)?;
            let mut children = parent
                .take_related(&name)
                .unwrap_or_else(|| Related::empty(descriptor.is_multiple()));

            if self.settings.clear_errors {
                self.errors.clear(&name, descriptor.is_multiple());
            }
            let result = validate_children(store, &mut self.hooks, &name, &mut children);
            parent.populate_relation(&name, children);
            let errors = result?;

            if errors.has_errors() {
                info!(
                    "Relation '{}' of '{}' has {} invalid child(ren)",
                    name,
                    parent.entity(),
                    errors.failed_count()
                );
                parent.add_error(&name, RELATED_ERROR);
                valid = false;
            }
            self.errors.record(&name, errors);
        }
        Ok(valid)
    }

    /// Persist every pending relation after the parent was saved.
    ///
    /// Superseded children are deleted first, then the cached children are
    /// saved with links taken from the parent's current values. A save
    /// failure stops its own relation only. Pending work is cleared
    /// afterwards.
    pub fn persist_all<P, S>(&mut self, parent: &mut P, store: &mut S) -> RelationResult<bool>
    where
        P: ParentRecord<Child = R>,
        S: Storage<Record = R>,
    {
        let mut success = true;
        for name in std::mem::take(&mut self.pending) {
            let descriptor = parent.relation(&name)?;
            let links = descriptor.link_values(&*parent);
            let primary_key = store.primary_key(&descriptor.target)?;
            let superseded = self.superseded.remove(&name).unwrap_or_default();
            let mut children = parent
                .take_related(&name)
                .unwrap_or_else(|| Related::empty(descriptor.is_multiple()));

            let mut persister = Persister::new(store, &descriptor, &primary_key, &links);
            let result = persister.delete_records(&superseded).and_then(|deleted| {
                let mut outcome =
                    persister.save_children(&mut children, &mut self.hooks, self.settings.delete_unsaved)?;
                outcome.deleted += deleted;
                Ok(outcome)
            });
            parent.populate_relation(&name, children);
            let outcome = result?;

            if !outcome.is_success() {
                warn!("Relation '{}' of '{}' was not fully persisted", name, parent.entity());
                success = false;
            }
            self.outcomes.insert(name, outcome);
        }
        Ok(success)
    }

    /// Run the relation phases around the parent's own save.
    ///
    /// `save_parent` validates and saves the parent and reports whether it
    /// was committed. Relations are persisted only after a successful parent
    /// save; their outcome never changes the parent's.
    pub fn save<P, S, F>(&mut self, parent: &mut P, store: &mut S, save_parent: F) -> RelationResult<LifecycleOutcome>
    where
        P: ParentRecord<Child = R>,
        S: Storage<Record = R>,
        F: FnOnce(&mut P, &mut S) -> RelationResult<bool>,
    {
        let mut outcome = LifecycleOutcome {
            relations_valid: self.validate_all(parent, &*store)?,
            ..LifecycleOutcome::default()
        };
        if !outcome.relations_valid {
            return Ok(outcome);
        }

        outcome.parent_saved = save_parent(&mut *parent, &mut *store)?;
        if !outcome.parent_saved {
            return Ok(outcome);
        }

        outcome.relations_saved = self.persist_all(parent, store)?;
        Ok(outcome)
    }

    /// Drop pending relation work and superseded tracking, e.g. when the
    /// parent's save is abandoned. Cached children are left on the parent.
    pub fn discard_pending(&mut self) {
        if !self.pending.is_empty() {
            debug!("Discarding pending relations: {}", self.pending.join(", "));
        }
        self.pending.clear();
        self.superseded.clear();
    }
}

impl<R: Record> Default for RelationBehavior<R> {
    fn default() -> Self {
        Self::new()
    }
}

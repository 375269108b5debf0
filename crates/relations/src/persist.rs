//! Persister - Delete superseded children, then save the reconciled set
//!
//! Deletes always run before any save so unique constraints on link columns
//! are never violated mid-way. Saves stop at the first failure; children
//! already saved are not rolled back, wrap the call in a transaction when the
//! batch must be atomic.

use serde_json::Value;
use tracing::{debug, warn};

use crate::error::{RelationError, RelationResult};
use crate::hooks::{RelationHooks, SaveDecision};
use crate::record::{Fields, Record, Storage};
use crate::related::Related;
use crate::relation::RelationDescriptor;
use crate::rows::RowIndex;

/// A child save that failed and stopped its batch
#[derive(Debug, Clone, PartialEq)]
pub struct SaveFailure {
    /// Index of the failed child, `None` for one-to-one relations
    pub index: Option<RowIndex>,
    pub error: RelationError,
}

/// Summary of one relation's save pass
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PersistOutcome {
    /// Children inserted or updated
    pub saved: usize,
    /// Children skipped by a before-save hook
    pub skipped: usize,
    /// Records deleted, superseded children and cancelled existing children
    pub deleted: usize,
    /// The save failure that aborted the batch, if any
    pub failure: Option<SaveFailure>,
}

impl PersistOutcome {
    pub fn is_success(&self) -> bool {
        self.failure.is_none()
    }
}

/// Writes one relation's children to storage
pub struct Persister<'a, S: Storage> {
    store: &'a mut S,
    descriptor: &'a RelationDescriptor,
    primary_key: &'a [String],
    links: &'a Fields,
}

impl<'a, S: Storage> Persister<'a, S> {
    pub fn new(
        store: &'a mut S,
        descriptor: &'a RelationDescriptor,
        primary_key: &'a [String],
        links: &'a Fields,
    ) -> Self {
        Self {
            store,
            descriptor,
            primary_key,
            links,
        }
    }

    /// Primary key columns not determined by the link
    pub fn unlinked_key_columns(&self) -> Vec<String> {
        self.primary_key
            .iter()
            .filter(|column| !self.descriptor.is_link_column(column))
            .cloned()
            .collect()
    }

    /// Delete the stored children superseded by a reconciliation.
    ///
    /// Deletes `link AND (unlinked key columns) IN (orphan keys)`. When the
    /// whole primary key is covered by the link, individual children cannot
    /// be told apart: every child under the link is deleted and `children`
    /// are marked new so they are inserted again.
    pub fn delete_superseded(
        &mut self,
        orphans: &[S::Record],
        children: &mut Related<S::Record>,
    ) -> RelationResult<usize> {
        let key_columns = self.unlinked_key_columns();
        let mut filter = self.descriptor.link_filter(self.links);

        if key_columns.is_empty() {
            for child in children_mut(children) {
                if !child.is_new_record() {
                    child.mark_new();
                }
            }
        } else {
            let tuples: Vec<Vec<Value>> = orphans
                .iter()
                .map(|orphan| {
                    key_columns
                        .iter()
                        .map(|column| orphan.get(column).cloned().unwrap_or(Value::Null))
                        .collect()
                })
                .collect();
            if tuples.is_empty() {
                return Ok(0);
            }
            filter = filter.where_in(key_columns, tuples);
        }

        let superseded = self.store.find(&self.descriptor.target, &filter)?;
        for record in &superseded {
            self.store.delete(record)?;
        }
        debug!(
            "Deleted {} superseded '{}' record(s) of relation '{}' where {}",
            superseded.len(),
            self.descriptor.target,
            self.descriptor.name,
            filter
        );
        Ok(superseded.len())
    }

    /// Delete previously attached records; new records are skipped
    pub fn delete_records(&mut self, records: &[S::Record]) -> RelationResult<usize> {
        let mut deleted = 0;
        for record in records.iter().filter(|record| !record.is_new_record()) {
            self.store.delete(record)?;
            deleted += 1;
        }
        if deleted > 0 {
            debug!(
                "Deleted {} previously superseded record(s) of relation '{}'",
                deleted, self.descriptor.name
            );
        }
        Ok(deleted)
    }

    /// Save children in order, stopping at the first failure.
    ///
    /// Link columns are re-applied before each save. A child cancelled by the
    /// before-save hook is skipped, or deleted when `delete_unsaved` is set
    /// and it already exists in storage.
    pub fn save_children(
        &mut self,
        children: &mut Related<S::Record>,
        hooks: &mut RelationHooks<S::Record>,
        delete_unsaved: bool,
    ) -> RelationResult<PersistOutcome> {
        let mut outcome = PersistOutcome::default();

        match children {
            Related::Many(rows) => {
                for (index, child) in rows.iter_mut() {
                    if !self.save_child(child, Some(index), hooks, delete_unsaved, &mut outcome)? {
                        break;
                    }
                }
            }
            Related::One(Some(child)) => {
                self.save_child(child, None, hooks, delete_unsaved, &mut outcome)?;
            }
            Related::One(None) => {}
        }

        debug!(
            "Relation '{}' persisted: {} saved, {} skipped, {} deleted{}",
            self.descriptor.name,
            outcome.saved,
            outcome.skipped,
            outcome.deleted,
            if outcome.is_success() { "" } else { ", aborted" }
        );
        Ok(outcome)
    }

    // Returns false when the batch must stop
    fn save_child(
        &mut self,
        child: &mut S::Record,
        index: Option<&RowIndex>,
        hooks: &mut RelationHooks<S::Record>,
        delete_unsaved: bool,
        outcome: &mut PersistOutcome,
    ) -> RelationResult<bool> {
        let relation = self.descriptor.name.as_str();
        self.descriptor.apply_link(child, self.links);

        if hooks.run_before_save(child, index, relation) == SaveDecision::Cancel {
            if delete_unsaved && !child.is_new_record() {
                self.store.delete(child)?;
                outcome.deleted += 1;
                debug!("Save of child {} of relation '{}' cancelled, deleted existing record", display_index(index), relation);
            } else {
                outcome.skipped += 1;
                debug!("Save of child {} of relation '{}' cancelled", display_index(index), relation);
            }
            return Ok(true);
        }

        match self.store.save(child) {
            Ok(()) => {
                outcome.saved += 1;
                hooks.run_after_save(child, index, relation);
                Ok(true)
            }
            Err(error) => {
                warn!(
                    "Failed to save child {} of relation '{}', stopping batch: {}",
                    display_index(index),
                    relation,
                    error
                );
                outcome.failure = Some(SaveFailure {
                    index: index.cloned(),
                    error,
                });
                Ok(false)
            }
        }
    }
}

fn children_mut<R>(children: &mut Related<R>) -> Vec<&mut R> {
    match children {
        Related::Many(rows) => rows.iter_mut().map(|(_, child)| child).collect(),
        Related::One(child) => child.iter_mut().collect(),
    }
}

fn display_index(index: Option<&RowIndex>) -> String {
    index.map(ToString::to_string).unwrap_or_else(|| "-".to_string())
}

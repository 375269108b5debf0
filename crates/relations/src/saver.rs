//! Explicit relation saving - Reconcile, validate and persist one relation in
//! a single call.
//!
//! ```ignore
//! let mut saver = RelatedSaver::new();
//! if !saver.save_related(&mut order, &mut store, "items", &request, &SaveOptions::default())? {
//!     return Err(saver.related_errors().to_json());
//! }
//! ```

use std::collections::HashMap;

use serde_json::Value;
use tracing::{debug, info};

use crate::config::RelationSettings;
use crate::error::RelationResult;
use crate::hooks::RelationHooks;
use crate::payload::{Payload, PayloadScope};
use crate::persist::{PersistOutcome, Persister};
use crate::reconcile::Reconciler;
use crate::record::{ParentRecord, Storage};
use crate::related::load_related;
use crate::related_errors::{RelatedErrors, RelationErrors};
use crate::validation::validate_children;

/// Options of one [`RelatedSaver::save_related`] call
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SaveOptions {
    /// Persist the children after a successful validation
    pub save: bool,
    /// Where the relation payload sits in the submitted data
    pub scope: PayloadScope,
    /// Scenario for the children, overriding the configured one
    pub scenario: Option<String>,
}

impl Default for SaveOptions {
    fn default() -> Self {
        Self {
            save: true,
            scope: PayloadScope::FormName,
            scenario: None,
        }
    }
}

impl SaveOptions {
    pub fn new() -> Self {
        Self::default()
    }

    /// Reconcile and validate only
    pub fn validate_only() -> Self {
        Self {
            save: false,
            ..Self::default()
        }
    }

    pub fn scope(mut self, scope: PayloadScope) -> Self {
        self.scope = scope;
        self
    }

    pub fn scenario(mut self, scenario: &str) -> Self {
        self.scenario = Some(scenario.to_string());
        self
    }
}

/// Explicit-call relation orchestrator
#[derive(Debug)]
pub struct RelatedSaver<R> {
    settings: RelationSettings,
    hooks: RelationHooks<R>,
    errors: RelatedErrors,
    outcomes: HashMap<String, PersistOutcome>,
}

impl<R> RelatedSaver<R> {
    pub fn new() -> Self {
        Self::with_settings(RelationSettings::default())
    }

    pub fn with_settings(settings: RelationSettings) -> Self {
        Self {
            settings,
            hooks: RelationHooks::new(),
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

    /// Whether one relation, or any relation when `None`, has validation errors
    pub fn has_related_errors(&self, relation: Option<&str>) -> bool {
        self.errors.has_errors(relation)
    }

    pub fn related_errors(&self) -> &RelatedErrors {
        &self.errors
    }

    /// Errors of one relation
    pub fn relation_errors(&self, relation: &str) -> Option<&RelationErrors> {
        self.errors.get(relation)
    }

    /// Outcome of the last persistence pass of a relation
    pub fn persist_outcome(&self, relation: &str) -> Option<&PersistOutcome> {
        self.outcomes.get(relation)
    }

    /// Reconcile, validate and optionally persist one relation.
    ///
    /// Returns true only when every child validated and was persisted. The
    /// reconciled children are written to the parent's relation cache in
    /// every case. Unknown relations and storage faults are returned as
    /// errors.
    pub fn save_related<P, S>(
        &mut self,
        parent: &mut P,
        store: &mut S,
        name: &str,
        data: &Value,
        options: &SaveOptions,
    ) -> RelationResult<bool>
    where
        P: ParentRecord<Child = R>,
        S: Storage<Record = R>,
    {
        let descriptor = parent.relation(name)?;
        let links = descriptor.link_values(&*parent);
        let primary_key = store.primary_key(&descriptor.target)?;
        let form_name = store.form_name(&descriptor.target)?;

        let payload = match options.scope.select(data, &form_name) {
            Some(value) => Payload::from_value(value, descriptor.is_multiple(), name)?,
            None => Payload::from_value(&Value::Null, descriptor.is_multiple(), name)?,
        };

        if self.settings.clear_errors {
            self.errors.clear(name, descriptor.is_multiple());
        }

        let scenario = options
            .scenario
            .as_deref()
            .or_else(|| self.settings.scenario_for(name));
        let mut attached = load_related(&*store, &descriptor, &links)?;
        let reconciliation = Reconciler::new(&descriptor, &primary_key, &links)
            .with_extra(self.settings.extra_data.as_ref())
            .with_scenario(scenario)
            .reconcile(&*store, &mut attached, payload)?;
        let mut children = reconciliation.children;

        let errors = validate_children(&*store, &mut self.hooks, name, &mut children)?;
        let valid = !errors.has_errors();
        self.errors.record(name, errors);

        let mut persisted = false;
        if valid && options.save {
            let mut persister = Persister::new(store, &descriptor, &primary_key, &links);
            // One-to-one children are only ever saved in place
            let deleted = if descriptor.is_multiple() {
                persister.delete_superseded(&reconciliation.orphans, &mut children)?
            } else {
                0
            };
            let mut outcome = persister.save_children(&mut children, &mut self.hooks, false)?;
            outcome.deleted += deleted;
            persisted = outcome.is_success();
            self.outcomes.insert(name.to_string(), outcome);
        } else if !valid {
            info!("Relation '{}' of '{}' failed validation, nothing persisted", name, parent.entity());
        } else {
            debug!("Relation '{}' of '{}' validated without saving", name, parent.entity());
        }

        parent.populate_relation(name, children);
        Ok(persisted)
    }
}

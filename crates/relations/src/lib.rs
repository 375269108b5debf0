//! # elif-relations: Relation persistence for elif.rs
//!
//! Keeps a parent record and its dependent one-to-one or one-to-many children
//! consistent across validate, save and cleanup. Submitted child data is
//! reconciled with the children already attached to the parent, every child is
//! validated, superseded children are deleted and the new set is saved.
//!
//! Two orchestration styles share the same core:
//! - [`RelatedSaver`] reconciles, validates and persists one relation in a
//!   single explicit call.
//! - [`RelationBehavior`] reconciles on assignment and defers validation and
//!   persistence to the parent's own save workflow.
//!
//! Storage is reached through the [`Storage`], [`Record`] and [`ParentRecord`]
//! traits; [`memory`] provides an in-memory implementation.

pub mod error;
pub mod config;
pub mod rows;
pub mod key;
pub mod filter;
pub mod record;
pub mod relation;
pub mod registry;
pub mod related;
pub mod payload;
pub mod hooks;
pub mod related_errors;
pub mod reconcile;
pub mod validation;
pub mod persist;
pub mod saver;
pub mod behavior;
pub mod memory;

// Re-export core traits and types
pub use error::*;
pub use config::RelationSettings;
pub use rows::{IndexedRows, RowIndex};
pub use key::KeyValue;
pub use filter::{Condition, Filter};
pub use record::{Fields, ParentRecord, Record, Storage};
pub use relation::{RelationDescriptor, RelationKind};
pub use registry::RelationRegistry;
pub use related::{load_related, Related};
pub use payload::{Payload, PayloadScope};
pub use hooks::{RelationHooks, SaveDecision};
pub use related_errors::{FieldErrors, RelatedErrors, RelationErrors};
pub use reconcile::{Reconciler, Reconciliation};
pub use validation::validate_children;
pub use persist::{PersistOutcome, Persister, SaveFailure};
pub use saver::{RelatedSaver, SaveOptions};
pub use behavior::{LifecycleOutcome, RelationBehavior, RELATED_ERROR};

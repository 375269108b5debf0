//! Validation driver - Validate every reconciled child of a relation
//!
//! All children are validated even after a failure so the caller can report
//! every problem at once.

use tracing::debug;

use crate::error::RelationResult;
use crate::hooks::RelationHooks;
use crate::record::Storage;
use crate::related::Related;
use crate::related_errors::{FieldErrors, RelationErrors};
use crate::rows::IndexedRows;

/// Run the before-validate hook and validation for each child.
///
/// One-to-many results carry an entry for every child, empty when the child
/// passed. Faults raised by the validation collaborator propagate.
pub fn validate_children<S: Storage>(
    store: &S,
    hooks: &mut RelationHooks<S::Record>,
    relation: &str,
    children: &mut Related<S::Record>,
) -> RelationResult<RelationErrors> {
    match children {
        Related::Many(rows) => {
            let mut errors = IndexedRows::new();
            for (index, child) in rows.iter_mut() {
                hooks.run_before_validate(child, Some(index), relation);
                let field_errors = store.validate(child)?;
                if !field_errors.is_empty() {
                    debug!(
                        "Child {} of relation '{}' failed validation: {:?}",
                        index, relation, field_errors
                    );
                }
                errors.insert(index.clone(), field_errors);
            }
            Ok(RelationErrors::Multiple(errors))
        }
        Related::One(Some(child)) => {
            hooks.run_before_validate(child, None, relation);
            let field_errors = store.validate(child)?;
            if !field_errors.is_empty() {
                debug!("Child of relation '{}' failed validation: {:?}", relation, field_errors);
            }
            Ok(RelationErrors::Single(field_errors))
        }
        Related::One(None) => Ok(RelationErrors::Single(FieldErrors::new())),
    }
}

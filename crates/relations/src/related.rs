//! Related records - The cached children of one relation

use tracing::{debug, warn};

use crate::error::RelationResult;
use crate::record::{Fields, Record, Storage};
use crate::relation::RelationDescriptor;
use crate::rows::{IndexedRows, RowIndex};

/// Children of a relation as held in a parent's relation cache
#[derive(Debug, Clone, PartialEq)]
pub enum Related<R> {
    /// One-to-one relation, `None` when no child exists
    One(Option<R>),
    /// One-to-many relation, keyed by position or `index_by` value
    Many(IndexedRows<R>),
}

impl<R> Related<R> {
    /// Empty value matching a relation's multiplicity
    pub fn empty(multiple: bool) -> Self {
        if multiple {
            Related::Many(IndexedRows::new())
        } else {
            Related::One(None)
        }
    }

    pub fn is_multiple(&self) -> bool {
        matches!(self, Related::Many(_))
    }

    pub fn len(&self) -> usize {
        match self {
            Related::One(child) => usize::from(child.is_some()),
            Related::Many(rows) => rows.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn one(&self) -> Option<&R> {
        match self {
            Related::One(child) => child.as_ref(),
            Related::Many(_) => None,
        }
    }

    pub fn many(&self) -> Option<&IndexedRows<R>> {
        match self {
            Related::Many(rows) => Some(rows),
            Related::One(_) => None,
        }
    }

    /// Convert to a row collection; a single child sits at position 0
    pub fn into_rows(self) -> IndexedRows<R> {
        match self {
            Related::Many(rows) => rows,
            Related::One(child) => child
                .into_iter()
                .map(|child| (RowIndex::Position(0), child))
                .collect(),
        }
    }

    /// Convert to a single child; the first row of a collection is kept
    pub fn into_one(self) -> Option<R> {
        match self {
            Related::One(child) => child,
            Related::Many(rows) => rows.into_values().next(),
        }
    }

    /// All children in order
    pub fn records(&self) -> Vec<&R> {
        match self {
            Related::One(child) => child.iter().collect(),
            Related::Many(rows) => rows.values().collect(),
        }
    }
}

/// Load the children currently attached to a parent from storage.
///
/// Collections are keyed by the `index_by` column when the relation has one,
/// by position otherwise. A child whose `index_by` value is null is keyed by
/// the empty string.
pub fn load_related<S: Storage>(
    store: &S,
    descriptor: &RelationDescriptor,
    links: &Fields,
) -> RelationResult<Related<S::Record>> {
    let filter = descriptor.link_filter(links);
    let children = store.find(&descriptor.target, &filter)?;
    debug!(
        "Loaded {} attached '{}' record(s) for relation '{}' where {}",
        children.len(),
        descriptor.target,
        descriptor.name,
        filter
    );

    if !descriptor.is_multiple() {
        return Ok(Related::One(children.into_iter().next()));
    }

    let Some(column) = descriptor.index_by.as_deref() else {
        let rows = children
            .into_iter()
            .enumerate()
            .map(|(position, child)| (RowIndex::from(position), child))
            .collect();
        return Ok(Related::Many(rows));
    };

    let mut rows = IndexedRows::new();
    for child in children {
        let index = match child.get(column).and_then(RowIndex::from_value) {
            Some(index) => index,
            None => {
                warn!(
                    "Attached '{}' record has no '{}' value, indexed as ''",
                    descriptor.target, column
                );
                RowIndex::Key(String::new())
            }
        };
        if rows.insert(index.clone(), child).is_some() {
            warn!(
                "Relation '{}' has several attached records indexed as '{}', only the last is kept",
                descriptor.name, index
            );
        }
    }
    Ok(Related::Many(rows))
}

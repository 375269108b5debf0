//! Relation hooks - Optional callbacks around child validation and save
//!
//! Every hook receives the child, its index (`None` for one-to-one
//! relations) and the relation name. Hooks that are not set are skipped.

use std::fmt;

use crate::rows::RowIndex;

/// Outcome of a before-save hook
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SaveDecision {
    /// Save the child
    Proceed,
    /// Skip saving the child
    Cancel,
}

impl From<bool> for SaveDecision {
    fn from(proceed: bool) -> Self {
        if proceed {
            SaveDecision::Proceed
        } else {
            SaveDecision::Cancel
        }
    }
}

pub type BeforeValidateHook<R> = Box<dyn FnMut(&mut R, Option<&RowIndex>, &str)>;
pub type BeforeSaveHook<R> = Box<dyn FnMut(&mut R, Option<&RowIndex>, &str) -> SaveDecision>;
pub type AfterSaveHook<R> = Box<dyn FnMut(&R, Option<&RowIndex>, &str)>;

/// Set of optional hooks shared by every relation of one orchestrator
pub struct RelationHooks<R> {
    before_validate: Option<BeforeValidateHook<R>>,
    before_save: Option<BeforeSaveHook<R>>,
    after_save: Option<AfterSaveHook<R>>,
}

impl<R> Default for RelationHooks<R> {
    fn default() -> Self {
        Self {
            before_validate: None,
            before_save: None,
            after_save: None,
        }
    }
}

impl<R> RelationHooks<R> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Runs before each child is validated
    pub fn before_validate<F>(mut self, hook: F) -> Self
    where
        F: FnMut(&mut R, Option<&RowIndex>, &str) + 'static,
    {
        self.before_validate = Some(Box::new(hook));
        self
    }

    /// Runs before each child is saved; returning [`SaveDecision::Cancel`]
    /// skips the child
    pub fn before_save<F>(mut self, hook: F) -> Self
    where
        F: FnMut(&mut R, Option<&RowIndex>, &str) -> SaveDecision + 'static,
    {
        self.before_save = Some(Box::new(hook));
        self
    }

    /// Runs after each child is saved successfully
    pub fn after_save<F>(mut self, hook: F) -> Self
    where
        F: FnMut(&R, Option<&RowIndex>, &str) + 'static,
    {
        self.after_save = Some(Box::new(hook));
        self
    }

    pub(crate) fn run_before_validate(&mut self, child: &mut R, index: Option<&RowIndex>, relation: &str) {
        if let Some(hook) = self.before_validate.as_mut() {
            hook(child, index, relation);
        }
    }

    pub(crate) fn run_before_save(&mut self, child: &mut R, index: Option<&RowIndex>, relation: &str) -> SaveDecision {
        match self.before_save.as_mut() {
            Some(hook) => hook(child, index, relation),
            None => SaveDecision::Proceed,
        }
    }

    pub(crate) fn run_after_save(&mut self, child: &R, index: Option<&RowIndex>, relation: &str) {
        if let Some(hook) = self.after_save.as_mut() {
            hook(child, index, relation);
        }
    }
}

impl<R> fmt::Debug for RelationHooks<R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RelationHooks")
            .field("before_validate", &self.before_validate.is_some())
            .field("before_save", &self.before_save.is_some())
            .field("after_save", &self.after_save.is_some())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;
    use std::rc::Rc;

    #[test]
    fn test_missing_hooks_proceed() {
        let mut hooks: RelationHooks<String> = RelationHooks::new();
        let mut child = "a".to_string();

        hooks.run_before_validate(&mut child, None, "items");
        assert_eq!(hooks.run_before_save(&mut child, None, "items"), SaveDecision::Proceed);
        hooks.run_after_save(&child, None, "items");
        assert_eq!(child, "a");
    }

    #[test]
    fn test_hooks_receive_index_and_relation() {
        let calls = Rc::new(RefCell::new(Vec::new()));
        let log = calls.clone();
        let mut hooks = RelationHooks::new()
            .before_validate(|child: &mut String, _, _| child.push('!'))
            .before_save(|child: &mut String, _, _| SaveDecision::from(child.len() < 3))
            .after_save(move |child: &String, index, relation| {
                log.borrow_mut().push(format!("{}:{:?}:{}", relation, index.map(ToString::to_string), child));
            });

        let mut short = "a".to_string();
        hooks.run_before_validate(&mut short, Some(&RowIndex::from(0)), "items");
        assert_eq!(short, "a!");
        assert_eq!(hooks.run_before_save(&mut short, None, "items"), SaveDecision::Proceed);
        hooks.run_after_save(&short, Some(&RowIndex::from(0)), "items");

        let mut long = "abcd".to_string();
        assert_eq!(hooks.run_before_save(&mut long, None, "items"), SaveDecision::Cancel);

        assert_eq!(calls.borrow().as_slice(), ["items:Some(\"0\"):a!"]);
        assert_eq!(
            format!("{:?}", hooks),
            "RelationHooks { before_validate: true, before_save: true, after_save: true }"
        );
    }
}

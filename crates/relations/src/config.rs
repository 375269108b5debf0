//! Relation persistence settings
//!
//! Settings are plain data so they can live in the application's YAML
//! configuration. Hooks are closures and are configured through
//! [`RelationHooks`](crate::hooks::RelationHooks) instead.

use std::collections::HashMap;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::RelationResult;
use crate::record::Fields;

/// Settings shared by [`RelatedSaver`](crate::saver::RelatedSaver) and
/// [`RelationBehavior`](crate::behavior::RelationBehavior)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RelationSettings {
    /// Defaults merged underneath every payload entry
    pub extra_data: Option<Fields>,
    /// Clear a relation's previous errors before validating it again
    pub clear_errors: bool,
    /// Delete an existing child whose save was cancelled by a before-save hook
    pub delete_unsaved: bool,
    /// Scenario applied to children of a relation, keyed by relation name
    pub related_scenarios: HashMap<String, String>,
}

impl Default for RelationSettings {
    fn default() -> Self {
        Self {
            extra_data: None,
            clear_errors: true,
            delete_unsaved: true,
            related_scenarios: HashMap::new(),
        }
    }
}

impl RelationSettings {
    pub fn new() -> Self {
        Self::default()
    }

    /// Load settings from a YAML file
    pub fn load(path: impl AsRef<Path>) -> RelationResult<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_yaml_str(&content)
    }

    pub fn from_yaml_str(content: &str) -> RelationResult<Self> {
        Ok(serde_yaml::from_str(content)?)
    }

    pub fn with_extra_data(mut self, extra_data: Fields) -> Self {
        self.extra_data = Some(extra_data);
        self
    }

    pub fn with_clear_errors(mut self, clear_errors: bool) -> Self {
        self.clear_errors = clear_errors;
        self
    }

    pub fn with_delete_unsaved(mut self, delete_unsaved: bool) -> Self {
        self.delete_unsaved = delete_unsaved;
        self
    }

    pub fn with_scenario(mut self, relation: &str, scenario: &str) -> Self {
        self.related_scenarios
            .insert(relation.to_string(), scenario.to_string());
        self
    }

    pub fn scenario_for(&self, relation: &str) -> Option<&str> {
        self.related_scenarios.get(relation).map(String::as_str)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::io::Write;

    #[test]
    fn test_default_settings() {
        let settings = RelationSettings::default();
        assert!(settings.clear_errors);
        assert!(settings.delete_unsaved);
        assert!(settings.extra_data.is_none());
        assert_eq!(settings.scenario_for("items"), None);
    }

    #[test]
    fn test_partial_yaml_keeps_defaults() {
        let settings = RelationSettings::from_yaml_str(
            "clear_errors: false\nrelated_scenarios:\n  items: detail\n",
        )
        .unwrap();

        assert!(!settings.clear_errors);
        assert!(settings.delete_unsaved);
        assert_eq!(settings.scenario_for("items"), Some("detail"));
    }

    #[test]
    fn test_load_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "delete_unsaved: false").unwrap();
        writeln!(file, "extra_data:").unwrap();
        writeln!(file, "  status: draft").unwrap();

        let settings = RelationSettings::load(file.path()).unwrap();
        assert!(!settings.delete_unsaved);
        assert_eq!(
            settings.extra_data.unwrap().get("status"),
            Some(&json!("draft"))
        );
    }

    #[test]
    fn test_invalid_yaml_is_reported() {
        let result = RelationSettings::from_yaml_str("clear_errors: [not, a, bool]");
        assert!(result.is_err());
    }
}

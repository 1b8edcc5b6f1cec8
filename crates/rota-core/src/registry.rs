//! Administrative operations on assignment rules
//!
//! Every write goes through here so that the candidate-rule cache is
//! invalidated for each document type the change touches.

use crate::error::{RotaError, RotaResult};
use crate::rule::{ASSIGNMENT_RULE_DOCTYPE, AssignmentRule, fields};
use crate::rule_cache::RuleCache;
use crate::store::{DocumentStore, Filters, OrderBy};
use std::sync::{Arc, RwLock};
use tracing::{info, warn};

/// Observer notified after rules change
pub trait RuleChangeListener: Send + Sync {
    /// Called with every document type whose rule set may have changed
    fn rules_changed(&self, document_types: &[String]);
}

/// Create, update, rename and delete assignment rules
pub struct RuleRegistry {
    documents: Arc<dyn DocumentStore>,
    rule_cache: Arc<RuleCache>,
    listeners: RwLock<Vec<Arc<dyn RuleChangeListener>>>,
}

impl std::fmt::Debug for RuleRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RuleRegistry").field("rule_cache", &self.rule_cache).finish_non_exhaustive()
    }
}

impl RuleRegistry {
    pub fn new(documents: Arc<dyn DocumentStore>, rule_cache: Arc<RuleCache>) -> Self {
        Self { documents, rule_cache, listeners: RwLock::new(Vec::new()) }
    }

    /// Register an observer for rule changes
    pub fn subscribe(&self, listener: Arc<dyn RuleChangeListener>) {
        match self.listeners.write() {
            Ok(mut listeners) => listeners.push(listener),
            Err(_) => warn!("Rule listener registry poisoned, listener dropped"),
        }
    }

    fn validate(rule: &AssignmentRule) -> RotaResult<()> {
        if rule.name.trim().is_empty() {
            return Err(RotaError::configuration(&rule.name, "name", "rule name is required"));
        }
        if rule.document_type.trim().is_empty() {
            return Err(RotaError::configuration(&rule.name, fields::DOCUMENT_TYPE, "document type is required"));
        }
        Ok(())
    }

    /// Store a new rule
    pub fn create(&self, rule: &AssignmentRule) -> RotaResult<()> {
        Self::validate(rule)?;
        self.documents.insert_document(rule.to_document())?;
        info!(rule = %rule.name, document_type = %rule.document_type, "Assignment rule created");
        self.changed(&[rule.document_type.as_str()]);
        Ok(())
    }

    /// Replace an existing rule
    ///
    /// When the rule moves to another document type both types are invalidated.
    pub fn update(&self, rule: &AssignmentRule) -> RotaResult<()> {
        Self::validate(rule)?;
        let previous = self.get(&rule.name)?;
        self.documents.update_document(rule.to_document())?;
        info!(rule = %rule.name, document_type = %rule.document_type, "Assignment rule updated");
        self.changed(&[previous.document_type.as_str(), rule.document_type.as_str()]);
        Ok(())
    }

    /// Rename a rule
    pub fn rename(&self, old_name: &str, new_name: &str) -> RotaResult<()> {
        let rule = self.get(old_name)?;
        self.documents.rename_document(ASSIGNMENT_RULE_DOCTYPE, old_name, new_name)?;
        info!(from = old_name, to = new_name, "Assignment rule renamed");
        self.changed(&[rule.document_type.as_str()]);
        Ok(())
    }

    /// Delete a rule
    pub fn delete(&self, name: &str) -> RotaResult<()> {
        let rule = self.get(name)?;
        self.documents.delete_document(ASSIGNMENT_RULE_DOCTYPE, name)?;
        info!(rule = name, document_type = %rule.document_type, "Assignment rule deleted");
        self.changed(&[rule.document_type.as_str()]);
        Ok(())
    }

    /// Enable or disable a rule
    pub fn set_disabled(&self, name: &str, disabled: bool) -> RotaResult<()> {
        let rule = self.get(name)?;
        self.update(&rule.disabled(disabled))
    }

    pub fn get(&self, name: &str) -> RotaResult<AssignmentRule> {
        let document = self.documents.get_document(ASSIGNMENT_RULE_DOCTYPE, name)?;
        AssignmentRule::from_document(&document)
    }

    /// Every stored rule, highest priority first, disabled ones included
    pub fn list(&self) -> RotaResult<Vec<AssignmentRule>> {
        self.documents
            .query(ASSIGNMENT_RULE_DOCTYPE, &Filters::new(), Some(&OrderBy::desc(fields::PRIORITY)), None)?
            .iter()
            .map(AssignmentRule::from_document)
            .collect()
    }

    fn changed(&self, document_types: &[&str]) {
        let mut touched: Vec<String> = Vec::with_capacity(document_types.len());
        for document_type in document_types {
            if !touched.iter().any(|t| t == document_type) {
                self.rule_cache.invalidate(document_type);
                touched.push(document_type.to_string());
            }
        }

        let listeners = match self.listeners.read() {
            Ok(listeners) => listeners.clone(),
            Err(_) => return,
        };
        for listener in listeners {
            listener.rules_changed(&touched);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::{InMemoryCacheStore, InMemoryDocumentStore};
    use std::sync::Mutex;

    struct Recorder(Mutex<Vec<Vec<String>>>);

    impl RuleChangeListener for Recorder {
        fn rules_changed(&self, document_types: &[String]) {
            self.0.lock().unwrap().push(document_types.to_vec());
        }
    }

    fn setup() -> (RuleRegistry, Arc<RuleCache>, Arc<InMemoryCacheStore>) {
        let cache = Arc::new(InMemoryCacheStore::new());
        let documents = Arc::new(InMemoryDocumentStore::new());
        let rule_cache = Arc::new(RuleCache::new(cache.clone(), documents.clone()));
        (RuleRegistry::new(documents, rule_cache.clone()), rule_cache, cache)
    }

    #[test]
    fn test_create_invalidates_document_type() {
        let (registry, rule_cache, cache) = setup();
        registry.create(&AssignmentRule::new("first", "Issue")).unwrap();
        assert_eq!(rule_cache.get_rules_for("Issue").len(), 1);
        assert!(cache.contains_key("assignment_rule_map::Issue"));

        registry.create(&AssignmentRule::new("second", "Issue")).unwrap();
        assert!(!cache.contains_key("assignment_rule_map::Issue"));
        assert_eq!(rule_cache.get_rules_for("Issue").len(), 2);
    }

    #[test]
    fn test_moving_a_rule_invalidates_both_types() {
        let (registry, rule_cache, cache) = setup();
        registry.create(&AssignmentRule::new("mover", "Issue")).unwrap();
        registry.create(&AssignmentRule::new("stay", "Task")).unwrap();
        rule_cache.get_rules_for("Issue");
        rule_cache.get_rules_for("Task");

        let moved = AssignmentRule { document_type: "Task".to_string(), ..registry.get("mover").unwrap() };
        registry.update(&moved).unwrap();

        assert!(!cache.contains_key("assignment_rule_map::Issue"));
        assert!(!cache.contains_key("assignment_rule_map::Task"));
        assert!(rule_cache.get_rules_for("Issue").is_empty());
        assert_eq!(rule_cache.get_rules_for("Task").len(), 2);
    }

    #[test]
    fn test_rename_and_delete() {
        let (registry, rule_cache, _) = setup();
        registry.create(&AssignmentRule::new("old", "Issue")).unwrap();
        rule_cache.get_rules_for("Issue");

        registry.rename("old", "new").unwrap();
        let names: Vec<_> = rule_cache.get_rules_for("Issue").into_iter().map(|r| r.name).collect();
        assert_eq!(names, vec!["new"]);

        registry.delete("new").unwrap();
        assert!(rule_cache.get_rules_for("Issue").is_empty());
        assert!(matches!(registry.get("new"), Err(RotaError::NotFound { .. })));
    }

    #[test]
    fn test_validation() {
        let (registry, _, _) = setup();
        let result = registry.create(&AssignmentRule::new("nameless", ""));
        assert!(matches!(result, Err(RotaError::Configuration { .. })));
    }

    #[test]
    fn test_listeners_receive_touched_types() {
        let (registry, _, _) = setup();
        let recorder = Arc::new(Recorder(Mutex::new(Vec::new())));
        registry.subscribe(recorder.clone());

        registry.create(&AssignmentRule::new("r", "Issue")).unwrap();
        registry.set_disabled("r", true).unwrap();

        let calls = recorder.0.lock().unwrap().clone();
        assert_eq!(calls, vec![vec!["Issue".to_string()], vec!["Issue".to_string()]]);
    }
}

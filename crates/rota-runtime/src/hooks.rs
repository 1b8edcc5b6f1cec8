//! Host lifecycle wiring
//!
//! The host calls [`LifecycleHooks::on_event`] for every document event. Only
//! document types that currently have an enabled rule reach the engine; the
//! registration set is rebuilt whenever a rule changes.

use rota_core::{ApplyOutcome, AssignmentRuleEngine, Document, DocumentEvent, HostFlags, RuleChangeListener};
use std::collections::BTreeSet;
use std::sync::{Arc, RwLock};
use tracing::{debug, info, warn};

pub struct LifecycleHooks {
    engine: Arc<AssignmentRuleEngine>,
    registered: RwLock<BTreeSet<String>>,
}

impl std::fmt::Debug for LifecycleHooks {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LifecycleHooks")
            .field("registered", &self.registered_document_types())
            .finish_non_exhaustive()
    }
}

impl LifecycleHooks {
    /// Create hooks registered for the engine's current rule document types
    pub fn new(engine: Arc<AssignmentRuleEngine>) -> Self {
        let hooks = Self { engine, registered: RwLock::new(BTreeSet::new()) };
        hooks.refresh();
        hooks
    }

    /// Rebuild the set of registered document types
    pub fn refresh(&self) {
        let document_types: BTreeSet<String> = self.engine.get_rule_document_types().into_iter().collect();
        match self.registered.write() {
            Ok(mut registered) => {
                if *registered != document_types {
                    info!(document_types = ?document_types, "Assignment hooks registered");
                }
                *registered = document_types;
            }
            Err(_) => warn!("Hook registration lock poisoned, registration not refreshed"),
        }
    }

    pub fn is_registered(&self, document_type: &str) -> bool {
        self.registered
            .read()
            .map(|registered| registered.contains(document_type))
            .unwrap_or(false)
    }

    pub fn registered_document_types(&self) -> Vec<String> {
        self.registered
            .read()
            .map(|registered| registered.iter().cloned().collect())
            .unwrap_or_default()
    }

    /// Forward a lifecycle event; `None` when the document type is not registered
    pub fn on_event(&self, document: &Document, event: DocumentEvent) -> Option<ApplyOutcome> {
        self.on_event_with_flags(document, event, HostFlags::default())
    }

    pub fn on_event_with_flags(
        &self,
        document: &Document,
        event: DocumentEvent,
        flags: HostFlags,
    ) -> Option<ApplyOutcome> {
        if !self.is_registered(&document.doctype) {
            debug!(doctype = %document.doctype, %event, "No assignment hook for document type");
            return None;
        }
        Some(self.engine.apply_with_flags(document, event, flags))
    }
}

impl RuleChangeListener for LifecycleHooks {
    fn rules_changed(&self, document_types: &[String]) {
        debug!(?document_types, "Assignment rules changed, refreshing hooks");
        self.refresh();
    }
}

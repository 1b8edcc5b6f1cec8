//! The assignment rule engine
//!
//! [`AssignmentRuleEngine::apply`] runs once per document lifecycle event and
//! moves through four phases:
//!
//! - `Init`: load the candidate rules for the document type
//! - `UnassignPass`: if the document has open assignments, let the first rule
//!   whose unassign condition holds clear them
//! - `AssignPass`: if nothing blocks assignment, let the first rule whose
//!   assign condition holds pick a user and open a new assignment
//! - `Done`
//!
//! Nothing escapes `apply`. The engine runs as a side effect of unrelated
//! saves, so every failure is logged (and condition failures surfaced to the
//! acting user) while the save itself proceeds.

use crate::condition::ConditionEvaluator;
use crate::error::{ResultExt, RotaError, RotaResult};
use crate::memory::{InMemoryAssignmentStore, InMemoryCacheStore, InMemoryDocumentStore, TracingNotifier};
use crate::registry::RuleRegistry;
use crate::rule::{ASSIGNMENT_RULE_DOCTYPE, AssignmentRule, fields};
use crate::rule_cache::RuleCache;
use crate::selector::selector_for;
use crate::store::{
    Assignment, AssignmentStore, CacheStore, DocumentStore, NewAssignment, Notifier, TemplateRenderer,
};
use crate::template::PlaceholderRenderer;
use rota_types::{Document, FieldValue};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use tracing::{debug, info, instrument, warn};
use uuid::Uuid;

/// Default number of open assignments inspected by the unassign pass
pub const DEFAULT_ASSIGNMENT_LOOKUP_LIMIT: usize = 5;

/// Document lifecycle events a host can forward to the engine
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DocumentEvent {
    BeforeInsert,
    AfterInsert,
    OnUpdate,
    OnSubmit,
    OnCancel,
    OnTrash,
    AfterRename,
}

impl DocumentEvent {
    pub fn as_str(&self) -> &'static str {
        match self {
            DocumentEvent::BeforeInsert => "before_insert",
            DocumentEvent::AfterInsert => "after_insert",
            DocumentEvent::OnUpdate => "on_update",
            DocumentEvent::OnSubmit => "on_submit",
            DocumentEvent::OnCancel => "on_cancel",
            DocumentEvent::OnTrash => "on_trash",
            DocumentEvent::AfterRename => "after_rename",
        }
    }
}

impl fmt::Display for DocumentEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DocumentEvent {
    type Err = RotaError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "before_insert" => Ok(DocumentEvent::BeforeInsert),
            "after_insert" => Ok(DocumentEvent::AfterInsert),
            "on_update" => Ok(DocumentEvent::OnUpdate),
            "on_submit" => Ok(DocumentEvent::OnSubmit),
            "on_cancel" => Ok(DocumentEvent::OnCancel),
            "on_trash" => Ok(DocumentEvent::OnTrash),
            "after_rename" => Ok(DocumentEvent::AfterRename),
            other => Err(RotaError::Configuration {
                message: format!("Unknown document event '{other}'"),
                rule: None,
                setting: Some("trigger_events".to_string()),
            }),
        }
    }
}

/// Host state that suppresses automatic assignment
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct HostFlags {
    /// Application install in progress
    pub in_install: bool,
    /// Data patch or migration in progress
    pub in_patch: bool,
}

impl HostFlags {
    pub fn suppresses_assignment(&self) -> bool {
        self.in_install || self.in_patch
    }
}

/// Engine tuning
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Open assignments fetched for the unassign pass, most recent first
    pub assignment_lookup_limit: usize,
    /// Events that trigger rule evaluation
    pub trigger_events: Vec<DocumentEvent>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            assignment_lookup_limit: DEFAULT_ASSIGNMENT_LOOKUP_LIMIT,
            trigger_events: vec![DocumentEvent::AfterInsert, DocumentEvent::OnUpdate],
        }
    }
}

/// What an `apply` call did
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ApplyOutcome {
    /// Host flags or the event kind ruled out evaluation
    Skipped,
    /// No enabled rules for the document type
    NoRules,
    /// A rule cleared the open assignments and no rule assigned anew
    Unassigned { rule: String },
    /// A rule opened a new assignment
    Assigned { rule: String, user: String, assignment_id: Uuid, unassigned_by: Option<String> },
    /// Open assignments exist and no rule cleared them
    Kept,
    /// No rule's assign condition matched
    NoMatch,
    /// Listing or clearing assignments failed
    Failed { message: String },
}

enum Phase {
    Init,
    UnassignPass { rules: Vec<AssignmentRule> },
    AssignPass { rules: Vec<AssignmentRule>, unassigned_by: Option<String> },
    Done { unassigned_by: Option<String> },
}

impl Phase {
    fn name(&self) -> &'static str {
        match self {
            Phase::Init => "init",
            Phase::UnassignPass { .. } => "unassign_pass",
            Phase::AssignPass { .. } => "assign_pass",
            Phase::Done { .. } => "done",
        }
    }
}

/// Services the engine depends on
#[derive(Clone)]
pub struct Collaborators {
    pub documents: Arc<dyn DocumentStore>,
    pub cache: Arc<dyn CacheStore>,
    pub assignments: Arc<dyn AssignmentStore>,
    pub renderer: Arc<dyn TemplateRenderer>,
    pub notifier: Arc<dyn Notifier>,
}

impl Collaborators {
    /// All in-process implementations
    pub fn in_memory() -> Self {
        Self {
            documents: Arc::new(InMemoryDocumentStore::new()),
            cache: Arc::new(InMemoryCacheStore::new()),
            assignments: Arc::new(InMemoryAssignmentStore::new()),
            renderer: Arc::new(PlaceholderRenderer),
            notifier: Arc::new(TracingNotifier),
        }
    }
}

impl fmt::Debug for Collaborators {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Collaborators").finish_non_exhaustive()
    }
}

/// Applies assignment rules to documents
pub struct AssignmentRuleEngine {
    config: EngineConfig,
    rule_cache: Arc<RuleCache>,
    documents: Arc<dyn DocumentStore>,
    assignments: Arc<dyn AssignmentStore>,
    renderer: Arc<dyn TemplateRenderer>,
    conditions: ConditionEvaluator,
}

impl fmt::Debug for AssignmentRuleEngine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AssignmentRuleEngine")
            .field("config", &self.config)
            .field("rule_cache", &self.rule_cache)
            .finish_non_exhaustive()
    }
}

impl AssignmentRuleEngine {
    pub fn new(config: EngineConfig, collaborators: Collaborators) -> Self {
        let rule_cache = Arc::new(RuleCache::new(collaborators.cache, Arc::clone(&collaborators.documents)));
        Self {
            config,
            rule_cache,
            documents: collaborators.documents,
            assignments: collaborators.assignments,
            renderer: collaborators.renderer,
            conditions: ConditionEvaluator::new(collaborators.notifier),
        }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn rule_cache(&self) -> &Arc<RuleCache> {
        &self.rule_cache
    }

    /// Registry sharing this engine's rule cache
    pub fn registry(&self) -> RuleRegistry {
        RuleRegistry::new(Arc::clone(&self.documents), Arc::clone(&self.rule_cache))
    }

    /// Document types that have at least one enabled rule
    pub fn get_rule_document_types(&self) -> Vec<String> {
        self.rule_cache.get_rule_document_types()
    }

    /// Handle a document lifecycle event with no host flags set
    pub fn apply(&self, document: &Document, event: DocumentEvent) -> ApplyOutcome {
        self.apply_with_flags(document, event, HostFlags::default())
    }

    /// Handle a document lifecycle event
    #[instrument(
        level = "debug",
        skip(self, document),
        fields(doctype = %document.doctype, name = %document.name)
    )]
    pub fn apply_with_flags(&self, document: &Document, event: DocumentEvent, flags: HostFlags) -> ApplyOutcome {
        if flags.suppresses_assignment() {
            debug!(?flags, "Install or patch in progress, skipping assignment rules");
            return ApplyOutcome::Skipped;
        }
        if !self.config.trigger_events.contains(&event) {
            return ApplyOutcome::Skipped;
        }

        let mut phase = Phase::Init;
        loop {
            debug!(phase = phase.name(), "Assignment phase");
            phase = match phase {
                Phase::Init => {
                    let rules = self.rule_cache.get_rules_for(&document.doctype);
                    if rules.is_empty() {
                        return ApplyOutcome::NoRules;
                    }
                    Phase::UnassignPass { rules }
                }

                Phase::UnassignPass { rules } => {
                    let open = match self
                        .assignments
                        .list_open(&document.doctype, &document.name, self.config.assignment_lookup_limit)
                        .with_operation_context("list open assignments")
                    {
                        Ok(open) => open,
                        Err(err) => return Self::failed("list open assignments", document, &err),
                    };

                    // Nothing to clear: nothing blocks a new assignment
                    if open.is_empty() {
                        Phase::AssignPass { rules, unassigned_by: None }
                    } else {
                        let mut unassigned_by = None;
                        for rule in &rules {
                            match self.apply_unassign(rule, document, &open) {
                                Ok(true) => {
                                    unassigned_by = Some(rule.name.clone());
                                    break;
                                }
                                Ok(false) => {}
                                Err(err) => return Self::failed("clear assignments", document, &err),
                            }
                        }
                        if unassigned_by.is_none() {
                            return ApplyOutcome::Kept;
                        }
                        Phase::AssignPass { rules, unassigned_by }
                    }
                }

                Phase::AssignPass { rules, unassigned_by } => {
                    for rule in &rules {
                        match self.apply_assign(rule, document) {
                            Ok(Some(assignment)) => {
                                return ApplyOutcome::Assigned {
                                    rule: rule.name.clone(),
                                    user: assignment.assigned_to,
                                    assignment_id: assignment.id,
                                    unassigned_by,
                                };
                            }
                            Ok(None) => {}
                            Err(err) => {
                                warn!(
                                    rule = %rule.name,
                                    category = err.category(),
                                    severity = %err.severity(),
                                    recoverable = err.is_recoverable(),
                                    error = %err,
                                    "Assignment rule could not assign, trying next rule"
                                );
                            }
                        }
                    }
                    Phase::Done { unassigned_by }
                }

                Phase::Done { unassigned_by } => {
                    return match unassigned_by {
                        Some(rule) => ApplyOutcome::Unassigned { rule },
                        None => ApplyOutcome::NoMatch,
                    };
                }
            };
        }
    }

    fn failed(operation: &str, document: &Document, err: &RotaError) -> ApplyOutcome {
        warn!(
            operation,
            severity = %err.severity(),
            doctype = %document.doctype,
            name = %document.name,
            error = %err,
            "Assignment rules aborted for this event"
        );
        ApplyOutcome::Failed { message: format!("{operation}: {err}") }
    }

    /// Clear the document's assignments if `rule` created one of them and its
    /// unassign condition holds
    pub fn apply_unassign(
        &self,
        rule: &AssignmentRule,
        document: &Document,
        open: &[Assignment],
    ) -> RotaResult<bool> {
        let created_by_rule = open.iter().any(|a| a.originating_rule.as_deref() == Some(rule.name.as_str()));
        if !rule.has_unassign_condition() || !created_by_rule {
            return Ok(false);
        }
        self.clear_assignment(rule, document)
    }

    /// Cancel every open assignment on the document when the rule's unassign
    /// condition holds
    pub fn clear_assignment(&self, rule: &AssignmentRule, document: &Document) -> RotaResult<bool> {
        if !self
            .conditions
            .check(&rule.name, fields::UNASSIGN_CONDITION, &rule.unassign_condition, document)
        {
            return Ok(false);
        }

        let cleared = self
            .assignments
            .clear(&document.doctype, &document.name)
            .with_operation_context("clear assignments")?;
        info!(
            rule = %rule.name,
            doctype = %document.doctype,
            name = %document.name,
            cleared,
            "Assignments cleared by unassign condition"
        );
        Ok(true)
    }

    /// Assign the document when the rule's assign condition holds
    pub fn apply_assign(&self, rule: &AssignmentRule, document: &Document) -> RotaResult<Option<Assignment>> {
        if !self
            .conditions
            .check(&rule.name, fields::ASSIGN_CONDITION, &rule.assign_condition, document)
        {
            return Ok(None);
        }
        self.do_assignment(rule, document).map(Some)
    }

    /// Replace the document's assignments with one for the rule's next user
    ///
    /// The round-robin cursor is written after the assignment exists; a
    /// failed cursor write is logged and does not undo the assignment.
    pub fn do_assignment(&self, rule: &AssignmentRule, document: &Document) -> RotaResult<Assignment> {
        if rule.users.is_empty() {
            return Err(RotaError::configuration(&rule.name, fields::USERS, "rule has no users to assign"));
        }

        self.assignments
            .clear(&document.doctype, &document.name)
            .with_operation_context("clear assignments")?;

        let selector = selector_for(rule.rule_kind);
        let user = selector
            .select(rule, self.assignments.as_ref())
            .with_rule_context(&rule.name)?;

        let description = match self.renderer.render(&rule.description_template, document) {
            Ok(description) => description,
            Err(err) => {
                warn!(rule = %rule.name, error = %err, "Description template failed, using it verbatim");
                rule.description_template.clone()
            }
        };

        let assignment = self.assignments.create(NewAssignment {
            reference_type: document.doctype.clone(),
            reference_name: document.name.clone(),
            assigned_to: user.clone(),
            description,
            originating_rule: Some(rule.name.clone()),
        })
        .with_operation_context("create assignment")?;

        if let Err(err) = self.documents.set_field(
            ASSIGNMENT_RULE_DOCTYPE,
            &rule.name,
            fields::LAST_USER,
            FieldValue::String(user.clone()),
        ) {
            warn!(rule = %rule.name, error = %err, "Failed to persist round-robin cursor");
        }

        info!(
            rule = %rule.name,
            strategy = selector.name(),
            doctype = %document.doctype,
            name = %document.name,
            user = %user,
            assignment_id = %assignment.id,
            "Document assigned"
        );
        Ok(assignment)
    }
}

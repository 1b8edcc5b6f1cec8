#![allow(missing_docs)]
//! Core of the rota assignment-rule engine.
//!
//! Hosts call [`AssignmentRuleEngine::apply`] after every document create or
//! update. The engine looks up the enabled assignment rules for the document
//! type, lets them clear stale assignments, and assigns the document to a user
//! chosen by round robin or by current load.
//!
//! Persistence, caching and user notification are reached only through the
//! traits in [`store`]; [`memory`] provides in-process implementations.

/// Boolean evaluation of rule conditions with failure absorption
pub mod condition;
/// Unassign/assign state machine
pub mod engine;
/// Error taxonomy
pub mod error;
/// Restricted expression language used by conditions
pub mod expression;
/// In-process collaborator implementations
pub mod memory;
/// Rule create/update/rename/delete with cache invalidation
pub mod registry;
/// Assignment rule model
pub mod rule;
/// Candidate-rule cache per document type
pub mod rule_cache;
/// Round-robin and load-balancing user selection
pub mod selector;
/// Collaborator traits
pub mod store;
/// Description placeholder rendering
pub mod template;

pub use condition::ConditionEvaluator;
pub use engine::{
    ApplyOutcome, AssignmentRuleEngine, Collaborators, DocumentEvent, EngineConfig, HostFlags,
};
pub use error::{ErrorSeverity, ResultExt, RotaError, RotaResult};
pub use registry::{RuleChangeListener, RuleRegistry};
pub use rule::{ASSIGNMENT_RULE_DOCTYPE, AssignmentRule, RuleKind};
pub use rule_cache::{CacheKey, RuleCache, RuleCacheStats};
pub use selector::{LoadBalancingSelector, RoundRobinSelector, UserSelector, selector_for};
pub use store::{
    Assignment, AssignmentStatus, AssignmentStore, CacheStore, DocumentStore, Filters, NewAssignment, Notifier,
    OrderBy, TemplateRenderer,
};
pub use template::PlaceholderRenderer;

pub use rota_types::{Document, FieldValue};

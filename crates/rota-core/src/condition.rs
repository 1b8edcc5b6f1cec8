//! Boolean evaluation of rule conditions
//!
//! [`ConditionEvaluator::evaluate`] reports failures; [`ConditionEvaluator::check`]
//! absorbs them. A broken condition on one rule must never abort the document
//! save that triggered the engine, so the engine only ever calls `check`.

use crate::error::{RotaError, RotaResult};
use crate::expression::{EvaluationContext, ExpressionEngine};
use crate::store::Notifier;
use rota_types::Document;
use std::sync::Arc;
use tracing::{trace, warn};

/// Prefix of the advisory shown to the acting user when a condition fails
pub const FAILURE_PREFIX: &str = "Auto assignment failed";

/// Evaluates condition strings against documents
pub struct ConditionEvaluator {
    expressions: ExpressionEngine,
    notifier: Arc<dyn Notifier>,
}

impl std::fmt::Debug for ConditionEvaluator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConditionEvaluator")
            .field("cached_expressions", &self.expressions.cached_expressions())
            .finish_non_exhaustive()
    }
}

impl ConditionEvaluator {
    pub fn new(notifier: Arc<dyn Notifier>) -> Self {
        Self::with_engine(ExpressionEngine::new(), notifier)
    }

    pub fn with_engine(expressions: ExpressionEngine, notifier: Arc<dyn Notifier>) -> Self {
        Self { expressions, notifier }
    }

    /// Evaluate a condition to a boolean using truthiness
    ///
    /// A blank condition is not satisfied.
    pub fn evaluate(&self, expression: &str, document: &Document) -> RotaResult<bool> {
        let source = expression.trim();
        if source.is_empty() {
            return Ok(false);
        }

        let context = EvaluationContext::for_document(document);
        let value = self
            .expressions
            .eval(source, &context)
            .map_err(|err| RotaError::condition(source, err.to_string()))?;
        Ok(value.is_truthy())
    }

    /// Evaluate, turning every failure into `false` plus a warning to the acting user
    pub fn check(&self, rule: &str, label: &str, expression: &str, document: &Document) -> bool {
        match self.evaluate(expression, document) {
            Ok(satisfied) => {
                trace!(rule, label, satisfied, document = %document.name, "Condition evaluated");
                satisfied
            }
            Err(err) => {
                let reason = match &err {
                    RotaError::ConditionEvaluation { message, .. } => message.clone(),
                    other => other.to_string(),
                };
                warn!(
                    rule,
                    label,
                    doctype = %document.doctype,
                    document = %document.name,
                    error = %reason,
                    "Condition failed; treating as not satisfied"
                );
                if err.is_user_visible() {
                    self.notifier.warn(&format!("{FAILURE_PREFIX}: {reason}"));
                }
                false
            }
        }
    }

    /// Access the underlying expression engine
    pub fn expressions(&self) -> &ExpressionEngine {
        &self.expressions
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::CollectingNotifier;

    fn evaluator() -> (ConditionEvaluator, Arc<CollectingNotifier>) {
        let notifier = Arc::new(CollectingNotifier::new());
        (ConditionEvaluator::new(notifier.clone()), notifier)
    }

    fn issue() -> Document {
        Document::new("Issue", "ISS-7").with_field("status", "Open").with_field("priority", "High")
    }

    #[test]
    fn test_evaluate_truthiness() {
        let (evaluator, _) = evaluator();
        assert!(evaluator.evaluate("status == 'Open'", &issue()).unwrap());
        assert!(evaluator.evaluate("priority", &issue()).unwrap());
        assert!(!evaluator.evaluate("[]", &issue()).unwrap());
    }

    #[test]
    fn test_blank_condition_is_not_satisfied_silently() {
        let (evaluator, notifier) = evaluator();
        assert!(!evaluator.check("R", "assign", "   ", &issue()));
        assert!(notifier.messages().is_empty());
    }

    #[test]
    fn test_evaluate_reports_condition_errors() {
        let (evaluator, _) = evaluator();
        match evaluator.evaluate("status ==", &issue()) {
            Err(RotaError::ConditionEvaluation { expression, .. }) => {
                assert_eq!(expression.as_deref(), Some("status =="))
            }
            other => panic!("Unexpected result: {other:?}"),
        }
    }

    #[test]
    fn test_check_absorbs_failures_and_notifies() {
        let (evaluator, notifier) = evaluator();
        assert!(!evaluator.check("R", "assign", "__import__('os')", &issue()));
        assert!(!evaluator.check("R", "unassign", "customer == 'x'", &issue()));

        let messages = notifier.messages();
        assert_eq!(messages.len(), 2);
        assert!(messages.iter().all(|m| m.starts_with("Auto assignment failed: ")));
        assert!(messages[1].contains("customer"));
    }
}

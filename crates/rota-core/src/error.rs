//! Error taxonomy for the assignment engine
//!
//! Every failure the engine can observe maps onto one of these variants. The
//! engine absorbs all of them at the boundary of a rule evaluation; the variant
//! decides whether the failure is surfaced to the acting user, skips the rule,
//! or is silently treated as "no rules".

use std::fmt;
use thiserror::Error;

/// Error type for assignment engine operations
#[derive(Error, Debug, Clone, PartialEq)]
pub enum RotaError {
    /// A condition expression failed to parse or evaluate
    #[error("Condition evaluation failed: {message}")]
    ConditionEvaluation { message: String, expression: Option<String> },

    /// A rule is misconfigured (for example it has no users)
    #[error("Configuration error: {message}")]
    Configuration { message: String, rule: Option<String>, setting: Option<String> },

    /// A cache entry was absent or unreadable
    #[error("Cache miss for '{key}': {message}")]
    CacheMiss { key: String, message: String },

    /// The backing table does not exist yet (install or migration in progress)
    #[error("Store unavailable: {message}")]
    StoreUnavailable { message: String, document_type: Option<String> },

    /// Any other collaborator failure
    #[error("Store error: {message}")]
    Store { message: String, operation: Option<String> },

    /// A document lookup found nothing
    #[error("{document_type} '{name}' not found")]
    NotFound { document_type: String, name: String },

    /// Description template failed to render
    #[error("Template error: {message}")]
    Template { message: String, template: Option<String> },

    /// Cache payload could not be encoded or decoded
    #[error("Serialization error: {message}")]
    Serialization { message: String },
}

impl RotaError {
    /// Get the error category for logging
    pub fn category(&self) -> &'static str {
        match self {
            RotaError::ConditionEvaluation { .. } => "condition",
            RotaError::Configuration { .. } => "configuration",
            RotaError::CacheMiss { .. } => "cache",
            RotaError::StoreUnavailable { .. } => "store_unavailable",
            RotaError::Store { .. } => "store",
            RotaError::NotFound { .. } => "not_found",
            RotaError::Template { .. } => "template",
            RotaError::Serialization { .. } => "serialization",
        }
    }

    /// Get the error severity level
    pub fn severity(&self) -> ErrorSeverity {
        match self {
            RotaError::CacheMiss { .. } | RotaError::StoreUnavailable { .. } => ErrorSeverity::Low,
            RotaError::ConditionEvaluation { .. }
            | RotaError::Configuration { .. }
            | RotaError::Template { .. }
            | RotaError::NotFound { .. } => ErrorSeverity::Medium,
            RotaError::Store { .. } | RotaError::Serialization { .. } => ErrorSeverity::High,
        }
    }

    /// Check if processing can continue with the next rule after this error
    pub fn is_recoverable(&self) -> bool {
        match self {
            RotaError::ConditionEvaluation { .. } => true,
            RotaError::Configuration { .. } => true,
            RotaError::CacheMiss { .. } => true,
            RotaError::StoreUnavailable { .. } => true,
            RotaError::Template { .. } => true,
            RotaError::NotFound { .. } => true,
            RotaError::Store { .. } => false,
            RotaError::Serialization { .. } => true,
        }
    }

    /// Whether the failure should be shown to the acting user as an advisory warning
    pub fn is_user_visible(&self) -> bool {
        matches!(self, RotaError::ConditionEvaluation { .. })
    }
}

/// Error severity levels for logging
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub enum ErrorSeverity {
    Low,
    Medium,
    High,
}

impl fmt::Display for ErrorSeverity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ErrorSeverity::Low => write!(f, "LOW"),
            ErrorSeverity::Medium => write!(f, "MEDIUM"),
            ErrorSeverity::High => write!(f, "HIGH"),
        }
    }
}

/// Result type alias for engine operations
pub type RotaResult<T> = Result<T, RotaError>;

/// Convenience constructors for common error scenarios
impl RotaError {
    /// Create a condition evaluation error
    pub fn condition(expression: &str, message: impl Into<String>) -> Self {
        Self::ConditionEvaluation {
            message: message.into(),
            expression: Some(expression.to_string()),
        }
    }

    /// Create a rule configuration error
    pub fn configuration(rule: &str, setting: &str, message: impl Into<String>) -> Self {
        Self::Configuration {
            message: message.into(),
            rule: Some(rule.to_string()),
            setting: Some(setting.to_string()),
        }
    }

    /// Create a cache miss error
    pub fn cache_miss(key: impl Into<String>, message: impl Into<String>) -> Self {
        Self::CacheMiss { key: key.into(), message: message.into() }
    }

    /// Create a missing-table error
    pub fn store_unavailable(document_type: &str, message: impl Into<String>) -> Self {
        Self::StoreUnavailable {
            message: message.into(),
            document_type: Some(document_type.to_string()),
        }
    }

    /// Create a generic store error
    pub fn store(operation: &str, message: impl Into<String>) -> Self {
        Self::Store { message: message.into(), operation: Some(operation.to_string()) }
    }

    /// Create a not-found error
    pub fn not_found(document_type: &str, name: &str) -> Self {
        Self::NotFound { document_type: document_type.to_string(), name: name.to_string() }
    }

    /// Create a template rendering error
    pub fn template(template: &str, message: impl Into<String>) -> Self {
        Self::Template { message: message.into(), template: Some(template.to_string()) }
    }
}

impl From<serde_json::Error> for RotaError {
    fn from(err: serde_json::Error) -> Self {
        RotaError::Serialization { message: format!("JSON error: {err}") }
    }
}

/// Extension trait for adding rule context to Results
pub trait ResultExt<T> {
    /// Attach the rule name to configuration errors
    fn with_rule_context(self, rule_name: &str) -> RotaResult<T>;

    /// Attach the operation name to store errors
    fn with_operation_context(self, operation: &str) -> RotaResult<T>;
}

impl<T> ResultExt<T> for RotaResult<T> {
    fn with_rule_context(self, rule_name: &str) -> RotaResult<T> {
        self.map_err(|mut err| {
            if let RotaError::Configuration { rule, .. } = &mut err {
                *rule = Some(rule_name.to_string());
            }
            err
        })
    }

    fn with_operation_context(self, operation: &str) -> RotaResult<T> {
        self.map_err(|mut err| {
            if let RotaError::Store { operation: op, .. } = &mut err {
                *op = Some(operation.to_string());
            }
            err
        })
    }
}

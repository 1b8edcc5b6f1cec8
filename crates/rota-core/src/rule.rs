//! Assignment rule model
//!
//! Rules are stored as ordinary documents of type [`ASSIGNMENT_RULE_DOCTYPE`]
//! so that hosts can persist them alongside everything else. This module
//! converts between the stored document and the typed rule.

use crate::error::{RotaError, RotaResult};
use rota_types::{Document, FieldValue};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Document type under which rules are stored
pub const ASSIGNMENT_RULE_DOCTYPE: &str = "Assignment Rule";

/// Stored field names
pub mod fields {
    pub const DOCUMENT_TYPE: &str = "document_type";
    pub const PRIORITY: &str = "priority";
    pub const DISABLED: &str = "disabled";
    pub const RULE: &str = "rule";
    pub const ASSIGN_CONDITION: &str = "assign_condition";
    pub const UNASSIGN_CONDITION: &str = "unassign_condition";
    pub const USERS: &str = "users";
    pub const LAST_USER: &str = "last_user";
    pub const DESCRIPTION: &str = "description";
}

/// User selection strategy of a rule
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum RuleKind {
    #[default]
    RoundRobin,
    LoadBalancing,
}

impl RuleKind {
    /// Label used in the stored `rule` field
    pub fn label(&self) -> &'static str {
        match self {
            RuleKind::RoundRobin => "Round Robin",
            RuleKind::LoadBalancing => "Load Balancing",
        }
    }
}

impl fmt::Display for RuleKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

impl FromStr for RuleKind {
    type Err = RotaError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "Round Robin" => Ok(RuleKind::RoundRobin),
            "Load Balancing" => Ok(RuleKind::LoadBalancing),
            other => Err(RotaError::Configuration {
                message: format!("Unknown rule kind '{other}'"),
                rule: None,
                setting: Some(fields::RULE.to_string()),
            }),
        }
    }
}

/// A typed assignment rule
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AssignmentRule {
    pub name: String,
    pub document_type: String,
    pub priority: i64,
    pub disabled: bool,
    pub rule_kind: RuleKind,
    pub assign_condition: String,
    pub unassign_condition: String,
    pub users: Vec<String>,
    pub last_user: Option<String>,
    pub description_template: String,
}

impl AssignmentRule {
    /// Create an enabled round-robin rule with no conditions
    pub fn new(name: impl Into<String>, document_type: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            document_type: document_type.into(),
            priority: 0,
            disabled: false,
            rule_kind: RuleKind::RoundRobin,
            assign_condition: String::new(),
            unassign_condition: String::new(),
            users: Vec::new(),
            last_user: None,
            description_template: String::new(),
        }
    }

    #[must_use]
    pub fn with_priority(mut self, priority: i64) -> Self {
        self.priority = priority;
        self
    }

    #[must_use]
    pub fn with_kind(mut self, kind: RuleKind) -> Self {
        self.rule_kind = kind;
        self
    }

    #[must_use]
    pub fn with_assign_condition(mut self, condition: impl Into<String>) -> Self {
        self.assign_condition = condition.into();
        self
    }

    #[must_use]
    pub fn with_unassign_condition(mut self, condition: impl Into<String>) -> Self {
        self.unassign_condition = condition.into();
        self
    }

    #[must_use]
    pub fn with_users<I, S>(mut self, users: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.users = users.into_iter().map(Into::into).collect();
        self
    }

    #[must_use]
    pub fn with_description(mut self, template: impl Into<String>) -> Self {
        self.description_template = template.into();
        self
    }

    #[must_use]
    pub fn disabled(mut self, disabled: bool) -> Self {
        self.disabled = disabled;
        self
    }

    /// A rule with a blank unassign condition never clears anything
    pub fn has_unassign_condition(&self) -> bool {
        !self.unassign_condition.trim().is_empty()
    }

    /// Parse a stored rule document
    pub fn from_document(document: &Document) -> RotaResult<Self> {
        if document.doctype != ASSIGNMENT_RULE_DOCTYPE {
            return Err(RotaError::configuration(
                &document.name,
                "doctype",
                format!("expected a '{}' document, got '{}'", ASSIGNMENT_RULE_DOCTYPE, document.doctype),
            ));
        }

        let text = |field: &str| document.get(field).map(|v| v.as_string()).unwrap_or_default();

        let document_type = text(fields::DOCUMENT_TYPE);
        if document_type.is_empty() {
            return Err(RotaError::configuration(&document.name, fields::DOCUMENT_TYPE, "document type is required"));
        }

        let priority = match document.get(fields::PRIORITY) {
            None | Some(FieldValue::Null) => 0,
            Some(value) => value.as_integer().ok_or_else(|| {
                RotaError::configuration(&document.name, fields::PRIORITY, format!("'{value}' is not an integer"))
            })?,
        };

        let rule_kind = match text(fields::RULE).as_str() {
            "" => RuleKind::default(),
            label => label.parse().map_err(|_| {
                RotaError::configuration(&document.name, fields::RULE, format!("unknown rule kind '{label}'"))
            })?,
        };

        let users = match document.get(fields::USERS) {
            Some(FieldValue::Array(items)) => items
                .iter()
                .map(FieldValue::as_string)
                .filter(|user| !user.is_empty())
                .collect(),
            Some(FieldValue::Null) | None => Vec::new(),
            Some(other) => {
                return Err(RotaError::configuration(
                    &document.name,
                    fields::USERS,
                    format!("expected a list of users, got {}", other.type_name()),
                ));
            }
        };

        let last_user = Some(text(fields::LAST_USER)).filter(|user| !user.is_empty());

        Ok(Self {
            name: document.name.clone(),
            document_type,
            priority,
            disabled: document.get(fields::DISABLED).is_some_and(|v| v.as_flag()),
            rule_kind,
            assign_condition: text(fields::ASSIGN_CONDITION),
            unassign_condition: text(fields::UNASSIGN_CONDITION),
            users,
            last_user,
            description_template: text(fields::DESCRIPTION),
        })
    }

    /// Convert into the stored document form
    pub fn to_document(&self) -> Document {
        let users = self.users.iter().map(|u| FieldValue::String(u.clone())).collect();
        Document::new(ASSIGNMENT_RULE_DOCTYPE, self.name.clone())
            .with_field(fields::DOCUMENT_TYPE, self.document_type.as_str())
            .with_field(fields::PRIORITY, self.priority)
            .with_field(fields::DISABLED, self.disabled)
            .with_field(fields::RULE, self.rule_kind.label())
            .with_field(fields::ASSIGN_CONDITION, self.assign_condition.as_str())
            .with_field(fields::UNASSIGN_CONDITION, self.unassign_condition.as_str())
            .with_field(fields::USERS, FieldValue::Array(users))
            .with_field(
                fields::LAST_USER,
                self.last_user.clone().map(FieldValue::String).unwrap_or(FieldValue::Null),
            )
            .with_field(fields::DESCRIPTION, self.description_template.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_document_conversion() {
        let rule = AssignmentRule::new("Support", "Issue")
            .with_priority(3)
            .with_kind(RuleKind::LoadBalancing)
            .with_assign_condition("status == 'Open'")
            .with_users(["ann@example.com", "bob@example.com"])
            .with_description("Look at {{ subject }}");

        let document = rule.to_document();
        assert_eq!(document.get_str("rule"), Some("Load Balancing"));
        assert_eq!(AssignmentRule::from_document(&document).unwrap(), rule);
    }

    #[test]
    fn test_defaults_for_sparse_documents() {
        let document = Document::new(ASSIGNMENT_RULE_DOCTYPE, "Sparse").with_field("document_type", "Issue");
        let rule = AssignmentRule::from_document(&document).unwrap();

        assert_eq!(rule.priority, 0);
        assert!(!rule.disabled);
        assert_eq!(rule.rule_kind, RuleKind::RoundRobin);
        assert!(rule.users.is_empty());
        assert!(rule.last_user.is_none());
        assert!(!rule.has_unassign_condition());
    }

    #[test]
    fn test_checkbox_disabled_flag() {
        let document = AssignmentRule::new("Off", "Issue").to_document().with_field("disabled", 1_i64);
        assert!(AssignmentRule::from_document(&document).unwrap().disabled);
    }

    #[test]
    fn test_invalid_documents_are_configuration_errors() {
        let wrong_type = Document::new("Issue", "ISS-1");
        assert!(matches!(AssignmentRule::from_document(&wrong_type), Err(RotaError::Configuration { .. })));

        let bad_kind = AssignmentRule::new("Odd", "Issue").to_document().with_field("rule", "Lottery");
        match AssignmentRule::from_document(&bad_kind) {
            Err(RotaError::Configuration { setting, rule, .. }) => {
                assert_eq!(setting.as_deref(), Some("rule"));
                assert_eq!(rule.as_deref(), Some("Odd"));
            }
            other => panic!("Unexpected result: {other:?}"),
        }
    }
}

//! Collaborator interfaces
//!
//! The engine never talks to a database, cache server or UI directly. Hosts
//! provide implementations of these traits; `crate::memory` ships in-process
//! versions used by tests and small embeddings.

use crate::error::RotaResult;
use chrono::{DateTime, Utc};
use rota_types::{Document, FieldValue};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use uuid::Uuid;

/// Equality filters applied to a document query
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Filters {
    conditions: Vec<(String, FieldValue)>,
}

impl Filters {
    pub fn new() -> Self {
        Self::default()
    }

    /// Require `field == value`
    #[must_use]
    pub fn eq(mut self, field: &str, value: impl Into<FieldValue>) -> Self {
        self.conditions.push((field.to_string(), value.into()));
        self
    }

    pub fn conditions(&self) -> &[(String, FieldValue)] {
        &self.conditions
    }

    /// Check a document against every condition
    ///
    /// Boolean conditions compare as check-box flags so that an absent or `0`
    /// field matches `false`.
    pub fn matches(&self, document: &Document) -> bool {
        self.conditions.iter().all(|(field, expected)| {
            let actual = document.get(field).unwrap_or(FieldValue::Null);
            match expected {
                FieldValue::Boolean(flag) => actual.as_flag() == *flag,
                FieldValue::Null => actual.is_null(),
                other => &actual == other,
            }
        })
    }
}

/// Sort order for a document query
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OrderBy {
    pub field: String,
    pub descending: bool,
}

impl OrderBy {
    pub fn asc(field: &str) -> Self {
        Self { field: field.to_string(), descending: false }
    }

    pub fn desc(field: &str) -> Self {
        Self { field: field.to_string(), descending: true }
    }

    /// Compare two documents on the ordering field; incomparable values tie
    pub fn compare(&self, a: &Document, b: &Document) -> Ordering {
        let left = a.get(&self.field).unwrap_or(FieldValue::Null);
        let right = b.get(&self.field).unwrap_or(FieldValue::Null);
        let ordering = left.partial_cmp(&right).unwrap_or(Ordering::Equal);
        if self.descending { ordering.reverse() } else { ordering }
    }
}

/// Persistence for documents of arbitrary type
pub trait DocumentStore: Send + Sync {
    /// Load a single document
    fn get_document(&self, doctype: &str, name: &str) -> RotaResult<Document>;

    /// Query documents of one type. Equal sort keys keep insertion order.
    fn query(
        &self,
        doctype: &str,
        filters: &Filters,
        order_by: Option<&OrderBy>,
        limit: Option<usize>,
    ) -> RotaResult<Vec<Document>>;

    /// Upsert a single column without touching the rest of the document
    fn set_field(&self, doctype: &str, name: &str, field: &str, value: FieldValue) -> RotaResult<()>;

    /// Insert a new document; fails if the name is taken
    fn insert_document(&self, document: Document) -> RotaResult<()>;

    /// Replace an existing document in place
    fn update_document(&self, document: Document) -> RotaResult<()>;

    /// Change a document's name, keeping its position and fields
    fn rename_document(&self, doctype: &str, old_name: &str, new_name: &str) -> RotaResult<()>;

    /// Remove a document
    fn delete_document(&self, doctype: &str, name: &str) -> RotaResult<()>;
}

/// Shared key/value cache holding JSON payloads
pub trait CacheStore: Send + Sync {
    fn get(&self, key: &str) -> RotaResult<Option<String>>;
    fn set(&self, key: &str, value: String) -> RotaResult<()>;
    fn delete(&self, key: &str) -> RotaResult<()>;
}

/// Lifecycle state of an assignment
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AssignmentStatus {
    Open,
    Closed,
    Cancelled,
}

/// An assignment (to-do) linking a document to a user
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Assignment {
    pub id: Uuid,
    pub reference_type: String,
    pub reference_name: String,
    pub assigned_to: String,
    pub description: String,
    pub status: AssignmentStatus,
    /// Rule that created the assignment; `None` for manual assignments
    pub originating_rule: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl Assignment {
    pub fn is_open(&self) -> bool {
        self.status == AssignmentStatus::Open
    }
}

/// Request to open a new assignment
#[derive(Debug, Clone, PartialEq)]
pub struct NewAssignment {
    pub reference_type: String,
    pub reference_name: String,
    pub assigned_to: String,
    pub description: String,
    pub originating_rule: Option<String>,
}

/// Persistence for assignments
pub trait AssignmentStore: Send + Sync {
    /// Open a new assignment
    fn create(&self, assignment: NewAssignment) -> RotaResult<Assignment>;

    /// Cancel every open assignment on a document, returning how many were cancelled
    fn clear(&self, reference_type: &str, reference_name: &str) -> RotaResult<usize>;

    /// Open assignments on a document, most recent first
    fn list_open(&self, reference_type: &str, reference_name: &str, limit: usize) -> RotaResult<Vec<Assignment>>;

    /// Number of open assignments held by `user` across documents of `reference_type`
    fn open_count(&self, user: &str, reference_type: &str) -> RotaResult<usize>;
}

/// Renders an assignment description from a template and a document
pub trait TemplateRenderer: Send + Sync {
    fn render(&self, template: &str, document: &Document) -> RotaResult<String>;
}

/// Advisory channel to the user whose action triggered the engine
pub trait Notifier: Send + Sync {
    fn warn(&self, message: &str);
}

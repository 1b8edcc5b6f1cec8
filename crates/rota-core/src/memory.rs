//! In-process implementations of the collaborator traits
//!
//! Backed by `dashmap` so they can be shared across threads behind an `Arc`.
//! Used by the test-suite and by hosts that keep rules and assignments in memory.

use crate::error::{RotaError, RotaResult};
use crate::store::{
    Assignment, AssignmentStatus, AssignmentStore, CacheStore, DocumentStore, Filters, NewAssignment, Notifier,
    OrderBy,
};
use chrono::Utc;
use dashmap::DashMap;
use rota_types::{Document, FieldValue};
use std::sync::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};
use tracing::warn;
use uuid::Uuid;

/// Document tables keyed by document type, each kept in insertion order
#[derive(Debug, Default)]
pub struct InMemoryDocumentStore {
    tables: DashMap<String, Vec<Document>>,
}

impl InMemoryDocumentStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create an empty table so that queries against it succeed
    pub fn create_table(&self, doctype: &str) {
        self.tables.entry(doctype.to_string()).or_default();
    }

    /// Drop a table, simulating a schema that has not been installed yet
    pub fn drop_table(&self, doctype: &str) {
        self.tables.remove(doctype);
    }

    pub fn len(&self, doctype: &str) -> usize {
        self.tables.get(doctype).map(|table| table.len()).unwrap_or(0)
    }

    pub fn is_empty(&self, doctype: &str) -> bool {
        self.len(doctype) == 0
    }

    fn missing_table(doctype: &str) -> RotaError {
        RotaError::store_unavailable(doctype, format!("table for '{doctype}' does not exist"))
    }
}

impl DocumentStore for InMemoryDocumentStore {
    fn get_document(&self, doctype: &str, name: &str) -> RotaResult<Document> {
        let table = self.tables.get(doctype).ok_or_else(|| Self::missing_table(doctype))?;
        table
            .iter()
            .find(|doc| doc.name == name)
            .cloned()
            .ok_or_else(|| RotaError::not_found(doctype, name))
    }

    fn query(
        &self,
        doctype: &str,
        filters: &Filters,
        order_by: Option<&OrderBy>,
        limit: Option<usize>,
    ) -> RotaResult<Vec<Document>> {
        let table = self.tables.get(doctype).ok_or_else(|| Self::missing_table(doctype))?;
        let mut rows: Vec<Document> = table.iter().filter(|doc| filters.matches(doc)).cloned().collect();
        drop(table);

        if let Some(order) = order_by {
            rows.sort_by(|a, b| order.compare(a, b));
        }
        if let Some(limit) = limit {
            rows.truncate(limit);
        }
        Ok(rows)
    }

    fn set_field(&self, doctype: &str, name: &str, field: &str, value: FieldValue) -> RotaResult<()> {
        let mut table = self.tables.get_mut(doctype).ok_or_else(|| Self::missing_table(doctype))?;
        let doc = table
            .iter_mut()
            .find(|doc| doc.name == name)
            .ok_or_else(|| RotaError::not_found(doctype, name))?;
        doc.set(field, value);
        Ok(())
    }

    fn insert_document(&self, document: Document) -> RotaResult<()> {
        let mut table = self.tables.entry(document.doctype.clone()).or_default();
        if table.iter().any(|doc| doc.name == document.name) {
            return Err(RotaError::store(
                "insert_document",
                format!("{} '{}' already exists", document.doctype, document.name),
            ));
        }
        table.push(document);
        Ok(())
    }

    fn update_document(&self, document: Document) -> RotaResult<()> {
        let mut table = self
            .tables
            .get_mut(&document.doctype)
            .ok_or_else(|| Self::missing_table(&document.doctype))?;
        let slot = table
            .iter_mut()
            .find(|doc| doc.name == document.name)
            .ok_or_else(|| RotaError::not_found(&document.doctype, &document.name))?;
        *slot = document;
        Ok(())
    }

    fn rename_document(&self, doctype: &str, old_name: &str, new_name: &str) -> RotaResult<()> {
        let mut table = self.tables.get_mut(doctype).ok_or_else(|| Self::missing_table(doctype))?;
        if old_name != new_name && table.iter().any(|doc| doc.name == new_name) {
            return Err(RotaError::store("rename_document", format!("{doctype} '{new_name}' already exists")));
        }
        let doc = table
            .iter_mut()
            .find(|doc| doc.name == old_name)
            .ok_or_else(|| RotaError::not_found(doctype, old_name))?;
        doc.name = new_name.to_string();
        Ok(())
    }

    fn delete_document(&self, doctype: &str, name: &str) -> RotaResult<()> {
        let mut table = self.tables.get_mut(doctype).ok_or_else(|| Self::missing_table(doctype))?;
        let position = table
            .iter()
            .position(|doc| doc.name == name)
            .ok_or_else(|| RotaError::not_found(doctype, name))?;
        table.remove(position);
        Ok(())
    }
}

/// Assignment store with a monotonic sequence for recency ordering
#[derive(Debug, Default)]
pub struct InMemoryAssignmentStore {
    assignments: DashMap<Uuid, (u64, Assignment)>,
    sequence: AtomicU64,
}

impl InMemoryAssignmentStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every assignment ever created on a document, oldest first
    pub fn history(&self, reference_type: &str, reference_name: &str) -> Vec<Assignment> {
        let mut rows: Vec<(u64, Assignment)> = self
            .assignments
            .iter()
            .filter(|entry| {
                let (_, a) = entry.value();
                a.reference_type == reference_type && a.reference_name == reference_name
            })
            .map(|entry| entry.value().clone())
            .collect();
        rows.sort_by_key(|(seq, _)| *seq);
        rows.into_iter().map(|(_, a)| a).collect()
    }

    /// Close an assignment as completed work
    pub fn close(&self, id: Uuid) -> RotaResult<()> {
        let mut entry = self
            .assignments
            .get_mut(&id)
            .ok_or_else(|| RotaError::not_found("Assignment", &id.to_string()))?;
        entry.1.status = AssignmentStatus::Closed;
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.assignments.len()
    }

    pub fn is_empty(&self) -> bool {
        self.assignments.is_empty()
    }
}

impl AssignmentStore for InMemoryAssignmentStore {
    fn create(&self, new: NewAssignment) -> RotaResult<Assignment> {
        let assignment = Assignment {
            id: Uuid::new_v4(),
            reference_type: new.reference_type,
            reference_name: new.reference_name,
            assigned_to: new.assigned_to,
            description: new.description,
            status: AssignmentStatus::Open,
            originating_rule: new.originating_rule,
            created_at: Utc::now(),
        };
        let seq = self.sequence.fetch_add(1, Ordering::Relaxed);
        self.assignments.insert(assignment.id, (seq, assignment.clone()));
        Ok(assignment)
    }

    fn clear(&self, reference_type: &str, reference_name: &str) -> RotaResult<usize> {
        let mut cleared = 0;
        for mut entry in self.assignments.iter_mut() {
            let (_, a) = entry.value_mut();
            if a.is_open() && a.reference_type == reference_type && a.reference_name == reference_name {
                a.status = AssignmentStatus::Cancelled;
                cleared += 1;
            }
        }
        Ok(cleared)
    }

    fn list_open(&self, reference_type: &str, reference_name: &str, limit: usize) -> RotaResult<Vec<Assignment>> {
        let mut open: Vec<Assignment> = self
            .history(reference_type, reference_name)
            .into_iter()
            .filter(Assignment::is_open)
            .collect();
        open.reverse();
        open.truncate(limit);
        Ok(open)
    }

    fn open_count(&self, user: &str, reference_type: &str) -> RotaResult<usize> {
        Ok(self
            .assignments
            .iter()
            .filter(|entry| {
                let (_, a) = entry.value();
                a.is_open() && a.assigned_to == user && a.reference_type == reference_type
            })
            .count())
    }
}

/// Cache store on a plain concurrent map, without expiry
#[derive(Debug, Default)]
pub struct InMemoryCacheStore {
    entries: DashMap<String, String>,
}

impl InMemoryCacheStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.entries.contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl CacheStore for InMemoryCacheStore {
    fn get(&self, key: &str) -> RotaResult<Option<String>> {
        Ok(self.entries.get(key).map(|entry| entry.value().clone()))
    }

    fn set(&self, key: &str, value: String) -> RotaResult<()> {
        self.entries.insert(key.to_string(), value);
        Ok(())
    }

    fn delete(&self, key: &str) -> RotaResult<()> {
        self.entries.remove(key);
        Ok(())
    }
}

/// Notifier that records messages, for tests and batch callers
#[derive(Debug, Default)]
pub struct CollectingNotifier {
    messages: Mutex<Vec<String>>,
}

impl CollectingNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    /// Messages received so far
    pub fn messages(&self) -> Vec<String> {
        self.messages.lock().map(|messages| messages.clone()).unwrap_or_default()
    }
}

impl Notifier for CollectingNotifier {
    fn warn(&self, message: &str) {
        if let Ok(mut messages) = self.messages.lock() {
            messages.push(message.to_string());
        }
    }
}

/// Notifier that only writes to the log
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingNotifier;

impl Notifier for TracingNotifier {
    fn warn(&self, message: &str) {
        warn!(target: "rota::notify", "{}", message);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn new_assignment(user: &str, name: &str) -> NewAssignment {
        NewAssignment {
            reference_type: "Issue".to_string(),
            reference_name: name.to_string(),
            assigned_to: user.to_string(),
            description: String::new(),
            originating_rule: Some("Support".to_string()),
        }
    }

    #[test]
    fn test_query_on_missing_table_is_unavailable() {
        let store = InMemoryDocumentStore::new();
        let result = store.query("Assignment Rule", &Filters::new(), None, None);
        assert!(matches!(result, Err(RotaError::StoreUnavailable { .. })));
    }

    #[test]
    fn test_query_sort_is_stable() {
        let store = InMemoryDocumentStore::new();
        for (name, priority) in [("first", 1_i64), ("second", 5), ("third", 1)] {
            store
                .insert_document(Document::new("Assignment Rule", name).with_field("priority", priority))
                .unwrap();
        }
        let rows = store
            .query("Assignment Rule", &Filters::new(), Some(&OrderBy::desc("priority")), None)
            .unwrap();
        let names: Vec<_> = rows.iter().map(|d| d.name.as_str()).collect();
        assert_eq!(names, vec!["second", "first", "third"]);
    }

    #[test]
    fn test_rename_and_delete() {
        let store = InMemoryDocumentStore::new();
        store.insert_document(Document::new("Issue", "ISS-1")).unwrap();
        store.rename_document("Issue", "ISS-1", "ISS-9").unwrap();
        assert!(store.get_document("Issue", "ISS-1").is_err());
        store.delete_document("Issue", "ISS-9").unwrap();
        assert!(store.is_empty("Issue"));
    }

    #[test]
    fn test_list_open_is_most_recent_first_and_limited() {
        let store = InMemoryAssignmentStore::new();
        for user in ["a", "b", "c"] {
            store.create(new_assignment(user, "ISS-1")).unwrap();
        }
        let open = store.list_open("Issue", "ISS-1", 2).unwrap();
        let users: Vec<_> = open.iter().map(|a| a.assigned_to.as_str()).collect();
        assert_eq!(users, vec!["c", "b"]);
    }

    #[test]
    fn test_clear_cancels_only_open_assignments_of_the_document() {
        let store = InMemoryAssignmentStore::new();
        let done = store.create(new_assignment("a", "ISS-1")).unwrap();
        store.close(done.id).unwrap();
        store.create(new_assignment("b", "ISS-1")).unwrap();
        store.create(new_assignment("c", "ISS-2")).unwrap();

        assert_eq!(store.clear("Issue", "ISS-1").unwrap(), 1);
        assert!(store.list_open("Issue", "ISS-1", 5).unwrap().is_empty());
        assert_eq!(store.list_open("Issue", "ISS-2", 5).unwrap().len(), 1);

        let statuses: Vec<_> = store.history("Issue", "ISS-1").iter().map(|a| a.status).collect();
        assert_eq!(statuses, vec![AssignmentStatus::Closed, AssignmentStatus::Cancelled]);
    }

    #[test]
    fn test_collecting_notifier() {
        let notifier = CollectingNotifier::new();
        notifier.warn("Auto assignment failed: boom");
        assert_eq!(notifier.messages(), vec!["Auto assignment failed: boom".to_string()]);
    }
}

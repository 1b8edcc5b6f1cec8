use crate::types::FieldValue;
use anyhow::{Result, anyhow};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Snapshot of a single document (record) of some document type
///
/// `doctype` and `name` identify the record; every other column lives in `fields`.
/// Lookups of the `doctype` and `name` keys resolve to the identity columns so that
/// expressions and templates can reference them like ordinary fields.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Document {
    /// Document type (schema) of this record, e.g. `"Issue"`
    pub doctype: String,
    /// Unique name of the record within its document type
    pub name: String,
    /// Field values by field name
    #[serde(default)]
    pub fields: HashMap<String, FieldValue>,
}

impl Document {
    /// Create an empty document
    pub fn new(doctype: impl Into<String>, name: impl Into<String>) -> Self {
        Self { doctype: doctype.into(), name: name.into(), fields: HashMap::new() }
    }

    /// Builder-style field setter
    #[must_use]
    pub fn with_field(mut self, field: &str, value: impl Into<FieldValue>) -> Self {
        self.set(field, value);
        self
    }

    /// Set a field value, replacing any previous value
    pub fn set(&mut self, field: &str, value: impl Into<FieldValue>) {
        match field {
            "doctype" => self.doctype = value.into().as_string(),
            "name" => self.name = value.into().as_string(),
            _ => {
                self.fields.insert(field.to_string(), value.into());
            }
        }
    }

    /// Get a field value, resolving the identity columns
    #[must_use]
    pub fn get(&self, field: &str) -> Option<FieldValue> {
        match field {
            "doctype" => Some(FieldValue::String(self.doctype.clone())),
            "name" => Some(FieldValue::String(self.name.clone())),
            _ => self.fields.get(field).cloned(),
        }
    }

    /// Borrow a string field
    #[must_use]
    pub fn get_str(&self, field: &str) -> Option<&str> {
        match field {
            "doctype" => Some(&self.doctype),
            "name" => Some(&self.name),
            _ => self.fields.get(field).and_then(FieldValue::as_str),
        }
    }

    /// Check whether the document carries a field (identity columns always exist)
    #[must_use]
    pub fn has_field(&self, field: &str) -> bool {
        matches!(field, "doctype" | "name") || self.fields.contains_key(field)
    }

    /// Flatten the document into a single object value, identity columns included
    #[must_use]
    pub fn to_object(&self) -> FieldValue {
        let mut map = self.fields.clone();
        map.insert("doctype".to_string(), FieldValue::String(self.doctype.clone()));
        map.insert("name".to_string(), FieldValue::String(self.name.clone()));
        FieldValue::Object(map)
    }

    /// Build a document from a JSON object carrying `doctype` and `name` keys
    ///
    /// # Errors
    ///
    /// Returns an error when the value is not an object or lacks the identity keys.
    pub fn from_json(value: &serde_json::Value) -> Result<Self> {
        let object = value.as_object().ok_or_else(|| anyhow!("Document must be a JSON object"))?;
        let doctype = object
            .get("doctype")
            .and_then(serde_json::Value::as_str)
            .ok_or_else(|| anyhow!("Document is missing 'doctype'"))?;
        let name = object
            .get("name")
            .and_then(serde_json::Value::as_str)
            .ok_or_else(|| anyhow!("Document is missing 'name'"))?;

        let mut document = Self::new(doctype, name);
        for (key, field) in object {
            if key != "doctype" && key != "name" {
                document.fields.insert(key.clone(), FieldValue::try_from(field)?);
            }
        }
        Ok(document)
    }

    /// Serialize into a flat JSON object
    #[must_use]
    pub fn to_json(&self) -> serde_json::Value {
        self.to_object().into()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_identity_fields_resolve() {
        let doc = Document::new("Issue", "ISS-0001").with_field("status", "Open");
        assert_eq!(doc.get("name"), Some(FieldValue::String("ISS-0001".to_string())));
        assert_eq!(doc.get_str("doctype"), Some("Issue"));
        assert_eq!(doc.get_str("status"), Some("Open"));
        assert!(doc.get("missing").is_none());
    }

    #[test]
    fn test_json_round_trip_keeps_identity() {
        let json = serde_json::json!({"doctype": "Issue", "name": "ISS-7", "priority": "High"});
        let doc = Document::from_json(&json).unwrap();
        assert_eq!(doc.name, "ISS-7");
        assert!(!doc.fields.contains_key("name"));
        assert_eq!(doc.to_json(), json);
    }

    #[test]
    fn test_from_json_requires_identity() {
        let json = serde_json::json!({"priority": "High"});
        assert!(Document::from_json(&json).is_err());
    }
}

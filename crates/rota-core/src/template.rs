//! Placeholder renderer for assignment descriptions

use crate::error::{RotaError, RotaResult};
use crate::expression::evaluator::DOCUMENT_ALIAS;
use crate::store::TemplateRenderer;
use rota_types::Document;

/// Renders `{{ field }}` and `{{ doc.field }}` placeholders
///
/// Unknown fields render as an empty string. An unterminated placeholder is an
/// error so that the caller can fall back to the raw template.
#[derive(Debug, Clone, Copy, Default)]
pub struct PlaceholderRenderer;

impl PlaceholderRenderer {
    pub fn new() -> Self {
        Self
    }

    fn lookup(key: &str, document: &Document) -> String {
        let field = key
            .strip_prefix(DOCUMENT_ALIAS)
            .and_then(|rest| rest.strip_prefix('.'))
            .unwrap_or(key);
        document.get(field).map(|value| value.as_string()).unwrap_or_default()
    }
}

impl TemplateRenderer for PlaceholderRenderer {
    fn render(&self, template: &str, document: &Document) -> RotaResult<String> {
        let mut output = String::with_capacity(template.len());
        let mut rest = template;
        let mut offset = 0;

        while let Some(start) = rest.find("{{") {
            output.push_str(&rest[..start]);
            let after = &rest[start + 2..];
            let end = after.find("}}").ok_or_else(|| {
                RotaError::template(template, format!("unterminated placeholder at byte {}", offset + start))
            })?;

            let key = after[..end].trim();
            if key.is_empty() {
                return Err(RotaError::template(template, "empty placeholder"));
            }
            output.push_str(&Self::lookup(key, document));
            offset += start + 2 + end + 2;
            rest = &after[end + 2..];
        }

        output.push_str(rest);
        Ok(output)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn issue() -> Document {
        Document::new("Issue", "ISS-3").with_field("subject", "VPN down").with_field("priority", "High")
    }

    #[test]
    fn test_render_placeholders() {
        let rendered = PlaceholderRenderer
            .render("{{ priority }}: {{doc.subject}} ({{ name }})", &issue())
            .unwrap();
        assert_eq!(rendered, "High: VPN down (ISS-3)");
    }

    #[test]
    fn test_missing_fields_render_empty() {
        let rendered = PlaceholderRenderer.render("Customer: {{ customer }}.", &issue()).unwrap();
        assert_eq!(rendered, "Customer: .");
    }

    #[test]
    fn test_unterminated_placeholder_reports_absolute_offset() {
        match PlaceholderRenderer.render("{{ name }} and {{ subject", &issue()) {
            Err(RotaError::Template { message, .. }) => assert!(message.ends_with("at byte 15"), "{message}"),
            other => panic!("Unexpected result: {other:?}"),
        }
    }

    #[test]
    fn test_plain_text_is_unchanged() {
        assert_eq!(PlaceholderRenderer.render("Please triage", &issue()).unwrap(), "Please triage");
    }

    #[test]
    fn test_unterminated_placeholder_is_an_error() {
        let result = PlaceholderRenderer.render("Hello {{ subject", &issue());
        assert!(matches!(result, Err(RotaError::Template { .. })));
    }
}

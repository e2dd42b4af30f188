pub mod cache;
pub mod registry;

pub use cache::TemplateCache;
pub use registry::TemplateRegistry;

use crate::core::{DocumentError, DocumentResult};
use crate::models::TemplateDescriptor;

/// Checks a request payload against the template's declared schema, if any.
/// The registry itself never validates; callers run this before generation.
/// Only the top-level `required` list is enforced; deeper shape problems
/// surface as render failures on the document itself.
pub fn validate_payload(
    descriptor: &TemplateDescriptor,
    data: &serde_json::Value,
) -> DocumentResult<()> {
    let Some(schema) = &descriptor.schema else {
        return Ok(());
    };

    let Some(required) = schema.get("required").and_then(|v| v.as_array()) else {
        return Ok(());
    };

    let object = data.as_object().ok_or_else(|| {
        DocumentError::Validation("payload must be a JSON object".to_string())
    })?;

    for field in required.iter().filter_map(|f| f.as_str()) {
        if !object.contains_key(field) {
            return Err(DocumentError::Validation(format!(
                "missing required field: {}",
                field
            )));
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::OutputFormat;
    use chrono::Utc;

    fn descriptor(schema: Option<serde_json::Value>) -> TemplateDescriptor {
        TemplateDescriptor {
            id: "tpl".to_string(),
            version: 1,
            name: "Test".to_string(),
            template_type: "invoice".to_string(),
            output_format: OutputFormat::Pdf,
            content: String::new(),
            schema,
            is_active: true,
            created_by: "tests".to_string(),
            created_at: Utc::now(),
        }
    }

    #[test]
    fn missing_required_field_is_rejected() {
        let descriptor = descriptor(Some(serde_json::json!({ "required": ["customer"] })));
        let err = validate_payload(&descriptor, &serde_json::json!({ "items": [] })).unwrap_err();
        assert!(matches!(err, DocumentError::Validation(_)));
    }

    #[test]
    fn no_schema_accepts_anything() {
        let descriptor = descriptor(None);
        assert!(validate_payload(&descriptor, &serde_json::json!([1, 2, 3])).is_ok());
    }
}

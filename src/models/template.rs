use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::OutputFormat;
use crate::core::DocumentError;

/// One immutable version of a rendering template. Documents pin the version
/// they were created against; only the active version serves new documents.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TemplateDescriptor {
    pub id: String,
    pub version: i64,
    pub name: String,
    pub template_type: String,
    pub output_format: OutputFormat,
    pub content: String,
    pub schema: Option<serde_json::Value>,
    pub is_active: bool,
    pub created_by: String,
    pub created_at: DateTime<Utc>,
}

/// Registration input; the registry assigns the version.
#[derive(Debug, Clone, Deserialize)]
pub struct NewTemplate {
    pub id: String,
    pub name: String,
    pub template_type: String,
    pub output_format: OutputFormat,
    pub content: String,
    pub schema: Option<serde_json::Value>,
    pub created_by: String,
}

#[derive(sqlx::FromRow)]
pub(crate) struct TemplateRow {
    pub id: String,
    pub version: i64,
    pub name: String,
    pub template_type: String,
    pub output_format: String,
    pub content: String,
    pub schema: Option<String>,
    pub is_active: i64,
    pub created_by: String,
    pub created_at: DateTime<Utc>,
}

impl TryFrom<TemplateRow> for TemplateDescriptor {
    type Error = DocumentError;

    fn try_from(row: TemplateRow) -> Result<Self, Self::Error> {
        Ok(TemplateDescriptor {
            id: row.id,
            version: row.version,
            name: row.name,
            template_type: row.template_type,
            output_format: row.output_format.parse().map_err(DocumentError::Decode)?,
            content: row.content,
            schema: row.schema.as_deref().map(serde_json::from_str).transpose()?,
            is_active: row.is_active != 0,
            created_by: row.created_by,
            created_at: row.created_at,
        })
    }
}

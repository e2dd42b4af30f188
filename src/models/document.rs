use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::{DocumentType, OutputFormat, Priority};
use crate::core::DocumentError;

/// Incoming generation request, before any state exists for it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DocumentRequest {
    #[serde(default = "Uuid::new_v4")]
    pub id: Uuid,
    pub template_id: String,
    pub document_type: DocumentType,
    pub data: serde_json::Value,
    pub priority: Priority,
    pub format: OutputFormat,
    pub callback_url: Option<String>,
    #[serde(default)]
    pub metadata: DocumentMetadata,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DocumentMetadata {
    pub user_id: i64,
    pub organization_id: String,
    pub ttl_seconds: Option<i64>,
}

impl Default for DocumentMetadata {
    fn default() -> Self {
        DocumentMetadata {
            user_id: 0,
            organization_id: String::new(),
            ttl_seconds: Some(86400), // 24 hours
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DocumentStatus {
    Pending,
    Processing,
    Completed,
    Failed,
}

impl DocumentStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, DocumentStatus::Completed | DocumentStatus::Failed)
    }
}

impl fmt::Display for DocumentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DocumentStatus::Pending => write!(f, "pending"),
            DocumentStatus::Processing => write!(f, "processing"),
            DocumentStatus::Completed => write!(f, "completed"),
            DocumentStatus::Failed => write!(f, "failed"),
        }
    }
}

impl FromStr for DocumentStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(DocumentStatus::Pending),
            "processing" => Ok(DocumentStatus::Processing),
            "completed" => Ok(DocumentStatus::Completed),
            "failed" => Ok(DocumentStatus::Failed),
            other => Err(format!("unknown document status: {}", other)),
        }
    }
}

/// Persisted document record covering the whole lifecycle.
#[derive(Debug, Clone, Serialize)]
pub struct Document {
    pub id: Uuid,
    pub status: DocumentStatus,
    pub document_type: DocumentType,
    pub template_id: String,
    pub template_version: i64,
    pub output_format: OutputFormat,
    pub priority: Priority,
    pub user_id: i64,
    pub organization_id: String,
    #[serde(skip)]
    pub payload: serde_json::Value,
    pub callback_url: Option<String>,
    pub output_location: Option<String>,
    pub error_detail: Option<String>,
    pub processing_time_ms: Option<i64>,
    pub size_bytes: Option<i64>,
    pub row_count: Option<i64>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub expires_at: Option<DateTime<Utc>>,
}

impl Document {
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expires_at.map(|at| at < now).unwrap_or(false)
    }
}

/// Raw row shape, decoded column by column into `Document`.
#[derive(sqlx::FromRow)]
pub(crate) struct DocumentRow {
    pub id: String,
    pub status: String,
    pub document_type: String,
    pub template_id: String,
    pub template_version: i64,
    pub output_format: String,
    pub priority: String,
    pub user_id: i64,
    pub organization_id: String,
    pub payload: String,
    pub callback_url: Option<String>,
    pub output_location: Option<String>,
    pub error_detail: Option<String>,
    pub processing_time_ms: Option<i64>,
    pub size_bytes: Option<i64>,
    pub row_count: Option<i64>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub expires_at: Option<DateTime<Utc>>,
}

impl TryFrom<DocumentRow> for Document {
    type Error = DocumentError;

    fn try_from(row: DocumentRow) -> Result<Self, Self::Error> {
        Ok(Document {
            id: Uuid::parse_str(&row.id).map_err(|e| DocumentError::Decode(e.to_string()))?,
            status: row.status.parse().map_err(DocumentError::Decode)?,
            document_type: row
                .document_type
                .parse()
                .unwrap_or(DocumentType::Custom(row.document_type)),
            template_id: row.template_id,
            template_version: row.template_version,
            output_format: row.output_format.parse().map_err(DocumentError::Decode)?,
            priority: row.priority.parse().map_err(DocumentError::Decode)?,
            user_id: row.user_id,
            organization_id: row.organization_id,
            payload: serde_json::from_str(&row.payload)?,
            callback_url: row.callback_url,
            output_location: row.output_location,
            error_detail: row.error_detail,
            processing_time_ms: row.processing_time_ms,
            size_bytes: row.size_bytes,
            row_count: row.row_count,
            created_at: row.created_at,
            updated_at: row.updated_at,
            expires_at: row.expires_at,
        })
    }
}

/// API-facing view of a document's current state.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DocumentResponse {
    pub id: Uuid,
    pub status: DocumentStatus,
    pub url: Option<String>,
    pub error: Option<String>,
    pub processing_time_ms: Option<i64>,
    pub created_at: DateTime<Utc>,
    pub expires_at: Option<DateTime<Utc>>,
}

impl From<&Document> for DocumentResponse {
    fn from(doc: &Document) -> Self {
        DocumentResponse {
            id: doc.id,
            status: doc.status,
            url: doc.output_location.clone(),
            error: doc.error_detail.clone(),
            processing_time_ms: doc.processing_time_ms,
            created_at: doc.created_at,
            expires_at: doc.expires_at,
        }
    }
}

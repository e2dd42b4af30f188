use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Audit event kinds. The sequence of kinds for one document always follows
/// a legal path through the lifecycle (`created` first, at most one terminal
/// kind, `expired` only after the fact).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventType {
    Created,
    ProcessingStarted,
    Completed,
    Failed,
    Expired,
}

impl fmt::Display for EventType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EventType::Created => write!(f, "created"),
            EventType::ProcessingStarted => write!(f, "processing_started"),
            EventType::Completed => write!(f, "completed"),
            EventType::Failed => write!(f, "failed"),
            EventType::Expired => write!(f, "expired"),
        }
    }
}

impl FromStr for EventType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "created" => Ok(EventType::Created),
            "processing_started" => Ok(EventType::ProcessingStarted),
            "completed" => Ok(EventType::Completed),
            "failed" => Ok(EventType::Failed),
            "expired" => Ok(EventType::Expired),
            other => Err(format!("unknown event type: {}", other)),
        }
    }
}

/// Immutable audit record; `seq` is monotonic within its document.
#[derive(Debug, Clone, Serialize)]
pub struct DocumentEvent {
    pub document_id: Uuid,
    pub seq: i64,
    pub event_type: EventType,
    pub payload: serde_json::Value,
    pub created_at: DateTime<Utc>,
}

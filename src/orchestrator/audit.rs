use chrono::{DateTime, Utc};
use sqlx::{SqliteConnection, SqlitePool};
use uuid::Uuid;

use crate::core::{DocumentError, DocumentResult};
use crate::models::{DocumentEvent, EventType};

/// Append-only event store keyed by document id. Rows are never updated or
/// deleted directly; they only disappear with their document via the
/// foreign-key cascade.
#[derive(Clone)]
pub struct AuditLog {
    pool: SqlitePool,
}

#[derive(sqlx::FromRow)]
struct EventRow {
    document_id: String,
    seq: i64,
    event_type: String,
    payload: String,
    created_at: DateTime<Utc>,
}

impl TryFrom<EventRow> for DocumentEvent {
    type Error = DocumentError;

    fn try_from(row: EventRow) -> Result<Self, Self::Error> {
        Ok(DocumentEvent {
            document_id: Uuid::parse_str(&row.document_id)
                .map_err(|e| DocumentError::Decode(e.to_string()))?,
            seq: row.seq,
            event_type: row.event_type.parse().map_err(DocumentError::Decode)?,
            payload: serde_json::from_str(&row.payload)?,
            created_at: row.created_at,
        })
    }
}

impl AuditLog {
    pub fn new(pool: SqlitePool) -> Self {
        AuditLog { pool }
    }

    pub async fn append(
        &self,
        document_id: Uuid,
        event_type: EventType,
        payload: serde_json::Value,
    ) -> DocumentResult<i64> {
        let mut conn = self.pool.acquire().await?;
        Self::append_on(&mut conn, document_id, event_type, payload).await
    }

    /// Insert variant used inside lifecycle transactions so the event commits
    /// atomically with the status change it records. The per-document `seq`
    /// is assigned in the same statement, so concurrent appends for one
    /// document cannot collide.
    pub(crate) async fn append_on(
        conn: &mut SqliteConnection,
        document_id: Uuid,
        event_type: EventType,
        payload: serde_json::Value,
    ) -> DocumentResult<i64> {
        let seq: i64 = sqlx::query_scalar(
            r#"
            INSERT INTO document_events (document_id, seq, event_type, payload, created_at)
            VALUES (
                ?1,
                (SELECT COALESCE(MAX(seq), 0) + 1 FROM document_events WHERE document_id = ?1),
                ?2, ?3, ?4
            )
            RETURNING seq
            "#,
        )
        .bind(document_id.to_string())
        .bind(event_type.to_string())
        .bind(payload.to_string())
        .bind(Utc::now())
        .fetch_one(&mut *conn)
        .await?;

        Ok(seq)
    }

    /// Events for one document ordered by `seq` ascending. Restartable:
    /// pass the last seen `seq` as `after_seq` to resume where a previous
    /// read stopped.
    pub async fn list(
        &self,
        document_id: Uuid,
        after_seq: i64,
        limit: i64,
    ) -> DocumentResult<Vec<DocumentEvent>> {
        let rows: Vec<EventRow> = sqlx::query_as(
            r#"
            SELECT document_id, seq, event_type, payload, created_at
            FROM document_events
            WHERE document_id = ? AND seq > ?
            ORDER BY seq ASC
            LIMIT ?
            "#,
        )
        .bind(document_id.to_string())
        .bind(after_seq)
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(DocumentEvent::try_from).collect()
    }

    pub async fn count(&self, document_id: Uuid) -> DocumentResult<i64> {
        let count: i64 =
            sqlx::query_scalar("SELECT COUNT(*) FROM document_events WHERE document_id = ?")
                .bind(document_id.to_string())
                .fetch_one(&self.pool)
                .await?;

        Ok(count)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db;

    async fn setup() -> (SqlitePool, Uuid) {
        let pool = db::connect_memory().await.unwrap();
        let id = Uuid::new_v4();
        // Events need an owning document for the foreign key.
        sqlx::query(
            r#"
            INSERT INTO documents (id, status, document_type, template_id, template_version,
                output_format, priority, user_id, organization_id, payload, created_at, updated_at)
            VALUES (?, 'pending', 'invoice', 'tpl', 1, 'pdf', 'normal', 1, 'org-1', '{}', ?, ?)
            "#,
        )
        .bind(id.to_string())
        .bind(Utc::now())
        .bind(Utc::now())
        .execute(&pool)
        .await
        .unwrap();
        (pool, id)
    }

    #[tokio::test]
    async fn sequences_are_monotonic_per_document() {
        let (pool, id) = setup().await;
        let audit = AuditLog::new(pool);

        let first = audit
            .append(id, EventType::Created, serde_json::json!({}))
            .await
            .unwrap();
        let second = audit
            .append(id, EventType::ProcessingStarted, serde_json::json!({}))
            .await
            .unwrap();

        assert_eq!(first, 1);
        assert_eq!(second, 2);
    }

    #[tokio::test]
    async fn list_is_ordered_and_restartable() {
        let (pool, id) = setup().await;
        let audit = AuditLog::new(pool);

        for event_type in [
            EventType::Created,
            EventType::ProcessingStarted,
            EventType::Completed,
        ] {
            audit.append(id, event_type, serde_json::json!({})).await.unwrap();
        }

        let head = audit.list(id, 0, 2).await.unwrap();
        assert_eq!(head.len(), 2);
        assert_eq!(head[0].event_type, EventType::Created);
        assert_eq!(head[1].event_type, EventType::ProcessingStarted);

        // Resume from the last seen seq.
        let tail = audit.list(id, head[1].seq, 10).await.unwrap();
        assert_eq!(tail.len(), 1);
        assert_eq!(tail[0].event_type, EventType::Completed);

        assert_eq!(audit.count(id).await.unwrap(), 3);
    }
}

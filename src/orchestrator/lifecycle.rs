use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use serde_json::json;
use sqlx::SqlitePool;
use uuid::Uuid;

use super::audit::AuditLog;
use super::usage::{TerminalOutcome, UsageAggregator};
use crate::core::{DocumentError, DocumentResult};
use crate::models::{
    Document, DocumentRequest, DocumentRow, DocumentStatus, EventType,
};
use crate::templates::{validate_payload, TemplateRegistry};

const DOCUMENT_COLUMNS: &str = "id, status, document_type, template_id, template_version, \
     output_format, priority, user_id, organization_id, payload, callback_url, \
     output_location, error_detail, processing_time_ms, size_bytes, row_count, \
     created_at, updated_at, expires_at";

/// Owns a document's status and enforces the legal transitions:
/// pending -> processing -> completed | failed, plus pending -> failed for
/// admission-time failures. Every transition is a conditional update guarded
/// by the expected current status, so concurrent callers for the same id
/// serialize at the storage layer and exactly one wins. Audit events and
/// usage rollups are written in the winner's transaction, which is what
/// keeps them exactly-once under at-least-once queue delivery.
pub struct DocumentLifecycle {
    pool: SqlitePool,
    registry: Arc<TemplateRegistry>,
}

impl DocumentLifecycle {
    pub fn new(pool: SqlitePool, registry: Arc<TemplateRegistry>) -> Self {
        DocumentLifecycle { pool, registry }
    }

    /// Creates the document in `pending` and emits the `created` event.
    /// Rejected with ValidationError before any state exists if the template
    /// does not resolve, the formats disagree, or required fields are
    /// missing.
    pub async fn create(&self, request: &DocumentRequest) -> DocumentResult<Document> {
        if request.metadata.organization_id.is_empty() {
            return Err(DocumentError::Validation(
                "organization_id is required".to_string(),
            ));
        }

        let template = self
            .registry
            .resolve(&request.template_id)
            .await
            .map_err(|e| match e {
                DocumentError::NotFound(msg) => DocumentError::Validation(msg),
                other => other,
            })?;

        if template.output_format != request.format {
            return Err(DocumentError::Validation(format!(
                "template {} renders {}, request asked for {}",
                template.id, template.output_format, request.format
            )));
        }

        validate_payload(&template, &request.data)?;

        let now = Utc::now();
        let expires_at = request
            .metadata
            .ttl_seconds
            .map(|ttl| now + Duration::seconds(ttl));

        let document = Document {
            id: request.id,
            status: DocumentStatus::Pending,
            document_type: request.document_type.clone(),
            template_id: template.id.clone(),
            template_version: template.version,
            output_format: request.format.clone(),
            priority: request.priority.clone(),
            user_id: request.metadata.user_id,
            organization_id: request.metadata.organization_id.clone(),
            payload: request.data.clone(),
            callback_url: request.callback_url.clone(),
            output_location: None,
            error_detail: None,
            processing_time_ms: None,
            size_bytes: None,
            row_count: None,
            created_at: now,
            updated_at: now,
            expires_at,
        };

        let mut tx = self.pool.begin().await?;

        sqlx::query(
            r#"
            INSERT INTO documents
                (id, status, document_type, template_id, template_version, output_format,
                 priority, user_id, organization_id, payload, callback_url,
                 created_at, updated_at, expires_at)
            VALUES (?, 'pending', ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(document.id.to_string())
        .bind(document.document_type.to_string())
        .bind(&document.template_id)
        .bind(document.template_version)
        .bind(document.output_format.to_string())
        .bind(document.priority.to_string())
        .bind(document.user_id)
        .bind(&document.organization_id)
        .bind(document.payload.to_string())
        .bind(&document.callback_url)
        .bind(document.created_at)
        .bind(document.updated_at)
        .bind(document.expires_at)
        .execute(&mut *tx)
        .await?;

        AuditLog::append_on(
            &mut tx,
            document.id,
            EventType::Created,
            json!({
                "template_id": document.template_id,
                "template_version": document.template_version,
                "document_type": document.document_type.to_string(),
                "output_format": document.output_format.to_string(),
                "priority": document.priority.to_string(),
            }),
        )
        .await?;

        tx.commit().await?;

        Ok(document)
    }

    /// pending -> processing. Exactly one caller wins under concurrent
    /// dispatch; losers see InvalidTransition, which duplicate queue
    /// deliveries treat as a benign signal.
    pub async fn start_processing(&self, document_id: Uuid) -> DocumentResult<()> {
        let mut tx = self.pool.begin().await?;

        let won: Option<(String,)> = sqlx::query_as(
            r#"
            UPDATE documents SET status = 'processing', updated_at = ?
            WHERE id = ? AND status = 'pending'
            RETURNING id
            "#,
        )
        .bind(Utc::now())
        .bind(document_id.to_string())
        .fetch_optional(&mut *tx)
        .await?;

        match won {
            Some(_) => {
                AuditLog::append_on(&mut tx, document_id, EventType::ProcessingStarted, json!({}))
                    .await?;
                tx.commit().await?;
                Ok(())
            }
            None => {
                tx.rollback().await?;
                let document = self.get_document(document_id).await?;
                Err(DocumentError::InvalidTransition(format!(
                    "document {} is {}, cannot start processing",
                    document_id, document.status
                )))
            }
        }
    }

    /// processing -> completed. Emits the `completed` event and the usage
    /// rollup increment in the same transaction as the status flip. A repeat
    /// call with the identical outcome no-ops; a conflicting terminal call
    /// is rejected as InvalidTransition for the caller to investigate.
    pub async fn complete(
        &self,
        document_id: Uuid,
        output_location: &str,
        size_bytes: i64,
        duration_ms: i64,
        row_count: Option<i64>,
    ) -> DocumentResult<()> {
        let now = Utc::now();
        let mut tx = self.pool.begin().await?;

        let won: Option<(String, String, String)> = sqlx::query_as(
            r#"
            UPDATE documents
            SET status = 'completed', output_location = ?, size_bytes = ?,
                processing_time_ms = ?, row_count = ?, updated_at = ?
            WHERE id = ? AND status = 'processing'
            RETURNING organization_id, document_type, output_format
            "#,
        )
        .bind(output_location)
        .bind(size_bytes)
        .bind(duration_ms)
        .bind(row_count)
        .bind(now)
        .bind(document_id.to_string())
        .fetch_optional(&mut *tx)
        .await?;

        match won {
            Some((organization_id, document_type, output_format)) => {
                AuditLog::append_on(
                    &mut tx,
                    document_id,
                    EventType::Completed,
                    json!({
                        "output_location": output_location,
                        "size_bytes": size_bytes,
                        "processing_time_ms": duration_ms,
                        "row_count": row_count,
                    }),
                )
                .await?;

                UsageAggregator::record_terminal_on(
                    &mut tx,
                    &organization_id,
                    now.date_naive(),
                    &document_type,
                    &output_format,
                    TerminalOutcome::Completed,
                    duration_ms,
                    size_bytes,
                )
                .await?;

                tx.commit().await?;
                Ok(())
            }
            None => {
                tx.rollback().await?;
                let document = self.get_document(document_id).await?;

                let identical = document.status == DocumentStatus::Completed
                    && document.output_location.as_deref() == Some(output_location)
                    && document.size_bytes == Some(size_bytes)
                    && document.processing_time_ms == Some(duration_ms)
                    && document.row_count == row_count;

                if identical {
                    // Duplicate delivery of the same outcome.
                    Ok(())
                } else {
                    Err(DocumentError::InvalidTransition(format!(
                        "document {} is {}, cannot complete",
                        document_id, document.status
                    )))
                }
            }
        }
    }

    /// processing -> failed, or pending -> failed when admission-time
    /// validation never let processing begin. Same idempotence rules as
    /// `complete`; failures add to `failed_count` but not to the running
    /// duration/size totals.
    pub async fn fail(
        &self,
        document_id: Uuid,
        error_detail: &str,
        duration_ms: i64,
    ) -> DocumentResult<()> {
        let now = Utc::now();
        let mut tx = self.pool.begin().await?;

        let won: Option<(String, String, String)> = sqlx::query_as(
            r#"
            UPDATE documents
            SET status = 'failed', error_detail = ?, processing_time_ms = ?, updated_at = ?
            WHERE id = ? AND status IN ('pending', 'processing')
            RETURNING organization_id, document_type, output_format
            "#,
        )
        .bind(error_detail)
        .bind(duration_ms)
        .bind(now)
        .bind(document_id.to_string())
        .fetch_optional(&mut *tx)
        .await?;

        match won {
            Some((organization_id, document_type, output_format)) => {
                AuditLog::append_on(
                    &mut tx,
                    document_id,
                    EventType::Failed,
                    json!({
                        "error": error_detail,
                        "processing_time_ms": duration_ms,
                    }),
                )
                .await?;

                UsageAggregator::record_terminal_on(
                    &mut tx,
                    &organization_id,
                    now.date_naive(),
                    &document_type,
                    &output_format,
                    TerminalOutcome::Failed,
                    duration_ms,
                    0,
                )
                .await?;

                tx.commit().await?;
                Ok(())
            }
            None => {
                tx.rollback().await?;
                let document = self.get_document(document_id).await?;

                let identical = document.status == DocumentStatus::Failed
                    && document.error_detail.as_deref() == Some(error_detail)
                    && document.processing_time_ms == Some(duration_ms);

                if identical {
                    Ok(())
                } else {
                    Err(DocumentError::InvalidTransition(format!(
                        "document {} is {}, cannot fail",
                        document_id, document.status
                    )))
                }
            }
        }
    }

    /// Housekeeping for documents whose `expires_at` has passed: records an
    /// `expired` audit event without touching the status. Downloads check
    /// `expires_at` themselves; this exists so the trail shows when the
    /// output stopped being retrievable. Safe to call repeatedly.
    pub async fn expire(&self, document_id: Uuid, now: DateTime<Utc>) -> DocumentResult<()> {
        let document = self.get_document(document_id).await?;

        if !document.is_expired(now) {
            return Err(DocumentError::InvalidTransition(format!(
                "document {} has not passed its expiry",
                document_id
            )));
        }

        let already: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM document_events WHERE document_id = ? AND event_type = 'expired'",
        )
        .bind(document_id.to_string())
        .fetch_one(&self.pool)
        .await?;

        if already > 0 {
            return Ok(());
        }

        let mut conn = self.pool.acquire().await?;
        AuditLog::append_on(
            &mut conn,
            document_id,
            EventType::Expired,
            json!({ "expires_at": document.expires_at }),
        )
        .await?;

        Ok(())
    }

    pub async fn get_document(&self, document_id: Uuid) -> DocumentResult<Document> {
        let row: Option<DocumentRow> = sqlx::query_as(&format!(
            "SELECT {} FROM documents WHERE id = ?",
            DOCUMENT_COLUMNS
        ))
        .bind(document_id.to_string())
        .fetch_optional(&self.pool)
        .await?;

        row.map(Document::try_from)
            .transpose()?
            .ok_or_else(|| DocumentError::NotFound(format!("document {}", document_id)))
    }

    /// Operator-driven cleanup: fails documents stuck in `processing` past
    /// the staleness window. There is no in-flight cancellation; a worker
    /// that eventually finishes loses the terminal race and logs the
    /// InvalidTransition as a duplicate.
    pub async fn fail_stale(
        &self,
        now: DateTime<Utc>,
        stale_after_minutes: i64,
    ) -> DocumentResult<Vec<Uuid>> {
        let cutoff = now - Duration::minutes(stale_after_minutes);

        let rows: Vec<(String, DateTime<Utc>)> = sqlx::query_as(
            "SELECT id, created_at FROM documents WHERE status = 'processing' AND updated_at < ?",
        )
        .bind(cutoff)
        .fetch_all(&self.pool)
        .await?;

        let mut failed = Vec::new();
        for (id, created_at) in rows {
            let id = Uuid::parse_str(&id).map_err(|e| DocumentError::Decode(e.to_string()))?;
            let elapsed_ms = (now - created_at).num_milliseconds();

            match self.fail(id, "processing timed out", elapsed_ms).await {
                Ok(()) => failed.push(id),
                // Raced with a worker reaching a terminal state first.
                Err(DocumentError::InvalidTransition(_)) => {}
                Err(e) => return Err(e),
            }
        }

        Ok(failed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db;
    use crate::models::{DocumentMetadata, DocumentType, NewTemplate, OutputFormat, Priority};

    async fn lifecycle_with_template() -> (DocumentLifecycle, UsageAggregator, AuditLog) {
        let pool = db::connect_memory().await.unwrap();
        let registry = Arc::new(TemplateRegistry::new(pool.clone(), None, 3600).await.unwrap());
        registry
            .register(NewTemplate {
                id: "invoice_v2".to_string(),
                name: "Invoice".to_string(),
                template_type: "invoice".to_string(),
                output_format: OutputFormat::Pdf,
                content: "#let doc = invoice".to_string(),
                schema: Some(serde_json::json!({ "required": ["customer"] })),
                created_by: "tests".to_string(),
            })
            .await
            .unwrap();

        (
            DocumentLifecycle::new(pool.clone(), registry),
            UsageAggregator::new(pool.clone()),
            AuditLog::new(pool),
        )
    }

    fn request() -> DocumentRequest {
        DocumentRequest {
            id: Uuid::new_v4(),
            template_id: "invoice_v2".to_string(),
            document_type: DocumentType::Invoice,
            data: serde_json::json!({ "customer": "ACME" }),
            priority: Priority::Normal,
            format: OutputFormat::Pdf,
            callback_url: None,
            metadata: DocumentMetadata {
                user_id: 7,
                organization_id: "org-1".to_string(),
                ttl_seconds: Some(86400),
            },
        }
    }

    #[tokio::test]
    async fn create_starts_pending_with_created_event() {
        let (lifecycle, _, audit) = lifecycle_with_template().await;

        let document = lifecycle.create(&request()).await.unwrap();
        assert_eq!(document.status, DocumentStatus::Pending);
        assert_eq!(document.template_version, 1);

        let events = audit.list(document.id, 0, 10).await.unwrap();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].event_type, EventType::Created);
    }

    #[tokio::test]
    async fn create_rejects_unknown_template_and_missing_fields() {
        let (lifecycle, _, _) = lifecycle_with_template().await;

        let mut bad_template = request();
        bad_template.template_id = "nope".to_string();
        assert!(matches!(
            lifecycle.create(&bad_template).await.unwrap_err(),
            DocumentError::Validation(_)
        ));

        let mut missing_field = request();
        missing_field.data = serde_json::json!({});
        assert!(matches!(
            lifecycle.create(&missing_field).await.unwrap_err(),
            DocumentError::Validation(_)
        ));
    }

    #[tokio::test]
    async fn happy_path_completes_once() {
        let (lifecycle, usage, audit) = lifecycle_with_template().await;
        let document = lifecycle.create(&request()).await.unwrap();

        lifecycle.start_processing(document.id).await.unwrap();
        lifecycle
            .complete(document.id, "invoices/org-1/out.pdf", 204800, 150, None)
            .await
            .unwrap();

        let stored = lifecycle.get_document(document.id).await.unwrap();
        assert_eq!(stored.status, DocumentStatus::Completed);
        assert_eq!(stored.output_location.as_deref(), Some("invoices/org-1/out.pdf"));
        assert!(stored.updated_at >= stored.created_at);

        let rollup = usage
            .get("org-1", Utc::now().date_naive(), "invoice", "pdf")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(rollup.count, 1);
        assert_eq!(rollup.failed_count, 0);

        let kinds: Vec<EventType> = audit
            .list(document.id, 0, 10)
            .await
            .unwrap()
            .iter()
            .map(|e| e.event_type)
            .collect();
        assert_eq!(
            kinds,
            vec![EventType::Created, EventType::ProcessingStarted, EventType::Completed]
        );
    }

    #[tokio::test]
    async fn duplicate_start_processing_is_invalid_transition() {
        let (lifecycle, _, _) = lifecycle_with_template().await;
        let document = lifecycle.create(&request()).await.unwrap();

        lifecycle.start_processing(document.id).await.unwrap();
        let err = lifecycle.start_processing(document.id).await.unwrap_err();
        assert!(matches!(err, DocumentError::InvalidTransition(_)));

        let stored = lifecycle.get_document(document.id).await.unwrap();
        assert_eq!(stored.status, DocumentStatus::Processing);
    }

    #[tokio::test]
    async fn identical_complete_is_a_noop_and_counts_once() {
        let (lifecycle, usage, _) = lifecycle_with_template().await;
        let document = lifecycle.create(&request()).await.unwrap();
        lifecycle.start_processing(document.id).await.unwrap();

        lifecycle
            .complete(document.id, "out.pdf", 1024, 50, Some(10))
            .await
            .unwrap();
        // At-least-once delivery replays the same outcome.
        lifecycle
            .complete(document.id, "out.pdf", 1024, 50, Some(10))
            .await
            .unwrap();

        let rollup = usage
            .get("org-1", Utc::now().date_naive(), "invoice", "pdf")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(rollup.count, 1);
    }

    #[tokio::test]
    async fn conflicting_terminal_call_is_rejected() {
        let (lifecycle, usage, _) = lifecycle_with_template().await;
        let document = lifecycle.create(&request()).await.unwrap();
        lifecycle.start_processing(document.id).await.unwrap();

        lifecycle
            .complete(document.id, "out.pdf", 204800, 150, None)
            .await
            .unwrap();

        let err = lifecycle.fail(document.id, "boom", 10).await.unwrap_err();
        assert!(matches!(err, DocumentError::InvalidTransition(_)));

        let stored = lifecycle.get_document(document.id).await.unwrap();
        assert_eq!(stored.status, DocumentStatus::Completed);

        let rollup = usage
            .get("org-1", Utc::now().date_naive(), "invoice", "pdf")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(rollup.count, 1);
        assert_eq!(rollup.failed_count, 0);
    }

    #[tokio::test]
    async fn pending_documents_can_fail_directly() {
        let (lifecycle, usage, _) = lifecycle_with_template().await;
        let document = lifecycle.create(&request()).await.unwrap();

        lifecycle
            .fail(document.id, "upstream data reference was invalid", 0)
            .await
            .unwrap();

        let stored = lifecycle.get_document(document.id).await.unwrap();
        assert_eq!(stored.status, DocumentStatus::Failed);
        assert!(stored.error_detail.is_some());
        assert!(stored.output_location.is_none());

        let rollup = usage
            .get("org-1", Utc::now().date_naive(), "invoice", "pdf")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(rollup.count, 1);
        assert_eq!(rollup.failed_count, 1);
        assert_eq!(rollup.total_size_bytes, 0);
    }

    #[tokio::test]
    async fn expire_records_one_event_without_changing_status() {
        let (lifecycle, _, audit) = lifecycle_with_template().await;
        let mut req = request();
        req.metadata.ttl_seconds = Some(60);
        let document = lifecycle.create(&req).await.unwrap();

        let later = Utc::now() + Duration::seconds(120);
        lifecycle.expire(document.id, later).await.unwrap();
        lifecycle.expire(document.id, later).await.unwrap();

        let stored = lifecycle.get_document(document.id).await.unwrap();
        assert_eq!(stored.status, DocumentStatus::Pending);

        let expired: Vec<_> = audit
            .list(document.id, 0, 10)
            .await
            .unwrap()
            .into_iter()
            .filter(|e| e.event_type == EventType::Expired)
            .collect();
        assert_eq!(expired.len(), 1);

        // Not yet expired documents are rejected.
        let err = lifecycle.expire(document.id, Utc::now()).await.unwrap_err();
        assert!(matches!(err, DocumentError::InvalidTransition(_)));
    }

    #[tokio::test]
    async fn stale_processing_documents_get_failed() {
        let (lifecycle, _, _) = lifecycle_with_template().await;
        let document = lifecycle.create(&request()).await.unwrap();
        lifecycle.start_processing(document.id).await.unwrap();

        let far_future = Utc::now() + Duration::minutes(90);
        let failed = lifecycle.fail_stale(far_future, 30).await.unwrap();
        assert_eq!(failed, vec![document.id]);

        let stored = lifecycle.get_document(document.id).await.unwrap();
        assert_eq!(stored.status, DocumentStatus::Failed);
        assert_eq!(stored.error_detail.as_deref(), Some("processing timed out"));
    }
}

use std::sync::Arc;
use std::time::Instant;

use crate::core::{metrics, DocumentError, DocumentResult};
use crate::models::Document;
use crate::orchestrator::DocumentLifecycle;
use crate::render::RenderDispatch;
use crate::storage::S3Client;
use crate::templates::TemplateRegistry;
use uuid::Uuid;

/// Drives one document from `pending` to a terminal state: render against
/// the pinned template version, store the artifact, record the outcome.
/// Shared by the sync request path and the queue worker, so both sides get
/// identical transition and error behavior.
pub struct DocumentProcessor {
    lifecycle: Arc<DocumentLifecycle>,
    registry: Arc<TemplateRegistry>,
    render: Arc<RenderDispatch>,
    s3_client: Arc<S3Client>,
    bucket: String,
}

impl DocumentProcessor {
    pub fn new(
        lifecycle: Arc<DocumentLifecycle>,
        registry: Arc<TemplateRegistry>,
        render: Arc<RenderDispatch>,
        s3_client: Arc<S3Client>,
        bucket: String,
    ) -> Self {
        DocumentProcessor {
            lifecycle,
            registry,
            render,
            s3_client,
            bucket,
        }
    }

    /// Render and collaborator failures are captured into the document via
    /// `fail` and come back as a failed document, not as an Err; only
    /// transition conflicts and infrastructure errors propagate.
    pub async fn process(&self, document_id: Uuid) -> DocumentResult<Document> {
        self.lifecycle.start_processing(document_id).await?;

        let document = self.lifecycle.get_document(document_id).await?;
        let started = Instant::now();

        match self.generate(&document).await {
            Ok((location, size_bytes, row_count)) => {
                let duration_ms = started.elapsed().as_millis() as i64;
                self.lifecycle
                    .complete(document_id, &location, size_bytes, duration_ms, row_count)
                    .await?;
                metrics::DOCUMENTS_COMPLETED.inc();
            }
            Err(e) => {
                let duration_ms = started.elapsed().as_millis() as i64;
                tracing::error!(document_id = %document_id, error = %e, "generation failed");
                self.lifecycle
                    .fail(document_id, &e.to_string(), duration_ms)
                    .await?;
                metrics::DOCUMENTS_FAILED.inc();
            }
        }

        self.lifecycle.get_document(document_id).await
    }

    async fn generate(&self, document: &Document) -> DocumentResult<(String, i64, Option<i64>)> {
        let descriptor = self
            .registry
            .resolve_version(&document.template_id, document.template_version)
            .await?;

        let rendered = self.render.render(&descriptor, &document.payload).await?;
        let size_bytes = rendered.bytes.len() as i64;

        let key = format!(
            "{}/{}/{}.{}",
            document.document_type, document.organization_id, document.id, rendered.extension
        );

        self.s3_client
            .put_object(&self.bucket, &key, rendered.bytes, rendered.content_type)
            .await
            .map_err(|e| DocumentError::Storage(e.to_string()))?;

        // The stored location is the object key; download presigns it.
        Ok((key, size_bytes, rendered.row_count))
    }
}

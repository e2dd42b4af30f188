use actix_web::{web, HttpRequest, HttpResponse};
use chrono::Utc;
use serde::Deserialize;
use serde_json::json;
use uuid::Uuid;

use super::error::{ApiError, ApiResult};
use super::middleware::auth::extract_auth;
use super::state::ApiState;
use crate::core::{metrics, DocumentError};
use crate::models::{DocumentRequest, DocumentResponse, DocumentStatus};
use crate::orchestrator::{decide, Admission, DispatchConfig, DispatchMode};

/// Submit a generation request. Admission-rate-limited; small cheap
/// documents render inline, everything else is queued for the workers.
pub async fn generate(
    req: HttpRequest,
    mut data: web::Json<DocumentRequest>,
    state: web::Data<ApiState>,
) -> ApiResult<HttpResponse> {
    let auth = extract_auth(&req)
        .ok_or_else(|| ApiError::new("missing auth context", actix_web::http::StatusCode::UNAUTHORIZED))?;

    data.metadata.user_id = auth.user_id;
    data.metadata.organization_id = auth.organization_id;

    match state.rate_limiter.admit(auth.user_id, Utc::now()).await? {
        Admission::Allowed { .. } => {}
        Admission::Denied { retry_after_secs } => {
            metrics::RATE_LIMIT_DENIALS.inc();
            return Err(DocumentError::RateLimited { retry_after_secs }.into());
        }
    }

    let estimated_size = serde_json::to_vec(&data.data)?.len();
    let request = data.into_inner();

    let document = state.lifecycle.create(&request).await?;
    metrics::DOCUMENTS_SUBMITTED.inc();

    let dispatch_config = DispatchConfig {
        max_sync_size_bytes: state.config.max_sync_size_bytes,
    };

    match decide(
        &document.document_type,
        &document.output_format,
        estimated_size,
        &dispatch_config,
    ) {
        DispatchMode::Sync => {
            let finished = state.processor.process(document.id).await?;
            Ok(HttpResponse::Ok().json(DocumentResponse::from(&finished)))
        }
        DispatchMode::Async => {
            state.queue.enqueue(document.id, &document.priority).await?;

            Ok(HttpResponse::Accepted().json(json!({
                "id": document.id,
                "status": document.status,
                "status_url": format!("/api/v1/documents/{}/status", document.id)
            })))
        }
    }
}

pub async fn get_status(
    path: web::Path<Uuid>,
    state: web::Data<ApiState>,
) -> ApiResult<HttpResponse> {
    let document = state.lifecycle.get_document(path.into_inner()).await?;
    Ok(HttpResponse::Ok().json(DocumentResponse::from(&document)))
}

/// Redirects to a presigned URL for the stored artifact. Completed
/// documents only; expired outputs are no longer retrievable.
pub async fn download(
    path: web::Path<Uuid>,
    state: web::Data<ApiState>,
) -> ApiResult<HttpResponse> {
    let document = state.lifecycle.get_document(path.into_inner()).await?;

    if document.status != DocumentStatus::Completed {
        return Err(ApiError::bad_request("document is not ready"));
    }

    if document.is_expired(Utc::now()) {
        return Err(ApiError::gone("document output has expired"));
    }

    let key = document
        .output_location
        .ok_or_else(|| ApiError::not_found("document output location missing"))?;

    let presigned = state
        .s3_client
        .create_presigned_url(
            &state.config.s3_bucket_documents,
            &key,
            state.config.download_url_ttl_seconds,
        )
        .await?;

    Ok(HttpResponse::Found()
        .append_header(("Location", presigned))
        .finish())
}

#[derive(Deserialize)]
pub struct EventsQuery {
    #[serde(default)]
    pub after_seq: i64,
    #[serde(default = "default_event_limit")]
    pub limit: i64,
}

fn default_event_limit() -> i64 {
    100
}

pub async fn list_events(
    path: web::Path<Uuid>,
    query: web::Query<EventsQuery>,
    state: web::Data<ApiState>,
) -> ApiResult<HttpResponse> {
    let document_id = path.into_inner();

    // 404 for unknown documents rather than an empty list.
    state.lifecycle.get_document(document_id).await?;

    let events = state
        .audit
        .list(document_id, query.after_seq, query.limit)
        .await?;

    Ok(HttpResponse::Ok().json(json!({
        "document_id": document_id,
        "events": events
    })))
}

/// Operator housekeeping: fail documents stuck in processing and drop
/// rate-limit buckets past retention.
pub async fn run_housekeeping(state: web::Data<ApiState>) -> ApiResult<HttpResponse> {
    let now = Utc::now();

    let failed = state
        .lifecycle
        .fail_stale(now, state.config.processing_stale_after_minutes)
        .await?;

    let swept = state
        .rate_limiter
        .sweep_stale(now, state.config.rate_bucket_retention_minutes)
        .await?;

    Ok(HttpResponse::Ok().json(json!({
        "stale_documents_failed": failed,
        "rate_buckets_removed": swept
    })))
}

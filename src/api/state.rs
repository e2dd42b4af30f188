use std::sync::Arc;

use sqlx::SqlitePool;

use crate::core::AppConfig;
use crate::db;
use crate::orchestrator::{AuditLog, DocumentLifecycle, RateLimiter};
use crate::processor::DocumentProcessor;
use crate::queue::DocumentQueue;
use crate::render::RenderDispatch;
use crate::storage::S3Client;
use crate::templates::TemplateRegistry;

#[derive(Clone)]
pub struct ApiState {
    pub db: SqlitePool,
    pub lifecycle: Arc<DocumentLifecycle>,
    pub processor: Arc<DocumentProcessor>,
    pub registry: Arc<TemplateRegistry>,
    pub audit: AuditLog,
    pub rate_limiter: RateLimiter,
    pub queue: Arc<DocumentQueue>,
    pub s3_client: Arc<S3Client>,
    pub config: Arc<AppConfig>,
}

impl ApiState {
    pub async fn new(config: AppConfig) -> anyhow::Result<Self> {
        let db = db::connect(&config.database_url).await?;

        let s3_client = Arc::new(S3Client::new().await?);

        let registry = Arc::new(
            TemplateRegistry::new(
                db.clone(),
                config.redis_url.clone(),
                config.template_cache_ttl_seconds,
            )
            .await?,
        );

        let lifecycle = Arc::new(DocumentLifecycle::new(db.clone(), registry.clone()));

        let processor = Arc::new(DocumentProcessor::new(
            lifecycle.clone(),
            registry.clone(),
            Arc::new(RenderDispatch::new()),
            s3_client.clone(),
            config.s3_bucket_documents.clone(),
        ));

        let queue = Arc::new(DocumentQueue::new(
            &config.kafka_brokers,
            config.kafka_topic_priority.clone(),
            config.kafka_topic_bulk.clone(),
        )?);

        let rate_limiter = RateLimiter::new(db.clone(), config.rate_limit_per_minute);
        let audit = AuditLog::new(db.clone());

        Ok(ApiState {
            db,
            lifecycle,
            processor,
            registry,
            audit,
            rate_limiter,
            queue,
            s3_client,
            config: Arc::new(config),
        })
    }
}

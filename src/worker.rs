use std::env;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use chrono::Utc;
use futures::StreamExt;
use rdkafka::consumer::{CommitMode, Consumer, StreamConsumer};
use rdkafka::message::BorrowedMessage;
use rdkafka::Message;
use tracing_subscriber::EnvFilter;

use docflow::core::{AppConfig, DocumentError};
use docflow::db;
use docflow::models::Document;
use docflow::orchestrator::{DocumentLifecycle, RateLimiter};
use docflow::processor::DocumentProcessor;
use docflow::queue::{self, QueuedJob};
use docflow::render::RenderDispatch;
use docflow::storage::S3Client;
use docflow::templates::TemplateRegistry;

#[derive(Clone)]
struct WorkerConfig {
    app: AppConfig,
    kafka_group_id: String,
    worker_tasks: usize,
    housekeeping_interval_secs: u64,
}

impl WorkerConfig {
    fn from_env() -> Result<Self> {
        Ok(WorkerConfig {
            app: AppConfig::from_env()?,
            kafka_group_id: env::var("KAFKA_GROUP_ID")
                .unwrap_or_else(|_| "docflow-workers".to_string()),
            worker_tasks: env::var("WORKER_TASKS")
                .unwrap_or_else(|_| "4".to_string())
                .parse()?,
            housekeeping_interval_secs: env::var("HOUSEKEEPING_INTERVAL_SECS")
                .unwrap_or_else(|_| "300".to_string())
                .parse()?,
        })
    }
}

struct WorkerPool {
    consumer: Arc<StreamConsumer>,
    processor: Arc<DocumentProcessor>,
    http: reqwest::Client,
}

impl WorkerPool {
    async fn run(self: Arc<Self>, tasks: usize) {
        let mut handles = Vec::with_capacity(tasks);
        for worker_id in 0..tasks {
            let pool = self.clone();
            handles.push(tokio::spawn(async move {
                pool.consume_loop(worker_id).await;
            }));
        }
        for handle in handles {
            let _ = handle.await;
        }
    }

    async fn consume_loop(&self, worker_id: usize) {
        tracing::info!(worker_id, "worker task started");
        let mut stream = self.consumer.stream();

        while let Some(result) = stream.next().await {
            match result {
                Ok(msg) => {
                    if let Err(e) = self.handle_message(&msg).await {
                        tracing::error!(worker_id, error = %e, "message processing failed");
                    }
                    // Commit regardless of outcome: failures are recorded on
                    // the document itself, replaying the message cannot fix
                    // them and would only spin on a poison pill.
                    if let Err(e) = self.consumer.commit_message(&msg, CommitMode::Async) {
                        tracing::error!(worker_id, error = %e, "commit failed");
                    }
                }
                Err(e) => {
                    tracing::error!(worker_id, error = %e, "kafka receive error");
                }
            }
        }
    }

    async fn handle_message(&self, msg: &BorrowedMessage<'_>) -> Result<()> {
        let payload = msg
            .payload()
            .ok_or_else(|| anyhow::anyhow!("message without payload"))?;
        let job: QueuedJob = serde_json::from_slice(payload)?;

        tracing::info!(document_id = %job.document_id, "processing queued document");

        match self.processor.process(job.document_id).await {
            Ok(document) => {
                if let Some(url) = document.callback_url.clone() {
                    self.send_callback(&url, &document).await;
                }
                Ok(())
            }
            // Redelivery of a document another worker already took or
            // finished. Committing the offset is the right outcome.
            Err(DocumentError::InvalidTransition(reason)) => {
                tracing::debug!(
                    document_id = %job.document_id,
                    reason = %reason,
                    "duplicate delivery, skipping"
                );
                Ok(())
            }
            Err(DocumentError::NotFound(reason)) => {
                tracing::warn!(document_id = %job.document_id, reason = %reason, "unknown document in queue");
                Ok(())
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Fire-and-forget notification; the document record stays the source
    /// of truth, so a lost callback is recoverable by polling.
    async fn send_callback(&self, url: &str, document: &Document) {
        let body = serde_json::json!({
            "document_id": document.id,
            "status": document.status,
            "url": document.output_location,
            "error": document.error_detail,
            "timestamp": Utc::now(),
        });

        match self.http.post(url).json(&body).send().await {
            Ok(resp) if resp.status().is_success() => {
                tracing::info!(document_id = %document.id, url, "callback delivered");
            }
            Ok(resp) => {
                tracing::warn!(
                    document_id = %document.id,
                    url,
                    status = %resp.status(),
                    "callback rejected"
                );
            }
            Err(e) => {
                tracing::warn!(document_id = %document.id, url, error = %e, "callback failed");
            }
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenv::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let config = WorkerConfig::from_env()?;
    tracing::info!("Starting Docflow worker");

    let pool = db::connect(&config.app.database_url).await?;

    let registry = Arc::new(
        TemplateRegistry::new(
            pool.clone(),
            config.app.redis_url.clone(),
            config.app.template_cache_ttl_seconds,
        )
        .await?,
    );
    let lifecycle = Arc::new(DocumentLifecycle::new(pool.clone(), registry.clone()));
    let s3_client = Arc::new(S3Client::new().await?);

    let processor = Arc::new(DocumentProcessor::new(
        lifecycle.clone(),
        registry,
        Arc::new(RenderDispatch::new()),
        s3_client,
        config.app.s3_bucket_documents.clone(),
    ));

    let consumer = Arc::new(queue::create_consumer(
        &config.app.kafka_brokers,
        &config.kafka_group_id,
        &[
            config.app.kafka_topic_priority.as_str(),
            config.app.kafka_topic_bulk.as_str(),
        ],
    )?);

    // Periodic housekeeping: fail documents stuck in processing and drop
    // rate-limit buckets past retention.
    {
        let lifecycle = lifecycle.clone();
        let rate_limiter = RateLimiter::new(pool.clone(), config.app.rate_limit_per_minute);
        let stale_after = config.app.processing_stale_after_minutes;
        let retention = config.app.rate_bucket_retention_minutes;
        let interval_secs = config.housekeeping_interval_secs;

        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(Duration::from_secs(interval_secs));
            loop {
                ticker.tick().await;
                let now = Utc::now();
                match lifecycle.fail_stale(now, stale_after).await {
                    Ok(failed) if !failed.is_empty() => {
                        tracing::warn!(count = failed.len(), "failed stale documents");
                    }
                    Ok(_) => {}
                    Err(e) => tracing::error!(error = %e, "stale document sweep failed"),
                }
                if let Err(e) = rate_limiter.sweep_stale(now, retention).await {
                    tracing::error!(error = %e, "rate bucket sweep failed");
                }
            }
        });
    }

    let worker_pool = Arc::new(WorkerPool {
        consumer,
        processor,
        http: reqwest::Client::builder()
            .timeout(Duration::from_secs(10))
            .build()?,
    });

    tracing::info!(tasks = config.worker_tasks, "consuming document queue");
    worker_pool.run(config.worker_tasks).await;

    Ok(())
}

use std::env;

use anyhow::Result;

#[derive(Clone)]
pub struct AppConfig {
    pub database_url: String,
    pub redis_url: Option<String>,
    pub rate_limit_per_minute: u32,
    pub rate_bucket_retention_minutes: i64,
    pub max_sync_size_bytes: usize,
    pub kafka_brokers: String,
    pub kafka_topic_priority: String,
    pub kafka_topic_bulk: String,
    pub s3_bucket_documents: String,
    pub template_cache_ttl_seconds: i64,
    pub download_url_ttl_seconds: u64,
    pub processing_stale_after_minutes: i64,
}

impl Default for AppConfig {
    fn default() -> Self {
        AppConfig {
            database_url: "sqlite://docflow.db?mode=rwc".to_string(),
            redis_url: None,
            rate_limit_per_minute: 60,
            rate_bucket_retention_minutes: 1440, // 24 hours
            max_sync_size_bytes: 1_048_576,      // 1MB
            kafka_brokers: "localhost:9092".to_string(),
            kafka_topic_priority: "doc.requests.priority".to_string(),
            kafka_topic_bulk: "doc.requests.bulk".to_string(),
            s3_bucket_documents: "documents".to_string(),
            template_cache_ttl_seconds: 3600,
            download_url_ttl_seconds: 3600,
            processing_stale_after_minutes: 30,
        }
    }
}

impl AppConfig {
    pub fn from_env() -> Result<Self> {
        let defaults = AppConfig::default();

        Ok(AppConfig {
            database_url: env::var("DATABASE_URL").unwrap_or(defaults.database_url),
            redis_url: env::var("REDIS_URL").ok(),
            rate_limit_per_minute: env::var("RATE_LIMIT_PER_MINUTE")
                .unwrap_or_else(|_| "60".to_string())
                .parse()?,
            rate_bucket_retention_minutes: env::var("RATE_BUCKET_RETENTION_MINUTES")
                .unwrap_or_else(|_| "1440".to_string())
                .parse()?,
            max_sync_size_bytes: env::var("MAX_SYNC_SIZE_BYTES")
                .unwrap_or_else(|_| "1048576".to_string())
                .parse()?,
            kafka_brokers: env::var("KAFKA_BROKERS").unwrap_or(defaults.kafka_brokers),
            kafka_topic_priority: env::var("KAFKA_TOPIC_PRIORITY")
                .unwrap_or(defaults.kafka_topic_priority),
            kafka_topic_bulk: env::var("KAFKA_TOPIC_BULK").unwrap_or(defaults.kafka_topic_bulk),
            s3_bucket_documents: env::var("S3_BUCKET_DOCUMENTS")
                .unwrap_or(defaults.s3_bucket_documents),
            template_cache_ttl_seconds: env::var("TEMPLATE_CACHE_TTL_SECONDS")
                .unwrap_or_else(|_| "3600".to_string())
                .parse()?,
            download_url_ttl_seconds: env::var("DOWNLOAD_URL_TTL_SECONDS")
                .unwrap_or_else(|_| "3600".to_string())
                .parse()?,
            processing_stale_after_minutes: env::var("PROCESSING_STALE_AFTER_MINUTES")
                .unwrap_or_else(|_| "30".to_string())
                .parse()?,
        })
    }
}

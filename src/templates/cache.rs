use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use redis::AsyncCommands;
use tokio::sync::RwLock;

use crate::core::DocumentResult;
use crate::models::TemplateDescriptor;

#[derive(Clone, serde::Serialize, serde::Deserialize)]
struct CachedDescriptor {
    descriptor: TemplateDescriptor,
    cached_at: DateTime<Utc>,
    ttl_seconds: i64,
}

impl CachedDescriptor {
    fn is_expired(&self) -> bool {
        Utc::now() > self.cached_at + Duration::seconds(self.ttl_seconds)
    }
}

/// Two-level cache for resolved active template descriptors: in-process map
/// first, Redis second so instances share invalidations by expiry.
pub struct TemplateCache {
    memory: Arc<RwLock<HashMap<String, CachedDescriptor>>>,
    redis: Option<redis::aio::ConnectionManager>,
    ttl_seconds: i64,
}

impl TemplateCache {
    pub async fn new(redis_url: Option<String>, ttl_seconds: i64) -> DocumentResult<Self> {
        let redis = match redis_url {
            Some(url) => {
                let client = redis::Client::open(url)
                    .map_err(|e| crate::core::DocumentError::Storage(e.to_string()))?;
                Some(
                    redis::aio::ConnectionManager::new(client)
                        .await
                        .map_err(|e| crate::core::DocumentError::Storage(e.to_string()))?,
                )
            }
            None => None,
        };

        Ok(TemplateCache {
            memory: Arc::new(RwLock::new(HashMap::new())),
            redis,
            ttl_seconds,
        })
    }

    pub async fn get(&self, template_id: &str) -> Option<TemplateDescriptor> {
        {
            let cache = self.memory.read().await;
            if let Some(entry) = cache.get(template_id) {
                if !entry.is_expired() {
                    return Some(entry.descriptor.clone());
                }
            }
        }

        if let Some(ref redis) = self.redis {
            let mut redis = redis.clone();
            if let Ok(raw) = redis.get::<_, String>(Self::key(template_id)).await {
                if let Ok(entry) = serde_json::from_str::<CachedDescriptor>(&raw) {
                    if !entry.is_expired() {
                        self.memory
                            .write()
                            .await
                            .insert(template_id.to_string(), entry.clone());
                        return Some(entry.descriptor);
                    }
                }
            }
        }

        None
    }

    pub async fn set(&self, descriptor: TemplateDescriptor) -> DocumentResult<()> {
        let entry = CachedDescriptor {
            cached_at: Utc::now(),
            ttl_seconds: self.ttl_seconds,
            descriptor,
        };

        self.memory
            .write()
            .await
            .insert(entry.descriptor.id.clone(), entry.clone());

        if let Some(ref redis) = self.redis {
            let mut redis = redis.clone();
            let raw = serde_json::to_string(&entry)?;
            let _: () = redis
                .set_ex(Self::key(&entry.descriptor.id), raw, self.ttl_seconds as u64)
                .await
                .map_err(|e| crate::core::DocumentError::Storage(e.to_string()))?;
        }

        Ok(())
    }

    pub async fn invalidate(&self, template_id: &str) -> DocumentResult<()> {
        self.memory.write().await.remove(template_id);

        if let Some(ref redis) = self.redis {
            let mut redis = redis.clone();
            let _: () = redis
                .del(Self::key(template_id))
                .await
                .map_err(|e| crate::core::DocumentError::Storage(e.to_string()))?;
        }

        Ok(())
    }

    fn key(template_id: &str) -> String {
        format!("template:{}", template_id)
    }
}

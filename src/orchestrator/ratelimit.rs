use chrono::{DateTime, Utc};
use sqlx::SqlitePool;

use crate::core::DocumentResult;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Admission {
    Allowed { remaining: u32 },
    Denied { retry_after_secs: i64 },
}

impl Admission {
    pub fn is_allowed(&self) -> bool {
        matches!(self, Admission::Allowed { .. })
    }
}

/// Fixed-window per-user request counter, persisted so the quota holds
/// across every api instance. The increment is one round trip and happens
/// before the quota check: denied attempts are counted too, so hammering a
/// denied endpoint never resets the window.
#[derive(Clone)]
pub struct RateLimiter {
    pool: SqlitePool,
    per_minute: u32,
}

impl RateLimiter {
    pub fn new(pool: SqlitePool, per_minute: u32) -> Self {
        RateLimiter { pool, per_minute }
    }

    pub async fn admit(&self, user_id: i64, now: DateTime<Utc>) -> DocumentResult<Admission> {
        let bucket = now.timestamp().div_euclid(60);

        let count: i64 = sqlx::query_scalar(
            r#"
            INSERT INTO rate_limit_buckets (user_id, minute_bucket, request_count)
            VALUES (?, ?, 1)
            ON CONFLICT (user_id, minute_bucket)
            DO UPDATE SET request_count = request_count + 1
            RETURNING request_count
            "#,
        )
        .bind(user_id)
        .bind(bucket)
        .fetch_one(&self.pool)
        .await?;

        if count <= self.per_minute as i64 {
            Ok(Admission::Allowed {
                remaining: self.per_minute - count as u32,
            })
        } else {
            Ok(Admission::Denied {
                retry_after_secs: 60 - now.timestamp().rem_euclid(60),
            })
        }
    }

    /// Attempt count for (user, minute), including denied attempts.
    pub async fn bucket_count(&self, user_id: i64, now: DateTime<Utc>) -> DocumentResult<i64> {
        let count: Option<i64> = sqlx::query_scalar(
            "SELECT request_count FROM rate_limit_buckets WHERE user_id = ? AND minute_bucket = ?",
        )
        .bind(user_id)
        .bind(now.timestamp().div_euclid(60))
        .fetch_optional(&self.pool)
        .await?;

        Ok(count.unwrap_or(0))
    }

    /// Buckets are write-once per minute; anything older than the retention
    /// window can go without affecting limiting decisions.
    pub async fn sweep_stale(
        &self,
        now: DateTime<Utc>,
        retention_minutes: i64,
    ) -> DocumentResult<u64> {
        let cutoff = now.timestamp().div_euclid(60) - retention_minutes;

        let result = sqlx::query("DELETE FROM rate_limit_buckets WHERE minute_bucket < ?")
            .bind(cutoff)
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db;

    #[tokio::test]
    async fn quota_boundary_at_sixty_one_requests() {
        let pool = db::connect_memory().await.unwrap();
        let limiter = RateLimiter::new(pool, 60);
        let now = Utc::now();

        for i in 1..=60 {
            match limiter.admit(7, now).await.unwrap() {
                Admission::Allowed { .. } => {}
                Admission::Denied { .. } => panic!("request {} should be admitted", i),
            }
        }

        match limiter.admit(7, now).await.unwrap() {
            Admission::Denied { retry_after_secs } => assert!(retry_after_secs > 0),
            Admission::Allowed { .. } => panic!("request 61 should be denied"),
        }

        // The denied attempt is still recorded.
        assert_eq!(limiter.bucket_count(7, now).await.unwrap(), 61);
    }

    #[tokio::test]
    async fn windows_and_users_are_independent() {
        let pool = db::connect_memory().await.unwrap();
        let limiter = RateLimiter::new(pool, 1);
        let now = Utc::now();

        assert!(matches!(
            limiter.admit(1, now).await.unwrap(),
            Admission::Allowed { .. }
        ));
        assert!(matches!(
            limiter.admit(1, now).await.unwrap(),
            Admission::Denied { .. }
        ));

        // Another user in the same minute is unaffected.
        assert!(matches!(
            limiter.admit(2, now).await.unwrap(),
            Admission::Allowed { .. }
        ));

        // The same user in the next minute gets a fresh bucket.
        let next_minute = now + chrono::Duration::seconds(60);
        assert!(matches!(
            limiter.admit(1, next_minute).await.unwrap(),
            Admission::Allowed { .. }
        ));
    }

    #[tokio::test]
    async fn sweep_removes_only_stale_buckets() {
        let pool = db::connect_memory().await.unwrap();
        let limiter = RateLimiter::new(pool, 60);
        let now = Utc::now();
        let old = now - chrono::Duration::minutes(120);

        limiter.admit(1, old).await.unwrap();
        limiter.admit(1, now).await.unwrap();

        let removed = limiter.sweep_stale(now, 60).await.unwrap();
        assert_eq!(removed, 1);
        assert_eq!(limiter.bucket_count(1, now).await.unwrap(), 1);
    }
}

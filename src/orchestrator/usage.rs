use chrono::NaiveDate;
use sqlx::{SqliteConnection, SqlitePool};

use crate::core::DocumentResult;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TerminalOutcome {
    Completed,
    Failed,
}

/// Per-organization/day/type/format billing rollup.
#[derive(Debug, Clone, sqlx::FromRow, serde::Serialize)]
pub struct UsageRollup {
    pub organization_id: String,
    pub date: NaiveDate,
    pub document_type: String,
    pub output_format: String,
    pub count: i64,
    pub failed_count: i64,
    pub total_processing_time_ms: i64,
    pub total_size_bytes: i64,
}

/// Incremental usage aggregation. Only the document lifecycle calls
/// `record_terminal*`, and only from the winning side of a guarded terminal
/// transition, which is what makes the contribution exactly-once.
#[derive(Clone)]
pub struct UsageAggregator {
    pool: SqlitePool,
}

impl UsageAggregator {
    pub fn new(pool: SqlitePool) -> Self {
        UsageAggregator { pool }
    }

    pub async fn record_terminal(
        &self,
        organization_id: &str,
        date: NaiveDate,
        document_type: &str,
        output_format: &str,
        outcome: TerminalOutcome,
        duration_ms: i64,
        size_bytes: i64,
    ) -> DocumentResult<()> {
        let mut conn = self.pool.acquire().await?;
        Self::record_terminal_on(
            &mut conn,
            organization_id,
            date,
            document_type,
            output_format,
            outcome,
            duration_ms,
            size_bytes,
        )
        .await
    }

    /// Upsert-increment in a single statement: `count` always moves,
    /// `failed_count` only on failure, the running totals only on success.
    pub(crate) async fn record_terminal_on(
        conn: &mut SqliteConnection,
        organization_id: &str,
        date: NaiveDate,
        document_type: &str,
        output_format: &str,
        outcome: TerminalOutcome,
        duration_ms: i64,
        size_bytes: i64,
    ) -> DocumentResult<()> {
        let (failed, duration_ms, size_bytes) = match outcome {
            TerminalOutcome::Completed => (0_i64, duration_ms, size_bytes),
            TerminalOutcome::Failed => (1_i64, 0, 0),
        };

        sqlx::query(
            r#"
            INSERT INTO usage_rollups
                (organization_id, date, document_type, output_format,
                 count, failed_count, total_processing_time_ms, total_size_bytes)
            VALUES (?, ?, ?, ?, 1, ?, ?, ?)
            ON CONFLICT (organization_id, date, document_type, output_format)
            DO UPDATE SET
                count = count + 1,
                failed_count = failed_count + excluded.failed_count,
                total_processing_time_ms
                    = total_processing_time_ms + excluded.total_processing_time_ms,
                total_size_bytes = total_size_bytes + excluded.total_size_bytes
            "#,
        )
        .bind(organization_id)
        .bind(date)
        .bind(document_type)
        .bind(output_format)
        .bind(failed)
        .bind(duration_ms)
        .bind(size_bytes)
        .execute(&mut *conn)
        .await?;

        Ok(())
    }

    pub async fn get(
        &self,
        organization_id: &str,
        date: NaiveDate,
        document_type: &str,
        output_format: &str,
    ) -> DocumentResult<Option<UsageRollup>> {
        let rollup = sqlx::query_as(
            r#"
            SELECT organization_id, date, document_type, output_format,
                   count, failed_count, total_processing_time_ms, total_size_bytes
            FROM usage_rollups
            WHERE organization_id = ? AND date = ? AND document_type = ? AND output_format = ?
            "#,
        )
        .bind(organization_id)
        .bind(date)
        .bind(document_type)
        .bind(output_format)
        .fetch_optional(&self.pool)
        .await?;

        Ok(rollup)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db;

    #[tokio::test]
    async fn success_and_failure_update_the_right_counters() {
        let pool = db::connect_memory().await.unwrap();
        let usage = UsageAggregator::new(pool);
        let date = NaiveDate::from_ymd_opt(2026, 8, 20).unwrap();

        usage
            .record_terminal("org-1", date, "invoice", "pdf", TerminalOutcome::Completed, 150, 204800)
            .await
            .unwrap();
        usage
            .record_terminal("org-1", date, "invoice", "pdf", TerminalOutcome::Completed, 50, 1024)
            .await
            .unwrap();
        usage
            .record_terminal("org-1", date, "invoice", "pdf", TerminalOutcome::Failed, 999, 999)
            .await
            .unwrap();

        let rollup = usage.get("org-1", date, "invoice", "pdf").await.unwrap().unwrap();
        assert_eq!(rollup.count, 3);
        assert_eq!(rollup.failed_count, 1);
        // Failures contribute nothing to the running totals.
        assert_eq!(rollup.total_processing_time_ms, 200);
        assert_eq!(rollup.total_size_bytes, 205824);
    }

    #[tokio::test]
    async fn dimensions_are_independent() {
        let pool = db::connect_memory().await.unwrap();
        let usage = UsageAggregator::new(pool);
        let date = NaiveDate::from_ymd_opt(2026, 8, 20).unwrap();

        usage
            .record_terminal("org-1", date, "invoice", "pdf", TerminalOutcome::Completed, 10, 10)
            .await
            .unwrap();
        usage
            .record_terminal("org-1", date, "report", "excel", TerminalOutcome::Completed, 10, 10)
            .await
            .unwrap();

        let invoices = usage.get("org-1", date, "invoice", "pdf").await.unwrap().unwrap();
        let reports = usage.get("org-1", date, "report", "excel").await.unwrap().unwrap();
        assert_eq!(invoices.count, 1);
        assert_eq!(reports.count, 1);
        assert!(usage.get("org-2", date, "invoice", "pdf").await.unwrap().is_none());
    }
}

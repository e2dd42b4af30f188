//! End-to-end orchestration tests exercising the lifecycle, audit log and
//! usage aggregation together against one store.

use std::sync::Arc;

use chrono::Utc;
use uuid::Uuid;

use docflow::core::DocumentError;
use docflow::db;
use docflow::models::{
    DocumentMetadata, DocumentRequest, DocumentStatus, DocumentType, EventType, NewTemplate,
    OutputFormat, Priority,
};
use docflow::orchestrator::{AuditLog, DocumentLifecycle, RateLimiter, UsageAggregator};
use docflow::templates::TemplateRegistry;

struct Harness {
    lifecycle: Arc<DocumentLifecycle>,
    audit: AuditLog,
    usage: UsageAggregator,
    rate_limiter: RateLimiter,
}

async fn harness() -> Harness {
    let pool = db::connect_memory().await.unwrap();
    let registry = Arc::new(TemplateRegistry::new(pool.clone(), None, 3600).await.unwrap());

    registry
        .register(NewTemplate {
            id: "monthly_report".to_string(),
            name: "Monthly report".to_string(),
            template_type: "report".to_string(),
            output_format: OutputFormat::Excel,
            content: "{}".to_string(),
            schema: Some(serde_json::json!({ "required": ["rows"] })),
            created_by: "tests".to_string(),
        })
        .await
        .unwrap();

    Harness {
        lifecycle: Arc::new(DocumentLifecycle::new(pool.clone(), registry)),
        audit: AuditLog::new(pool.clone()),
        usage: UsageAggregator::new(pool.clone()),
        rate_limiter: RateLimiter::new(pool, 60),
    }
}

fn report_request(org: &str) -> DocumentRequest {
    DocumentRequest {
        id: Uuid::new_v4(),
        template_id: "monthly_report".to_string(),
        document_type: DocumentType::Report,
        data: serde_json::json!({ "rows": [["a", 1], ["b", 2]] }),
        priority: Priority::Normal,
        format: OutputFormat::Excel,
        callback_url: None,
        metadata: DocumentMetadata {
            user_id: 42,
            organization_id: org.to_string(),
            ttl_seconds: Some(3600),
        },
    }
}

#[tokio::test]
async fn concurrent_start_processing_has_exactly_one_winner() {
    let h = harness().await;
    let document = h.lifecycle.create(&report_request("org-a")).await.unwrap();

    let (first, second) = tokio::join!(
        h.lifecycle.start_processing(document.id),
        h.lifecycle.start_processing(document.id),
    );

    let winners = [&first, &second].iter().filter(|r| r.is_ok()).count();
    assert_eq!(winners, 1);

    let loser = if first.is_err() { first } else { second };
    assert!(matches!(
        loser.unwrap_err(),
        DocumentError::InvalidTransition(_)
    ));

    let stored = h.lifecycle.get_document(document.id).await.unwrap();
    assert_eq!(stored.status, DocumentStatus::Processing);

    // One started event, not two.
    let started = h
        .audit
        .list(document.id, 0, 50)
        .await
        .unwrap()
        .into_iter()
        .filter(|e| e.event_type == EventType::ProcessingStarted)
        .count();
    assert_eq!(started, 1);
}

#[tokio::test]
async fn completed_document_rejects_late_failure_and_counts_once() {
    let h = harness().await;
    let document = h.lifecycle.create(&report_request("org-b")).await.unwrap();

    h.lifecycle.start_processing(document.id).await.unwrap();
    h.lifecycle
        .complete(document.id, "report/org-b/out.xlsx", 204_800, 150, Some(2))
        .await
        .unwrap();

    // A crashed worker retries and reports failure for the same document.
    let err = h
        .lifecycle
        .fail(document.id, "worker crashed mid-flight", 9000)
        .await
        .unwrap_err();
    assert!(matches!(err, DocumentError::InvalidTransition(_)));

    let stored = h.lifecycle.get_document(document.id).await.unwrap();
    assert_eq!(stored.status, DocumentStatus::Completed);
    assert_eq!(stored.size_bytes, Some(204_800));
    assert_eq!(stored.processing_time_ms, Some(150));

    let rollup = h
        .usage
        .get("org-b", Utc::now().date_naive(), "report", "excel")
        .await
        .unwrap()
        .unwrap();
    assert_eq!(rollup.count, 1);
    assert_eq!(rollup.failed_count, 0);
    assert_eq!(rollup.total_processing_time_ms, 150);
    assert_eq!(rollup.total_size_bytes, 204_800);
}

#[tokio::test]
async fn audit_trail_is_ordered_and_restartable() {
    let h = harness().await;
    let document = h.lifecycle.create(&report_request("org-c")).await.unwrap();

    h.lifecycle.start_processing(document.id).await.unwrap();
    h.lifecycle
        .complete(document.id, "report/org-c/out.xlsx", 1024, 40, Some(2))
        .await
        .unwrap();

    let all = h.audit.list(document.id, 0, 50).await.unwrap();
    let seqs: Vec<i64> = all.iter().map(|e| e.seq).collect();
    assert_eq!(seqs, vec![1, 2, 3]);
    assert_eq!(
        all.iter().map(|e| e.event_type).collect::<Vec<_>>(),
        vec![
            EventType::Created,
            EventType::ProcessingStarted,
            EventType::Completed
        ]
    );

    // Page through one event at a time using the last seen seq as cursor.
    let mut cursor = 0;
    let mut paged = Vec::new();
    loop {
        let page = h.audit.list(document.id, cursor, 1).await.unwrap();
        match page.last() {
            Some(event) => {
                cursor = event.seq;
                paged.extend(page);
            }
            None => break,
        }
    }
    assert_eq!(paged.len(), all.len());
    assert_eq!(paged.iter().map(|e| e.seq).collect::<Vec<_>>(), seqs);
}

#[tokio::test]
async fn denied_requests_still_consume_rate_budget() {
    let h = harness().await;
    let now = Utc::now();

    for _ in 0..60 {
        assert!(h.rate_limiter.admit(42, now).await.unwrap().is_allowed());
    }
    // The denied attempt is counted too, so retrying inside the window
    // cannot sneak a request through.
    assert!(!h.rate_limiter.admit(42, now).await.unwrap().is_allowed());
    assert_eq!(h.rate_limiter.bucket_count(42, now).await.unwrap(), 61);

    // A different user in the same window is unaffected.
    assert!(h.rate_limiter.admit(7, now).await.unwrap().is_allowed());
}

#[tokio::test]
async fn usage_rollups_accumulate_across_documents() {
    let h = harness().await;

    for (size, duration) in [(1000_i64, 20_i64), (3000, 80)] {
        let document = h.lifecycle.create(&report_request("org-d")).await.unwrap();
        h.lifecycle.start_processing(document.id).await.unwrap();
        h.lifecycle
            .complete(document.id, "report/org-d/out.xlsx", size, duration, None)
            .await
            .unwrap();
    }

    let document = h.lifecycle.create(&report_request("org-d")).await.unwrap();
    h.lifecycle.start_processing(document.id).await.unwrap();
    h.lifecycle
        .fail(document.id, "render error", 15)
        .await
        .unwrap();

    let rollup = h
        .usage
        .get("org-d", Utc::now().date_naive(), "report", "excel")
        .await
        .unwrap()
        .unwrap();
    assert_eq!(rollup.count, 3);
    assert_eq!(rollup.failed_count, 1);
    assert_eq!(rollup.total_size_bytes, 4000);
    assert_eq!(rollup.total_processing_time_ms, 100);
}

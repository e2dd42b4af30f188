use once_cell::sync::Lazy;
use prometheus::{register_int_counter, IntCounter};

pub static DOCUMENTS_SUBMITTED: Lazy<IntCounter> = Lazy::new(|| {
    register_int_counter!("docflow_documents_submitted_total", "Documents accepted for generation")
        .expect("metric registration")
});

pub static DOCUMENTS_COMPLETED: Lazy<IntCounter> = Lazy::new(|| {
    register_int_counter!("docflow_documents_completed_total", "Documents that reached completed")
        .expect("metric registration")
});

pub static DOCUMENTS_FAILED: Lazy<IntCounter> = Lazy::new(|| {
    register_int_counter!("docflow_documents_failed_total", "Documents that reached failed")
        .expect("metric registration")
});

pub static RATE_LIMIT_DENIALS: Lazy<IntCounter> = Lazy::new(|| {
    register_int_counter!("docflow_rate_limit_denials_total", "Requests denied by the rate limiter")
        .expect("metric registration")
});

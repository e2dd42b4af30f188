use actix_cors::Cors;
use actix_web::{web, HttpResponse};

use super::middleware::auth::create_auth_middleware;
use super::{handlers, template_handler};

pub fn configure_routes(cfg: &mut web::ServiceConfig) {
    cfg
        // Health checks
        .route("/health", web::get().to(health_check))
        .route("/ready", web::get().to(readiness_check))
        .route("/metrics", web::get().to(metrics_endpoint))
        // API v1
        .service(
            web::scope("/api/v1")
                .wrap(create_auth_middleware())
                .wrap(
                    Cors::default()
                        .allowed_origin_fn(|origin, _req_head| {
                            origin.as_bytes().starts_with(b"http://localhost")
                                || origin.as_bytes().starts_with(b"https://")
                        })
                        .allowed_methods(vec!["GET", "POST", "PUT", "DELETE"])
                        .allowed_headers(vec!["Content-Type", "Authorization"])
                        .max_age(3600),
                )
                // Document lifecycle
                .service(
                    web::scope("/documents")
                        .route("/generate", web::post().to(handlers::generate))
                        .route("/{id}/status", web::get().to(handlers::get_status))
                        .route("/{id}/download", web::get().to(handlers::download))
                        .route("/{id}/events", web::get().to(handlers::list_events)),
                )
                // Template management (admin only)
                .service(
                    web::scope("/templates")
                        .route("", web::post().to(template_handler::register_template))
                        .route("", web::get().to(template_handler::list_templates))
                        .route("/{id}", web::get().to(template_handler::get_template))
                        .route("/{id}", web::delete().to(template_handler::deactivate_template)),
                )
                // Operator housekeeping
                .service(
                    web::scope("/admin")
                        .route("/housekeeping", web::post().to(handlers::run_housekeeping)),
                ),
        );
}

async fn health_check() -> HttpResponse {
    HttpResponse::Ok().json(serde_json::json!({
        "status": "healthy"
    }))
}

async fn readiness_check(state: web::Data<super::ApiState>) -> HttpResponse {
    let db_healthy = sqlx::query("SELECT 1").fetch_one(&state.db).await.is_ok();

    if db_healthy {
        HttpResponse::Ok().json(serde_json::json!({
            "status": "ready",
            "checks": { "database": "ok" }
        }))
    } else {
        HttpResponse::ServiceUnavailable().json(serde_json::json!({
            "status": "not_ready",
            "checks": { "database": "failed" }
        }))
    }
}

async fn metrics_endpoint() -> HttpResponse {
    use prometheus::{Encoder, TextEncoder};

    let encoder = TextEncoder::new();
    let metric_families = prometheus::gather();
    let mut buffer = vec![];

    encoder
        .encode(&metric_families, &mut buffer)
        .expect("Failed to encode metrics");

    HttpResponse::Ok()
        .content_type("text/plain; version=0.0.4")
        .body(buffer)
}

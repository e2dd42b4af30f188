use actix_web::{web, HttpResponse};
use serde_json::json;

use super::error::ApiResult;
use super::state::ApiState;
use crate::models::NewTemplate;

pub async fn register_template(
    data: web::Json<NewTemplate>,
    state: web::Data<ApiState>,
) -> ApiResult<HttpResponse> {
    let descriptor = state.registry.register(data.into_inner()).await?;
    Ok(HttpResponse::Created().json(descriptor))
}

pub async fn list_templates(state: web::Data<ApiState>) -> ApiResult<HttpResponse> {
    let templates = state.registry.list_active().await?;
    Ok(HttpResponse::Ok().json(json!({ "templates": templates })))
}

pub async fn get_template(
    path: web::Path<String>,
    state: web::Data<ApiState>,
) -> ApiResult<HttpResponse> {
    let descriptor = state.registry.resolve(&path.into_inner()).await?;
    Ok(HttpResponse::Ok().json(descriptor))
}

/// Templates are never deleted; this retires the active version so new
/// documents stop resolving it. Pinned documents keep rendering.
pub async fn deactivate_template(
    path: web::Path<String>,
    state: web::Data<ApiState>,
) -> ApiResult<HttpResponse> {
    let template_id = path.into_inner();
    state.registry.deactivate(&template_id).await?;

    Ok(HttpResponse::Ok().json(json!({
        "status": "deactivated",
        "template_id": template_id
    })))
}

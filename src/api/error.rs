use actix_web::{error::ResponseError, http::StatusCode, HttpResponse};
use std::fmt;

use crate::core::DocumentError;

#[derive(Debug)]
pub struct ApiError {
    message: String,
    status_code: StatusCode,
    retry_after_secs: Option<i64>,
}

impl ApiError {
    pub fn new(message: impl Into<String>, status_code: StatusCode) -> Self {
        ApiError {
            message: message.into(),
            status_code,
            retry_after_secs: None,
        }
    }

    pub fn internal_server_error(message: impl Into<String>) -> Self {
        Self::new(message, StatusCode::INTERNAL_SERVER_ERROR)
    }

    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::new(message, StatusCode::BAD_REQUEST)
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(message, StatusCode::NOT_FOUND)
    }

    pub fn gone(message: impl Into<String>) -> Self {
        Self::new(message, StatusCode::GONE)
    }
}

impl fmt::Display for ApiError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl ResponseError for ApiError {
    fn error_response(&self) -> HttpResponse {
        let mut body = serde_json::json!({
            "error": self.message,
            "status": self.status_code.as_u16()
        });

        let mut builder = HttpResponse::build(self.status_code);
        if let Some(retry_after) = self.retry_after_secs {
            body["retry_after"] = serde_json::json!(retry_after);
            builder.append_header(("Retry-After", retry_after.to_string()));
        }

        builder.json(body)
    }

    fn status_code(&self) -> StatusCode {
        self.status_code
    }
}

impl From<DocumentError> for ApiError {
    fn from(err: DocumentError) -> Self {
        match err {
            DocumentError::Validation(msg) => ApiError::bad_request(msg),
            DocumentError::NotFound(msg) => ApiError::not_found(msg),
            DocumentError::InvalidTransition(msg) => ApiError::new(msg, StatusCode::CONFLICT),
            DocumentError::RateLimited { retry_after_secs } => ApiError {
                message: "rate limit exceeded".to_string(),
                status_code: StatusCode::TOO_MANY_REQUESTS,
                retry_after_secs: Some(retry_after_secs),
            },
            other => ApiError::internal_server_error(other.to_string()),
        }
    }
}

impl From<anyhow::Error> for ApiError {
    fn from(err: anyhow::Error) -> Self {
        ApiError::internal_server_error(err.to_string())
    }
}

impl From<serde_json::Error> for ApiError {
    fn from(err: serde_json::Error) -> Self {
        ApiError::bad_request(err.to_string())
    }
}

impl From<sqlx::Error> for ApiError {
    fn from(err: sqlx::Error) -> Self {
        ApiError::internal_server_error(err.to_string())
    }
}

pub type ApiResult<T> = Result<T, ApiError>;

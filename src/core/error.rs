use thiserror::Error;

/// Error taxonomy for the orchestration core.
///
/// None of these terminate the process: validation and rate-limit errors are
/// rejected before any document exists, transition conflicts are surfaced to
/// the caller to decide, and collaborator failures end up as the failed
/// document's error detail.
#[derive(Debug, Error)]
pub enum DocumentError {
    #[error("validation failed: {0}")]
    Validation(String),

    #[error("invalid transition: {0}")]
    InvalidTransition(String),

    #[error("rate limit exceeded, retry after {retry_after_secs}s")]
    RateLimited { retry_after_secs: i64 },

    #[error("not found: {0}")]
    NotFound(String),

    #[error("render failed: {0}")]
    Render(String),

    #[error("storage failed: {0}")]
    Storage(String),

    #[error("queue failed: {0}")]
    Queue(String),

    #[error("decode failed: {0}")]
    Decode(String),

    #[error(transparent)]
    Database(#[from] sqlx::Error),

    #[error(transparent)]
    Serialization(#[from] serde_json::Error),
}

pub type DocumentResult<T> = Result<T, DocumentError>;

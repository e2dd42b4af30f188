pub mod api;
pub mod core;
pub mod db;
pub mod models;
pub mod orchestrator;
pub mod processor;
pub mod queue;
pub mod render;
pub mod storage;
pub mod templates;

// Re-export commonly used types
pub use crate::core::{AppConfig, DocumentError, DocumentResult};
pub use models::{
    Document, DocumentRequest, DocumentResponse, DocumentStatus,
    DocumentType, OutputFormat, Priority,
};
pub use orchestrator::{AuditLog, DocumentLifecycle, RateLimiter, UsageAggregator};
pub use processor::DocumentProcessor;
pub use render::RenderDispatch;
pub use storage::S3Client;
pub use templates::TemplateRegistry;

use crate::models::{DocumentType, OutputFormat};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DispatchMode {
    Sync,
    Async,
}

#[derive(Debug, Clone)]
pub struct DispatchConfig {
    pub max_sync_size_bytes: usize,
}

/// Small reports stay on the sync path; the threshold predates the generic
/// size cap and is kept separate so report-heavy tenants can tune one
/// without the other.
const SMALL_REPORT_BYTES: usize = 100_000;

/// Routes a request to inline or queued execution. Pure function of its
/// inputs: no clock, no I/O, so a retried request always lands on the same
/// path.
pub fn decide(
    document_type: &DocumentType,
    format: &OutputFormat,
    estimated_size: usize,
    config: &DispatchConfig,
) -> DispatchMode {
    if estimated_size > config.max_sync_size_bytes {
        return DispatchMode::Async;
    }

    match (document_type, format) {
        (DocumentType::Invoice | DocumentType::Receipt, OutputFormat::Pdf) => DispatchMode::Sync,
        (DocumentType::Report, OutputFormat::Excel) if estimated_size < SMALL_REPORT_BYTES => {
            DispatchMode::Sync
        }
        _ => DispatchMode::Async,
    }
}

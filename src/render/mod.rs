use async_trait::async_trait;

use crate::core::{DocumentError, DocumentResult};
use crate::models::{OutputFormat, TemplateDescriptor};

pub mod excel;
pub mod pdf;

pub use excel::ExcelRenderer;
pub use pdf::PdfRenderer;

pub struct RenderedDocument {
    pub bytes: Vec<u8>,
    pub content_type: &'static str,
    pub extension: &'static str,
    pub row_count: Option<i64>,
}

/// Rendering engine seam. Engines are collaborators: a failure here becomes
/// the document's error detail, never a crash of the orchestration path.
#[async_trait]
pub trait Renderer: Send + Sync {
    async fn render(
        &self,
        descriptor: &TemplateDescriptor,
        input: &serde_json::Value,
    ) -> DocumentResult<RenderedDocument>;
}

/// Dispatches by the template's output format tag rather than by template
/// subtype, so new template types are data, not code.
pub struct RenderDispatch {
    pdf: PdfRenderer,
    excel: ExcelRenderer,
}

impl RenderDispatch {
    pub fn new() -> Self {
        RenderDispatch {
            pdf: PdfRenderer::new(),
            excel: ExcelRenderer::new(),
        }
    }

    pub async fn render(
        &self,
        descriptor: &TemplateDescriptor,
        input: &serde_json::Value,
    ) -> DocumentResult<RenderedDocument> {
        match descriptor.output_format {
            OutputFormat::Pdf => self.pdf.render(descriptor, input).await,
            OutputFormat::Excel => self.excel.render(descriptor, input).await,
            OutputFormat::Csv => Err(DocumentError::Render(
                "csv output is not supported yet".to_string(),
            )),
        }
    }
}

impl Default for RenderDispatch {
    fn default() -> Self {
        Self::new()
    }
}

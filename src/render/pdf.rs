use std::process::Command;

use async_trait::async_trait;
use uuid::Uuid;

use super::{RenderedDocument, Renderer};
use crate::core::{DocumentError, DocumentResult};
use crate::models::TemplateDescriptor;

/// PDF engine: the template content is a Typst source with minijinja
/// placeholders; the payload fills the placeholders and the Typst CLI
/// compiles the result.
pub struct PdfRenderer {
    temp_dir: String,
}

impl PdfRenderer {
    pub fn new() -> Self {
        let temp_dir = std::env::var("TEMP_DIR").unwrap_or_else(|_| "/tmp".to_string());
        PdfRenderer { temp_dir }
    }

    async fn compile_typst(&self, source: &str) -> DocumentResult<Vec<u8>> {
        let temp_id = Uuid::new_v4();
        let typ_path = format!("{}/doc_{}.typ", self.temp_dir, temp_id);
        let pdf_path = format!("{}/doc_{}.pdf", self.temp_dir, temp_id);

        tokio::fs::write(&typ_path, source)
            .await
            .map_err(|e| DocumentError::Render(e.to_string()))?;

        let output = tokio::task::spawn_blocking({
            let typ_path = typ_path.clone();
            let pdf_path = pdf_path.clone();
            move || {
                Command::new("typst")
                    .args(["compile", &typ_path, &pdf_path])
                    .output()
            }
        })
        .await
        .map_err(|e| DocumentError::Render(e.to_string()))?
        .map_err(|e| DocumentError::Render(e.to_string()))?;

        if !output.status.success() {
            let _ = tokio::fs::remove_file(&typ_path).await;
            return Err(DocumentError::Render(format!(
                "typst compilation failed: {}",
                String::from_utf8_lossy(&output.stderr)
            )));
        }

        let bytes = tokio::fs::read(&pdf_path)
            .await
            .map_err(|e| DocumentError::Render(e.to_string()))?;

        let _ = tokio::fs::remove_file(&typ_path).await;
        let _ = tokio::fs::remove_file(&pdf_path).await;

        Ok(bytes)
    }
}

impl Default for PdfRenderer {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Renderer for PdfRenderer {
    async fn render(
        &self,
        descriptor: &TemplateDescriptor,
        input: &serde_json::Value,
    ) -> DocumentResult<RenderedDocument> {
        let mut env = minijinja::Environment::new();
        env.add_template("doc", &descriptor.content)
            .map_err(|e| DocumentError::Render(e.to_string()))?;
        let source = env
            .get_template("doc")
            .map_err(|e| DocumentError::Render(e.to_string()))?
            .render(input)
            .map_err(|e| DocumentError::Render(e.to_string()))?;

        let bytes = self.compile_typst(&source).await?;

        Ok(RenderedDocument {
            bytes,
            content_type: "application/pdf",
            extension: "pdf",
            row_count: None,
        })
    }
}

use async_trait::async_trait;
use rust_xlsxwriter::{Color, Format, FormatBorder, Workbook};
use serde_json::Value;

use super::{RenderedDocument, Renderer};
use crate::core::{DocumentError, DocumentResult};
use crate::models::TemplateDescriptor;

/// Excel engine: the payload carries `headers` and `rows` arrays; the
/// template only contributes the sheet name. Workbook assembly is CPU-bound
/// and runs on a blocking task.
pub struct ExcelRenderer;

impl ExcelRenderer {
    pub fn new() -> Self {
        ExcelRenderer
    }

    fn build_workbook(sheet_name: String, data: Value) -> DocumentResult<(Vec<u8>, i64)> {
        let render_err = |e: rust_xlsxwriter::XlsxError| DocumentError::Render(e.to_string());

        let mut workbook = Workbook::new();
        let worksheet = workbook.add_worksheet();
        worksheet.set_name(&sheet_name).map_err(render_err)?;

        let header_format = Format::new()
            .set_bold()
            .set_background_color(Color::RGB(0x4472C4))
            .set_font_color(Color::White)
            .set_border(FormatBorder::Thin);
        let cell_format = Format::new().set_border(FormatBorder::Thin);

        if let Some(headers) = data["headers"].as_array() {
            for (col, header) in headers.iter().enumerate() {
                worksheet
                    .write_string_with_format(
                        0,
                        col as u16,
                        header.as_str().unwrap_or(""),
                        &header_format,
                    )
                    .map_err(render_err)?;
            }
        }

        let mut row_count = 0_i64;
        if let Some(rows) = data["rows"].as_array() {
            row_count = rows.len() as i64;

            for (row_idx, row) in rows.iter().enumerate() {
                let row_num = (row_idx + 1) as u32; // header occupies row 0

                let Some(cells) = row.as_array() else {
                    continue;
                };

                for (col_idx, value) in cells.iter().enumerate() {
                    let col_num = col_idx as u16;
                    match value {
                        Value::Number(n) => {
                            worksheet
                                .write_number_with_format(
                                    row_num,
                                    col_num,
                                    n.as_f64().unwrap_or(0.0),
                                    &cell_format,
                                )
                                .map_err(render_err)?;
                        }
                        Value::String(s) => {
                            worksheet
                                .write_string_with_format(row_num, col_num, s, &cell_format)
                                .map_err(render_err)?;
                        }
                        other => {
                            worksheet
                                .write_string_with_format(
                                    row_num,
                                    col_num,
                                    &other.to_string(),
                                    &cell_format,
                                )
                                .map_err(render_err)?;
                        }
                    }
                }
            }

            worksheet.set_freeze_panes(1, 0).map_err(render_err)?;
        }

        let bytes = workbook.save_to_buffer().map_err(render_err)?;
        Ok((bytes, row_count))
    }
}

impl Default for ExcelRenderer {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Renderer for ExcelRenderer {
    async fn render(
        &self,
        descriptor: &TemplateDescriptor,
        input: &serde_json::Value,
    ) -> DocumentResult<RenderedDocument> {
        let sheet_name = descriptor.name.clone();
        let data = input.clone();

        let (bytes, row_count) =
            tokio::task::spawn_blocking(move || Self::build_workbook(sheet_name, data))
                .await
                .map_err(|e| DocumentError::Render(e.to_string()))??;

        Ok(RenderedDocument {
            bytes,
            content_type: "application/vnd.openxmlformats-officedocument.spreadsheetml.sheet",
            extension: "xlsx",
            row_count: Some(row_count),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::OutputFormat;
    use chrono::Utc;

    fn descriptor() -> TemplateDescriptor {
        TemplateDescriptor {
            id: "monthly_report".to_string(),
            version: 1,
            name: "Report".to_string(),
            template_type: "report".to_string(),
            output_format: OutputFormat::Excel,
            content: String::new(),
            schema: None,
            is_active: true,
            created_by: "tests".to_string(),
            created_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn renders_rows_and_reports_the_count() {
        let input = serde_json::json!({
            "headers": ["item", "qty"],
            "rows": [["widget", 3], ["gadget", 5]],
        });

        let rendered = ExcelRenderer::new().render(&descriptor(), &input).await.unwrap();
        assert_eq!(rendered.row_count, Some(2));
        assert_eq!(rendered.extension, "xlsx");
        assert!(!rendered.bytes.is_empty());
    }
}

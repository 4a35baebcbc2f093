///! OCR text detection using Tesseract (optional feature)
use crate::{errors::VisualError, models::*, text::parse_tsv, visual::TextDetector};
use async_trait::async_trait;
use image::{DynamicImage, ImageOutputFormat};
use std::io::Cursor;
use std::time::Instant;
use tesseract::Tesseract;

/// Tesseract-backed text detector
pub struct OcrEngine {
    language: String,
    datapath: Option<String>,
}

impl OcrEngine {
    /// Create new OCR engine with default language (English)
    pub fn new() -> Self {
        Self::with_language("eng")
    }

    /// Create OCR engine with specified language
    pub fn with_language(language: &str) -> Self {
        Self {
            language: language.to_string(),
            datapath: None,
        }
    }

    pub fn with_datapath(mut self, datapath: impl Into<String>) -> Self {
        self.datapath = Some(datapath.into());
        self
    }

    fn run(
        png: Vec<u8>,
        language: String,
        datapath: Option<String>,
    ) -> Result<String, VisualError> {
        let tess = Tesseract::new(datapath.as_deref(), Some(&language))
            .map_err(|e| VisualError::OcrFailed(format!("Tesseract init failed: {}", e)))?;
        let tess = tess
            .set_image_from_mem(&png)
            .map_err(|e| VisualError::OcrFailed(format!("Failed to set image: {}", e)))?;
        let mut tess = tess
            .recognize()
            .map_err(|e| VisualError::OcrFailed(format!("Recognition failed: {}", e)))?;
        tess.get_tsv_text(0)
            .map_err(|e| VisualError::OcrFailed(format!("TSV extraction failed: {}", e)))
    }
}

impl Default for OcrEngine {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl TextDetector for OcrEngine {
    fn name(&self) -> &str {
        "tesseract"
    }

    async fn detect_text(&self, image: &DynamicImage) -> Result<Vec<TextBlock>, VisualError> {
        let start = Instant::now();

        // Convert to grayscale for better OCR
        let mut png = Vec::new();
        DynamicImage::ImageLuma8(image.to_luma8())
            .write_to(&mut Cursor::new(&mut png), ImageOutputFormat::Png)?;

        let language = self.language.clone();
        let datapath = self.datapath.clone();
        let tsv = tokio::task::spawn_blocking(move || Self::run(png, language, datapath))
            .await
            .map_err(|e| VisualError::OcrFailed(format!("Task join error: {}", e)))??;

        let blocks = parse_tsv(&tsv);
        tracing::debug!(
            blocks = blocks.len(),
            elapsed_ms = start.elapsed().as_millis() as u64,
            "tesseract detection finished"
        );
        Ok(blocks)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    #[ignore] // Requires Tesseract installation
    async fn test_ocr_blank_image() {
        let engine = OcrEngine::new();
        let blocks = engine
            .detect_text(&DynamicImage::new_rgb8(64, 32))
            .await
            .unwrap();
        assert!(blocks.is_empty());
    }

    #[test]
    fn test_engine_language() {
        let engine = OcrEngine::with_language("deu").with_datapath("/usr/share/tessdata");
        assert_eq!(engine.language, "deu");
        assert_eq!(engine.datapath.as_deref(), Some("/usr/share/tessdata"));
    }
}

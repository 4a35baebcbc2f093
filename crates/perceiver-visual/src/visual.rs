///! Vision backend capability traits
use crate::{errors::VisualError, models::*};
use async_trait::async_trait;
use image::DynamicImage;

/// Full-frame text detection backend
#[async_trait]
pub trait TextDetector: Send + Sync {
    /// Backend identifier used in logs
    fn name(&self) -> &str;

    /// Detect every text block in the image
    async fn detect_text(&self, image: &DynamicImage) -> Result<Vec<TextBlock>, VisualError>;
}

/// Image template matching backend
#[async_trait]
pub trait TemplateMatcher: Send + Sync {
    /// Backend identifier used in logs
    fn name(&self) -> &str;

    /// Best match of the template inside the image
    async fn find_template(
        &self,
        image: &DynamicImage,
        template_id: &str,
    ) -> Result<TemplateMatch, VisualError>;

    /// Every non-overlapping match in reading order.
    ///
    /// Backends that only know their best match inherit this default.
    async fn find_all(
        &self,
        image: &DynamicImage,
        template_id: &str,
    ) -> Result<Vec<TemplateMatch>, VisualError> {
        let best = self.find_template(image, template_id).await?;
        Ok(if best.found { vec![best] } else { Vec::new() })
    }
}

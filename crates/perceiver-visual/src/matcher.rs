///! Template matching backed by imageproc normalised cross-correlation
use crate::{errors::VisualError, models::*, template::TemplateStore, visual::TemplateMatcher};
use async_trait::async_trait;
use image::{DynamicImage, GrayImage};
use imageproc::template_matching::{match_template, MatchTemplateMethod};
use soulheal_core_types::PixelRect;
use std::cmp::Ordering;
use std::sync::Arc;

/// Default minimum similarity for a template hit
pub const DEFAULT_MATCH_THRESHOLD: f32 = 0.9;

/// Template matcher using `imageproc::template_matching`
pub struct ImageprocMatcher {
    store: Arc<dyn TemplateStore>,
    threshold: f32,
}

impl ImageprocMatcher {
    pub fn new(store: Arc<dyn TemplateStore>) -> Self {
        Self::with_threshold(store, DEFAULT_MATCH_THRESHOLD)
    }

    pub fn with_threshold(store: Arc<dyn TemplateStore>, threshold: f32) -> Self {
        Self {
            store,
            threshold: threshold.clamp(0.0, 1.0),
        }
    }

    pub fn threshold(&self) -> f32 {
        self.threshold
    }

    /// Non-overlapping hits, highest score first
    async fn ranked_matches(
        &self,
        image: &DynamicImage,
        template_id: &str,
    ) -> Result<Vec<TemplateMatch>, VisualError> {
        let template = self.store.load(template_id)?;
        let haystack = image.to_luma8();
        let needle = template.to_luma8();

        if needle.width() == 0 || needle.height() == 0 {
            return Err(VisualError::InvalidInput(format!(
                "template '{}' is empty",
                template_id
            )));
        }
        if needle.width() > haystack.width() || needle.height() > haystack.height() {
            tracing::debug!(
                template = template_id,
                "template larger than search image; no match possible"
            );
            return Ok(Vec::new());
        }

        let threshold = self.threshold;
        // Run matching in blocking task (CPU intensive)
        tokio::task::spawn_blocking(move || scan(&haystack, &needle, threshold))
            .await
            .map_err(|e| VisualError::MatchFailed(format!("Task join error: {}", e)))
    }
}

fn scan(haystack: &GrayImage, needle: &GrayImage, threshold: f32) -> Vec<TemplateMatch> {
    let scores = match_template(
        haystack,
        needle,
        MatchTemplateMethod::CrossCorrelationNormalized,
    );
    let (width, height) = needle.dimensions();

    let mut hits: Vec<TemplateMatch> = scores
        .enumerate_pixels()
        .filter(|(_, _, score)| score[0].is_finite() && score[0] >= threshold)
        .map(|(x, y, score)| TemplateMatch::at(PixelRect::new(x, y, width, height), score[0]))
        .collect();
    hits.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(Ordering::Equal));

    let mut kept: Vec<TemplateMatch> = Vec::new();
    for hit in hits {
        if kept.iter().all(|k| !k.bounds.overlaps(&hit.bounds)) {
            kept.push(hit);
        }
    }
    kept
}

#[async_trait]
impl TemplateMatcher for ImageprocMatcher {
    fn name(&self) -> &str {
        "imageproc"
    }

    async fn find_template(
        &self,
        image: &DynamicImage,
        template_id: &str,
    ) -> Result<TemplateMatch, VisualError> {
        let hits = self.ranked_matches(image, template_id).await?;
        Ok(hits
            .into_iter()
            .next()
            .unwrap_or_else(TemplateMatch::not_found))
    }

    async fn find_all(
        &self,
        image: &DynamicImage,
        template_id: &str,
    ) -> Result<Vec<TemplateMatch>, VisualError> {
        let mut hits = self.ranked_matches(image, template_id).await?;
        hits.sort_by(|a, b| a.bounds.reading_order(&b.bounds));
        Ok(hits)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::template::MemoryTemplateStore;
    use image::{ImageBuffer, Luma};
    use soulheal_core_types::Point;

    fn noise(width: u32, height: u32) -> GrayImage {
        let mut state: u32 = 0x2545_f491;
        ImageBuffer::from_fn(width, height, |_, _| {
            state = state.wrapping_mul(1_103_515_245).wrapping_add(12_345);
            Luma([((state >> 16) & 0xff) as u8 | 0x10])
        })
    }

    fn matcher_for(screen: &GrayImage, x: u32, y: u32, w: u32, h: u32) -> ImageprocMatcher {
        let patch = image::imageops::crop_imm(screen, x, y, w, h).to_image();
        let store = MemoryTemplateStore::new();
        store.insert("patch.png", DynamicImage::ImageLuma8(patch));
        ImageprocMatcher::with_threshold(Arc::new(store), 0.99)
    }

    #[tokio::test]
    async fn finds_template_cut_from_the_screen() {
        let screen = noise(60, 40);
        let matcher = matcher_for(&screen, 30, 12, 8, 6);
        let hit = matcher
            .find_template(&DynamicImage::ImageLuma8(screen), "patch.png")
            .await
            .unwrap();
        assert!(hit.found);
        assert_eq!(hit.bounds, PixelRect::new(30, 12, 8, 6));
        assert_eq!(hit.center, Point::new(34, 15));
    }

    #[tokio::test]
    async fn oversized_template_is_not_found() {
        let screen = noise(20, 20);
        let matcher = matcher_for(&screen, 0, 0, 20, 20);
        let small = DynamicImage::ImageLuma8(noise(10, 10));
        let hit = matcher.find_template(&small, "patch.png").await.unwrap();
        assert!(!hit.found);
        assert!(matcher.find_all(&small, "patch.png").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn unknown_template_is_an_error() {
        let matcher = ImageprocMatcher::new(Arc::new(MemoryTemplateStore::new()));
        let result = matcher
            .find_template(&DynamicImage::new_luma8(4, 4), "nope.png")
            .await;
        assert!(matches!(result, Err(VisualError::TemplateNotFound(_))));
    }
}

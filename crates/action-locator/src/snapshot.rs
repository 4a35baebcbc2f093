//! Per-cycle screen snapshot and lazily fetched page source

use crate::source::ElementSource;
use perceiver_visual::{Region, Snapshot};
use soulheal_core_types::AreaOfInterest;
use std::time::Instant;
use tokio::sync::OnceCell;
use tracing::{debug, warn};

/// State shared by every technique of one resolution cycle.
///
/// The screen is captured at most once and cropped to the area of interest
/// at most once. The page source is fetched on first request only.
pub struct CycleSnapshot {
    snapshot: Option<Snapshot>,
    region: Result<Region, String>,
    page_source: OnceCell<Option<String>>,
}

impl CycleSnapshot {
    /// Cycle without vision techniques; no capture is performed
    pub fn without_capture() -> Self {
        Self {
            snapshot: None,
            region: Err("no vision technique active".to_string()),
            page_source: OnceCell::new(),
        }
    }

    /// Capture the screen and derive the area-of-interest region
    pub async fn capture(source: &dyn ElementSource, aoi: &AreaOfInterest) -> Self {
        let started = Instant::now();
        match source.capture().await {
            Ok(image) => {
                let snapshot = Snapshot::new(image);
                let region = snapshot.region(aoi);
                debug!(
                    snapshot = %snapshot.id,
                    width = snapshot.width,
                    height = snapshot.height,
                    aoi = %aoi,
                    cropped = region.is_cropped(),
                    elapsed_ms = started.elapsed().as_millis() as u64,
                    "captured cycle snapshot"
                );
                Self {
                    snapshot: Some(snapshot),
                    region: Ok(region),
                    page_source: OnceCell::new(),
                }
            }
            Err(err) => {
                warn!(source = source.name(), error = %err, "screen capture failed");
                Self {
                    snapshot: None,
                    region: Err(format!("capture failed: {}", err)),
                    page_source: OnceCell::new(),
                }
            }
        }
    }

    pub fn snapshot(&self) -> Option<&Snapshot> {
        self.snapshot.as_ref()
    }

    /// Area-of-interest region, or why it is unavailable
    pub fn region(&self) -> Result<&Region, &str> {
        self.region.as_ref().map_err(String::as_str)
    }

    /// Page source, fetched once per cycle when the source supports it
    pub async fn page_source(&self, source: &dyn ElementSource) -> Option<&str> {
        self.page_source
            .get_or_init(|| async {
                if !source.capabilities().page_source {
                    return None;
                }
                match source.page_source().await {
                    Ok(dump) => Some(dump),
                    Err(err) => {
                        debug!(error = %err, "page source unavailable");
                        None
                    }
                }
            })
            .await
            .as_deref()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::source::StaticFrameSource;
    use image::DynamicImage;
    use soulheal_core_types::PixelRect;

    #[tokio::test]
    async fn region_is_cropped_once_from_the_capture() {
        let source = StaticFrameSource::new(DynamicImage::new_rgb8(200, 100));
        let aoi = AreaOfInterest::new(50.0, 0.0, 50.0, 50.0).unwrap();
        let cycle = CycleSnapshot::capture(&source, &aoi).await;
        let region = cycle.region().unwrap();
        assert_eq!(region.bounds, PixelRect::new(100, 0, 100, 50));
        assert_eq!(region.image.width(), 100);
        assert_eq!(cycle.snapshot().map(|s| s.width), Some(200));
    }

    #[tokio::test]
    async fn capture_failure_is_reported_through_region() {
        let source = crate::fallback::FallbackGroup::<dyn ElementSource>::single(
            "empty",
            std::sync::Arc::new(NoCapture),
        );
        let cycle = CycleSnapshot::capture(&source, &AreaOfInterest::FULL).await;
        assert!(cycle.snapshot().is_none());
        assert!(cycle.region().unwrap_err().starts_with("capture failed"));
    }

    #[tokio::test]
    async fn page_source_is_fetched_lazily() {
        let source =
            StaticFrameSource::new(DynamicImage::new_rgb8(2, 2)).with_page_source("<root/>");
        let cycle = CycleSnapshot::without_capture();
        assert_eq!(cycle.page_source(&source).await, Some("<root/>"));

        let bare = StaticFrameSource::new(DynamicImage::new_rgb8(2, 2));
        let cycle = CycleSnapshot::without_capture();
        assert_eq!(cycle.page_source(&bare).await, None);
    }

    struct NoCapture;

    #[async_trait::async_trait]
    impl ElementSource for NoCapture {
        fn name(&self) -> &str {
            "no-capture"
        }

        fn capabilities(&self) -> crate::source::SourceCapabilities {
            crate::source::SourceCapabilities {
                capture: true,
                ..Default::default()
            }
        }
    }
}

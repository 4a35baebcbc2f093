///! Data models for visual perception
use image::DynamicImage;
use serde::{Deserialize, Serialize};
use soulheal_core_types::{AreaOfInterest, PixelRect, Point};
use std::sync::Arc;
use std::time::SystemTime;
use uuid::Uuid;

/// Screen image captured once per resolution cycle
#[derive(Debug, Clone)]
pub struct Snapshot {
    /// Unique identifier for the snapshot
    pub id: String,

    /// Decoded screen image, shared read-only
    pub image: Arc<DynamicImage>,

    /// Image dimensions
    pub width: u32,
    pub height: u32,

    /// Capture timestamp
    pub timestamp: SystemTime,
}

impl Snapshot {
    pub fn new(image: DynamicImage) -> Self {
        Self::from_shared(Arc::new(image))
    }

    pub fn from_shared(image: Arc<DynamicImage>) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            width: image.width(),
            height: image.height(),
            image,
            timestamp: SystemTime::now(),
        }
    }

    /// Region of the snapshot covered by `aoi`.
    ///
    /// The full-screen area shares the snapshot image; any other area is
    /// cropped exactly once here.
    pub fn region(&self, aoi: &AreaOfInterest) -> Region {
        if aoi.is_full_screen() {
            return Region {
                image: Arc::clone(&self.image),
                bounds: PixelRect::new(0, 0, self.width, self.height),
            };
        }
        let bounds = aoi.pixel_bounds(self.width, self.height);
        let cropped = self
            .image
            .crop_imm(bounds.x, bounds.y, bounds.width, bounds.height);
        Region {
            image: Arc::new(cropped),
            bounds,
        }
    }
}

/// Pixel region of a snapshot handed to vision techniques
#[derive(Debug, Clone)]
pub struct Region {
    pub image: Arc<DynamicImage>,

    /// Bounds of the region in full-image pixel space
    pub bounds: PixelRect,
}

impl Region {
    pub fn origin(&self) -> Point {
        self.bounds.origin()
    }

    pub fn is_cropped(&self) -> bool {
        self.bounds.x != 0
            || self.bounds.y != 0
            || self.bounds.width != self.image.width()
            || self.bounds.height != self.image.height()
    }

    /// Map a point found inside the region back to full-image coordinates.
    pub fn to_screen(&self, point: Point) -> Point {
        point.offset_by(self.origin())
    }
}

/// Text detected by an OCR backend
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TextBlock {
    pub text: String,

    /// Confidence (0.0-1.0)
    pub confidence: f32,

    pub bounds: PixelRect,
}

/// Result of a template lookup
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TemplateMatch {
    pub found: bool,
    pub center: Point,
    pub bounds: PixelRect,

    /// Similarity score reported by the matcher
    pub score: f32,
}

impl TemplateMatch {
    pub fn at(bounds: PixelRect, score: f32) -> Self {
        Self {
            found: true,
            center: bounds.center(),
            bounds,
            score,
        }
    }

    pub fn not_found() -> Self {
        Self {
            found: false,
            center: Point::default(),
            bounds: PixelRect::default(),
            score: 0.0,
        }
    }
}

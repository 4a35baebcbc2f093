use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;

use thiserror::Error;
use uuid::Uuid;

/// Image file extensions that mark a reference as an image template.
pub const IMAGE_EXTENSIONS: &[&str] = &["png", "jpg", "jpeg", "bmp", "gif", "webp", "tif", "tiff"];

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum TargetError {
    #[error("target reference is empty")]
    Empty,
}

#[derive(Debug, Error, Clone, PartialEq)]
pub enum AoiError {
    #[error("{field} must be a finite number, got {value}")]
    NotFinite { field: &'static str, value: f64 },
    #[error("{field} must be within [0, 100], got {value}")]
    OutOfRange { field: &'static str, value: f64 },
    #[error("{axis} + extent exceeds 100 ({start} + {extent})")]
    Overflow {
        axis: &'static str,
        start: f64,
        extent: f64,
    },
    #[error("area must have a non-zero {0}")]
    Empty(&'static str),
    #[error("expected four comma separated percentages, got '{0}'")]
    Malformed(String),
}

#[cfg_attr(feature = "serde-full", derive(serde::Serialize, serde::Deserialize))]
#[derive(Clone, Debug, Eq, PartialEq, Hash)]
pub struct SessionId(pub String);

impl SessionId {
    pub fn new() -> Self {
        Self(Uuid::new_v4().to_string())
    }
}

impl Default for SessionId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Syntactic class of an element reference.
#[cfg_attr(feature = "serde-full", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde-full", serde(rename_all = "snake_case"))]
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash, PartialOrd, Ord)]
pub enum Classification {
    StructuralPath,
    TextLabel,
    ImageTemplate,
}

impl Classification {
    pub const ALL: [Classification; 3] = [
        Classification::StructuralPath,
        Classification::TextLabel,
        Classification::ImageTemplate,
    ];

    /// Classify a raw reference. Pure function of its syntax.
    pub fn of(raw: &str) -> Self {
        let trimmed = raw.trim();
        if is_structural_path(trimmed) {
            Classification::StructuralPath
        } else if has_image_extension(trimmed) {
            Classification::ImageTemplate
        } else {
            Classification::TextLabel
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Classification::StructuralPath => "structural_path",
            Classification::TextLabel => "text_label",
            Classification::ImageTemplate => "image_template",
        }
    }
}

impl fmt::Display for Classification {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

fn is_structural_path(raw: &str) -> bool {
    raw.starts_with('/')
        || raw.starts_with("./")
        || raw.starts_with("(/")
        || raw
            .get(..6)
            .map(|prefix| prefix.eq_ignore_ascii_case("xpath="))
            .unwrap_or(false)
}

fn has_image_extension(raw: &str) -> bool {
    match raw.rsplit_once('.') {
        Some((stem, ext)) if !stem.is_empty() => IMAGE_EXTENSIONS
            .iter()
            .any(|candidate| candidate.eq_ignore_ascii_case(ext)),
        _ => false,
    }
}

/// Element reference plus its classification. Immutable once built.
#[cfg_attr(feature = "serde-full", derive(serde::Serialize, serde::Deserialize))]
#[derive(Clone, Debug, Eq, PartialEq, Hash)]
pub struct Target {
    raw: String,
    classification: Classification,
}

impl Target {
    pub fn new(raw: impl Into<String>) -> Result<Self, TargetError> {
        let raw = raw.into().trim().to_string();
        if raw.is_empty() {
            return Err(TargetError::Empty);
        }
        let classification = Classification::of(&raw);
        Ok(Self {
            raw,
            classification,
        })
    }

    pub fn raw(&self) -> &str {
        &self.raw
    }

    pub fn classification(&self) -> Classification {
        self.classification
    }

    /// Reference with any `xpath=` prefix removed.
    pub fn query(&self) -> &str {
        match self.classification {
            Classification::StructuralPath
                if self
                    .raw
                    .get(..6)
                    .map(|p| p.eq_ignore_ascii_case("xpath="))
                    .unwrap_or(false) =>
            {
                &self.raw[6..]
            }
            _ => &self.raw,
        }
    }
}

impl fmt::Display for Target {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.raw, self.classification)
    }
}

impl FromStr for Target {
    type Err = TargetError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Target::new(s)
    }
}

/// Pixel position on a screen image.
#[cfg_attr(feature = "serde-full", derive(serde::Serialize, serde::Deserialize))]
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq, Hash)]
pub struct Point {
    pub x: u32,
    pub y: u32,
}

impl Point {
    pub const fn new(x: u32, y: u32) -> Self {
        Self { x, y }
    }

    /// Translate a point found inside a region back into full-image space.
    pub fn offset_by(self, origin: Point) -> Point {
        Point {
            x: self.x.saturating_add(origin.x),
            y: self.y.saturating_add(origin.y),
        }
    }
}

impl fmt::Display for Point {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({}, {})", self.x, self.y)
    }
}

/// Axis aligned pixel rectangle.
#[cfg_attr(feature = "serde-full", derive(serde::Serialize, serde::Deserialize))]
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq, Hash)]
pub struct PixelRect {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
}

impl PixelRect {
    pub const fn new(x: u32, y: u32, width: u32, height: u32) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    pub fn origin(&self) -> Point {
        Point::new(self.x, self.y)
    }

    pub fn center(&self) -> Point {
        Point::new(self.x + self.width / 2, self.y + self.height / 2)
    }

    pub fn right(&self) -> u32 {
        self.x + self.width
    }

    pub fn bottom(&self) -> u32 {
        self.y + self.height
    }

    pub fn overlaps(&self, other: &PixelRect) -> bool {
        self.x < other.right()
            && other.x < self.right()
            && self.y < other.bottom()
            && other.y < self.bottom()
    }

    pub fn offset_by(self, origin: Point) -> PixelRect {
        PixelRect {
            x: self.x.saturating_add(origin.x),
            y: self.y.saturating_add(origin.y),
            ..self
        }
    }

    /// Duplicate ordering: top-to-bottom by origin y, then left-to-right by x.
    pub fn reading_order(&self, other: &PixelRect) -> Ordering {
        self.y.cmp(&other.y).then(self.x.cmp(&other.x))
    }
}

/// Percentage based sub-region of the screen used to restrict vision search.
#[cfg_attr(feature = "serde-full", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde-full", serde(try_from = "RawArea"))]
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct AreaOfInterest {
    x: f64,
    y: f64,
    width: f64,
    height: f64,
}

/// Unchecked wire form, validated through [`AreaOfInterest::new`]
#[cfg(feature = "serde-full")]
#[derive(serde::Deserialize)]
struct RawArea {
    x: f64,
    y: f64,
    width: f64,
    height: f64,
}

#[cfg(feature = "serde-full")]
impl TryFrom<RawArea> for AreaOfInterest {
    type Error = AoiError;

    fn try_from(raw: RawArea) -> Result<Self, Self::Error> {
        AreaOfInterest::new(raw.x, raw.y, raw.width, raw.height)
    }
}

const AOI_EPSILON: f64 = 1e-9;

impl AreaOfInterest {
    pub const FULL: AreaOfInterest = AreaOfInterest {
        x: 0.0,
        y: 0.0,
        width: 100.0,
        height: 100.0,
    };

    pub fn new(x: f64, y: f64, width: f64, height: f64) -> Result<Self, AoiError> {
        for (field, value) in [("x", x), ("y", y), ("width", width), ("height", height)] {
            if !value.is_finite() {
                return Err(AoiError::NotFinite { field, value });
            }
            if !(0.0..=100.0).contains(&value) {
                return Err(AoiError::OutOfRange { field, value });
            }
        }
        if width <= 0.0 {
            return Err(AoiError::Empty("width"));
        }
        if height <= 0.0 {
            return Err(AoiError::Empty("height"));
        }
        if x + width > 100.0 + AOI_EPSILON {
            return Err(AoiError::Overflow {
                axis: "x",
                start: x,
                extent: width,
            });
        }
        if y + height > 100.0 + AOI_EPSILON {
            return Err(AoiError::Overflow {
                axis: "y",
                start: y,
                extent: height,
            });
        }
        Ok(Self {
            x,
            y,
            width,
            height,
        })
    }

    pub fn x(&self) -> f64 {
        self.x
    }

    pub fn y(&self) -> f64 {
        self.y
    }

    pub fn width(&self) -> f64 {
        self.width
    }

    pub fn height(&self) -> f64 {
        self.height
    }

    pub fn is_full_screen(&self) -> bool {
        *self == Self::FULL
    }

    /// Pixel rectangle of this area on an image of `image_width` x `image_height`.
    pub fn pixel_bounds(&self, image_width: u32, image_height: u32) -> PixelRect {
        let x = scale(image_width, self.x).min(image_width.saturating_sub(1));
        let y = scale(image_height, self.y).min(image_height.saturating_sub(1));
        let width = scale(image_width, self.width)
            .max(1)
            .min(image_width.saturating_sub(x).max(1));
        let height = scale(image_height, self.height)
            .max(1)
            .min(image_height.saturating_sub(y).max(1));
        PixelRect::new(x, y, width, height)
    }
}

fn scale(extent: u32, percent: f64) -> u32 {
    (extent as f64 * percent / 100.0).floor() as u32
}

impl Default for AreaOfInterest {
    fn default() -> Self {
        Self::FULL
    }
}

impl fmt::Display for AreaOfInterest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}%,{}%,{}%,{}%",
            self.x, self.y, self.width, self.height
        )
    }
}

impl FromStr for AreaOfInterest {
    type Err = AoiError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let parts = s
            .split(',')
            .map(|part| part.trim().trim_end_matches('%').parse::<f64>())
            .collect::<Result<Vec<_>, _>>()
            .map_err(|_| AoiError::Malformed(s.to_string()))?;
        match parts.as_slice() {
            [x, y, w, h] => AreaOfInterest::new(*x, *y, *w, *h),
            _ => Err(AoiError::Malformed(s.to_string())),
        }
    }
}

/// Opaque backend reference to a located element.
#[cfg_attr(feature = "serde-full", derive(serde::Serialize, serde::Deserialize))]
#[derive(Clone, Debug, Eq, PartialEq, Hash)]
pub struct ElementHandle(pub String);

impl fmt::Display for ElementHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Concrete, actionable location of an element.
#[cfg_attr(feature = "serde-full", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde-full", serde(rename_all = "snake_case"))]
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum LocateValue {
    Coordinates(Point),
    Handle(ElementHandle),
}

impl LocateValue {
    pub fn coordinates(&self) -> Option<Point> {
        match self {
            LocateValue::Coordinates(point) => Some(*point),
            LocateValue::Handle(_) => None,
        }
    }

    /// Shift coordinates by a region origin; handles are left untouched.
    pub fn offset_by(self, origin: Point) -> LocateValue {
        match self {
            LocateValue::Coordinates(point) => LocateValue::Coordinates(point.offset_by(origin)),
            handle => handle,
        }
    }
}

impl fmt::Display for LocateValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LocateValue::Coordinates(point) => write!(f, "coordinates {}", point),
            LocateValue::Handle(handle) => write!(f, "handle {}", handle),
        }
    }
}

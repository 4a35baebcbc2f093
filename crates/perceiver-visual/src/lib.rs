//! Visual Perceiver - Snapshots, regions and vision backends for SoulHeal
//!
//! This crate provides visual perception capabilities including:
//! - Screen snapshots and Area-of-Interest cropping
//! - Text detection backends and target text matching
//! - Template matching backends and the project template store
//! - OCR via Tesseract (optional feature)

pub mod errors;
pub mod models;
pub mod text;
pub mod visual;

#[cfg(feature = "ocr")]
pub mod ocr;

pub mod cache;
pub mod matcher;
pub mod template;

// Re-exports
pub use errors::VisualError;
pub use models::*;
pub use text::{match_text, normalize_text, parse_tsv};
pub use visual::{TemplateMatcher, TextDetector};

#[cfg(feature = "ocr")]
pub use ocr::OcrEngine;

pub use cache::TemplateCache;
pub use matcher::{ImageprocMatcher, DEFAULT_MATCH_THRESHOLD};
pub use template::{DirTemplateStore, MemoryTemplateStore, TemplateStore};

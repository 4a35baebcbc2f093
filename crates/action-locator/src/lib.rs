//! Locator & Self-heal - Multi-strategy element resolution
//!
//! This crate implements the self-healing element location engine with:
//! - Structural path lookup (primary strategy for path targets)
//! - Direct text lookup and OCR fallback for text labels
//! - Image template matching for image targets
//! - Fallback groups of interchangeable backend instances
//! - Parameter-level fallback over candidate value lists
//! - Per-attempt execution tracing

pub mod errors;
pub mod fallback;
pub mod healer;
pub mod manager;
pub mod params;
pub mod registry;
pub mod snapshot;
pub mod source;
pub mod strategies;
pub mod tracer;
pub mod types;

pub use errors::*;
pub use fallback::*;
pub use healer::*;
pub use manager::*;
pub use params::*;
pub use registry::*;
pub use snapshot::CycleSnapshot;
pub use source::*;
pub use strategies::*;
pub use tracer::*;
pub use types::*;

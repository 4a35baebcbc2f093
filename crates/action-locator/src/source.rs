//! Element source port
//!
//! An element source is the automation backend driving the application under
//! test. Every operation besides `capabilities` is optional; a backend declares
//! what it supports and the registry only activates techniques it can serve.

use crate::types::PresenceRule;
use async_trait::async_trait;
use image::DynamicImage;
use serde::Serialize;
use soulheal_core_types::{Classification, LocateValue, Target};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

/// Element source error
#[derive(Debug, Error, Clone)]
pub enum SourceError {
    #[error("operation '{0}' is not supported by this source")]
    Unsupported(&'static str),

    #[error("target not found: {0}")]
    NotFound(String),

    #[error("backend error: {0}")]
    Backend(String),

    #[error("backend timed out: {0}")]
    Timeout(String),

    #[error("all {} source instance(s) failed", .0.len())]
    AllInstancesFailed(Vec<(usize, SourceError)>),
}

impl SourceError {
    /// True when the source answered but the target was absent.
    pub fn is_not_found(&self) -> bool {
        match self {
            SourceError::NotFound(_) => true,
            SourceError::AllInstancesFailed(failures) => {
                !failures.is_empty() && failures.iter().all(|(_, err)| err.is_not_found())
            }
            _ => false,
        }
    }
}

/// Optional operations an element source declares
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct SourceCapabilities {
    pub capture: bool,
    pub page_source: bool,
    pub structural_lookup: bool,
    pub text_lookup: bool,
    pub presence: bool,
}

impl SourceCapabilities {
    pub fn union(self, other: SourceCapabilities) -> SourceCapabilities {
        SourceCapabilities {
            capture: self.capture || other.capture,
            page_source: self.page_source || other.page_source,
            structural_lookup: self.structural_lookup || other.structural_lookup,
            text_lookup: self.text_lookup || other.text_lookup,
            presence: self.presence || other.presence,
        }
    }

    /// Whether `locate` can serve targets of this classification
    pub fn can_locate(&self, classification: Classification) -> bool {
        match classification {
            Classification::StructuralPath => self.structural_lookup,
            Classification::TextLabel => self.text_lookup,
            Classification::ImageTemplate => false,
        }
    }
}

/// Automation backend port
#[async_trait]
pub trait ElementSource: Send + Sync {
    /// Backend identifier used in logs
    fn name(&self) -> &str;

    fn capabilities(&self) -> SourceCapabilities;

    /// Full-screen screenshot
    async fn capture(&self) -> Result<DynamicImage, SourceError> {
        Err(SourceError::Unsupported("capture"))
    }

    /// Textual dump of the current UI hierarchy
    async fn page_source(&self) -> Result<String, SourceError> {
        Err(SourceError::Unsupported("page_source"))
    }

    /// Native lookup of a structural path or text label.
    ///
    /// `Ok(None)` means the backend looked and found nothing.
    async fn locate(
        &self,
        _target: &Target,
        _index: usize,
    ) -> Result<Option<LocateValue>, SourceError> {
        Err(SourceError::Unsupported("locate"))
    }

    /// Native presence assertion waiting up to `timeout`
    async fn assert_presence(
        &self,
        _targets: &[Target],
        _timeout: Duration,
        _rule: PresenceRule,
    ) -> Result<bool, SourceError> {
        Err(SourceError::Unsupported("assert_presence"))
    }
}

/// Source serving one fixed frame and an optional page source.
///
/// Used for offline resolution against saved screenshots.
pub struct StaticFrameSource {
    name: String,
    frame: Arc<DynamicImage>,
    page_source: Option<String>,
}

impl StaticFrameSource {
    pub fn new(frame: DynamicImage) -> Self {
        Self {
            name: "static-frame".to_string(),
            frame: Arc::new(frame),
            page_source: None,
        }
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    pub fn with_page_source(mut self, page_source: impl Into<String>) -> Self {
        self.page_source = Some(page_source.into());
        self
    }

    pub fn frame(&self) -> &DynamicImage {
        &self.frame
    }
}

#[async_trait]
impl ElementSource for StaticFrameSource {
    fn name(&self) -> &str {
        &self.name
    }

    fn capabilities(&self) -> SourceCapabilities {
        SourceCapabilities {
            capture: true,
            page_source: self.page_source.is_some(),
            ..SourceCapabilities::default()
        }
    }

    async fn capture(&self) -> Result<DynamicImage, SourceError> {
        Ok(self.frame.as_ref().clone())
    }

    async fn page_source(&self) -> Result<String, SourceError> {
        self.page_source
            .clone()
            .ok_or(SourceError::Unsupported("page_source"))
    }
}

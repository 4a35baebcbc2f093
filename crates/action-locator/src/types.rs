//! Core types for locator system

use crate::{errors::LocatorError, source::SourceCapabilities};
use serde::{Deserialize, Serialize};
use soulheal_core_types::{AreaOfInterest, Classification, LocateValue, Target};
use std::fmt;
use std::str::FromStr;
use std::time::Duration;

/// Location technique enumeration
///
/// Defines the four techniques in priority order:
/// - StructuralLocator: backend structural lookup (XPath-like paths)
/// - DirectText: backend native text lookup
/// - OcrText: text detection on a screen snapshot
/// - ImageTemplate: template matching on a screen snapshot
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Technique {
    #[serde(rename = "structural-locator")]
    StructuralLocator,
    #[serde(rename = "direct-text-locator")]
    DirectText,
    #[serde(rename = "ocr-text-detection")]
    OcrText,
    #[serde(rename = "image-template-matching")]
    ImageTemplate,
}

impl Technique {
    pub const ALL: [Technique; 4] = [
        Technique::StructuralLocator,
        Technique::DirectText,
        Technique::OcrText,
        Technique::ImageTemplate,
    ];

    /// Get technique name as string
    pub fn name(&self) -> &'static str {
        match self {
            Technique::StructuralLocator => "structural-locator",
            Technique::DirectText => "direct-text-locator",
            Technique::OcrText => "ocr-text-detection",
            Technique::ImageTemplate => "image-template-matching",
        }
    }

    /// Vision techniques operate on pixels and honour the area of interest
    pub fn is_vision(&self) -> bool {
        matches!(self, Technique::OcrText | Technique::ImageTemplate)
    }
}

impl fmt::Display for Technique {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Technique {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim().to_ascii_lowercase();
        Technique::ALL
            .into_iter()
            .find(|t| {
                t.name() == wanted || t.name().split('-').next() == Some(wanted.as_str())
            })
            .ok_or_else(|| format!("unknown technique '{}'", s))
    }
}

/// Optional backend operation a strategy may depend on
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Capability {
    Capture,
    StructuralLookup,
    TextLookup,
    TextDetection,
    TemplateMatching,
}

impl Capability {
    pub fn name(&self) -> &'static str {
        match self {
            Capability::Capture => "capture",
            Capability::StructuralLookup => "structural_lookup",
            Capability::TextLookup => "text_lookup",
            Capability::TextDetection => "text_detection",
            Capability::TemplateMatching => "template_matching",
        }
    }
}

/// Capabilities declared by the backends of one session
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct BackendCapabilities {
    pub source: SourceCapabilities,
    pub text_detection: bool,
    pub template_matching: bool,
}

impl BackendCapabilities {
    pub fn has(&self, capability: Capability) -> bool {
        match capability {
            Capability::Capture => self.source.capture,
            Capability::StructuralLookup => self.source.structural_lookup,
            Capability::TextLookup => self.source.text_lookup,
            Capability::TextDetection => self.text_detection,
            Capability::TemplateMatching => self.template_matching,
        }
    }
}

/// Static description of a technique: priority, target class, requirements
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StrategySpec {
    pub technique: Technique,

    /// Lower is tried first
    pub priority: u8,

    pub classification: Classification,
    pub requires: &'static [Capability],
}

/// Every technique the engine knows, in priority order
pub const STRATEGY_SPECS: [StrategySpec; 4] = [
    StrategySpec {
        technique: Technique::StructuralLocator,
        priority: 1,
        classification: Classification::StructuralPath,
        requires: &[Capability::StructuralLookup],
    },
    StrategySpec {
        technique: Technique::DirectText,
        priority: 2,
        classification: Classification::TextLabel,
        requires: &[Capability::TextLookup],
    },
    StrategySpec {
        technique: Technique::OcrText,
        priority: 3,
        classification: Classification::TextLabel,
        requires: &[Capability::Capture, Capability::TextDetection],
    },
    StrategySpec {
        technique: Technique::ImageTemplate,
        priority: 4,
        classification: Classification::ImageTemplate,
        requires: &[Capability::Capture, Capability::TemplateMatching],
    },
];

impl StrategySpec {
    pub fn of(technique: Technique) -> &'static StrategySpec {
        match technique {
            Technique::StructuralLocator => &STRATEGY_SPECS[0],
            Technique::DirectText => &STRATEGY_SPECS[1],
            Technique::OcrText => &STRATEGY_SPECS[2],
            Technique::ImageTemplate => &STRATEGY_SPECS[3],
        }
    }

    /// Required capabilities the backends do not declare
    pub fn missing(&self, capabilities: &BackendCapabilities) -> Vec<Capability> {
        self.requires
            .iter()
            .copied()
            .filter(|c| !capabilities.has(*c))
            .collect()
    }

    pub fn supports(&self, classification: Classification, capabilities: &BackendCapabilities) -> bool {
        self.classification == classification && self.missing(capabilities).is_empty()
    }
}

/// Successful location plus the technique that produced it
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LocateResult {
    pub value: LocateValue,
    pub technique: Technique,
}

impl LocateResult {
    pub fn new(value: LocateValue, technique: Technique) -> Self {
        Self { value, technique }
    }
}

/// Per-call resolution input
#[derive(Debug, Clone)]
pub struct ResolveRequest {
    pub target: Target,

    /// Pick the n-th match when duplicates exist
    pub index: usize,

    pub aoi: AreaOfInterest,
}

impl ResolveRequest {
    pub fn new(raw: &str) -> Result<Self, LocatorError> {
        let target = Target::new(raw).map_err(|e| LocatorError::InvalidTarget(e.to_string()))?;
        Ok(Self::for_target(target))
    }

    pub fn for_target(target: Target) -> Self {
        Self {
            target,
            index: 0,
            aoi: AreaOfInterest::FULL,
        }
    }

    pub fn with_index(mut self, index: usize) -> Self {
        self.index = index;
        self
    }

    pub fn with_aoi(mut self, aoi: AreaOfInterest) -> Self {
        self.aoi = aoi;
        self
    }

    /// Validate raw percentages at call time
    pub fn with_area(self, x: f64, y: f64, width: f64, height: f64) -> Result<Self, LocatorError> {
        Ok(self.with_aoi(AreaOfInterest::new(x, y, width, height)?))
    }
}

/// How several presence targets combine
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PresenceRule {
    #[default]
    Any,
    All,
}

impl PresenceRule {
    pub fn satisfied(&self, matched: usize, total: usize) -> bool {
        match self {
            PresenceRule::Any => matched > 0,
            PresenceRule::All => matched == total,
        }
    }
}

impl FromStr for PresenceRule {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "any" => Ok(PresenceRule::Any),
            "all" => Ok(PresenceRule::All),
            other => Err(format!("unknown presence rule '{}'", other)),
        }
    }
}

/// Outcome and evidence of a presence assertion
#[derive(Debug, Clone, Default, Serialize)]
pub struct PresenceReport {
    pub present: bool,

    /// Techniques that produced the verdict, in the order they ran
    pub techniques: Vec<Technique>,

    pub matched: Vec<String>,
    pub missing: Vec<String>,

    #[serde(rename = "elapsed_ms", serialize_with = "crate::tracer::serialize_millis")]
    pub elapsed: Duration,
}

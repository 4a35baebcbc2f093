//! Strategy registry
//!
//! Built once per session from the backends' declared capabilities. For each
//! target classification it holds an ordered plan: every technique of that
//! classification, either active or skipped with a reason.

use crate::fallback::FallbackGroup;
use crate::source::ElementSource;
use crate::strategies::*;
use crate::types::*;
use perceiver_visual::{TemplateMatcher, TextDetector};
use soulheal_core_types::Classification;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};

/// Tunables applied when strategies are constructed
#[derive(Debug, Clone, PartialEq)]
pub struct StrategySettings {
    pub ocr_min_confidence: f32,
    pub presence_poll_interval: Duration,

    /// Techniques turned off regardless of capabilities
    pub disabled: Vec<Technique>,
}

impl Default for StrategySettings {
    fn default() -> Self {
        Self {
            ocr_min_confidence: DEFAULT_OCR_MIN_CONFIDENCE,
            presence_poll_interval: DEFAULT_POLL_INTERVAL,
            disabled: Vec::new(),
        }
    }
}

/// Backends available to one session
#[derive(Clone)]
pub struct SessionBackends {
    source: Arc<dyn ElementSource>,
    text_detector: Option<Arc<dyn TextDetector>>,
    template_matcher: Option<Arc<dyn TemplateMatcher>>,
    settings: StrategySettings,
}

impl SessionBackends {
    pub fn new(sources: FallbackGroup<dyn ElementSource>) -> Self {
        Self::from_source(Arc::new(sources))
    }

    pub fn from_source(source: Arc<dyn ElementSource>) -> Self {
        Self {
            source,
            text_detector: None,
            template_matcher: None,
            settings: StrategySettings::default(),
        }
    }

    pub fn with_text_detectors(mut self, detectors: FallbackGroup<dyn TextDetector>) -> Self {
        self.text_detector = Some(Arc::new(detectors));
        self
    }

    pub fn with_template_matchers(mut self, matchers: FallbackGroup<dyn TemplateMatcher>) -> Self {
        self.template_matcher = Some(Arc::new(matchers));
        self
    }

    pub fn with_settings(mut self, settings: StrategySettings) -> Self {
        self.settings = settings;
        self
    }

    pub fn source(&self) -> &Arc<dyn ElementSource> {
        &self.source
    }

    pub fn settings(&self) -> &StrategySettings {
        &self.settings
    }

    pub fn capabilities(&self) -> BackendCapabilities {
        BackendCapabilities {
            source: self.source.capabilities(),
            text_detection: self.text_detector.is_some(),
            template_matching: self.template_matcher.is_some(),
        }
    }

    fn build(&self, technique: Technique) -> Option<Arc<dyn Strategy>> {
        let source = Arc::clone(&self.source);
        let poll = self.settings.presence_poll_interval;
        let strategy: Arc<dyn Strategy> = match technique {
            Technique::StructuralLocator => {
                Arc::new(StructuralStrategy::new(source).with_poll_interval(poll))
            }
            Technique::DirectText => Arc::new(DirectTextStrategy::new(source).with_poll_interval(poll)),
            Technique::OcrText => Arc::new(
                OcrTextStrategy::new(source, Arc::clone(self.text_detector.as_ref()?))
                    .with_min_confidence(self.settings.ocr_min_confidence)
                    .with_poll_interval(poll),
            ),
            Technique::ImageTemplate => Arc::new(
                ImageTemplateStrategy::new(source, Arc::clone(self.template_matcher.as_ref()?))
                    .with_poll_interval(poll),
            ),
        };
        Some(strategy)
    }
}

/// One step of a classification's plan
#[derive(Clone)]
pub enum PlanEntry {
    Active(Arc<dyn Strategy>),
    Skipped {
        spec: &'static StrategySpec,
        reason: String,
    },
}

impl PlanEntry {
    pub fn technique(&self) -> Technique {
        match self {
            PlanEntry::Active(strategy) => strategy.technique(),
            PlanEntry::Skipped { spec, .. } => spec.technique,
        }
    }

    pub fn is_active(&self) -> bool {
        matches!(self, PlanEntry::Active(_))
    }

    pub fn skip_reason(&self) -> Option<&str> {
        match self {
            PlanEntry::Active(_) => None,
            PlanEntry::Skipped { reason, .. } => Some(reason),
        }
    }
}

impl std::fmt::Debug for PlanEntry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PlanEntry::Active(strategy) => write!(f, "Active({})", strategy.name()),
            PlanEntry::Skipped { spec, reason } => {
                write!(f, "Skipped({}: {})", spec.technique, reason)
            }
        }
    }
}

/// Per-session plans keyed by classification
pub struct StrategyRegistry {
    plans: HashMap<Classification, Vec<PlanEntry>>,
    capabilities: BackendCapabilities,
}

impl StrategyRegistry {
    pub fn build(backends: &SessionBackends) -> Self {
        let capabilities = backends.capabilities();
        let mut specs: Vec<&'static StrategySpec> = STRATEGY_SPECS.iter().collect();
        specs.sort_by_key(|spec| spec.priority);

        let mut plans: HashMap<Classification, Vec<PlanEntry>> = Classification::ALL
            .iter()
            .map(|c| (*c, Vec::new()))
            .collect();

        for spec in specs {
            let entry = if backends.settings.disabled.contains(&spec.technique) {
                PlanEntry::Skipped {
                    spec,
                    reason: "disabled by configuration".to_string(),
                }
            } else {
                let missing = spec.missing(&capabilities);
                if !missing.is_empty() {
                    let names: Vec<&str> = missing.iter().map(Capability::name).collect();
                    PlanEntry::Skipped {
                        spec,
                        reason: format!("missing capability: {}", names.join(", ")),
                    }
                } else {
                    match backends.build(spec.technique) {
                        Some(strategy) => PlanEntry::Active(strategy),
                        None => PlanEntry::Skipped {
                            spec,
                            reason: "backend unavailable".to_string(),
                        },
                    }
                }
            };
            debug!(technique = %spec.technique, plan = ?entry, "strategy registered");
            plans.entry(spec.classification).or_default().push(entry);
        }

        let active = plans.values().flatten().filter(|e| e.is_active()).count();
        info!(active, capabilities = ?capabilities, "strategy registry built");
        Self { plans, capabilities }
    }

    pub fn capabilities(&self) -> BackendCapabilities {
        self.capabilities
    }

    /// Ordered plan for a classification, including skipped entries
    pub fn plan(&self, classification: Classification) -> &[PlanEntry] {
        self.plans
            .get(&classification)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    pub fn active(&self, classification: Classification) -> impl Iterator<Item = &Arc<dyn Strategy>> {
        self.plan(classification).iter().filter_map(|entry| match entry {
            PlanEntry::Active(strategy) => Some(strategy),
            PlanEntry::Skipped { .. } => None,
        })
    }

    pub fn has_active(&self, classification: Classification) -> bool {
        self.active(classification).next().is_some()
    }
}

//! Element location strategies
//!
//! Four strategies in priority order:
//! 1. Structural - backend structural lookup of path targets
//! 2. DirectText - backend native text lookup
//! 3. OcrText - text detection on the cycle snapshot
//! 4. ImageTemplate - template matching on the cycle snapshot
//!
//! Vision strategies work on the area-of-interest region and report
//! region-local coordinates; the manager maps them back to the screen.

use crate::{errors::LocatorError, source::ElementSource, types::*};
use async_trait::async_trait;
use image::DynamicImage;
use perceiver_visual::{match_text, Region, TemplateMatcher, TextDetector};
use soulheal_core_types::{Classification, LocateValue, Target};
use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::debug;

/// Default interval between presence probes
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(250);

/// Default minimum OCR confidence for a block to count
pub const DEFAULT_OCR_MIN_CONFIDENCE: f32 = 0.6;

/// Input of one strategy attempt
pub struct LocateRequest<'a> {
    pub target: &'a Target,
    pub index: usize,

    /// Cycle region; always present for vision strategies
    pub region: Option<&'a Region>,
}

/// Strategy trait for element location
#[async_trait]
pub trait Strategy: Send + Sync {
    /// Get technique type
    fn technique(&self) -> Technique;

    /// Get technique name
    fn name(&self) -> &'static str {
        self.technique().name()
    }

    fn spec(&self) -> &'static StrategySpec {
        StrategySpec::of(self.technique())
    }

    /// Locate the `index`-th match of the target.
    ///
    /// `Ok(None)` means the technique ran and found nothing.
    async fn locate(&self, request: &LocateRequest<'_>) -> Result<Option<LocateValue>, LocatorError>;

    /// Wait up to `timeout` for the targets to satisfy `rule`
    async fn assert_presence(
        &self,
        targets: &[Target],
        timeout: Duration,
        rule: PresenceRule,
    ) -> Result<PresenceReport, LocatorError>;
}

/// Static applicability check shared by every strategy type
pub trait StaticSpec {
    const TECHNIQUE: Technique;

    fn supports(classification: Classification, capabilities: &BackendCapabilities) -> bool {
        StrategySpec::of(Self::TECHNIQUE).supports(classification, capabilities)
    }
}

/// Probe the targets until `rule` holds or the deadline passes.
///
/// At least one probe always runs, even with a zero timeout.
async fn poll_presence<F, Fut>(
    technique: Technique,
    targets: &[Target],
    timeout: Duration,
    rule: PresenceRule,
    poll_interval: Duration,
    mut probe: F,
) -> Result<PresenceReport, LocatorError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<Vec<bool>, LocatorError>>,
{
    let started = Instant::now();
    let mut probes = 0u32;
    loop {
        let found = probe().await?;
        probes += 1;
        let matched = found.iter().filter(|hit| **hit).count();
        let present = rule.satisfied(matched, targets.len());
        let elapsed = started.elapsed();
        if present || elapsed >= timeout {
            debug!(technique = %technique, present, probes, "presence evaluated");
            let (matched, missing): (Vec<_>, Vec<_>) = targets
                .iter()
                .zip(found.iter().chain(std::iter::repeat(&false)))
                .partition(|(_, hit)| **hit);
            return Ok(PresenceReport {
                present,
                techniques: vec![technique],
                matched: matched.into_iter().map(|(t, _)| t.raw().to_string()).collect(),
                missing: missing.into_iter().map(|(t, _)| t.raw().to_string()).collect(),
                elapsed,
            });
        }
        tokio::time::sleep(poll_interval.min(timeout - elapsed)).await;
    }
}

/// Shared body of the two backend-native strategies
async fn native_presence(
    technique: Technique,
    source: &dyn ElementSource,
    targets: &[Target],
    timeout: Duration,
    rule: PresenceRule,
    poll_interval: Duration,
) -> Result<PresenceReport, LocatorError> {
    if source.capabilities().presence {
        let started = Instant::now();
        let present = source
            .assert_presence(targets, timeout, rule)
            .await
            .map_err(|e| LocatorError::strategy(technique, e))?;
        let all: Vec<String> = targets.iter().map(|t| t.raw().to_string()).collect();
        // The backend reports one verdict; per-target evidence is only known
        // when the verdict covers every target.
        let (matched, missing) = match (present, rule) {
            (true, PresenceRule::All) => (all, Vec::new()),
            (false, PresenceRule::Any) => (Vec::new(), all),
            _ => (Vec::new(), Vec::new()),
        };
        return Ok(PresenceReport {
            present,
            techniques: vec![technique],
            matched,
            missing,
            elapsed: started.elapsed(),
        });
    }

    poll_presence(technique, targets, timeout, rule, poll_interval, move || async move {
        let mut found = Vec::with_capacity(targets.len());
        for target in targets {
            let hit = source
                .locate(target, 0)
                .await
                .map_err(|e| LocatorError::strategy(technique, e))?;
            found.push(hit.is_some());
        }
        Ok(found)
    })
    .await
}

/// Structural path strategy
pub struct StructuralStrategy {
    source: Arc<dyn ElementSource>,
    poll_interval: Duration,
}

impl StructuralStrategy {
    pub fn new(source: Arc<dyn ElementSource>) -> Self {
        Self {
            source,
            poll_interval: DEFAULT_POLL_INTERVAL,
        }
    }

    pub fn with_poll_interval(mut self, poll_interval: Duration) -> Self {
        self.poll_interval = poll_interval;
        self
    }
}

impl StaticSpec for StructuralStrategy {
    const TECHNIQUE: Technique = Technique::StructuralLocator;
}

#[async_trait]
impl Strategy for StructuralStrategy {
    fn technique(&self) -> Technique {
        Self::TECHNIQUE
    }

    async fn locate(&self, request: &LocateRequest<'_>) -> Result<Option<LocateValue>, LocatorError> {
        debug!(path = request.target.query(), index = request.index, "structural lookup");
        self.source
            .locate(request.target, request.index)
            .await
            .map_err(|e| LocatorError::strategy(Self::TECHNIQUE, e))
    }

    async fn assert_presence(
        &self,
        targets: &[Target],
        timeout: Duration,
        rule: PresenceRule,
    ) -> Result<PresenceReport, LocatorError> {
        native_presence(Self::TECHNIQUE, self.source.as_ref(), targets, timeout, rule, self.poll_interval)
            .await
    }
}

/// Backend native text lookup strategy
pub struct DirectTextStrategy {
    source: Arc<dyn ElementSource>,
    poll_interval: Duration,
}

impl DirectTextStrategy {
    pub fn new(source: Arc<dyn ElementSource>) -> Self {
        Self {
            source,
            poll_interval: DEFAULT_POLL_INTERVAL,
        }
    }

    pub fn with_poll_interval(mut self, poll_interval: Duration) -> Self {
        self.poll_interval = poll_interval;
        self
    }
}

impl StaticSpec for DirectTextStrategy {
    const TECHNIQUE: Technique = Technique::DirectText;
}

#[async_trait]
impl Strategy for DirectTextStrategy {
    fn technique(&self) -> Technique {
        Self::TECHNIQUE
    }

    async fn locate(&self, request: &LocateRequest<'_>) -> Result<Option<LocateValue>, LocatorError> {
        debug!(text = request.target.raw(), index = request.index, "direct text lookup");
        self.source
            .locate(request.target, request.index)
            .await
            .map_err(|e| LocatorError::strategy(Self::TECHNIQUE, e))
    }

    async fn assert_presence(
        &self,
        targets: &[Target],
        timeout: Duration,
        rule: PresenceRule,
    ) -> Result<PresenceReport, LocatorError> {
        native_presence(Self::TECHNIQUE, self.source.as_ref(), targets, timeout, rule, self.poll_interval)
            .await
    }
}

fn region_of<'a>(technique: Technique, request: &LocateRequest<'a>) -> Result<&'a Region, LocatorError> {
    request
        .region
        .ok_or_else(|| LocatorError::strategy(technique, "no snapshot region for this cycle"))
}

async fn capture_frame(technique: Technique, source: &dyn ElementSource) -> Result<DynamicImage, LocatorError> {
    source
        .capture()
        .await
        .map_err(|e| LocatorError::strategy(technique, format!("capture failed: {}", e)))
}

/// OCR text detection strategy
pub struct OcrTextStrategy {
    source: Arc<dyn ElementSource>,
    detector: Arc<dyn TextDetector>,
    min_confidence: f32,
    poll_interval: Duration,
}

impl OcrTextStrategy {
    pub fn new(source: Arc<dyn ElementSource>, detector: Arc<dyn TextDetector>) -> Self {
        Self {
            source,
            detector,
            min_confidence: DEFAULT_OCR_MIN_CONFIDENCE,
            poll_interval: DEFAULT_POLL_INTERVAL,
        }
    }

    pub fn with_min_confidence(mut self, min_confidence: f32) -> Self {
        self.min_confidence = min_confidence.clamp(0.0, 1.0);
        self
    }

    pub fn with_poll_interval(mut self, poll_interval: Duration) -> Self {
        self.poll_interval = poll_interval;
        self
    }
}

impl StaticSpec for OcrTextStrategy {
    const TECHNIQUE: Technique = Technique::OcrText;
}

#[async_trait]
impl Strategy for OcrTextStrategy {
    fn technique(&self) -> Technique {
        Self::TECHNIQUE
    }

    async fn locate(&self, request: &LocateRequest<'_>) -> Result<Option<LocateValue>, LocatorError> {
        let region = region_of(Self::TECHNIQUE, request)?;
        let blocks = match self.detector.detect_text(&region.image).await {
            Ok(blocks) => blocks,
            Err(err) if err.is_no_match() => return Ok(None),
            Err(err) => return Err(LocatorError::strategy(Self::TECHNIQUE, err)),
        };
        let hits = match_text(&blocks, request.target.raw(), self.min_confidence);
        debug!(
            text = request.target.raw(),
            blocks = blocks.len(),
            hits = hits.len(),
            index = request.index,
            "ocr text matched"
        );
        Ok(hits
            .get(request.index)
            .map(|block| LocateValue::Coordinates(block.bounds.center())))
    }

    async fn assert_presence(
        &self,
        targets: &[Target],
        timeout: Duration,
        rule: PresenceRule,
    ) -> Result<PresenceReport, LocatorError> {
        poll_presence(Self::TECHNIQUE, targets, timeout, rule, self.poll_interval, move || async move {
            let frame = capture_frame(Self::TECHNIQUE, self.source.as_ref()).await?;
            let blocks = match self.detector.detect_text(&frame).await {
                Ok(blocks) => blocks,
                Err(err) if err.is_no_match() => Vec::new(),
                Err(err) => return Err(LocatorError::strategy(Self::TECHNIQUE, err)),
            };
            Ok(targets
                .iter()
                .map(|t| !match_text(&blocks, t.raw(), self.min_confidence).is_empty())
                .collect())
        })
        .await
    }
}

/// Image template matching strategy
pub struct ImageTemplateStrategy {
    source: Arc<dyn ElementSource>,
    matcher: Arc<dyn TemplateMatcher>,
    poll_interval: Duration,
}

impl ImageTemplateStrategy {
    pub fn new(source: Arc<dyn ElementSource>, matcher: Arc<dyn TemplateMatcher>) -> Self {
        Self {
            source,
            matcher,
            poll_interval: DEFAULT_POLL_INTERVAL,
        }
    }

    pub fn with_poll_interval(mut self, poll_interval: Duration) -> Self {
        self.poll_interval = poll_interval;
        self
    }

    /// n-th hit in reading order; index 0 is the top-left-most hit, not the best-scoring one
    async fn nth_match(
        &self,
        image: &DynamicImage,
        template_id: &str,
        index: usize,
    ) -> Result<Option<LocateValue>, LocatorError> {
        match self.matcher.find_all(image, template_id).await {
            Ok(mut hits) => {
                hits.retain(|h| h.found);
                hits.sort_by(|a, b| a.bounds.reading_order(&b.bounds));
                Ok(hits.get(index).map(|h| LocateValue::Coordinates(h.center)))
            }
            Err(err) if err.is_no_match() => Ok(None),
            Err(err) => Err(LocatorError::strategy(Self::TECHNIQUE, err)),
        }
    }
}

impl StaticSpec for ImageTemplateStrategy {
    const TECHNIQUE: Technique = Technique::ImageTemplate;
}

#[async_trait]
impl Strategy for ImageTemplateStrategy {
    fn technique(&self) -> Technique {
        Self::TECHNIQUE
    }

    async fn locate(&self, request: &LocateRequest<'_>) -> Result<Option<LocateValue>, LocatorError> {
        let region = region_of(Self::TECHNIQUE, request)?;
        debug!(template = request.target.raw(), index = request.index, "template lookup");
        self.nth_match(&region.image, request.target.raw(), request.index)
            .await
    }

    async fn assert_presence(
        &self,
        targets: &[Target],
        timeout: Duration,
        rule: PresenceRule,
    ) -> Result<PresenceReport, LocatorError> {
        poll_presence(Self::TECHNIQUE, targets, timeout, rule, self.poll_interval, move || async move {
            let frame = capture_frame(Self::TECHNIQUE, self.source.as_ref()).await?;
            let mut found = Vec::with_capacity(targets.len());
            for target in targets {
                found.push(self.nth_match(&frame, target.raw(), 0).await?.is_some());
            }
            Ok(found)
        })
        .await
    }
}

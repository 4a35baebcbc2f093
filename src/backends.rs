//! Backend table: maps configured backend ids to constructors
//!
//! Every fallback group in the configuration is a list of `{backend, options}`
//! entries. The table resolves each id once at startup and builds the group in
//! the configured order.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use action_locator::{ElementSource, FallbackGroup, SessionBackends, StaticFrameSource};
use anyhow::{anyhow, bail, Context, Result};
use perceiver_visual::{DirTemplateStore, ImageprocMatcher, TemplateMatcher, TextDetector};
use tracing::{debug, info};

use crate::config::{BackendConfig, SoulHealConfig};

/// Values shared by every constructor
#[derive(Debug, Clone)]
pub struct BackendContext {
    pub template_dir: PathBuf,
    pub template_threshold: f32,

    /// `--screen` override for static-frame sources
    pub screen: Option<PathBuf>,
}

impl BackendContext {
    pub fn from_config(config: &SoulHealConfig) -> Self {
        Self {
            template_dir: config.template_dir.clone(),
            template_threshold: config.template_threshold,
            screen: None,
        }
    }

    pub fn with_screen(mut self, screen: Option<PathBuf>) -> Self {
        self.screen = screen;
        self
    }
}

pub type SourceCtor = fn(&BackendConfig, &BackendContext) -> Result<Arc<dyn ElementSource>>;
pub type DetectorCtor = fn(&BackendConfig, &BackendContext) -> Result<Arc<dyn TextDetector>>;
pub type MatcherCtor = fn(&BackendConfig, &BackendContext) -> Result<Arc<dyn TemplateMatcher>>;

#[derive(Default)]
pub struct BackendTable {
    sources: BTreeMap<&'static str, SourceCtor>,
    detectors: BTreeMap<&'static str, DetectorCtor>,
    matchers: BTreeMap<&'static str, MatcherCtor>,
}

impl BackendTable {
    pub fn empty() -> Self {
        Self::default()
    }

    /// Built-in backends compiled into this binary
    pub fn builtin() -> Self {
        let table = Self::empty()
            .register_source("static-frame", static_frame)
            .register_matcher("imageproc", imageproc_matcher);

        #[cfg(feature = "ocr")]
        let table = table.register_detector("tesseract", tesseract_detector);

        table
    }

    pub fn register_source(mut self, id: &'static str, ctor: SourceCtor) -> Self {
        self.sources.insert(id, ctor);
        self
    }

    pub fn register_detector(mut self, id: &'static str, ctor: DetectorCtor) -> Self {
        self.detectors.insert(id, ctor);
        self
    }

    pub fn register_matcher(mut self, id: &'static str, ctor: MatcherCtor) -> Self {
        self.matchers.insert(id, ctor);
        self
    }

    pub fn source_ids(&self) -> impl Iterator<Item = &'static str> + '_ {
        self.sources.keys().copied()
    }

    pub fn detector_ids(&self) -> impl Iterator<Item = &'static str> + '_ {
        self.detectors.keys().copied()
    }

    pub fn matcher_ids(&self) -> impl Iterator<Item = &'static str> + '_ {
        self.matchers.keys().copied()
    }

    /// Build the session's fallback groups in configured order
    pub fn build_session(&self, config: &SoulHealConfig, ctx: &BackendContext) -> Result<SessionBackends> {
        let sources = build_group("sources", &config.sources, &self.sources, ctx)?
            .ok_or_else(|| anyhow!("at least one element source must be configured"))?;

        let mut backends = SessionBackends::new(sources);
        if let Some(detectors) = build_group("text_detectors", &config.text_detectors, &self.detectors, ctx)? {
            backends = backends.with_text_detectors(detectors);
        }
        if let Some(matchers) =
            build_group("template_matchers", &config.template_matchers, &self.matchers, ctx)?
        {
            backends = backends.with_template_matchers(matchers);
        }

        let backends = backends.with_settings(config.strategy_settings());
        info!(
            capabilities = ?backends.capabilities(),
            "session backends ready"
        );
        Ok(backends)
    }
}

fn build_group<B: ?Sized + Send + Sync>(
    label: &str,
    entries: &[BackendConfig],
    ctors: &BTreeMap<&'static str, fn(&BackendConfig, &BackendContext) -> Result<Arc<B>>>,
    ctx: &BackendContext,
) -> Result<Option<FallbackGroup<B>>> {
    let mut instances = Vec::with_capacity(entries.len());
    for (idx, entry) in entries.iter().enumerate() {
        let ctor = ctors.get(entry.backend.as_str()).ok_or_else(|| {
            let known: Vec<&str> = ctors.keys().copied().collect();
            anyhow!(
                "unknown backend '{}' in {} (available: {})",
                entry.backend,
                label,
                known.join(", ")
            )
        })?;
        let instance = ctor(entry, ctx)
            .with_context(|| format!("failed to build {}[{}] ({})", label, idx, entry.backend))?;
        debug!(group = label, index = idx, backend = %entry.backend, "backend instance built");
        instances.push(instance);
    }

    if instances.is_empty() {
        return Ok(None);
    }
    Ok(Some(FallbackGroup::new(label, instances)?))
}

fn static_frame(entry: &BackendConfig, ctx: &BackendContext) -> Result<Arc<dyn ElementSource>> {
    let screen = ctx
        .screen
        .clone()
        .or_else(|| entry.option("screen").map(PathBuf::from))
        .context("static-frame source needs a screen image (option 'screen' or --screen)")?;

    let frame = image::open(&screen)
        .with_context(|| format!("failed to open screen image {}", screen.display()))?;
    let mut source = StaticFrameSource::new(frame);

    if let Some(name) = entry.option("name") {
        source = source.with_name(name);
    }
    if let Some(path) = entry.option("page_source") {
        source = source.with_page_source(read_text(Path::new(path))?);
    }
    Ok(Arc::new(source))
}

fn imageproc_matcher(entry: &BackendConfig, ctx: &BackendContext) -> Result<Arc<dyn TemplateMatcher>> {
    let root = entry
        .option("template_dir")
        .map(PathBuf::from)
        .unwrap_or_else(|| ctx.template_dir.clone());
    let threshold = match entry.option("threshold") {
        Some(raw) => raw
            .parse::<f32>()
            .with_context(|| format!("invalid imageproc threshold '{}'", raw))?,
        None => ctx.template_threshold,
    };
    if !(0.0..=1.0).contains(&threshold) {
        bail!("imageproc threshold must be within 0..=1, got {}", threshold);
    }

    let store = Arc::new(DirTemplateStore::new(root));
    Ok(Arc::new(ImageprocMatcher::with_threshold(store, threshold)))
}

#[cfg(feature = "ocr")]
fn tesseract_detector(entry: &BackendConfig, _ctx: &BackendContext) -> Result<Arc<dyn TextDetector>> {
    let mut engine = perceiver_visual::OcrEngine::with_language(entry.option("language").unwrap_or("eng"));
    if let Some(datapath) = entry.option("datapath") {
        engine = engine.with_datapath(datapath);
    }
    Ok(Arc::new(engine))
}

fn read_text(path: &Path) -> Result<String> {
    std::fs::read_to_string(path).with_context(|| format!("failed to read {}", path.display()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{DynamicImage, Rgb, RgbImage};
    use tempfile::TempDir;

    fn write_screen(dir: &TempDir) -> PathBuf {
        let path = dir.path().join("screen.png");
        DynamicImage::ImageRgb8(RgbImage::from_pixel(16, 12, Rgb([200, 200, 200])))
            .save(&path)
            .unwrap();
        path
    }

    #[test]
    fn builds_configured_groups() {
        let dir = TempDir::new().unwrap();
        let screen = write_screen(&dir);
        let page = dir.path().join("page.xml");
        std::fs::write(&page, "<hierarchy/>").unwrap();

        let mut config = SoulHealConfig::default();
        config.text_detectors.clear();
        config.sources = vec![BackendConfig::new("static-frame")
            .with_option("screen", screen.to_string_lossy())
            .with_option("page_source", page.to_string_lossy())];

        let backends = BackendTable::builtin()
            .build_session(&config, &BackendContext::from_config(&config))
            .unwrap();

        let caps = backends.capabilities();
        assert!(caps.source.capture);
        assert!(caps.source.page_source);
        assert!(caps.template_matching);
        assert!(!caps.text_detection);
    }

    #[test]
    fn screen_override_wins() {
        let dir = TempDir::new().unwrap();
        let screen = write_screen(&dir);

        let config = SoulHealConfig::default();
        let ctx = BackendContext::from_config(&config).with_screen(Some(screen));
        assert!(BackendTable::builtin().build_session(&config, &ctx).is_ok());
    }

    #[test]
    fn missing_screen_is_reported() {
        let config = SoulHealConfig::default();
        let err = BackendTable::builtin()
            .build_session(&config, &BackendContext::from_config(&config))
            .err()
            .unwrap();
        assert!(format!("{:#}", err).contains("needs a screen image"));
    }

    #[test]
    fn unknown_backend_lists_alternatives() {
        let mut config = SoulHealConfig::default();
        config.sources = vec![BackendConfig::new("appium")];
        let err = BackendTable::builtin()
            .build_session(&config, &BackendContext::from_config(&config))
            .err()
            .unwrap();
        let message = err.to_string();
        assert!(message.contains("unknown backend 'appium'"));
        assert!(message.contains("static-frame"));
    }

    #[test]
    fn rejects_out_of_range_threshold() {
        let dir = TempDir::new().unwrap();
        let mut config = SoulHealConfig::default();
        config.text_detectors.clear();
        config.template_matchers = vec![BackendConfig::new("imageproc").with_option("threshold", "1.5")];
        let ctx = BackendContext::from_config(&config).with_screen(Some(write_screen(&dir)));
        assert!(BackendTable::builtin().build_session(&config, &ctx).is_err());
    }
}

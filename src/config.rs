//! SoulHeal configuration file model

use action_locator::{StrategySettings, Technique, DEFAULT_OCR_MIN_CONFIDENCE, DEFAULT_POLL_INTERVAL};
use perceiver_visual::DEFAULT_MATCH_THRESHOLD;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::time::Duration;

/// One backend instance of a fallback group
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct BackendConfig {
    /// Backend id registered in the backend table
    pub backend: String,

    #[serde(default)]
    pub options: BTreeMap<String, String>,
}

impl BackendConfig {
    pub fn new(backend: impl Into<String>) -> Self {
        Self {
            backend: backend.into(),
            options: BTreeMap::new(),
        }
    }

    pub fn with_option(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.options.insert(key.into(), value.into());
        self
    }

    pub fn option(&self, key: &str) -> Option<&str> {
        self.options.get(key).map(String::as_str)
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct TraceConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Append attempts as JSON lines to this file
    #[serde(default)]
    pub file: Option<PathBuf>,
}

impl Default for TraceConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            file: None,
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct SoulHealConfig {
    /// Element sources in fallback order
    #[serde(default = "default_sources")]
    pub sources: Vec<BackendConfig>,

    #[serde(default = "default_text_detectors")]
    pub text_detectors: Vec<BackendConfig>,

    #[serde(default = "default_template_matchers")]
    pub template_matchers: Vec<BackendConfig>,

    #[serde(default = "default_template_dir")]
    pub template_dir: PathBuf,

    #[serde(default = "default_ocr_min_confidence")]
    pub ocr_min_confidence: f32,

    #[serde(default = "default_template_threshold")]
    pub template_threshold: f32,

    #[serde(default = "default_poll_interval", with = "humantime_duration")]
    pub presence_poll_interval: Duration,

    #[serde(default)]
    pub disabled_techniques: Vec<Technique>,

    #[serde(default)]
    pub trace: TraceConfig,
}

impl SoulHealConfig {
    pub fn strategy_settings(&self) -> StrategySettings {
        StrategySettings {
            ocr_min_confidence: self.ocr_min_confidence,
            presence_poll_interval: self.presence_poll_interval,
            disabled: self.disabled_techniques.clone(),
        }
    }
}

impl Default for SoulHealConfig {
    fn default() -> Self {
        Self {
            sources: default_sources(),
            text_detectors: default_text_detectors(),
            template_matchers: default_template_matchers(),
            template_dir: default_template_dir(),
            ocr_min_confidence: default_ocr_min_confidence(),
            template_threshold: default_template_threshold(),
            presence_poll_interval: default_poll_interval(),
            disabled_techniques: Vec::new(),
            trace: TraceConfig::default(),
        }
    }
}

fn default_true() -> bool {
    true
}

fn default_sources() -> Vec<BackendConfig> {
    vec![BackendConfig::new("static-frame")]
}

fn default_text_detectors() -> Vec<BackendConfig> {
    if cfg!(feature = "ocr") {
        vec![BackendConfig::new("tesseract")]
    } else {
        Vec::new()
    }
}

fn default_template_matchers() -> Vec<BackendConfig> {
    vec![BackendConfig::new("imageproc")]
}

fn default_template_dir() -> PathBuf {
    PathBuf::from("./templates")
}

fn default_ocr_min_confidence() -> f32 {
    DEFAULT_OCR_MIN_CONFIDENCE
}

fn default_template_threshold() -> f32 {
    DEFAULT_MATCH_THRESHOLD
}

fn default_poll_interval() -> Duration {
    DEFAULT_POLL_INTERVAL
}

mod humantime_duration {
    use serde::{de::Error, Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&humantime::format_duration(*duration).to_string())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        let raw = String::deserialize(deserializer)?;
        humantime::parse_duration(&raw).map_err(D::Error::custom)
    }
}

//! Execution tracing of per-technique attempts
//!
//! Every technique attempt produces one [`Attempt`] record which is handed to
//! each configured [`TraceSink`]. Sinks never fail the caller.

use crate::types::Technique;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::{Serialize, Serializer};
use soulheal_core_types::SessionId;
use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

pub(crate) fn serialize_millis<S: Serializer>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
    serializer.serialize_u64(duration.as_millis() as u64)
}

/// Result of one technique attempt
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum AttemptOutcome {
    Success,
    NotFound,
    Failed { reason: String },
    Skipped { reason: String },
}

impl AttemptOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, AttemptOutcome::Success)
    }

    pub fn label(&self) -> &'static str {
        match self {
            AttemptOutcome::Success => "success",
            AttemptOutcome::NotFound => "not_found",
            AttemptOutcome::Failed { .. } => "failed",
            AttemptOutcome::Skipped { .. } => "skipped",
        }
    }
}

/// Trace record of a technique attempt
#[derive(Debug, Clone, Serialize)]
pub struct Attempt {
    pub session: SessionId,
    pub technique: Technique,
    pub target: String,
    pub outcome: AttemptOutcome,

    #[serde(rename = "duration_ms", serialize_with = "serialize_millis")]
    pub duration: Duration,

    pub timestamp: DateTime<Utc>,
}

impl Attempt {
    pub fn new(
        session: SessionId,
        technique: Technique,
        target: impl Into<String>,
        outcome: AttemptOutcome,
        duration: Duration,
    ) -> Self {
        Self {
            session,
            technique,
            target: target.into(),
            outcome,
            duration,
            timestamp: Utc::now(),
        }
    }
}

/// Destination for attempt records
pub trait TraceSink: Send + Sync {
    fn record(&self, attempt: &Attempt);
}

/// Emits attempts as structured `tracing` events
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingSink;

impl TraceSink for TracingSink {
    fn record(&self, attempt: &Attempt) {
        let duration_ms = attempt.duration.as_millis() as u64;
        match &attempt.outcome {
            AttemptOutcome::Success => info!(
                target: "soulheal::trace",
                session = %attempt.session,
                technique = %attempt.technique,
                target_id = %attempt.target,
                duration_ms,
                "located"
            ),
            AttemptOutcome::NotFound => debug!(
                target: "soulheal::trace",
                session = %attempt.session,
                technique = %attempt.technique,
                target_id = %attempt.target,
                duration_ms,
                "not found"
            ),
            AttemptOutcome::Failed { reason } => debug!(
                target: "soulheal::trace",
                session = %attempt.session,
                technique = %attempt.technique,
                target_id = %attempt.target,
                duration_ms,
                reason = %reason,
                "attempt failed"
            ),
            AttemptOutcome::Skipped { reason } => debug!(
                target: "soulheal::trace",
                session = %attempt.session,
                technique = %attempt.technique,
                target_id = %attempt.target,
                reason = %reason,
                "skipped"
            ),
        }
    }
}

/// Keeps attempts in memory; useful for reports and tests
#[derive(Debug, Default)]
pub struct MemorySink {
    attempts: Mutex<Vec<Attempt>>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn attempts(&self) -> Vec<Attempt> {
        self.attempts.lock().clone()
    }

    pub fn clear(&self) {
        self.attempts.lock().clear();
    }
}

impl TraceSink for MemorySink {
    fn record(&self, attempt: &Attempt) {
        self.attempts.lock().push(attempt.clone());
    }
}

/// Appends attempts to a file, one JSON object per line
pub struct JsonLinesSink {
    path: PathBuf,
    file: Mutex<File>,
}

impl JsonLinesSink {
    pub fn open(path: impl AsRef<Path>) -> std::io::Result<Self> {
        let path = path.as_ref().to_path_buf();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }
        let file = OpenOptions::new().create(true).append(true).open(&path)?;
        Ok(Self {
            path,
            file: Mutex::new(file),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl TraceSink for JsonLinesSink {
    fn record(&self, attempt: &Attempt) {
        let line = match serde_json::to_string(attempt) {
            Ok(line) => line,
            Err(err) => {
                warn!(error = %err, "failed to serialize attempt");
                return;
            }
        };
        let mut file = self.file.lock();
        if let Err(err) = writeln!(file, "{}", line) {
            warn!(path = %self.path.display(), error = %err, "failed to write trace line");
        }
    }
}

/// Fans attempt records out to the configured sinks
#[derive(Clone)]
pub struct ExecutionTracer {
    sinks: Vec<Arc<dyn TraceSink>>,
    enabled: bool,
}

impl ExecutionTracer {
    /// Tracer with no sinks; add some with [`with_sink`](Self::with_sink)
    pub fn new() -> Self {
        Self {
            sinks: Vec::new(),
            enabled: true,
        }
    }

    /// Tracer that drops every record
    pub fn disabled() -> Self {
        Self {
            sinks: Vec::new(),
            enabled: false,
        }
    }

    pub fn with_sink(mut self, sink: Arc<dyn TraceSink>) -> Self {
        self.sinks.push(sink);
        self
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    pub fn record(&self, attempt: &Attempt) {
        if !self.enabled {
            return;
        }
        for sink in &self.sinks {
            sink.record(attempt);
        }
    }
}

impl Default for ExecutionTracer {
    fn default() -> Self {
        Self::new().with_sink(Arc::new(TracingSink))
    }
}
